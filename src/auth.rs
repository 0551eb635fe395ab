//! Authentication: wallet-signed channel handshakes.
//!
//! The venue authenticates a realtime session by checking a wallet signature
//! over a canonical message. The SDK never touches key material; anything
//! that can sign bytes for an account plugs in through [`WalletSigner`].

use async_trait::async_trait;

use crate::error::AuthError;
use crate::shared::AccountId;

/// Something that can prove control of an account by signing bytes: a local
/// keypair, a hardware wallet, an external signer service.
#[async_trait]
pub trait WalletSigner: Send + Sync {
    fn address(&self) -> AccountId;

    /// Raw signature bytes over `message`. The byte layout (64-byte ed25519,
    /// 65-byte secp256k1 recovery) follows the wallet's chain convention;
    /// the envelope hex-encodes whatever comes back.
    async fn sign_message(&self, message: &[u8]) -> Result<Vec<u8>, AuthError>;
}

/// Canonical message signed for the channel auth envelope.
///
/// The venue verifies the signature over exactly these bytes; the embedded
/// timestamp bounds replay.
pub fn auth_message(api_key: &str, timestamp_ms: i64) -> Vec<u8> {
    format!("geodesic-auth:{}:{}", api_key, timestamp_ms).into_bytes()
}
