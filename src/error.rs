//! Unified SDK error types.

use thiserror::Error;

use crate::shared::Symbol;

/// Top-level SDK error.
#[derive(Error, Debug)]
pub enum SdkError {
    #[error("Adapter error: {0}")]
    Adapter(#[from] AdapterError),

    #[error("Order error: {0}")]
    Order(#[from] OrderError),

    #[error("HTTP error: {0}")]
    Http(#[from] HttpError),

    #[error("WebSocket error: {0}")]
    Ws(#[from] WsError),

    #[error("Auth error: {0}")]
    Auth(#[from] AuthError),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

impl SdkError {
    /// True when retrying the same call with the same `client_order_id` is safe.
    ///
    /// Confirmation timeouts are ambiguous (the transaction may still land), so
    /// the retry must be idempotent at the venue; everything else either failed
    /// definitively or needs caller judgment.
    pub fn is_retry_safe(&self) -> bool {
        matches!(self, SdkError::Adapter(AdapterError::Timeout { .. }))
    }
}

/// Chain-adapter errors, uniform across the EVM and program-chain variants.
#[derive(Error, Debug)]
pub enum AdapterError {
    /// Transport/network failure before the operation reached the chain.
    /// Read paths degrade to empty data on this; write paths surface it.
    #[error("Chain backend unavailable: {0}")]
    Unavailable(String),

    /// The bounded confirmation wait elapsed. The transaction may still land
    /// and must be reconciled by a later fetch or push update.
    #[error("Confirmation not observed within {waited_ms}ms")]
    Timeout { waited_ms: u64 },

    /// The chain accepted the request but the transaction failed (reverted,
    /// rejected by the program, or malformed for this venue).
    #[error("Transaction rejected: {0}")]
    Rejected(String),
}

/// Order-lifecycle errors surfaced by write operations.
#[derive(Error, Debug)]
pub enum OrderError {
    #[error("Wallet not connected")]
    WalletNotConnected,

    #[error("Market not found: {0}")]
    MarketNotFound(Symbol),

    #[error("Order submission failed: {0}")]
    SubmissionFailed(String),
}

/// HTTP-layer errors for the venue read API.
#[derive(Error, Debug)]
pub enum HttpError {
    #[error("Request failed: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("Server error {status}: {body}")]
    ServerError { status: u16, body: String },

    #[error("Rate limited (retry after {retry_after_ms:?}ms)")]
    RateLimited { retry_after_ms: Option<u64> },

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Timeout")]
    Timeout,

    #[error("Max retries exceeded after {attempts} attempts: {last_error}")]
    MaxRetriesExceeded { attempts: u32, last_error: String },
}

/// Push-channel errors, surfaced through the channel's diagnostic event
/// stream. The connection recovers on its own; these never fail a write or
/// read call.
#[derive(Error, Debug, Clone)]
pub enum WsError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Send failed: {0}")]
    SendFailed(String),
}

/// Wallet-signer errors.
#[derive(Error, Debug)]
pub enum AuthError {
    #[error("No signer bound")]
    NoSigner,

    #[error("Signing rejected: {0}")]
    SigningRejected(String),
}
