//! # Geodesic SDK
//!
//! Client-side state synchronization and order lifecycle management for the
//! Geodesic perpetuals venue across its chain deployments.
//!
//! ## Architecture
//!
//! The crate is organized in layers:
//!
//! 1. **Core** — shared newtypes, domain entities and their patch rules,
//!    numeric normalization, error taxonomy
//! 2. **Store** — the canonical state store with sequenced, source-ranked
//!    merging
//! 3. **Chains** — the [`chain::ChainAdapter`] capability trait with EVM and
//!    program-chain implementations
//! 4. **Transports** — the push-channel manager, the HTTP read API, wallet
//!    signing
//! 5. **High-Level Client** — [`client::GeodesicClient`]: bootstrap, writes,
//!    snapshot reads
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use geodesic::prelude::*;
//!
//! let client = GeodesicClient::builder()
//!     .adapter(adapter)
//!     .signer(signer)
//!     .api_key("gk_live_...")
//!     .build()?;
//!
//! client.bootstrap().await;
//! client.connect().await;
//!
//! let order = client
//!     .create_order(OrderRequest::new("ETH-USDC", Side::Buy, OrderType::Limit,
//!         "1720.50".parse()?, "1.5".parse()?))
//!     .await?;
//! ```

// ── Layer 1: Core ────────────────────────────────────────────────────────────

/// Shared newtypes and canonical enumerations.
pub mod shared;

/// Domain entities, patch types and invariant repair.
pub mod domain;

/// Unified SDK error types.
pub mod error;

/// Network URL constants.
pub mod network;

// ── Layer 2: Store ───────────────────────────────────────────────────────────

/// Canonical state store with sequenced merging.
pub mod store;

// ── Layer 3: Chains ──────────────────────────────────────────────────────────

/// Chain adapters: the capability trait plus EVM and program-chain variants.
pub mod chain;

// ── Layer 4: Transports ──────────────────────────────────────────────────────

/// Wallet signing for push-channel authentication.
pub mod auth;

/// HTTP read API with retry policies.
pub mod http;

/// Push channel: connection state machine, reconnection, update routing.
pub mod ws;

// ── Layer 5: High-Level Client ───────────────────────────────────────────────

/// Order lifecycle controller: optimistic mutate, confirm, reconcile.
pub mod lifecycle;

/// `GeodesicClient` — the primary entry point.
pub mod client;

// ── Prelude ──────────────────────────────────────────────────────────────────

pub mod prelude {
    // Shared newtypes and enums
    pub use crate::shared::{
        AccountId, ClientOrderId, LeverageBounds, OrderId, OrderStatus, OrderType, PositionId,
        PositionSide, Side, Symbol, TimeInForce, TokenId, TxRef,
    };

    // Domain entities and patches
    pub use crate::domain::{
        Balance, BalancePatch, IntegrityWarning, Market, MarketPatch, Order, OrderPatch,
        OrderRequest, Position, PositionPatch, Trade, TradeFilter,
    };

    // Store
    pub use crate::store::{CanonicalStore, EntityKind, MergeOutcome, Sequence, Source};

    // Chain adapters
    pub use crate::chain::evm::{EvmAdapter, EvmAdapterConfig, EvmTransport};
    pub use crate::chain::program::{ProgramAdapter, ProgramAdapterConfig, ProgramTransport};
    pub use crate::chain::{AssignedId, ChainAdapter, ChainKind, SubmitOutcome, TxOutcome};

    // Errors
    pub use crate::error::{AdapterError, AuthError, HttpError, OrderError, SdkError, WsError};

    // Network
    pub use crate::network::{DEFAULT_API_URL, DEFAULT_WS_URL};

    // Auth
    pub use crate::auth::WalletSigner;

    // HTTP read API
    pub use crate::http::{ReadApi, RetryConfig, RetryPolicy};

    // Push channel
    pub use crate::ws::{
        Channel, ChannelConfig, ChannelEvent, ChannelManager, ChannelState, ReconnectPolicy,
    };

    // Lifecycle + client
    pub use crate::client::{GeodesicClient, GeodesicClientBuilder};
    pub use crate::lifecycle::LifecycleController;
}
