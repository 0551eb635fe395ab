//! Chain adapters: one capability surface over heterogeneous venues.
//!
//! Each deployment of the venue settles on a different chain family with its
//! own wire encodings, numeric scales and confirmation semantics. The
//! [`ChainAdapter`] trait is the whole of what the rest of the crate knows
//! about a chain: snapshot fetchers that yield canonical domain records and
//! three mutations that block until the chain confirms them. Everything
//! chain-specific (raw layouts, enum code tables, log parsing, polling
//! cadence) stays behind the trait in [`evm`] and [`program`].

pub mod evm;
pub mod program;

use async_trait::async_trait;
use rust_decimal::Decimal;

use crate::domain::{Balance, Market, Order, OrderRequest, Position};
use crate::error::AdapterError;
use crate::shared::{AccountId, LeverageBounds, OrderId, PositionId, TxRef};

/// Chain family a venue deployment settles on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChainKind {
    /// Contract-based chains; confirmation is a mined receipt, order ids
    /// surface through event logs.
    Evm,
    /// Program-based chains; confirmation is a finalized transaction status,
    /// order ids surface through program log lines.
    Program,
}

impl ChainKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChainKind::Evm => "evm",
            ChainKind::Program => "program",
        }
    }
}

impl std::fmt::Display for ChainKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Venue-assigned identifier recovered from a confirmed submission, when the
/// chain surfaced one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssignedId {
    Assigned(OrderId),
    /// Confirmed on chain, but no id was recoverable from the logs; the
    /// order stays addressable by client order id until a later update
    /// carries the venue id.
    Pending,
}

impl AssignedId {
    pub fn order_id(&self) -> Option<&OrderId> {
        match self {
            AssignedId::Assigned(id) => Some(id),
            AssignedId::Pending => None,
        }
    }
}

/// Confirmed order submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmitOutcome {
    pub order_id: AssignedId,
    pub tx_ref: TxRef,
}

impl SubmitOutcome {
    pub fn assigned(id: OrderId, tx_ref: TxRef) -> Self {
        Self {
            order_id: AssignedId::Assigned(id),
            tx_ref,
        }
    }

    pub fn pending(tx_ref: TxRef) -> Self {
        Self {
            order_id: AssignedId::Pending,
            tx_ref,
        }
    }
}

/// Confirmed non-order mutation (cancel, leverage change).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxOutcome {
    pub tx_ref: TxRef,
}

/// Failure reported by a raw transport, before adapter classification.
#[derive(Debug, Clone, thiserror::Error)]
pub enum TransportError {
    /// The endpoint could not be reached or did not answer.
    #[error("transport unreachable: {0}")]
    Unreachable(String),
    /// The endpoint answered and refused the request.
    #[error("transport rejected request: {0}")]
    Rejected(String),
}

impl From<TransportError> for AdapterError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::Unreachable(msg) => AdapterError::Unavailable(msg),
            TransportError::Rejected(msg) => AdapterError::Rejected(msg),
        }
    }
}

/// Capability surface a chain deployment exposes to the rest of the crate.
///
/// Fetchers return canonical records already normalized out of raw chain
/// scales. Account-scoped fetchers resolve to an empty vector when no wallet
/// is bound; only transport failures surface as errors. The three mutations
/// block until the chain confirms or the adapter's deadline lapses, in which
/// case they return [`AdapterError::Timeout`] with the transaction possibly
/// still in flight.
#[async_trait]
pub trait ChainAdapter: Send + Sync {
    fn chain_kind(&self) -> ChainKind;

    /// Wallet account this adapter signs for, when one is bound.
    fn bound_owner(&self) -> Option<AccountId>;

    /// Leverage range the deployment accepts.
    fn leverage_bounds(&self) -> LeverageBounds;

    async fn fetch_markets(&self) -> Result<Vec<Market>, AdapterError>;

    async fn fetch_balances(&self) -> Result<Vec<Balance>, AdapterError>;

    async fn fetch_positions(&self) -> Result<Vec<Position>, AdapterError>;

    async fn fetch_open_orders(&self) -> Result<Vec<Order>, AdapterError>;

    /// Submits an order and blocks until the chain confirms it, recovering
    /// the venue-assigned id from the confirmation logs when present.
    async fn submit_order(&self, request: &OrderRequest) -> Result<SubmitOutcome, AdapterError>;

    async fn cancel_order(&self, id: &OrderId) -> Result<TxOutcome, AdapterError>;

    async fn update_leverage(
        &self,
        position: &PositionId,
        leverage: Decimal,
    ) -> Result<TxOutcome, AdapterError>;
}
