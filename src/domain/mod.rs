//! Domain modules (vertical slices): canonical entities, their patch types,
//! and the field-level rules for applying a patch without breaking entity
//! invariants.
//!
//! A patch is the unit of mutation everywhere in the crate: chain fetches,
//! push updates, and lifecycle confirmations all reduce to patches routed
//! through the canonical store. Patch application is infallible; a field that
//! would violate an invariant is repaired or ignored and the violation is
//! reported as an [`IntegrityWarning`].

pub mod balance;
pub mod market;
pub mod order;
pub mod position;
pub mod trade;

pub use balance::{Balance, BalancePatch};
pub use market::{Market, MarketPatch};
pub use order::{Order, OrderPatch, OrderRequest};
pub use position::{Position, PositionPatch};
pub use trade::{Trade, TradeFilter};

use rust_decimal::Decimal;
use thiserror::Error;

use crate::shared::{OrderId, OrderStatus, PositionId, PositionSide, TokenId};

/// Non-fatal invariant violation detected while applying an accepted patch.
///
/// Warnings are logged by the store and returned to the merging caller; they
/// never fail the merge, because the offending values come from an external
/// authority the client cannot overrule.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum IntegrityWarning {
    #[error("balance {token}: total {total} != free {free} + locked {locked}, total recomputed")]
    BalanceTotalMismatch {
        token: TokenId,
        free: Decimal,
        locked: Decimal,
        total: Decimal,
    },

    #[error("balance {token}: negative {field} clamped to zero")]
    NegativeBalance { token: TokenId, field: &'static str },

    #[error("order {id}: filled {filled} exceeds amount {amount}, clamped")]
    FilledExceedsAmount {
        id: OrderId,
        filled: Decimal,
        amount: Decimal,
    },

    #[error("order {id}: filled may not decrease ({stored} -> {incoming}), kept {stored}")]
    FilledRegression {
        id: OrderId,
        stored: Decimal,
        incoming: Decimal,
    },

    #[error("order {id}: status {from} is terminal, ignored transition to {to}")]
    TerminalStatusChange {
        id: OrderId,
        from: OrderStatus,
        to: OrderStatus,
    },

    #[error("position {id}: negative size clamped to zero")]
    NegativeSize { id: PositionId },

    #[error("position {id}: leverage {leverage} outside declared bounds {min}..={max}")]
    LeverageOutOfBounds {
        id: PositionId,
        leverage: Decimal,
        min: Decimal,
        max: Decimal,
    },

    #[error("position {id}: liquidation {liquidation} on the wrong side of entry {entry} for {side}")]
    LiquidationSideMismatch {
        id: PositionId,
        side: PositionSide,
        entry: Decimal,
        liquidation: Decimal,
    },
}
