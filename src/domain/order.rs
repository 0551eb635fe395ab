//! Order domain: records, patches, and submission requests.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::IntegrityWarning;
use crate::shared::{ClientOrderId, OrderId, OrderStatus, OrderType, Side, Symbol, TimeInForce, TxRef};

/// A resting or settled order as the venue sees it.
///
/// Keyed by the venue-assigned id; `client_order_id` correlates the record
/// with the optimistic entry created at submission time. `filled` never
/// decreases and never exceeds `amount`; a terminal `status` never changes
/// again.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: OrderId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_order_id: Option<ClientOrderId>,
    pub market: Symbol,
    pub side: Side,
    #[serde(rename = "type")]
    pub order_type: OrderType,
    pub price: Decimal,
    pub amount: Decimal,
    pub filled: Decimal,
    pub status: OrderStatus,
    #[serde(with = "crate::shared::serde_util::timestamp_ms")]
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tx_ref: Option<TxRef>,
}

/// Partial order update from any source.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct OrderPatch {
    pub id: Option<OrderId>,
    pub client_order_id: Option<ClientOrderId>,
    pub market: Option<Symbol>,
    pub side: Option<Side>,
    #[serde(rename = "type")]
    pub order_type: Option<OrderType>,
    pub price: Option<Decimal>,
    pub amount: Option<Decimal>,
    pub filled: Option<Decimal>,
    pub status: Option<OrderStatus>,
    #[serde(with = "crate::shared::serde_util::timestamp_ms_opt")]
    pub timestamp: Option<DateTime<Utc>>,
    pub tx_ref: Option<TxRef>,
}

impl OrderPatch {
    /// Combines two patches; fields present in `over` win.
    pub fn overlay(self, over: OrderPatch) -> OrderPatch {
        OrderPatch {
            id: over.id.or(self.id),
            client_order_id: over.client_order_id.or(self.client_order_id),
            market: over.market.or(self.market),
            side: over.side.or(self.side),
            order_type: over.order_type.or(self.order_type),
            price: over.price.or(self.price),
            amount: over.amount.or(self.amount),
            filled: over.filled.or(self.filled),
            status: over.status.or(self.status),
            timestamp: over.timestamp.or(self.timestamp),
            tx_ref: over.tx_ref.or(self.tx_ref),
        }
    }
}

impl Order {
    pub fn from_patch(
        id: &OrderId,
        patch: OrderPatch,
        warnings: &mut Vec<IntegrityWarning>,
    ) -> Self {
        // Amount defaults to the patched fill so a record created from a
        // fill-only update never starts in violation of filled <= amount;
        // the real amount arrives with the next fuller update.
        let inferred_amount = patch.amount.or(patch.filled).unwrap_or(Decimal::ZERO);
        let mut order = Self {
            id: id.clone(),
            client_order_id: None,
            market: Symbol::default(),
            side: Side::Unknown,
            order_type: OrderType::Unknown,
            price: Decimal::ZERO,
            amount: inferred_amount,
            filled: Decimal::ZERO,
            status: OrderStatus::Open,
            timestamp: patch.timestamp.unwrap_or_else(Utc::now),
            tx_ref: None,
        };
        order.apply_patch(patch, warnings);
        order
    }

    /// Applies a patch in place under the order invariants: `filled` is
    /// clamped into `[previous filled, amount]` and a terminal status is
    /// never replaced.
    pub fn apply_patch(&mut self, patch: OrderPatch, warnings: &mut Vec<IntegrityWarning>) {
        if let Some(cid) = patch.client_order_id {
            self.client_order_id = Some(cid);
        }
        if let Some(market) = patch.market {
            self.market = market;
        }
        if let Some(side) = patch.side {
            self.side = side;
        }
        if let Some(order_type) = patch.order_type {
            self.order_type = order_type;
        }
        if let Some(price) = patch.price {
            self.price = price;
        }
        if let Some(amount) = patch.amount {
            self.amount = amount;
        }
        if let Some(timestamp) = patch.timestamp {
            self.timestamp = timestamp;
        }
        if let Some(tx_ref) = patch.tx_ref {
            self.tx_ref = Some(tx_ref);
        }

        if let Some(incoming) = patch.filled {
            let mut filled = incoming;
            if filled < self.filled {
                warnings.push(IntegrityWarning::FilledRegression {
                    id: self.id.clone(),
                    stored: self.filled,
                    incoming,
                });
                filled = self.filled;
            }
            if filled > self.amount {
                warnings.push(IntegrityWarning::FilledExceedsAmount {
                    id: self.id.clone(),
                    filled,
                    amount: self.amount,
                });
                filled = self.amount;
            }
            self.filled = filled;
        } else if self.filled > self.amount {
            // An amount-only patch can still undercut the stored fill.
            warnings.push(IntegrityWarning::FilledExceedsAmount {
                id: self.id.clone(),
                filled: self.filled,
                amount: self.amount,
            });
            self.filled = self.amount;
        }

        if let Some(status) = patch.status {
            if self.status.is_terminal() && status != self.status {
                warnings.push(IntegrityWarning::TerminalStatusChange {
                    id: self.id.clone(),
                    from: self.status,
                    to: status,
                });
            } else {
                self.status = status;
            }
        }
    }

    pub fn to_patch(&self) -> OrderPatch {
        OrderPatch {
            id: Some(self.id.clone()),
            client_order_id: self.client_order_id.clone(),
            market: Some(self.market.clone()),
            side: Some(self.side),
            order_type: Some(self.order_type),
            price: Some(self.price),
            amount: Some(self.amount),
            filled: Some(self.filled),
            status: Some(self.status),
            timestamp: Some(self.timestamp),
            tx_ref: self.tx_ref.clone(),
        }
    }

    pub fn remaining(&self) -> Decimal {
        self.amount - self.filled
    }
}

// ─── OrderRequest ────────────────────────────────────────────────────────────

fn default_leverage() -> Decimal {
    Decimal::ONE
}

/// A new-order submission request.
///
/// Only market, side, type, price and amount are mandatory; the rest default
/// per venue convention (1x leverage, GTC, not reduce-only, generated client
/// order id).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OrderRequest {
    pub market: Symbol,
    pub side: Side,
    #[serde(rename = "type")]
    pub order_type: OrderType,
    pub price: Decimal,
    pub amount: Decimal,
    #[serde(default = "default_leverage")]
    pub leverage: Decimal,
    #[serde(default)]
    pub reduce_only: bool,
    #[serde(default)]
    pub time_in_force: TimeInForce,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_price: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_order_id: Option<ClientOrderId>,
}

impl OrderRequest {
    pub fn new(
        market: impl Into<Symbol>,
        side: Side,
        order_type: OrderType,
        price: Decimal,
        amount: Decimal,
    ) -> Self {
        Self {
            market: market.into(),
            side,
            order_type,
            price,
            amount,
            leverage: Decimal::ONE,
            reduce_only: false,
            time_in_force: TimeInForce::default(),
            stop_price: None,
            client_order_id: None,
        }
    }

    pub fn with_leverage(mut self, leverage: Decimal) -> Self {
        self.leverage = leverage;
        self
    }

    pub fn with_reduce_only(mut self, reduce_only: bool) -> Self {
        self.reduce_only = reduce_only;
        self
    }

    pub fn with_time_in_force(mut self, tif: TimeInForce) -> Self {
        self.time_in_force = tif;
        self
    }

    pub fn with_stop_price(mut self, stop_price: Decimal) -> Self {
        self.stop_price = Some(stop_price);
        self
    }

    pub fn with_client_order_id(mut self, id: ClientOrderId) -> Self {
        self.client_order_id = Some(id);
        self
    }
}
