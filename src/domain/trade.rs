//! Trade history: pass-through records from the venue read API.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::shared::{OrderId, Side, Symbol};

/// An executed trade, exactly as reported by the read API. Not merged into
/// the canonical store; history is the venue's record, not session state.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Trade {
    pub id: String,
    pub market: Symbol,
    pub side: Side,
    pub price: Decimal,
    pub amount: Decimal,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fee: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order_id: Option<OrderId>,
    #[serde(with = "crate::shared::serde_util::timestamp_ms")]
    pub timestamp: DateTime<Utc>,
}

/// Query filter for historical trades.
#[derive(Debug, Clone, PartialEq)]
pub struct TradeFilter {
    pub market: Option<Symbol>,
    pub limit: u32,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

impl Default for TradeFilter {
    fn default() -> Self {
        Self {
            market: None,
            limit: 50,
            from: None,
            to: None,
        }
    }
}

impl TradeFilter {
    pub fn market(mut self, market: impl Into<Symbol>) -> Self {
        self.market = Some(market.into());
        self
    }

    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = limit;
        self
    }

    pub fn from(mut self, from: DateTime<Utc>) -> Self {
        self.from = Some(from);
        self
    }

    pub fn to(mut self, to: DateTime<Utc>) -> Self {
        self.to = Some(to);
        self
    }
}
