//! Market domain: listing identity plus refreshable market data.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::shared::Symbol;

/// A listed perpetual market.
///
/// Identity (symbol, chain reference, decimal scales) is fixed at listing
/// time; only `last_price` and `funding_rate` move during a session. Markets
/// are never deleted while the process lives.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Market {
    pub symbol: Symbol,
    /// Contract address (EVM) or program market account (program chain).
    pub address: String,
    pub price_decimals: u32,
    pub size_decimals: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_price: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub funding_rate: Option<Decimal>,
}

/// Partial market update from either channel.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct MarketPatch {
    pub symbol: Option<Symbol>,
    pub address: Option<String>,
    pub price_decimals: Option<u32>,
    pub size_decimals: Option<u32>,
    pub last_price: Option<Decimal>,
    pub funding_rate: Option<Decimal>,
}

impl Market {
    /// Builds a market from its first observed patch. Identity fields the
    /// patch lacks stay at their placeholder values until a fuller update
    /// arrives.
    pub fn from_patch(symbol: &Symbol, patch: MarketPatch) -> Self {
        Self {
            symbol: symbol.clone(),
            address: patch.address.unwrap_or_default(),
            price_decimals: patch.price_decimals.unwrap_or(0),
            size_decimals: patch.size_decimals.unwrap_or(0),
            last_price: patch.last_price,
            funding_rate: patch.funding_rate,
        }
    }

    /// Applies a patch in place. Market-data fields always follow the patch;
    /// identity fields are only filled in while still at their placeholder
    /// values, since identity is immutable once known.
    pub fn apply_patch(&mut self, patch: MarketPatch) {
        if self.address.is_empty() {
            if let Some(address) = patch.address {
                self.address = address;
            }
        }
        if self.price_decimals == 0 {
            if let Some(pd) = patch.price_decimals {
                self.price_decimals = pd;
            }
        }
        if self.size_decimals == 0 {
            if let Some(sd) = patch.size_decimals {
                self.size_decimals = sd;
            }
        }
        if let Some(price) = patch.last_price {
            self.last_price = Some(price);
        }
        if let Some(rate) = patch.funding_rate {
            self.funding_rate = Some(rate);
        }
    }

    pub fn to_patch(&self) -> MarketPatch {
        MarketPatch {
            symbol: Some(self.symbol.clone()),
            address: Some(self.address.clone()),
            price_decimals: Some(self.price_decimals),
            size_decimals: Some(self.size_decimals),
            last_price: self.last_price,
            funding_rate: self.funding_rate,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::prelude::*;

    fn eth_usdc() -> Market {
        Market {
            symbol: Symbol::from("ETH-USDC"),
            address: "0x1111111111111111111111111111111111111111".to_string(),
            price_decimals: 8,
            size_decimals: 18,
            last_price: None,
            funding_rate: None,
        }
    }

    #[test]
    fn test_identity_is_sticky() {
        let mut market = eth_usdc();
        market.apply_patch(MarketPatch {
            address: Some("0x2222222222222222222222222222222222222222".to_string()),
            price_decimals: Some(6),
            last_price: Some(Decimal::from_str("1720.5").unwrap()),
            ..Default::default()
        });
        assert_eq!(market.address, "0x1111111111111111111111111111111111111111");
        assert_eq!(market.price_decimals, 8);
        assert_eq!(market.last_price, Some(Decimal::from_str("1720.5").unwrap()));
    }

    #[test]
    fn test_placeholder_identity_fills_in() {
        let symbol = Symbol::from("BTC-USDC");
        let mut market = Market::from_patch(
            &symbol,
            MarketPatch {
                last_price: Some(Decimal::from_str("64000").unwrap()),
                ..Default::default()
            },
        );
        assert_eq!(market.price_decimals, 0);

        market.apply_patch(MarketPatch {
            address: Some("0xabc".to_string()),
            price_decimals: Some(8),
            size_decimals: Some(8),
            ..Default::default()
        });
        assert_eq!(market.address, "0xabc");
        assert_eq!(market.price_decimals, 8);
        assert_eq!(market.size_decimals, 8);
    }

    #[test]
    fn test_patch_deserializes_from_push_payload() {
        let patch: MarketPatch = serde_json::from_str(
            r#"{"symbol":"ETH-USDC","lastPrice":"1725.10","fundingRate":"0.0001"}"#,
        )
        .unwrap();
        assert_eq!(patch.symbol, Some(Symbol::from("ETH-USDC")));
        assert_eq!(patch.last_price, Some(Decimal::from_str("1725.10").unwrap()));
        assert!(patch.address.is_none());
    }
}
