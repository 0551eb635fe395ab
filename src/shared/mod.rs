//! Shared newtypes and canonical enumerations used across all domain modules.
//!
//! These types are serialization-transparent: they serialize/deserialize
//! identically to the raw format the venue sends, so they can be used directly
//! in wire types without conversion overhead. Enumerations are total on
//! decode: raw values outside the known set map to `Unknown`, never to an
//! error, because wire payloads come from an external authority that may gain
//! variants before this crate does.

pub mod scaling;
pub mod serde_util;

pub use scaling::{
    from_canonical, leverage_from_bps, leverage_to_bps, to_canonical, to_canonical_unsigned,
    ScalingError,
};

use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

// ─── String id newtypes ──────────────────────────────────────────────────────

/// Generates a string-backed id newtype that serializes as a bare JSON string
/// and can be used as a `HashMap` key.
macro_rules! string_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(String);

        impl $name {
            pub fn new(s: impl Into<String>) -> Self {
                Self(s.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }

            pub fn is_empty(&self) -> bool {
                self.0.is_empty()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl Serialize for $name {
            fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
            where
                S: Serializer,
            {
                serializer.serialize_str(&self.0)
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
            where
                D: Deserializer<'de>,
            {
                let s = String::deserialize(deserializer)?;
                Ok($name(s))
            }
        }
    };
}

string_id! {
    /// Market symbol, e.g. `"ETH-USDC"`. The unique market key.
    Symbol
}

string_id! {
    /// Token identifier keying a balance entry, e.g. `"USDC"`.
    TokenId
}

string_id! {
    /// Venue/chain-assigned order identifier.
    OrderId
}

string_id! {
    /// Client-assigned order identifier, used to correlate an optimistic
    /// order record with the eventual authoritative id.
    ClientOrderId
}

string_id! {
    /// Position identifier.
    PositionId
}

string_id! {
    /// Wallet/account address in the owning chain's native format
    /// (0x-hex on EVM networks, base58 on the program chain).
    AccountId
}

string_id! {
    /// Transaction reference: an EVM transaction hash or a program-chain
    /// signature, kept opaque above the adapter layer.
    TxRef
}

impl ClientOrderId {
    /// Generates a fresh random client order id.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

impl From<&ClientOrderId> for OrderId {
    /// An optimistic order is keyed by its client order id until the
    /// authoritative id is known.
    fn from(cid: &ClientOrderId) -> Self {
        OrderId(cid.0.clone())
    }
}

// ─── Side ────────────────────────────────────────────────────────────────────

/// Order side.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", from = "String")]
pub enum Side {
    Buy,
    Sell,
    #[default]
    Unknown,
}

impl Side {
    pub fn parse(s: &str) -> Self {
        match s {
            "buy" => Side::Buy,
            "sell" => Side::Sell,
            _ => Side::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Buy => "buy",
            Side::Sell => "sell",
            Side::Unknown => "unknown",
        }
    }
}

impl From<String> for Side {
    fn from(s: String) -> Self {
        Side::parse(&s)
    }
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ─── PositionSide ────────────────────────────────────────────────────────────

/// Position direction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", from = "String")]
pub enum PositionSide {
    Long,
    Short,
    #[default]
    Unknown,
}

impl PositionSide {
    pub fn parse(s: &str) -> Self {
        match s {
            "long" => PositionSide::Long,
            "short" => PositionSide::Short,
            _ => PositionSide::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PositionSide::Long => "long",
            PositionSide::Short => "short",
            PositionSide::Unknown => "unknown",
        }
    }
}

impl From<String> for PositionSide {
    fn from(s: String) -> Self {
        PositionSide::parse(&s)
    }
}

impl std::fmt::Display for PositionSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ─── OrderType ───────────────────────────────────────────────────────────────

/// Order execution type.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", from = "String")]
pub enum OrderType {
    Market,
    Limit,
    Stop,
    StopLimit,
    TrailingStop,
    #[default]
    Unknown,
}

impl OrderType {
    pub fn parse(s: &str) -> Self {
        match s {
            "market" => OrderType::Market,
            "limit" => OrderType::Limit,
            "stop" => OrderType::Stop,
            "stopLimit" => OrderType::StopLimit,
            "trailingStop" => OrderType::TrailingStop,
            _ => OrderType::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderType::Market => "market",
            OrderType::Limit => "limit",
            OrderType::Stop => "stop",
            OrderType::StopLimit => "stopLimit",
            OrderType::TrailingStop => "trailingStop",
            OrderType::Unknown => "unknown",
        }
    }
}

impl From<String> for OrderType {
    fn from(s: String) -> Self {
        OrderType::parse(&s)
    }
}

impl std::fmt::Display for OrderType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ─── OrderStatus ─────────────────────────────────────────────────────────────

/// Order lifecycle status.
///
/// `Open` is the only live state; partial fills keep an order `Open` until
/// `filled == amount`. The four terminal states admit no further transitions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", from = "String")]
pub enum OrderStatus {
    Open,
    Filled,
    Canceled,
    Expired,
    Rejected,
    #[default]
    Unknown,
}

impl OrderStatus {
    pub fn parse(s: &str) -> Self {
        match s {
            "open" => OrderStatus::Open,
            "filled" => OrderStatus::Filled,
            "canceled" => OrderStatus::Canceled,
            "expired" => OrderStatus::Expired,
            "rejected" => OrderStatus::Rejected,
            _ => OrderStatus::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Open => "open",
            OrderStatus::Filled => "filled",
            OrderStatus::Canceled => "canceled",
            OrderStatus::Expired => "expired",
            OrderStatus::Rejected => "rejected",
            OrderStatus::Unknown => "unknown",
        }
    }

    /// Terminal statuses admit no further transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OrderStatus::Filled | OrderStatus::Canceled | OrderStatus::Expired | OrderStatus::Rejected
        )
    }
}

impl From<String> for OrderStatus {
    fn from(s: String) -> Self {
        OrderStatus::parse(&s)
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ─── TimeInForce ─────────────────────────────────────────────────────────────

/// Order time-in-force. Request-side only, so decoding is strict.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TimeInForce {
    #[default]
    Gtc,
    Ioc,
    Fok,
    Gtd,
}

impl TimeInForce {
    pub fn as_str(&self) -> &'static str {
        match self {
            TimeInForce::Gtc => "GTC",
            TimeInForce::Ioc => "IOC",
            TimeInForce::Fok => "FOK",
            TimeInForce::Gtd => "GTD",
        }
    }
}

impl std::fmt::Display for TimeInForce {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ─── LeverageBounds ──────────────────────────────────────────────────────────

/// Inclusive leverage range declared by a chain adapter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeverageBounds {
    pub min: Decimal,
    pub max: Decimal,
}

impl LeverageBounds {
    pub fn new(min: Decimal, max: Decimal) -> Self {
        Self { min, max }
    }

    pub fn contains(&self, leverage: Decimal) -> bool {
        leverage >= self.min && leverage <= self.max
    }
}

impl Default for LeverageBounds {
    fn default() -> Self {
        Self {
            min: Decimal::ONE,
            max: Decimal::from(50u32),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_symbol_serde_transparent() {
        let sym = Symbol::from("ETH-USDC");
        let json = serde_json::to_string(&sym).unwrap();
        assert_eq!(json, "\"ETH-USDC\"");
        let back: Symbol = serde_json::from_str(&json).unwrap();
        assert_eq!(back, sym);
    }

    #[test]
    fn test_client_order_id_generate_unique() {
        let a = ClientOrderId::generate();
        let b = ClientOrderId::generate();
        assert_ne!(a, b);
        assert!(!a.as_str().is_empty());
    }

    #[test]
    fn test_side_round_trip_and_fallback() {
        assert_eq!(serde_json::to_string(&Side::Buy).unwrap(), "\"buy\"");
        let s: Side = serde_json::from_str("\"sell\"").unwrap();
        assert_eq!(s, Side::Sell);
        let odd: Side = serde_json::from_str("\"shrt\"").unwrap();
        assert_eq!(odd, Side::Unknown);
    }

    #[test]
    fn test_order_type_wire_names() {
        assert_eq!(serde_json::to_string(&OrderType::StopLimit).unwrap(), "\"stopLimit\"");
        assert_eq!(
            serde_json::from_str::<OrderType>("\"trailingStop\"").unwrap(),
            OrderType::TrailingStop
        );
        assert_eq!(serde_json::from_str::<OrderType>("\"twap\"").unwrap(), OrderType::Unknown);
    }

    #[test]
    fn test_status_terminality() {
        assert!(!OrderStatus::Open.is_terminal());
        assert!(!OrderStatus::Unknown.is_terminal());
        for st in [
            OrderStatus::Filled,
            OrderStatus::Canceled,
            OrderStatus::Expired,
            OrderStatus::Rejected,
        ] {
            assert!(st.is_terminal(), "{st} should be terminal");
        }
    }

    #[test]
    fn test_time_in_force_wire_names() {
        assert_eq!(serde_json::to_string(&TimeInForce::Gtc).unwrap(), "\"GTC\"");
        assert_eq!(serde_json::from_str::<TimeInForce>("\"FOK\"").unwrap(), TimeInForce::Fok);
        assert_eq!(TimeInForce::default(), TimeInForce::Gtc);
    }

    #[test]
    fn test_leverage_bounds() {
        let bounds = LeverageBounds::default();
        assert!(bounds.contains(Decimal::ONE));
        assert!(bounds.contains(Decimal::from(50u32)));
        assert!(!bounds.contains(Decimal::from(51u32)));
        assert!(!bounds.contains(Decimal::new(5, 1))); // 0.5
    }
}
