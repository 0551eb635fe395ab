//! Realtime channel layer: wire envelopes, lifecycle states, events.
//!
//! The venue pushes entity updates over a single authenticated WebSocket.
//! This module defines the protocol surface (outbound auth/subscribe
//! envelopes, inbound `*_update` envelopes wrapping entity patches) and the
//! configuration and event types consumers see. The connection itself lives
//! in [`channel`], reconnect pacing in [`backoff`].

pub mod backoff;
pub mod channel;

pub use backoff::ReconnectPolicy;
pub use channel::ChannelManager;

use serde::{Deserialize, Serialize};

use crate::domain::{BalancePatch, MarketPatch, OrderPatch, PositionPatch};
use crate::error::WsError;
use crate::store::EntityKind;

// ─── Lifecycle ───────────────────────────────────────────────────────────────

/// Connection lifecycle. Entity updates are only applied in `Subscribed`;
/// everything received earlier is handshake traffic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ChannelState {
    Disconnected = 0,
    Connecting = 1,
    Authenticating = 2,
    Subscribed = 3,
}

impl From<u8> for ChannelState {
    fn from(value: u8) -> Self {
        match value {
            1 => ChannelState::Connecting,
            2 => ChannelState::Authenticating,
            3 => ChannelState::Subscribed,
            _ => ChannelState::Disconnected,
        }
    }
}

impl ChannelState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChannelState::Disconnected => "disconnected",
            ChannelState::Connecting => "connecting",
            ChannelState::Authenticating => "authenticating",
            ChannelState::Subscribed => "subscribed",
        }
    }
}

impl std::fmt::Display for ChannelState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ─── Channels ────────────────────────────────────────────────────────────────

/// Server-side data channels a session can subscribe to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    Orders,
    Positions,
    Balances,
    Markets,
}

impl Channel {
    pub fn all() -> Vec<Channel> {
        vec![
            Channel::Orders,
            Channel::Positions,
            Channel::Balances,
            Channel::Markets,
        ]
    }
}

// ─── Envelopes ───────────────────────────────────────────────────────────────

/// Client → server envelopes.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Outbound {
    #[serde(rename_all = "camelCase")]
    Auth {
        api_key: String,
        /// Epoch milliseconds at signing time.
        timestamp: i64,
        /// Hex-encoded wallet signature over the auth message.
        signature: String,
    },
    Subscribe {
        channels: Vec<Channel>,
    },
}

/// Server → client envelopes. Unlisted message types fail to decode and are
/// dropped with a warning; the channel itself stays up.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Inbound {
    OrderUpdate { data: OrderPatch },
    PositionUpdate { data: PositionPatch },
    BalanceUpdate { data: BalancePatch },
    MarketUpdate { data: MarketPatch },
}

// ─── Events ──────────────────────────────────────────────────────────────────

/// Diagnostic events the channel surfaces to its consumer. Delivery is lossy
/// under backpressure; the canonical store, not this stream, is the source of
/// truth for state.
#[derive(Debug, Clone)]
pub enum ChannelEvent {
    Connected,
    /// Handshake done; entity updates flow from here.
    Subscribed,
    Disconnected {
        code: Option<u16>,
        reason: String,
    },
    /// An entity update was routed into the store.
    Update {
        kind: EntityKind,
        key: String,
    },
    Error(WsError),
}

// ─── Config ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct ChannelConfig {
    pub ws_url: String,
    /// Venue API key; auth is skipped when absent and private channels will
    /// stay silent.
    pub api_key: Option<String>,
    pub channels: Vec<Channel>,
    pub reconnect: ReconnectPolicy,
    pub connect_timeout_ms: u64,
    pub ping_interval_ms: u64,
    pub pong_timeout_ms: u64,
    /// Capacity of the diagnostic event buffer.
    pub event_buffer: usize,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            ws_url: crate::network::DEFAULT_WS_URL.to_string(),
            api_key: None,
            channels: Channel::all(),
            reconnect: ReconnectPolicy::default(),
            connect_timeout_ms: 10_000,
            ping_interval_ms: 30_000,
            pong_timeout_ms: 10_000,
            event_buffer: 256,
        }
    }
}
