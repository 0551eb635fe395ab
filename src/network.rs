//! Network URL constants for the Geodesic SDK.

/// Default REST read-API base URL.
pub const DEFAULT_API_URL: &str = "https://api.geodesic.trade";

/// Default push-channel WebSocket URL.
pub const DEFAULT_WS_URL: &str = "wss://stream.geodesic.trade/ws";
