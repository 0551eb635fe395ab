//! Reconnect pacing.

use std::time::Duration;

/// Delay schedule between reconnect attempts. Attempts never stop; the
/// policy only decides how long to wait between them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconnectPolicy {
    /// Constant delay between attempts.
    Fixed { delay_ms: u64 },
    /// Doubling delay with jitter, capped. Jitter spreads clients out after
    /// a venue-wide outage.
    Exponential { base_ms: u64, cap_ms: u64 },
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        ReconnectPolicy::Fixed { delay_ms: 3_000 }
    }
}

impl ReconnectPolicy {
    /// Delay before reconnect attempt `attempt` (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        match self {
            ReconnectPolicy::Fixed { delay_ms } => Duration::from_millis(*delay_ms),
            ReconnectPolicy::Exponential { base_ms, cap_ms } => {
                let exp = attempt.saturating_sub(1).min(16);
                let raw = base_ms.saturating_mul(1u64 << exp);
                let spread = raw / 4;
                let jitter = if spread == 0 {
                    0
                } else {
                    rand::random::<u64>() % (spread * 2 + 1)
                };
                let delay = raw.saturating_sub(spread).saturating_add(jitter);
                Duration::from_millis(delay.min(*cap_ms))
            }
        }
    }
}
