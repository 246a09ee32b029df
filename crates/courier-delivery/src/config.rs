//! Delivery engine configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Timing and budget settings for the [`BusDriver`](crate::BusDriver).
///
/// The defaults are the values interpreters assume when they pass a TTL
/// of `0` ("use the transport's default"): ten transmissions, 100 ms
/// apart, so an unacknowledged message is given up after roughly a second.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryConfig {
    /// Base delay between transmissions of an unacknowledged message.
    pub resend_interval: Duration,

    /// Retry budget used when a caller passes `ttl = 0`.
    pub default_ttl: u32,

    /// Upper bound of the random delay added to each resend so messages
    /// queued together don't retransmit in lockstep. Zero disables it.
    pub resend_jitter: Duration,

    /// Capacity of the completion broadcast channel. Slow subscribers
    /// miss the oldest events rather than stalling delivery.
    pub completion_capacity: usize,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            resend_interval: Duration::from_millis(100),
            default_ttl: 10,
            resend_jitter: Duration::from_millis(20),
            completion_capacity: 256,
        }
    }
}

impl DeliveryConfig {
    /// Smallest resend interval the engine accepts.
    pub const MIN_RESEND_INTERVAL: Duration = Duration::from_millis(1);

    /// Clamp out-of-range values so the config is safe to use.
    ///
    /// - `resend_interval` at least [`Self::MIN_RESEND_INTERVAL`]
    ///   (a zero interval would spin the retry ticker).
    /// - `default_ttl` at least 1, so `ttl = 0` still terminates.
    /// - `completion_capacity` at least 1 (broadcast channels can't be empty).
    pub fn validated(mut self) -> Self {
        if self.resend_interval < Self::MIN_RESEND_INTERVAL {
            tracing::warn!(
                interval = ?self.resend_interval,
                "resend_interval below minimum, clamping"
            );
            self.resend_interval = Self::MIN_RESEND_INTERVAL;
        }
        if self.default_ttl == 0 {
            tracing::warn!("default_ttl of 0 would never terminate, using 1");
            self.default_ttl = 1;
        }
        self.completion_capacity = self.completion_capacity.max(1);
        self
    }

    /// Resolves a caller's TTL to a concrete transmission budget.
    pub fn budget_for(&self, ttl: u32) -> u32 {
        if ttl == 0 { self.default_ttl } else { ttl }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_values() {
        let cfg = DeliveryConfig::default();
        assert_eq!(cfg.resend_interval, Duration::from_millis(100));
        assert_eq!(cfg.default_ttl, 10);
        assert_eq!(cfg.completion_capacity, 256);
    }

    #[test]
    fn test_validated_clamps_zero_values() {
        let cfg = DeliveryConfig {
            resend_interval: Duration::ZERO,
            default_ttl: 0,
            resend_jitter: Duration::ZERO,
            completion_capacity: 0,
        }
        .validated();
        assert_eq!(cfg.resend_interval, DeliveryConfig::MIN_RESEND_INTERVAL);
        assert_eq!(cfg.default_ttl, 1);
        assert_eq!(cfg.completion_capacity, 1);
    }

    #[test]
    fn test_budget_for_zero_uses_default() {
        let cfg = DeliveryConfig::default();
        assert_eq!(cfg.budget_for(0), 10);
        assert_eq!(cfg.budget_for(3), 3);
    }

    #[test]
    fn test_config_deserializes_from_json() {
        let json = r#"{
            "resend_interval": {"secs": 0, "nanos": 250000000},
            "default_ttl": 4,
            "resend_jitter": {"secs": 0, "nanos": 0},
            "completion_capacity": 16
        }"#;
        let cfg: DeliveryConfig = serde_json::from_str(json).unwrap();
        assert_eq!(cfg.resend_interval, Duration::from_millis(250));
        assert_eq!(cfg.default_ttl, 4);
    }
}
