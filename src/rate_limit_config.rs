use serde::{Deserialize, Serialize};
use std::time::Duration;
use validator::Validate;

/// Entries not seen for longer than this are dropped by the sweeper.
pub const CLIENT_IDLE_TIMEOUT: Duration = Duration::from_secs(3 * 60);

/// How often the sweeper wakes up.
pub const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Per-client token bucket settings.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct LimiterSettings {
    /// Refill rate of every client bucket.
    #[validate(range(exclusive_min = 0.0, message = "requests per second must be greater than 0"))]
    pub requests_per_second: f64,
    /// Bucket capacity.
    #[validate(range(min = 1, message = "burst must be at least 1"))]
    pub burst: u32,
    pub enabled: bool,
}

impl Default for LimiterSettings {
    fn default() -> Self {
        Self {
            requests_per_second: 2.0,
            burst: 4,
            enabled: true,
        }
    }
}

impl LimiterSettings {
    pub fn new(requests_per_second: f64, burst: u32) -> Self {
        Self {
            requests_per_second,
            burst,
            enabled: true,
        }
    }

    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let settings = LimiterSettings::default();
        assert!(settings.validate().is_ok());
        assert!(settings.enabled);
    }

    #[test]
    fn test_zero_burst_rejected() {
        assert!(LimiterSettings::new(2.0, 0).validate().is_err());
    }

    #[test]
    fn test_non_positive_rate_rejected() {
        assert!(LimiterSettings::new(0.0, 4).validate().is_err());
        assert!(LimiterSettings::new(-1.0, 4).validate().is_err());
    }

    #[test]
    fn test_disabled() {
        assert!(!LimiterSettings::disabled().enabled);
    }
}
