//! Market timing configuration

use chrono::Duration;
use serde::{Deserialize, Serialize};

/// Upper bound for every configured duration (ten years)
pub const MAX_DURATION_SECS: i64 = 10 * 365 * 24 * 60 * 60;

/// Durations governing auctions, clauses and direct sales, in seconds
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct MarketConfig {
    /// Lifetime of a freshly opened auction
    pub auction_horizon_secs: i64,
    /// Clause expiry is set this long after the auction end
    pub clause_extension_secs: i64,
    /// How long a direct-sale listing stays open
    pub sale_window_secs: i64,
}

impl Default for MarketConfig {
    fn default() -> Self {
        Self {
            auction_horizon_secs: 24 * 60 * 60,
            clause_extension_secs: 14 * 24 * 60 * 60,
            sale_window_secs: 72 * 60 * 60,
        }
    }
}

impl MarketConfig {
    // Clamped so an unvalidated config can never overflow chrono
    pub fn auction_horizon(&self) -> Duration {
        bounded(self.auction_horizon_secs)
    }

    pub fn clause_extension(&self) -> Duration {
        bounded(self.clause_extension_secs)
    }

    pub fn sale_window(&self) -> Duration {
        bounded(self.sale_window_secs)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.auction_horizon_secs <= 0 {
            return Err("auction_horizon_secs must be positive".to_string());
        }
        if self.clause_extension_secs < 0 {
            return Err("clause_extension_secs cannot be negative".to_string());
        }
        if self.sale_window_secs <= 0 {
            return Err("sale_window_secs must be positive".to_string());
        }
        for (name, secs) in [
            ("auction_horizon_secs", self.auction_horizon_secs),
            ("clause_extension_secs", self.clause_extension_secs),
            ("sale_window_secs", self.sale_window_secs),
        ] {
            if secs > MAX_DURATION_SECS {
                return Err(format!("{} cannot exceed {} seconds", name, MAX_DURATION_SECS));
            }
        }
        Ok(())
    }
}

fn bounded(secs: i64) -> Duration {
    Duration::seconds(secs.clamp(0, MAX_DURATION_SECS))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = MarketConfig::default();
        assert_eq!(config.auction_horizon(), Duration::hours(24));
        assert_eq!(config.clause_extension(), Duration::days(14));
        assert_eq!(config.sale_window(), Duration::hours(72));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_horizon_rejected() {
        let config = MarketConfig { auction_horizon_secs: 0, ..MarketConfig::default() };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_oversized_durations_rejected_and_clamped() {
        let config = MarketConfig { auction_horizon_secs: i64::MAX / 2, ..MarketConfig::default() };
        assert!(config.validate().is_err());
        assert_eq!(config.auction_horizon(), Duration::seconds(MAX_DURATION_SECS));

        let config = MarketConfig { clause_extension_secs: MAX_DURATION_SECS + 1, ..MarketConfig::default() };
        assert!(config.validate().is_err());
    }
}
