//! Scheduler configuration

use crate::error::{Result, SchedulerError};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Longest accepted sweep interval (one year)
pub const MAX_SWEEP_INTERVAL_SECS: u64 = 365 * 24 * 60 * 60;

/// What the periodic sweep does for each league
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SweepAction {
    /// Settle expired auctions, purge the league's auctions, then refresh
    SettleAndRotate,
    /// Refresh the pool only; expired auctions wait for manual settlement
    RefreshOnly,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Assets placed in the market per rotation
    pub market_size: usize,
    pub sweep_interval_secs: u64,
    pub sweep_action: SweepAction,
    /// How long `stop` waits for an in-flight sweep
    pub shutdown_timeout_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            market_size: 8,
            sweep_interval_secs: 24 * 60 * 60,
            sweep_action: SweepAction::SettleAndRotate,
            shutdown_timeout_secs: 30,
        }
    }
}

impl SchedulerConfig {
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }

    pub fn validate(&self) -> Result<()> {
        if self.market_size == 0 {
            return Err(SchedulerError::InvalidConfig {
                message: "market_size must be greater than 0".to_string(),
            });
        }
        if self.sweep_interval_secs == 0 {
            return Err(SchedulerError::InvalidConfig {
                message: "sweep_interval_secs must be greater than 0".to_string(),
            });
        }
        if self.sweep_interval_secs > MAX_SWEEP_INTERVAL_SECS {
            return Err(SchedulerError::InvalidConfig {
                message: format!("sweep_interval_secs cannot exceed {}", MAX_SWEEP_INTERVAL_SECS),
            });
        }
        Ok(())
    }
}
