//! Error types for the market scheduler

use auction_engine::MarketError;
use league_store::StoreError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, SchedulerError>;

#[derive(Error, Debug)]
pub enum SchedulerError {
    #[error("Market error: {0}")]
    Market(#[from] MarketError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },

    #[error("Scheduler is already running")]
    AlreadyRunning,
}

impl SchedulerError {
    /// Unwraps to the market error taxonomy so callers map one error type
    pub fn into_market(self) -> MarketError {
        match self {
            SchedulerError::Market(err) => err,
            SchedulerError::Store(err) => MarketError::Store(err),
            SchedulerError::InvalidConfig { message } => MarketError::validation(message),
            SchedulerError::AlreadyRunning => MarketError::validation("scheduler is already running"),
        }
    }
}
