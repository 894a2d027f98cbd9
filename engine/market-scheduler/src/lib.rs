//! # Market Scheduler
//!
//! Rotates each league's market pool and settles finished auctions in bulk.
//!
//! - **pool**: random selection of free assets for a market cycle
//! - **MarketRotator**: refresh, settle-and-rotate, operator rotation,
//!   league seeding and the self-healing market view
//! - **MarketScheduler**: background task sweeping every league on a fixed
//!   interval through a [`LeagueSweeper`]

pub mod config;
pub mod error;
pub mod pool;
pub mod rotation;
pub mod scheduler;

#[cfg(test)]
mod integration_tests;

pub use config::{SchedulerConfig, SweepAction};
pub use error::{Result, SchedulerError};
pub use rotation::{
    CatalogEntry, MarketListing, MarketRotator, MarketView, RefreshReport, RotationReport,
    SeedReport,
};
pub use scheduler::{run_sweep_once, LeagueSweeper, MarketScheduler, SweepSummary};
