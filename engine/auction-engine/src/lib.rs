//! # Auction Engine
//!
//! Bid collection and settlement for per-league fantasy markets, plus the
//! ownership ledger that every ownership change goes through.
//!
//! - **AuctionEngine**: place/remove bids, open auctions, settle finished ones
//! - **DirectSales**: owner listings and league buyout offers
//! - **ledger**: `transfer`, `acquire`, `release` and the ownership `audit`
//! - **Clock**: wall clock injected so tests can drive expiry

pub mod auction;
pub mod clock;
pub mod config;
pub mod error;
pub mod ledger;
pub mod sale;

pub use auction::{AuctionEngine, Settlement, SettlementOutcome};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::MarketConfig;
pub use error::{ErrorKind, MarketError, Result};
pub use ledger::Discrepancy;
pub use sale::DirectSales;
