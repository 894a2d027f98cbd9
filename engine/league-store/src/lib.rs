//! # League Store
//!
//! Storage for everything the fantasy market mutates: per-league assets, the
//! market pool, auctions with their bids, membership ledgers and the transfer
//! history.
//!
//! ## Architecture
//!
//! - **MarketStore**: abstract store with read helpers and transaction entry
//! - **MarketTx**: unit of work holding row locks until commit or drop
//! - **PgMarketStore**: PostgreSQL implementation
//! - **InMemoryStore**: process-local implementation for tests
//!
//! ## Usage
//!
//! ```rust
//! use league_store::{AssetKind, InMemoryStore, MarketStore, NewAsset};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = InMemoryStore::new();
//!     store
//!         .seed_assets(&[NewAsset { league_id: 1, kind: AssetKind::Pilot, catalog_id: 44, value: 2_000_000 }])
//!         .await?;
//!     store.create_membership(1, 7, 100_000_000).await?;
//!     assert_eq!(store.slots(1).await?.len(), 1);
//!     Ok(())
//! }
//! ```

pub mod backend;
pub mod config;
pub mod error;
pub mod memory;
pub mod model;
pub mod postgres;

pub use backend::{MarketStore, MarketTx};
pub use config::{DatabaseConfig, StoreBackend, StoreConfig};
pub use error::{Result, StoreError};
pub use memory::InMemoryStore;
pub use model::*;
pub use postgres::PgMarketStore;

pub use chrono::{DateTime, Utc};

use std::sync::Arc;

/// Builds the configured backend, applying migrations for PostgreSQL when enabled
pub async fn connect(config: &StoreConfig) -> Result<Arc<dyn MarketStore>> {
    config.validate()?;
    match config.backend {
        StoreBackend::Memory => {
            tracing::warn!("Using in-memory store; league state will not survive a restart");
            Ok(Arc::new(InMemoryStore::new()))
        }
        StoreBackend::Postgres => {
            let store = PgMarketStore::connect(&config.database).await?;
            if config.run_migrations {
                store.migrate().await?;
            }
            store.health_check().await?;
            Ok(Arc::new(store))
        }
    }
}
