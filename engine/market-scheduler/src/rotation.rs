//! Per-league market rotation
//!
//! Settlement failures never stop a rotation: every league leaves a sweep
//! with a freshly populated market.

use crate::config::{SchedulerConfig, SweepAction, MAX_SWEEP_INTERVAL_SECS};
use crate::error::Result;
use crate::pool;
use crate::scheduler::LeagueSweeper;
use auction_engine::{AuctionEngine, MarketError, SettlementOutcome};
use chrono::{DateTime, Duration, Utc};
use league_store::{
    Asset, AssetKey, AssetKind, AuctionId, CatalogId, Clause, LeagueId, MarketStore, NewAsset,
    PlayerId, PriceWindow,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Outcome of placing a new selection in the market
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RefreshReport {
    pub league_id: LeagueId,
    pub selected: Vec<AssetKey>,
    pub auctions_opened: usize,
    pub next_refresh_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RotationReport {
    pub league_id: LeagueId,
    pub settled: usize,
    pub abandoned: usize,
    /// Finished auctions whose winning bid could not be honoured
    pub skipped: usize,
    pub failed: usize,
    pub auctions_deleted: u64,
    pub refresh: RefreshReport,
}

impl RotationReport {
    fn refresh_only(refresh: RefreshReport) -> Self {
        Self {
            league_id: refresh.league_id,
            settled: 0,
            abandoned: 0,
            skipped: 0,
            failed: 0,
            auctions_deleted: 0,
            refresh,
        }
    }
}

/// Catalog entity to copy into a league
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub kind: AssetKind,
    pub catalog_id: CatalogId,
    pub value: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SeedReport {
    pub league_id: LeagueId,
    pub assets_created: usize,
    pub refresh: RefreshReport,
}

/// One in-market asset as shown to league members
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MarketListing {
    pub asset_kind: AssetKind,
    pub asset_id: i64,
    pub catalog_id: CatalogId,
    pub value: i64,
    pub owner_id: Option<PlayerId>,
    pub clause: Option<Clause>,
    pub sale: Option<PriceWindow>,
    pub auction_id: Option<AuctionId>,
    pub ends_at: Option<DateTime<Utc>>,
    pub bid_count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MarketView {
    pub league_id: LeagueId,
    pub next_refresh_at: Option<DateTime<Utc>>,
    pub listings: Vec<MarketListing>,
}

/// Rotates league markets on top of the auction engine
#[derive(Clone)]
pub struct MarketRotator {
    engine: AuctionEngine,
    config: SchedulerConfig,
}

impl MarketRotator {
    pub fn new(engine: AuctionEngine, config: SchedulerConfig) -> Self {
        Self { engine, config }
    }

    pub fn engine(&self) -> &AuctionEngine {
        &self.engine
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    fn store(&self) -> &Arc<dyn MarketStore> {
        self.engine.store()
    }

    fn refresh_interval(&self) -> Duration {
        Duration::seconds(self.config.sweep_interval_secs.min(MAX_SWEEP_INTERVAL_SECS) as i64)
    }

    /// Places a fresh random selection of free assets in the market and opens
    /// an auction for each of them.
    pub async fn refresh_market(&self, league_id: LeagueId) -> Result<RefreshReport> {
        let mut rng = StdRng::from_entropy();
        self.refresh_market_with_rng(league_id, &mut rng).await
    }

    pub async fn refresh_market_with_rng<R: Rng + Send>(
        &self,
        league_id: LeagueId,
        rng: &mut R,
    ) -> Result<RefreshReport> {
        // Load slots and assets so owned ones can be filtered out
        let slots = self.store().slots(league_id).await?;
        let assets: HashMap<AssetKey, Asset> = self
            .store()
            .assets(league_id)
            .await?
            .into_iter()
            .map(|asset| (asset.key(), asset))
            .collect();

        // Pick the new market and clear the previous selection
        let selected = pool::select_market(&slots, &assets, self.config.market_size, rng);
        self.store().replace_in_market(league_id, &selected).await?;

        // Open an auction for each listed asset; one failure does not stop the rest
        let mut auctions_opened = 0;
        for key in &selected {
            match self.engine.open_auction(*key).await {
                Ok((_, true)) => auctions_opened += 1,
                Ok((_, false)) => {}
                Err(e) => error!("Failed to open auction for {}: {}", key, e),
            }
        }

        // Schedule the next rotation
        let next_refresh_at = self.engine.now() + self.refresh_interval();
        self.store().set_next_refresh_at(league_id, next_refresh_at).await?;

        metrics::increment_counter!("market_refreshes_total");
        info!(
            "Refreshed market for league {}: {} assets in market, {} auctions opened",
            league_id,
            selected.len(),
            auctions_opened
        );

        Ok(RefreshReport { league_id, selected, auctions_opened, next_refresh_at })
    }

    /// Settles every finished auction, purges the league's auctions and
    /// refreshes the market.
    pub async fn settle_expired_and_rotate(&self, league_id: LeagueId) -> Result<RotationReport> {
        let expired = self.store().expired_auctions(league_id, self.engine.now()).await?;
        debug!("League {} has {} finished auctions", league_id, expired.len());

        let (mut settled, mut abandoned, mut skipped, mut failed) = (0, 0, 0, 0);
        for auction in expired {
            match self.engine.settle(auction.id).await {
                Ok(SettlementOutcome::Settled(_)) => settled += 1,
                Ok(SettlementOutcome::Abandoned { .. }) => abandoned += 1,
                Ok(outcome) => {
                    warn!("Auction {} not transferred: {:?}", auction.id, outcome);
                    skipped += 1;
                }
                Err(MarketError::AuctionAlreadySettled { .. }) => {
                    debug!("Auction {} was settled concurrently", auction.id);
                }
                Err(e) => {
                    error!("Failed to settle auction {}: {}", auction.id, e);
                    failed += 1;
                }
            }
        }

        // Purge everything, settled or not, before the new cycle
        let auctions_deleted = match self.store().delete_auctions(league_id).await {
            Ok(count) => count,
            Err(e) => {
                error!("Failed to purge auctions for league {}: {}", league_id, e);
                0
            }
        };

        let refresh = self.refresh_market(league_id).await?;

        metrics::increment_counter!("market_rotations_total");
        info!(
            "Rotated league {}: settled={} abandoned={} skipped={} failed={}",
            league_id, settled, abandoned, skipped, failed
        );

        Ok(RotationReport {
            league_id,
            settled,
            abandoned,
            skipped,
            failed,
            auctions_deleted,
            refresh,
        })
    }

    /// Operator rotation: discards every auction in the league, settled or
    /// not, then refreshes.
    pub async fn force_rotate(&self, league_id: LeagueId) -> Result<RotationReport> {
        let auctions_deleted = self.store().delete_auctions(league_id).await?;
        warn!("Purged {} auctions for league {} on operator rotation", auctions_deleted, league_id);

        let refresh = self.refresh_market(league_id).await?;
        Ok(RotationReport { auctions_deleted, ..RotationReport::refresh_only(refresh) })
    }

    /// Materializes the catalog inside a new league and opens its first market.
    pub async fn seed_league(&self, league_id: LeagueId, catalog: &[CatalogEntry]) -> Result<SeedReport> {
        let assets: Vec<NewAsset> = catalog
            .iter()
            .map(|entry| NewAsset {
                league_id,
                kind: entry.kind,
                catalog_id: entry.catalog_id,
                value: entry.value,
            })
            .collect();

        let created = self.store().seed_assets(&assets).await?;
        info!("Seeded league {} with {} assets", league_id, created.len());

        let refresh = self.refresh_market(league_id).await?;
        Ok(SeedReport { league_id, assets_created: created.len(), refresh })
    }

    /// Current market; refreshes first when the market is empty or its
    /// scheduled rotation has passed.
    pub async fn market_view(&self, league_id: LeagueId) -> Result<MarketView> {
        let now = self.engine.now();
        let slots = self.store().slots(league_id).await?;
        let in_market = slots.iter().filter(|slot| slot.in_market).count();
        let next_refresh_at = self.store().next_refresh_at(league_id).await?;

        if in_market == 0 && !slots.is_empty() {
            info!("League {} has an empty market, refreshing", league_id);
            self.refresh_market(league_id).await?;
        } else if next_refresh_at.is_some_and(|at| at <= now) {
            info!("League {} missed its rotation, sweeping on read", league_id);
            self.sweep_league(league_id).await?;
        }

        self.listings(league_id).await
    }

    async fn listings(&self, league_id: LeagueId) -> Result<MarketView> {
        let slots = self.store().slots(league_id).await?;
        let assets: HashMap<AssetKey, Asset> = self
            .store()
            .assets(league_id)
            .await?
            .into_iter()
            .map(|asset| (asset.key(), asset))
            .collect();
        let live = self.engine.live_auctions(league_id).await?;

        let listings = slots
            .iter()
            .filter(|slot| slot.in_market)
            .filter_map(|slot| assets.get(&slot.key()))
            .map(|asset| {
                let auction = live.get(&asset.key());
                MarketListing {
                    asset_kind: asset.kind,
                    asset_id: asset.id,
                    catalog_id: asset.catalog_id,
                    value: asset.value,
                    owner_id: asset.owner,
                    clause: asset.clause,
                    sale: asset.sale,
                    auction_id: auction.map(|a| a.id),
                    ends_at: auction.map(|a| a.ends_at),
                    bid_count: auction.map_or(0, |a| a.bids.len()),
                }
            })
            .collect();

        Ok(MarketView {
            league_id,
            next_refresh_at: self.store().next_refresh_at(league_id).await?,
            listings,
        })
    }
}

#[async_trait::async_trait]
impl LeagueSweeper for MarketRotator {
    async fn league_ids(&self) -> Result<Vec<LeagueId>> {
        Ok(self.store().league_ids().await?)
    }

    async fn sweep_league(&self, league_id: LeagueId) -> Result<RotationReport> {
        match self.config.sweep_action {
            SweepAction::SettleAndRotate => self.settle_expired_and_rotate(league_id).await,
            SweepAction::RefreshOnly => {
                Ok(RotationReport::refresh_only(self.refresh_market(league_id).await?))
            }
        }
    }
}
