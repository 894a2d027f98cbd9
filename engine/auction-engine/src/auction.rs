//! Auction engine: bid collection and settlement

use crate::clock::Clock;
use crate::config::MarketConfig;
use crate::error::{MarketError, Result};
use crate::ledger;
use chrono::{DateTime, Utc};
use league_store::{
    AssetKey, Auction, AuctionId, Bid, Clause, LeagueId, MarketStore, PlayerId,
};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

/// Result of a successful settlement
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Settlement {
    pub auction_id: AuctionId,
    #[serde(flatten)]
    pub key: AssetKey,
    pub winner_id: PlayerId,
    pub amount: i64,
    pub clause: Clause,
    pub balance_after: i64,
}

/// What settling a finished auction did
///
/// Every variant other than `Settled` leaves ownership and balances untouched;
/// the auction is still marked settled so it cannot be claimed twice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SettlementOutcome {
    Settled(Settlement),
    /// No bids were placed
    Abandoned { auction_id: AuctionId },
    /// Winner could not cover the winning amount
    Unaffordable { auction_id: AuctionId, winner_id: PlayerId, required: i64, available: i64 },
    /// Asset already belongs to a player other than the winner
    AssetUnavailable { auction_id: AuctionId, owner: PlayerId },
    /// Winner no longer has a membership in the league
    MembershipMissing { auction_id: AuctionId, winner_id: PlayerId },
}

impl SettlementOutcome {
    pub fn is_settled(&self) -> bool {
        matches!(self, SettlementOutcome::Settled(_))
    }
}

/// Collects bids and settles finished auctions against the store
#[derive(Clone)]
pub struct AuctionEngine {
    store: Arc<dyn MarketStore>,
    clock: Arc<dyn Clock>,
    config: MarketConfig,
}

impl AuctionEngine {
    pub fn new(store: Arc<dyn MarketStore>, clock: Arc<dyn Clock>, config: MarketConfig) -> Self {
        Self { store, clock, config }
    }

    pub fn store(&self) -> &Arc<dyn MarketStore> {
        &self.store
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub fn config(&self) -> &MarketConfig {
        &self.config
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Records the player's bid on the asset's live auction, opening one if
    /// none is live. Balances are not checked until settlement.
    pub async fn place_bid(&self, key: AssetKey, player_id: PlayerId, amount: i64) -> Result<AuctionId> {
        if amount <= 0 {
            return Err(MarketError::validation("amount must be positive"));
        }
        if player_id <= 0 {
            return Err(MarketError::validation("player_id must be positive"));
        }
        // Only league members may bid
        if self.store.ledger(key.league_id, player_id).await?.is_none() {
            return Err(MarketError::MembershipNotFound { league_id: key.league_id, player_id });
        }

        let now = self.now();
        let mut tx = self.store.begin().await?;

        // Asset lock serializes every bidder on this asset
        if tx.asset_for_update(key).await?.is_none() {
            return Err(MarketError::AssetNotFound { key });
        }

        // Join the live auction or open one
        let auction = match tx.active_auction_for_update(key, now).await? {
            Some(auction) => auction,
            None => {
                let auction = tx.insert_auction(key, now + self.config.auction_horizon()).await?;
                info!("Opened auction {} for {} on first bid", auction.id, key);
                auction
            }
        };

        // Replaces the player's previous bid in place
        tx.put_bid(auction.id, Bid { player_id, amount }).await?;
        tx.commit().await?;

        metrics::increment_counter!("market_bids_placed_total");
        info!("Player {} bid {} on {} (auction {})", player_id, amount, key, auction.id);
        Ok(auction.id)
    }

    /// Drops the player's bid from the live auction. Returns `false` when
    /// there was nothing to remove.
    pub async fn remove_bid(&self, key: AssetKey, player_id: PlayerId) -> Result<bool> {
        let now = self.now();
        let mut tx = self.store.begin().await?;

        if tx.asset_for_update(key).await?.is_none() {
            return Ok(false);
        }
        let Some(auction) = tx.active_auction_for_update(key, now).await? else {
            return Ok(false);
        };

        let removed = tx.delete_bid(auction.id, player_id).await?;
        tx.commit().await?;

        if removed {
            info!("Player {} withdrew bid on {} (auction {})", player_id, key, auction.id);
        }
        Ok(removed)
    }

    /// Ensures the asset has a live auction. Returns the auction id and
    /// whether it was created by this call.
    pub async fn open_auction(&self, key: AssetKey) -> Result<(AuctionId, bool)> {
        let now = self.now();
        let mut tx = self.store.begin().await?;

        if tx.asset_for_update(key).await?.is_none() {
            return Err(MarketError::AssetNotFound { key });
        }

        if let Some(existing) = tx.active_auction_for_update(key, now).await? {
            return Ok((existing.id, false));
        }

        let auction = tx.insert_auction(key, now + self.config.auction_horizon()).await?;
        tx.commit().await?;
        Ok((auction.id, true))
    }

    /// Claims a finished auction and transfers the asset to the highest bidder.
    ///
    /// Errors are reserved for auctions that cannot be claimed at all; bids
    /// that cannot be honoured come back as non-`Settled` outcomes.
    pub async fn settle(&self, auction_id: AuctionId) -> Result<SettlementOutcome> {
        let key = match self.store.auction(auction_id).await? {
            Some(auction) => auction.key(),
            None => return Err(MarketError::AuctionNotFound { auction_id }),
        };

        let now = self.now();
        let mut tx = self.store.begin().await?;

        // Lock order: asset, then auction, then ledger
        let Some(mut asset) = tx.asset_for_update(key).await? else {
            return Err(MarketError::AssetNotFound { key });
        };
        let Some(auction) = tx.auction_for_update(auction_id).await? else {
            return Err(MarketError::AuctionNotFound { auction_id });
        };

        // Re-checked under the lock; a concurrent settle may have won
        if auction.is_settled() {
            return Err(MarketError::AuctionAlreadySettled { auction_id });
        }
        if auction.is_active(now) {
            return Err(MarketError::AuctionNotFinished { auction_id });
        }

        // Claim the auction; every outcome below commits this marker
        tx.mark_settled(auction_id, now).await?;

        let Some(&Bid { player_id: winner_id, amount }) = auction.bids.highest() else {
            tx.commit().await?;
            metrics::increment_counter!("market_auctions_skipped_total", "reason" => "abandoned");
            info!("Auction {} for {} closed without bids", auction_id, key);
            return Ok(SettlementOutcome::Abandoned { auction_id });
        };

        // Someone else got the asset in the meantime
        if let Some(owner) = asset.owner.filter(|owner| *owner != winner_id) {
            tx.commit().await?;
            metrics::increment_counter!("market_auctions_skipped_total", "reason" => "unavailable");
            warn!("Auction {} skipped: {} already owned by player {}", auction_id, key, owner);
            return Ok(SettlementOutcome::AssetUnavailable { auction_id, owner });
        }

        let Some(mut ledger) = tx.ledger_for_update(key.league_id, winner_id).await? else {
            tx.commit().await?;
            metrics::increment_counter!("market_auctions_skipped_total", "reason" => "membership");
            warn!("Auction {} skipped: winner {} has no membership", auction_id, winner_id);
            return Ok(SettlementOutcome::MembershipMissing { auction_id, winner_id });
        };

        // No escrow, so funds are only checked now
        if ledger.balance < amount {
            let available = ledger.balance;
            tx.commit().await?;
            metrics::increment_counter!("market_auctions_skipped_total", "reason" => "funds");
            warn!(
                "Auction {} skipped: winner {} bid {} with balance {}",
                auction_id, winner_id, amount, available
            );
            return Ok(SettlementOutcome::Unaffordable {
                auction_id,
                winner_id,
                required: amount,
                available,
            });
        }

        // Clause never drops below an earlier one
        let clause = Clause {
            value: asset.clause.map_or(amount, |existing| existing.value.max(amount)),
            expires_at: auction.ends_at + self.config.clause_extension(),
        };
        asset.clause = Some(clause);

        // Debit, ownership list, owner pointer and history in one commit
        ledger::acquire(tx.as_mut(), &mut asset, &mut ledger, amount, now).await?;
        tx.commit().await?;

        metrics::increment_counter!("market_auctions_settled_total");
        info!("Auction {} settled: player {} won {} for {}", auction_id, winner_id, key, amount);

        Ok(SettlementOutcome::Settled(Settlement {
            auction_id,
            key,
            winner_id,
            amount,
            clause,
            balance_after: ledger.balance,
        }))
    }

    /// Manual settlement: every outcome other than a transfer is an error.
    pub async fn settle_finished(&self, auction_id: AuctionId) -> Result<Settlement> {
        match self.settle(auction_id).await? {
            SettlementOutcome::Settled(settlement) => Ok(settlement),
            SettlementOutcome::Abandoned { auction_id } => Err(MarketError::NoBids { auction_id }),
            SettlementOutcome::Unaffordable { required, available, .. } => {
                Err(MarketError::InsufficientFunds { required, available })
            }
            SettlementOutcome::AssetUnavailable { owner, .. } => {
                Err(MarketError::AssetUnavailable { key: self.auction_key(auction_id).await?, owner })
            }
            SettlementOutcome::MembershipMissing { winner_id, .. } => {
                let key = self.auction_key(auction_id).await?;
                Err(MarketError::MembershipNotFound { league_id: key.league_id, player_id: winner_id })
            }
        }
    }

    async fn auction_key(&self, auction_id: AuctionId) -> Result<AssetKey> {
        self.store
            .auction(auction_id)
            .await?
            .map(|auction| auction.key())
            .ok_or(MarketError::AuctionNotFound { auction_id })
    }

    /// Live auctions in the league keyed by asset
    pub async fn live_auctions(&self, league_id: LeagueId) -> Result<HashMap<AssetKey, Auction>> {
        let now = self.now();
        let mut live: HashMap<AssetKey, Auction> = HashMap::new();
        for auction in self.store.auctions(league_id).await? {
            if !auction.is_active(now) {
                continue;
            }
            // Keep the latest-ending auction per asset
            match live.get(&auction.key()) {
                Some(current) if current.ends_at >= auction.ends_at => {}
                _ => {
                    live.insert(auction.key(), auction);
                }
            }
        }
        Ok(live)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use chrono::Duration;
    use league_store::{Asset, AssetKind, InMemoryStore, NewAsset, TransferKind};

    struct Harness {
        store: Arc<InMemoryStore>,
        clock: Arc<ManualClock>,
        engine: AuctionEngine,
        asset: Asset,
    }

    async fn harness() -> Harness {
        let store = Arc::new(InMemoryStore::new());
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let engine = AuctionEngine::new(store.clone(), clock.clone(), MarketConfig::default());
        let asset = store
            .seed_assets(&[NewAsset { league_id: 1, kind: AssetKind::Pilot, catalog_id: 1, value: 2_000 }])
            .await
            .unwrap()
            .remove(0);
        for player in [1, 2, 3] {
            store.create_membership(1, player, 1_000).await.unwrap();
        }
        Harness { store, clock, engine, asset }
    }

    #[tokio::test]
    async fn test_first_bid_opens_single_auction() {
        let h = harness().await;
        let first = h.engine.place_bid(h.asset.key(), 1, 100).await.unwrap();
        let second = h.engine.place_bid(h.asset.key(), 2, 120).await.unwrap();
        let again = h.engine.place_bid(h.asset.key(), 1, 130).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(first, again);

        let auctions = h.store.auctions(1).await.unwrap();
        assert_eq!(auctions.len(), 1);
        assert_eq!(auctions[0].ends_at, h.clock.now() + Duration::hours(24));
        let bids: Vec<_> = auctions[0].bids.iter().map(|b| (b.player_id, b.amount)).collect();
        assert_eq!(bids, vec![(1, 130), (2, 120)]);
    }

    #[tokio::test]
    async fn test_bid_validation() {
        let h = harness().await;
        assert!(matches!(
            h.engine.place_bid(h.asset.key(), 1, 0).await,
            Err(MarketError::Validation { .. })
        ));
        assert!(matches!(
            h.engine.place_bid(h.asset.key(), 99, 10).await,
            Err(MarketError::MembershipNotFound { player_id: 99, .. })
        ));
        let missing = AssetKey::new(1, AssetKind::Constructor, 404);
        assert!(matches!(
            h.engine.place_bid(missing, 1, 10).await,
            Err(MarketError::AssetNotFound { .. })
        ));
        assert!(h.store.auctions(1).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_remove_bid_is_noop_when_missing() {
        let h = harness().await;
        assert!(!h.engine.remove_bid(h.asset.key(), 1).await.unwrap());

        h.engine.place_bid(h.asset.key(), 1, 100).await.unwrap();
        assert!(h.engine.remove_bid(h.asset.key(), 1).await.unwrap());
        assert!(!h.engine.remove_bid(h.asset.key(), 1).await.unwrap());
    }

    #[tokio::test]
    async fn test_bid_after_expiry_opens_new_auction() {
        let h = harness().await;
        let first = h.engine.place_bid(h.asset.key(), 1, 100).await.unwrap();
        h.clock.advance(Duration::hours(24));
        let second = h.engine.place_bid(h.asset.key(), 1, 100).await.unwrap();
        assert_ne!(first, second);
        assert_eq!(h.engine.live_auctions(1).await.unwrap()[&h.asset.key()].id, second);
    }

    #[tokio::test]
    async fn test_settle_before_end_is_rejected() {
        let h = harness().await;
        let id = h.engine.place_bid(h.asset.key(), 1, 100).await.unwrap();
        assert!(matches!(
            h.engine.settle(id).await,
            Err(MarketError::AuctionNotFinished { .. })
        ));
        assert!(!h.store.auction(id).await.unwrap().unwrap().is_settled());
    }

    #[tokio::test]
    async fn test_tie_goes_to_first_bid_in_stored_order() {
        let h = harness().await;
        let key = h.asset.key();
        h.engine.place_bid(key, 1, 100).await.unwrap();
        h.engine.place_bid(key, 2, 150).await.unwrap();
        let id = h.engine.place_bid(key, 3, 150).await.unwrap();

        h.clock.advance(Duration::hours(24));
        let settlement = h.engine.settle_finished(id).await.unwrap();

        assert_eq!(settlement.winner_id, 2);
        assert_eq!(settlement.amount, 150);
        assert_eq!(h.store.ledger(1, 1).await.unwrap().unwrap().balance, 1_000);
        assert_eq!(h.store.ledger(1, 2).await.unwrap().unwrap().balance, 850);
        assert_eq!(h.store.ledger(1, 3).await.unwrap().unwrap().balance, 1_000);

        let owner = h.store.asset(key).await.unwrap().unwrap().owner;
        assert_eq!(owner, Some(2));
    }

    #[tokio::test]
    async fn test_settlement_sets_clause_and_history() {
        let h = harness().await;
        let id = h.engine.place_bid(h.asset.key(), 1, 400).await.unwrap();
        let ends_at = h.store.auction(id).await.unwrap().unwrap().ends_at;

        h.clock.advance(Duration::hours(30));
        let settlement = h.engine.settle_finished(id).await.unwrap();

        assert_eq!(settlement.clause, Clause { value: 400, expires_at: ends_at + Duration::days(14) });
        let asset = h.store.asset(h.asset.key()).await.unwrap().unwrap();
        assert_eq!(asset.clause, Some(settlement.clause));

        let ledger = h.store.ledger(1, 1).await.unwrap().unwrap();
        assert_eq!(ledger.team_value, 2_000);
        assert!(ledger.owned.contains(AssetKind::Pilot, h.asset.id));

        let history = h.store.transfers(1).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].kind, TransferKind::Acquisition);
        assert_eq!(history[0].amount, 400);

        assert!(matches!(
            h.engine.settle(id).await,
            Err(MarketError::AuctionAlreadySettled { .. })
        ));
    }

    #[tokio::test]
    async fn test_empty_auction_changes_nothing() {
        let h = harness().await;
        let (id, created) = h.engine.open_auction(h.asset.key()).await.unwrap();
        assert!(created);
        assert_eq!(h.engine.open_auction(h.asset.key()).await.unwrap(), (id, false));

        h.clock.advance(Duration::hours(24));
        let before = h.store.ledgers(1).await.unwrap();
        assert_eq!(h.engine.settle(id).await.unwrap(), SettlementOutcome::Abandoned { auction_id: id });

        assert_eq!(h.store.ledgers(1).await.unwrap(), before);
        assert_eq!(h.store.asset(h.asset.key()).await.unwrap().unwrap().owner, None);
        assert!(h.store.transfers(1).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unaffordable_winner_is_skipped() {
        let h = harness().await;
        let id = h.engine.place_bid(h.asset.key(), 1, 5_000).await.unwrap();
        h.clock.advance(Duration::hours(24));

        let err = h.engine.settle_finished(id).await.unwrap_err();
        assert!(matches!(err, MarketError::InsufficientFunds { required: 5_000, available: 1_000 }));

        assert_eq!(h.store.ledger(1, 1).await.unwrap().unwrap().balance, 1_000);
        assert_eq!(h.store.asset(h.asset.key()).await.unwrap().unwrap().owner, None);
        assert!(h.store.auction(id).await.unwrap().unwrap().is_settled());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_bids_share_one_auction() {
        let h = harness().await;
        for player in 4..=20 {
            h.store.create_membership(1, player, 1_000).await.unwrap();
        }

        // every bidder races to open the auction
        let handles: Vec<_> = (1..=20)
            .map(|player| {
                let engine = h.engine.clone();
                let key = h.asset.key();
                tokio::spawn(async move { engine.place_bid(key, player, 10 * player).await })
            })
            .collect();

        let mut ids = Vec::new();
        for handle in handles {
            ids.push(handle.await.unwrap().unwrap());
        }
        ids.dedup();
        assert_eq!(ids.len(), 1);

        let auctions = h.store.auctions(1).await.unwrap();
        assert_eq!(auctions.len(), 1);
        assert_eq!(auctions[0].bids.iter().count(), 20);
        assert_eq!(auctions[0].bids.highest().map(|b| b.player_id), Some(20));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_settles_debit_once() {
        let h = harness().await;
        let id = h.engine.place_bid(h.asset.key(), 1, 100).await.unwrap();
        h.clock.advance(Duration::hours(24));

        let handles: Vec<_> = (0..10)
            .map(|_| {
                let engine = h.engine.clone();
                tokio::spawn(async move { engine.settle(id).await })
            })
            .collect();

        let mut settled = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(outcome) if outcome.is_settled() => settled += 1,
                Err(MarketError::AuctionAlreadySettled { .. }) => {}
                other => panic!("unexpected settle result: {:?}", other),
            }
        }

        assert_eq!(settled, 1);
        assert_eq!(h.store.ledger(1, 1).await.unwrap().unwrap().balance, 900);
        assert_eq!(h.store.transfers(1).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_oversized_horizon_is_clamped() {
        let h = harness().await;
        let config = MarketConfig { auction_horizon_secs: i64::MAX / 2, ..MarketConfig::default() };
        let engine = AuctionEngine::new(h.store.clone(), h.clock.clone(), config);

        let id = engine.place_bid(h.asset.key(), 1, 100).await.unwrap();
        let ends_at = h.store.auction(id).await.unwrap().unwrap().ends_at;
        assert_eq!(ends_at, h.clock.now() + Duration::seconds(crate::config::MAX_DURATION_SECS));
    }

    #[test]
    fn test_outcome_is_tagged_in_json() {
        let json = serde_json::to_value(SettlementOutcome::Abandoned { auction_id: 12 }).unwrap();
        assert_eq!(json, serde_json::json!({ "outcome": "abandoned", "auction_id": 12 }));
    }
}
