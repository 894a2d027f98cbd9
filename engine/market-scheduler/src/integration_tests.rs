//! End-to-end tests: store + auction engine + rotation on an in-memory league
//! with a manually driven clock

use std::sync::Arc;

use auction_engine::{AuctionEngine, Clock, ManualClock, MarketConfig};
use chrono::{Duration, Utc};
use league_store::{AssetKind, InMemoryStore, MarketStore};
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::config::SchedulerConfig;
use crate::rotation::{CatalogEntry, MarketRotator};

const LEAGUE: i64 = 11;

struct TestLeague {
    store: Arc<InMemoryStore>,
    clock: Arc<ManualClock>,
    rotator: MarketRotator,
}

fn catalog(count: i64) -> Vec<CatalogEntry> {
    (1..=count)
        .map(|id| CatalogEntry { kind: AssetKind::ALL[(id % 4) as usize], catalog_id: id, value: 1_000_000 })
        .collect()
}

async fn create_league(assets: i64, members: &[(i64, i64)]) -> TestLeague {
    let store = Arc::new(InMemoryStore::new());
    let clock = Arc::new(ManualClock::new(Utc::now()));
    let engine = AuctionEngine::new(store.clone(), clock.clone(), MarketConfig::default());
    let rotator = MarketRotator::new(engine, SchedulerConfig::default());

    rotator.seed_league(LEAGUE, &catalog(assets)).await.unwrap();
    for (player, balance) in members {
        store.create_membership(LEAGUE, *player, *balance).await.unwrap();
    }
    TestLeague { store, clock, rotator }
}

async fn in_market_count(store: &InMemoryStore) -> usize {
    store.slots(LEAGUE).await.unwrap().iter().filter(|s| s.in_market).count()
}

#[cfg(test)]
#[allow(clippy::module_inception)]
mod integration_tests {
    use super::*;
    use crate::scheduler::{run_sweep_once, LeagueSweeper};
    use auction_engine::ledger;
    use league_store::TransferKind;

    #[tokio::test]
    async fn test_bid_expire_sweep_end_to_end() {
        let league = create_league(12, &[(1, 100_000_000), (2, 100_000_000)]).await;

        let view = league.rotator.market_view(LEAGUE).await.unwrap();
        assert_eq!(view.listings.len(), 8);
        let target = &view.listings[0];
        let key = league_store::AssetKey::new(LEAGUE, target.asset_kind, target.asset_id);

        let auction_id = league.rotator.engine().place_bid(key, 1, 5_000_000).await.unwrap();
        assert_eq!(Some(auction_id), target.auction_id);
        let ends_at = league.store.auction(auction_id).await.unwrap().unwrap().ends_at;

        league.clock.advance(Duration::hours(24));
        let summary = run_sweep_once(&league.rotator).await.unwrap();
        assert_eq!(summary.settled, 1);
        assert!(summary.failed_leagues.is_empty());

        let ledger = league.store.ledger(LEAGUE, 1).await.unwrap().unwrap();
        assert_eq!(ledger.balance, 95_000_000);
        assert!(ledger.owned.contains(key.kind, key.asset_id));
        assert_eq!(ledger.team_value, 1_000_000);

        let asset = league.store.asset(key).await.unwrap().unwrap();
        assert_eq!(asset.owner, Some(1));
        let clause = asset.clause.unwrap();
        assert_eq!(clause.value, 5_000_000);
        assert_eq!(clause.expires_at, ends_at + Duration::days(14));

        let history = league.store.transfers(LEAGUE).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].kind, TransferKind::Acquisition);
        assert_eq!(history[0].counterparty_id, 0);

        // the rotation purged old auctions and picked a new market without the sold asset
        let auctions = league.store.auctions(LEAGUE).await.unwrap();
        assert_eq!(auctions.len(), 8);
        assert!(auctions.iter().all(|a| a.is_active(league.clock.now())));
        assert_eq!(in_market_count(&league.store).await, 8);
        let view = league.rotator.market_view(LEAGUE).await.unwrap();
        assert!(view.listings.iter().all(|l| l.owner_id.is_none()));

        assert!(ledger::audit(league.store.as_ref(), LEAGUE).await.unwrap().is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_manual_settle_racing_sweep_transfers_once() {
        let league = create_league(12, &[(1, 10_000_000)]).await;
        let view = league.rotator.market_view(LEAGUE).await.unwrap();
        let target = &view.listings[0];
        let key = league_store::AssetKey::new(LEAGUE, target.asset_kind, target.asset_id);

        let auction_id = league.rotator.engine().place_bid(key, 1, 2_000_000).await.unwrap();
        league.clock.advance(Duration::hours(24));

        let manual: Vec<_> = (0..5)
            .map(|_| {
                let engine = league.rotator.engine().clone();
                tokio::spawn(async move { engine.settle(auction_id).await })
            })
            .collect();
        let sweep = {
            let rotator = league.rotator.clone();
            tokio::spawn(async move { rotator.settle_expired_and_rotate(LEAGUE).await })
        };

        let report = sweep.await.unwrap().unwrap();
        let mut settled = report.settled;
        for handle in manual {
            // a settle that lands after the purge no longer finds the auction
            match handle.await.unwrap() {
                Ok(outcome) if outcome.is_settled() => settled += 1,
                Err(auction_engine::MarketError::AuctionAlreadySettled { .. })
                | Err(auction_engine::MarketError::AuctionNotFound { .. }) => {}
                other => panic!("unexpected settle result: {:?}", other),
            }
        }

        assert_eq!(settled, 1);
        assert_eq!(report.failed, 0);
        let ledger = league.store.ledger(LEAGUE, 1).await.unwrap().unwrap();
        assert_eq!(ledger.balance, 8_000_000);
        let history = league.store.transfers(LEAGUE).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].kind, TransferKind::Acquisition);
        assert!(ledger::audit(league.store.as_ref(), LEAGUE).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_refresh_places_min_of_size_and_free_assets() {
        let league = create_league(5, &[]).await;
        assert_eq!(in_market_count(&league.store).await, 5);

        let league = create_league(30, &[]).await;
        let mut rng = StdRng::seed_from_u64(3);
        let report = league.rotator.refresh_market_with_rng(LEAGUE, &mut rng).await.unwrap();
        assert_eq!(report.selected.len(), 8);
        assert_eq!(in_market_count(&league.store).await, 8);
        assert_eq!(report.next_refresh_at, league.clock.now() + Duration::hours(24));
    }

    #[tokio::test]
    async fn test_rotation_survives_unaffordable_winner() {
        let league = create_league(10, &[(1, 100), (2, 10_000)]).await;
        let view = league.rotator.market_view(LEAGUE).await.unwrap();
        let keys: Vec<_> = view
            .listings
            .iter()
            .map(|l| league_store::AssetKey::new(LEAGUE, l.asset_kind, l.asset_id))
            .collect();

        league.rotator.engine().place_bid(keys[0], 1, 5_000).await.unwrap();
        league.rotator.engine().place_bid(keys[1], 2, 5_000).await.unwrap();

        league.clock.advance(Duration::hours(25));
        let report = league.rotator.settle_expired_and_rotate(LEAGUE).await.unwrap();

        assert_eq!(report.settled, 1);
        assert_eq!(report.skipped, 1);
        assert_eq!(report.abandoned, 6);
        assert_eq!(report.failed, 0);
        assert_eq!(report.auctions_deleted, 8);
        assert_eq!(report.refresh.selected.len(), 8);

        assert_eq!(league.store.ledger(LEAGUE, 1).await.unwrap().unwrap().balance, 100);
        assert_eq!(league.store.ledger(LEAGUE, 2).await.unwrap().unwrap().balance, 5_000);
    }

    #[tokio::test]
    async fn test_market_view_heals_empty_market() {
        let league = create_league(10, &[]).await;
        league.store.replace_in_market(LEAGUE, &[]).await.unwrap();
        assert_eq!(in_market_count(&league.store).await, 0);

        let view = league.rotator.market_view(LEAGUE).await.unwrap();
        assert_eq!(view.listings.len(), 8);
        assert!(view.listings.iter().all(|l| l.auction_id.is_some() && l.bid_count == 0));
    }

    #[tokio::test]
    async fn test_market_view_sweeps_when_rotation_is_overdue() {
        let league = create_league(10, &[(1, 1_000_000)]).await;
        let view = league.rotator.market_view(LEAGUE).await.unwrap();
        let key = league_store::AssetKey::new(LEAGUE, view.listings[0].asset_kind, view.listings[0].asset_id);
        league.rotator.engine().place_bid(key, 1, 250_000).await.unwrap();

        league.clock.advance(Duration::hours(24));
        let view = league.rotator.market_view(LEAGUE).await.unwrap();

        assert_eq!(league.store.asset(key).await.unwrap().unwrap().owner, Some(1));
        assert!(view.next_refresh_at.unwrap() > league.clock.now());
    }

    #[tokio::test]
    async fn test_force_rotate_discards_bids_without_settling() {
        let league = create_league(10, &[(1, 1_000_000)]).await;
        let view = league.rotator.market_view(LEAGUE).await.unwrap();
        let key = league_store::AssetKey::new(LEAGUE, view.listings[0].asset_kind, view.listings[0].asset_id);
        league.rotator.engine().place_bid(key, 1, 250_000).await.unwrap();

        let report = league.rotator.force_rotate(LEAGUE).await.unwrap();
        assert_eq!(report.auctions_deleted, 8);
        assert_eq!(report.settled, 0);

        assert_eq!(league.store.ledger(LEAGUE, 1).await.unwrap().unwrap().balance, 1_000_000);
        assert!(league.store.asset(key).await.unwrap().unwrap().is_free_agent());
        assert_eq!(league.store.auctions(LEAGUE).await.unwrap().len(), 8);
    }

    #[tokio::test]
    async fn test_seeding_twice_does_not_duplicate_assets() {
        let league = create_league(6, &[]).await;
        let report = league.rotator.seed_league(LEAGUE, &catalog(6)).await.unwrap();
        assert_eq!(report.assets_created, 0);
        assert_eq!(league.store.assets(LEAGUE).await.unwrap().len(), 6);
        assert_eq!(league.rotator.league_ids().await.unwrap(), vec![LEAGUE]);
    }
}
