//! Direct sales: an owner lists an asset, the league posts a buyout offer,
//! the owner accepts or rejects it.

use crate::clock::Clock;
use crate::config::MarketConfig;
use crate::error::{MarketError, Result};
use crate::ledger;
use chrono::{DateTime, Utc};
use league_store::{AssetKey, MarketStore, PlayerId, PriceWindow, TransferRecord};
use std::sync::Arc;
use tracing::info;

#[derive(Clone)]
pub struct DirectSales {
    store: Arc<dyn MarketStore>,
    clock: Arc<dyn Clock>,
    config: MarketConfig,
}

impl DirectSales {
    pub fn new(store: Arc<dyn MarketStore>, clock: Arc<dyn Clock>, config: MarketConfig) -> Self {
        Self { store, clock, config }
    }

    /// Marks an owned asset for sale. A new listing discards any offer made
    /// against an earlier one.
    pub async fn list_for_sale(&self, key: AssetKey, player_id: PlayerId, price: i64) -> Result<PriceWindow> {
        if price <= 0 {
            return Err(MarketError::validation("price must be positive"));
        }

        let now = self.clock.now();
        let mut tx = self.store.begin().await?;
        let Some(mut asset) = tx.asset_for_update(key).await? else {
            return Err(MarketError::AssetNotFound { key });
        };
        if asset.owner != Some(player_id) {
            return Err(MarketError::NotOwner { key, player_id });
        }

        // New listing replaces the old one and any offer on it
        let listing = PriceWindow { price, expires_at: now + self.config.sale_window() };
        asset.sale = Some(listing);
        asset.league_offer = None;
        tx.update_asset(&asset).await?;
        tx.commit().await?;

        info!("Player {} listed {} for {} until {}", player_id, key, price, listing.expires_at);
        Ok(listing)
    }

    /// Entry point for the external buyout process. The offer expires with
    /// the listing unless an earlier expiry is given.
    pub async fn post_league_offer(
        &self,
        key: AssetKey,
        price: i64,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<PriceWindow> {
        if price <= 0 {
            return Err(MarketError::validation("price must be positive"));
        }

        let now = self.clock.now();
        let mut tx = self.store.begin().await?;
        let Some(mut asset) = tx.asset_for_update(key).await? else {
            return Err(MarketError::AssetNotFound { key });
        };
        let listing = match asset.sale {
            Some(listing) if listing.is_open(now) && asset.owner.is_some() => listing,
            _ => return Err(MarketError::NotForSale { key }),
        };

        // Offer cannot outlive the listing
        let expires_at = expires_at.map_or(listing.expires_at, |at| at.min(listing.expires_at));
        if expires_at <= now {
            return Err(MarketError::validation("offer expiry must be in the future"));
        }

        let offer = PriceWindow { price, expires_at };
        asset.league_offer = Some(offer);
        tx.update_asset(&asset).await?;
        tx.commit().await?;

        info!("League offered {} for {}", price, key);
        Ok(offer)
    }

    /// Sells the asset to the league at the offered price.
    pub async fn accept_league_offer(&self, key: AssetKey, player_id: PlayerId) -> Result<TransferRecord> {
        let now = self.clock.now();
        let mut tx = self.store.begin().await?;
        let Some(mut asset) = tx.asset_for_update(key).await? else {
            return Err(MarketError::AssetNotFound { key });
        };
        if asset.owner != Some(player_id) {
            return Err(MarketError::NotOwner { key, player_id });
        }
        // Expired offers cannot be accepted
        let offer = match asset.league_offer {
            Some(offer) if offer.is_open(now) => offer,
            _ => return Err(MarketError::NoPendingOffer { key }),
        };
        let Some(mut membership) = tx.ledger_for_update(key.league_id, player_id).await? else {
            return Err(MarketError::MembershipNotFound { league_id: key.league_id, player_id });
        };

        // Sale closes the listing; asset returns to the free pool
        asset.sale = None;
        asset.league_offer = None;
        let record = ledger::release(tx.as_mut(), &mut asset, &mut membership, offer.price, now).await?;
        tx.commit().await?;

        metrics::increment_counter!("market_direct_sales_total");
        Ok(record)
    }

    /// Clears the pending offer; the asset stays listed and owned.
    pub async fn reject_league_offer(&self, key: AssetKey, player_id: PlayerId) -> Result<()> {
        let mut tx = self.store.begin().await?;
        let Some(mut asset) = tx.asset_for_update(key).await? else {
            return Err(MarketError::AssetNotFound { key });
        };
        if asset.owner != Some(player_id) {
            return Err(MarketError::NotOwner { key, player_id });
        }
        if asset.league_offer.take().is_none() {
            return Err(MarketError::NoPendingOffer { key });
        }

        tx.update_asset(&asset).await?;
        tx.commit().await?;

        info!("Player {} rejected league offer for {}", player_id, key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auction::AuctionEngine;
    use crate::clock::ManualClock;
    use chrono::Duration;
    use league_store::{AssetKind, InMemoryStore, NewAsset, TransferKind};

    struct Harness {
        store: Arc<InMemoryStore>,
        clock: Arc<ManualClock>,
        sales: DirectSales,
        key: AssetKey,
    }

    /// Player 5 owns one pilot bought at auction for 300
    async fn harness() -> Harness {
        let store = Arc::new(InMemoryStore::new());
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let config = MarketConfig::default();
        let key = store
            .seed_assets(&[NewAsset { league_id: 2, kind: AssetKind::Pilot, catalog_id: 9, value: 500 }])
            .await
            .unwrap()[0]
            .key();
        store.create_membership(2, 5, 1_000).await.unwrap();
        store.create_membership(2, 6, 1_000).await.unwrap();

        let engine = AuctionEngine::new(store.clone(), clock.clone(), config.clone());
        let auction_id = engine.place_bid(key, 5, 300).await.unwrap();
        clock.advance(Duration::hours(24));
        engine.settle_finished(auction_id).await.unwrap();

        let sales = DirectSales::new(store.clone(), clock.clone(), config);
        Harness { store, clock, sales, key }
    }

    #[tokio::test]
    async fn test_listing_requires_ownership() {
        let h = harness().await;
        assert!(matches!(
            h.sales.list_for_sale(h.key, 6, 900).await,
            Err(MarketError::NotOwner { player_id: 6, .. })
        ));

        let listing = h.sales.list_for_sale(h.key, 5, 900).await.unwrap();
        assert_eq!(listing.expires_at, h.clock.now() + Duration::hours(72));
    }

    #[tokio::test]
    async fn test_offer_requires_open_listing() {
        let h = harness().await;
        assert!(matches!(
            h.sales.post_league_offer(h.key, 800, None).await,
            Err(MarketError::NotForSale { .. })
        ));

        h.sales.list_for_sale(h.key, 5, 900).await.unwrap();
        h.clock.advance(Duration::hours(73));
        assert!(matches!(
            h.sales.post_league_offer(h.key, 800, None).await,
            Err(MarketError::NotForSale { .. })
        ));
    }

    #[tokio::test]
    async fn test_accept_releases_asset_and_credits_owner() {
        let h = harness().await;
        h.sales.list_for_sale(h.key, 5, 900).await.unwrap();
        h.sales.post_league_offer(h.key, 800, None).await.unwrap();

        let record = h.sales.accept_league_offer(h.key, 5).await.unwrap();
        assert_eq!(record.kind, TransferKind::Disposal);
        assert_eq!(record.amount, 800);

        let ledger = h.store.ledger(2, 5).await.unwrap().unwrap();
        assert_eq!(ledger.balance, 1_000 - 300 + 800);
        assert_eq!(ledger.team_value, 0);
        assert!(!ledger.owned.contains(AssetKind::Pilot, h.key.asset_id));

        let asset = h.store.asset(h.key).await.unwrap().unwrap();
        assert!(asset.is_free_agent());
        assert!(asset.sale.is_none() && asset.league_offer.is_none());

        assert!(matches!(
            h.sales.accept_league_offer(h.key, 5).await,
            Err(MarketError::NotOwner { .. })
        ));
    }

    #[tokio::test]
    async fn test_reject_keeps_ownership() {
        let h = harness().await;
        assert!(matches!(
            h.sales.reject_league_offer(h.key, 5).await,
            Err(MarketError::NoPendingOffer { .. })
        ));

        h.sales.list_for_sale(h.key, 5, 900).await.unwrap();
        h.sales.post_league_offer(h.key, 800, None).await.unwrap();
        h.sales.reject_league_offer(h.key, 5).await.unwrap();

        let asset = h.store.asset(h.key).await.unwrap().unwrap();
        assert_eq!(asset.owner, Some(5));
        assert!(asset.league_offer.is_none());
        assert!(asset.sale.is_some());
        assert_eq!(h.store.ledger(2, 5).await.unwrap().unwrap().balance, 700);
    }
}
