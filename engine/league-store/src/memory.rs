//! In-memory store used by tests and the `memory` service backend
//!
//! A transaction owns the state mutex for its whole lifetime, so transactions
//! are fully serialized. Uncommitted work is undone by restoring a snapshot
//! taken when the transaction began.

use crate::backend::{MarketStore, MarketTx};
use crate::error::{Result, StoreError};
use crate::model::{
    Asset, AssetId, AssetKey, AssetKind, Auction, AuctionId, Bid, BidList, LeagueId, MarketSlot,
    MembershipLedger, NewAsset, PlayerId, TransferRecord,
};
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

#[derive(Debug, Clone, Default)]
struct MemoryState {
    last_id: i64,
    assets: BTreeMap<AssetKey, Asset>,
    slots: BTreeMap<AssetKey, MarketSlot>,
    ledgers: BTreeMap<(LeagueId, PlayerId), MembershipLedger>,
    auctions: BTreeMap<AuctionId, Auction>,
    transfers: Vec<TransferRecord>,
    next_refresh: HashMap<LeagueId, DateTime<Utc>>,
}

impl MemoryState {
    fn next_id(&mut self) -> i64 {
        self.last_id += 1;
        self.last_id
    }

    fn active_auction_id(&self, key: AssetKey, now: DateTime<Utc>) -> Option<AuctionId> {
        self.auctions
            .values()
            .filter(|a| a.key() == key && a.is_active(now))
            .max_by_key(|a| (a.ends_at, a.id))
            .map(|a| a.id)
    }

    fn auction_mut(&mut self, auction_id: AuctionId) -> Result<&mut Auction> {
        self.auctions
            .get_mut(&auction_id)
            .ok_or_else(|| StoreError::not_found(format!("auction {auction_id}")))
    }

    fn ledger_mut(&mut self, league_id: LeagueId, player_id: PlayerId) -> Result<&mut MembershipLedger> {
        self.ledgers.get_mut(&(league_id, player_id)).ok_or_else(|| {
            StoreError::not_found(format!("membership of player {player_id} in league {league_id}"))
        })
    }
}

/// Mutex-guarded store kept entirely in process memory
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    state: Arc<Mutex<MemoryState>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

pub struct MemoryTx {
    guard: OwnedMutexGuard<MemoryState>,
    snapshot: Option<MemoryState>,
}

impl Drop for MemoryTx {
    fn drop(&mut self) {
        if let Some(snapshot) = self.snapshot.take() {
            tracing::debug!("Rolling back uncommitted in-memory transaction");
            *self.guard = snapshot;
        }
    }
}

#[async_trait::async_trait]
impl MarketTx for MemoryTx {
    async fn asset_for_update(&mut self, key: AssetKey) -> Result<Option<Asset>> {
        Ok(self.guard.assets.get(&key).cloned())
    }

    async fn update_asset(&mut self, asset: &Asset) -> Result<()> {
        let slot = self
            .guard
            .assets
            .get_mut(&asset.key())
            .ok_or_else(|| StoreError::not_found(format!("asset {}", asset.key())))?;
        *slot = asset.clone();
        Ok(())
    }

    async fn active_auction_for_update(
        &mut self,
        key: AssetKey,
        now: DateTime<Utc>,
    ) -> Result<Option<Auction>> {
        let id = self.guard.active_auction_id(key, now);
        Ok(id.and_then(|id| self.guard.auctions.get(&id).cloned()))
    }

    async fn auction_for_update(&mut self, auction_id: AuctionId) -> Result<Option<Auction>> {
        Ok(self.guard.auctions.get(&auction_id).cloned())
    }

    async fn insert_auction(&mut self, key: AssetKey, ends_at: DateTime<Utc>) -> Result<Auction> {
        let id = self.guard.next_id();
        let auction = Auction {
            id,
            league_id: key.league_id,
            kind: key.kind,
            asset_id: key.asset_id,
            ends_at,
            settled_at: None,
            bids: BidList::new(),
        };
        self.guard.auctions.insert(id, auction.clone());
        Ok(auction)
    }

    async fn put_bid(&mut self, auction_id: AuctionId, bid: Bid) -> Result<()> {
        self.guard.auction_mut(auction_id)?.bids.upsert(bid.player_id, bid.amount);
        Ok(())
    }

    async fn delete_bid(&mut self, auction_id: AuctionId, player_id: PlayerId) -> Result<bool> {
        Ok(self.guard.auction_mut(auction_id)?.bids.remove(player_id))
    }

    async fn mark_settled(&mut self, auction_id: AuctionId, at: DateTime<Utc>) -> Result<()> {
        self.guard.auction_mut(auction_id)?.settled_at = Some(at);
        Ok(())
    }

    async fn ledger_for_update(
        &mut self,
        league_id: LeagueId,
        player_id: PlayerId,
    ) -> Result<Option<MembershipLedger>> {
        Ok(self.guard.ledgers.get(&(league_id, player_id)).cloned())
    }

    async fn update_ledger_totals(&mut self, ledger: &MembershipLedger) -> Result<()> {
        let stored = self.guard.ledger_mut(ledger.league_id, ledger.player_id)?;
        stored.balance = ledger.balance;
        stored.team_value = ledger.team_value;
        Ok(())
    }

    async fn set_owned(
        &mut self,
        league_id: LeagueId,
        player_id: PlayerId,
        kind: AssetKind,
        asset_id: AssetId,
        owned: bool,
    ) -> Result<()> {
        let ledger = self.guard.ledger_mut(league_id, player_id)?;
        if owned {
            ledger.owned.insert(kind, asset_id);
        } else {
            ledger.owned.remove(kind, asset_id);
        }
        Ok(())
    }

    async fn append_transfer(&mut self, record: &TransferRecord) -> Result<()> {
        self.guard.transfers.push(record.clone());
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        let mut this = self;
        this.snapshot = None;
        Ok(())
    }
}

#[async_trait::async_trait]
impl MarketStore for InMemoryStore {
    async fn begin(&self) -> Result<Box<dyn MarketTx>> {
        // Whole-store lock held until commit or drop
        let guard = self.state.clone().lock_owned().await;
        let snapshot = Some(guard.clone());
        Ok(Box::new(MemoryTx { guard, snapshot }))
    }

    async fn seed_assets(&self, assets: &[NewAsset]) -> Result<Vec<Asset>> {
        let mut state = self.state.lock().await;
        let mut created = Vec::new();

        for new in assets {
            let exists = state.assets.values().any(|a| {
                a.league_id == new.league_id && a.kind == new.kind && a.catalog_id == new.catalog_id
            });
            // Seeding twice leaves existing entries untouched
            if exists {
                continue;
            }

            let asset = Asset {
                id: state.next_id(),
                league_id: new.league_id,
                kind: new.kind,
                catalog_id: new.catalog_id,
                owner: None,
                value: new.value,
                sale: None,
                league_offer: None,
                clause: None,
            };
            let slot = MarketSlot {
                league_id: asset.league_id,
                kind: asset.kind,
                asset_id: asset.id,
                active: true,
                in_market: false,
            };
            state.slots.insert(asset.key(), slot);
            state.assets.insert(asset.key(), asset.clone());
            created.push(asset);
        }

        Ok(created)
    }

    async fn create_membership(
        &self,
        league_id: LeagueId,
        player_id: PlayerId,
        balance: i64,
    ) -> Result<MembershipLedger> {
        let mut state = self.state.lock().await;
        if state.ledgers.contains_key(&(league_id, player_id)) {
            return Err(StoreError::already_exists(format!(
                "membership of player {player_id} in league {league_id}"
            )));
        }
        let ledger = MembershipLedger::new(league_id, player_id, balance);
        state.ledgers.insert((league_id, player_id), ledger.clone());
        Ok(ledger)
    }

    async fn league_ids(&self) -> Result<Vec<LeagueId>> {
        let state = self.state.lock().await;
        let ids: BTreeSet<LeagueId> = state.assets.keys().map(|k| k.league_id).collect();
        Ok(ids.into_iter().collect())
    }

    async fn asset(&self, key: AssetKey) -> Result<Option<Asset>> {
        Ok(self.state.lock().await.assets.get(&key).cloned())
    }

    async fn assets(&self, league_id: LeagueId) -> Result<Vec<Asset>> {
        let state = self.state.lock().await;
        Ok(state.assets.values().filter(|a| a.league_id == league_id).cloned().collect())
    }

    async fn ledger(
        &self,
        league_id: LeagueId,
        player_id: PlayerId,
    ) -> Result<Option<MembershipLedger>> {
        Ok(self.state.lock().await.ledgers.get(&(league_id, player_id)).cloned())
    }

    async fn ledgers(&self, league_id: LeagueId) -> Result<Vec<MembershipLedger>> {
        let state = self.state.lock().await;
        Ok(state.ledgers.values().filter(|l| l.league_id == league_id).cloned().collect())
    }

    async fn transfers(&self, league_id: LeagueId) -> Result<Vec<TransferRecord>> {
        let state = self.state.lock().await;
        Ok(state.transfers.iter().filter(|t| t.league_id == league_id).cloned().collect())
    }

    async fn slots(&self, league_id: LeagueId) -> Result<Vec<MarketSlot>> {
        let state = self.state.lock().await;
        Ok(state.slots.values().filter(|s| s.league_id == league_id).cloned().collect())
    }

    async fn replace_in_market(&self, league_id: LeagueId, selected: &[AssetKey]) -> Result<()> {
        let mut state = self.state.lock().await;
        for slot in state.slots.values_mut().filter(|s| s.league_id == league_id) {
            slot.in_market = slot.active && selected.contains(&slot.key());
        }
        Ok(())
    }

    async fn auction(&self, auction_id: AuctionId) -> Result<Option<Auction>> {
        Ok(self.state.lock().await.auctions.get(&auction_id).cloned())
    }

    async fn auctions(&self, league_id: LeagueId) -> Result<Vec<Auction>> {
        let state = self.state.lock().await;
        Ok(state.auctions.values().filter(|a| a.league_id == league_id).cloned().collect())
    }

    async fn expired_auctions(
        &self,
        league_id: LeagueId,
        now: DateTime<Utc>,
    ) -> Result<Vec<Auction>> {
        let state = self.state.lock().await;
        let mut expired: Vec<Auction> = state
            .auctions
            .values()
            .filter(|a| a.league_id == league_id && !a.is_active(now) && !a.is_settled())
            .cloned()
            .collect();
        expired.sort_by_key(|a| (a.ends_at, a.id));
        Ok(expired)
    }

    async fn delete_auctions(&self, league_id: LeagueId) -> Result<u64> {
        let mut state = self.state.lock().await;
        let before = state.auctions.len();
        state.auctions.retain(|_, a| a.league_id != league_id);
        Ok((before - state.auctions.len()) as u64)
    }

    async fn next_refresh_at(&self, league_id: LeagueId) -> Result<Option<DateTime<Utc>>> {
        Ok(self.state.lock().await.next_refresh.get(&league_id).copied())
    }

    async fn set_next_refresh_at(&self, league_id: LeagueId, at: DateTime<Utc>) -> Result<()> {
        self.state.lock().await.next_refresh.insert(league_id, at);
        Ok(())
    }
}
