//! Store and transaction traits implemented by every backend
//!
//! Every per-asset mutation runs inside a [`MarketTx`]. Implementations lock
//! rows in a fixed order (asset, then auction, then membership ledger) so two
//! transactions touching the same asset serialize instead of interleaving.

use crate::error::Result;
use crate::model::{
    Asset, AssetKey, AssetKind, AssetId, Auction, AuctionId, Bid, LeagueId, MarketSlot,
    MembershipLedger, NewAsset, PlayerId, TransferRecord,
};
use chrono::{DateTime, Utc};

/// Unit of work over the market tables.
///
/// Dropping a transaction without calling [`MarketTx::commit`] rolls it back.
#[async_trait::async_trait]
pub trait MarketTx: Send {
    /// Loads and locks the asset row. Every per-asset transaction starts here.
    async fn asset_for_update(&mut self, key: AssetKey) -> Result<Option<Asset>>;

    /// Writes owner, value, sale, offer and clause columns.
    async fn update_asset(&mut self, asset: &Asset) -> Result<()>;

    /// Latest auction for the asset whose end time is after `now`, locked.
    async fn active_auction_for_update(
        &mut self,
        key: AssetKey,
        now: DateTime<Utc>,
    ) -> Result<Option<Auction>>;

    async fn auction_for_update(&mut self, auction_id: AuctionId) -> Result<Option<Auction>>;

    /// Creates an auction with an empty bid list.
    async fn insert_auction(&mut self, key: AssetKey, ends_at: DateTime<Utc>) -> Result<Auction>;

    /// Overwrites the player's bid keeping its position, or appends it.
    async fn put_bid(&mut self, auction_id: AuctionId, bid: Bid) -> Result<()>;

    async fn delete_bid(&mut self, auction_id: AuctionId, player_id: PlayerId) -> Result<bool>;

    async fn mark_settled(&mut self, auction_id: AuctionId, at: DateTime<Utc>) -> Result<()>;

    async fn ledger_for_update(
        &mut self,
        league_id: LeagueId,
        player_id: PlayerId,
    ) -> Result<Option<MembershipLedger>>;

    /// Writes balance and team valuation. Ownership lists go through [`MarketTx::set_owned`].
    async fn update_ledger_totals(&mut self, ledger: &MembershipLedger) -> Result<()>;

    /// Idempotent add (`owned = true`) or remove-all (`owned = false`) on the
    /// player's ownership list for `kind`.
    async fn set_owned(
        &mut self,
        league_id: LeagueId,
        player_id: PlayerId,
        kind: AssetKind,
        asset_id: AssetId,
        owned: bool,
    ) -> Result<()>;

    async fn append_transfer(&mut self, record: &TransferRecord) -> Result<()>;

    async fn commit(self: Box<Self>) -> Result<()>;
}

/// Abstract store for league assets, the market pool, auctions and ledgers
#[async_trait::async_trait]
pub trait MarketStore: Send + Sync {
    async fn begin(&self) -> Result<Box<dyn MarketTx>>;

    /// Materializes catalog entries as assets plus one active market slot
    /// each. Entries already present for the league are skipped.
    async fn seed_assets(&self, assets: &[NewAsset]) -> Result<Vec<Asset>>;

    async fn create_membership(
        &self,
        league_id: LeagueId,
        player_id: PlayerId,
        balance: i64,
    ) -> Result<MembershipLedger>;

    /// Every league that has at least one asset
    async fn league_ids(&self) -> Result<Vec<LeagueId>>;

    async fn asset(&self, key: AssetKey) -> Result<Option<Asset>>;

    async fn assets(&self, league_id: LeagueId) -> Result<Vec<Asset>>;

    async fn ledger(
        &self,
        league_id: LeagueId,
        player_id: PlayerId,
    ) -> Result<Option<MembershipLedger>>;

    async fn ledgers(&self, league_id: LeagueId) -> Result<Vec<MembershipLedger>>;

    /// Transfer history in append order
    async fn transfers(&self, league_id: LeagueId) -> Result<Vec<TransferRecord>>;

    async fn slots(&self, league_id: LeagueId) -> Result<Vec<MarketSlot>>;

    /// Clears `in_market` for the whole league then sets it for exactly
    /// `selected`, atomically.
    async fn replace_in_market(&self, league_id: LeagueId, selected: &[AssetKey]) -> Result<()>;

    async fn auction(&self, auction_id: AuctionId) -> Result<Option<Auction>>;

    async fn auctions(&self, league_id: LeagueId) -> Result<Vec<Auction>>;

    /// Unsettled auctions whose end time is at or before `now`, oldest first
    async fn expired_auctions(
        &self,
        league_id: LeagueId,
        now: DateTime<Utc>,
    ) -> Result<Vec<Auction>>;

    /// Deletes every auction (and its bids) in the league
    async fn delete_auctions(&self, league_id: LeagueId) -> Result<u64>;

    async fn next_refresh_at(&self, league_id: LeagueId) -> Result<Option<DateTime<Utc>>>;

    async fn set_next_refresh_at(&self, league_id: LeagueId, at: DateTime<Utc>) -> Result<()>;
}
