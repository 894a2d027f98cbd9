//! Domain rows shared by every store backend

use crate::error::StoreError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub type LeagueId = i64;
pub type PlayerId = i64;
pub type AssetId = i64;
pub type AuctionId = i64;
pub type CatalogId = i64;

/// Counterparty recorded when the league itself is the other side of a transfer
pub const MARKET_COUNTERPARTY: PlayerId = 0;

/// The four biddable asset families, each materialized per league
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetKind {
    Pilot,
    TrackEngineer,
    ChiefEngineer,
    Constructor,
}

impl AssetKind {
    pub const ALL: [AssetKind; 4] = [
        AssetKind::Pilot,
        AssetKind::TrackEngineer,
        AssetKind::ChiefEngineer,
        AssetKind::Constructor,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AssetKind::Pilot => "pilot",
            AssetKind::TrackEngineer => "track_engineer",
            AssetKind::ChiefEngineer => "chief_engineer",
            AssetKind::Constructor => "constructor",
        }
    }
}

impl fmt::Display for AssetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AssetKind {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pilot" => Ok(AssetKind::Pilot),
            "track_engineer" => Ok(AssetKind::TrackEngineer),
            "chief_engineer" => Ok(AssetKind::ChiefEngineer),
            "constructor" => Ok(AssetKind::Constructor),
            other => Err(StoreError::invalid_data(format!("unknown asset kind '{other}'"))),
        }
    }
}

/// Addresses one asset row: (league, kind, id)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AssetKey {
    pub league_id: LeagueId,
    pub kind: AssetKind,
    pub asset_id: AssetId,
}

impl AssetKey {
    pub fn new(league_id: LeagueId, kind: AssetKind, asset_id: AssetId) -> Self {
        Self { league_id, kind, asset_id }
    }
}

impl fmt::Display for AssetKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "league {} {} #{}", self.league_id, self.kind, self.asset_id)
    }
}

/// A price with an expiry, used for direct-sale listings and league offers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceWindow {
    pub price: i64,
    pub expires_at: DateTime<Utc>,
}

impl PriceWindow {
    pub fn is_open(&self, now: DateTime<Utc>) -> bool {
        self.expires_at > now
    }
}

/// Price floor escalated by successful auctions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Clause {
    pub value: i64,
    pub expires_at: DateTime<Utc>,
}

/// Per-league copy of a catalog entity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Asset {
    pub id: AssetId,
    pub league_id: LeagueId,
    pub kind: AssetKind,
    pub catalog_id: CatalogId,
    /// `None` means free agent
    pub owner: Option<PlayerId>,
    pub value: i64,
    pub sale: Option<PriceWindow>,
    pub league_offer: Option<PriceWindow>,
    pub clause: Option<Clause>,
}

impl Asset {
    pub fn key(&self) -> AssetKey {
        AssetKey::new(self.league_id, self.kind, self.id)
    }

    pub fn is_free_agent(&self) -> bool {
        self.owner.is_none()
    }
}

/// Catalog entry to materialize inside a league
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewAsset {
    pub league_id: LeagueId,
    pub kind: AssetKind,
    pub catalog_id: CatalogId,
    pub value: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketSlot {
    pub league_id: LeagueId,
    pub kind: AssetKind,
    pub asset_id: AssetId,
    /// Eligible for rotation
    pub active: bool,
    /// Displayed and biddable this cycle
    pub in_market: bool,
}

impl MarketSlot {
    pub fn key(&self) -> AssetKey {
        AssetKey::new(self.league_id, self.kind, self.asset_id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bid {
    pub player_id: PlayerId,
    pub amount: i64,
}

/// Ordered bids with at most one entry per player
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BidList(Vec<Bid>);

impl BidList {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Overwrites the player's bid in place or appends a new one.
    /// Returns `true` when the player had no bid before.
    pub fn upsert(&mut self, player_id: PlayerId, amount: i64) -> bool {
        match self.0.iter_mut().find(|bid| bid.player_id == player_id) {
            Some(existing) => {
                existing.amount = amount;
                false
            }
            None => {
                self.0.push(Bid { player_id, amount });
                true
            }
        }
    }

    pub fn remove(&mut self, player_id: PlayerId) -> bool {
        let before = self.0.len();
        self.0.retain(|bid| bid.player_id != player_id);
        self.0.len() != before
    }

    /// Strictly highest amount; on ties the earliest bid in list order wins.
    pub fn highest(&self) -> Option<&Bid> {
        self.0.iter().fold(None, |best: Option<&Bid>, bid| match best {
            Some(current) if current.amount >= bid.amount => Some(current),
            _ => Some(bid),
        })
    }

    pub fn get(&self, player_id: PlayerId) -> Option<&Bid> {
        self.0.iter().find(|bid| bid.player_id == player_id)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Bid> {
        self.0.iter()
    }
}

impl FromIterator<Bid> for BidList {
    fn from_iter<I: IntoIterator<Item = Bid>>(iter: I) -> Self {
        let mut list = BidList::new();
        for bid in iter {
            list.upsert(bid.player_id, bid.amount);
        }
        list
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Auction {
    pub id: AuctionId,
    pub league_id: LeagueId,
    pub kind: AssetKind,
    pub asset_id: AssetId,
    pub ends_at: DateTime<Utc>,
    /// Set exactly once, by whichever settlement claims the auction first
    pub settled_at: Option<DateTime<Utc>>,
    pub bids: BidList,
}

impl Auction {
    pub fn key(&self) -> AssetKey {
        AssetKey::new(self.league_id, self.kind, self.asset_id)
    }

    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        self.ends_at > now
    }

    pub fn is_settled(&self) -> bool {
        self.settled_at.is_some()
    }
}

/// Per-kind lists of owned asset ids
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnedAssets {
    pub pilots: Vec<AssetId>,
    pub track_engineers: Vec<AssetId>,
    pub chief_engineers: Vec<AssetId>,
    pub constructors: Vec<AssetId>,
}

impl OwnedAssets {
    pub fn ids(&self, kind: AssetKind) -> &[AssetId] {
        match kind {
            AssetKind::Pilot => &self.pilots,
            AssetKind::TrackEngineer => &self.track_engineers,
            AssetKind::ChiefEngineer => &self.chief_engineers,
            AssetKind::Constructor => &self.constructors,
        }
    }

    fn ids_mut(&mut self, kind: AssetKind) -> &mut Vec<AssetId> {
        match kind {
            AssetKind::Pilot => &mut self.pilots,
            AssetKind::TrackEngineer => &mut self.track_engineers,
            AssetKind::ChiefEngineer => &mut self.chief_engineers,
            AssetKind::Constructor => &mut self.constructors,
        }
    }

    pub fn contains(&self, kind: AssetKind, asset_id: AssetId) -> bool {
        self.ids(kind).contains(&asset_id)
    }

    /// No-op when the id is already present. Returns `true` if it was added.
    pub fn insert(&mut self, kind: AssetKind, asset_id: AssetId) -> bool {
        let ids = self.ids_mut(kind);
        if ids.contains(&asset_id) {
            return false;
        }
        ids.push(asset_id);
        true
    }

    /// Drops every occurrence. Returns `true` if anything was removed.
    pub fn remove(&mut self, kind: AssetKind, asset_id: AssetId) -> bool {
        let ids = self.ids_mut(kind);
        let before = ids.len();
        ids.retain(|id| *id != asset_id);
        ids.len() != before
    }

    pub fn iter(&self) -> impl Iterator<Item = (AssetKind, AssetId)> + '_ {
        AssetKind::ALL
            .into_iter()
            .flat_map(move |kind| self.ids(kind).iter().map(move |id| (kind, *id)))
    }

    pub fn total(&self) -> usize {
        AssetKind::ALL.iter().map(|kind| self.ids(*kind).len()).sum()
    }
}

/// Balance, valuation and owned assets of one player inside one league
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MembershipLedger {
    pub league_id: LeagueId,
    pub player_id: PlayerId,
    pub balance: i64,
    pub team_value: i64,
    pub owned: OwnedAssets,
}

impl MembershipLedger {
    pub fn new(league_id: LeagueId, player_id: PlayerId, balance: i64) -> Self {
        Self { league_id, player_id, balance, team_value: 0, owned: OwnedAssets::default() }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransferKind {
    #[serde(rename = "fichaje")]
    Acquisition,
    #[serde(rename = "venta")]
    Disposal,
}

impl TransferKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransferKind::Acquisition => "fichaje",
            TransferKind::Disposal => "venta",
        }
    }
}

impl FromStr for TransferKind {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "fichaje" => Ok(TransferKind::Acquisition),
            "venta" => Ok(TransferKind::Disposal),
            other => Err(StoreError::invalid_data(format!("unknown transfer kind '{other}'"))),
        }
    }
}

/// Append-only audit row for every ownership change
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferRecord {
    pub league_id: LeagueId,
    pub asset_id: AssetId,
    pub asset_kind: AssetKind,
    pub player_id: PlayerId,
    pub counterparty_id: PlayerId,
    pub amount: i64,
    pub kind: TransferKind,
    pub created_at: DateTime<Utc>,
}
