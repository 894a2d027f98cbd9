//! Request and response bodies

use auction_engine::Discrepancy;
use chrono::{DateTime, Utc};
use league_store::{AssetKey, AssetKind, AuctionId, LeagueId, PlayerId};
use serde::{Deserialize, Serialize};

/// Identifies one asset inside a league
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct AssetRef {
    pub league_id: LeagueId,
    pub asset_kind: AssetKind,
    pub asset_id: i64,
}

impl AssetRef {
    pub fn key(&self) -> AssetKey {
        AssetKey::new(self.league_id, self.asset_kind, self.asset_id)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaceBidRequest {
    pub league_id: LeagueId,
    pub player_id: PlayerId,
    pub asset_kind: AssetKind,
    pub asset_id: i64,
    pub amount: i64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PlaceBidResponse {
    pub auction_id: AuctionId,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RemoveBidResponse {
    pub removed: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettleRequest {
    pub auction_id: AuctionId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeagueQuery {
    pub league_id: LeagueId,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NextRefreshQuery {
    pub league_id: Option<LeagueId>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct NextRefreshResponse {
    /// Epoch seconds; `None` when nothing is scheduled
    pub next_refresh: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListForSaleRequest {
    #[serde(flatten)]
    pub asset: AssetRef,
    pub price: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeagueOfferRequest {
    #[serde(flatten)]
    pub asset: AssetRef,
    pub price: i64,
    pub expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
pub struct AuditResponse {
    pub league_id: LeagueId,
    pub consistent: bool,
    pub discrepancies: Vec<Discrepancy>,
}
