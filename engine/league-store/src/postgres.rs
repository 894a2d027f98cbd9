//! PostgreSQL backend
//!
//! Ownership lists and bids live in child tables so that an add or remove is a
//! single row write inside the caller's transaction. Asset rows are locked with
//! `FOR UPDATE` and act as the per-asset lock.

use crate::backend::{MarketStore, MarketTx};
use crate::config::DatabaseConfig;
use crate::error::{Result, StoreError};
use crate::model::{
    Asset, AssetId, AssetKey, AssetKind, Auction, AuctionId, Bid, BidList, Clause, LeagueId,
    MarketSlot, MembershipLedger, NewAsset, OwnedAssets, PlayerId, PriceWindow, TransferRecord,
};
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgConnection, PgPool, PgPoolOptions};
use sqlx::{Postgres, Transaction};
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, info};

const ASSET_COLUMNS: &str = "id, league_id, asset_kind, catalog_id, owner_id, value, \
     sale_price, sale_expires_at, offer_price, offer_expires_at, clause_value, clause_expires_at";

const AUCTION_COLUMNS: &str = "id, league_id, asset_kind, asset_id, ends_at, settled_at";

#[derive(sqlx::FromRow)]
struct AssetRow {
    id: i64,
    league_id: i64,
    asset_kind: String,
    catalog_id: i64,
    owner_id: Option<i64>,
    value: i64,
    sale_price: Option<i64>,
    sale_expires_at: Option<DateTime<Utc>>,
    offer_price: Option<i64>,
    offer_expires_at: Option<DateTime<Utc>>,
    clause_value: Option<i64>,
    clause_expires_at: Option<DateTime<Utc>>,
}

fn price_window(price: Option<i64>, expires_at: Option<DateTime<Utc>>) -> Option<PriceWindow> {
    match (price, expires_at) {
        (Some(price), Some(expires_at)) => Some(PriceWindow { price, expires_at }),
        _ => None,
    }
}

impl TryFrom<AssetRow> for Asset {
    type Error = StoreError;

    fn try_from(row: AssetRow) -> Result<Self> {
        let clause = match (row.clause_value, row.clause_expires_at) {
            (Some(value), Some(expires_at)) => Some(Clause { value, expires_at }),
            _ => None,
        };
        Ok(Asset {
            id: row.id,
            league_id: row.league_id,
            kind: row.asset_kind.parse()?,
            catalog_id: row.catalog_id,
            owner: row.owner_id,
            value: row.value,
            sale: price_window(row.sale_price, row.sale_expires_at),
            league_offer: price_window(row.offer_price, row.offer_expires_at),
            clause,
        })
    }
}

#[derive(sqlx::FromRow)]
struct AuctionRow {
    id: i64,
    league_id: i64,
    asset_kind: String,
    asset_id: i64,
    ends_at: DateTime<Utc>,
    settled_at: Option<DateTime<Utc>>,
}

impl AuctionRow {
    fn into_auction(self, bids: BidList) -> Result<Auction> {
        Ok(Auction {
            id: self.id,
            league_id: self.league_id,
            kind: self.asset_kind.parse()?,
            asset_id: self.asset_id,
            ends_at: self.ends_at,
            settled_at: self.settled_at,
            bids,
        })
    }
}

#[derive(sqlx::FromRow)]
struct BidRow {
    auction_id: i64,
    player_id: i64,
    amount: i64,
}

#[derive(sqlx::FromRow)]
struct MemberRow {
    league_id: i64,
    player_id: i64,
    balance: i64,
    team_value: i64,
}

#[derive(sqlx::FromRow)]
struct OwnedRow {
    player_id: i64,
    asset_kind: String,
    asset_id: i64,
}

#[derive(sqlx::FromRow)]
struct SlotRow {
    league_id: i64,
    asset_kind: String,
    asset_id: i64,
    active: bool,
    in_market: bool,
}

#[derive(sqlx::FromRow)]
struct TransferRow {
    league_id: i64,
    asset_id: i64,
    asset_kind: String,
    player_id: i64,
    counterparty_id: i64,
    amount: i64,
    kind: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<TransferRow> for TransferRecord {
    type Error = StoreError;

    fn try_from(row: TransferRow) -> Result<Self> {
        Ok(TransferRecord {
            league_id: row.league_id,
            asset_id: row.asset_id,
            asset_kind: row.asset_kind.parse()?,
            player_id: row.player_id,
            counterparty_id: row.counterparty_id,
            amount: row.amount,
            kind: row.kind.parse()?,
            created_at: row.created_at,
        })
    }
}

/// Loads bids for the given auctions, grouped per auction in insertion order
async fn load_bids(conn: &mut PgConnection, auction_ids: &[AuctionId]) -> Result<HashMap<AuctionId, BidList>> {
    let rows: Vec<BidRow> = sqlx::query_as(
        "SELECT auction_id, player_id, amount FROM auction_bids \
         WHERE auction_id = ANY($1) ORDER BY auction_id, seq",
    )
    .bind(auction_ids.to_vec())
    .fetch_all(&mut *conn)
    .await?;

    let mut grouped: HashMap<AuctionId, BidList> = HashMap::new();
    for row in rows {
        grouped.entry(row.auction_id).or_default().upsert(row.player_id, row.amount);
    }
    Ok(grouped)
}

async fn attach_bids(conn: &mut PgConnection, rows: Vec<AuctionRow>) -> Result<Vec<Auction>> {
    let ids: Vec<AuctionId> = rows.iter().map(|r| r.id).collect();
    let mut bids = load_bids(conn, &ids).await?;
    rows.into_iter()
        .map(|row| {
            let list = bids.remove(&row.id).unwrap_or_default();
            row.into_auction(list)
        })
        .collect()
}

fn assemble_ledgers(members: Vec<MemberRow>, owned: Vec<OwnedRow>) -> Result<Vec<MembershipLedger>> {
    let mut by_player: HashMap<PlayerId, OwnedAssets> = HashMap::new();
    for row in owned {
        let kind: AssetKind = row.asset_kind.parse()?;
        by_player.entry(row.player_id).or_default().insert(kind, row.asset_id);
    }

    Ok(members
        .into_iter()
        .map(|m| MembershipLedger {
            league_id: m.league_id,
            player_id: m.player_id,
            balance: m.balance,
            team_value: m.team_value,
            owned: by_player.remove(&m.player_id).unwrap_or_default(),
        })
        .collect())
}

async fn load_ledger(
    conn: &mut PgConnection,
    league_id: LeagueId,
    player_id: PlayerId,
    lock: bool,
) -> Result<Option<MembershipLedger>> {
    let sql = if lock {
        "SELECT league_id, player_id, balance, team_value FROM league_members \
         WHERE league_id = $1 AND player_id = $2 FOR UPDATE"
    } else {
        "SELECT league_id, player_id, balance, team_value FROM league_members \
         WHERE league_id = $1 AND player_id = $2"
    };
    let member: Option<MemberRow> = sqlx::query_as(sql)
        .bind(league_id)
        .bind(player_id)
        .fetch_optional(&mut *conn)
        .await?;

    let Some(member) = member else {
        return Ok(None);
    };

    let owned: Vec<OwnedRow> = sqlx::query_as(
        "SELECT player_id, asset_kind, asset_id FROM member_assets \
         WHERE league_id = $1 AND player_id = $2 ORDER BY added_seq",
    )
    .bind(league_id)
    .bind(player_id)
    .fetch_all(&mut *conn)
    .await?;

    Ok(assemble_ledgers(vec![member], owned)?.pop())
}

/// Transaction over a pooled connection; rolled back by sqlx when dropped
pub struct PgMarketTx {
    tx: Transaction<'static, Postgres>,
}

#[async_trait::async_trait]
impl MarketTx for PgMarketTx {
    async fn asset_for_update(&mut self, key: AssetKey) -> Result<Option<Asset>> {
        let sql = format!(
            "SELECT {ASSET_COLUMNS} FROM league_assets \
             WHERE league_id = $1 AND asset_kind = $2 AND id = $3 FOR UPDATE"
        );
        let row: Option<AssetRow> = sqlx::query_as(&sql)
            .bind(key.league_id)
            .bind(key.kind.as_str())
            .bind(key.asset_id)
            .fetch_optional(&mut *self.tx)
            .await?;
        row.map(Asset::try_from).transpose()
    }

    async fn update_asset(&mut self, asset: &Asset) -> Result<()> {
        let result = sqlx::query(
            "UPDATE league_assets SET owner_id = $2, value = $3, \
             sale_price = $4, sale_expires_at = $5, offer_price = $6, offer_expires_at = $7, \
             clause_value = $8, clause_expires_at = $9 WHERE id = $1",
        )
        .bind(asset.id)
        .bind(asset.owner)
        .bind(asset.value)
        .bind(asset.sale.map(|s| s.price))
        .bind(asset.sale.map(|s| s.expires_at))
        .bind(asset.league_offer.map(|o| o.price))
        .bind(asset.league_offer.map(|o| o.expires_at))
        .bind(asset.clause.map(|c| c.value))
        .bind(asset.clause.map(|c| c.expires_at))
        .execute(&mut *self.tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::not_found(format!("asset {}", asset.key())));
        }
        Ok(())
    }

    async fn active_auction_for_update(
        &mut self,
        key: AssetKey,
        now: DateTime<Utc>,
    ) -> Result<Option<Auction>> {
        let sql = format!(
            "SELECT {AUCTION_COLUMNS} FROM auctions \
             WHERE league_id = $1 AND asset_kind = $2 AND asset_id = $3 AND ends_at > $4 \
             ORDER BY ends_at DESC, id DESC LIMIT 1 FOR UPDATE"
        );
        let row: Option<AuctionRow> = sqlx::query_as(&sql)
            .bind(key.league_id)
            .bind(key.kind.as_str())
            .bind(key.asset_id)
            .bind(now)
            .fetch_optional(&mut *self.tx)
            .await?;

        match row {
            Some(row) => Ok(attach_bids(&mut *self.tx, vec![row]).await?.pop()),
            None => Ok(None),
        }
    }

    async fn auction_for_update(&mut self, auction_id: AuctionId) -> Result<Option<Auction>> {
        let sql = format!("SELECT {AUCTION_COLUMNS} FROM auctions WHERE id = $1 FOR UPDATE");
        let row: Option<AuctionRow> =
            sqlx::query_as(&sql).bind(auction_id).fetch_optional(&mut *self.tx).await?;

        match row {
            Some(row) => Ok(attach_bids(&mut *self.tx, vec![row]).await?.pop()),
            None => Ok(None),
        }
    }

    async fn insert_auction(&mut self, key: AssetKey, ends_at: DateTime<Utc>) -> Result<Auction> {
        let id: i64 = sqlx::query_scalar(
            "INSERT INTO auctions (league_id, asset_kind, asset_id, ends_at) \
             VALUES ($1, $2, $3, $4) RETURNING id",
        )
        .bind(key.league_id)
        .bind(key.kind.as_str())
        .bind(key.asset_id)
        .bind(ends_at)
        .fetch_one(&mut *self.tx)
        .await?;

        Ok(Auction {
            id,
            league_id: key.league_id,
            kind: key.kind,
            asset_id: key.asset_id,
            ends_at,
            settled_at: None,
            bids: BidList::new(),
        })
    }

    async fn put_bid(&mut self, auction_id: AuctionId, bid: Bid) -> Result<()> {
        sqlx::query(
            "INSERT INTO auction_bids (auction_id, player_id, amount) VALUES ($1, $2, $3) \
             ON CONFLICT (auction_id, player_id) DO UPDATE SET amount = EXCLUDED.amount",
        )
        .bind(auction_id)
        .bind(bid.player_id)
        .bind(bid.amount)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn delete_bid(&mut self, auction_id: AuctionId, player_id: PlayerId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM auction_bids WHERE auction_id = $1 AND player_id = $2")
            .bind(auction_id)
            .bind(player_id)
            .execute(&mut *self.tx)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn mark_settled(&mut self, auction_id: AuctionId, at: DateTime<Utc>) -> Result<()> {
        let result = sqlx::query("UPDATE auctions SET settled_at = $2 WHERE id = $1")
            .bind(auction_id)
            .bind(at)
            .execute(&mut *self.tx)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::not_found(format!("auction {auction_id}")));
        }
        Ok(())
    }

    async fn ledger_for_update(
        &mut self,
        league_id: LeagueId,
        player_id: PlayerId,
    ) -> Result<Option<MembershipLedger>> {
        load_ledger(&mut *self.tx, league_id, player_id, true).await
    }

    async fn update_ledger_totals(&mut self, ledger: &MembershipLedger) -> Result<()> {
        let result = sqlx::query(
            "UPDATE league_members SET balance = $3, team_value = $4 \
             WHERE league_id = $1 AND player_id = $2",
        )
        .bind(ledger.league_id)
        .bind(ledger.player_id)
        .bind(ledger.balance)
        .bind(ledger.team_value)
        .execute(&mut *self.tx)
        .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::not_found(format!(
                "membership of player {} in league {}",
                ledger.player_id, ledger.league_id
            )));
        }
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
        let sql = if owned {
            "INSERT INTO member_assets (league_id, player_id, asset_kind, asset_id) \
             VALUES ($1, $2, $3, $4) ON CONFLICT DO NOTHING"
        } else {
            "DELETE FROM member_assets \
             WHERE league_id = $1 AND player_id = $2 AND asset_kind = $3 AND asset_id = $4"
        };
        sqlx::query(sql)
            .bind(league_id)
            .bind(player_id)
            .bind(kind.as_str())
            .bind(asset_id)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn append_transfer(&mut self, record: &TransferRecord) -> Result<()> {
        sqlx::query(
            "INSERT INTO transfer_history \
             (league_id, asset_id, asset_kind, player_id, counterparty_id, amount, kind, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        )
        .bind(record.league_id)
        .bind(record.asset_id)
        .bind(record.asset_kind.as_str())
        .bind(record.player_id)
        .bind(record.counterparty_id)
        .bind(record.amount)
        .bind(record.kind.as_str())
        .bind(record.created_at)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        let this = *self;
        this.tx.commit().await?;
        Ok(())
    }
}

/// Market store backed by a PostgreSQL pool
#[derive(Debug, Clone)]
pub struct PgMarketStore {
    pool: PgPool,
}

impl PgMarketStore {
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        info!("Connecting to database (max_connections={})", config.max_connections);
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(Duration::from_secs(config.acquire_timeout_secs))
            .connect(&config.url)
            .await?;
        Ok(Self { pool })
    }

    /// Applies bundled migrations
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        info!("Database migrations applied");
        Ok(())
    }

    pub async fn health_check(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl MarketStore for PgMarketStore {
    async fn begin(&self) -> Result<Box<dyn MarketTx>> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgMarketTx { tx }))
    }

    async fn seed_assets(&self, assets: &[NewAsset]) -> Result<Vec<Asset>> {
        let mut tx = self.pool.begin().await?;
        let mut created = Vec::new();

        for new in assets {
            // Insert the asset; existing catalog entries return no id
            let id: Option<i64> = sqlx::query_scalar(
                "INSERT INTO league_assets (league_id, asset_kind, catalog_id, value) \
                 VALUES ($1, $2, $3, $4) \
                 ON CONFLICT (league_id, asset_kind, catalog_id) DO NOTHING RETURNING id",
            )
            .bind(new.league_id)
            .bind(new.kind.as_str())
            .bind(new.catalog_id)
            .bind(new.value)
            .fetch_optional(&mut *tx)
            .await?;

            let Some(id) = id else {
                debug!("Skipping existing {} catalog entry {}", new.kind, new.catalog_id);
                continue;
            };

            // Create its slot outside the market
            sqlx::query(
                "INSERT INTO market_slots (league_id, asset_kind, asset_id, active, in_market) \
                 VALUES ($1, $2, $3, TRUE, FALSE)",
            )
            .bind(new.league_id)
            .bind(new.kind.as_str())
            .bind(id)
            .execute(&mut *tx)
            .await?;

            created.push(Asset {
                id,
                league_id: new.league_id,
                kind: new.kind,
                catalog_id: new.catalog_id,
                owner: None,
                value: new.value,
                sale: None,
                league_offer: None,
                clause: None,
            });
        }

        tx.commit().await?;
        Ok(created)
    }

    async fn create_membership(
        &self,
        league_id: LeagueId,
        player_id: PlayerId,
        balance: i64,
    ) -> Result<MembershipLedger> {
        let result = sqlx::query(
            "INSERT INTO league_members (league_id, player_id, balance, team_value) \
             VALUES ($1, $2, $3, 0) ON CONFLICT DO NOTHING",
        )
        .bind(league_id)
        .bind(player_id)
        .bind(balance)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::already_exists(format!(
                "membership of player {player_id} in league {league_id}"
            )));
        }
        Ok(MembershipLedger::new(league_id, player_id, balance))
    }

    async fn league_ids(&self) -> Result<Vec<LeagueId>> {
        let ids: Vec<LeagueId> = sqlx::query_scalar("SELECT DISTINCT league_id FROM league_assets ORDER BY league_id")
            .fetch_all(&self.pool)
            .await?;
        Ok(ids)
    }

    async fn asset(&self, key: AssetKey) -> Result<Option<Asset>> {
        let sql = format!(
            "SELECT {ASSET_COLUMNS} FROM league_assets \
             WHERE league_id = $1 AND asset_kind = $2 AND id = $3"
        );
        let row: Option<AssetRow> = sqlx::query_as(&sql)
            .bind(key.league_id)
            .bind(key.kind.as_str())
            .bind(key.asset_id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(Asset::try_from).transpose()
    }

    async fn assets(&self, league_id: LeagueId) -> Result<Vec<Asset>> {
        let sql = format!("SELECT {ASSET_COLUMNS} FROM league_assets WHERE league_id = $1 ORDER BY id");
        let rows: Vec<AssetRow> = sqlx::query_as(&sql).bind(league_id).fetch_all(&self.pool).await?;
        rows.into_iter().map(Asset::try_from).collect()
    }

    async fn ledger(
        &self,
        league_id: LeagueId,
        player_id: PlayerId,
    ) -> Result<Option<MembershipLedger>> {
        let mut conn = self.pool.acquire().await?;
        load_ledger(&mut *conn, league_id, player_id, false).await
    }

    async fn ledgers(&self, league_id: LeagueId) -> Result<Vec<MembershipLedger>> {
        let mut conn = self.pool.acquire().await?;
        let members: Vec<MemberRow> = sqlx::query_as(
            "SELECT league_id, player_id, balance, team_value FROM league_members \
             WHERE league_id = $1 ORDER BY player_id",
        )
        .bind(league_id)
        .fetch_all(&mut *conn)
        .await?;
        let owned: Vec<OwnedRow> = sqlx::query_as(
            "SELECT player_id, asset_kind, asset_id FROM member_assets \
             WHERE league_id = $1 ORDER BY added_seq",
        )
        .bind(league_id)
        .fetch_all(&mut *conn)
        .await?;
        assemble_ledgers(members, owned)
    }

    async fn transfers(&self, league_id: LeagueId) -> Result<Vec<TransferRecord>> {
        let rows: Vec<TransferRow> = sqlx::query_as(
            "SELECT league_id, asset_id, asset_kind, player_id, counterparty_id, amount, kind, created_at \
             FROM transfer_history WHERE league_id = $1 ORDER BY id",
        )
        .bind(league_id)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(TransferRecord::try_from).collect()
    }

    async fn slots(&self, league_id: LeagueId) -> Result<Vec<MarketSlot>> {
        let rows: Vec<SlotRow> = sqlx::query_as(
            "SELECT league_id, asset_kind, asset_id, active, in_market FROM market_slots \
             WHERE league_id = $1 ORDER BY asset_kind, asset_id",
        )
        .bind(league_id)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter()
            .map(|row| -> Result<MarketSlot> {
                Ok(MarketSlot {
                    league_id: row.league_id,
                    kind: row.asset_kind.parse()?,
                    asset_id: row.asset_id,
                    active: row.active,
                    in_market: row.in_market,
                })
            })
            .collect()
    }

    async fn replace_in_market(&self, league_id: LeagueId, selected: &[AssetKey]) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("UPDATE market_slots SET in_market = FALSE WHERE league_id = $1")
            .bind(league_id)
            .execute(&mut *tx)
            .await?;

        for key in selected {
            sqlx::query(
                "UPDATE market_slots SET in_market = active \
                 WHERE league_id = $1 AND asset_kind = $2 AND asset_id = $3",
            )
            .bind(league_id)
            .bind(key.kind.as_str())
            .bind(key.asset_id)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn auction(&self, auction_id: AuctionId) -> Result<Option<Auction>> {
        let mut conn = self.pool.acquire().await?;
        let sql = format!("SELECT {AUCTION_COLUMNS} FROM auctions WHERE id = $1");
        let row: Option<AuctionRow> =
            sqlx::query_as(&sql).bind(auction_id).fetch_optional(&mut *conn).await?;
        match row {
            Some(row) => Ok(attach_bids(&mut *conn, vec![row]).await?.pop()),
            None => Ok(None),
        }
    }

    async fn auctions(&self, league_id: LeagueId) -> Result<Vec<Auction>> {
        let mut conn = self.pool.acquire().await?;
        let sql = format!("SELECT {AUCTION_COLUMNS} FROM auctions WHERE league_id = $1 ORDER BY id");
        let rows: Vec<AuctionRow> = sqlx::query_as(&sql).bind(league_id).fetch_all(&mut *conn).await?;
        attach_bids(&mut *conn, rows).await
    }

    async fn expired_auctions(
        &self,
        league_id: LeagueId,
        now: DateTime<Utc>,
    ) -> Result<Vec<Auction>> {
        let mut conn = self.pool.acquire().await?;
        let sql = format!(
            "SELECT {AUCTION_COLUMNS} FROM auctions \
             WHERE league_id = $1 AND settled_at IS NULL AND ends_at <= $2 \
             ORDER BY ends_at, id"
        );
        let rows: Vec<AuctionRow> =
            sqlx::query_as(&sql).bind(league_id).bind(now).fetch_all(&mut *conn).await?;
        attach_bids(&mut *conn, rows).await
    }

    async fn delete_auctions(&self, league_id: LeagueId) -> Result<u64> {
        let result = sqlx::query("DELETE FROM auctions WHERE league_id = $1")
            .bind(league_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn next_refresh_at(&self, league_id: LeagueId) -> Result<Option<DateTime<Utc>>> {
        let at: Option<DateTime<Utc>> = sqlx::query_scalar("SELECT next_refresh_at FROM league_schedule WHERE league_id = $1")
            .bind(league_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(at)
    }

    async fn set_next_refresh_at(&self, league_id: LeagueId, at: DateTime<Utc>) -> Result<()> {
        sqlx::query(
            "INSERT INTO league_schedule (league_id, next_refresh_at) VALUES ($1, $2) \
             ON CONFLICT (league_id) DO UPDATE SET next_refresh_at = EXCLUDED.next_refresh_at",
        )
        .bind(league_id)
        .bind(at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
