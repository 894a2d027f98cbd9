//! Ownership ledger
//!
//! The only code that writes `Asset::owner` or a member's ownership lists.
//! Every function here runs inside the caller's transaction and expects the
//! asset row and the ledger row to be locked already.

use crate::error::{MarketError, Result};
use chrono::{DateTime, Utc};
use league_store::{
    Asset, AssetId, AssetKey, AssetKind, LeagueId, MarketStore, MarketTx, MembershipLedger,
    PlayerId, TransferKind, TransferRecord, MARKET_COUNTERPARTY,
};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, info};

/// Adds (`add = true`) or removes an asset id on the member's list for `kind`.
///
/// Adding an id already present and removing an absent one are no-ops.
/// Returns whether the list changed.
pub async fn transfer(
    tx: &mut dyn MarketTx,
    ledger: &mut MembershipLedger,
    kind: AssetKind,
    asset_id: AssetId,
    add: bool,
) -> Result<bool> {
    let changed = if add {
        ledger.owned.insert(kind, asset_id)
    } else {
        ledger.owned.remove(kind, asset_id)
    };

    if changed {
        tx.set_owned(ledger.league_id, ledger.player_id, kind, asset_id, add).await?;
        debug!(
            "Ownership list of player {} {} {} #{}",
            ledger.player_id,
            if add { "gained" } else { "lost" },
            kind,
            asset_id
        );
    }
    Ok(changed)
}

/// Moves a free asset to the member for `price`, debiting the balance.
pub async fn acquire(
    tx: &mut dyn MarketTx,
    asset: &mut Asset,
    ledger: &mut MembershipLedger,
    price: i64,
    at: DateTime<Utc>,
) -> Result<TransferRecord> {
    if ledger.balance < price {
        return Err(MarketError::InsufficientFunds { required: price, available: ledger.balance });
    }

    // Debit and add to the ownership list
    ledger.balance -= price;
    if transfer(tx, ledger, asset.kind, asset.id, true).await? {
        ledger.team_value += asset.value;
    }
    asset.owner = Some(ledger.player_id);

    tx.update_ledger_totals(ledger).await?;
    tx.update_asset(asset).await?;

    let record = TransferRecord {
        league_id: asset.league_id,
        asset_id: asset.id,
        asset_kind: asset.kind,
        player_id: ledger.player_id,
        counterparty_id: MARKET_COUNTERPARTY,
        amount: price,
        kind: TransferKind::Acquisition,
        created_at: at,
    };
    // Record in transfer history
    tx.append_transfer(&record).await?;

    info!("Player {} acquired {} for {}", ledger.player_id, asset.key(), price);
    Ok(record)
}

/// Returns an owned asset to the free-agent pool, crediting `price`.
pub async fn release(
    tx: &mut dyn MarketTx,
    asset: &mut Asset,
    ledger: &mut MembershipLedger,
    price: i64,
    at: DateTime<Utc>,
) -> Result<TransferRecord> {
    if asset.owner != Some(ledger.player_id) {
        return Err(MarketError::NotOwner { key: asset.key(), player_id: ledger.player_id });
    }

    // Credit and drop from the ownership list
    ledger.balance += price;
    if transfer(tx, ledger, asset.kind, asset.id, false).await? {
        ledger.team_value -= asset.value;
    }
    asset.owner = None;

    tx.update_ledger_totals(ledger).await?;
    tx.update_asset(asset).await?;

    let record = TransferRecord {
        league_id: asset.league_id,
        asset_id: asset.id,
        asset_kind: asset.kind,
        player_id: ledger.player_id,
        counterparty_id: MARKET_COUNTERPARTY,
        amount: price,
        kind: TransferKind::Disposal,
        created_at: at,
    };
    tx.append_transfer(&record).await?;

    info!("Player {} released {} for {}", ledger.player_id, asset.key(), price);
    Ok(record)
}

/// A single violation of the asset-owner / ownership-list agreement
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Discrepancy {
    /// Asset names an owner whose list does not contain it
    MissingFromList { key: AssetKey, owner: PlayerId },
    /// Asset names an owner with no membership in the league
    OwnerWithoutMembership { key: AssetKey, owner: PlayerId },
    /// List entry for an asset whose owner is someone else, or nobody
    StaleListEntry { league_id: LeagueId, kind: AssetKind, asset_id: AssetId, player_id: PlayerId },
    /// Same asset listed by more than one member
    ListedByMany { league_id: LeagueId, kind: AssetKind, asset_id: AssetId, players: Vec<PlayerId> },
}

/// Cross-checks every asset owner against every member's lists.
pub async fn audit(store: &dyn MarketStore, league_id: LeagueId) -> Result<Vec<Discrepancy>> {
    let assets = store.assets(league_id).await?;
    let ledgers = store.ledgers(league_id).await?;

    let by_player: HashMap<PlayerId, &MembershipLedger> =
        ledgers.iter().map(|l| (l.player_id, l)).collect();
    let owners: HashMap<(AssetKind, AssetId), Option<PlayerId>> =
        assets.iter().map(|a| ((a.kind, a.id), a.owner)).collect();

    let mut found = Vec::new();

    for asset in &assets {
        let Some(owner) = asset.owner else { continue };
        match by_player.get(&owner) {
            None => found.push(Discrepancy::OwnerWithoutMembership { key: asset.key(), owner }),
            Some(ledger) if !ledger.owned.contains(asset.kind, asset.id) => {
                found.push(Discrepancy::MissingFromList { key: asset.key(), owner })
            }
            Some(_) => {}
        }
    }

    let mut listed: BTreeMap<(AssetKind, AssetId), Vec<PlayerId>> = BTreeMap::new();
    for ledger in &ledgers {
        for (kind, asset_id) in ledger.owned.iter() {
            listed.entry((kind, asset_id)).or_default().push(ledger.player_id);
            if owners.get(&(kind, asset_id)).copied().flatten() != Some(ledger.player_id) {
                found.push(Discrepancy::StaleListEntry {
                    league_id,
                    kind,
                    asset_id,
                    player_id: ledger.player_id,
                });
            }
        }
    }

    for ((kind, asset_id), players) in listed {
        if players.len() > 1 {
            found.push(Discrepancy::ListedByMany { league_id, kind, asset_id, players });
        }
    }

    if !found.is_empty() {
        tracing::warn!("Ownership audit of league {} found {} discrepancies", league_id, found.len());
    }
    Ok(found)
}
