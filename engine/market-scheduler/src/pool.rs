//! Market pool selection

use league_store::{Asset, AssetKey, MarketSlot};
use rand::seq::SliceRandom;
use rand::Rng;
use std::collections::HashMap;

/// Active slots whose asset has no owner
pub fn free_candidates(slots: &[MarketSlot], assets: &HashMap<AssetKey, Asset>) -> Vec<AssetKey> {
    slots
        .iter()
        .filter(|slot| slot.active)
        .map(MarketSlot::key)
        .filter(|key| assets.get(key).is_some_and(Asset::is_free_agent))
        .collect()
}

/// Uniformly shuffles the free candidates and keeps the first `market_size`.
pub fn select_market<R: Rng + ?Sized>(
    slots: &[MarketSlot],
    assets: &HashMap<AssetKey, Asset>,
    market_size: usize,
    rng: &mut R,
) -> Vec<AssetKey> {
    let mut candidates = free_candidates(slots, assets);
    candidates.shuffle(rng);
    candidates.truncate(market_size);
    candidates
}
