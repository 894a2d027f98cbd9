//! REST API endpoints for the fantasy market
//!
//! All market endpoints live under `/api/market`. Endpoints acting on behalf
//! of a player read the caller from the `x-player-id` header, which the
//! upstream auth layer sets; bids carry the player id in the body.

use crate::error::{handle_rejection, reject};
use crate::models::{
    AssetRef, AuditResponse, LeagueOfferRequest, LeagueQuery, ListForSaleRequest,
    NextRefreshQuery, NextRefreshResponse, PlaceBidRequest, PlaceBidResponse, RemoveBidResponse,
    SettleRequest,
};
use auction_engine::{ledger, AuctionEngine, DirectSales};
use league_store::{AssetKey, PlayerId};
use market_scheduler::{MarketRotator, MarketScheduler};
use std::convert::Infallible;
use std::sync::Arc;
use warp::Filter;

/// Everything the handlers need, cloned into each request
#[derive(Clone)]
pub struct MarketApi {
    pub engine: AuctionEngine,
    pub sales: DirectSales,
    pub rotator: MarketRotator,
    /// Background scheduler, when one is running in this process
    pub scheduler: Option<Arc<MarketScheduler>>,
}

impl MarketApi {
    pub fn new(rotator: MarketRotator, scheduler: Option<Arc<MarketScheduler>>) -> Self {
        let engine = rotator.engine().clone();
        let sales = DirectSales::new(
            engine.store().clone(),
            engine.clock().clone(),
            engine.config().clone(),
        );
        Self { engine, sales, rotator, scheduler }
    }
}

/// Place or overwrite a bid
pub async fn place_bid(req: PlaceBidRequest, api: MarketApi) -> Result<impl warp::Reply, warp::Rejection> {
    let key = AssetKey::new(req.league_id, req.asset_kind, req.asset_id);
    let auction_id = api.engine.place_bid(key, req.player_id, req.amount).await.map_err(reject)?;
    Ok(warp::reply::json(&PlaceBidResponse { auction_id }))
}

pub async fn remove_bid(
    player_id: PlayerId,
    asset: AssetRef,
    api: MarketApi,
) -> Result<impl warp::Reply, warp::Rejection> {
    let removed = api.engine.remove_bid(asset.key(), player_id).await.map_err(reject)?;
    Ok(warp::reply::json(&RemoveBidResponse { removed }))
}

/// Manual settlement of one finished auction
pub async fn settle_auction(req: SettleRequest, api: MarketApi) -> Result<impl warp::Reply, warp::Rejection> {
    let settlement = api.engine.settle_finished(req.auction_id).await.map_err(reject)?;
    Ok(warp::reply::json(&settlement))
}

pub async fn get_market(query: LeagueQuery, api: MarketApi) -> Result<impl warp::Reply, warp::Rejection> {
    let view = api.rotator.market_view(query.league_id).await.map_err(reject)?;
    Ok(warp::reply::json(&view))
}

/// Operator rotation: purge auctions and pick a new market
pub async fn refresh_market(query: LeagueQuery, api: MarketApi) -> Result<impl warp::Reply, warp::Rejection> {
    let report = api.rotator.force_rotate(query.league_id).await.map_err(reject)?;
    Ok(warp::reply::json(&report))
}

pub async fn refresh_and_finish(query: LeagueQuery, api: MarketApi) -> Result<impl warp::Reply, warp::Rejection> {
    let report = api.rotator.settle_expired_and_rotate(query.league_id).await.map_err(reject)?;
    Ok(warp::reply::json(&report))
}

/// League-specific rotation time when `league_id` is given, otherwise the
/// next background sweep
pub async fn next_refresh(query: NextRefreshQuery, api: MarketApi) -> Result<impl warp::Reply, warp::Rejection> {
    let at = match query.league_id {
        Some(league_id) => api.engine.store().next_refresh_at(league_id).await.map_err(|e| {
            reject(auction_engine::MarketError::from(e))
        })?,
        None => api.scheduler.as_ref().and_then(|s| s.next_sweep_at()),
    };
    Ok(warp::reply::json(&NextRefreshResponse { next_refresh: at.map(|t| t.timestamp()) }))
}

pub async fn list_for_sale(
    player_id: PlayerId,
    req: ListForSaleRequest,
    api: MarketApi,
) -> Result<impl warp::Reply, warp::Rejection> {
    let listing = api.sales.list_for_sale(req.asset.key(), player_id, req.price).await.map_err(reject)?;
    Ok(warp::reply::json(&listing))
}

pub async fn post_league_offer(req: LeagueOfferRequest, api: MarketApi) -> Result<impl warp::Reply, warp::Rejection> {
    let offer = api
        .sales
        .post_league_offer(req.asset.key(), req.price, req.expires_at)
        .await
        .map_err(reject)?;
    Ok(warp::reply::json(&offer))
}

pub async fn accept_league_offer(
    player_id: PlayerId,
    asset: AssetRef,
    api: MarketApi,
) -> Result<impl warp::Reply, warp::Rejection> {
    let record = api.sales.accept_league_offer(asset.key(), player_id).await.map_err(reject)?;
    Ok(warp::reply::json(&record))
}

pub async fn reject_league_offer(
    player_id: PlayerId,
    asset: AssetRef,
    api: MarketApi,
) -> Result<impl warp::Reply, warp::Rejection> {
    api.sales.reject_league_offer(asset.key(), player_id).await.map_err(reject)?;
    Ok(warp::reply::json(&serde_json::json!({ "rejected": true })))
}

pub async fn audit_league(query: LeagueQuery, api: MarketApi) -> Result<impl warp::Reply, warp::Rejection> {
    let discrepancies =
        ledger::audit(api.engine.store().as_ref(), query.league_id).await.map_err(reject)?;
    Ok(warp::reply::json(&AuditResponse {
        league_id: query.league_id,
        consistent: discrepancies.is_empty(),
        discrepancies,
    }))
}

fn market_path() -> impl Filter<Extract = (), Error = warp::Rejection> + Clone {
    warp::path("api").and(warp::path("market"))
}

fn caller() -> impl Filter<Extract = (PlayerId,), Error = warp::Rejection> + Clone {
    warp::header::<PlayerId>("x-player-id")
}

/// Create REST API routes, with rejections rendered as JSON errors
pub fn create_routes(
    api: MarketApi,
) -> impl Filter<Extract = impl warp::Reply, Error = Infallible> + Clone {
    let api_filter = warp::any().map(move || api.clone());

    // Market listing
    let market = market_path()
        .and(warp::path::end())
        .and(warp::get())
        .and(warp::query::<LeagueQuery>())
        .and(api_filter.clone())
        .and_then(get_market);

    // Bidding; the bid body names the bidder, withdrawals use the caller header
    let bid = market_path()
        .and(warp::path("bid"))
        .and(warp::path::end())
        .and(warp::post())
        .and(warp::body::json())
        .and(api_filter.clone())
        .and_then(place_bid);

    let remove = market_path()
        .and(warp::path("remove-bid"))
        .and(warp::path::end())
        .and(warp::post())
        .and(caller())
        .and(warp::body::json())
        .and(api_filter.clone())
        .and_then(remove_bid);

    // Manual settlement of a finished auction
    let settle = market_path()
        .and(warp::path("settle"))
        .and(warp::path::end())
        .and(warp::post())
        .and(warp::body::json())
        .and(api_filter.clone())
        .and_then(settle_auction);

    // Operator rotation
    let refresh = market_path()
        .and(warp::path("refresh"))
        .and(warp::path::end())
        .and(warp::post())
        .and(warp::query::<LeagueQuery>())
        .and(api_filter.clone())
        .and_then(refresh_market);

    let refresh_finish = market_path()
        .and(warp::path("refresh-and-finish"))
        .and(warp::path::end())
        .and(warp::post())
        .and(warp::query::<LeagueQuery>())
        .and(api_filter.clone())
        .and_then(refresh_and_finish);

    let next = market_path()
        .and(warp::path("next-refresh"))
        .and(warp::path::end())
        .and(warp::get())
        .and(warp::query::<NextRefreshQuery>())
        .and(api_filter.clone())
        .and_then(next_refresh);

    // Direct sales
    let sale = market_path()
        .and(warp::path("sale"))
        .and(warp::path::end())
        .and(warp::post())
        .and(caller())
        .and(warp::body::json())
        .and(api_filter.clone())
        .and_then(list_for_sale);

    let offer = market_path()
        .and(warp::path("sale"))
        .and(warp::path("offer"))
        .and(warp::path::end())
        .and(warp::post())
        .and(warp::body::json())
        .and(api_filter.clone())
        .and_then(post_league_offer);

    let accept = market_path()
        .and(warp::path("sale"))
        .and(warp::path("accept"))
        .and(warp::path::end())
        .and(warp::post())
        .and(caller())
        .and(warp::body::json())
        .and(api_filter.clone())
        .and_then(accept_league_offer);

    let reject_offer = market_path()
        .and(warp::path("sale"))
        .and(warp::path("reject"))
        .and(warp::path::end())
        .and(warp::post())
        .and(caller())
        .and(warp::body::json())
        .and(api_filter.clone())
        .and_then(reject_league_offer);

    // Ownership consistency check
    let audit = market_path()
        .and(warp::path("audit"))
        .and(warp::path::end())
        .and(warp::get())
        .and(warp::query::<LeagueQuery>())
        .and(api_filter)
        .and_then(audit_league);

    // Health check endpoint
    let health = warp::path("health").and(warp::get()).map(|| {
        warp::reply::json(&serde_json::json!({
            "status": "healthy",
            "timestamp": chrono::Utc::now().to_rfc3339()
        }))
    });

    market
        .or(bid)
        .or(remove)
        .or(settle)
        .or(refresh)
        .or(refresh_finish)
        .or(next)
        .or(sale)
        .or(offer)
        .or(accept)
        .or(reject_offer)
        .or(audit)
        .or(health)
        .with(
            warp::cors()
                .allow_any_origin()
                .allow_headers(vec!["content-type", "x-player-id"])
                .allow_methods(vec!["GET", "POST", "OPTIONS"]),
        )
        .recover(handle_rejection)
}

#[cfg(test)]
mod tests {
    use super::*;
    use auction_engine::{Clock, ManualClock, MarketConfig};
    use chrono::{Duration, Utc};
    use league_store::{AssetKind, InMemoryStore, MarketStore};
    use market_scheduler::{CatalogEntry, SchedulerConfig};
    use serde_json::{json, Value};
    use warp::http::StatusCode;

    const LEAGUE: i64 = 3;

    struct TestApi {
        store: Arc<InMemoryStore>,
        clock: Arc<ManualClock>,
        api: MarketApi,
    }

    async fn test_api() -> TestApi {
        let store = Arc::new(InMemoryStore::new());
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let engine = AuctionEngine::new(store.clone(), clock.clone(), MarketConfig::default());
        let rotator = MarketRotator::new(engine, SchedulerConfig::default());

        let catalog: Vec<_> = (1..=10)
            .map(|id| CatalogEntry { kind: AssetKind::Pilot, catalog_id: id, value: 1_000 })
            .collect();
        rotator.seed_league(LEAGUE, &catalog).await.unwrap();
        store.create_membership(LEAGUE, 1, 100_000).await.unwrap();
        store.create_membership(LEAGUE, 2, 100_000).await.unwrap();

        TestApi { store, clock, api: MarketApi::new(rotator, None) }
    }

    async fn first_listed(t: &TestApi) -> i64 {
        let slot = t.store.slots(LEAGUE).await.unwrap().into_iter().find(|s| s.in_market).unwrap();
        slot.asset_id
    }

    fn body(response: &warp::http::Response<warp::hyper::body::Bytes>) -> Value {
        serde_json::from_slice(response.body()).unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let t = test_api().await;
        let routes = create_routes(t.api.clone());
        let response = warp::test::request().method("GET").path("/health").reply(&routes).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body(&response)["status"], "healthy");
    }

    #[tokio::test]
    async fn test_bid_then_manual_settle() {
        let t = test_api().await;
        let routes = create_routes(t.api.clone());
        let asset_id = first_listed(&t).await;

        let response = warp::test::request()
            .method("POST")
            .path("/api/market/bid")
            .json(&json!({
                "league_id": LEAGUE,
                "player_id": 1,
                "asset_kind": "pilot",
                "asset_id": asset_id,
                "amount": 5_000
            }))
            .reply(&routes)
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        let auction_id = body(&response)["auction_id"].as_i64().unwrap();

        let early = warp::test::request()
            .method("POST")
            .path("/api/market/settle")
            .json(&json!({ "auction_id": auction_id }))
            .reply(&routes)
            .await;
        assert_eq!(early.status(), StatusCode::CONFLICT);

        t.clock.advance(Duration::hours(24));
        let settled = warp::test::request()
            .method("POST")
            .path("/api/market/settle")
            .json(&json!({ "auction_id": auction_id }))
            .reply(&routes)
            .await;
        assert_eq!(settled.status(), StatusCode::OK);
        assert_eq!(body(&settled)["winner_id"], 1);
        assert_eq!(body(&settled)["asset_id"], asset_id);
        assert_eq!(t.store.ledger(LEAGUE, 1).await.unwrap().unwrap().balance, 95_000);
    }

    #[tokio::test]
    async fn test_invalid_bids_map_to_client_errors() {
        let t = test_api().await;
        let routes = create_routes(t.api.clone());
        let asset_id = first_listed(&t).await;

        let zero = warp::test::request()
            .method("POST")
            .path("/api/market/bid")
            .json(&json!({
                "league_id": LEAGUE, "player_id": 1, "asset_kind": "pilot",
                "asset_id": asset_id, "amount": 0
            }))
            .reply(&routes)
            .await;
        assert_eq!(zero.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body(&zero)["error"]["code"], "VALIDATION_ERROR");

        let unknown_kind = warp::test::request()
            .method("POST")
            .path("/api/market/bid")
            .json(&json!({
                "league_id": LEAGUE, "player_id": 1, "asset_kind": "goalkeeper",
                "asset_id": asset_id, "amount": 10
            }))
            .reply(&routes)
            .await;
        assert_eq!(unknown_kind.status(), StatusCode::BAD_REQUEST);

        let missing = warp::test::request()
            .method("POST")
            .path("/api/market/bid")
            .json(&json!({
                "league_id": LEAGUE, "player_id": 1, "asset_kind": "constructor",
                "asset_id": 9_999, "amount": 10
            }))
            .reply(&routes)
            .await;
        assert_eq!(missing.status(), StatusCode::NOT_FOUND);

        let settle_unknown = warp::test::request()
            .method("POST")
            .path("/api/market/settle")
            .json(&json!({ "auction_id": 424_242 }))
            .reply(&routes)
            .await;
        assert_eq!(settle_unknown.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_unaffordable_manual_settle_is_payment_required() {
        let t = test_api().await;
        let routes = create_routes(t.api.clone());
        let asset_id = first_listed(&t).await;
        let key = AssetKey::new(LEAGUE, AssetKind::Pilot, asset_id);
        let auction_id = t.api.engine.place_bid(key, 2, 500_000).await.unwrap();

        t.clock.advance(Duration::hours(24));
        let response = warp::test::request()
            .method("POST")
            .path("/api/market/settle")
            .json(&json!({ "auction_id": auction_id }))
            .reply(&routes)
            .await;
        assert_eq!(response.status(), StatusCode::PAYMENT_REQUIRED);
    }

    #[tokio::test]
    async fn test_remove_bid_requires_caller_header() {
        let t = test_api().await;
        let routes = create_routes(t.api.clone());
        let asset_id = first_listed(&t).await;
        let key = AssetKey::new(LEAGUE, AssetKind::Pilot, asset_id);
        t.api.engine.place_bid(key, 1, 700).await.unwrap();

        let payload = json!({ "league_id": LEAGUE, "asset_kind": "pilot", "asset_id": asset_id });
        let anonymous = warp::test::request()
            .method("POST")
            .path("/api/market/remove-bid")
            .json(&payload)
            .reply(&routes)
            .await;
        assert_eq!(anonymous.status(), StatusCode::BAD_REQUEST);

        let removed = warp::test::request()
            .method("POST")
            .path("/api/market/remove-bid")
            .header("x-player-id", "1")
            .json(&payload)
            .reply(&routes)
            .await;
        assert_eq!(removed.status(), StatusCode::OK);
        assert_eq!(body(&removed)["removed"], true);
    }

    #[tokio::test]
    async fn test_market_listing_and_rotation_endpoints() {
        let t = test_api().await;
        let routes = create_routes(t.api.clone());

        let market = warp::test::request()
            .method("GET")
            .path(&format!("/api/market?league_id={LEAGUE}"))
            .reply(&routes)
            .await;
        assert_eq!(market.status(), StatusCode::OK);
        assert_eq!(body(&market)["listings"].as_array().unwrap().len(), 8);

        let missing_query = warp::test::request().method("GET").path("/api/market").reply(&routes).await;
        assert_eq!(missing_query.status(), StatusCode::BAD_REQUEST);

        let finish = warp::test::request()
            .method("POST")
            .path(&format!("/api/market/refresh-and-finish?league_id={LEAGUE}"))
            .reply(&routes)
            .await;
        assert_eq!(finish.status(), StatusCode::OK);
        assert_eq!(body(&finish)["settled"], 0);

        let refresh = warp::test::request()
            .method("POST")
            .path(&format!("/api/market/refresh?league_id={LEAGUE}"))
            .reply(&routes)
            .await;
        assert_eq!(refresh.status(), StatusCode::OK);
        assert_eq!(body(&refresh)["auctions_deleted"], 8);

        let next = warp::test::request()
            .method("GET")
            .path(&format!("/api/market/next-refresh?league_id={LEAGUE}"))
            .reply(&routes)
            .await;
        let expected = (t.clock.now() + Duration::hours(24)).timestamp();
        assert_eq!(body(&next)["next_refresh"], expected);

        let no_scheduler = warp::test::request().method("GET").path("/api/market/next-refresh").reply(&routes).await;
        assert_eq!(body(&no_scheduler)["next_refresh"], Value::Null);

        let audit = warp::test::request()
            .method("GET")
            .path(&format!("/api/market/audit?league_id={LEAGUE}"))
            .reply(&routes)
            .await;
        assert_eq!(body(&audit)["consistent"], true);
    }

    #[tokio::test]
    async fn test_direct_sale_flow() {
        let t = test_api().await;
        let routes = create_routes(t.api.clone());
        let asset_id = first_listed(&t).await;
        let key = AssetKey::new(LEAGUE, AssetKind::Pilot, asset_id);
        let auction_id = t.api.engine.place_bid(key, 1, 10_000).await.unwrap();
        t.clock.advance(Duration::hours(24));
        t.api.engine.settle_finished(auction_id).await.unwrap();

        let asset = json!({ "league_id": LEAGUE, "asset_kind": "pilot", "asset_id": asset_id });
        let listing = json!({ "league_id": LEAGUE, "asset_kind": "pilot", "asset_id": asset_id, "price": 20_000 });

        let not_owner = warp::test::request()
            .method("POST")
            .path("/api/market/sale")
            .header("x-player-id", "2")
            .json(&listing)
            .reply(&routes)
            .await;
        assert_eq!(not_owner.status(), StatusCode::CONFLICT);

        let listed = warp::test::request()
            .method("POST")
            .path("/api/market/sale")
            .header("x-player-id", "1")
            .json(&listing)
            .reply(&routes)
            .await;
        assert_eq!(listed.status(), StatusCode::OK);

        let no_offer = warp::test::request()
            .method("POST")
            .path("/api/market/sale/accept")
            .header("x-player-id", "1")
            .json(&asset)
            .reply(&routes)
            .await;
        assert_eq!(no_offer.status(), StatusCode::CONFLICT);

        let offer = warp::test::request()
            .method("POST")
            .path("/api/market/sale/offer")
            .json(&json!({ "league_id": LEAGUE, "asset_kind": "pilot", "asset_id": asset_id, "price": 15_000 }))
            .reply(&routes)
            .await;
        assert_eq!(offer.status(), StatusCode::OK);

        let accepted = warp::test::request()
            .method("POST")
            .path("/api/market/sale/accept")
            .header("x-player-id", "1")
            .json(&asset)
            .reply(&routes)
            .await;
        assert_eq!(accepted.status(), StatusCode::OK);
        assert_eq!(body(&accepted)["kind"], "venta");
        assert_eq!(t.store.ledger(LEAGUE, 1).await.unwrap().unwrap().balance, 105_000);
    }
}
