//! Service state and component lifecycle

use anyhow::{Context, Result};
use auction_engine::{AuctionEngine, Clock, SystemClock};
use chrono::{DateTime, Utc};
use league_store::{LeagueId, MarketStore};
use market_gateway::{create_routes, MarketApi};
use market_scheduler::{CatalogEntry, MarketRotator, MarketScheduler, SeedReport};
use metrics_exporter_prometheus::PrometheusBuilder;
use serde::Serialize;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::config::ServiceConfig;

/// Everything the running service owns
pub struct ServiceState {
    pub config: ServiceConfig,
    pub store: Arc<dyn MarketStore>,
    pub rotator: MarketRotator,
    pub scheduler: Arc<MarketScheduler>,
    /// Flipped to `true` once; the gateway exits as soon as it observes it
    gateway_shutdown: watch::Sender<bool>,
}

/// Point-in-time service status
#[derive(Debug, Clone, Serialize)]
pub struct ServiceHealth {
    pub scheduler_running: bool,
    pub next_sweep_at: Option<DateTime<Utc>>,
    pub leagues: usize,
    pub checked_at: DateTime<Utc>,
}

impl ServiceState {
    /// Connects the store and wires engine, rotator and scheduler
    pub async fn new(config: ServiceConfig) -> Result<Self> {
        let store = league_store::connect(&config.store)
            .await
            .context("Failed to connect league store")?;
        info!("League store ready ({:?} backend)", config.store.backend);

        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        Ok(Self::with_store(config, store, clock))
    }

    /// Wires the components around an existing store and clock
    pub fn with_store(config: ServiceConfig, store: Arc<dyn MarketStore>, clock: Arc<dyn Clock>) -> Self {
        let engine = AuctionEngine::new(Arc::clone(&store), Arc::clone(&clock), config.market.clone());
        let rotator = MarketRotator::new(engine, config.scheduler.clone());
        let scheduler = Arc::new(MarketScheduler::new(
            Arc::new(rotator.clone()),
            clock,
            config.scheduler.sweep_interval(),
        ));

        let (gateway_shutdown, _) = watch::channel(false);
        Self { config, store, rotator, scheduler, gateway_shutdown }
    }

    /// Serves Prometheus metrics on the configured port
    pub fn install_metrics_exporter(&self) -> Result<()> {
        if !self.config.metrics.enabled {
            info!("Metrics exporter disabled");
            return Ok(());
        }

        let addr = SocketAddr::from(([0, 0, 0, 0], self.config.metrics.port));
        PrometheusBuilder::new()
            .with_http_listener(addr)
            .install()
            .context("Failed to install Prometheus exporter")?;
        info!("Prometheus metrics available on {}", addr);
        Ok(())
    }

    /// Seeds a league from a JSON array of catalog entries
    pub async fn seed_league_from_file(&self, league_id: LeagueId, path: &Path) -> Result<SeedReport> {
        let raw = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read catalog file {:?}", path))?;
        let catalog: Vec<CatalogEntry> =
            serde_json::from_str(&raw).with_context(|| format!("Invalid catalog file {:?}", path))?;

        let report = self
            .rotator
            .seed_league(league_id, &catalog)
            .await
            .with_context(|| format!("Failed to seed league {}", league_id))?;
        info!(
            "Seeded league {}: {} assets created, {} placed in the market",
            league_id,
            report.assets_created,
            report.refresh.selected.len()
        );
        Ok(report)
    }

    pub fn start_scheduler(&self) -> Result<()> {
        self.scheduler.start().context("Failed to start market scheduler")?;
        metrics::gauge!("market_scheduler_running", 1.0);
        Ok(())
    }

    pub async fn stop_scheduler(&self) {
        self.scheduler.stop(self.config.scheduler.shutdown_timeout()).await;
        metrics::gauge!("market_scheduler_running", 0.0);
    }

    /// Runs the HTTP gateway until [`ServiceState::stop_gateway`] is called.
    /// A stop requested before this runs makes it return without binding.
    pub async fn run_gateway(&self) -> Result<()> {
        let addr = self.config.gateway_addr()?;
        let mut shutdown_rx = self.gateway_shutdown.subscribe();
        if *shutdown_rx.borrow() {
            info!("Market gateway stopped before it started");
            return Ok(());
        }

        let api = MarketApi::new(self.rotator.clone(), Some(Arc::clone(&self.scheduler)));
        let (bound, server) = warp::serve(create_routes(api))
            .try_bind_with_graceful_shutdown(addr, async move {
                while !*shutdown_rx.borrow() {
                    if shutdown_rx.changed().await.is_err() {
                        break;
                    }
                }
            })
            .with_context(|| format!("Failed to bind market gateway on {}", addr))?;

        info!("Market gateway listening on {}", bound);
        server.await;
        Ok(())
    }

    pub fn stop_gateway(&self) {
        if self.gateway_shutdown.send_replace(true) {
            warn!("Market gateway stop already requested");
        }
    }

    pub async fn health_check(&self) -> Result<ServiceHealth> {
        let leagues = self.store.league_ids().await.context("Failed to list leagues")?;
        Ok(ServiceHealth {
            scheduler_running: self.scheduler.is_running(),
            next_sweep_at: self.scheduler.next_sweep_at(),
            leagues: leagues.len(),
            checked_at: Utc::now(),
        })
    }
}
