//! Background sweep task

use crate::error::{Result, SchedulerError};
use crate::rotation::RotationReport;
use auction_engine::Clock;
use chrono::{DateTime, Utc};
use league_store::LeagueId;
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// Lists leagues and sweeps one of them
#[async_trait::async_trait]
pub trait LeagueSweeper: Send + Sync {
    async fn league_ids(&self) -> Result<Vec<LeagueId>>;

    async fn sweep_league(&self, league_id: LeagueId) -> Result<RotationReport>;
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SweepSummary {
    pub leagues: usize,
    pub settled: usize,
    pub failed_leagues: Vec<LeagueId>,
}

/// Sweeps every league, one at a time, logging and skipping failures.
pub async fn run_sweep_once(sweeper: &dyn LeagueSweeper) -> Result<SweepSummary> {
    let league_ids = sweeper.league_ids().await?;
    let mut summary = SweepSummary { leagues: league_ids.len(), ..SweepSummary::default() };

    for league_id in league_ids {
        // A failing league must not block the others
        match sweeper.sweep_league(league_id).await {
            Ok(report) => summary.settled += report.settled,
            Err(e) => {
                error!("Sweep of league {} failed: {}", league_id, e);
                summary.failed_leagues.push(league_id);
            }
        }
    }

    metrics::increment_counter!("market_sweeps_total");
    info!(
        "Market sweep finished: {} leagues, {} auctions settled, {} leagues failed",
        summary.leagues,
        summary.settled,
        summary.failed_leagues.len()
    );
    Ok(summary)
}

/// Runs the sweep on a fixed interval until stopped
pub struct MarketScheduler {
    sweeper: Arc<dyn LeagueSweeper>,
    clock: Arc<dyn Clock>,
    interval: Duration,
    is_running: AtomicBool,
    next_sweep_at: Arc<RwLock<Option<DateTime<Utc>>>>,
    shutdown_tx: watch::Sender<bool>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl MarketScheduler {
    pub fn new(sweeper: Arc<dyn LeagueSweeper>, clock: Arc<dyn Clock>, interval: Duration) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            sweeper,
            clock,
            interval,
            is_running: AtomicBool::new(false),
            next_sweep_at: Arc::new(RwLock::new(None)),
            shutdown_tx,
            handle: Mutex::new(None),
        }
    }

    pub fn is_running(&self) -> bool {
        self.is_running.load(Ordering::SeqCst)
    }

    /// Wall-clock time of the next sweep, once started
    pub fn next_sweep_at(&self) -> Option<DateTime<Utc>> {
        *self.next_sweep_at.read()
    }

    /// Spawns the sweep loop. The first sweep runs one interval after start.
    pub fn start(&self) -> Result<()> {
        if self.is_running.swap(true, Ordering::SeqCst) {
            return Err(SchedulerError::AlreadyRunning);
        }
        // Reset the flag left by a previous stop
        self.shutdown_tx.send_replace(false);

        let sweeper = Arc::clone(&self.sweeper);
        let clock = Arc::clone(&self.clock);
        let next_sweep_at = Arc::clone(&self.next_sweep_at);
        let interval = self.interval;
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        let handle = tokio::spawn(async move {
            info!("Market scheduler started (interval {:?})", interval);
            loop {
                let step = chrono::Duration::from_std(interval).unwrap_or(chrono::Duration::zero());
                *next_sweep_at.write() = Some(clock.now() + step);

                tokio::select! {
                    // Sleep until the next sweep or a stop request, whichever comes first
                    _ = tokio::time::sleep(interval) => {
                        if let Err(e) = run_sweep_once(sweeper.as_ref()).await {
                            error!("Market sweep failed: {}", e);
                        }
                    }
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            break;
                        }
                    }
                }
            }
            *next_sweep_at.write() = None;
            info!("Market scheduler stopped");
        });

        *self.handle.lock() = Some(handle);
        Ok(())
    }

    /// Signals the loop and waits up to `timeout` for it to exit.
    pub async fn stop(&self, timeout: Duration) {
        if !self.is_running.swap(false, Ordering::SeqCst) {
            return;
        }
        self.shutdown_tx.send_replace(true);

        let handle = self.handle.lock().take();
        if let Some(handle) = handle {
            let abort = handle.abort_handle();
            if tokio::time::timeout(timeout, handle).await.is_err() {
                warn!("Market scheduler did not stop within {:?}, aborting", timeout);
                abort.abort();
            }
        }
    }
}
