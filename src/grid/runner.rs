//! Grid bot runner - main execution loop

use std::time::Duration;

use log::{error, info, warn};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::time::{interval, Instant, MissedTickBehavior};

use super::engine::{GridEngine, TickOutcome, TickReport};
use super::errors::{GridError, GridResult};
use super::executor::GridExchange;
use super::types::{EngineStatus, FailureCounters, LedgerStatistics, RiskStatus};

/// Grid bot runner configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunnerConfig {
    /// Seconds between reconciliation ticks
    #[serde(default = "default_tick_interval")]
    pub tick_interval_secs: u64,

    /// Seconds between status log lines
    #[serde(default = "default_status_interval")]
    pub status_interval_secs: u64,

    /// Stop after this many seconds; run until signalled when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_duration_secs: Option<u64>,

    /// Route orders to the paper exchange
    #[serde(default = "default_dry_run")]
    pub dry_run: bool,
}

fn default_tick_interval() -> u64 {
    30
}

fn default_status_interval() -> u64 {
    60
}

fn default_dry_run() -> bool {
    true
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            tick_interval_secs: default_tick_interval(),
            status_interval_secs: default_status_interval(),
            run_duration_secs: None,
            dry_run: default_dry_run(),
        }
    }
}

impl RunnerConfig {
    pub fn validate(&self) -> GridResult<()> {
        if self.tick_interval_secs == 0 {
            return Err(GridError::InvalidConfig(
                "tick_interval_secs must be positive".into(),
            ));
        }
        if self.status_interval_secs == 0 {
            return Err(GridError::InvalidConfig(
                "status_interval_secs must be positive".into(),
            ));
        }
        if self.run_duration_secs == Some(0) {
            return Err(GridError::InvalidConfig(
                "run_duration_secs must be positive when set".into(),
            ));
        }
        Ok(())
    }
}

/// Final numbers after the runner stops
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    pub ticks: u64,
    pub ledger: LedgerStatistics,
    pub failures: FailureCounters,
    pub cancelled_on_exit: usize,
}

/// Drives a [`GridEngine`] until shutdown
pub struct GridRunner<E: GridExchange + 'static> {
    engine: GridEngine<E>,
    config: RunnerConfig,
    shutdown: watch::Receiver<bool>,
}

impl<E: GridExchange + 'static> GridRunner<E> {
    pub fn new(engine: GridEngine<E>, config: RunnerConfig, shutdown: watch::Receiver<bool>) -> Self {
        Self {
            engine,
            config,
            shutdown,
        }
    }

    pub fn engine(&self) -> &GridEngine<E> {
        &self.engine
    }

    /// Seed the grid, tick until shutdown or the run duration elapses, then
    /// cancel everything still resting.
    ///
    /// Seeding errors are returned; steady-state errors are logged only.
    pub async fn run(&mut self) -> GridResult<RunSummary> {
        info!("Starting grid bot for {}", self.engine.symbol());
        let seed = self.engine.place_initial_grid().await?;
        info!(
            "Grid seeded: {} placed, {} failed",
            seed.placed, seed.failed
        );

        let status_task = spawn_status_logger(
            self.engine.subscribe_status(),
            Duration::from_secs(self.config.status_interval_secs),
        );

        let deadline = self
            .config
            .run_duration_secs
            .map(|secs| Instant::now() + Duration::from_secs(secs));
        let mut ticker = interval(Duration::from_secs(self.config.tick_interval_secs));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // First tick fires immediately; the grid was just seeded
        ticker.tick().await;

        loop {
            if *self.shutdown.borrow() {
                info!("Shutdown requested");
                break;
            }
            if deadline.is_some_and(|d| Instant::now() >= d) {
                info!("Run duration reached");
                break;
            }

            tokio::select! {
                _ = ticker.tick() => {
                    let report = self.engine.tick().await;
                    log_tick(&report);
                }
                res = self.shutdown.changed() => {
                    if res.is_err() {
                        warn!("Shutdown sender dropped, stopping");
                        break;
                    }
                }
                _ = sleep_until_deadline(deadline) => {}
            }
        }

        status_task.abort();

        let cancelled = self.engine.cancel_all().await;
        if cancelled.failed > 0 {
            error!(
                "{} orders could not be cancelled on shutdown",
                cancelled.failed
            );
        }

        let status = self.engine.status();
        info!(
            "Stopped after {} ticks: {} fills, {} cancelled, {} placement failures",
            status.ticks,
            status.ledger.filled,
            cancelled.cancelled,
            status.failures.placements
        );

        Ok(RunSummary {
            ticks: status.ticks,
            ledger: status.ledger,
            failures: status.failures,
            cancelled_on_exit: cancelled.cancelled,
        })
    }
}

async fn sleep_until_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(d) => tokio::time::sleep_until(d).await,
        None => std::future::pending::<()>().await,
    }
}

fn log_tick(report: &TickReport) {
    match &report.outcome {
        TickOutcome::Completed => {
            if report.failed > 0 {
                warn!(
                    "Tick: {} fills, {} placed, {} failed",
                    report.fills, report.placed, report.failed
                );
            }
        }
        TickOutcome::Paused { reason } => warn!("Tick skipped, paused: {}", reason),
        TickOutcome::RiskTripped { reason } => error!("Risk breach: {}", reason),
        TickOutcome::PriceUnavailable(e) => warn!("Tick skipped: {}", e),
        TickOutcome::SnapshotFailed(e) => warn!("Tick skipped, snapshot failed: {}", e),
    }
}

/// Format one status line
pub fn format_status(status: &EngineStatus) -> String {
    let price = status
        .last_price
        .map(|p| p.to_string())
        .unwrap_or_else(|| "-".into());
    let risk = match &status.risk {
        RiskStatus::Active => "active".to_string(),
        RiskStatus::Paused { reason } => format!("PAUSED ({})", reason),
    };
    format!(
        "{} price={} range=[{}, {}] open={}b/{}s filled={} failures={} risk={}",
        status.symbol,
        price,
        status.lower,
        status.upper,
        status.ledger.open_buys,
        status.ledger.open_sells,
        status.ledger.filled,
        status.failures.placements + status.failures.cancellations + status.failures.snapshots,
        risk
    )
}

/// Log the latest engine status on its own interval, independent of ticks
fn spawn_status_logger(
    mut status: watch::Receiver<EngineStatus>,
    every: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut timer = interval(every);
        timer.tick().await;
        loop {
            timer.tick().await;
            let line = format_status(&status.borrow_and_update());
            info!("Status: {}", line);
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::alert::mock::RecordingAlertSink;
    use crate::grid::config::GridConfig;
    use crate::grid::executor::mock::MockExchange;
    use crate::grid::executor::ExchangeGateway;
    use crate::grid::risk::{RiskConfig, RiskGuard};
    use crate::market::price_channel;
    use rust_decimal_macros::dec;
    use std::sync::Arc;

    fn runner(config: RunnerConfig) -> (GridRunner<MockExchange>, Arc<MockExchange>, watch::Sender<bool>) {
        let grid_config = GridConfig::new("SOL_USDC", dec!(90), dec!(110), 10, dec!(1));
        let grid = grid_config.build_grid(None).unwrap();
        let exchange = Arc::new(MockExchange::new(dec!(100)));
        let gateway = ExchangeGateway::new(exchange.clone(), 4, Duration::from_secs(1));
        let alerts = Arc::new(RecordingAlertSink::new());
        let guard = RiskGuard::new(RiskConfig::default(), alerts.clone());
        let (_publisher, cell) = price_channel();
        let engine = GridEngine::new(&grid_config, grid, gateway, guard, cell, alerts);
        let (tx, rx) = watch::channel(false);
        (GridRunner::new(engine, config, rx), exchange, tx)
    }

    #[tokio::test]
    async fn test_runner_stops_after_duration_and_cancels() {
        let config = RunnerConfig {
            tick_interval_secs: 1,
            run_duration_secs: Some(1),
            ..Default::default()
        };
        let (mut runner, exchange, _tx) = runner(config);

        let summary = tokio::time::timeout(Duration::from_secs(5), runner.run())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(summary.cancelled_on_exit, 10);
        assert_eq!(summary.ledger.open, 0);
        assert!(exchange.resting.lock().await.is_empty());
    }

    #[tokio::test]
    async fn test_runner_stops_on_shutdown_signal() {
        let (mut runner, _exchange, tx) = runner(RunnerConfig::default());
        let handle = tokio::spawn(async move { runner.run().await });

        tokio::time::sleep(Duration::from_millis(100)).await;
        tx.send(true).unwrap();

        let summary = tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(summary.ticks, 0);
        assert_eq!(summary.cancelled_on_exit, 10);
    }

    #[tokio::test]
    async fn test_runner_seed_failure_is_fatal() {
        let (mut runner, exchange, _tx) = runner(RunnerConfig::default());
        exchange.set_price(dec!(500)).await;
        assert!(matches!(
            runner.run().await,
            Err(GridError::PriceOutOfRange { .. })
        ));
    }

    #[test]
    fn test_runner_config_validation() {
        assert!(RunnerConfig::default().validate().is_ok());
        let bad = RunnerConfig {
            tick_interval_secs: 0,
            ..Default::default()
        };
        assert!(bad.validate().is_err());
    }

    #[test]
    fn test_format_status() {
        let status = EngineStatus {
            symbol: "SOL_USDC".into(),
            last_price: Some(dec!(100)),
            lower: dec!(90),
            upper: dec!(110),
            ledger: LedgerStatistics {
                open_buys: 5,
                open_sells: 4,
                filled: 1,
                ..Default::default()
            },
            risk: RiskStatus::Active,
            failures: FailureCounters::default(),
            ticks: 3,
            updated_at: chrono::Utc::now(),
        };
        assert_eq!(
            format_status(&status),
            "SOL_USDC price=100 range=[90, 110] open=5b/4s filled=1 failures=0 risk=active"
        );
    }
}
