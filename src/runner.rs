use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use env_logger::Env;
use log::{info, warn};
use rust_decimal::Decimal;
use tokio::sync::watch;

use crate::config::Settings;
use crate::grid::{
    AlertKind, AlertSink, ExchangeGateway, GridEngine, GridError, GridExchange, GridResult,
    GridRunner, LogAlertSink, RiskGuard, RunSummary,
};
use crate::market::{price_channel, spawn_ticker_feed, PaperExchange, PriceCell, PublicTicker};

/// Runner for the grid bot
pub struct BotRunner {
    config: Settings,
}

impl BotRunner {
    /// Create a new runner from a configuration file
    pub fn new(config_path: impl AsRef<Path>) -> GridResult<Self> {
        let path = config_path.as_ref().to_str().ok_or_else(|| {
            GridError::InvalidConfig("config path is not valid UTF-8".into())
        })?;
        let config = Settings::new(path)?;
        Ok(Self { config })
    }

    pub fn from_settings(config: Settings) -> Self {
        Self { config }
    }

    pub fn settings(&self) -> &Settings {
        &self.config
    }

    /// Install env_logger with the configured level unless `RUST_LOG` is set
    pub fn init_logging(&self) {
        env_logger::Builder::from_env(Env::default().default_filter_or(self.config.log.level.as_str()))
            .try_init()
            .ok();
    }

    /// Run the bot in dry-run mode until a signal or the run duration stops it
    pub async fn run(self) -> GridResult<RunSummary> {
        self.init_logging();
        info!("Starting BotRunner...");

        if !self.config.engine.dry_run {
            return Err(GridError::InvalidConfig(
                "live trading needs an authenticated exchange client; use run_with_exchange or set engine.dry_run = true".into(),
            ));
        }

        let (stop, shutdown) = watch::channel(false);
        spawn_signal_handler(stop);

        let symbol = self.config.grid.symbol.clone();
        let exchange_config = &self.config.exchange;
        let timeout = Duration::from_millis(exchange_config.request_timeout_ms);

        // 1. Price feed
        let (publisher, prices) = price_channel();
        let feed = if exchange_config.use_websocket {
            info!("Subscribing to ticker feed at {}", exchange_config.ws_url);
            Some(spawn_ticker_feed(
                exchange_config.ws_url.clone(),
                symbol.clone(),
                publisher,
                shutdown.clone(),
            ))
        } else {
            info!("WebSocket feed disabled, using REST ticker");
            None
        };
        let ticker = PublicTicker::new(exchange_config.rest_url.clone(), timeout)?;

        // 2. Paper market
        info!("Initializing PAPER market...");
        let exchange = PaperExchange::new(self.config.paper.clone(), prices.clone(), Some(ticker));

        let result = Self::run_with_exchange(&self.config, exchange, prices, shutdown).await;

        if let Some(feed) = feed {
            feed.abort();
        }
        result
    }

    /// Build the engine around `exchange` and run it.
    ///
    /// Entry point for callers that bring their own exchange client.
    pub async fn run_with_exchange<E: GridExchange + 'static>(
        settings: &Settings,
        exchange: E,
        prices: PriceCell,
        shutdown: watch::Receiver<bool>,
    ) -> GridResult<RunSummary> {
        let exchange = Arc::new(exchange);
        let gateway = ExchangeGateway::new(
            exchange,
            settings.exchange.max_in_flight,
            Duration::from_millis(settings.exchange.request_timeout_ms),
        );

        let grid_config = &settings.grid;
        let reference = if grid_config.auto_price {
            Some(startup_price(&gateway, &grid_config.symbol, prices.clone()).await?)
        } else {
            None
        };
        let grid = grid_config.build_grid(reference)?;
        info!(
            "Grid for {}: {} levels in [{}, {}] ({:?})",
            grid_config.symbol,
            grid.count(),
            grid.lower(),
            grid.upper(),
            grid.spacing()
        );

        let alerts: Arc<dyn AlertSink> = Arc::new(LogAlertSink);
        let risk = RiskGuard::new(settings.risk.clone(), alerts.clone());
        let engine = GridEngine::new(grid_config, grid, gateway, risk, prices, alerts.clone());

        alerts.notify(
            AlertKind::Lifecycle,
            &format!("{} grid bot starting", grid_config.symbol),
        );
        let summary = GridRunner::new(engine, settings.engine.clone(), shutdown)
            .run()
            .await?;
        alerts.notify(
            AlertKind::Lifecycle,
            &format!(
                "{} grid bot stopped after {} ticks",
                grid_config.symbol, summary.ticks
            ),
        );
        Ok(summary)
    }
}

/// Wait briefly for the feed, then fall back to asking the exchange
async fn startup_price<E: GridExchange + 'static>(
    gateway: &ExchangeGateway<E>,
    symbol: &str,
    mut prices: PriceCell,
) -> GridResult<Decimal> {
    if let Some(price) = prices.latest() {
        return Ok(price);
    }
    if let Ok(Some(price)) = tokio::time::timeout(Duration::from_secs(3), prices.changed()).await {
        return Ok(price);
    }
    warn!("No streamed price for {} yet, querying exchange", symbol);
    gateway.get_current_price(symbol).await
}

fn spawn_signal_handler(stop: watch::Sender<bool>) {
    tokio::spawn(async move {
        wait_for_signal().await;
        info!("Signal received, shutting down");
        let _ = stop.send(true);
    });
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    match signal(SignalKind::terminate()) {
        Ok(mut term) => {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = term.recv() => {}
            }
        }
        Err(e) => {
            warn!("SIGTERM handler unavailable: {}", e);
            let _ = tokio::signal::ctrl_c().await;
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
