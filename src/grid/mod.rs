//! Grid Trading Module
//!
//! Decision engine for a self-balancing grid: levels, the order ledger, the
//! risk circuit breaker and the reconciliation loop that ties them together.
//!
//! # Architecture
//!
//! - [`config`] - Grid configuration and validation
//! - [`types`] - Core data types (Order, OrderSide, EngineStatus, ...)
//! - [`errors`] - Grid-specific error types
//! - [`levels`] - Immutable price ladder (arithmetic or geometric spacing)
//! - [`ledger`] - Order ledger with per-side price index
//! - [`risk`] - Drawdown and volatility circuit breaker
//! - [`alert`] - Alert sink for risk breaches and order failures
//! - [`executor`] - Exchange abstraction (mockable for testing) and gateway
//! - [`engine`] - Reconciliation loop and replacement policy
//! - [`runner`] - Main execution loop
//!
//! # Example Usage
//!
//! ```rust,ignore
//! use backpack_grid_bot::grid::{
//!     ExchangeGateway, GridConfig, GridEngine, GridRunner, LogAlertSink,
//!     RiskConfig, RiskGuard, RunnerConfig,
//! };
//! use backpack_grid_bot::market::price_channel;
//!
//! let config = GridConfig::new("SOL_USDC", dec!(90), dec!(110), 10, dec!(0.1));
//! let grid = config.build_grid(None)?;
//! let alerts = Arc::new(LogAlertSink);
//! let (_publisher, prices) = price_channel();
//! let gateway = ExchangeGateway::new(Arc::new(exchange), 4, Duration::from_secs(10));
//! let risk = RiskGuard::new(RiskConfig::default(), alerts.clone());
//! let engine = GridEngine::new(&config, grid, gateway, risk, prices, alerts);
//!
//! let (_stop, shutdown) = tokio::sync::watch::channel(false);
//! GridRunner::new(engine, RunnerConfig::default(), shutdown).run().await?;
//! ```
//!
//! # Testing
//!
//! ```rust,ignore
//! use backpack_grid_bot::grid::executor::mock::MockExchange;
//! use backpack_grid_bot::grid::alert::mock::RecordingAlertSink;
//!
//! let exchange = MockExchange::new(dec!(100));
//! ```

pub mod alert;
pub mod config;
pub mod engine;
pub mod errors;
pub mod executor;
pub mod ledger;
pub mod levels;
pub mod risk;
pub mod runner;
pub mod types;

// Re-export commonly used types
pub use alert::{AlertKind, AlertSink, LogAlertSink};
pub use config::{GridConfig, GridSpacing};
pub use engine::{CancelReport, GridEngine, SeedReport, TickOutcome, TickReport};
pub use errors::{GridError, GridResult};
pub use executor::{ExchangeGateway, GridExchange};
pub use ledger::OrderLedger;
pub use levels::Grid;
pub use risk::{RiskConfig, RiskGuard};
pub use runner::{GridRunner, RunSummary, RunnerConfig};
pub use types::{
    EngineStatus, FailureCounters, GridOrderRequest, LedgerStatistics, Order, OrderId,
    OrderSide, OrderStatus, RiskStatus,
};
