//! Grid engine - reconciliation loop that turns exchange state into ledger
//! mutations and replacement orders.
//!
//! The engine is the only writer of the ledger and the risk guard. Every
//! exchange call goes through the [`ExchangeGateway`] and is awaited before
//! the next step, so mutations within a tick are serialized.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use log::{debug, error, info, warn};
use rust_decimal::Decimal;
use tokio::sync::watch;

use super::alert::{AlertKind, AlertSink};
use super::config::{GridConfig, GridSpacing};
use super::errors::{GridError, GridResult};
use super::executor::{ExchangeGateway, GridExchange};
use super::ledger::OrderLedger;
use super::levels::Grid;
use super::risk::RiskGuard;
use super::types::{EngineStatus, FailureCounters, GridOrderRequest, OrderId, OrderSide};
use crate::market::PriceCell;

/// Result of seeding the grid
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SeedReport {
    pub buy_levels: usize,
    pub sell_levels: usize,
    pub placed: usize,
    /// Levels still held by an open order from before, e.g. after a partial cancel
    pub skipped: usize,
    pub failed: usize,
}

/// How a tick ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// Reconciliation ran to the end
    Completed,
    /// Guard was already paused; nothing was placed
    Paused { reason: String },
    /// A risk check tripped during this tick
    RiskTripped { reason: String },
    /// No price from the feed or the exchange
    PriceUnavailable(String),
    /// The open-order snapshot could not be fetched; ledger untouched
    SnapshotFailed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TickReport {
    pub outcome: TickOutcome,
    pub price: Option<Decimal>,
    /// Orders inferred as filled
    pub fills: usize,
    pub placed: usize,
    /// Replacements skipped at the grid edge or on an occupied level
    pub skipped: usize,
    pub failed: usize,
}

impl TickReport {
    fn new(price: Option<Decimal>) -> Self {
        Self {
            outcome: TickOutcome::Completed,
            price,
            fills: 0,
            placed: 0,
            skipped: 0,
            failed: 0,
        }
    }

    fn ended(mut self, outcome: TickOutcome) -> Self {
        self.outcome = outcome;
        self
    }
}

/// Result of the shutdown cancel pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CancelReport {
    pub cancelled: usize,
    pub failed: usize,
    /// True when the bulk cancel succeeded
    pub bulk: bool,
}

pub struct GridEngine<E: GridExchange + 'static> {
    symbol: String,
    quantity: Decimal,
    spacing: GridSpacing,
    price_decimals: u32,
    recenter_threshold: Decimal,
    grid: Grid,
    ledger: OrderLedger,
    risk: RiskGuard,
    gateway: ExchangeGateway<E>,
    prices: PriceCell,
    alerts: Arc<dyn AlertSink>,
    failures: FailureCounters,
    ticks: u64,
    last_price: Option<Decimal>,
    status_tx: watch::Sender<EngineStatus>,
}

impl<E: GridExchange + 'static> GridEngine<E> {
    pub fn new(
        config: &GridConfig,
        grid: Grid,
        gateway: ExchangeGateway<E>,
        risk: RiskGuard,
        prices: PriceCell,
        alerts: Arc<dyn AlertSink>,
    ) -> Self {
        let ledger = OrderLedger::new();
        let initial = EngineStatus {
            symbol: config.symbol.clone(),
            last_price: None,
            lower: grid.lower(),
            upper: grid.upper(),
            ledger: ledger.statistics(),
            risk: risk.status(),
            failures: FailureCounters::default(),
            ticks: 0,
            updated_at: Utc::now(),
        };
        let (status_tx, _) = watch::channel(initial);

        Self {
            symbol: config.symbol.clone(),
            quantity: config.quantity,
            spacing: grid.spacing(),
            price_decimals: config.price_decimals,
            recenter_threshold: config.recenter_threshold,
            grid,
            ledger,
            risk,
            gateway,
            prices,
            alerts,
            failures: FailureCounters::default(),
            ticks: 0,
            last_price: None,
            status_tx,
        }
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn grid(&self) -> &Grid {
        &self.grid
    }

    pub fn ledger(&self) -> &OrderLedger {
        &self.ledger
    }

    pub fn risk(&self) -> &RiskGuard {
        &self.risk
    }

    pub fn failures(&self) -> FailureCounters {
        self.failures
    }

    /// Receiver for the status snapshot published after every tick
    pub fn subscribe_status(&self) -> watch::Receiver<EngineStatus> {
        self.status_tx.subscribe()
    }

    pub fn status(&self) -> EngineStatus {
        EngineStatus {
            symbol: self.symbol.clone(),
            last_price: self.last_price,
            lower: self.grid.lower(),
            upper: self.grid.upper(),
            ledger: self.ledger.statistics(),
            risk: self.risk.status(),
            failures: self.failures,
            ticks: self.ticks,
            updated_at: Utc::now(),
        }
    }

    fn publish_status(&self) {
        self.status_tx.send_replace(self.status());
    }

    /// Manual resume after a risk breach
    pub fn resume_trading(&mut self) {
        self.risk.resume();
        self.alerts
            .notify(AlertKind::Lifecycle, &format!("{} trading resumed", self.symbol));
        self.publish_status();
    }

    /// Latest feed price, falling back to the exchange
    pub async fn current_price(&self) -> GridResult<Decimal> {
        if let Some(price) = self.prices.latest() {
            return Ok(price);
        }
        self.gateway.get_current_price(&self.symbol).await
    }

    /// Place one order at a grid level and record it. Failures are logged,
    /// counted and alerted; the caller carries on.
    async fn place_and_record(&mut self, side: OrderSide, price: Decimal, quantity: Decimal) -> bool {
        let result = match self.grid.level_index(price) {
            Some(index) => {
                let request = GridOrderRequest::new(index, price, quantity, side);
                self.gateway.place_limit_order(&self.symbol, &request).await
            }
            None => Err(GridError::InvalidRange(format!("{} is not a grid level", price))),
        };

        match result {
            Ok(id) => {
                info!("Placed {} {} @ {} -> {}", side, quantity, price, id);
                match self.ledger.add(id.clone(), side, price, quantity) {
                    Ok(_) => true,
                    Err(e) => {
                        self.failures.ledger += 1;
                        error!("Order {} resting but not tracked: {}", id, e);
                        self.alerts.notify(
                            AlertKind::OrderError,
                            &format!("{} order {} untracked: {}", self.symbol, id, e),
                        );
                        false
                    }
                }
            }
            Err(e) => {
                self.failures.placements += 1;
                error!("Failed to place {} @ {}: {}", side, price, e);
                self.alerts.notify(
                    AlertKind::OrderError,
                    &format!("{} {} @ {} failed: {}", self.symbol, side, price, e),
                );
                false
            }
        }
    }

    async fn seed_initial_balance(&mut self, price: Decimal) {
        if self.risk.initial_balance().is_some() {
            return;
        }
        match self.gateway.get_account_value(&self.symbol, price).await {
            Ok(value) => self.risk.set_initial_balance(value),
            Err(e) => warn!("Account value unavailable, drawdown check deferred: {}", e),
        }
    }

    /// Place the balanced initial grid around the current price
    pub async fn place_initial_grid(&mut self) -> GridResult<SeedReport> {
        let price = self.current_price().await?;
        self.last_price = Some(price);

        if !self.grid.is_within(price) {
            return Err(GridError::PriceOutOfRange {
                price,
                lower: self.grid.lower(),
                upper: self.grid.upper(),
            });
        }

        self.seed_initial_balance(price).await;

        let (buys, sells) = self.grid.balanced_split(price);
        let mut report = SeedReport {
            buy_levels: buys.len(),
            sell_levels: sells.len(),
            ..Default::default()
        };
        info!(
            "Seeding grid at {}: {} buys, {} sells",
            price, report.buy_levels, report.sell_levels
        );

        let quantity = self.quantity;
        let plan = buys
            .into_iter()
            .map(|p| (OrderSide::Buy, p))
            .chain(sells.into_iter().map(|p| (OrderSide::Sell, p)));
        for (side, level) in plan {
            if self.ledger.has_order_at_price(level, side) {
                debug!("{} level {} still held, not re-seeding it", side, level);
                report.skipped += 1;
                continue;
            }
            if self.place_and_record(side, level, quantity).await {
                report.placed += 1;
            } else {
                report.failed += 1;
            }
        }

        info!(
            "Placed {}/{} grid orders ({} levels already held)",
            report.placed,
            report.buy_levels + report.sell_levels,
            report.skipped
        );
        self.publish_status();
        Ok(report)
    }

    /// Run one monitoring tick
    pub async fn tick(&mut self) -> TickReport {
        self.ticks += 1;

        let price = match self.current_price().await {
            Ok(p) => {
                self.last_price = Some(p);
                Some(p)
            }
            Err(e) => {
                warn!("No price for {}: {}", self.symbol, e);
                None
            }
        };

        let report = self.run_tick(price).await;
        self.publish_status();
        report
    }

    async fn run_tick(&mut self, price: Option<Decimal>) -> TickReport {
        let report = TickReport::new(price);

        if self.risk.is_paused() {
            if let Some(p) = price {
                self.risk.record_price(p);
            }
            let reason = self.risk.pause_reason().unwrap_or_default().to_string();
            warn!("Trading paused ({}), skipping placement", reason);
            return report.ended(TickOutcome::Paused { reason });
        }

        let price = match price {
            Some(p) => p,
            None => {
                return report.ended(TickOutcome::PriceUnavailable(format!(
                    "no price for {}",
                    self.symbol
                )))
            }
        };

        if self.risk.check_volatility(price) {
            let reason = self.risk.pause_reason().unwrap_or_default().to_string();
            return report.ended(TickOutcome::RiskTripped { reason });
        }

        match self.gateway.get_account_value(&self.symbol, price).await {
            Ok(value) => {
                if self.risk.initial_balance().is_none() {
                    self.risk.set_initial_balance(value);
                } else if self.risk.check_drawdown(value) {
                    let reason = self.risk.pause_reason().unwrap_or_default().to_string();
                    return report.ended(TickOutcome::RiskTripped { reason });
                }
            }
            Err(e) => warn!("Account value unavailable, drawdown check skipped: {}", e),
        }

        if self.grid.needs_recenter(price, self.recenter_threshold) {
            warn!(
                "Price {} near or outside grid [{}, {}], consider re-centering",
                price,
                self.grid.lower(),
                self.grid.upper()
            );
        }

        let open_ids = match self.gateway.get_open_order_ids(&self.symbol).await {
            Ok(ids) => ids,
            Err(e) => {
                self.failures.snapshots += 1;
                error!("Failed to fetch open orders: {}", e);
                return report.ended(TickOutcome::SnapshotFailed(e.to_string()));
            }
        };

        self.reconcile(&open_ids, report).await
    }

    /// Infer fills from `open_ids` and place replacements.
    ///
    /// Every missing order is marked filled before any replacement is
    /// decided, so a level vacated in the same tick counts as free.
    async fn reconcile(&mut self, open_ids: &HashSet<OrderId>, mut report: TickReport) -> TickReport {
        let mut missing: Vec<(OrderId, Decimal)> = self
            .ledger
            .open_orders()
            .into_iter()
            .filter(|o| !open_ids.contains(&o.id))
            .map(|o| (o.id.clone(), o.price))
            .collect();
        missing.sort_by(|a, b| a.1.cmp(&b.1).then_with(|| a.0.cmp(&b.0)));

        let mut filled = Vec::with_capacity(missing.len());
        for (id, _) in missing {
            match self.ledger.mark_filled(&id) {
                Ok(order) => {
                    info!(
                        "Order {} filled: {} {} @ {}",
                        order.id, order.side, order.quantity, order.price
                    );
                    filled.push((order.side, order.price, order.quantity));
                }
                Err(e) => {
                    self.failures.ledger += 1;
                    warn!("Ledger inconsistency: {}", e);
                }
            }
        }
        report.fills = filled.len();

        for (side, price, quantity) in filled {
            let opposite = side.opposite();
            let next = match side {
                OrderSide::Buy => self.grid.next_level_up(price),
                OrderSide::Sell => self.grid.next_level_down(price),
            };

            match next {
                None => {
                    debug!("{} @ {} filled at grid edge, no replacement", side, price);
                    report.skipped += 1;
                }
                Some(level) if self.ledger.has_order_at_price(level, opposite) => {
                    debug!("{} level {} already occupied", opposite, level);
                    report.skipped += 1;
                }
                Some(level) => {
                    if self.place_and_record(opposite, level, quantity).await {
                        report.placed += 1;
                    } else {
                        report.failed += 1;
                    }
                }
            }
        }

        if report.fills > 0 {
            info!(
                "Reconciled {} fills: {} replaced, {} skipped, {} failed",
                report.fills, report.placed, report.skipped, report.failed
            );
        }
        report
    }

    /// Cancel every open order: bulk first, per-order on failure
    pub async fn cancel_all(&mut self) -> CancelReport {
        let open: Vec<OrderId> = self
            .ledger
            .open_orders()
            .into_iter()
            .map(|o| o.id.clone())
            .collect();
        let mut report = CancelReport::default();

        if open.is_empty() {
            debug!("No open orders to cancel");
            return report;
        }

        match self.gateway.cancel_all_orders(&self.symbol).await {
            Ok(ids) => {
                info!(
                    "Bulk cancel: {} ledger orders, {} reported by exchange",
                    open.len(),
                    ids.len()
                );
                for id in &open {
                    if self.ledger.mark_cancelled(id).is_ok() {
                        report.cancelled += 1;
                    }
                }
                report.bulk = true;
            }
            Err(e) => {
                warn!("Bulk cancel failed ({}), cancelling one by one", e);
                for id in &open {
                    match self.gateway.cancel_order(&self.symbol, id).await {
                        Ok(()) => {
                            if self.ledger.mark_cancelled(id).is_ok() {
                                report.cancelled += 1;
                            }
                        }
                        Err(e) => {
                            self.failures.cancellations += 1;
                            report.failed += 1;
                            error!("Failed to cancel {}: {}", id, e);
                        }
                    }
                }
            }
        }

        self.publish_status();
        report
    }

    /// Replace the grid with one centered on the current price and re-seed it
    pub async fn recenter(&mut self, range_pct: Decimal) -> GridResult<SeedReport> {
        let price = self.current_price().await?;
        let (lower, upper) = Grid::auto_range(price, range_pct);
        let grid = Grid::new(
            lower.round_dp(self.price_decimals),
            upper.round_dp(self.price_decimals),
            self.grid.count(),
            self.spacing,
            self.price_decimals,
        )?;

        let cancelled = self.cancel_all().await;
        if cancelled.failed > 0 {
            warn!(
                "{} orders could not be cancelled before re-centering",
                cancelled.failed
            );
        }

        info!(
            "Re-centering grid [{}, {}] -> [{}, {}]",
            self.grid.lower(),
            self.grid.upper(),
            grid.lower(),
            grid.upper()
        );
        self.grid = grid;
        self.place_initial_grid().await
    }
}
