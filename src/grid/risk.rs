//! Risk guard - drawdown and volatility circuit breaker
//!
//! Two independent checks can move the guard from `Active` to `Paused`.
//! Nothing un-pauses it except an explicit [`RiskGuard::resume`] or
//! [`RiskGuard::reset`].

use std::collections::VecDeque;
use std::sync::Arc;

use log::{info, warn};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use super::alert::{AlertKind, AlertSink};
use super::errors::{GridError, GridResult};
use super::types::RiskStatus;

/// Fraction of the drawdown limit at which a non-pausing warning is logged
const DRAWDOWN_WARNING_RATIO: Decimal = dec!(0.8);

/// Risk thresholds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskConfig {
    /// Maximum drawdown from peak balance, in percent (5 = 5%)
    #[serde(default = "default_max_drawdown_pct")]
    pub max_drawdown_pct: Decimal,

    /// ATR as percent of price above which trading pauses
    #[serde(default = "default_atr_threshold_pct")]
    pub atr_threshold_pct: Decimal,

    /// Number of true-range samples averaged into the ATR
    #[serde(default = "default_atr_lookback")]
    pub atr_lookback: usize,

    /// Enable the volatility breaker
    #[serde(default = "default_volatility_pause")]
    pub volatility_pause: bool,
}

fn default_max_drawdown_pct() -> Decimal {
    dec!(5)
}

fn default_atr_threshold_pct() -> Decimal {
    dec!(2)
}

fn default_atr_lookback() -> usize {
    14
}

fn default_volatility_pause() -> bool {
    true
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            max_drawdown_pct: default_max_drawdown_pct(),
            atr_threshold_pct: default_atr_threshold_pct(),
            atr_lookback: default_atr_lookback(),
            volatility_pause: default_volatility_pause(),
        }
    }
}

impl RiskConfig {
    pub fn validate(&self) -> GridResult<()> {
        if self.max_drawdown_pct <= Decimal::ZERO || self.max_drawdown_pct >= dec!(100) {
            return Err(GridError::InvalidConfig(
                "max_drawdown_pct must be between 0 and 100 (exclusive)".into(),
            ));
        }
        if self.atr_threshold_pct <= Decimal::ZERO {
            return Err(GridError::InvalidConfig(
                "atr_threshold_pct must be positive".into(),
            ));
        }
        if self.atr_lookback == 0 {
            return Err(GridError::InvalidConfig(
                "atr_lookback must be at least 1".into(),
            ));
        }
        Ok(())
    }

    /// Drawdown limit as a fraction
    fn max_drawdown(&self) -> Decimal {
        self.max_drawdown_pct / dec!(100)
    }
}

pub struct RiskGuard {
    config: RiskConfig,
    alerts: Arc<dyn AlertSink>,
    initial_balance: Option<Decimal>,
    peak_balance: Option<Decimal>,
    price_history: VecDeque<Decimal>,
    paused: bool,
    pause_reason: Option<String>,
    drawdown_warned: bool,
}

impl RiskGuard {
    pub fn new(config: RiskConfig, alerts: Arc<dyn AlertSink>) -> Self {
        let capacity = config.atr_lookback * 2;
        Self {
            config,
            alerts,
            initial_balance: None,
            peak_balance: None,
            price_history: VecDeque::with_capacity(capacity),
            paused: false,
            pause_reason: None,
            drawdown_warned: false,
        }
    }

    /// Set the starting balance; the peak restarts from it
    pub fn set_initial_balance(&mut self, balance: Decimal) {
        info!("Risk guard initial balance: {}", balance);
        self.initial_balance = Some(balance);
        self.peak_balance = Some(balance);
    }

    pub fn initial_balance(&self) -> Option<Decimal> {
        self.initial_balance
    }

    pub fn peak_balance(&self) -> Option<Decimal> {
        self.peak_balance
    }

    fn pause(&mut self, kind: AlertKind, reason: String) {
        warn!("Trading paused: {}", reason);
        self.alerts.notify(kind, &reason);
        self.paused = true;
        self.pause_reason = Some(reason);
    }

    /// Returns true when the drawdown limit is breached (strictly exceeded)
    pub fn check_drawdown(&mut self, current_balance: Decimal) -> bool {
        let peak = match self.peak_balance {
            Some(peak) => peak.max(current_balance),
            None => return false,
        };
        self.peak_balance = Some(peak);

        if peak <= Decimal::ZERO {
            return false;
        }

        let drawdown = (peak - current_balance) / peak;
        let limit = self.config.max_drawdown();

        if drawdown > limit {
            let pct = (drawdown * dec!(100)).round_dp(2);
            self.pause(AlertKind::Drawdown, format!("drawdown {:.2}% exceeded", pct));
            return true;
        }

        if drawdown > limit * DRAWDOWN_WARNING_RATIO {
            if !self.drawdown_warned {
                warn!(
                    "Drawdown {}% approaching limit {}%",
                    (drawdown * dec!(100)).round_dp(2),
                    self.config.max_drawdown_pct
                );
                self.drawdown_warned = true;
            }
        } else {
            self.drawdown_warned = false;
        }

        false
    }

    /// Append a price to the rolling window without evaluating it
    pub fn record_price(&mut self, price: Decimal) {
        self.price_history.push_back(price);
        let cap = self.config.atr_lookback * 2;
        while self.price_history.len() > cap {
            self.price_history.pop_front();
        }
    }

    /// Average absolute price change over the last `atr_lookback` samples.
    /// `None` until `atr_lookback + 1` prices are available.
    pub fn atr(&self) -> Option<Decimal> {
        let lookback = self.config.atr_lookback;
        if self.price_history.len() < lookback + 1 {
            return None;
        }
        let start = self.price_history.len() - (lookback + 1);
        let window: Vec<Decimal> = self.price_history.iter().skip(start).copied().collect();
        let sum: Decimal = window.windows(2).map(|w| (w[1] - w[0]).abs()).sum();
        Some(sum / Decimal::from(lookback))
    }

    /// Returns true when ATR as percent of `current_price` exceeds the threshold
    pub fn check_volatility(&mut self, current_price: Decimal) -> bool {
        if !self.config.volatility_pause {
            return false;
        }

        self.record_price(current_price);

        let atr = match self.atr() {
            Some(atr) => atr,
            None => return false,
        };
        if current_price <= Decimal::ZERO {
            return false;
        }

        let atr_pct = atr / current_price * dec!(100);
        if atr_pct > self.config.atr_threshold_pct {
            self.pause(
                AlertKind::Volatility,
                format!("volatility atr={:.2}%", atr_pct.round_dp(2)),
            );
            return true;
        }

        false
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn pause_reason(&self) -> Option<&str> {
        self.pause_reason.as_deref()
    }

    pub fn status(&self) -> RiskStatus {
        match (&self.paused, &self.pause_reason) {
            (true, Some(reason)) => RiskStatus::Paused {
                reason: reason.clone(),
            },
            (true, None) => RiskStatus::Paused {
                reason: String::new(),
            },
            (false, _) => RiskStatus::Active,
        }
    }

    pub fn drawdown_warning_active(&self) -> bool {
        self.drawdown_warned
    }

    pub fn price_history_len(&self) -> usize {
        self.price_history.len()
    }

    /// Manual resume after an operator has reviewed the breach
    pub fn resume(&mut self) {
        if self.paused {
            info!(
                "Trading resumed (was paused: {})",
                self.pause_reason.as_deref().unwrap_or("unknown")
            );
        }
        self.paused = false;
        self.pause_reason = None;
    }

    /// Clear pause state and price history for a clean restart
    pub fn reset(&mut self) {
        self.resume();
        self.price_history.clear();
        self.drawdown_warned = false;
    }
}
