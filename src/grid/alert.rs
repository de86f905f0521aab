//! Alert sink - fire-and-forget notifications for risk breaches and order errors
//!
//! Delivery (chat, email, ...) lives behind [`AlertSink`]; the engine only
//! decides *when* to alert.

use std::fmt;

use log::{error, info, warn};

/// Category of an alert
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertKind {
    /// Drawdown circuit breaker tripped
    Drawdown,
    /// Volatility circuit breaker tripped
    Volatility,
    /// An order placement or cancellation failed
    OrderError,
    /// Bot started or stopped
    Lifecycle,
}

impl fmt::Display for AlertKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AlertKind::Drawdown => "drawdown",
            AlertKind::Volatility => "volatility",
            AlertKind::OrderError => "order_error",
            AlertKind::Lifecycle => "lifecycle",
        };
        f.write_str(s)
    }
}

/// Receives alerts. Implementations must not block the caller.
pub trait AlertSink: Send + Sync {
    fn notify(&self, kind: AlertKind, message: &str);
}

/// Writes alerts to the log
#[derive(Debug, Default, Clone, Copy)]
pub struct LogAlertSink;

impl AlertSink for LogAlertSink {
    fn notify(&self, kind: AlertKind, message: &str) {
        match kind {
            AlertKind::Drawdown | AlertKind::Volatility => {
                error!("[ALERT:{}] {}", kind, message)
            }
            AlertKind::OrderError => warn!("[ALERT:{}] {}", kind, message),
            AlertKind::Lifecycle => info!("[ALERT:{}] {}", kind, message),
        }
    }
}

/// Recording sink for tests
pub mod mock {
    use super::*;
    use std::sync::Mutex;

    #[derive(Debug, Default)]
    pub struct RecordingAlertSink {
        alerts: Mutex<Vec<(AlertKind, String)>>,
    }

    impl RecordingAlertSink {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn alerts(&self) -> Vec<(AlertKind, String)> {
            self.alerts.lock().map(|a| a.clone()).unwrap_or_default()
        }

        pub fn count(&self, kind: AlertKind) -> usize {
            self.alerts().iter().filter(|(k, _)| *k == kind).count()
        }
    }

    impl AlertSink for RecordingAlertSink {
        fn notify(&self, kind: AlertKind, message: &str) {
            if let Ok(mut alerts) = self.alerts.lock() {
                alerts.push((kind, message.to_string()));
            }
        }
    }
}
