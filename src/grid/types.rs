//! Core data types for grid trading

use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Order side for grid levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    /// Returns the opposite side
    pub fn opposite(&self) -> Self {
        match self {
            OrderSide::Buy => OrderSide::Sell,
            OrderSide::Sell => OrderSide::Buy,
        }
    }
}

impl fmt::Display for OrderSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderSide::Buy => write!(f, "BUY"),
            OrderSide::Sell => write!(f, "SELL"),
        }
    }
}

/// Opaque exchange order identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderId(String);

impl OrderId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for OrderId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for OrderId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Lifecycle status of an order. Transitions only leave `Open`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderStatus {
    Open,
    Filled,
    Cancelled,
}

impl OrderStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, OrderStatus::Open)
    }
}

/// An order the engine believes it has placed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub side: OrderSide,
    pub price: Decimal,
    pub quantity: Decimal,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filled_at: Option<DateTime<Utc>>,
}

impl Order {
    pub fn new(id: OrderId, side: OrderSide, price: Decimal, quantity: Decimal) -> Self {
        Self {
            id,
            side,
            price,
            quantity,
            status: OrderStatus::Open,
            created_at: Utc::now(),
            filled_at: None,
        }
    }

    pub fn is_open(&self) -> bool {
        self.status == OrderStatus::Open
    }
}

/// Order placement request for the exchange
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridOrderRequest {
    /// Index of the grid level this order rests on
    pub level_index: usize,
    pub price: Decimal,
    pub quantity: Decimal,
    pub side: OrderSide,
}

impl GridOrderRequest {
    pub fn new(level_index: usize, price: Decimal, quantity: Decimal, side: OrderSide) -> Self {
        Self {
            level_index,
            price,
            quantity,
            side,
        }
    }
}

/// Ledger counts by status and side
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LedgerStatistics {
    pub total: usize,
    pub open: usize,
    pub filled: usize,
    pub cancelled: usize,
    pub open_buys: usize,
    pub open_sells: usize,
    pub filled_buys: usize,
    pub filled_sells: usize,
}

/// Risk circuit breaker state
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum RiskStatus {
    Active,
    Paused { reason: String },
}

impl RiskStatus {
    pub fn is_paused(&self) -> bool {
        matches!(self, RiskStatus::Paused { .. })
    }
}

/// Running failure counters kept by the engine
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FailureCounters {
    pub placements: u64,
    pub cancellations: u64,
    pub snapshots: u64,
    pub ledger: u64,
}

/// Point-in-time view of the engine, published after every tick
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EngineStatus {
    pub symbol: String,
    pub last_price: Option<Decimal>,
    pub lower: Decimal,
    pub upper: Decimal,
    pub ledger: LedgerStatistics,
    pub risk: RiskStatus,
    pub failures: FailureCounters,
    pub ticks: u64,
    pub updated_at: DateTime<Utc>,
}
