//! Grid-specific error types

use rust_decimal::Decimal;
use thiserror::Error;

use super::types::{OrderId, OrderSide, OrderStatus};

/// Errors that can occur in grid trading operations
#[derive(Error, Debug, Clone)]
pub enum GridError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid grid range: {0}")]
    InvalidRange(String),

    #[error("Price out of grid range: {price} not in [{lower}, {upper}]")]
    PriceOutOfRange {
        price: Decimal,
        lower: Decimal,
        upper: Decimal,
    },

    #[error("Order not found: {0}")]
    OrderNotFound(OrderId),

    #[error("Order {id} is not open (status {status:?})")]
    OrderNotOpen { id: OrderId, status: OrderStatus },

    #[error("{side} level {price} is already held by open order {holder}")]
    LevelOccupied {
        side: OrderSide,
        price: Decimal,
        holder: OrderId,
    },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Order rejected: {0}")]
    Rejected(String),

    #[error("Price unavailable: {0}")]
    PriceUnavailable(String),

    #[error("WebSocket error: {0}")]
    WebSocket(String),

    #[error("JSON parse error: {0}")]
    JsonParse(String),

    #[error("Decimal conversion error: {0}")]
    Decimal(String),

    #[error("IO error: {0}")]
    Io(String),
}

impl GridError {
    /// True for failures of a single collaborator call that the loop recovers from.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            GridError::Transport(_)
                | GridError::Rejected(_)
                | GridError::PriceUnavailable(_)
                | GridError::WebSocket(_)
                | GridError::JsonParse(_)
        )
    }
}

impl From<serde_json::Error> for GridError {
    fn from(err: serde_json::Error) -> Self {
        GridError::JsonParse(err.to_string())
    }
}

impl From<std::io::Error> for GridError {
    fn from(err: std::io::Error) -> Self {
        GridError::Io(err.to_string())
    }
}

impl From<reqwest::Error> for GridError {
    fn from(err: reqwest::Error) -> Self {
        GridError::Transport(err.to_string())
    }
}

impl From<config::ConfigError> for GridError {
    fn from(err: config::ConfigError) -> Self {
        GridError::InvalidConfig(err.to_string())
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for GridError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        GridError::WebSocket(err.to_string())
    }
}

impl From<rust_decimal::Error> for GridError {
    fn from(err: rust_decimal::Error) -> Self {
        GridError::Decimal(err.to_string())
    }
}

/// Result type for grid operations
pub type GridResult<T> = std::result::Result<T, GridError>;
