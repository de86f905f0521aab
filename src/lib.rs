#![deny(unreachable_pub)]
pub mod config;
pub mod grid;
pub mod market;
pub mod runner;

pub use config::{ExchangeConfig, LogConfig, Settings};
pub use grid::{GridError, GridResult};
pub use runner::BotRunner;
