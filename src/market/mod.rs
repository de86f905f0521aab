//! Market data and dry-run execution
//!
//! - [`price`] - latest-price cell shared by the feed and the engine
//! - [`feed`] - WebSocket ticker feed task
//! - [`ticker`] - public REST ticker (fallback price source)
//! - [`paper`] - paper exchange used when `dry_run` is enabled

pub mod feed;
pub mod paper;
pub mod price;
pub mod ticker;

pub use feed::{spawn_ticker_feed, DEFAULT_WS_URL};
pub use paper::{PaperConfig, PaperExchange};
pub use price::{price_channel, PriceCell, PricePublisher};
pub use ticker::{PublicTicker, DEFAULT_REST_URL};
