//! Grid Trading Bot Binary
//!
//! Runs the grid engine against the paper exchange, priced by the public
//! Backpack ticker feed.
//!
//! ```bash
//! cargo run --bin grid_bot -- --config config.toml
//! ```
//!
//! Any setting can be overridden from the environment (or a `.env` file)
//! with a `GRID_` prefix, e.g. `GRID_GRID__SYMBOL=SOL_USDC`.

use std::env;
use std::process;

use log::{error, info};

use backpack_grid_bot::BotRunner;

const DEFAULT_CONFIG: &str = "config.toml";

fn config_path() -> String {
    let args: Vec<String> = env::args().collect();
    match args.iter().position(|a| a == "--config") {
        Some(i) => args.get(i + 1).cloned().unwrap_or_else(|| DEFAULT_CONFIG.to_string()),
        None => DEFAULT_CONFIG.to_string(),
    }
}

#[tokio::main]
async fn main() {
    let dotenv = dotenvy::dotenv();

    let path = config_path();
    let runner = match BotRunner::new(&path) {
        Ok(runner) => runner,
        Err(e) => {
            eprintln!("Failed to load config from {}: {}", path, e);
            process::exit(1);
        }
    };
    runner.init_logging();

    match dotenv {
        Ok(p) => info!("Loaded environment from: {}", p.display()),
        Err(_) => info!("No .env file found, using system environment variables"),
    }

    match runner.run().await {
        Ok(summary) => info!(
            "Done: {} ticks, {} fills, {} orders cancelled on exit",
            summary.ticks, summary.ledger.filled, summary.cancelled_on_exit
        ),
        Err(e) => {
            error!("Grid bot stopped: {}", e);
            process::exit(1);
        }
    }
}
