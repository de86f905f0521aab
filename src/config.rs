use config::{Config, Environment, File, FileFormat};
use serde::Deserialize;

use crate::grid::{GridConfig, GridError, GridResult, RiskConfig, RunnerConfig};
use crate::market::{PaperConfig, DEFAULT_REST_URL, DEFAULT_WS_URL};

/// Main configuration struct
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    /// Grid layout and order size
    pub grid: GridConfig,
    /// Circuit breaker thresholds
    #[serde(default)]
    pub risk: RiskConfig,
    /// Loop timing and dry-run switch
    #[serde(default)]
    pub engine: RunnerConfig,
    /// Exchange endpoints and call limits
    #[serde(default)]
    pub exchange: ExchangeConfig,
    /// Paper balances used in dry-run mode
    #[serde(default)]
    pub paper: PaperConfig,
    /// Logging configuration
    #[serde(default)]
    pub log: LogConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExchangeConfig {
    #[serde(default = "default_rest_url")]
    pub rest_url: String,
    #[serde(default = "default_ws_url")]
    pub ws_url: String,
    /// Subscribe to the WebSocket ticker; otherwise poll the REST ticker
    #[serde(default = "default_use_websocket")]
    pub use_websocket: bool,
    /// Timeout applied to each exchange call
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    /// Maximum concurrent exchange calls
    #[serde(default = "default_max_in_flight")]
    pub max_in_flight: usize,
}

impl Default for ExchangeConfig {
    fn default() -> Self {
        Self {
            rest_url: default_rest_url(),
            ws_url: default_ws_url(),
            use_websocket: default_use_websocket(),
            request_timeout_ms: default_request_timeout_ms(),
            max_in_flight: default_max_in_flight(),
        }
    }
}

fn default_rest_url() -> String {
    DEFAULT_REST_URL.to_string()
}

fn default_ws_url() -> String {
    DEFAULT_WS_URL.to_string()
}

fn default_use_websocket() -> bool {
    true
}

fn default_request_timeout_ms() -> u64 {
    10_000
}

fn default_max_in_flight() -> usize {
    4
}

#[derive(Debug, Clone, Deserialize)]
pub struct LogConfig {
    /// Log level: "error", "warn", "info", "debug", "trace"
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Settings {
    /// Load settings from a configuration file, with `GRID_`-prefixed
    /// environment overrides (e.g. `GRID_GRID__SYMBOL=SOL_USDC`)
    pub fn new(config_path: &str) -> GridResult<Self> {
        let s = Config::builder()
            .add_source(File::with_name(config_path))
            .add_source(
                Environment::with_prefix("GRID")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()?;

        let settings: Settings = s.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    /// Parse settings from TOML text
    pub fn from_toml_str(toml: &str) -> GridResult<Self> {
        let s = Config::builder()
            .add_source(File::from_str(toml, FileFormat::Toml))
            .build()?;

        let settings: Settings = s.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> GridResult<()> {
        self.grid.validate()?;
        self.risk.validate()?;
        self.engine.validate()?;

        if self.exchange.request_timeout_ms == 0 {
            return Err(GridError::InvalidConfig(
                "request_timeout_ms must be positive".into(),
            ));
        }
        if self.exchange.max_in_flight == 0 {
            return Err(GridError::InvalidConfig(
                "max_in_flight must be at least 1".into(),
            ));
        }
        if self.paper.fee_rate < rust_decimal::Decimal::ZERO {
            return Err(GridError::InvalidConfig(
                "paper fee_rate cannot be negative".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::GridSpacing;
    use rust_decimal_macros::dec;

    const FULL: &str = r#"
[grid]
symbol = "SOL_USDC"
quantity = "0.1"
lower = "90"
upper = "110"
count = 10
spacing = "geometric"

[risk]
max_drawdown_pct = 3
atr_lookback = 20

[engine]
tick_interval_secs = 15
dry_run = true
run_duration_secs = 3600

[exchange]
use_websocket = false

[log]
level = "debug"
"#;

    #[test]
    fn test_parse_full_settings() {
        let settings = Settings::from_toml_str(FULL).unwrap();
        assert_eq!(settings.grid.symbol, "SOL_USDC");
        assert_eq!(settings.grid.quantity, dec!(0.1));
        assert_eq!(settings.grid.lower, Some(dec!(90)));
        assert_eq!(settings.grid.spacing, GridSpacing::Geometric);
        assert_eq!(settings.risk.max_drawdown_pct, dec!(3));
        assert_eq!(settings.risk.atr_lookback, 20);
        assert_eq!(settings.risk.atr_threshold_pct, dec!(2));
        assert_eq!(settings.engine.tick_interval_secs, 15);
        assert_eq!(settings.engine.run_duration_secs, Some(3600));
        assert!(!settings.exchange.use_websocket);
        assert_eq!(settings.exchange.rest_url, DEFAULT_REST_URL);
        assert_eq!(settings.paper.quote_balance, dec!(10000));
        assert_eq!(settings.log.level, "debug");
    }

    #[test]
    fn test_defaults_for_optional_sections() {
        let settings = Settings::from_toml_str(
            r#"
[grid]
symbol = "SOL_USDC"
quantity = "1"
count = 5
auto_price = true
"#,
        )
        .unwrap();
        assert!(settings.grid.auto_price);
        assert_eq!(settings.grid.price_range_pct, dec!(0.10));
        assert_eq!(settings.engine.tick_interval_secs, 30);
        assert!(settings.engine.dry_run);
        assert_eq!(settings.exchange.max_in_flight, 4);
    }

    #[test]
    fn test_invalid_settings_are_config_errors() {
        let bad_range = FULL.replace("lower = \"90\"", "lower = \"120\"");
        assert!(matches!(
            Settings::from_toml_str(&bad_range),
            Err(GridError::InvalidConfig(_))
        ));

        let missing_grid = "[log]\nlevel = \"info\"\n";
        assert!(matches!(
            Settings::from_toml_str(missing_grid),
            Err(GridError::InvalidConfig(_))
        ));
    }
}
