//! Grid trading configuration

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use super::errors::{GridError, GridResult};
use super::levels::Grid;

/// Grid spacing type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GridSpacing {
    /// Uniform price spacing (e.g., $100, $110, $120)
    #[default]
    Arithmetic,
    /// Percentage-based spacing (e.g., +10%, +10%, +10%)
    Geometric,
}

/// Grid bot configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GridConfig {
    /// Market symbol (e.g., "SOL_USDC")
    pub symbol: String,

    /// Base quantity of every grid order
    pub quantity: Decimal,

    /// Lower price boundary. Required unless `auto_price` is set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lower: Option<Decimal>,

    /// Upper price boundary. Required unless `auto_price` is set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upper: Option<Decimal>,

    /// Number of price levels, endpoints included
    pub count: usize,

    #[serde(default)]
    pub spacing: GridSpacing,

    /// Derive bounds from the live price instead of `lower`/`upper`
    #[serde(default)]
    pub auto_price: bool,

    /// Half-width of the auto range as a fraction of price (0.1 = ±10%)
    #[serde(default = "default_price_range_pct")]
    pub price_range_pct: Decimal,

    /// Decimal places every level is rounded to
    #[serde(default = "default_price_decimals")]
    pub price_decimals: u32,

    /// Distance to a bound, as a fraction of the grid width, that counts as "near the edge"
    #[serde(default = "default_recenter_threshold")]
    pub recenter_threshold: Decimal,
}

fn default_price_range_pct() -> Decimal {
    dec!(0.10)
}

fn default_price_decimals() -> u32 {
    8
}

fn default_recenter_threshold() -> Decimal {
    dec!(0.05)
}

impl GridConfig {
    /// Create a configuration with fixed bounds
    pub fn new(
        symbol: impl Into<String>,
        lower: Decimal,
        upper: Decimal,
        count: usize,
        quantity: Decimal,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            quantity,
            lower: Some(lower),
            upper: Some(upper),
            count,
            spacing: GridSpacing::default(),
            auto_price: false,
            price_range_pct: default_price_range_pct(),
            price_decimals: default_price_decimals(),
            recenter_threshold: default_recenter_threshold(),
        }
    }

    /// Builder: set grid spacing type
    pub fn with_spacing(mut self, spacing: GridSpacing) -> Self {
        self.spacing = spacing;
        self
    }

    /// Builder: derive bounds from the current price
    pub fn with_auto_price(mut self, range_pct: Decimal) -> Self {
        self.auto_price = true;
        self.price_range_pct = range_pct;
        self
    }

    /// Builder: set level rounding precision
    pub fn with_price_decimals(mut self, decimals: u32) -> Self {
        self.price_decimals = decimals;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> GridResult<()> {
        if self.symbol.trim().is_empty() {
            return Err(GridError::InvalidConfig("symbol cannot be empty".into()));
        }

        if self.quantity <= Decimal::ZERO {
            return Err(GridError::InvalidConfig("quantity must be positive".into()));
        }

        if self.count < 2 {
            return Err(GridError::InvalidConfig("count must be at least 2".into()));
        }

        if self.price_decimals > 16 {
            return Err(GridError::InvalidConfig(
                "price_decimals must be at most 16".into(),
            ));
        }

        if self.auto_price {
            if self.price_range_pct <= Decimal::ZERO || self.price_range_pct >= Decimal::ONE {
                return Err(GridError::InvalidConfig(
                    "price_range_pct must be between 0 and 1 (exclusive)".into(),
                ));
            }
        } else {
            let (lower, upper) = match (self.lower, self.upper) {
                (Some(l), Some(u)) => (l, u),
                _ => {
                    return Err(GridError::InvalidConfig(
                        "lower and upper are required when auto_price is disabled".into(),
                    ))
                }
            };
            if lower <= Decimal::ZERO {
                return Err(GridError::InvalidConfig("lower must be positive".into()));
            }
            if lower >= upper {
                return Err(GridError::InvalidConfig(
                    "lower must be less than upper".into(),
                ));
            }
        }

        if self.recenter_threshold < Decimal::ZERO || self.recenter_threshold >= dec!(0.5) {
            return Err(GridError::InvalidConfig(
                "recenter_threshold must be in [0, 0.5)".into(),
            ));
        }

        Ok(())
    }

    /// Resolve the grid bounds, consulting `current_price` only in auto mode
    pub fn resolve_bounds(&self, current_price: Option<Decimal>) -> GridResult<(Decimal, Decimal)> {
        if self.auto_price {
            let price = current_price.ok_or_else(|| {
                GridError::PriceUnavailable("auto_price needs a current price".into())
            })?;
            let (lower, upper) = Grid::auto_range(price, self.price_range_pct);
            return Ok((
                lower.round_dp(self.price_decimals),
                upper.round_dp(self.price_decimals),
            ));
        }

        match (self.lower, self.upper) {
            (Some(lower), Some(upper)) => Ok((lower, upper)),
            _ => Err(GridError::InvalidConfig(
                "lower and upper are required when auto_price is disabled".into(),
            )),
        }
    }

    /// Build the grid described by this configuration
    pub fn build_grid(&self, current_price: Option<Decimal>) -> GridResult<Grid> {
        let (lower, upper) = self.resolve_bounds(current_price)?;
        Grid::new(lower, upper, self.count, self.spacing, self.price_decimals)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> GridConfig {
        GridConfig::new("SOL_USDC", dec!(90), dec!(110), 10, dec!(0.1))
    }

    #[test]
    fn test_config_validation() {
        assert!(base().validate().is_ok());

        let mut invalid = base();
        invalid.lower = Some(dec!(120));
        assert!(invalid.validate().is_err());

        let mut invalid = base();
        invalid.count = 1;
        assert!(invalid.validate().is_err());

        let mut invalid = base();
        invalid.quantity = Decimal::ZERO;
        assert!(invalid.validate().is_err());

        let mut invalid = base();
        invalid.upper = None;
        assert!(matches!(invalid.validate(), Err(GridError::InvalidConfig(_))));
    }

    #[test]
    fn test_auto_price_needs_sane_range() {
        let mut config = base().with_auto_price(dec!(0.1));
        config.lower = None;
        config.upper = None;
        assert!(config.validate().is_ok());

        config.price_range_pct = dec!(1.5);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_resolve_bounds_auto() {
        let config = base().with_auto_price(dec!(0.1));
        let (lower, upper) = config.resolve_bounds(Some(dec!(100))).unwrap();
        assert_eq!(lower, dec!(90));
        assert_eq!(upper, dec!(110));

        assert!(matches!(
            config.resolve_bounds(None),
            Err(GridError::PriceUnavailable(_))
        ));
    }

    #[test]
    fn test_builders_shape_the_grid() {
        let config = base()
            .with_spacing(GridSpacing::Geometric)
            .with_price_decimals(2);
        let grid = config.build_grid(None).unwrap();
        let levels = grid.as_slice();

        assert_eq!(grid.spacing(), GridSpacing::Geometric);
        assert_eq!(levels[0], dec!(90));
        assert_eq!(levels[9], dec!(110));
        assert!(levels.iter().all(|l| l.scale() <= 2));
        assert!(levels[1] - levels[0] < levels[9] - levels[8]);
    }

    #[test]
    fn test_spacing_deserializes_lowercase() {
        let spacing: GridSpacing = serde_json::from_str("\"geometric\"").unwrap();
        assert_eq!(spacing, GridSpacing::Geometric);
    }
}
