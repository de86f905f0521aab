//! Grid levels - immutable price ladder computed from bounds and spacing

use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;

use super::config::GridSpacing;
use super::errors::{GridError, GridResult};

/// Immutable, strictly increasing set of price levels.
///
/// `levels[0] == lower` and `levels[count - 1] == upper` exactly; interior
/// levels are rounded to `price_decimals` so every consumer (ledger index,
/// replacement logic) sees the same canonical value. Re-centering builds a
/// new `Grid`.
#[derive(Debug, Clone, PartialEq)]
pub struct Grid {
    lower: Decimal,
    upper: Decimal,
    spacing: GridSpacing,
    levels: Vec<Decimal>,
}

impl Grid {
    pub fn new(
        lower: Decimal,
        upper: Decimal,
        count: usize,
        spacing: GridSpacing,
        price_decimals: u32,
    ) -> GridResult<Self> {
        let levels = Self::levels(lower, upper, count, spacing, price_decimals)?;
        Ok(Self {
            lower,
            upper,
            spacing,
            levels,
        })
    }

    /// Compute the level ladder for the given bounds
    pub fn levels(
        lower: Decimal,
        upper: Decimal,
        count: usize,
        spacing: GridSpacing,
        price_decimals: u32,
    ) -> GridResult<Vec<Decimal>> {
        if upper <= lower {
            return Err(GridError::InvalidRange(format!(
                "upper {} must be greater than lower {}",
                upper, lower
            )));
        }
        if count < 2 {
            return Err(GridError::InvalidRange(format!(
                "count must be at least 2, got {}",
                count
            )));
        }

        let steps = count - 1;
        let mut levels = Vec::with_capacity(count);
        levels.push(lower);

        match spacing {
            GridSpacing::Arithmetic => {
                let step = (upper - lower) / Decimal::from(steps);
                for i in 1..steps {
                    let level = lower + step * Decimal::from(i);
                    levels.push(level.round_dp(price_decimals));
                }
            }
            GridSpacing::Geometric => {
                if lower <= Decimal::ZERO {
                    return Err(GridError::InvalidRange(
                        "geometric grid requires a positive lower bound".into(),
                    ));
                }
                let lower_f = to_f64(lower)?;
                let ratio = (to_f64(upper)? / lower_f).powf(1.0 / steps as f64);
                for i in 1..steps {
                    let raw = lower_f * ratio.powi(i as i32);
                    let level = Decimal::from_f64(raw).ok_or_else(|| {
                        GridError::InvalidRange(format!("level {} is not representable", raw))
                    })?;
                    levels.push(level.round_dp(price_decimals));
                }
            }
        }

        levels.push(upper);

        if levels.windows(2).any(|w| w[0] >= w[1]) {
            return Err(GridError::InvalidRange(format!(
                "{} levels between {} and {} collapse at {} decimals",
                count, lower, upper, price_decimals
            )));
        }

        Ok(levels)
    }

    /// Symmetric multiplicative band around `current_price`
    pub fn auto_range(current_price: Decimal, pct: Decimal) -> (Decimal, Decimal) {
        (
            current_price * (Decimal::ONE - pct),
            current_price * (Decimal::ONE + pct),
        )
    }

    pub fn lower(&self) -> Decimal {
        self.lower
    }

    pub fn upper(&self) -> Decimal {
        self.upper
    }

    pub fn spacing(&self) -> GridSpacing {
        self.spacing
    }

    pub fn count(&self) -> usize {
        self.levels.len()
    }

    pub fn as_slice(&self) -> &[Decimal] {
        &self.levels
    }

    /// Index of `price` if it is exactly one of the levels
    pub fn level_index(&self, price: Decimal) -> Option<usize> {
        self.levels.binary_search(&price).ok()
    }

    /// Inclusive bounds test
    pub fn is_within(&self, price: Decimal) -> bool {
        self.lower <= price && price <= self.upper
    }

    /// First level strictly above `price`
    pub fn next_level_up(&self, price: Decimal) -> Option<Decimal> {
        let idx = self.levels.partition_point(|l| *l <= price);
        self.levels.get(idx).copied()
    }

    /// First level strictly below `price`
    pub fn next_level_down(&self, price: Decimal) -> Option<Decimal> {
        let idx = self.levels.partition_point(|l| *l < price);
        idx.checked_sub(1).map(|i| self.levels[i])
    }

    /// Split levels into buys below and sells above `current_price`.
    ///
    /// Buys are capped at `count / 2` (nearest to price kept), sells at
    /// `count - count / 2`. A level equal to the price is on neither side.
    pub fn balanced_split(&self, current_price: Decimal) -> (Vec<Decimal>, Vec<Decimal>) {
        let buy_target = self.count() / 2;
        let sell_target = self.count() - buy_target;

        let below = self.levels.partition_point(|l| *l < current_price);
        let above = self.levels.partition_point(|l| *l <= current_price);

        let buy_start = below.saturating_sub(buy_target);
        let buys = self.levels[buy_start..below].to_vec();

        let sell_end = (above + sell_target).min(self.levels.len());
        let sells = self.levels[above..sell_end].to_vec();

        (buys, sells)
    }

    /// True when `current_price` is outside the grid or within
    /// `threshold * (upper - lower)` of either bound
    pub fn needs_recenter(&self, current_price: Decimal, threshold: Decimal) -> bool {
        if !self.is_within(current_price) {
            return true;
        }
        let margin = (self.upper - self.lower) * threshold;
        current_price - self.lower < margin || self.upper - current_price < margin
    }
}

fn to_f64(value: Decimal) -> GridResult<f64> {
    value
        .to_f64()
        .ok_or_else(|| GridError::InvalidRange(format!("{} is not representable as f64", value)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn scenario_grid() -> Grid {
        Grid::new(dec!(90), dec!(110), 10, GridSpacing::Arithmetic, 8).unwrap()
    }

    #[test]
    fn test_arithmetic_levels_match_linspace() {
        let grid = scenario_grid();
        assert_eq!(grid.count(), 10);

        let expected: Vec<Decimal> = (0..10)
            .map(|i| {
                let raw = dec!(90) + dec!(20) * Decimal::from(i) / dec!(9);
                if i == 0 || i == 9 {
                    raw
                } else {
                    raw.round_dp(8)
                }
            })
            .collect();
        assert_eq!(grid.as_slice(), expected.as_slice());
        assert_eq!(grid.as_slice()[1], dec!(92.22222222));
    }

    #[test]
    fn test_endpoints_exact_and_strictly_increasing() {
        let cases = [
            (dec!(0.0001), dec!(0.0003), 7, GridSpacing::Arithmetic),
            (dec!(1), dec!(1000), 25, GridSpacing::Geometric),
            (dec!(95.5), dec!(104.25), 2, GridSpacing::Geometric),
            (dec!(20000), dec!(30000), 101, GridSpacing::Arithmetic),
        ];

        for (lower, upper, count, spacing) in cases {
            let grid = Grid::new(lower, upper, count, spacing, 8).unwrap();
            let levels = grid.as_slice();
            assert_eq!(levels.len(), count);
            assert_eq!(levels[0], lower);
            assert_eq!(levels[count - 1], upper);
            assert!(levels.windows(2).all(|w| w[0] < w[1]));
        }
    }

    #[test]
    fn test_geometric_ratio_is_constant() {
        let grid = Grid::new(dec!(100), dec!(400), 3, GridSpacing::Geometric, 8).unwrap();
        assert_eq!(grid.as_slice()[1], dec!(200));
    }

    #[test]
    fn test_invalid_range() {
        assert!(matches!(
            Grid::new(dec!(110), dec!(90), 10, GridSpacing::Arithmetic, 8),
            Err(GridError::InvalidRange(_))
        ));
        assert!(matches!(
            Grid::new(dec!(90), dec!(90), 10, GridSpacing::Arithmetic, 8),
            Err(GridError::InvalidRange(_))
        ));
        assert!(matches!(
            Grid::new(dec!(90), dec!(110), 1, GridSpacing::Arithmetic, 8),
            Err(GridError::InvalidRange(_))
        ));
        // 0.01 wide, 5 levels, 2 decimals -> collisions after rounding
        assert!(matches!(
            Grid::new(dec!(1.00), dec!(1.01), 5, GridSpacing::Arithmetic, 2),
            Err(GridError::InvalidRange(_))
        ));
    }

    #[test]
    fn test_balanced_split_centered() {
        let grid = scenario_grid();
        let (buys, sells) = grid.balanced_split(dec!(100));

        assert_eq!(buys.len(), 5);
        assert_eq!(sells.len(), 5);
        assert_eq!(buys[0], dec!(90));
        assert!(buys.iter().all(|b| *b < dec!(100)));
        assert!(sells.iter().all(|s| *s > dec!(100)));
        assert_eq!(sells[4], dec!(110));
    }

    #[test]
    fn test_balanced_split_caps_and_ordering() {
        let grid = Grid::new(dec!(100), dec!(200), 11, GridSpacing::Arithmetic, 8).unwrap();
        let count = grid.count();

        for price in [dec!(100), dec!(101), dec!(130), dec!(150), dec!(155), dec!(199), dec!(200)] {
            let (buys, sells) = grid.balanced_split(price);
            assert!(buys.len() <= count / 2);
            assert!(sells.len() <= count - count / 2);
            assert!(buys.iter().all(|b| *b < price));
            assert!(sells.iter().all(|s| *s > price));
        }

        // Price high in the range: buys keep the levels nearest to price
        let (buys, sells) = grid.balanced_split(dec!(185));
        assert_eq!(buys, vec![dec!(140), dec!(150), dec!(160), dec!(170), dec!(180)]);
        assert_eq!(sells, vec![dec!(190), dec!(200)]);

        // Price sitting on a level excludes it from both sides
        let (buys, sells) = grid.balanced_split(dec!(150));
        assert!(!buys.contains(&dec!(150)));
        assert!(!sells.contains(&dec!(150)));
    }

    #[test]
    fn test_next_level_up_down() {
        let grid = Grid::new(dec!(100), dec!(200), 11, GridSpacing::Arithmetic, 8).unwrap();

        assert_eq!(grid.next_level_up(dec!(100)), Some(dec!(110)));
        assert_eq!(grid.next_level_up(dec!(105)), Some(dec!(110)));
        assert_eq!(grid.next_level_up(dec!(200)), None);
        assert_eq!(grid.next_level_up(dec!(50)), Some(dec!(100)));

        assert_eq!(grid.next_level_down(dec!(200)), Some(dec!(190)));
        assert_eq!(grid.next_level_down(dec!(105)), Some(dec!(100)));
        assert_eq!(grid.next_level_down(dec!(100)), None);
        assert_eq!(grid.next_level_down(dec!(250)), Some(dec!(200)));
    }

    #[test]
    fn test_next_level_round_trip() {
        for grid in [
            scenario_grid(),
            Grid::new(dec!(10), dec!(50), 13, GridSpacing::Geometric, 6).unwrap(),
        ] {
            let levels = grid.as_slice();
            for level in &levels[..levels.len() - 1] {
                let up = grid.next_level_up(*level).unwrap();
                assert_eq!(grid.next_level_down(up), Some(*level));
            }
        }
    }

    #[test]
    fn test_is_within_and_auto_range() {
        let grid = scenario_grid();
        assert!(grid.is_within(dec!(90)));
        assert!(grid.is_within(dec!(110)));
        assert!(!grid.is_within(dec!(89.99)));
        assert!(!grid.is_within(dec!(110.01)));

        assert_eq!(Grid::auto_range(dec!(100), dec!(0.1)), (dec!(90), dec!(110)));
    }

    #[test]
    fn test_needs_recenter() {
        let grid = scenario_grid();
        assert!(!grid.needs_recenter(dec!(100), dec!(0.05)));
        assert!(grid.needs_recenter(dec!(90.5), dec!(0.05)));
        assert!(grid.needs_recenter(dec!(109.5), dec!(0.05)));
        assert!(grid.needs_recenter(dec!(120), dec!(0.05)));
        assert_eq!(grid.level_index(dec!(110)), Some(9));
        assert_eq!(grid.level_index(dec!(100)), None);
    }
}
