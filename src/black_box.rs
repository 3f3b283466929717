//! Loyalty black-box probability solver.
//!
//! Back-computes the draw probabilities and stock quantities of a
//! three-category prize box (costly / middle / cheap) from a requested box
//! price, a loyalty target and a profit margin. A requested price outside
//! the feasible interval is clamped to the geometric mean of the bounds and
//! reported through an advisory message rather than an error.

use num_traits::ToPrimitive;
use rand::Rng;
use rand::distr::{Distribution, weighted::WeightedIndex};
use rust_decimal::{Decimal, MathematicalOps};
use rust_decimal_macros::dec;
use serde::Serialize;
use thiserror::Error;

/// Default profit margin.
pub const DEFAULT_PROFIT: Decimal = dec!(0.15);

/// Default loyalty ratio.
pub const DEFAULT_LOYALTY: Decimal = dec!(0.6);

/// Magnitude above which outputs are considered nonsensical.
const OUTPUT_LIMIT: Decimal = dec!(10_000_000_000);

const TEN: Decimal = dec!(10);
const PROBABILITY_EPSILON: Decimal = dec!(0.0001);

const MESSAGE_TOO_LARGE: &str =
    "Слишком большие значения, попробуйте уменьшить входные данные";
const MESSAGE_PRICES_TOO_CLOSE: &str =
    "Цены дорогого и среднего лотов отличаются на слишком маленькую величину.";

/// Prize box categories, ordered from most to least valuable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    /// Most valuable prize category
    Costly,
    /// Middle prize category
    Middle,
    /// Least valuable prize category
    Cheap,
}

/// Per-category values in costly / middle / cheap order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CategoryValues<T> {
    /// Value for the costly category
    pub costly: T,
    /// Value for the middle category
    pub middle: T,
    /// Value for the cheap category
    pub cheap: T,
}

impl<T: Copy> CategoryValues<T> {
    fn as_array(&self) -> [T; 3] {
        [self.costly, self.middle, self.cheap]
    }
}

impl<T> From<[T; 3]> for CategoryValues<T> {
    fn from([costly, middle, cheap]: [T; 3]) -> Self {
        Self {
            costly,
            middle,
            cheap,
        }
    }
}

/// Current box price with its feasible bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PriceBounds {
    /// Price actually used
    pub cur: Decimal,
    /// Lower feasible bound, rounded up to the nearest ten
    pub min: Decimal,
    /// Upper feasible bound, rounded down to the nearest ten
    pub max: Decimal,
}

/// Errors from the black-box solver.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum BlackBoxError {
    /// Internal solver invariant was violated (this is a bug).
    #[error("black box invariant violated: {message}")]
    InvariantViolation {
        /// What invariant was violated
        message: &'static str,
    },
}

/// Inputs for a black-box computation.
#[derive(Debug, Clone)]
pub struct BlackBoxInput {
    /// Prize cost per category; costly must exceed middle, middle cheap
    pub lot_cost: CategoryValues<Decimal>,

    /// Stock ceiling for the costly category
    pub costly_amount: u64,

    /// Requested box price; zero means "derive an optimal price"
    pub black_box_cost: Decimal,

    /// Target profit margin
    pub rentability: Decimal,

    /// Target loyalty ratio
    pub loyalty: Decimal,
}

impl BlackBoxInput {
    /// Creates an input with the default profit margin and loyalty ratio.
    #[must_use]
    pub const fn new(
        lot_cost: CategoryValues<Decimal>,
        costly_amount: u64,
        black_box_cost: Decimal,
    ) -> Self {
        Self {
            lot_cost,
            costly_amount,
            black_box_cost,
            rentability: DEFAULT_PROFIT,
            loyalty: DEFAULT_LOYALTY,
        }
    }
}

/// Computed black-box mix.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BlackBoxReport {
    /// `false` only when the outputs exceed the magnitude limit
    pub success: bool,

    /// Advisory message, empty on a clean solve
    pub message: String,

    /// Draw probability per category, renormalised from the final quantities
    #[serde(skip_serializing_if = "Option::is_none")]
    pub probabilities: Option<CategoryValues<Decimal>>,

    /// Stock quantity per category
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amounts: Option<CategoryValues<u64>>,

    /// Box price actually used, with its feasible bounds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub black_box_cost: Option<PriceBounds>,

    /// Realized loyalty ratio of the final quantities
    #[serde(skip_serializing_if = "Option::is_none")]
    pub loyalty: Option<Decimal>,

    /// Realized profit margin of the final quantities, capped at one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rentability: Option<Decimal>,
}

impl BlackBoxReport {
    fn advisory(message: String) -> Self {
        Self {
            success: true,
            message,
            probabilities: None,
            amounts: None,
            black_box_cost: None,
            loyalty: None,
            rentability: None,
        }
    }

    fn failure(message: String) -> Self {
        Self {
            success: false,
            ..Self::advisory(message)
        }
    }
}

/// Computes a black-box prize mix.
///
/// # Errors
///
/// Returns [`BlackBoxError::InvariantViolation`] when the solved quantities
/// cannot be represented as non-negative integers; with in-contract inputs
/// (costly > middle > cheap prices, loyalty and margin within `[0, 1]`)
/// this does not happen.
pub fn solve_black_box(input: &BlackBoxInput) -> Result<BlackBoxReport, BlackBoxError> {
    let prices = input.lot_cost;
    let profit = input.rentability;
    let loyalty = input.loyalty;

    let min_price = min_price(&prices, profit, loyalty);
    let max_price = max_price(&prices, profit, loyalty);

    let rounded_min = round_up_tens(min_price);
    let rounded_max = round_down_tens(max_price);

    // A degenerate interval means the costly and middle prices sit too close
    // together for the closed-form probabilities to be meaningful.
    if rounded_max < rounded_min || prices.costly <= prices.middle {
        return Ok(BlackBoxReport::advisory(
            MESSAGE_PRICES_TOO_CLOSE.to_owned(),
        ));
    }

    let (price, message) = select_price(
        input.black_box_cost,
        min_price,
        max_price,
        rounded_min,
        rounded_max,
    )?;

    let probabilities = probabilities(&prices, price, profit, loyalty);
    let amounts = amounts(input.costly_amount, probabilities)?;

    if !within_output_limit(price, &amounts) {
        return Ok(BlackBoxReport::failure(MESSAGE_TOO_LARGE.to_owned()));
    }

    let total: Decimal = amounts.as_array().iter().map(|&a| Decimal::from(a)).sum();

    let (realized, loyalty_out, rentability_out) = if total > Decimal::ZERO {
        let realized = amounts
            .as_array()
            .map(|a| (Decimal::from(a) / total).round_dp(3));

        let winners = Decimal::from(amounts.costly) + Decimal::from(amounts.middle);
        let loyalty_out = (winners / total).round_dp(2);

        let expected_value = amounts
            .as_array()
            .iter()
            .zip(prices.as_array())
            .map(|(&a, c)| Decimal::from(a) * c)
            .sum::<Decimal>()
            / total;
        let rentability_out = (price / expected_value - Decimal::ONE)
            .round_dp(2)
            .min(Decimal::ONE);

        (realized, loyalty_out, rentability_out)
    } else {
        ([Decimal::ZERO; 3], Decimal::ZERO, Decimal::ZERO)
    };

    Ok(BlackBoxReport {
        success: true,
        message,
        probabilities: Some(CategoryValues::from(realized)),
        amounts: Some(amounts),
        black_box_cost: Some(PriceBounds {
            cur: price,
            min: rounded_min,
            max: rounded_max,
        }),
        loyalty: Some(loyalty_out),
        rentability: Some(rentability_out),
    })
}

/// Draws prizes from the box until the requested number of draws, an empty
/// stock, or an unaffordable round stops the run.
///
/// Every draw pays the box price into a running pool. A category is eligible
/// when it still has stock and its cumulative payout would not overdraw the
/// pool; eligible categories are weighted by their remaining stock.
pub fn open_box_draws<R: Rng + ?Sized>(
    draws: usize,
    amounts: &CategoryValues<u64>,
    costs: &CategoryValues<Decimal>,
    box_price: Decimal,
    rng: &mut R,
) -> Vec<Category> {
    const CATEGORIES: [Category; 3] = [Category::Costly, Category::Middle, Category::Cheap];

    let mut stock = amounts.as_array();
    let cost_of = costs.as_array();

    let mut opened = Vec::new();
    let mut total_giveaway = Decimal::ZERO;
    let mut gained = Decimal::ZERO;

    for _ in 0..draws {
        gained += box_price;

        let eligible: Vec<(usize, u64)> = stock
            .iter()
            .zip(&cost_of)
            .enumerate()
            .filter(|&(_, (&left, &cost))| left > 0 && total_giveaway + cost <= gained)
            .map(|(index, (&left, _))| (index, left))
            .collect();

        let weights: Vec<u64> = eligible.iter().map(|(_, left)| *left).collect();
        let Ok(choice) = WeightedIndex::new(&weights) else {
            break;
        };

        let Some(&(index, _)) = eligible.get(choice.sample(rng)) else {
            break;
        };

        if let Some(left) = stock.get_mut(index) {
            *left -= 1;
        }
        if let (Some(&cost), Some(&category)) = (cost_of.get(index), CATEGORIES.get(index)) {
            total_giveaway += cost;
            opened.push(category);
        }
    }

    opened
}

fn max_price(prices: &CategoryValues<Decimal>, profit: Decimal, loyalty: Decimal) -> Decimal {
    ((profit + Decimal::ONE) * (loyalty * prices.costly - loyalty * prices.cheap + prices.cheap))
        .round_dp(2)
}

fn min_price(prices: &CategoryValues<Decimal>, profit: Decimal, loyalty: Decimal) -> Decimal {
    let bound = ((profit + Decimal::ONE)
        * (loyalty * prices.middle - loyalty * prices.cheap + prices.cheap))
        .round_dp(2);

    // A zero margin collapses the interval; widen it by a fixed offset.
    if profit == Decimal::ZERO {
        bound + TEN
    } else {
        bound
    }
}

fn select_price(
    requested: Decimal,
    min_price: Decimal,
    max_price: Decimal,
    rounded_min: Decimal,
    rounded_max: Decimal,
) -> Result<(Decimal, String), BlackBoxError> {
    if requested == Decimal::ZERO {
        return Ok((optimal_price(min_price, max_price)?, String::new()));
    }

    if requested < min_price || requested > max_price {
        let message = format!(
            "С новыми значениями констант цена должна лежать в интервале от {} до {}, поэтому она была перерасчитана.",
            rounded_min.normalize(),
            rounded_max.normalize()
        );
        return Ok((optimal_price(min_price, max_price)?, message));
    }

    Ok((requested, String::new()))
}

fn optimal_price(min_price: Decimal, max_price: Decimal) -> Result<Decimal, BlackBoxError> {
    let mean = (min_price * max_price)
        .sqrt()
        .ok_or(BlackBoxError::InvariantViolation {
            message: "geometric mean of a negative interval",
        })?;

    Ok(round_up_tens(mean))
}

fn probabilities(
    prices: &CategoryValues<Decimal>,
    price: Decimal,
    profit: Decimal,
    loyalty: Decimal,
) -> (Decimal, Decimal, Decimal) {
    let p_cheap = Decimal::ONE - loyalty;
    let p_costly = (price / (profit + Decimal::ONE)
        - loyalty * (prices.middle - prices.cheap)
        - prices.cheap)
        / (prices.costly - prices.middle);
    let p_middle = loyalty - p_costly;

    (p_costly, p_middle, p_cheap)
}

/// Scales the middle and cheap quantities from the costly stock anchor.
///
/// When the costly probability is effectively zero the mix degrades to a
/// two-category split anchored on whichever of middle and cheap holds the
/// larger share.
fn amounts(
    costly_amount: u64,
    (p_costly, p_middle, p_cheap): (Decimal, Decimal, Decimal),
) -> Result<CategoryValues<u64>, BlackBoxError> {
    let anchor = Decimal::from(costly_amount);

    let raw = if p_costly.abs() < PROBABILITY_EPSILON {
        if p_middle >= p_cheap {
            [
                Decimal::ZERO,
                anchor,
                (anchor * p_cheap / p_middle).ceil(),
            ]
        } else {
            [
                Decimal::ZERO,
                (anchor * p_middle / p_cheap).floor(),
                anchor,
            ]
        }
    } else {
        [
            anchor,
            (anchor * p_middle / p_costly).ceil(),
            (anchor * p_cheap / p_costly).ceil(),
        ]
    };

    let [costly, middle, cheap] = raw;
    let counts = [
        to_count(costly.max(Decimal::ZERO))?,
        to_count(middle.max(Decimal::ZERO))?,
        to_count(cheap.max(Decimal::ZERO))?,
    ];

    Ok(CategoryValues::from(counts))
}

fn within_output_limit(price: Decimal, amounts: &CategoryValues<u64>) -> bool {
    if price >= OUTPUT_LIMIT {
        return false;
    }

    amounts
        .as_array()
        .iter()
        .all(|&amount| Decimal::from(amount) < OUTPUT_LIMIT)
}

fn round_up_tens(value: Decimal) -> Decimal {
    (value / TEN).ceil() * TEN
}

fn round_down_tens(value: Decimal) -> Decimal {
    (value / TEN).floor() * TEN
}

fn to_count(value: Decimal) -> Result<u64, BlackBoxError> {
    value.to_u64().ok_or(BlackBoxError::InvariantViolation {
        message: "quantity is not a non-negative integer",
    })
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use testresult::TestResult;

    use super::*;

    fn costs(costly: Decimal, middle: Decimal, cheap: Decimal) -> CategoryValues<Decimal> {
        CategoryValues {
            costly,
            middle,
            cheap,
        }
    }

    #[test]
    fn out_of_interval_price_is_recalculated_with_advice() -> TestResult {
        let mut input = BlackBoxInput::new(costs(dec!(400), dec!(200), dec!(100)), 10, dec!(160));
        input.rentability = Decimal::ZERO;

        let report = solve_black_box(&input)?;

        assert!(report.success);
        assert_eq!(
            report.message,
            "С новыми значениями констант цена должна лежать в интервале \
             от 170 до 280, поэтому она была перерасчитана."
        );

        let bounds = report.black_box_cost.ok_or("missing price bounds")?;
        assert_eq!(bounds.min, dec!(170));
        assert_eq!(bounds.max, dec!(280));
        // Geometric mean of the bounds, rounded up to the nearest ten.
        assert_eq!(bounds.cur, dec!(220));

        let amounts = report.amounts.ok_or("missing amounts")?;
        assert_eq!(amounts.as_array(), [10, 10, 14]);

        let probabilities = report.probabilities.ok_or("missing probabilities")?;
        assert_eq!(probabilities.costly, dec!(0.294));
        assert_eq!(probabilities.middle, dec!(0.294));
        assert_eq!(probabilities.cheap, dec!(0.412));

        assert_eq!(report.loyalty, Some(dec!(0.59)));
        assert_eq!(report.rentability, Some(dec!(0.01)));

        Ok(())
    }

    #[test]
    fn in_interval_price_is_kept_without_advice() -> TestResult {
        // Feasible interval for these inputs is [25.3, 32.2].
        let input = BlackBoxInput::new(costs(dec!(40), dec!(30), dec!(10)), 10, dec!(30));

        let report = solve_black_box(&input)?;

        assert!(report.success);
        assert!(report.message.is_empty());

        let bounds = report.black_box_cost.ok_or("missing price bounds")?;
        assert_eq!(bounds.cur, dec!(30));

        Ok(())
    }

    #[test]
    fn recalculation_is_idempotent() -> TestResult {
        let first = solve_black_box(&BlackBoxInput::new(
            costs(dec!(8000), dec!(2000), dec!(1000)),
            10,
            Decimal::ZERO,
        ))?;

        let bounds = first.black_box_cost.ok_or("missing price bounds")?;
        let second = solve_black_box(&BlackBoxInput::new(
            costs(dec!(8000), dec!(2000), dec!(1000)),
            10,
            bounds.cur,
        ))?;

        assert_eq!(first.probabilities, second.probabilities);
        assert_eq!(first.amounts, second.amounts);
        assert_eq!(first.black_box_cost, second.black_box_cost);

        Ok(())
    }

    #[test]
    fn oversized_outputs_are_rejected() -> TestResult {
        let mut input = BlackBoxInput::new(
            costs(dec!(400_000_000_000), dec!(200_000_000_000), dec!(100_000_000_000)),
            10,
            dec!(300_000_000_000),
        );
        input.rentability = Decimal::ZERO;

        let report = solve_black_box(&input)?;

        assert!(!report.success);
        assert_eq!(report.message, MESSAGE_TOO_LARGE);
        assert!(report.amounts.is_none());

        Ok(())
    }

    #[test]
    fn close_prices_produce_an_advisory_only() -> TestResult {
        let report = solve_black_box(&BlackBoxInput::new(
            costs(dec!(101), dec!(100), dec!(50)),
            10,
            Decimal::ZERO,
        ))?;

        assert!(report.success);
        assert_eq!(report.message, MESSAGE_PRICES_TOO_CLOSE);
        assert!(report.amounts.is_none());

        Ok(())
    }

    #[test]
    fn draws_only_grant_affordable_prizes() {
        let mut rng = StdRng::seed_from_u64(42);
        let amounts = CategoryValues::from([1_u64, 1, 1]);
        let prize_costs = costs(dec!(40), dec!(30), dec!(10));

        let opened = open_box_draws(5, &amounts, &prize_costs, dec!(15), &mut rng);

        // Round one affords only the cheap prize; round two affords nothing.
        assert_eq!(opened, vec![Category::Cheap]);
    }

    #[test]
    fn draws_stop_when_stock_is_exhausted() {
        let mut rng = StdRng::seed_from_u64(7);
        let amounts = CategoryValues::from([1_u64, 1, 1]);
        let prize_costs = costs(dec!(40), dec!(30), dec!(10));

        let opened = open_box_draws(10, &amounts, &prize_costs, dec!(100), &mut rng);

        assert_eq!(opened.len(), 3);
        for category in [Category::Costly, Category::Middle, Category::Cheap] {
            assert!(opened.contains(&category), "missing {category:?}");
        }
    }

    #[test]
    fn rounding_to_tens() {
        assert_eq!(round_up_tens(dec!(218.17)), dec!(220));
        assert_eq!(round_up_tens(dec!(170)), dec!(170));
        assert_eq!(round_down_tens(dec!(280)), dec!(280));
        assert_eq!(round_down_tens(dec!(279.99)), dec!(270));
    }
}
