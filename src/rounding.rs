//! Sum- and budget-preserving integer rounding.
//!
//! Both primitives take a continuous allocation and snap every entry to an
//! integer with a single greedy pass over a running carry. The pass order is
//! part of the contract: callers must present values in a stable, meaningful
//! order, because the carry decides which entries round up.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use thiserror::Error;

/// Absolute slack allowed on the running carry ledgers.
pub const TOLERANCE: Decimal = dec!(0.01);

/// Errors raised when a rounding contract does not hold.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RoundingError {
    /// A rounding invariant was violated (this is a bug in the caller).
    #[error("rounding invariant violated: {message}")]
    InvariantViolation {
        /// What invariant was violated
        message: &'static str,
    },
}

/// Rounds non-negative values to integers while preserving their total.
///
/// Maintains a single "spare" carry: an entry rounds up when its shortfall
/// fits in the carry (within [`TOLERANCE`]), otherwise it rounds down and
/// credits its fractional part to the carry. When the input total is
/// integer-valued, the output total equals it exactly and every entry moves
/// by less than one.
pub fn round_preserving_sum(values: &[Decimal]) -> Vec<Decimal> {
    let mut spare = Decimal::ZERO;

    values
        .iter()
        .map(|&value| {
            let down = value.floor();
            if value == down {
                return value;
            }

            let up = value.ceil();
            let shortfall = up - value;

            if shortfall <= spare + TOLERANCE {
                spare -= shortfall;
                up
            } else {
                spare += value - down;
                down
            }
        })
        .collect()
}

/// Rounds a per-tier allocation to integers without exceeding the budget.
///
/// Like [`round_preserving_sum`], but the carry is tracked in two parallel
/// ledgers: a count ledger and a budget ledger of weighted cost
/// (`amount * weight * price`). The pass walks the tiers in reverse, highest
/// weight first, so that early round-downs free budget for the cheaper tiers,
/// and an entry only rounds up when both ledgers stay above `-TOLERANCE`.
///
/// # Errors
///
/// Returns [`RoundingError::InvariantViolation`] when the unrounded
/// allocation already costs more than `budget + TOLERANCE`, or when the
/// budget ledger ends up below `-TOLERANCE`. Neither can happen for
/// allocations produced by the lot solver.
pub fn round_within_budget(
    amounts: &[Decimal],
    weights: &[Decimal],
    price: Decimal,
    budget: Decimal,
) -> Result<Vec<Decimal>, RoundingError> {
    let cost: Decimal = amounts
        .iter()
        .zip(weights)
        .map(|(amount, weight)| amount * weight * price)
        .sum();

    if cost > budget + TOLERANCE {
        return Err(RoundingError::InvariantViolation {
            message: "unrounded allocation exceeds the budget",
        });
    }

    let mut spare_budget = budget - cost;
    let mut spare_amount = Decimal::ZERO;

    let mut rounded: Vec<Decimal> = amounts
        .iter()
        .zip(weights)
        .rev()
        .map(|(&amount, &weight)| {
            let down = amount.floor();
            if amount == down {
                return amount;
            }

            let up = amount.ceil();
            let shortfall = up - amount;
            let unit_cost = weight * price;

            if shortfall <= spare_amount + TOLERANCE
                && shortfall * unit_cost <= spare_budget + TOLERANCE
            {
                spare_amount -= shortfall;
                spare_budget -= shortfall * unit_cost;
                up
            } else {
                spare_amount += amount - down;
                spare_budget += (amount - down) * unit_cost;
                down
            }
        })
        .collect();

    if spare_budget < -TOLERANCE {
        return Err(RoundingError::InvariantViolation {
            message: "budget ledger went negative",
        });
    }

    rounded.reverse();

    Ok(rounded)
}
