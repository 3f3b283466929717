//! Single-lot allocation across ordered discount tiers.
//!
//! A lot is one price point of giveaway inventory. The solver spreads the
//! lot's participants over a strictly positive, ascending sequence of
//! discount tiers so that the participant count is matched exactly and the
//! weighted cost tracks the lot budget as closely as integer quantities
//! allow.

use rust_decimal::{Decimal, MathematicalOps};
use thiserror::Error;

use crate::rounding::{self, RoundingError, TOLERANCE};

/// Errors from solving a single lot.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum LotError {
    /// Fewer than two discount tiers were supplied.
    #[error("at least two discount tiers are required, got {count}")]
    TooFewTiers {
        /// Number of tiers supplied
        count: usize,
    },

    /// A discount tier was zero or negative.
    #[error("discount tiers must be positive")]
    NonPositiveTier,

    /// Every tier has the same value, so the allocation is underdetermined.
    #[error("discount tiers must not all be equal")]
    DegenerateTiers,

    /// The lot price was zero or negative.
    #[error("lot price must be positive")]
    NonPositivePrice,

    /// Internal solver invariant was violated (this is a bug).
    #[error("lot solver invariant violated: {message}")]
    InvariantViolation {
        /// What invariant was violated
        message: &'static str,
    },

    /// Wrapped rounding invariant error.
    #[error(transparent)]
    Rounding(#[from] RoundingError),
}

/// One price lot with its share of the campaign budget and participants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Lot {
    /// Unit price of the lot's inventory
    pub price: Decimal,

    /// Absolute budget assigned to this lot
    pub budget: Decimal,

    /// Participants to allocate across the tiers
    pub participants: Decimal,
}

/// Allocates a lot's participants across ascending discount tiers.
///
/// Three budget regimes apply:
///
/// - below `price * participants * tiers[0]` the lot is infeasible even with
///   everyone on the lowest tier; only as many units as the budget affords
///   go to tier zero and the count constraint is relaxed;
/// - above `price * participants * tiers[last]` everyone goes to the top
///   tier;
/// - in between, a closed-form continuous solution matches both the count
///   and the budget exactly and is then rounded via
///   [`rounding::round_within_budget`].
///
/// # Errors
///
/// Returns a [`LotError`] when fewer than two tiers are supplied, a tier or
/// the price is not positive, or all tiers are equal. Rounding and algebra
/// invariant violations indicate a solver bug.
pub fn solve_lot(lot: &Lot, tiers: &[Decimal]) -> Result<Vec<Decimal>, LotError> {
    validate(lot, tiers)?;

    let (&lowest, _) = tiers.split_first().ok_or(LotError::TooFewTiers { count: 0 })?;
    let (&highest, _) = tiers.split_last().ok_or(LotError::TooFewTiers { count: 0 })?;

    let min_budget = lot.price * lot.participants * lowest;
    let max_budget = lot.price * lot.participants * highest;

    if lot.budget < min_budget {
        // Even the cheapest tier cannot cover everyone.
        let affordable = (lot.budget / (lowest * lot.price)).floor();
        let mut amounts = vec![Decimal::ZERO; tiers.len()];
        if let Some(first) = amounts.first_mut() {
            *first = affordable;
        }
        return Ok(amounts);
    }

    if lot.budget > max_budget {
        let mut amounts = vec![Decimal::ZERO; tiers.len()];
        if let Some(last) = amounts.last_mut() {
            *last = lot.participants;
        }
        return Ok(amounts);
    }

    let continuous = solve_interior(lot, tiers)?;

    Ok(rounding::round_within_budget(
        &continuous,
        tiers,
        lot.price,
        lot.budget,
    )?)
}

fn validate(lot: &Lot, tiers: &[Decimal]) -> Result<(), LotError> {
    if tiers.len() < 2 {
        return Err(LotError::TooFewTiers { count: tiers.len() });
    }

    if tiers.iter().any(|tier| *tier <= Decimal::ZERO) {
        return Err(LotError::NonPositiveTier);
    }

    if tiers.windows(2).all(|pair| match pair {
        [a, b] => a == b,
        _ => true,
    }) {
        return Err(LotError::DegenerateTiers);
    }

    if lot.price <= Decimal::ZERO {
        return Err(LotError::NonPositivePrice);
    }

    Ok(())
}

/// Continuous interior solution matching the count and budget constraints.
///
/// The allocation follows a square-root-weighted rule: consecutive
/// quantities relate by `q_next / q_prev = sqrt(tier_prev / tier_next)`.
/// The closed-form system is only stable when the tiers are ordered away
/// from the anchor tier implied by the budget, so a threshold at
/// `price * participants * (sum sqrt(t)) / (sum 1/sqrt(t))` picks the
/// ascending solve for low budgets and the descending-then-reversed solve
/// for high ones.
fn solve_interior(lot: &Lot, tiers: &[Decimal]) -> Result<Vec<Decimal>, LotError> {
    let threshold = lot.price * lot.participants * anchor_weight(tiers)?;

    let mut amounts = if lot.budget <= threshold {
        solve_ordered(lot, tiers)?
    } else {
        let descending: Vec<Decimal> = tiers.iter().rev().copied().collect();
        let mut solved = solve_ordered(lot, &descending)?;
        solved.reverse();
        solved
    };

    for amount in &mut amounts {
        if *amount < -TOLERANCE {
            return Err(LotError::InvariantViolation {
                message: "continuous allocation went negative",
            });
        }
        // Clamp numeric dust at the regime boundaries.
        if *amount < Decimal::ZERO {
            *amount = Decimal::ZERO;
        }
    }

    Ok(amounts)
}

/// Solves the two-unknown linear system over tiers in the given order.
///
/// With `a = tiers[0]` as the anchor and `s = sqrt(tiers[1])`, the second
/// quantity `q` and the anchor quantity `q0` satisfy
///
/// ```text
/// q0 + q * sum(s / sqrt(t_i))     = participants      (i >= 1)
/// q0 * a + q * s * sum(sqrt(t_i)) = budget / price    (i >= 1)
/// ```
///
/// and the remaining quantities follow the recurrence `q * s / sqrt(t_i)`.
fn solve_ordered(lot: &Lot, ordered: &[Decimal]) -> Result<Vec<Decimal>, LotError> {
    let (&anchor, tail) = ordered
        .split_first()
        .ok_or(LotError::TooFewTiers { count: 0 })?;
    let &second = tail.first().ok_or(LotError::TooFewTiers { count: 1 })?;

    let sqrt_second = sqrt(second)?;

    let mut ratio_sum = Decimal::ZERO;
    let mut weighted_sum = Decimal::ZERO;
    for &tier in tail {
        let root = sqrt(tier)?;
        ratio_sum += sqrt_second / root;
        weighted_sum += sqrt_second * root;
    }

    let denominator = weighted_sum - anchor * ratio_sum;
    if denominator == Decimal::ZERO {
        return Err(LotError::DegenerateTiers);
    }

    let second_value = (lot.budget / lot.price - lot.participants * anchor) / denominator;
    let anchor_value = lot.participants - second_value * ratio_sum;

    let mut amounts = Vec::with_capacity(ordered.len());
    amounts.push(anchor_value);
    for &tier in tail {
        amounts.push(second_value * sqrt_second / sqrt(tier)?);
    }

    Ok(amounts)
}

fn anchor_weight(tiers: &[Decimal]) -> Result<Decimal, LotError> {
    let mut roots = Decimal::ZERO;
    let mut inverse_roots = Decimal::ZERO;

    for &tier in tiers {
        let root = sqrt(tier)?;
        roots += root;
        inverse_roots += Decimal::ONE / root;
    }

    Ok(roots / inverse_roots)
}

fn sqrt(value: Decimal) -> Result<Decimal, LotError> {
    value.sqrt().ok_or(LotError::InvariantViolation {
        message: "square root of a negative tier",
    })
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;
    use testresult::TestResult;

    use super::*;

    fn lot(price: Decimal, budget: Decimal, participants: Decimal) -> Lot {
        Lot {
            price,
            budget,
            participants,
        }
    }

    fn weighted_cost(amounts: &[Decimal], tiers: &[Decimal], price: Decimal) -> Decimal {
        amounts
            .iter()
            .zip(tiers)
            .map(|(a, t)| a * t * price)
            .sum()
    }

    #[test]
    fn below_minimum_budget_fills_lowest_tier_only() -> TestResult {
        let tiers = [dec!(0.1), dec!(0.2)];
        let amounts = solve_lot(&lot(dec!(100), dec!(50), dec!(10)), &tiers)?;

        assert_eq!(amounts, vec![dec!(5), dec!(0)]);

        Ok(())
    }

    #[test]
    fn above_maximum_budget_fills_highest_tier_only() -> TestResult {
        let tiers = [dec!(0.1), dec!(0.2)];
        let amounts = solve_lot(&lot(dec!(100), dec!(500), dec!(10)), &tiers)?;

        assert_eq!(amounts, vec![dec!(0), dec!(10)]);

        Ok(())
    }

    #[test]
    fn interior_ascending_solve_matches_both_constraints() -> TestResult {
        let tiers = [dec!(0.1), dec!(0.2)];
        let amounts = solve_lot(&lot(dec!(100), dec!(120), dec!(10)), &tiers)?;

        assert_eq!(amounts, vec![dec!(8), dec!(2)]);
        assert_eq!(weighted_cost(&amounts, &tiers, dec!(100)), dec!(120));

        Ok(())
    }

    #[test]
    fn interior_descending_solve_matches_both_constraints() -> TestResult {
        let tiers = [dec!(0.1), dec!(0.2)];
        let amounts = solve_lot(&lot(dec!(100), dec!(150), dec!(10)), &tiers)?;

        assert_eq!(amounts, vec![dec!(5), dec!(5)]);
        assert_eq!(weighted_cost(&amounts, &tiers, dec!(100)), dec!(150));

        Ok(())
    }

    #[test]
    fn interior_three_tier_solve_rounds_under_budget() -> TestResult {
        let tiers = [dec!(0.1), dec!(0.2), dec!(0.4)];
        let budget = dec!(200);
        let amounts = solve_lot(&lot(dec!(100), budget, dec!(10)), &tiers)?;

        assert_eq!(amounts, vec![dec!(5), dec!(3), dec!(2)]);

        let total: Decimal = amounts.iter().sum();
        assert_eq!(total, dec!(10), "participant count must be preserved");
        assert!(
            weighted_cost(&amounts, &tiers, dec!(100)) <= budget + TOLERANCE,
            "weighted cost must stay within budget"
        );

        Ok(())
    }

    #[test]
    fn interior_solves_preserve_count_across_budgets() -> TestResult {
        let tiers = [dec!(0.05), dec!(0.1), dec!(0.25), dec!(0.5)];
        let price = dec!(250);
        let participants = dec!(37);

        let min_budget = price * participants * dec!(0.05);
        let max_budget = price * participants * dec!(0.5);
        let step = (max_budget - min_budget) / dec!(7);

        for i in 0..=7 {
            let budget = min_budget + step * Decimal::from(i);
            let amounts = solve_lot(&lot(price, budget, participants), &tiers)?;

            let total: Decimal = amounts.iter().sum();
            assert_eq!(total, participants, "count drifted at budget {budget}");
            assert!(
                weighted_cost(&amounts, &tiers, price) <= budget + TOLERANCE,
                "cost exceeded budget {budget}"
            );
            assert!(
                amounts.iter().all(|a| *a >= Decimal::ZERO),
                "negative amount at budget {budget}"
            );
        }

        Ok(())
    }

    #[test]
    fn duplicate_tiers_are_allowed_when_not_all_equal() -> TestResult {
        let tiers = [dec!(0.5), dec!(0.5), dec!(1), dec!(1.5), dec!(2)];
        let price = dec!(100);
        let participants = dec!(10);
        let budget = dec!(1000);

        let amounts = solve_lot(&lot(price, budget, participants), &tiers)?;

        let total: Decimal = amounts.iter().sum();
        assert_eq!(total, participants, "count must be preserved");
        assert!(
            weighted_cost(&amounts, &tiers, price) <= budget + TOLERANCE,
            "cost must stay within budget"
        );

        Ok(())
    }

    #[test]
    fn rejects_single_tier() {
        let result = solve_lot(&lot(dec!(100), dec!(100), dec!(10)), &[dec!(0.1)]);
        assert_eq!(result, Err(LotError::TooFewTiers { count: 1 }));
    }

    #[test]
    fn rejects_zero_tier() {
        let result = solve_lot(&lot(dec!(100), dec!(100), dec!(10)), &[dec!(0), dec!(0.2)]);
        assert_eq!(result, Err(LotError::NonPositiveTier));
    }

    #[test]
    fn rejects_all_equal_tiers() {
        let result = solve_lot(&lot(dec!(100), dec!(100), dec!(10)), &[dec!(0.2), dec!(0.2)]);
        assert_eq!(result, Err(LotError::DegenerateTiers));
    }

    #[test]
    fn rejects_non_positive_price() {
        let result = solve_lot(&lot(dec!(0), dec!(100), dec!(10)), &[dec!(0.1), dec!(0.2)]);
        assert_eq!(result, Err(LotError::NonPositivePrice));
    }
}
