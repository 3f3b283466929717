//! Discount giveaway allocation across multiple price lots.
//!
//! Generalises the single-lot solver: the campaign budget is split across
//! lots, participants are split proportionally to each lot's spending power,
//! and every lot is solved against the shared discount tier sequence. The
//! report carries realized totals, not requested ones, because rounding may
//! shift a participant between lots.

use num_traits::ToPrimitive;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Serialize;
use thiserror::Error;

use crate::{
    lot::{Lot, LotError, solve_lot},
    rounding::round_preserving_sum,
};

/// Errors from the discount allocation engine.
///
/// Numeric domain validation (negative prices, probabilities out of range)
/// is the caller's responsibility; only structural problems are checked
/// here.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DiscountError {
    /// No price lots were supplied.
    #[error("at least one price lot is required")]
    NoLots,

    /// The budget distribution does not have one share per lot.
    #[error("budget distribution must have one share per lot, got {shares} for {lots} lots")]
    DistributionMismatch {
        /// Number of distribution shares supplied
        shares: usize,
        /// Number of price lots supplied
        lots: usize,
    },

    /// The unlucky share must be a fraction strictly below one.
    #[error("unlucky share must be below 1, got {share}")]
    UnluckyShareOutOfRange {
        /// Share supplied by the caller
        share: Decimal,
    },

    /// Wrapped single-lot solver error.
    #[error(transparent)]
    Lot(#[from] LotError),

    /// Internal allocation invariant was violated (this is a bug).
    #[error("allocation invariant violated: {message}")]
    InvariantViolation {
        /// What invariant was violated
        message: &'static str,
    },
}

/// Inputs for a discount giveaway allocation.
#[derive(Debug, Clone)]
pub struct DiscountInput {
    /// Unit price per lot
    pub prices: Vec<Decimal>,

    /// Shared discount tiers, sorted ascending
    pub discounts: Vec<Decimal>,

    /// Total campaign budget
    pub budget: Decimal,

    /// Participants who receive a prize draw
    pub lucky_participants: u32,

    /// Probability that a granted discount is actually used
    pub usage_probability: Decimal,

    /// Fraction of the total participants who receive nothing
    pub unlucky_share: Option<Decimal>,

    /// Fractional budget split across lots; defaults to an equal split
    pub budget_distribution: Option<Vec<Decimal>>,
}

/// Computed discount giveaway allocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiscountReport {
    /// Always `true`; domain failures surface as errors before a report exists
    pub success: bool,

    /// Advisory message, empty on a clean solve
    pub message: String,

    /// Quantity matrix, one row per lot, one column per discount tier
    pub amounts: Vec<Vec<u64>>,

    /// Realized participants per lot (row sums of `amounts`)
    pub participants_per_lot: Vec<u64>,

    /// Realized total of prize-winning participants
    pub lucky_participants: u64,

    /// Participants who receive nothing, derived from the unlucky share
    pub unlucky_participants: u64,

    /// Lucky plus unlucky participants
    pub total_participants: u64,

    /// Fractional budget split actually used
    pub budget_distribution: Vec<Decimal>,

    /// Expected spend: usage probability times the allocated discount value
    pub expected_budget: Decimal,
}

const CENTS: Decimal = dec!(100);

/// Allocates a discount giveaway across its price lots.
///
/// # Errors
///
/// Returns a [`DiscountError`] for structural problems (no lots, mismatched
/// distribution, bad tier sequence) or when an internal invariant breaks.
pub fn solve_discounts(input: &DiscountInput) -> Result<DiscountReport, DiscountError> {
    let lot_count = input.prices.len();
    if lot_count == 0 {
        return Err(DiscountError::NoLots);
    }

    let distribution = match &input.budget_distribution {
        Some(shares) if shares.len() == lot_count => shares.clone(),
        Some(shares) => {
            return Err(DiscountError::DistributionMismatch {
                shares: shares.len(),
                lots: lot_count,
            });
        }
        None => {
            let share = Decimal::ONE / Decimal::from(lot_count);
            vec![share; lot_count]
        }
    };

    // Absolute per-lot budgets at integer-cent precision.
    let cents: Vec<Decimal> = distribution
        .iter()
        .map(|share| share * input.budget * CENTS)
        .collect();
    let budgets: Vec<Decimal> = round_preserving_sum(&cents)
        .iter()
        .map(|cents| cents / CENTS)
        .collect();

    let split = participant_split(&budgets, &input.prices, input.lucky_participants);

    let mut amounts = Vec::with_capacity(lot_count);
    for ((&price, &budget), &participants) in input.prices.iter().zip(&budgets).zip(&split) {
        let lot = Lot {
            price,
            budget,
            participants,
        };
        amounts.push(solve_lot(&lot, &input.discounts)?);
    }

    let participants_per_lot: Vec<Decimal> =
        amounts.iter().map(|row| row.iter().copied().sum()).collect();
    let lucky: Decimal = participants_per_lot.iter().copied().sum();

    let unlucky = match input.unlucky_share {
        Some(share) if share >= Decimal::ONE => {
            return Err(DiscountError::UnluckyShareOutOfRange { share });
        }
        Some(share) => (lucky * share / (Decimal::ONE - share)).round(),
        None => Decimal::ZERO,
    };

    let allocated_value: Decimal = amounts
        .iter()
        .zip(&input.prices)
        .map(|(row, &price)| {
            row.iter()
                .zip(&input.discounts)
                .map(|(quantity, tier)| quantity * tier * price)
                .sum::<Decimal>()
        })
        .sum();
    let expected_budget = (input.usage_probability * allocated_value).round_dp(2);

    Ok(DiscountReport {
        success: true,
        message: String::new(),
        amounts: amounts
            .iter()
            .map(|row| row.iter().map(|value| to_count(*value)).collect())
            .collect::<Result<_, _>>()?,
        participants_per_lot: participants_per_lot
            .iter()
            .map(|value| to_count(*value))
            .collect::<Result<_, _>>()?,
        lucky_participants: to_count(lucky)?,
        unlucky_participants: to_count(unlucky)?,
        total_participants: to_count(lucky + unlucky)?,
        budget_distribution: distribution,
        expected_budget,
    })
}

/// Splits the lucky participants across lots proportionally to each lot's
/// spending power (budget share over price), rounded to integers without
/// changing the total.
fn participant_split(budgets: &[Decimal], prices: &[Decimal], lucky: u32) -> Vec<Decimal> {
    let weights: Vec<Decimal> = budgets
        .iter()
        .zip(prices)
        .map(|(budget, price)| budget / price)
        .collect();

    let weight_total: Decimal = weights.iter().sum();
    if weight_total == Decimal::ZERO {
        return vec![Decimal::ZERO; weights.len()];
    }

    let lucky = Decimal::from(lucky);
    let targets: Vec<Decimal> = weights
        .iter()
        .map(|weight| lucky * weight / weight_total)
        .collect();

    round_preserving_sum(&targets)
}

fn to_count(value: Decimal) -> Result<u64, DiscountError> {
    value.to_u64().ok_or(DiscountError::InvariantViolation {
        message: "rounded amount is not a non-negative integer",
    })
}
