//! Booster mission allocation.
//!
//! A structural variant of the discount engine: instead of a shared tier
//! sequence, every mission generates its own value catalogue from two
//! families, multiplicative booster levels and additive fixed prizes sized
//! relative to the mission price. The catalogue is normalised to
//! percent-of-price discounts, sorted for the solver, and the solved
//! quantities are restored to catalogue order through the inverse
//! permutation.

use num_traits::ToPrimitive;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Serialize;
use thiserror::Error;

use crate::{
    lot::{Lot, LotError, solve_lot},
    rounding::round_preserving_sum,
};

/// Multiplicative booster levels, in the order missions consume them.
pub const BOOSTER_VALUES: [Decimal; 8] = [
    dec!(2),
    dec!(3),
    dec!(1.5),
    dec!(2.5),
    dec!(1.25),
    dec!(1.75),
    dec!(2.25),
    dec!(2.75),
];

/// Errors from the booster allocation engine.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum BoosterError {
    /// No missions were supplied.
    #[error("at least one mission price is required")]
    NoMissions,

    /// More booster levels were requested than exist.
    #[error("{requested} booster levels requested, only {} exist", BOOSTER_VALUES.len())]
    TooManyBoosters {
        /// Number of booster levels requested
        requested: usize,
    },

    /// The budget distribution does not have one amount per mission.
    #[error("budget distribution must have one amount per mission, got {amounts} for {missions} missions")]
    DistributionMismatch {
        /// Number of distribution amounts supplied
        amounts: usize,
        /// Number of missions supplied
        missions: usize,
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

/// Inputs for a booster mission allocation.
#[derive(Debug, Clone)]
pub struct BoosterInput {
    /// Mission prices
    pub prices: Vec<Decimal>,

    /// How many booster levels from [`BOOSTER_VALUES`] each mission uses
    pub booster_amount: usize,

    /// How many additive fixed prizes each mission generates
    pub fix_amount: usize,

    /// Total campaign budget
    pub budget: Decimal,

    /// Participants to allocate across missions
    pub participants: u32,

    /// Absolute budget per mission; defaults to an equal split
    pub budget_distribution: Option<Vec<Decimal>>,
}

/// Value catalogue for one mission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MissionValues {
    /// Multiplicative booster levels used by this mission
    pub booster: Vec<Decimal>,

    /// Additive fixed prize values, sized relative to the mission price
    pub fix: Vec<Decimal>,
}

/// Computed booster mission allocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BoosterReport {
    /// Always `true`; domain failures surface as errors before a report exists
    pub success: bool,

    /// Advisory message, empty on a clean solve
    pub message: String,

    /// Value catalogue per mission
    pub values: Vec<MissionValues>,

    /// Quantity matrix in catalogue order (boosters first, then fixed prizes)
    pub amounts: Vec<Vec<u64>>,

    /// Realized participants per mission (row sums of `amounts`)
    pub participants_per_mission: Vec<u64>,

    /// Absolute budget per mission actually used
    pub budget_distribution: Vec<Decimal>,
}

const CENTS: Decimal = dec!(100);
const TEN: Decimal = dec!(10);

/// Allocates booster missions across their generated value catalogues.
///
/// # Errors
///
/// Returns a [`BoosterError`] for structural problems (no missions, too many
/// booster levels, mismatched distribution, a catalogue too small to solve)
/// or when an internal invariant breaks.
pub fn solve_boosters(input: &BoosterInput) -> Result<BoosterReport, BoosterError> {
    let mission_count = input.prices.len();
    if mission_count == 0 {
        return Err(BoosterError::NoMissions);
    }
    if input.booster_amount > BOOSTER_VALUES.len() {
        return Err(BoosterError::TooManyBoosters {
            requested: input.booster_amount,
        });
    }

    let budgets = match &input.budget_distribution {
        Some(amounts) if amounts.len() == mission_count => amounts.clone(),
        Some(amounts) => {
            return Err(BoosterError::DistributionMismatch {
                amounts: amounts.len(),
                missions: mission_count,
            });
        }
        None => {
            let missions = Decimal::from(mission_count);
            let cents = vec![input.budget * CENTS / missions; mission_count];
            round_preserving_sum(&cents)
                .iter()
                .map(|cents| cents / CENTS)
                .collect()
        }
    };

    let missions = Decimal::from(mission_count);
    let targets = vec![Decimal::from(input.participants) / missions; mission_count];
    let split = round_preserving_sum(&targets);

    let mut values = Vec::with_capacity(mission_count);
    let mut amounts = Vec::with_capacity(mission_count);

    for ((&price, &budget), &participants) in input.prices.iter().zip(&budgets).zip(&split) {
        let catalogue = mission_values(price, input.booster_amount, input.fix_amount);
        let row = solve_mission(&catalogue, price, budget, participants)?;

        values.push(catalogue);
        amounts.push(row);
    }

    let participants_per_mission: Vec<Decimal> =
        amounts.iter().map(|row| row.iter().copied().sum()).collect();

    Ok(BoosterReport {
        success: true,
        message: String::new(),
        values,
        amounts: amounts
            .iter()
            .map(|row| row.iter().map(|value| to_count(*value)).collect())
            .collect::<Result<_, _>>()?,
        participants_per_mission: participants_per_mission
            .iter()
            .map(|value| to_count(*value))
            .collect::<Result<_, _>>()?,
        budget_distribution: budgets,
    })
}

/// Generates one mission's value catalogue.
///
/// Boosters are the first `booster_amount` entries of [`BOOSTER_VALUES`].
/// Fixed prizes step by `price / fix_amount` rounded to the nearest ten,
/// with the last prize one step above the mission price.
fn mission_values(price: Decimal, booster_amount: usize, fix_amount: usize) -> MissionValues {
    let booster = BOOSTER_VALUES
        .iter()
        .take(booster_amount)
        .copied()
        .collect();

    let mut fix = Vec::with_capacity(fix_amount);
    if fix_amount > 0 {
        let step = round_to_tens(price / Decimal::from(fix_amount));
        for i in 1..fix_amount {
            fix.push(step * Decimal::from(i));
        }
        fix.push(price + step);
    }

    MissionValues { booster, fix }
}

/// Solves one mission over its catalogue in percent-of-price space.
///
/// The catalogue values are normalised (booster `v` becomes `v - 1`, fixed
/// prize `v` becomes `v / price`), sorted ascending through an explicit
/// index permutation, solved as a single lot, and the quantities are mapped
/// back to catalogue order through the inverse permutation.
fn solve_mission(
    catalogue: &MissionValues,
    price: Decimal,
    budget: Decimal,
    participants: Decimal,
) -> Result<Vec<Decimal>, BoosterError> {
    let percents: Vec<Decimal> = catalogue
        .booster
        .iter()
        .map(|value| value - Decimal::ONE)
        .chain(catalogue.fix.iter().map(|value| value / price))
        .collect();

    let mut keyed: Vec<(usize, Decimal)> = percents.iter().copied().enumerate().collect();
    keyed.sort_by_key(|&(_, percent)| percent);

    let tiers: Vec<Decimal> = keyed.iter().map(|(_, percent)| *percent).collect();

    let lot = Lot {
        price,
        budget,
        participants,
    };
    let solved = solve_lot(&lot, &tiers)?;

    let mut restored = vec![Decimal::ZERO; percents.len()];
    for ((index, _), &amount) in keyed.iter().zip(&solved) {
        let slot = restored
            .get_mut(*index)
            .ok_or(BoosterError::InvariantViolation {
                message: "sort permutation index out of range",
            })?;
        *slot = amount;
    }

    Ok(restored)
}

fn round_to_tens(value: Decimal) -> Decimal {
    (value / TEN).round() * TEN
}

fn to_count(value: Decimal) -> Result<u64, BoosterError> {
    value.to_u64().ok_or(BoosterError::InvariantViolation {
        message: "rounded amount is not a non-negative integer",
    })
}
