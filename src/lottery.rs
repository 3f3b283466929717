//! Raffle ticket and lot budget solver.
//!
//! Derives feasible ticket-price and ticket-count ranges for a raffle from
//! its lot costs, a target write-off and the referral economics. Business
//! validation failures are reported as unsuccessful results, never as
//! errors, so the caller can surface them directly.

use num_traits::ToPrimitive;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Serialize;

/// Magnitude above which outputs are considered nonsensical.
const OUTPUT_LIMIT: Decimal = dec!(10_000_000_000);

const TEN: Decimal = dec!(10);

const MESSAGE_TOO_LARGE: &str =
    "Слишком большие значения, попробуйте уменьшить входные данные";

/// One raffle lot: a quantity of identical prizes at one price.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RaffleLot {
    /// Number of prizes in the lot
    pub amount: i64,

    /// Cost of one prize
    pub price: Decimal,
}

/// Inputs for a raffle computation.
#[derive(Debug, Clone)]
pub struct LotteryInput {
    /// Prize lots to give away
    pub lots: Vec<RaffleLot>,

    /// Target net cost basis to absorb
    pub write_off: Decimal,

    /// Every `referral_coeff + 1`-th ticket is given away through the
    /// referral programme; zero means there is no referral programme
    pub referral_coeff: Decimal,

    /// Referral discount rate, within `[0, 1]`
    pub discount: Decimal,

    /// Requested ticket count; zero together with a zero price means
    /// "derive both"
    pub ticket_amount: i64,

    /// Requested ticket price; zero together with a zero count means
    /// "derive both"
    pub ticket_price: Decimal,
}

/// A current value with its feasible bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Bounds<T> {
    /// Value actually used
    pub cur: T,
    /// Lower feasible bound
    pub min: T,
    /// Upper feasible bound
    pub max: T,
}

/// Computed raffle economics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LotteryReport {
    /// Whether the inputs passed business validation and the magnitude guard
    pub success: bool,

    /// Validation cause or advisory note, empty on a clean solve
    pub message: String,

    /// Realized write-off: ticket revenue minus total lot cost
    #[serde(skip_serializing_if = "Option::is_none")]
    pub write_off: Option<Decimal>,

    /// Ticket count actually used, with its feasible bounds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ticket_amount: Option<Bounds<i64>>,

    /// Total cost of all prize lots
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_cost: Option<Decimal>,

    /// Ticket price actually used, with its feasible bounds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ticket_price: Option<Bounds<Decimal>>,

    /// Worst-case profit after referral giveaways and discounts
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_profit: Option<Decimal>,

    /// Worst-case profit over total cost
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_rentability: Option<Decimal>,

    /// Write-off over total cost
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_rentability: Option<Decimal>,
}

impl LotteryReport {
    fn failure(message: String) -> Self {
        Self {
            success: false,
            message,
            write_off: None,
            ticket_amount: None,
            total_cost: None,
            ticket_price: None,
            min_profit: None,
            min_rentability: None,
            max_rentability: None,
        }
    }
}

/// Computes a raffle's ticket economics.
///
/// When the requested ticket count is too small for the requested price the
/// count is raised to the feasible minimum (and to at least the default
/// count) and the correction is reported through the message with
/// `success` still `true`.
pub fn solve_lottery(input: &LotteryInput) -> LotteryReport {
    if let Some(message) = validation_failure(input) {
        return LotteryReport::failure(message);
    }

    let total_cost: Decimal = input
        .lots
        .iter()
        .map(|lot| Decimal::from(lot.amount) * lot.price)
        .sum();
    let total_units: i64 = input.lots.iter().map(|lot| lot.amount).sum();

    if total_units == 0 || total_cost == Decimal::ZERO {
        return LotteryReport::failure("Error: lots must have a positive total cost".to_owned());
    }

    // Zero stands for "no referral programme": nothing is ever given away.
    let referral = (input.referral_coeff != Decimal::ZERO).then_some(input.referral_coeff);

    let default_amount = 4 * total_units;

    let mut message = String::new();
    let ticket_amount = if input.ticket_amount == 0 {
        default_amount
    } else {
        let minimum = min_ticket_amount(total_cost, input.ticket_price, total_units);
        if input.ticket_amount < minimum {
            message = format!(
                "Для заданной цены количество билетов должно быть не меньше {minimum}, поэтому оно было перерасчитано."
            );
            default_amount.max(minimum)
        } else {
            input.ticket_amount
        }
    };

    let amount = Decimal::from(ticket_amount);

    let ticket_price = if input.ticket_price == Decimal::ZERO {
        round_up_tens((input.write_off + total_cost) / amount)
    } else {
        input.ticket_price
    };

    let write_off = amount * ticket_price - total_cost;

    let referral_giveaway = match referral {
        Some(coeff) => (amount / (coeff + Decimal::ONE)).floor(),
        None => Decimal::ZERO,
    };
    let min_profit =
        (amount - referral_giveaway) * (Decimal::ONE - input.discount) * ticket_price - total_cost;

    if [total_cost, ticket_price, amount, write_off]
        .iter()
        .any(|value| value.abs() >= OUTPUT_LIMIT)
    {
        return LotteryReport::failure(MESSAGE_TOO_LARGE.to_owned());
    }

    let min_amount = min_ticket_amount(total_cost, ticket_price, total_units);
    let max_amount = 3 * ticket_amount - 2 * min_amount + 100;

    let min_price = TEN;
    let max_price = dec!(3) * ticket_price - dec!(2) * min_price + dec!(100);

    LotteryReport {
        success: true,
        message,
        write_off: Some(write_off),
        ticket_amount: Some(Bounds {
            cur: ticket_amount,
            min: min_amount,
            max: max_amount,
        }),
        total_cost: Some(total_cost),
        ticket_price: Some(Bounds {
            cur: ticket_price,
            min: min_price,
            max: max_price,
        }),
        min_profit: Some(min_profit.round()),
        min_rentability: Some((min_profit / total_cost).round_dp(2)),
        max_rentability: Some((write_off / total_cost).round_dp(2)),
    }
}

/// Fail-fast business validation.
///
/// Lot checks record a failure but keep scanning; the remaining checks stop
/// at the first failing condition, whose message wins over a lot failure.
fn validation_failure(input: &LotteryInput) -> Option<String> {
    let mut lot_failure = None;
    for lot in &input.lots {
        if lot.amount < 0 {
            lot_failure = Some("Error: lot amount < 0");
        }
        if lot.price < Decimal::ZERO {
            lot_failure = Some("Error: lot price < 0");
        }
    }

    if input.write_off < Decimal::ZERO {
        return Some("Error: write_off < 0".to_owned());
    }
    if input.referral_coeff < Decimal::ZERO {
        return Some("Error: referral_coeff < 0".to_owned());
    }
    if input.referral_coeff.fract() != Decimal::ZERO {
        return Some("Error: referral_coeff must be integer".to_owned());
    }
    if input.discount < Decimal::ZERO || input.discount > Decimal::ONE {
        return Some("Error: discount must be a number between 0 and 1".to_owned());
    }
    if input.ticket_amount < 0 {
        return Some("Error: ticket_amount < 0".to_owned());
    }
    if input.ticket_price < Decimal::ZERO {
        return Some("Error: ticket_price < 0".to_owned());
    }
    if (input.ticket_price == Decimal::ZERO) != (input.ticket_amount == 0) {
        return Some(
            "Error: ticket_amount and ticket_price must be either both zero or both non-zero"
                .to_owned(),
        );
    }

    lot_failure.map(str::to_owned)
}

/// Smallest ticket count that covers the lot cost at the given price and
/// still has one ticket per prize.
fn min_ticket_amount(total_cost: Decimal, price: Decimal, total_units: i64) -> i64 {
    (total_cost / price)
        .ceil()
        .to_i64()
        .unwrap_or(i64::MAX)
        .max(total_units)
}

fn round_up_tens(value: Decimal) -> Decimal {
    (value / TEN).ceil() * TEN
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_input() -> LotteryInput {
        LotteryInput {
            lots: vec![
                RaffleLot {
                    amount: 1,
                    price: dec!(1000),
                },
                RaffleLot {
                    amount: 2,
                    price: dec!(500),
                },
                RaffleLot {
                    amount: 3,
                    price: dec!(200),
                },
            ],
            write_off: dec!(1000),
            referral_coeff: dec!(4),
            discount: dec!(0.05),
            ticket_amount: 0,
            ticket_price: Decimal::ZERO,
        }
    }

    #[test]
    fn rejects_negative_lot_price() {
        let mut input = base_input();
        if let Some(lot) = input.lots.get_mut(1) {
            lot.price = dec!(-2);
        }

        let report = solve_lottery(&input);
        assert!(!report.success);
        assert_eq!(report.message, "Error: lot price < 0");
    }

    #[test]
    fn rejects_negative_write_off() {
        let mut input = base_input();
        input.write_off = dec!(-100);

        assert!(!solve_lottery(&input).success);
    }

    #[test]
    fn rejects_fractional_referral_coefficient() {
        let mut input = base_input();
        input.referral_coeff = dec!(3.5);

        let report = solve_lottery(&input);
        assert!(!report.success);
        assert_eq!(report.message, "Error: referral_coeff must be integer");
    }

    #[test]
    fn rejects_out_of_range_discount() {
        let mut input = base_input();
        input.discount = dec!(1.05);

        assert!(!solve_lottery(&input).success);
    }

    #[test]
    fn rejects_negative_ticket_fields() {
        let mut input = base_input();
        input.ticket_amount = -1;
        assert!(!solve_lottery(&input).success);

        let mut input = base_input();
        input.ticket_price = dec!(-1);
        assert!(!solve_lottery(&input).success);
    }

    #[test]
    fn rejects_half_specified_ticket_pair() {
        let mut input = base_input();
        input.ticket_amount = 30;

        let report = solve_lottery(&input);
        assert!(!report.success);
        assert_eq!(
            report.message,
            "Error: ticket_amount and ticket_price must be either both zero or both non-zero"
        );
    }

    #[test]
    fn derived_ticket_price_is_a_multiple_of_ten() {
        let mut input = base_input();
        for lot in &mut input.lots {
            lot.amount = 1;
        }

        let report = solve_lottery(&input);
        let price = report.ticket_price.map(|bounds| bounds.cur);

        assert!(report.success);
        assert_eq!(
            price.map(|p| p % TEN),
            Some(Decimal::ZERO),
            "derived price must land on tens"
        );
    }

    #[test]
    fn zero_total_cost_is_rejected() {
        let mut input = base_input();
        for lot in &mut input.lots {
            lot.price = Decimal::ZERO;
        }

        assert!(!solve_lottery(&input).success);
    }
}
