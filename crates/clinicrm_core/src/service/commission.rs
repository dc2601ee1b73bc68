//! Commission split calculation.
//!
//! # Responsibility
//! - Derive referrer/receiver commission from a deal amount, rate and split.
//!
//! # Invariants
//! - Pure and deterministic; no I/O, no clock.
//! - `total == round(deal_amount * rate)` at the currency scale.
//! - `referrer + receiver == total` exactly: each share is rounded on its own
//!   and any residual minor unit is moved onto the smaller share.

use crate::config::CommissionConfig;
use crate::error::{CoreError, CoreResult};
use crate::model::referral::Commission;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

/// Minor-unit digits used when no config is supplied.
pub const DEFAULT_CURRENCY_SCALE: u32 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Share {
    Referrer,
    Receiver,
}

/// Commission plus the intermediate values that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommissionBreakdown {
    pub deal_amount: Decimal,
    pub commission_rate: Decimal,
    pub split_ratio: Decimal,
    /// `deal_amount * commission_rate` before rounding.
    pub raw_total: Decimal,
    pub commission: Commission,
    /// Amount moved onto `adjusted_share` to close the sum; zero when none.
    pub rounding_residual: Decimal,
    pub adjusted_share: Option<Share>,
}

/// Rate, split and scale in force for a calculation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommissionPolicy {
    pub rate: Decimal,
    pub split_ratio: Decimal,
    pub currency_scale: u32,
}

impl CommissionPolicy {
    pub fn from_config(config: &CommissionConfig) -> Self {
        Self {
            rate: config.rate,
            split_ratio: config.split_ratio,
            currency_scale: config.currency_scale,
        }
    }

    pub fn calculate(&self, deal_amount: Decimal) -> CoreResult<CommissionBreakdown> {
        calculate_detailed(deal_amount, self.rate, self.split_ratio, self.currency_scale)
    }
}

impl Default for CommissionPolicy {
    fn default() -> Self {
        Self::from_config(&CommissionConfig::default())
    }
}

/// Splits commission at the default currency scale.
pub fn calculate(
    deal_amount: Decimal,
    commission_rate: Decimal,
    split_ratio: Decimal,
) -> CoreResult<Commission> {
    calculate_detailed(
        deal_amount,
        commission_rate,
        split_ratio,
        DEFAULT_CURRENCY_SCALE,
    )
    .map(|breakdown| breakdown.commission)
}

/// Splits commission and reports how rounding was resolved.
///
/// # Errors
/// - `Validation` when `deal_amount <= 0` or rate/split fall outside [0, 1].
pub fn calculate_detailed(
    deal_amount: Decimal,
    commission_rate: Decimal,
    split_ratio: Decimal,
    currency_scale: u32,
) -> CoreResult<CommissionBreakdown> {
    if deal_amount <= Decimal::ZERO {
        return Err(CoreError::validation("dealAmount must be positive"));
    }
    let unit = Decimal::ZERO..=Decimal::ONE;
    if !unit.contains(&commission_rate) {
        return Err(CoreError::validation(format!(
            "commissionRate must be within [0, 1], got {commission_rate}"
        )));
    }
    if !unit.contains(&split_ratio) {
        return Err(CoreError::validation(format!(
            "splitRatio must be within [0, 1], got {split_ratio}"
        )));
    }

    let raw_total = deal_amount * commission_rate;
    let total = round_minor(raw_total, currency_scale);
    let mut referrer = round_minor(total * split_ratio, currency_scale);
    let mut receiver = round_minor(total * (Decimal::ONE - split_ratio), currency_scale);

    let residual = total - referrer - receiver;
    let adjusted_share = if residual.is_zero() {
        None
    } else {
        let smaller = if referrer < receiver {
            Share::Referrer
        } else {
            Share::Receiver
        };
        let target = match smaller {
            Share::Referrer if referrer + residual < Decimal::ZERO => Share::Receiver,
            Share::Receiver if receiver + residual < Decimal::ZERO => Share::Referrer,
            other => other,
        };
        match target {
            Share::Referrer => referrer += residual,
            Share::Receiver => receiver += residual,
        }
        Some(target)
    };

    Ok(CommissionBreakdown {
        deal_amount,
        commission_rate,
        split_ratio,
        raw_total,
        commission: Commission {
            referrer_commission: referrer,
            receiver_commission: receiver,
            total,
        },
        rounding_residual: residual,
        adjusted_share,
    })
}

fn round_minor(value: Decimal, scale: u32) -> Decimal {
    value.round_dp_with_strategy(scale, RoundingStrategy::MidpointAwayFromZero)
}

#[cfg(test)]
mod tests {
    use super::{calculate, calculate_detailed, Share};
    use crate::error::ErrorKind;
    use rust_decimal::Decimal;
    use std::str::FromStr;

    fn dec(value: &str) -> Decimal {
        Decimal::from_str(value).expect("decimal literal")
    }

    #[test]
    fn even_split_of_round_amount() {
        let commission = calculate(dec("28000"), dec("0.05"), dec("0.5")).unwrap();
        assert_eq!(commission.total, dec("1400"));
        assert_eq!(commission.referrer_commission, dec("700"));
        assert_eq!(commission.receiver_commission, dec("700"));
    }

    #[test]
    fn residual_cent_moves_to_smaller_share() {
        // total 0.05 split 0.5 -> 0.025 rounds up on both sides.
        let breakdown = calculate_detailed(dec("1"), dec("0.05"), dec("0.5"), 2).unwrap();
        let commission = breakdown.commission;
        assert_eq!(commission.total, dec("0.05"));
        assert_eq!(
            commission.referrer_commission + commission.receiver_commission,
            commission.total
        );
        assert_eq!(breakdown.rounding_residual, dec("-0.01"));
        assert_eq!(breakdown.adjusted_share, Some(Share::Receiver));
        assert_eq!(commission.receiver_commission, dec("0.02"));
    }

    #[test]
    fn sums_exactly_across_awkward_inputs() {
        for amount in ["0.01", "0.07", "1.11", "333.33", "9999.99", "123456.78"] {
            for rate in ["0", "0.033", "0.05", "0.125", "1"] {
                for split in ["0", "0.3", "0.5", "0.6667", "1"] {
                    let breakdown =
                        calculate_detailed(dec(amount), dec(rate), dec(split), 2).unwrap();
                    let c = breakdown.commission;
                    assert_eq!(c.referrer_commission + c.receiver_commission, c.total);
                    assert!(c.referrer_commission >= Decimal::ZERO);
                    assert!(c.receiver_commission >= Decimal::ZERO);
                    assert_eq!(
                        c.total,
                        (dec(amount) * dec(rate)).round_dp_with_strategy(
                            2,
                            rust_decimal::RoundingStrategy::MidpointAwayFromZero
                        )
                    );
                }
            }
        }
    }

    #[test]
    fn rejects_non_positive_amount_and_out_of_range_ratios() {
        let zero = calculate(Decimal::ZERO, dec("0.05"), dec("0.5")).unwrap_err();
        assert_eq!(zero.kind(), ErrorKind::Validation);
        assert!(calculate(dec("10"), dec("1.01"), dec("0.5")).is_err());
        assert!(calculate(dec("10"), dec("0.05"), dec("-0.1")).is_err());
    }

    #[test]
    fn full_split_goes_to_referrer() {
        let commission = calculate(dec("200"), dec("0.1"), Decimal::ONE).unwrap();
        assert_eq!(commission.referrer_commission, dec("20"));
        assert_eq!(commission.receiver_commission, Decimal::ZERO);
    }
}
