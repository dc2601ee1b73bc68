use clinicrm_core::service::commission::Share;
use clinicrm_core::{
    calculate, calculate_detailed, ConversionInput, CoreConfig, Department, ErrorKind,
    InMemoryReferralRepository, ManualClock, ReferralDraft, ReferralService,
};
use rust_decimal::{Decimal, RoundingStrategy};
use std::str::FromStr;
use std::sync::Arc;

fn dec(value: &str) -> Decimal {
    Decimal::from_str(value).unwrap()
}

#[test]
fn reference_deal_splits_evenly() {
    let commission = calculate(dec("28000"), dec("0.05"), dec("0.5")).unwrap();
    assert_eq!(commission.total, dec("1400"));
    assert_eq!(commission.referrer_commission, dec("700"));
    assert_eq!(commission.receiver_commission, dec("700"));
}

#[test]
fn shares_always_sum_to_rounded_total() {
    let amounts = ["1", "0.37", "19.99", "333.33", "1234.57", "28000", "99999.99"];
    let rates = ["0", "0.01", "0.033", "0.05", "0.125", "1"];
    let splits = ["0", "0.3", "0.333", "0.5", "0.7", "1"];

    for amount in amounts {
        for rate in rates {
            for split in splits {
                let detail = calculate_detailed(dec(amount), dec(rate), dec(split), 2).unwrap();
                let commission = detail.commission;
                assert_eq!(
                    commission.referrer_commission + commission.receiver_commission,
                    commission.total,
                    "amount={amount} rate={rate} split={split}"
                );
                assert_eq!(
                    commission.total,
                    (dec(amount) * dec(rate))
                        .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
                );
                assert!(commission.referrer_commission >= Decimal::ZERO);
                assert!(commission.receiver_commission >= Decimal::ZERO);
            }
        }
    }
}

#[test]
fn odd_cent_is_absorbed_by_one_share() {
    let detail = calculate_detailed(dec("1"), dec("0.05"), dec("0.5"), 2).unwrap();
    assert_eq!(detail.raw_total, dec("0.05"));
    assert_eq!(detail.commission.total, dec("0.05"));
    assert_eq!(detail.rounding_residual, dec("-0.01"));
    assert_eq!(detail.adjusted_share, Some(Share::Receiver));
    assert_eq!(detail.commission.referrer_commission, dec("0.03"));
    assert_eq!(detail.commission.receiver_commission, dec("0.02"));
}

#[test]
fn invalid_inputs_are_validation_errors() {
    let cases = [
        ("0", "0.05", "0.5"),
        ("-10", "0.05", "0.5"),
        ("100", "1.5", "0.5"),
        ("100", "0.05", "-0.1"),
    ];
    for (amount, rate, split) in cases {
        let err = calculate(dec(amount), dec(rate), dec(split)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }
}

#[test]
fn commission_for_uses_rate_recorded_at_conversion() {
    let repo = InMemoryReferralRepository::new();
    let clock = Arc::new(ManualClock::new(0));
    let original = ReferralService::new(repo.clone(), clock.clone(), &CoreConfig::default());

    let referral = original
        .create(ReferralDraft {
            referrer_id: Some("optometrist-1".to_string()),
            receiver_id: Some("consultant-1".to_string()),
            target_department: Some(Department::Refractive),
            ..ReferralDraft::default()
        })
        .unwrap();
    original
        .mark_converted(
            referral.id,
            ConversionInput {
                deal_amount: dec("10000"),
                deal_date: 0,
                deal_owner: "consultant-1".to_string(),
                products: Vec::new(),
                discounts: Vec::new(),
                notes: None,
            },
        )
        .unwrap();

    let mut raised = CoreConfig::default();
    raised.commission.rate = dec("0.10");
    let later = ReferralService::new(repo, clock, &raised);

    let breakdown = later.commission_for(referral.id).unwrap();
    assert_eq!(breakdown.commission_rate, dec("0.05"));
    assert_eq!(breakdown.commission.total, dec("500"));
}

#[test]
fn commission_for_reports_recorded_figures_after_scale_change() {
    let repo = InMemoryReferralRepository::new();
    let clock = Arc::new(ManualClock::new(0));
    let mut whole_units = CoreConfig::default();
    whole_units.commission.currency_scale = 0;
    let original = ReferralService::new(repo.clone(), clock.clone(), &whole_units);

    let referral = original
        .create(ReferralDraft {
            referrer_id: Some("optometrist-2".to_string()),
            receiver_id: Some("consultant-3".to_string()),
            target_department: Some(Department::Orthokeratology),
            ..ReferralDraft::default()
        })
        .unwrap();
    let receipt = original
        .mark_converted(
            referral.id,
            ConversionInput {
                deal_amount: dec("1234.56"),
                deal_date: 0,
                deal_owner: "consultant-3".to_string(),
                products: Vec::new(),
                discounts: Vec::new(),
                notes: None,
            },
        )
        .unwrap();
    assert_eq!(receipt.conversion.currency_scale, 0);
    assert_eq!(receipt.commission.total, dec("62"));

    let cents = ReferralService::new(repo, clock, &CoreConfig::default());
    let breakdown = cents.commission_for(referral.id).unwrap();
    assert_eq!(breakdown.commission, receipt.commission);
    assert_eq!(breakdown.commission.referrer_commission, dec("31"));
    assert_eq!(breakdown.commission.receiver_commission, dec("31"));
    assert_eq!(breakdown.raw_total, dec("61.728"));
}

#[test]
fn commission_for_unconverted_referral_is_validation_error() {
    let service = ReferralService::new(
        InMemoryReferralRepository::new(),
        Arc::new(ManualClock::new(0)),
        &CoreConfig::default(),
    );
    let referral = service
        .create(ReferralDraft {
            referrer_id: Some("optometrist-1".to_string()),
            receiver_id: Some("consultant-1".to_string()),
            target_department: Some(Department::Other),
            ..ReferralDraft::default()
        })
        .unwrap();

    let err = service.commission_for(referral.id).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
}
