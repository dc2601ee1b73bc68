use clinicrm_core::Clock;
use clinicrm_core::clock::{MILLIS_PER_DAY, MILLIS_PER_HOUR};
use clinicrm_core::sample::sample_as_of;
use clinicrm_core::{
    AnalyticsQuery, AnalyticsService, ConditionEvaluator, ConversionInput, CoreConfig, Department,
    FactSnapshot, InMemoryReferralRepository, InMemoryTaskRepository, ManualClock, ReferralDraft,
    ReferralRepository, ReferralService, ReferralStatus, SampleGenerator, TaskEvent, TaskService, TaskSource,
};
use rust_decimal::Decimal;
use std::str::FromStr;
use std::sync::Arc;

const DAY: i64 = MILLIS_PER_DAY;

struct Fixture {
    clock: Arc<ManualClock>,
    ledger: ReferralService<InMemoryReferralRepository>,
    tracker: TaskService<InMemoryTaskRepository>,
    analytics: AnalyticsService<InMemoryReferralRepository, InMemoryTaskRepository>,
}

fn fixture() -> Fixture {
    let config = CoreConfig::default();
    let clock = Arc::new(ManualClock::new(0));
    let referrals = InMemoryReferralRepository::new();
    let tasks = InMemoryTaskRepository::new();
    Fixture {
        ledger: ReferralService::new(referrals.clone(), clock.clone(), &config),
        tracker: TaskService::new(
            tasks.clone(),
            clock.clone(),
            Arc::new(ConditionEvaluator),
            &config,
        ),
        analytics: AnalyticsService::new(referrals, tasks, &config),
        clock,
    }
}

fn refer(fixture: &Fixture, referrer: &str, receiver: &str, department: Department) -> uuid::Uuid {
    fixture
        .ledger
        .create(ReferralDraft {
            referrer_id: Some(referrer.to_string()),
            receiver_id: Some(receiver.to_string()),
            target_department: Some(department),
            ..ReferralDraft::default()
        })
        .unwrap()
        .id
}

fn convert(fixture: &Fixture, id: uuid::Uuid, amount: i64) {
    fixture
        .ledger
        .mark_converted(
            id,
            ConversionInput {
                deal_amount: Decimal::from(amount),
                deal_date: fixture.clock.now_ms(),
                deal_owner: "consultant-1".to_string(),
                products: Vec::new(),
                discounts: Vec::new(),
                notes: None,
            },
        )
        .unwrap();
}

fn query(as_of: i64, user_id: Option<&str>) -> AnalyticsQuery {
    AnalyticsQuery {
        window_start: 0,
        window_end: 100 * DAY,
        department: None,
        user_id: user_id.map(str::to_string),
        as_of,
    }
}

fn dec(value: &str) -> Decimal {
    Decimal::from_str(value).unwrap()
}

#[test]
fn empty_ledger_has_zero_conversion_rate() {
    let fixture = fixture();
    let stats = fixture.analytics.team_stats(0, DAY, None, DAY).unwrap();
    assert_eq!(stats.total_referrals, 0);
    assert_eq!(stats.conversion_rate, 0.0);
    assert_eq!(stats.commission.total, Decimal::ZERO);
    assert_eq!(stats.commission.estimated, Decimal::ZERO);
    assert_eq!(stats.tasks.completion_rate, 0.0);
    assert!(stats.by_department.is_empty());
}

#[test]
fn team_rollup_counts_statuses_and_commission() {
    let fixture = fixture();
    let first = refer(&fixture, "optometrist-1", "consultant-1", Department::Orthokeratology);
    convert(&fixture, first, 28_000);

    fixture.clock.set(40 * DAY);
    let second = refer(&fixture, "optometrist-2", "consultant-1", Department::Refractive);
    convert(&fixture, second, 10_000);
    refer(&fixture, "optometrist-1", "consultant-2", Department::Orthokeratology);
    let declined = refer(&fixture, "optometrist-2", "consultant-2", Department::Other);
    fixture
        .ledger
        .update_status(declined, ReferralStatus::Declined, None)
        .unwrap();

    let stats = fixture.analytics.stats(&query(50 * DAY, None)).unwrap();
    assert_eq!(stats.total_referrals, 4);
    assert_eq!(stats.converted_referrals, 2);
    assert_eq!(stats.pending_referrals, 1);
    assert_eq!(stats.declined_referrals, 1);
    assert_eq!(stats.conversion_rate, 50.0);

    assert_eq!(stats.commission.total, dec("1900"));
    assert_eq!(stats.commission.confirmed, dec("1400"));
    assert_eq!(stats.commission.pending, dec("500"));
    assert_eq!(stats.commission.estimated, dec("950"));

    let ortho = stats
        .by_department
        .iter()
        .find(|row| row.key == "orthokeratology")
        .unwrap();
    assert_eq!(ortho.total_referrals, 2);
    assert_eq!(ortho.converted_referrals, 1);
    assert_eq!(ortho.conversion_rate, 50.0);
    assert_eq!(ortho.commission, dec("1400"));

    let consultant = stats
        .by_user
        .iter()
        .find(|row| row.key == "consultant-1")
        .unwrap();
    assert_eq!(consultant.total_referrals, 2);
    assert_eq!(consultant.commission, dec("950"));
}

#[test]
fn personal_stats_count_only_the_users_share() {
    let fixture = fixture();
    let first = refer(&fixture, "optometrist-1", "consultant-1", Department::Orthokeratology);
    convert(&fixture, first, 28_000);
    refer(&fixture, "optometrist-2", "consultant-2", Department::Refractive);

    let stats = fixture
        .analytics
        .stats(&query(60 * DAY, Some("optometrist-1")))
        .unwrap();
    assert_eq!(stats.total_referrals, 1);
    assert_eq!(stats.conversion_rate, 100.0);
    assert_eq!(stats.commission.total, dec("700"));
    assert_eq!(stats.commission.confirmed, dec("700"));
    assert_eq!(stats.by_user.len(), 1);
    assert_eq!(stats.by_user[0].key, "optometrist-1");
}

#[test]
fn department_filter_and_window_bound_the_rollup() {
    let fixture = fixture();
    refer(&fixture, "optometrist-1", "consultant-1", Department::Refractive);
    fixture.clock.set(10 * DAY);
    refer(&fixture, "optometrist-1", "consultant-1", Department::Orthokeratology);

    let stats = fixture
        .analytics
        .team_stats(0, 100 * DAY, Some(Department::Refractive), 100 * DAY)
        .unwrap();
    assert_eq!(stats.total_referrals, 1);

    let stats = fixture.analytics.team_stats(DAY, 100 * DAY, None, 100 * DAY).unwrap();
    assert_eq!(stats.total_referrals, 1);
    assert_eq!(stats.by_department[0].key, "orthokeratology");
}

#[test]
fn task_summary_reports_overdue_at_as_of() {
    let fixture = fixture();
    let event = TaskEvent {
        source: TaskSource::Customer("customer-1".to_string()),
        customer_id: "customer-1".to_string(),
        assigned_to: "optician-1".to_string(),
        threshold_at: None,
        notes: String::new(),
        facts: FactSnapshot::default(),
    };
    let done = fixture.tracker.create_from_event(&event, None).unwrap().remove(0);
    fixture.tracker.create_from_event(&event, None).unwrap();
    fixture.tracker.complete(done.id, None, Vec::new()).unwrap();

    let before_due = fixture.analytics.stats(&query(MILLIS_PER_HOUR, None)).unwrap();
    assert_eq!(before_due.tasks.total, 2);
    assert_eq!(before_due.tasks.completed, 1);
    assert_eq!(before_due.tasks.overdue, 0);
    assert_eq!(before_due.tasks.completion_rate, 50.0);

    let after_due = fixture.analytics.stats(&query(3 * DAY, None)).unwrap();
    assert_eq!(after_due.tasks.overdue, 1);
}

#[test]
fn inverted_window_is_validation_error() {
    let fixture = fixture();
    let err = fixture.analytics.team_stats(DAY, 0, None, DAY).unwrap_err();
    assert_eq!(err.kind(), clinicrm_core::ErrorKind::Validation);
}

#[test]
fn same_seed_reproduces_statistics() {
    let config = CoreConfig::default();
    let run = |seed: u64| {
        let world = SampleGenerator::new(seed).generate(&config, 40).unwrap();
        let analytics = AnalyticsService::new(world.referrals.clone(), world.tasks.clone(), &config);
        analytics
            .team_stats(
                world.window_start,
                world.window_end,
                None,
                sample_as_of(&world, &config),
            )
            .unwrap()
    };

    let first = run(7);
    let second = run(7);
    assert_eq!(first, second);
    assert_eq!(first.total_referrals, 40);
    assert_eq!(
        first.commission.total,
        first.commission.confirmed + first.commission.pending
    );
}

#[test]
fn extreme_stored_deal_date_does_not_break_rollup() {
    let config = CoreConfig::default();
    let referrals = InMemoryReferralRepository::new();
    let ledger = ReferralService::new(referrals.clone(), Arc::new(ManualClock::new(0)), &config);
    let id = ledger
        .create(ReferralDraft {
            referrer_id: Some("optometrist-1".to_string()),
            receiver_id: Some("consultant-1".to_string()),
            target_department: Some(Department::Refractive),
            ..ReferralDraft::default()
        })
        .unwrap()
        .id;
    ledger
        .mark_converted(
            id,
            ConversionInput {
                deal_amount: Decimal::from(10_000),
                deal_date: 0,
                deal_owner: "consultant-1".to_string(),
                products: Vec::new(),
                discounts: Vec::new(),
                notes: None,
            },
        )
        .unwrap();

    // Rows written before deal dates were bounded.
    let stored = referrals.load_referral(id).unwrap().unwrap();
    let mut legacy = stored.value;
    if let Some(conversion) = legacy.conversion.as_mut() {
        conversion.deal_date = i64::MIN;
    }
    referrals.swap_referral(stored.revision, &legacy).unwrap();

    let analytics = AnalyticsService::new(referrals, InMemoryTaskRepository::new(), &config);
    let stats = analytics.stats(&query(i64::MAX, None)).unwrap();
    assert_eq!(stats.commission.total, dec("500"));
    assert_eq!(stats.commission.confirmed, dec("500"));
    assert_eq!(stats.commission.pending, Decimal::ZERO);
}
