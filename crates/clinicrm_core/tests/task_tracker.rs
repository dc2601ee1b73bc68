use clinicrm_core::Clock;
use clinicrm_core::clock::{MILLIS_PER_DAY, MILLIS_PER_HOUR};
use clinicrm_core::{
    ConditionEvaluator, ConditionOperator, CoreConfig, ErrorKind, FactSnapshot, FollowUpRequest,
    InMemoryTaskRepository, ManualClock, PageQuery, RemarkInput, Rule, RuleAction, RuleCondition,
    RuleDraft, TaskDetail, TaskEvent, TaskFilter, TaskPriority, TaskService, TaskSource,
    TaskStatus, TaskType,
};
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

const START: i64 = 1_000 * MILLIS_PER_DAY;

fn tracker() -> (TaskService<InMemoryTaskRepository>, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new(START));
    let service = TaskService::new(
        InMemoryTaskRepository::new(),
        clock.clone(),
        Arc::new(ConditionEvaluator),
        &CoreConfig::default(),
    );
    (service, clock)
}

fn customer_event(assignee: &str) -> TaskEvent {
    TaskEvent {
        source: TaskSource::Customer("customer-9".to_string()),
        customer_id: "customer-9".to_string(),
        assigned_to: assignee.to_string(),
        threshold_at: None,
        notes: "check comfort after fitting".to_string(),
        facts: FactSnapshot::default(),
    }
}

fn lens_rule(enabled: bool) -> Rule {
    RuleDraft {
        name: "lens expiry reminder".to_string(),
        conditions: vec![RuleCondition::new(
            "lens.days_until_expiry",
            ConditionOperator::Lte,
            json!(30),
        )],
        actions: vec![
            RuleAction::RemindBefore {
                task_type: TaskType::LensReplacement,
                priority: TaskPriority::High,
                days_before: 7,
            },
            RuleAction::CreateTask {
                task_type: TaskType::FollowUp,
                priority: TaskPriority::Low,
                due_in_days: 1,
            },
        ],
        enabled,
    }
    .into_rule(0)
    .unwrap()
}

#[test]
fn event_without_rule_uses_default_sla() {
    let (service, _) = tracker();
    let created = service
        .create_from_event(&customer_event("optician-1"), None)
        .unwrap();
    assert_eq!(created.len(), 1);

    let task = &created[0];
    assert_eq!(task.status, TaskStatus::Pending);
    assert_eq!(task.task_type(), TaskType::FollowUp);
    assert_eq!(task.due_at, START + 48 * MILLIS_PER_HOUR);
    assert_eq!(task.completed_at, None);
    assert_eq!(task.rule_id, None);
    assert_eq!(
        task.detail,
        TaskDetail::FollowUp {
            reason: "check comfort after fitting".to_string()
        }
    );
}

#[test]
fn referral_event_creates_referral_task() {
    let (service, _) = tracker();
    let referral_id = Uuid::new_v4();
    let mut event = customer_event("consultant-1");
    event.source = TaskSource::Referral(referral_id);

    let created = service.create_from_event(&event, None).unwrap();
    assert_eq!(created[0].detail, TaskDetail::Referral { referral_id });
}

#[test]
fn matching_rule_creates_one_task_per_action() {
    let (service, _) = tracker();
    let rule = lens_rule(true);
    let expires_at = START + 20 * MILLIS_PER_DAY;
    let mut event = customer_event("optician-1");
    event.threshold_at = Some(expires_at);
    event.facts = FactSnapshot::new(json!({"lens": {"days_until_expiry": 20}}));

    let created = service.create_from_event(&event, Some(&rule)).unwrap();
    assert_eq!(created.len(), 2);

    let reminder = &created[0];
    assert_eq!(
        reminder.detail,
        TaskDetail::LensReplacement {
            lens_expires_at: expires_at
        }
    );
    assert_eq!(reminder.priority, TaskPriority::High);
    assert_eq!(reminder.due_at, expires_at - 7 * MILLIS_PER_DAY);
    assert_eq!(reminder.rule_id, Some(rule.id));

    let follow_up = &created[1];
    assert_eq!(follow_up.task_type(), TaskType::FollowUp);
    assert_eq!(follow_up.due_at, START + MILLIS_PER_DAY);
}

#[test]
fn disabled_or_unmatched_rule_creates_nothing() {
    let (service, _) = tracker();
    let mut event = customer_event("optician-1");
    event.threshold_at = Some(START);
    event.facts = FactSnapshot::new(json!({"lens": {"days_until_expiry": 90}}));

    assert!(service
        .create_from_event(&event, Some(&lens_rule(true)))
        .unwrap()
        .is_empty());

    event.facts = FactSnapshot::new(json!({"lens": {"days_until_expiry": 5}}));
    assert!(service
        .create_from_event(&event, Some(&lens_rule(false)))
        .unwrap()
        .is_empty());
}

#[test]
fn remind_before_without_threshold_is_validation_error() {
    let (service, _) = tracker();
    let mut event = customer_event("optician-1");
    event.facts = FactSnapshot::new(json!({"lens": {"days_until_expiry": 5}}));

    let err = service
        .create_from_event(&event, Some(&lens_rule(true)))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);

    let page = service
        .list_for_assignee("optician-1", &TaskFilter::default(), PageQuery::default())
        .unwrap();
    assert_eq!(page.total, 0);
}

#[test]
fn out_of_range_threshold_is_rejected_before_any_task_is_stored() {
    let (service, _) = tracker();
    let mut event = customer_event("optician-1");
    event.facts = FactSnapshot::new(json!({"lens": {"days_until_expiry": 5}}));

    for threshold_at in [i64::MIN, -1, i64::MAX] {
        event.threshold_at = Some(threshold_at);
        let err = service
            .create_from_event(&event, Some(&lens_rule(true)))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert!(err.to_string().contains("thresholdAt"));
    }

    let page = service
        .list_for_assignee("optician-1", &TaskFilter::default(), PageQuery::default())
        .unwrap();
    assert_eq!(page.total, 0);
}

#[test]
fn overdue_is_derived_at_read_time() {
    let (service, clock) = tracker();
    let task = service
        .create_from_event(&customer_event("optician-1"), None)
        .unwrap()
        .remove(0);

    let view = service.view(task.id).unwrap();
    assert_eq!(view.effective_status, TaskStatus::Pending);
    assert_eq!(view.overdue_hours, None);

    clock.advance(48 * MILLIS_PER_HOUR + 90 * 60 * 1000);
    let view = service.view(task.id).unwrap();
    assert_eq!(view.effective_status, TaskStatus::Overdue);
    assert_eq!(view.overdue_hours, Some(1.5));
    assert_eq!(view.task.status, TaskStatus::Pending);

    let completed = service.complete(task.id, None, Vec::new()).unwrap();
    assert_eq!(completed.task.status, TaskStatus::Completed);
    assert_eq!(completed.task.completed_at, Some(clock.now_ms()));

    clock.advance(100 * MILLIS_PER_DAY);
    let view = service.view(task.id).unwrap();
    assert_eq!(view.effective_status, TaskStatus::Completed);
    assert_eq!(view.overdue_hours, None);
}

#[test]
fn complete_appends_remark_and_creates_follow_ups() {
    let (service, _) = tracker();
    let task = service
        .create_from_event(&customer_event("optician-1"), None)
        .unwrap()
        .remove(0);

    let outcome = service
        .complete(
            task.id,
            Some(RemarkInput::new("patient happy with lenses", "optician-1")),
            vec![FollowUpRequest {
                reason: "six month check".to_string(),
                priority: TaskPriority::Low,
                due_in_days: 180,
            }],
        )
        .unwrap();

    assert_eq!(outcome.task.remarks.len(), 1);
    assert_eq!(outcome.task.remarks[0].content, "patient happy with lenses");
    assert_eq!(outcome.follow_ups.len(), 1);
    let follow_up = &outcome.follow_ups[0];
    assert_eq!(follow_up.source, TaskSource::Task(task.id));
    assert_eq!(follow_up.assigned_to, "optician-1");
    assert_eq!(follow_up.customer_id, "customer-9");
    assert_eq!(follow_up.due_at, START + 180 * MILLIS_PER_DAY);

    let err = service.complete(task.id, None, Vec::new()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conflict);
    assert_eq!(service.get(task.id).unwrap().remarks.len(), 1);
}

#[test]
fn completing_unknown_task_is_not_found() {
    let (service, _) = tracker();
    let err = service
        .complete(
            Uuid::new_v4(),
            Some(RemarkInput::new("done", "optician-1")),
            vec![FollowUpRequest {
                reason: "recheck".to_string(),
                priority: TaskPriority::Medium,
                due_in_days: 7,
            }],
        )
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);

    let page = service
        .list_for_assignee("optician-1", &TaskFilter::default(), PageQuery::default())
        .unwrap();
    assert_eq!(page.total, 0);
}

#[test]
fn remarks_are_append_only_and_validated() {
    let (service, clock) = tracker();
    let task = service
        .create_from_event(&customer_event("optician-1"), None)
        .unwrap()
        .remove(0);

    service
        .add_remark(task.id, RemarkInput::new("called, no answer", "optician-1"))
        .unwrap();
    clock.advance(1_000);
    let updated = service
        .add_remark(task.id, RemarkInput::new("left voicemail", "optician-1"))
        .unwrap();
    let contents: Vec<&str> = updated
        .remarks
        .iter()
        .map(|remark| remark.content.as_str())
        .collect();
    assert_eq!(contents, vec!["called, no answer", "left voicemail"]);
    assert_eq!(updated.remarks[1].created_at, START + 1_000);

    let err = service
        .add_remark(task.id, RemarkInput::new("   ", "optician-1"))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);

    let err = service
        .add_remark(Uuid::new_v4(), RemarkInput::new("hello", "optician-1"))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[test]
fn start_and_postpone_track_progress() {
    let (service, _) = tracker();
    let task = service
        .create_from_event(&customer_event("optician-1"), None)
        .unwrap()
        .remove(0);

    let postponed = service
        .postpone(
            task.id,
            START + 5 * MILLIS_PER_DAY,
            RemarkInput::new("customer travelling", "optician-1"),
        )
        .unwrap();
    assert_eq!(postponed.status, TaskStatus::Delayed);
    assert_eq!(postponed.due_at, START + 5 * MILLIS_PER_DAY);
    assert_eq!(postponed.remarks.len(), 1);

    let started = service.start(task.id).unwrap();
    assert_eq!(started.status, TaskStatus::InProgress);
    assert_eq!(service.start(task.id).unwrap_err().kind(), ErrorKind::Conflict);

    let err = service
        .postpone(task.id, START - 1, RemarkInput::new("oops", "optician-1"))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);

    let err = service
        .postpone(task.id, i64::MAX, RemarkInput::new("someday", "optician-1"))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
}

#[test]
fn list_for_assignee_orders_by_due_date_and_filters_derived_status() {
    let (service, clock) = tracker();
    let late = service
        .create_from_event(&customer_event("optician-1"), None)
        .unwrap()
        .remove(0);
    let soon = service
        .postpone(
            service
                .create_from_event(&customer_event("optician-1"), None)
                .unwrap()
                .remove(0)
                .id,
            START + MILLIS_PER_HOUR,
            RemarkInput::new("pulled forward", "optician-1"),
        )
        .unwrap();
    service
        .create_from_event(&customer_event("optician-2"), None)
        .unwrap();

    let page = service
        .list_for_assignee("optician-1", &TaskFilter::default(), PageQuery::default())
        .unwrap();
    assert_eq!(page.total, 2);
    assert_eq!(page.items[0].task.id, soon.id);
    assert_eq!(page.items[1].task.id, late.id);

    clock.advance(2 * MILLIS_PER_HOUR);
    let overdue = service
        .list_for_assignee(
            "optician-1",
            &TaskFilter {
                status: Some(TaskStatus::Overdue),
                ..TaskFilter::default()
            },
            PageQuery::default(),
        )
        .unwrap();
    assert_eq!(overdue.total, 1);
    assert_eq!(overdue.items[0].task.id, soon.id);
    assert_eq!(overdue.items[0].overdue_hours, Some(1.0));
}
