//! Task generator and tracker.
//!
//! # Responsibility
//! - Generate tasks from referral/customer events, optionally driven by a rule.
//! - Track task progress: start, postpone, complete, remark.
//! - Serve task views with query-time overdue state.
//!
//! # Invariants
//! - `completed_at` is set exactly when status becomes `completed`.
//! - Remarks are only appended.
//! - Overdue is derived on read; no write ever stores `overdue`.

use crate::clock::{check_timestamp, shift_days, Clock, MILLIS_PER_HOUR};
use crate::config::{CoreConfig, PagingConfig};
use crate::error::{CoreError, CoreResult};
use crate::eval::{FactSnapshot, RuleEvaluator};
use crate::model::page::{Page, PageQuery, PageRequest};
use crate::model::rule::{Rule, RuleAction};
use crate::model::task::{
    RemarkInput, Task, TaskDetail, TaskId, TaskPriority, TaskSource, TaskStatus, TaskType,
    TaskView,
};
use crate::repo::TaskRepository;
use crate::service::write_with_retry;
use log::{debug, info};
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

const ENTITY: &str = "task";
const DEFAULT_FOLLOW_UP_REASON: &str = "scheduled follow-up";

/// Something that happened to a referral or customer and may need follow-up.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskEvent {
    pub source: TaskSource,
    pub customer_id: String,
    pub assigned_to: String,
    /// Reference date for `remind_before` actions and dated task types,
    /// e.g. lens expiry or recall date.
    pub threshold_at: Option<i64>,
    pub notes: String,
    pub facts: FactSnapshot,
}

/// Follow-up requested while completing a task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FollowUpRequest {
    pub reason: String,
    pub priority: TaskPriority,
    pub due_in_days: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionOutcome {
    pub task: Task,
    pub follow_ups: Vec<Task>,
}

/// Conjunctive list filters. `status` is matched against the derived status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TaskFilter {
    pub status: Option<TaskStatus>,
    pub task_type: Option<TaskType>,
    pub priority: Option<TaskPriority>,
}

impl TaskFilter {
    fn matches(&self, task: &Task, now_ms: i64) -> bool {
        self.status
            .map_or(true, |status| task.effective_status(now_ms) == status)
            && self
                .task_type
                .map_or(true, |task_type| task.task_type() == task_type)
            && self
                .priority
                .map_or(true, |priority| task.priority == priority)
    }
}

pub struct TaskService<T: TaskRepository> {
    repo: T,
    clock: Arc<dyn Clock>,
    evaluator: Arc<dyn RuleEvaluator>,
    sla_ms: i64,
    paging: PagingConfig,
    max_write_attempts: u32,
}

impl<T: TaskRepository> TaskService<T> {
    pub fn new(
        repo: T,
        clock: Arc<dyn Clock>,
        evaluator: Arc<dyn RuleEvaluator>,
        config: &CoreConfig,
    ) -> Self {
        Self {
            repo,
            clock,
            evaluator,
            sla_ms: i64::from(config.tasks.default_sla_hours) * MILLIS_PER_HOUR,
            paging: config.paging.clone(),
            max_write_attempts: config.store.max_write_attempts,
        }
    }

    /// Creates the tasks an event calls for.
    ///
    /// - Without a rule: one task due after the default SLA.
    /// - With a rule: nothing when it is disabled or does not match the
    ///   event's facts, otherwise one task per rule action.
    ///
    /// All tasks are validated first and then stored in one batch, so a
    /// failure leaves none of them behind.
    pub fn create_from_event(
        &self,
        event: &TaskEvent,
        rule: Option<&Rule>,
    ) -> CoreResult<Vec<Task>> {
        let customer_id = required(&event.customer_id, "customerId")?;
        let assigned_to = required(&event.assigned_to, "assignedTo")?;
        if let Some(threshold_at) = event.threshold_at {
            check_timestamp("thresholdAt", threshold_at)?;
        }
        let now = self.clock.now_ms();

        let planned = match rule {
            None => {
                let task_type = default_task_type(&event.source);
                let detail = build_detail(task_type, event, None)?;
                let due_at = now
                    .checked_add(self.sla_ms)
                    .ok_or_else(|| CoreError::validation("task due date is out of range"))?;
                vec![(detail, TaskPriority::Medium, due_at)]
            }
            Some(rule) => {
                if !self.evaluator.matches(rule, &event.facts) {
                    debug!(
                        "event=task_generate module=task status=skipped rule_id={} enabled={}",
                        rule.id, rule.enabled
                    );
                    return Ok(Vec::new());
                }
                rule.actions
                    .iter()
                    .map(|action| {
                        let detail = build_detail(action.task_type(), event, Some(rule))?;
                        let due_at = action_due_at(action, now, event.threshold_at)?;
                        Ok((detail, action.priority(), due_at))
                    })
                    .collect::<CoreResult<Vec<_>>>()?
            }
        };

        let created: Vec<Task> = planned
            .into_iter()
            .map(|(detail, priority, due_at)| Task {
                id: Uuid::new_v4(),
                detail,
                status: TaskStatus::Pending,
                priority,
                customer_id: customer_id.clone(),
                assigned_to: assigned_to.clone(),
                source: event.source.clone(),
                rule_id: rule.map(|rule| rule.id),
                created_at: now,
                due_at,
                completed_at: None,
                notes: event.notes.clone(),
                remarks: Vec::new(),
            })
            .collect();
        self.repo.insert_tasks(&created)?;
        for task in &created {
            info!(
                "event=task_create module=task status=ok task_id={} type={} rule_id={}",
                task.id,
                task.task_type().as_str(),
                task.rule_id
                    .map_or_else(|| "none".to_string(), |id| id.to_string())
            );
        }
        Ok(created)
    }

    pub fn get(&self, id: TaskId) -> CoreResult<Task> {
        self.repo
            .load_task(id)?
            .map(|stamped| stamped.value)
            .ok_or_else(|| CoreError::not_found(ENTITY, id))
    }

    /// Task with its SLA state as of now.
    pub fn view(&self, id: TaskId) -> CoreResult<TaskView> {
        let now = self.clock.now_ms();
        self.get(id).map(|task| task.view(now))
    }

    /// Tasks assigned to `assignee`, earliest due first.
    pub fn list_for_assignee(
        &self,
        assignee: &str,
        filter: &TaskFilter,
        page: PageQuery,
    ) -> CoreResult<Page<TaskView>> {
        let assignee = required(assignee, "assignedTo")?;
        let request = PageRequest::normalize(page, &self.paging);
        let now = self.clock.now_ms();

        let mut matching: Vec<Task> = self
            .repo
            .snapshot_tasks()?
            .into_iter()
            .filter(|task| task.assigned_to == assignee && filter.matches(task, now))
            .collect();
        matching.sort_by(|a, b| a.due_at.cmp(&b.due_at).then_with(|| a.id.cmp(&b.id)));
        Ok(request.apply(matching).map(|task| task.view(now)))
    }

    /// Marks work as started.
    pub fn start(&self, id: TaskId) -> CoreResult<Task> {
        let task = self.mutate(id, |mut task| {
            match task.status {
                TaskStatus::Pending | TaskStatus::Delayed => {}
                other => {
                    return Err(CoreError::conflict(format!(
                        "task {id} is {} and cannot be started",
                        other.as_str()
                    )));
                }
            }
            task.status = TaskStatus::InProgress;
            Ok(task)
        })?;
        info!("event=task_start module=task status=ok task_id={}", id);
        Ok(task)
    }

    /// Moves the due date later and records why.
    pub fn postpone(&self, id: TaskId, new_due_at: i64, reason: RemarkInput) -> CoreResult<Task> {
        let now = self.clock.now_ms();
        check_timestamp("newDueAt", new_due_at)?;
        if new_due_at <= now {
            return Err(CoreError::validation("new due date must be in the future"));
        }
        let remark = reason.into_remark(now)?;

        let task = self.mutate(id, |mut task| {
            if task.is_completed() {
                return Err(CoreError::conflict(format!(
                    "task {id} is completed and cannot be postponed"
                )));
            }
            task.status = TaskStatus::Delayed;
            task.due_at = new_due_at;
            task.remarks.push(remark.clone());
            Ok(task)
        })?;
        info!(
            "event=task_postpone module=task status=ok task_id={} due_at={}",
            id, new_due_at
        );
        Ok(task)
    }

    /// Completes a task, optionally logging a remark and queueing follow-ups.
    ///
    /// Follow-ups are stored in the same write as the completion, for the
    /// same customer and assignee, sourced from the completed task.
    ///
    /// # Errors
    /// - `NotFound` when the id is unknown.
    /// - `Validation` for an empty remark or a follow-up without reason.
    /// - `Conflict` when the task is already completed.
    pub fn complete(
        &self,
        id: TaskId,
        remark: Option<RemarkInput>,
        next_actions: Vec<FollowUpRequest>,
    ) -> CoreResult<CompletionOutcome> {
        let now = self.clock.now_ms();
        let remark = remark.map(|input| input.into_remark(now)).transpose()?;
        let planned = next_actions
            .into_iter()
            .enumerate()
            .map(|(index, action)| {
                let reason = action.reason.trim().to_string();
                if reason.is_empty() {
                    return Err(CoreError::validation(format!(
                        "nextActions[{index}].reason is required"
                    )));
                }
                Ok(PlannedFollowUp {
                    id: Uuid::new_v4(),
                    reason,
                    priority: action.priority,
                    due_at: shift_days(
                        &format!("nextActions[{index}].dueInDays"),
                        now,
                        i64::from(action.due_in_days),
                    )?,
                })
            })
            .collect::<CoreResult<Vec<_>>>()?;

        let task = write_with_retry(
            ENTITY,
            id,
            self.max_write_attempts,
            || self.repo.load_task(id),
            |mut task| {
                if task.is_completed() {
                    return Err(CoreError::conflict(format!("task {id} is already completed")));
                }
                task.status = TaskStatus::Completed;
                task.completed_at = Some(now);
                if let Some(remark) = &remark {
                    task.remarks.push(remark.clone());
                }
                Ok(task)
            },
            |revision, task| {
                let follow_ups = follow_up_tasks(task, &planned, now);
                self.repo.commit_completion(revision, task, &follow_ups)
            },
        )?;
        let follow_ups = follow_up_tasks(&task, &planned, now);
        info!(
            "event=task_complete module=task status=ok task_id={} follow_ups={}",
            id,
            follow_ups.len()
        );

        Ok(CompletionOutcome { task, follow_ups })
    }

    /// Appends one remark to the task's log.
    pub fn add_remark(&self, id: TaskId, remark: RemarkInput) -> CoreResult<Task> {
        let remark = remark.into_remark(self.clock.now_ms())?;
        let task = self.mutate(id, |mut task| {
            task.remarks.push(remark.clone());
            Ok(task)
        })?;
        info!(
            "event=task_remark module=task status=ok task_id={} remarks={}",
            id,
            task.remarks.len()
        );
        Ok(task)
    }

    fn mutate(&self, id: TaskId, change: impl FnMut(Task) -> CoreResult<Task>) -> CoreResult<Task> {
        write_with_retry(
            ENTITY,
            id,
            self.max_write_attempts,
            || self.repo.load_task(id),
            change,
            |revision, task| self.repo.swap_task(revision, task),
        )
    }
}

/// Follow-up validated before the completion write; its id is fixed so
/// every retry of the write stores the same rows.
struct PlannedFollowUp {
    id: TaskId,
    reason: String,
    priority: TaskPriority,
    due_at: i64,
}

fn follow_up_tasks(completed: &Task, planned: &[PlannedFollowUp], now: i64) -> Vec<Task> {
    planned
        .iter()
        .map(|plan| Task {
            id: plan.id,
            detail: TaskDetail::FollowUp {
                reason: plan.reason.clone(),
            },
            status: TaskStatus::Pending,
            priority: plan.priority,
            customer_id: completed.customer_id.clone(),
            assigned_to: completed.assigned_to.clone(),
            source: TaskSource::Task(completed.id),
            rule_id: None,
            created_at: now,
            due_at: plan.due_at,
            completed_at: None,
            notes: String::new(),
            remarks: Vec::new(),
        })
        .collect()
}

fn default_task_type(source: &TaskSource) -> TaskType {
    match source {
        TaskSource::Referral(_) => TaskType::Referral,
        TaskSource::Customer(_) | TaskSource::Task(_) => TaskType::FollowUp,
    }
}

fn build_detail(
    task_type: TaskType,
    event: &TaskEvent,
    rule: Option<&Rule>,
) -> CoreResult<TaskDetail> {
    let threshold = || {
        event.threshold_at.ok_or_else(|| {
            CoreError::validation(format!(
                "{} task requires the event threshold date",
                task_type.as_str()
            ))
        })
    };
    match task_type {
        TaskType::LensReplacement => Ok(TaskDetail::LensReplacement {
            lens_expires_at: threshold()?,
        }),
        TaskType::Recall => Ok(TaskDetail::Recall {
            recall_due_at: threshold()?,
        }),
        TaskType::Referral => match &event.source {
            TaskSource::Referral(referral_id) => Ok(TaskDetail::Referral {
                referral_id: *referral_id,
            }),
            _ => Err(CoreError::validation(
                "referral task requires a referral event source",
            )),
        },
        TaskType::FollowUp => {
            let reason = match rule {
                Some(rule) => rule.name.clone(),
                None if !event.notes.trim().is_empty() => event.notes.trim().to_string(),
                None => DEFAULT_FOLLOW_UP_REASON.to_string(),
            };
            Ok(TaskDetail::FollowUp { reason })
        }
    }
}

fn action_due_at(action: &RuleAction, now: i64, threshold_at: Option<i64>) -> CoreResult<i64> {
    match action {
        RuleAction::CreateTask { due_in_days, .. } => {
            shift_days("dueInDays", now, i64::from(*due_in_days))
        }
        RuleAction::RemindBefore { days_before, .. } => {
            let threshold = threshold_at.ok_or_else(|| {
                CoreError::validation("remind_before action requires the event threshold date")
            })?;
            shift_days("daysBefore", threshold, -i64::from(*days_before))
        }
    }
}

fn required(value: &str, field: &str) -> CoreResult<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(CoreError::validation(format!("{field} is required")));
    }
    Ok(trimmed.to_string())
}
