//! Follow-up task records.
//!
//! # Responsibility
//! - Define tasks as tagged variants so per-type fields are required.
//! - Derive SLA/overdue state at read time.
//!
//! # Invariants
//! - `completed_at.is_some()` if and only if `status == Completed`.
//! - `remarks` is append-only.
//! - `Overdue` is never persisted; it is derived against a query-time "now".

use crate::clock::MILLIS_PER_HOUR;
use crate::error::{CoreError, CoreResult};
use crate::model::referral::ReferralId;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub type TaskId = Uuid;
pub type RemarkId = Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    LensReplacement,
    FollowUp,
    Recall,
    Referral,
}

impl TaskType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::LensReplacement => "lens_replacement",
            Self::FollowUp => "follow_up",
            Self::Recall => "recall",
            Self::Referral => "referral",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim() {
            "lens_replacement" => Some(Self::LensReplacement),
            "follow_up" => Some(Self::FollowUp),
            "recall" => Some(Self::Recall),
            "referral" => Some(Self::Referral),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    InProgress,
    Completed,
    Overdue,
    Delayed,
}

impl TaskStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Overdue => "overdue",
            Self::Delayed => "delayed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim() {
            "pending" => Some(Self::Pending),
            "in_progress" => Some(Self::InProgress),
            "completed" => Some(Self::Completed),
            "overdue" => Some(Self::Overdue),
            "delayed" => Some(Self::Delayed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskPriority {
    High,
    Medium,
    Low,
}

impl TaskPriority {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim() {
            "high" => Some(Self::High),
            "medium" => Some(Self::Medium),
            "low" => Some(Self::Low),
            _ => None,
        }
    }
}

/// Per-type payload. Each variant carries the fields its type cannot do without.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TaskDetail {
    LensReplacement {
        #[serde(rename = "lensExpiresAt")]
        lens_expires_at: i64,
    },
    FollowUp {
        reason: String,
    },
    Recall {
        #[serde(rename = "recallDueAt")]
        recall_due_at: i64,
    },
    Referral {
        #[serde(rename = "referralId")]
        referral_id: ReferralId,
    },
}

impl TaskDetail {
    pub fn task_type(&self) -> TaskType {
        match self {
            Self::LensReplacement { .. } => TaskType::LensReplacement,
            Self::FollowUp { .. } => TaskType::FollowUp,
            Self::Recall { .. } => TaskType::Recall,
            Self::Referral { .. } => TaskType::Referral,
        }
    }
}

/// Event origin a task was generated from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "sourceType", content = "sourceId", rename_all = "snake_case")]
pub enum TaskSource {
    Referral(ReferralId),
    Customer(String),
    Task(TaskId),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskRemark {
    pub id: RemarkId,
    pub content: String,
    pub author: String,
    pub created_at: i64,
}

/// Caller input for one remark.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemarkInput {
    pub content: String,
    pub author: String,
}

impl RemarkInput {
    pub fn new(content: impl Into<String>, author: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            author: author.into(),
        }
    }

    pub(crate) fn into_remark(self, now_ms: i64) -> CoreResult<TaskRemark> {
        let content = self.content.trim().to_string();
        if content.is_empty() {
            return Err(CoreError::validation("remark content must not be empty"));
        }
        let author = self.author.trim().to_string();
        if author.is_empty() {
            return Err(CoreError::validation("remark author is required"));
        }
        Ok(TaskRemark {
            id: Uuid::new_v4(),
            content,
            author,
            created_at: now_ms,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: TaskId,
    #[serde(flatten)]
    pub detail: TaskDetail,
    pub status: TaskStatus,
    pub priority: TaskPriority,
    pub customer_id: String,
    pub assigned_to: String,
    pub source: TaskSource,
    pub rule_id: Option<Uuid>,
    pub created_at: i64,
    pub due_at: i64,
    pub completed_at: Option<i64>,
    pub notes: String,
    pub remarks: Vec<TaskRemark>,
}

impl Task {
    pub fn task_type(&self) -> TaskType {
        self.detail.task_type()
    }

    pub fn is_completed(&self) -> bool {
        self.status == TaskStatus::Completed
    }

    /// Status as observed at `now_ms`: open tasks past due read as `Overdue`.
    pub fn effective_status(&self, now_ms: i64) -> TaskStatus {
        if !self.is_completed() && self.due_at < now_ms {
            TaskStatus::Overdue
        } else {
            self.status
        }
    }

    /// Hours past due at `now_ms`, rounded to two decimals; `None` unless overdue.
    pub fn overdue_hours(&self, now_ms: i64) -> Option<f64> {
        if self.effective_status(now_ms) != TaskStatus::Overdue {
            return None;
        }
        let hours = now_ms.saturating_sub(self.due_at) as f64 / MILLIS_PER_HOUR as f64;
        Some((hours * 100.0).round() / 100.0)
    }

    pub fn view(self, now_ms: i64) -> TaskView {
        TaskView {
            effective_status: self.effective_status(now_ms),
            overdue_hours: self.overdue_hours(now_ms),
            task: self,
        }
    }
}

/// Read model pairing a stored task with its query-time SLA state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskView {
    pub task: Task,
    pub effective_status: TaskStatus,
    pub overdue_hours: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::{Task, TaskDetail, TaskPriority, TaskSource, TaskStatus, TaskType};
    use crate::clock::MILLIS_PER_HOUR;
    use uuid::Uuid;

    fn task(due_at: i64) -> Task {
        Task {
            id: Uuid::new_v4(),
            detail: TaskDetail::FollowUp {
                reason: "post-fitting check".to_string(),
            },
            status: TaskStatus::Pending,
            priority: TaskPriority::Medium,
            customer_id: "customer-1".to_string(),
            assigned_to: "staff-1".to_string(),
            source: TaskSource::Customer("customer-1".to_string()),
            rule_id: None,
            created_at: 0,
            due_at,
            completed_at: None,
            notes: String::new(),
            remarks: Vec::new(),
        }
    }

    #[test]
    fn open_task_past_due_reads_overdue() {
        let task = task(0);
        let now = 3 * MILLIS_PER_HOUR + MILLIS_PER_HOUR / 2;
        assert_eq!(task.effective_status(now), TaskStatus::Overdue);
        assert_eq!(task.overdue_hours(now), Some(3.5));
    }

    #[test]
    fn completed_task_is_never_overdue() {
        let mut task = task(0);
        task.status = TaskStatus::Completed;
        task.completed_at = Some(1);
        assert_eq!(task.effective_status(i64::MAX), TaskStatus::Completed);
        assert_eq!(task.overdue_hours(i64::MAX), None);
    }

    #[test]
    fn overdue_hours_saturate_for_extreme_due_dates() {
        let task = task(i64::MIN);
        let hours = task.overdue_hours(i64::MAX).expect("task is overdue");
        assert!(hours.is_finite());
        assert!(hours > 0.0);
    }

    #[test]
    fn detail_flattens_type_tag() {
        let value = serde_json::to_value(task(5)).expect("serialize task");
        assert_eq!(value["type"], "follow_up");
        assert_eq!(value["reason"], "post-fitting check");
        assert_eq!(value["source"]["sourceType"], "customer");
        assert_eq!(TaskType::parse("follow_up"), Some(TaskType::FollowUp));
    }
}
