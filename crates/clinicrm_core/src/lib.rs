//! Core domain logic for the clinic CRM engine.
//! This crate is the single source of truth for referral, commission, rule
//! and task invariants.

pub mod clock;
pub mod config;
pub mod error;
pub mod eval;
pub mod logging;
pub mod model;
pub mod repo;
pub mod sample;
pub mod service;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{ConfigError, CoreConfig};
pub use error::{CoreError, CoreResult, ErrorKind};
pub use eval::{ConditionEvaluator, FactSnapshot, RuleEvaluator};
pub use logging::{default_log_level, init_from_config, init_logging, logging_status};
pub use model::page::{Page, PageQuery};
pub use model::referral::{
    Commission, Conversion, ConversionInput, Department, DiscountLine, ProductLine, Referral,
    ReferralDraft, ReferralId, ReferralStatus,
};
pub use model::rule::{
    ConditionOperator, FieldChange, Rule, RuleAction, RuleCondition, RuleDraft, RuleId,
    RulePatch, RuleVersion,
};
pub use model::task::{
    RemarkInput, Task, TaskDetail, TaskId, TaskPriority, TaskRemark, TaskSource, TaskStatus,
    TaskType, TaskView,
};
pub use repo::{
    InMemoryReferralRepository, InMemoryRuleRepository, InMemoryTaskRepository, RepoError,
    RepoResult, ReferralRepository, RuleRepository, TaskRepository,
};
pub use sample::SampleGenerator;
pub use service::analytics_service::{AnalyticsQuery, AnalyticsService, CommissionStats};
pub use service::commission::{calculate, calculate_detailed, CommissionBreakdown, CommissionPolicy};
pub use service::referral_service::{ConversionReceipt, ReferralFilter, ReferralService};
pub use service::rule_service::RuleService;
pub use service::task_service::{
    CompletionOutcome, FollowUpRequest, TaskEvent, TaskFilter, TaskService,
};

/// Minimal health-check API for early integration.
pub fn ping() -> &'static str {
    "pong"
}

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
