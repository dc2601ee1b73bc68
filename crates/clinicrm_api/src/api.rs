//! Use-case API for transport-facing callers.
//!
//! # Responsibility
//! - Expose stable, use-case-level operations over the core services.
//! - Map core failures onto a transport-neutral envelope with status codes.
//!
//! # Invariants
//! - Operations never panic; every outcome is an `ApiResponse`.
//! - `dispatch_json` always returns a UTF-8 JSON envelope, even for
//!   malformed input or unknown operations.

use crate::dto::{
    AddRemarkRequest, ApiResponse, CalculateCommissionRequest, CommissionCalculation,
    CommissionStatsRequest, CompleteTaskRequest, CreateReferralRequest, CreateRuleRequest,
    GetByIdRequest, HistoryEntry, ListReferralsRequest, ListTasksRequest, MarkConvertedRequest,
    NextActionPayload, PagingParams, RemarkPayload, RuleHistoryRequest, RuleHistoryResponse,
    TaskEventRequest, UpdateRuleRequest, UpdateStatusRequest,
};
use clinicrm_core::service::task_service::CompletionOutcome;
use clinicrm_core::{
    calculate_detailed, AnalyticsQuery, AnalyticsService, Clock, CommissionStats,
    ConditionEvaluator, ConversionInput, ConversionReceipt, CoreConfig, CoreError, CoreResult,
    Department, ErrorKind, FactSnapshot, FollowUpRequest, InMemoryReferralRepository,
    InMemoryRuleRepository, InMemoryTaskRepository, Page, PageQuery, Referral, ReferralDraft,
    ReferralFilter, ReferralRepository, ReferralService, ReferralStatus, RemarkInput, Rule,
    RuleDraft, RuleEvaluator, RulePatch, RuleRepository, RuleService, TaskEvent, TaskFilter,
    TaskPriority, TaskRepository, TaskService, TaskSource, TaskStatus, TaskType, TaskView,
};
use log::{info, warn};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

/// Maps a failure kind onto its response status.
pub fn status_code(kind: ErrorKind) -> u16 {
    match kind {
        ErrorKind::Validation => 400,
        ErrorKind::NotFound => 404,
        ErrorKind::Conflict => 409,
        ErrorKind::StoreUnavailable => 503,
    }
}

impl<T> ApiResponse<T> {
    pub fn success(message: impl Into<String>, data: T) -> Self {
        Self {
            ok: true,
            status: 200,
            error_kind: None,
            message: message.into(),
            data: Some(data),
        }
    }

    pub fn failure(err: &CoreError) -> Self {
        Self {
            ok: false,
            status: status_code(err.kind()),
            error_kind: Some(err.kind().as_str().to_string()),
            message: err.to_string(),
            data: None,
        }
    }
}

/// Entry point bundling every service over one set of stores.
pub struct CrmApi<
    RR = InMemoryReferralRepository,
    RU = InMemoryRuleRepository,
    TR = InMemoryTaskRepository,
> where
    RR: ReferralRepository + Clone,
    RU: RuleRepository,
    TR: TaskRepository + Clone,
{
    clock: Arc<dyn Clock>,
    config: CoreConfig,
    referrals: ReferralService<RR>,
    rules: RuleService<RU>,
    tasks: TaskService<TR>,
    analytics: AnalyticsService<RR, TR>,
}

impl CrmApi {
    /// Fresh in-memory stores with the bundled condition evaluator.
    pub fn in_memory(config: CoreConfig, clock: Arc<dyn Clock>) -> Self {
        Self::new(
            InMemoryReferralRepository::new(),
            InMemoryRuleRepository::new(),
            InMemoryTaskRepository::new(),
            Arc::new(ConditionEvaluator),
            clock,
            config,
        )
    }
}

impl<RR, RU, TR> CrmApi<RR, RU, TR>
where
    RR: ReferralRepository + Clone,
    RU: RuleRepository,
    TR: TaskRepository + Clone,
{
    pub fn new(
        referrals: RR,
        rules: RU,
        tasks: TR,
        evaluator: Arc<dyn RuleEvaluator>,
        clock: Arc<dyn Clock>,
        config: CoreConfig,
    ) -> Self {
        Self {
            analytics: AnalyticsService::new(referrals.clone(), tasks.clone(), &config),
            referrals: ReferralService::new(referrals, Arc::clone(&clock), &config),
            rules: RuleService::new(rules, Arc::clone(&clock), &config),
            tasks: TaskService::new(tasks, Arc::clone(&clock), evaluator, &config),
            clock,
            config,
        }
    }

    pub fn create_referral(&self, request: CreateReferralRequest) -> ApiResponse<Referral> {
        respond("create_referral", "Referral created.", || {
            let target_department = request
                .target_department
                .as_deref()
                .map(parse_department)
                .transpose()?;
            self.referrals.create(ReferralDraft {
                referrer_id: request.referrer_id,
                receiver_id: request.receiver_id,
                target_department,
                customer_id: request.customer_id,
                notes: request.notes.unwrap_or_default(),
            })
        })
    }

    pub fn get_referral(&self, request: GetByIdRequest) -> ApiResponse<Referral> {
        respond("get_referral", "Referral loaded.", || {
            let id = parse_id("id", request.id.as_deref())?;
            self.referrals.get(id)
        })
    }

    pub fn list_referrals(&self, request: ListReferralsRequest) -> ApiResponse<Page<Referral>> {
        respond("list_referrals", "Referrals listed.", || {
            let filter = ReferralFilter {
                status: request
                    .status
                    .as_deref()
                    .map(parse_referral_status)
                    .transpose()?,
                target_department: request
                    .target_department
                    .as_deref()
                    .map(parse_department)
                    .transpose()?,
            };
            let page = page_query(request.paging);
            match (request.referrer_id.as_deref(), request.receiver_id.as_deref()) {
                (Some(referrer), None) => self.referrals.list_by_referrer(referrer, &filter, page),
                (None, Some(receiver)) => self.referrals.list_by_receiver(receiver, &filter, page),
                _ => Err(CoreError::validation(
                    "exactly one of referrerId or receiverId is required",
                )),
            }
        })
    }

    pub fn update_referral_status(&self, request: UpdateStatusRequest) -> ApiResponse<Referral> {
        respond("update_referral_status", "Referral status updated.", || {
            let id = parse_id("referralId", request.referral_id.as_deref())?;
            let status = parse_referral_status(required("status", request.status.as_deref())?)?;
            self.referrals.update_status(id, status, request.notes)
        })
    }

    pub fn mark_converted(&self, request: MarkConvertedRequest) -> ApiResponse<ConversionReceipt> {
        respond("mark_converted", "Referral converted.", || {
            let id = parse_id("referralId", request.referral_id.as_deref())?;
            let deal_amount = request
                .deal_amount
                .ok_or_else(|| CoreError::validation("dealAmount is required"))?;
            let deal_date = request
                .deal_date
                .unwrap_or_else(|| self.clock.now_ms());
            self.referrals.mark_converted(
                id,
                ConversionInput {
                    deal_amount,
                    deal_date,
                    deal_owner: request.deal_owner.unwrap_or_default(),
                    products: request.products,
                    discounts: request.discounts,
                    notes: request.notes,
                },
            )
        })
    }

    /// Commission for a recorded referral, or for an explicit amount using
    /// configured defaults for any rate/split not supplied.
    pub fn calculate_commission(
        &self,
        request: CalculateCommissionRequest,
    ) -> ApiResponse<CommissionCalculation> {
        respond("calculate_commission", "Commission calculated.", || {
            let breakdown = match (request.referral_id.as_deref(), request.deal_amount) {
                (Some(raw_id), _) => {
                    let id = parse_id("referralId", Some(raw_id))?;
                    self.referrals.commission_for(id)?
                }
                (None, Some(amount)) => {
                    let policy = self.referrals.policy();
                    calculate_detailed(
                        amount,
                        request.commission_rate.unwrap_or(policy.rate),
                        request.split_ratio.unwrap_or(policy.split_ratio),
                        policy.currency_scale,
                    )?
                }
                (None, None) => {
                    return Err(CoreError::validation(
                        "referralId or dealAmount is required",
                    ));
                }
            };
            Ok(CommissionCalculation::from(breakdown))
        })
    }

    pub fn commission_stats(&self, request: CommissionStatsRequest) -> ApiResponse<CommissionStats> {
        respond("commission_stats", "Statistics computed.", || {
            let window_start = request
                .period
                .start
                .ok_or_else(|| CoreError::validation("period.start is required"))?;
            let window_end = request
                .period
                .end
                .ok_or_else(|| CoreError::validation("period.end is required"))?;
            let department = request
                .filters
                .department
                .as_deref()
                .map(parse_department)
                .transpose()?;
            self.analytics.stats(&AnalyticsQuery {
                window_start,
                window_end,
                department,
                user_id: request.filters.user_id,
                as_of: request.as_of.unwrap_or_else(|| self.clock.now_ms()),
            })
        })
    }

    pub fn create_rule(&self, request: CreateRuleRequest) -> ApiResponse<Rule> {
        respond("create_rule", "Rule created.", || {
            let created_by = required("createdBy", request.created_by.as_deref())?;
            self.rules.create(
                RuleDraft {
                    name: request.name.unwrap_or_default(),
                    conditions: request.conditions,
                    actions: request.actions,
                    enabled: request.enabled.unwrap_or(true),
                },
                created_by,
            )
        })
    }

    pub fn update_rule(&self, request: UpdateRuleRequest) -> ApiResponse<Rule> {
        respond("update_rule", "Rule updated.", || {
            let id = parse_id("ruleId", request.rule_id.as_deref())?;
            let changed_by = required("changedBy", request.changed_by.as_deref())?;
            let patch = RulePatch {
                name: request.name,
                conditions: request.conditions,
                actions: request.actions,
                enabled: request.enabled,
            };
            self.rules.update(
                id,
                &patch,
                changed_by,
                request.comment.as_deref().unwrap_or_default(),
            )
        })
    }

    pub fn rule_history(&self, request: RuleHistoryRequest) -> ApiResponse<RuleHistoryResponse> {
        respond("rule_history", "Rule history loaded.", || {
            let id = parse_id("ruleId", request.rule_id.as_deref())?;
            let page = self.rules.history(id, page_query(request.paging))?;
            Ok(RuleHistoryResponse {
                rule_id: id.to_string(),
                total: page.total,
                page: page.page,
                limit: page.limit,
                history: page.items.into_iter().map(HistoryEntry::from).collect(),
            })
        })
    }

    /// Generates tasks for an event, optionally through a stored rule.
    pub fn create_tasks_from_event(&self, request: TaskEventRequest) -> ApiResponse<Vec<TaskView>> {
        respond("create_tasks_from_event", "Tasks generated.", || {
            let source_id = required("sourceId", request.source_id.as_deref())?;
            let source = match required("sourceType", request.source_type.as_deref())? {
                "referral" => TaskSource::Referral(parse_id("sourceId", Some(source_id))?),
                "customer" => TaskSource::Customer(source_id.to_string()),
                "task" => TaskSource::Task(parse_id("sourceId", Some(source_id))?),
                other => {
                    return Err(CoreError::validation(format!(
                        "unsupported sourceType `{other}`"
                    )));
                }
            };
            let rule = match request.rule_id.as_deref() {
                Some(raw) => Some(self.rules.get(parse_id("ruleId", Some(raw))?)?),
                None => None,
            };
            let event = TaskEvent {
                source,
                customer_id: request.customer_id.unwrap_or_default(),
                assigned_to: request.assigned_to.unwrap_or_default(),
                threshold_at: request.threshold_at,
                notes: request.notes.unwrap_or_default(),
                facts: FactSnapshot::new(request.facts),
            };
            let now = self.clock.now_ms();
            Ok(self
                .tasks
                .create_from_event(&event, rule.as_ref())?
                .into_iter()
                .map(|task| task.view(now))
                .collect())
        })
    }

    pub fn complete_task(&self, request: CompleteTaskRequest) -> ApiResponse<CompletionOutcome> {
        respond("complete_task", "Task completed.", || {
            let id = parse_id("taskId", request.task_id.as_deref())?;
            let remark = request.remark.map(remark_input);
            let next_actions = request
                .next_actions
                .into_iter()
                .map(follow_up_request)
                .collect::<CoreResult<Vec<_>>>()?;
            self.tasks.complete(id, remark, next_actions)
        })
    }

    pub fn add_task_remark(&self, request: AddRemarkRequest) -> ApiResponse<TaskView> {
        respond("add_task_remark", "Remark added.", || {
            let id = parse_id("taskId", request.task_id.as_deref())?;
            let remark = request
                .remark
                .map(remark_input)
                .ok_or_else(|| CoreError::validation("remark is required"))?;
            let task = self.tasks.add_remark(id, remark)?;
            Ok(task.view(self.clock.now_ms()))
        })
    }

    pub fn get_task(&self, request: GetByIdRequest) -> ApiResponse<TaskView> {
        respond("get_task", "Task loaded.", || {
            self.tasks.view(parse_id("id", request.id.as_deref())?)
        })
    }

    pub fn list_tasks(&self, request: ListTasksRequest) -> ApiResponse<Page<TaskView>> {
        respond("list_tasks", "Tasks listed.", || {
            let assignee = required("assignedTo", request.assigned_to.as_deref())?;
            let filter = TaskFilter {
                status: request.status.as_deref().map(parse_task_status).transpose()?,
                task_type: request.task_type.as_deref().map(parse_task_type).transpose()?,
                priority: request.priority.as_deref().map(parse_priority).transpose()?,
            };
            self.tasks
                .list_for_assignee(assignee, &filter, page_query(request.paging))
        })
    }

    /// Configuration the services were built with.
    pub fn config(&self) -> &CoreConfig {
        &self.config
    }

    /// String-in/string-out entry point keyed by operation name.
    ///
    /// Unknown operations and malformed payloads produce a 400 envelope.
    pub fn dispatch_json(&self, operation: &str, payload: &str) -> String {
        match operation {
            "create_referral" => run(payload, |req| self.create_referral(req)),
            "get_referral" => run(payload, |req| self.get_referral(req)),
            "list_referrals" => run(payload, |req| self.list_referrals(req)),
            "update_referral_status" => run(payload, |req| self.update_referral_status(req)),
            "mark_converted" => run(payload, |req| self.mark_converted(req)),
            "calculate_commission" => run(payload, |req| self.calculate_commission(req)),
            "commission_stats" => run(payload, |req| self.commission_stats(req)),
            "create_rule" => run(payload, |req| self.create_rule(req)),
            "update_rule" => run(payload, |req| self.update_rule(req)),
            "rule_history" => run(payload, |req| self.rule_history(req)),
            "create_tasks_from_event" => run(payload, |req| self.create_tasks_from_event(req)),
            "complete_task" => run(payload, |req| self.complete_task(req)),
            "add_task_remark" => run(payload, |req| self.add_task_remark(req)),
            "get_task" => run(payload, |req| self.get_task(req)),
            "list_tasks" => run(payload, |req| self.list_tasks(req)),
            other => {
                let err = CoreError::validation(format!("unknown operation `{other}`"));
                warn!(
                    "event=api_dispatch module=api status=error error_kind={}",
                    err.kind()
                );
                encode(&ApiResponse::<()>::failure(&err))
            }
        }
    }
}

fn respond<T>(
    operation: &'static str,
    message: &'static str,
    f: impl FnOnce() -> CoreResult<T>,
) -> ApiResponse<T> {
    match f() {
        Ok(data) => ApiResponse::success(message, data),
        Err(err) => {
            if err.is_retryable() {
                warn!(
                    "event=api_call module=api status=error op={} error_kind={}",
                    operation,
                    err.kind()
                );
            } else {
                info!(
                    "event=api_call module=api status=rejected op={} error_kind={}",
                    operation,
                    err.kind()
                );
            }
            ApiResponse::failure(&err)
        }
    }
}

fn run<Req, T>(payload: &str, f: impl FnOnce(Req) -> ApiResponse<T>) -> String
where
    Req: DeserializeOwned,
    T: Serialize,
{
    let body = if payload.trim().is_empty() { "{}" } else { payload };
    match serde_json::from_str::<Req>(body) {
        Ok(request) => encode(&f(request)),
        Err(err) => encode(&ApiResponse::<()>::failure(&CoreError::validation(format!(
            "malformed payload: {err}"
        )))),
    }
}

fn encode<T: Serialize>(response: &ApiResponse<T>) -> String {
    serde_json::to_string(response).unwrap_or_else(|err| {
        json!({
            "ok": false,
            "status": 500,
            "errorKind": "internal",
            "message": format!("response encoding failed: {err}"),
            "data": null,
        })
        .to_string()
    })
}

fn required<'a>(field: &str, value: Option<&'a str>) -> CoreResult<&'a str> {
    value
        .map(str::trim)
        .filter(|trimmed| !trimmed.is_empty())
        .ok_or_else(|| CoreError::validation(format!("{field} is required")))
}

fn parse_id(field: &str, value: Option<&str>) -> CoreResult<Uuid> {
    let raw = required(field, value)?;
    Uuid::parse_str(raw)
        .map_err(|_| CoreError::validation(format!("{field} is not a valid id: `{raw}`")))
}

fn parse_department(value: &str) -> CoreResult<Department> {
    Department::parse(value)
        .ok_or_else(|| CoreError::validation(format!("unsupported targetDepartment `{value}`")))
}

fn parse_referral_status(value: &str) -> CoreResult<ReferralStatus> {
    ReferralStatus::parse(value)
        .ok_or_else(|| CoreError::validation(format!("unsupported status `{value}`")))
}

fn parse_task_status(value: &str) -> CoreResult<TaskStatus> {
    TaskStatus::parse(value)
        .ok_or_else(|| CoreError::validation(format!("unsupported status `{value}`")))
}

fn parse_task_type(value: &str) -> CoreResult<TaskType> {
    TaskType::parse(value)
        .ok_or_else(|| CoreError::validation(format!("unsupported type `{value}`")))
}

fn parse_priority(value: &str) -> CoreResult<TaskPriority> {
    TaskPriority::parse(value)
        .ok_or_else(|| CoreError::validation(format!("unsupported priority `{value}`")))
}

fn page_query(paging: PagingParams) -> PageQuery {
    PageQuery {
        page: paging.page,
        limit: paging.page_size.or(paging.limit),
    }
}

fn remark_input(payload: RemarkPayload) -> RemarkInput {
    RemarkInput::new(
        payload.content.unwrap_or_default(),
        payload.author.unwrap_or_default(),
    )
}

fn follow_up_request(payload: NextActionPayload) -> CoreResult<FollowUpRequest> {
    let priority = match payload.priority.as_deref() {
        Some(raw) => parse_priority(raw)?,
        None => TaskPriority::Medium,
    };
    Ok(FollowUpRequest {
        reason: payload.reason.unwrap_or_default(),
        priority,
        due_in_days: payload
            .due_in_days
            .ok_or_else(|| CoreError::validation("nextActions[].dueInDays is required"))?,
    })
}
