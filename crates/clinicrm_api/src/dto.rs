//! Request and response payload shapes.
//!
//! Requests keep required fields optional so that a missing field is
//! reported as a validation error with the field's wire name instead of a
//! generic parse failure.

use clinicrm_core::service::commission::Share;
use clinicrm_core::{
    CommissionBreakdown, DiscountLine, FieldChange, ProductLine, RuleAction, RuleCondition,
    RuleVersion,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Uniform result envelope for every operation.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiResponse<T> {
    pub ok: bool,
    /// HTTP-style status: 200, 400, 404, 409, 503.
    pub status: u16,
    /// Stable failure kind, e.g. `validation_error`; absent on success.
    pub error_kind: Option<String>,
    pub message: String,
    pub data: Option<T>,
}

/// Paging fields accepted by every list request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PagingParams {
    pub page: Option<u32>,
    pub page_size: Option<u32>,
    pub limit: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CreateReferralRequest {
    pub referrer_id: Option<String>,
    pub receiver_id: Option<String>,
    pub target_department: Option<String>,
    pub customer_id: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GetByIdRequest {
    pub id: Option<String>,
}

/// Exactly one of `referrer_id` / `receiver_id` selects the listing side.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ListReferralsRequest {
    pub referrer_id: Option<String>,
    pub receiver_id: Option<String>,
    pub status: Option<String>,
    pub target_department: Option<String>,
    #[serde(flatten)]
    pub paging: PagingParams,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UpdateStatusRequest {
    pub referral_id: Option<String>,
    pub status: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MarkConvertedRequest {
    pub referral_id: Option<String>,
    pub deal_amount: Option<Decimal>,
    pub deal_date: Option<i64>,
    pub deal_owner: Option<String>,
    pub products: Vec<ProductLine>,
    pub discounts: Vec<DiscountLine>,
    pub notes: Option<String>,
}

/// Either `referral_id`, or an explicit `deal_amount` with optional
/// rate/split overrides.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CalculateCommissionRequest {
    pub referral_id: Option<String>,
    pub deal_amount: Option<Decimal>,
    pub commission_rate: Option<Decimal>,
    pub split_ratio: Option<Decimal>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CommissionAmounts {
    pub referrer: Decimal,
    pub receiver: Decimal,
    pub total: Decimal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CalculationDetails {
    pub split_ratio: Decimal,
    pub raw_total: Decimal,
    pub rounding_residual: Decimal,
    pub adjusted_share: Option<Share>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommissionCalculation {
    pub deal_amount: Decimal,
    pub commission_rate: Decimal,
    pub commission: CommissionAmounts,
    pub calculation_details: CalculationDetails,
}

impl From<CommissionBreakdown> for CommissionCalculation {
    fn from(breakdown: CommissionBreakdown) -> Self {
        Self {
            deal_amount: breakdown.deal_amount,
            commission_rate: breakdown.commission_rate,
            commission: CommissionAmounts {
                referrer: breakdown.commission.referrer_commission,
                receiver: breakdown.commission.receiver_commission,
                total: breakdown.commission.total,
            },
            calculation_details: CalculationDetails {
                split_ratio: breakdown.split_ratio,
                raw_total: breakdown.raw_total,
                rounding_residual: breakdown.rounding_residual,
                adjusted_share: breakdown.adjusted_share,
            },
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PeriodParams {
    pub start: Option<i64>,
    pub end: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StatsFilters {
    pub department: Option<String>,
    pub user_id: Option<String>,
}

/// Team statistics when `filters.user_id` is absent, personal otherwise.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CommissionStatsRequest {
    pub period: PeriodParams,
    pub filters: StatsFilters,
    /// Defaults to the current time.
    pub as_of: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CreateRuleRequest {
    pub name: Option<String>,
    pub conditions: Vec<RuleCondition>,
    pub actions: Vec<RuleAction>,
    pub enabled: Option<bool>,
    pub created_by: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UpdateRuleRequest {
    pub rule_id: Option<String>,
    pub name: Option<String>,
    pub conditions: Option<Vec<RuleCondition>>,
    pub actions: Option<Vec<RuleAction>>,
    pub enabled: Option<bool>,
    pub changed_by: Option<String>,
    pub comment: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RuleHistoryRequest {
    pub rule_id: Option<String>,
    #[serde(flatten)]
    pub paging: PagingParams,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub version: u32,
    pub changed_by: String,
    pub changed_at: i64,
    pub changes: Vec<FieldChange>,
    pub comment: String,
}

impl From<RuleVersion> for HistoryEntry {
    fn from(entry: RuleVersion) -> Self {
        Self {
            version: entry.version,
            changed_by: entry.changed_by,
            changed_at: entry.changed_at,
            changes: entry.changes,
            comment: entry.comment,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleHistoryResponse {
    pub rule_id: String,
    pub history: Vec<HistoryEntry>,
    pub total: u64,
    pub page: u32,
    pub limit: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TaskEventRequest {
    /// `referral`, `customer` or `task`.
    pub source_type: Option<String>,
    pub source_id: Option<String>,
    pub customer_id: Option<String>,
    pub assigned_to: Option<String>,
    pub threshold_at: Option<i64>,
    pub notes: Option<String>,
    pub facts: Value,
    pub rule_id: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RemarkPayload {
    pub content: Option<String>,
    pub author: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NextActionPayload {
    pub reason: Option<String>,
    pub priority: Option<String>,
    pub due_in_days: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CompleteTaskRequest {
    pub task_id: Option<String>,
    pub remark: Option<RemarkPayload>,
    pub next_actions: Vec<NextActionPayload>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AddRemarkRequest {
    pub task_id: Option<String>,
    pub remark: Option<RemarkPayload>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ListTasksRequest {
    pub assigned_to: Option<String>,
    pub status: Option<String>,
    #[serde(rename = "type")]
    pub task_type: Option<String>,
    pub priority: Option<String>,
    #[serde(flatten)]
    pub paging: PagingParams,
}
