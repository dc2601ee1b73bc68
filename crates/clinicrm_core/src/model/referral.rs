//! Referral ledger records.
//!
//! # Responsibility
//! - Define referral, conversion and commission value shapes.
//! - Encode the referral status state machine.
//!
//! # Invariants
//! - `conversion.is_some()` if and only if `status == Converted`.
//! - `Converted` is terminal; a conversion is written exactly once.
//! - `commission.referrer + commission.receiver == commission.total`.

use crate::clock::check_timestamp;
use crate::error::{CoreError, CoreResult};
use crate::service::commission::DEFAULT_CURRENCY_SCALE;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub type ReferralId = Uuid;

/// Department a patient is referred into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Department {
    Orthokeratology,
    Refractive,
    Other,
}

impl Department {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Orthokeratology => "orthokeratology",
            Self::Refractive => "refractive",
            Self::Other => "other",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim() {
            "orthokeratology" => Some(Self::Orthokeratology),
            "refractive" => Some(Self::Refractive),
            "other" => Some(Self::Other),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferralStatus {
    Pending,
    Converted,
    Declined,
    Expired,
}

impl ReferralStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Converted => "converted",
            Self::Declined => "declined",
            Self::Expired => "expired",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim() {
            "pending" => Some(Self::Pending),
            "converted" => Some(Self::Converted),
            "declined" => Some(Self::Declined),
            "expired" => Some(Self::Expired),
            _ => None,
        }
    }

    /// Whether the state machine admits `self -> next`.
    ///
    /// `pending -> converted` is listed here but is only reachable through
    /// conversion, which also records the deal.
    pub fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Converted)
                | (Self::Pending, Self::Declined)
                | (Self::Pending, Self::Expired)
                | (Self::Declined, Self::Pending)
                | (Self::Expired, Self::Pending)
        )
    }
}

/// Commission split derived from one conversion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Commission {
    pub referrer_commission: Decimal,
    pub receiver_commission: Decimal,
    pub total: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductLine {
    pub name: String,
    pub quantity: u32,
    pub unit_price: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscountLine {
    pub label: String,
    pub amount: Decimal,
}

/// Caller input for recording a conversion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversionInput {
    pub deal_amount: Decimal,
    pub deal_date: i64,
    pub deal_owner: String,
    pub products: Vec<ProductLine>,
    pub discounts: Vec<DiscountLine>,
    pub notes: Option<String>,
}

impl ConversionInput {
    pub fn validate(&self) -> CoreResult<()> {
        if self.deal_amount <= Decimal::ZERO {
            return Err(CoreError::validation("dealAmount must be positive"));
        }
        if self.deal_owner.trim().is_empty() {
            return Err(CoreError::validation("dealOwner is required"));
        }
        check_timestamp("dealDate", self.deal_date)?;
        for (index, product) in self.products.iter().enumerate() {
            if product.name.trim().is_empty() {
                return Err(CoreError::validation(format!(
                    "products[{index}].name is required"
                )));
            }
            if product.quantity == 0 {
                return Err(CoreError::validation(format!(
                    "products[{index}].quantity must be at least 1"
                )));
            }
            if product.unit_price < Decimal::ZERO {
                return Err(CoreError::validation(format!(
                    "products[{index}].unitPrice must not be negative"
                )));
            }
        }
        for (index, discount) in self.discounts.iter().enumerate() {
            if discount.amount < Decimal::ZERO {
                return Err(CoreError::validation(format!(
                    "discounts[{index}].amount must not be negative"
                )));
            }
        }
        Ok(())
    }
}

/// Recorded deal, immutable once attached to a referral.
///
/// Carries the rate, split and scale in force when it was written so later
/// configuration changes never alter historical commission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversion {
    pub deal_amount: Decimal,
    pub deal_date: i64,
    pub deal_owner: String,
    pub products: Vec<ProductLine>,
    pub discounts: Vec<DiscountLine>,
    pub notes: Option<String>,
    pub commission_rate: Decimal,
    pub split_ratio: Decimal,
    #[serde(default = "default_currency_scale")]
    pub currency_scale: u32,
    pub commission: Commission,
}

fn default_currency_scale() -> u32 {
    DEFAULT_CURRENCY_SCALE
}

/// Caller input for creating a referral. Required fields are optional here
/// so that absence is reported as a validation error instead of a parse error.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReferralDraft {
    pub referrer_id: Option<String>,
    pub receiver_id: Option<String>,
    pub target_department: Option<Department>,
    pub customer_id: Option<String>,
    pub notes: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Referral {
    pub id: ReferralId,
    pub referrer_id: String,
    pub receiver_id: String,
    pub target_department: Department,
    pub customer_id: Option<String>,
    pub status: ReferralStatus,
    pub notes: String,
    pub conversion: Option<Conversion>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Referral {
    /// Builds a pending referral from a draft.
    ///
    /// # Errors
    /// - `Validation` when referrer, receiver or department is missing.
    pub fn from_draft(draft: ReferralDraft, now_ms: i64) -> CoreResult<Self> {
        let referrer_id = required_text(draft.referrer_id, "referrerId")?;
        let receiver_id = required_text(draft.receiver_id, "receiverId")?;
        let target_department = draft
            .target_department
            .ok_or_else(|| CoreError::validation("targetDepartment is required"))?;
        let customer_id = draft
            .customer_id
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty());

        Ok(Self {
            id: Uuid::new_v4(),
            referrer_id,
            receiver_id,
            target_department,
            customer_id,
            status: ReferralStatus::Pending,
            notes: draft.notes,
            conversion: None,
            created_at: now_ms,
            updated_at: now_ms,
        })
    }

    /// Whether `user_id` took part as referrer or receiver.
    pub fn involves(&self, user_id: &str) -> bool {
        self.referrer_id == user_id || self.receiver_id == user_id
    }

    pub fn commission(&self) -> Option<&Commission> {
        self.conversion.as_ref().map(|conversion| &conversion.commission)
    }

    /// Checks the conversion/status pairing invariant.
    pub fn is_consistent(&self) -> bool {
        self.conversion.is_some() == (self.status == ReferralStatus::Converted)
    }
}

pub(crate) fn required_text(value: Option<String>, field: &str) -> CoreResult<String> {
    value
        .map(|raw| raw.trim().to_string())
        .filter(|trimmed| !trimmed.is_empty())
        .ok_or_else(|| CoreError::validation(format!("{field} is required")))
}
