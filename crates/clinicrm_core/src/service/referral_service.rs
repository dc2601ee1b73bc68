//! Referral ledger service.
//!
//! # Responsibility
//! - Create, read and list referrals.
//! - Drive the status state machine and the one-time conversion write.
//!
//! # Invariants
//! - `converted` is only reachable through `mark_converted`.
//! - A referral is converted at most once; a losing concurrent conversion
//!   observes the winner and fails with `Conflict`.
//! - Conversion fields and commission never change after they are written.

use crate::clock::Clock;
use crate::config::{CoreConfig, PagingConfig};
use crate::error::{CoreError, CoreResult};
use crate::model::page::{Page, PageQuery, PageRequest};
use crate::model::referral::{
    Commission, Conversion, ConversionInput, Department, Referral, ReferralDraft, ReferralId,
    ReferralStatus,
};
use crate::repo::ReferralRepository;
use crate::service::commission::{CommissionBreakdown, CommissionPolicy};
use crate::service::write_with_retry;
use log::{info, warn};
use serde::Serialize;
use std::sync::Arc;

const ENTITY: &str = "referral";

/// Conjunctive list filters; `None` matches everything.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReferralFilter {
    pub status: Option<ReferralStatus>,
    pub target_department: Option<Department>,
}

impl ReferralFilter {
    fn matches(&self, referral: &Referral) -> bool {
        self.status.map_or(true, |status| referral.status == status)
            && self
                .target_department
                .map_or(true, |department| referral.target_department == department)
    }
}

/// Result of a successful conversion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversionReceipt {
    pub referral_id: ReferralId,
    pub conversion: Conversion,
    pub commission: Commission,
}

#[derive(Clone, Copy)]
enum Party {
    Referrer,
    Receiver,
}

pub struct ReferralService<R: ReferralRepository> {
    repo: R,
    clock: Arc<dyn Clock>,
    policy: CommissionPolicy,
    paging: PagingConfig,
    max_write_attempts: u32,
}

impl<R: ReferralRepository> ReferralService<R> {
    pub fn new(repo: R, clock: Arc<dyn Clock>, config: &CoreConfig) -> Self {
        Self {
            repo,
            clock,
            policy: CommissionPolicy::from_config(&config.commission),
            paging: config.paging.clone(),
            max_write_attempts: config.store.max_write_attempts,
        }
    }

    /// Commission policy applied to new conversions.
    pub fn policy(&self) -> CommissionPolicy {
        self.policy
    }

    /// Records a new pending referral.
    pub fn create(&self, draft: ReferralDraft) -> CoreResult<Referral> {
        let referral = Referral::from_draft(draft, self.clock.now_ms())?;
        self.repo.insert_referral(&referral)?;
        info!(
            "event=referral_create module=referral status=ok referral_id={} department={}",
            referral.id,
            referral.target_department.as_str()
        );
        Ok(referral)
    }

    pub fn get(&self, id: ReferralId) -> CoreResult<Referral> {
        self.repo
            .load_referral(id)?
            .map(|stamped| stamped.value)
            .ok_or_else(|| CoreError::not_found(ENTITY, id))
    }

    /// Referrals sent by `referrer_id`, newest first.
    pub fn list_by_referrer(
        &self,
        referrer_id: &str,
        filter: &ReferralFilter,
        page: PageQuery,
    ) -> CoreResult<Page<Referral>> {
        self.list_by_party(Party::Referrer, referrer_id, filter, page)
    }

    /// Referrals addressed to `receiver_id`, newest first.
    pub fn list_by_receiver(
        &self,
        receiver_id: &str,
        filter: &ReferralFilter,
        page: PageQuery,
    ) -> CoreResult<Page<Referral>> {
        self.list_by_party(Party::Receiver, receiver_id, filter, page)
    }

    fn list_by_party(
        &self,
        party: Party,
        user_id: &str,
        filter: &ReferralFilter,
        page: PageQuery,
    ) -> CoreResult<Page<Referral>> {
        let user_id = user_id.trim();
        if user_id.is_empty() {
            return Err(CoreError::validation("user id is required"));
        }
        let request = PageRequest::normalize(page, &self.paging);

        let mut matching: Vec<Referral> = self
            .repo
            .snapshot_referrals()?
            .into_iter()
            .filter(|referral| match party {
                Party::Referrer => referral.referrer_id == user_id,
                Party::Receiver => referral.receiver_id == user_id,
            })
            .filter(|referral| filter.matches(referral))
            .collect();
        matching.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| a.id.cmp(&b.id))
        });
        Ok(request.apply(matching))
    }

    /// Moves a referral to `declined`, `expired`, or back to `pending`.
    ///
    /// # Errors
    /// - `Validation` when `new_status` is `converted` (use `mark_converted`).
    /// - `NotFound` when the id is unknown.
    /// - `Conflict` when the referral is converted or the transition is not
    ///   part of the state machine.
    pub fn update_status(
        &self,
        id: ReferralId,
        new_status: ReferralStatus,
        notes: Option<String>,
    ) -> CoreResult<Referral> {
        if new_status == ReferralStatus::Converted {
            return Err(CoreError::validation(
                "status `converted` can only be set by recording a conversion",
            ));
        }

        let updated = write_with_retry(
            ENTITY,
            id,
            self.max_write_attempts,
            || self.repo.load_referral(id),
            |mut referral| {
                if referral.status == ReferralStatus::Converted {
                    return Err(CoreError::conflict(format!(
                        "referral {id} is converted and can no longer change status"
                    )));
                }
                if !referral.status.can_transition_to(new_status) {
                    return Err(CoreError::conflict(format!(
                        "referral {id} cannot move from {} to {}",
                        referral.status.as_str(),
                        new_status.as_str()
                    )));
                }
                referral.status = new_status;
                if let Some(notes) = &notes {
                    referral.notes = notes.clone();
                }
                referral.updated_at = self.clock.now_ms();
                Ok(referral)
            },
            |revision, referral| self.repo.swap_referral(revision, referral),
        )?;

        info!(
            "event=referral_status module=referral status=ok referral_id={} new_status={}",
            id,
            new_status.as_str()
        );
        Ok(updated)
    }

    /// Records the deal for a pending referral and returns its commission.
    ///
    /// The commission uses the policy in force now and is stored inside the
    /// conversion alongside the rate, split and scale that produced it.
    ///
    /// # Errors
    /// Checked in this order, so the referral's state wins over bad input:
    /// - `NotFound` when the id is unknown.
    /// - `Conflict` when already converted, or not currently pending.
    /// - `Validation` for malformed deal input.
    pub fn mark_converted(
        &self,
        id: ReferralId,
        input: ConversionInput,
    ) -> CoreResult<ConversionReceipt> {
        ensure_convertible(&self.get(id)?)?;
        input.validate()?;
        let breakdown = self.policy.calculate(input.deal_amount)?;
        let conversion = Conversion {
            deal_amount: input.deal_amount,
            deal_date: input.deal_date,
            deal_owner: input.deal_owner.trim().to_string(),
            products: input.products,
            discounts: input.discounts,
            notes: input.notes,
            commission_rate: self.policy.rate,
            split_ratio: self.policy.split_ratio,
            currency_scale: self.policy.currency_scale,
            commission: breakdown.commission,
        };

        let converted = write_with_retry(
            ENTITY,
            id,
            self.max_write_attempts,
            || self.repo.load_referral(id),
            |mut referral| {
                ensure_convertible(&referral)?;
                referral.status = ReferralStatus::Converted;
                referral.conversion = Some(conversion.clone());
                referral.updated_at = self.clock.now_ms();
                Ok(referral)
            },
            |revision, referral| self.repo.swap_referral(revision, referral),
        );

        let converted = match converted {
            Ok(referral) => referral,
            Err(err) => {
                info!(
                    "event=referral_convert module=referral status=rejected referral_id={} error_kind={}",
                    id,
                    err.kind()
                );
                return Err(err);
            }
        };

        info!(
            "event=referral_convert module=referral status=ok referral_id={} total={}",
            id, conversion.commission.total
        );
        Ok(ConversionReceipt {
            referral_id: converted.id,
            commission: conversion.commission,
            conversion,
        })
    }

    /// Commission breakdown for a converted referral, from its recorded deal.
    ///
    /// Uses the rate, split and scale stored with the conversion; the
    /// reported commission is always the recorded one.
    ///
    /// # Errors
    /// - `NotFound` when the id is unknown.
    /// - `Validation` when the referral has no conversion yet.
    pub fn commission_for(&self, id: ReferralId) -> CoreResult<CommissionBreakdown> {
        let referral = self.get(id)?;
        let conversion = referral.conversion.ok_or_else(|| {
            CoreError::validation(format!("referral {id} has no recorded conversion"))
        })?;
        let mut breakdown = crate::service::commission::calculate_detailed(
            conversion.deal_amount,
            conversion.commission_rate,
            conversion.split_ratio,
            conversion.currency_scale,
        )?;
        if breakdown.commission != conversion.commission {
            warn!(
                "event=commission_replay module=referral status=mismatch referral_id={} recorded_total={} replayed_total={}",
                id, conversion.commission.total, breakdown.commission.total
            );
            breakdown.commission = conversion.commission;
        }
        Ok(breakdown)
    }
}

/// Only pending referrals accept a conversion.
fn ensure_convertible(referral: &Referral) -> CoreResult<()> {
    match referral.status {
        ReferralStatus::Pending => Ok(()),
        ReferralStatus::Converted => Err(CoreError::conflict(format!(
            "referral {} is already converted",
            referral.id
        ))),
        other => Err(CoreError::conflict(format!(
            "referral {} is {} and must be reopened before conversion",
            referral.id,
            other.as_str()
        ))),
    }
}
