//! Rule registry with an append-only version history.
//!
//! # Responsibility
//! - Create rules at version 1 with an "initial creation" history entry.
//! - Apply edits as field-level diffs, one new version per effective edit.
//! - Page through history newest first.
//!
//! # Invariants
//! - Versions per rule are gap-free and start at 1.
//! - An edit that changes nothing is rejected and writes nothing.
//! - Two concurrent edits never claim the same version number.

use crate::clock::Clock;
use crate::config::{CoreConfig, PagingConfig};
use crate::error::{CoreError, CoreResult};
use crate::model::page::{Page, PageQuery, PageRequest};
use crate::model::rule::{Rule, RuleDraft, RuleId, RulePatch, RuleVersion};
use crate::repo::{RuleRepository, SwapOutcome};
use crate::service::rule_diff::diff_values;
use log::{debug, info, warn};
use std::sync::Arc;

const ENTITY: &str = "rule";
pub const INITIAL_VERSION_COMMENT: &str = "initial creation";

pub struct RuleService<R: RuleRepository> {
    repo: R,
    clock: Arc<dyn Clock>,
    paging: PagingConfig,
    max_write_attempts: u32,
}

impl<R: RuleRepository> RuleService<R> {
    pub fn new(repo: R, clock: Arc<dyn Clock>, config: &CoreConfig) -> Self {
        Self {
            repo,
            clock,
            paging: config.paging.clone(),
            max_write_attempts: config.store.max_write_attempts,
        }
    }

    /// Registers a rule at version 1 and writes its initial history entry.
    pub fn create(&self, draft: RuleDraft, created_by: &str) -> CoreResult<Rule> {
        let created_by = required_actor(created_by)?;
        let now = self.clock.now_ms();
        let rule = draft.into_rule(now)?;
        let initial = RuleVersion {
            rule_id: rule.id,
            version: rule.current_version,
            changed_by: created_by,
            changed_at: now,
            changes: Vec::new(),
            comment: INITIAL_VERSION_COMMENT.to_string(),
        };
        self.repo.insert_rule(&rule, &initial)?;
        info!(
            "event=rule_create module=rule status=ok rule_id={} version=1",
            rule.id
        );
        Ok(rule)
    }

    pub fn get(&self, id: RuleId) -> CoreResult<Rule> {
        self.repo
            .load_rule(id)?
            .ok_or_else(|| CoreError::not_found(ENTITY, id))
    }

    /// All rules ordered by name.
    pub fn list(&self) -> CoreResult<Vec<Rule>> {
        let mut rules = self.repo.list_rules()?;
        rules.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));
        Ok(rules)
    }

    /// Applies `patch`, bumps the version by one and appends the diff.
    ///
    /// # Errors
    /// - `NotFound` when the rule is unknown.
    /// - `Validation` for a blank `changed_by`, an invalid patched rule, or a
    ///   patch with no effective change.
    /// - `StoreUnavailable` when concurrent edits keep winning the race.
    pub fn update(
        &self,
        id: RuleId,
        patch: &RulePatch,
        changed_by: &str,
        comment: &str,
    ) -> CoreResult<Rule> {
        let changed_by = required_actor(changed_by)?;

        for attempt in 1..=self.max_write_attempts {
            let stored = self.get(id)?;
            let mut next = stored.patched(patch);
            next.validate()?;

            let changes = diff_values(&stored.editable_projection(), &next.editable_projection());
            if changes.is_empty() {
                return Err(CoreError::validation(format!(
                    "update to rule {id} changes nothing"
                )));
            }

            let now = self.clock.now_ms();
            next.current_version = stored.current_version + 1;
            next.updated_at = now;
            let entry = RuleVersion {
                rule_id: id,
                version: next.current_version,
                changed_by: changed_by.clone(),
                changed_at: now,
                changes,
                comment: comment.trim().to_string(),
            };

            match self
                .repo
                .commit_rule_edit(stored.current_version, &next, &entry)?
            {
                SwapOutcome::Applied(_) => {
                    info!(
                        "event=rule_update module=rule status=ok rule_id={} version={} changes={}",
                        id,
                        next.current_version,
                        entry.changes.len()
                    );
                    return Ok(next);
                }
                SwapOutcome::Stale => {
                    debug!(
                        "event=write_retry module=rule status=stale id={} attempt={}",
                        id, attempt
                    );
                }
                SwapOutcome::Missing => return Err(CoreError::not_found(ENTITY, id)),
            }
        }

        warn!(
            "event=write_retry module=rule status=exhausted id={} attempts={}",
            id, self.max_write_attempts
        );
        Err(CoreError::StoreUnavailable(format!(
            "rule {id} kept changing during update; gave up after {} attempts",
            self.max_write_attempts
        )))
    }

    /// History entries newest version first.
    ///
    /// # Errors
    /// - `NotFound` when the rule is unknown. A known rule always has at
    ///   least its initial entry.
    pub fn history(&self, id: RuleId, page: PageQuery) -> CoreResult<Page<RuleVersion>> {
        let request = PageRequest::normalize(page, &self.paging);
        let mut history = self
            .repo
            .rule_history(id)?
            .ok_or_else(|| CoreError::not_found(ENTITY, id))?;
        history.sort_by(|a, b| b.version.cmp(&a.version));
        Ok(request.apply(history))
    }
}

fn required_actor(value: &str) -> CoreResult<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(CoreError::validation("changedBy is required"));
    }
    Ok(trimmed.to_string())
}
