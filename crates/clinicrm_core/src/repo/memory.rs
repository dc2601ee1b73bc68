//! In-memory repositories backed by `RwLock<BTreeMap>`.
//!
//! Each repository is a cheap `Clone` handle over shared state, so several
//! services can be injected with the same store.

use crate::model::referral::{Referral, ReferralId};
use crate::model::rule::{Rule, RuleId, RuleVersion};
use crate::model::task::{Task, TaskId};
use crate::repo::{
    ReferralRepository, RepoError, RepoResult, Revision, RuleRepository, Stamped, SwapOutcome,
    TaskRepository,
};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Display;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Revision-stamped table shared by the referral and task repositories.
struct Table<K, V> {
    name: &'static str,
    rows: RwLock<BTreeMap<K, Stamped<V>>>,
}

impl<K: Ord + Copy + Display, V: Clone> Table<K, V> {
    fn new(name: &'static str) -> Self {
        Self {
            name,
            rows: RwLock::new(BTreeMap::new()),
        }
    }

    fn read(&self) -> RepoResult<RwLockReadGuard<'_, BTreeMap<K, Stamped<V>>>> {
        self.rows
            .read()
            .map_err(|_| RepoError::Unavailable(format!("{} table lock poisoned", self.name)))
    }

    fn write(&self) -> RepoResult<RwLockWriteGuard<'_, BTreeMap<K, Stamped<V>>>> {
        self.rows
            .write()
            .map_err(|_| RepoError::Unavailable(format!("{} table lock poisoned", self.name)))
    }

    fn insert(&self, id: K, value: &V) -> RepoResult<()> {
        let mut rows = self.write()?;
        if rows.contains_key(&id) {
            return Err(RepoError::Duplicate(id.to_string()));
        }
        rows.insert(
            id,
            Stamped {
                revision: 1,
                value: value.clone(),
            },
        );
        Ok(())
    }

    /// Inserts every value under one lock, or none when any id is taken.
    fn insert_all(&self, values: &[V], id_of: impl Fn(&V) -> K) -> RepoResult<()> {
        let mut rows = self.write()?;
        ensure_free(&rows, values, &id_of)?;
        insert_fresh(&mut rows, values, &id_of);
        Ok(())
    }

    fn load(&self, id: K) -> RepoResult<Option<Stamped<V>>> {
        Ok(self.read()?.get(&id).cloned())
    }

    fn swap(&self, id: K, expected: Revision, value: &V) -> RepoResult<SwapOutcome> {
        let mut rows = self.write()?;
        let Some(row) = rows.get_mut(&id) else {
            return Ok(SwapOutcome::Missing);
        };
        if row.revision != expected {
            return Ok(SwapOutcome::Stale);
        }
        row.revision += 1;
        row.value = value.clone();
        Ok(SwapOutcome::Applied(row.revision))
    }

    /// `swap` on `id` plus `insert_all` of `inserted`, under one lock.
    fn swap_and_insert(
        &self,
        id: K,
        expected: Revision,
        value: &V,
        inserted: &[V],
        id_of: impl Fn(&V) -> K,
    ) -> RepoResult<SwapOutcome> {
        let mut rows = self.write()?;
        match rows.get(&id) {
            None => return Ok(SwapOutcome::Missing),
            Some(row) if row.revision != expected => return Ok(SwapOutcome::Stale),
            Some(_) => {}
        }
        ensure_free(&rows, inserted, &id_of)?;

        let Some(row) = rows.get_mut(&id) else {
            return Ok(SwapOutcome::Missing);
        };
        row.revision += 1;
        row.value = value.clone();
        let revision = row.revision;
        insert_fresh(&mut rows, inserted, &id_of);
        Ok(SwapOutcome::Applied(revision))
    }

    fn snapshot(&self) -> RepoResult<Vec<V>> {
        Ok(self
            .read()?
            .values()
            .map(|row| row.value.clone())
            .collect())
    }
}

/// Fails with `Duplicate` when a value's id is stored or repeats in the batch.
fn ensure_free<K: Ord + Copy + Display, V>(
    rows: &BTreeMap<K, Stamped<V>>,
    values: &[V],
    id_of: &impl Fn(&V) -> K,
) -> RepoResult<()> {
    let mut batch = BTreeSet::new();
    for value in values {
        let id = id_of(value);
        if rows.contains_key(&id) || !batch.insert(id) {
            return Err(RepoError::Duplicate(id.to_string()));
        }
    }
    Ok(())
}

fn insert_fresh<K: Ord + Copy, V: Clone>(
    rows: &mut BTreeMap<K, Stamped<V>>,
    values: &[V],
    id_of: &impl Fn(&V) -> K,
) {
    for value in values {
        rows.insert(
            id_of(value),
            Stamped {
                revision: 1,
                value: value.clone(),
            },
        );
    }
}

#[derive(Clone)]
pub struct InMemoryReferralRepository {
    table: Arc<Table<ReferralId, Referral>>,
}

impl InMemoryReferralRepository {
    pub fn new() -> Self {
        Self {
            table: Arc::new(Table::new("referrals")),
        }
    }
}

impl Default for InMemoryReferralRepository {
    fn default() -> Self {
        Self::new()
    }
}

impl ReferralRepository for InMemoryReferralRepository {
    fn insert_referral(&self, referral: &Referral) -> RepoResult<()> {
        self.table.insert(referral.id, referral)
    }

    fn load_referral(&self, id: ReferralId) -> RepoResult<Option<Stamped<Referral>>> {
        self.table.load(id)
    }

    fn swap_referral(&self, expected: Revision, referral: &Referral) -> RepoResult<SwapOutcome> {
        self.table.swap(referral.id, expected, referral)
    }

    fn snapshot_referrals(&self) -> RepoResult<Vec<Referral>> {
        self.table.snapshot()
    }
}

#[derive(Clone)]
pub struct InMemoryTaskRepository {
    table: Arc<Table<TaskId, Task>>,
}

impl InMemoryTaskRepository {
    pub fn new() -> Self {
        Self {
            table: Arc::new(Table::new("tasks")),
        }
    }
}

impl Default for InMemoryTaskRepository {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskRepository for InMemoryTaskRepository {
    fn insert_tasks(&self, tasks: &[Task]) -> RepoResult<()> {
        self.table.insert_all(tasks, |row| row.id)
    }

    fn load_task(&self, id: TaskId) -> RepoResult<Option<Stamped<Task>>> {
        self.table.load(id)
    }

    fn swap_task(&self, expected: Revision, task: &Task) -> RepoResult<SwapOutcome> {
        self.table.swap(task.id, expected, task)
    }

    fn commit_completion(
        &self,
        expected: Revision,
        task: &Task,
        follow_ups: &[Task],
    ) -> RepoResult<SwapOutcome> {
        self.table
            .swap_and_insert(task.id, expected, task, follow_ups, |row| row.id)
    }

    fn snapshot_tasks(&self) -> RepoResult<Vec<Task>> {
        self.table.snapshot()
    }
}

struct RuleRecord {
    rule: Rule,
    history: Vec<RuleVersion>,
}

#[derive(Clone, Default)]
pub struct InMemoryRuleRepository {
    records: Arc<RwLock<BTreeMap<RuleId, RuleRecord>>>,
}

impl InMemoryRuleRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RepoResult<RwLockReadGuard<'_, BTreeMap<RuleId, RuleRecord>>> {
        self.records
            .read()
            .map_err(|_| RepoError::Unavailable("rules table lock poisoned".to_string()))
    }

    fn write(&self) -> RepoResult<RwLockWriteGuard<'_, BTreeMap<RuleId, RuleRecord>>> {
        self.records
            .write()
            .map_err(|_| RepoError::Unavailable("rules table lock poisoned".to_string()))
    }
}

impl RuleRepository for InMemoryRuleRepository {
    fn insert_rule(&self, rule: &Rule, initial: &RuleVersion) -> RepoResult<()> {
        let mut records = self.write()?;
        if records.contains_key(&rule.id) {
            return Err(RepoError::Duplicate(rule.id.to_string()));
        }
        records.insert(
            rule.id,
            RuleRecord {
                rule: rule.clone(),
                history: vec![initial.clone()],
            },
        );
        Ok(())
    }

    fn load_rule(&self, id: RuleId) -> RepoResult<Option<Rule>> {
        Ok(self.read()?.get(&id).map(|record| record.rule.clone()))
    }

    fn commit_rule_edit(
        &self,
        expected_version: u32,
        rule: &Rule,
        entry: &RuleVersion,
    ) -> RepoResult<SwapOutcome> {
        let mut records = self.write()?;
        let Some(record) = records.get_mut(&rule.id) else {
            return Ok(SwapOutcome::Missing);
        };
        let next_version = expected_version + 1;
        if record.rule.current_version != expected_version
            || rule.current_version != next_version
            || entry.version != next_version
        {
            return Ok(SwapOutcome::Stale);
        }
        record.rule = rule.clone();
        record.history.push(entry.clone());
        Ok(SwapOutcome::Applied(u64::from(next_version)))
    }

    fn rule_history(&self, id: RuleId) -> RepoResult<Option<Vec<RuleVersion>>> {
        Ok(self.read()?.get(&id).map(|record| record.history.clone()))
    }

    fn list_rules(&self) -> RepoResult<Vec<Rule>> {
        Ok(self
            .read()?
            .values()
            .map(|record| record.rule.clone())
            .collect())
    }
}
