use std::collections::BTreeSet;
use std::sync::RwLock;

use quire_core::{DomainError, DomainResult};

use super::r#trait::{GroupingRule, PolicyFilter, PolicyRule, PolicySnapshot, PolicyStore};

/// In-memory append-only policy store.
///
/// Intended for tests/dev. Tuples are kept in ordered sets, so duplicates are
/// suppressed and loads are deterministic.
#[derive(Debug, Default)]
pub struct InMemoryPolicyStore {
    policies: RwLock<BTreeSet<PolicyRule>>,
    groupings: RwLock<BTreeSet<GroupingRule>>,
}

impl InMemoryPolicyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn policy_count(&self) -> usize {
        self.policies.read().map(|p| p.len()).unwrap_or(0)
    }

    pub fn grouping_count(&self) -> usize {
        self.groupings.read().map(|g| g.len()).unwrap_or(0)
    }
}

fn poisoned() -> DomainError {
    DomainError::storage("lock poisoned")
}

#[async_trait::async_trait]
impl PolicyStore for InMemoryPolicyStore {
    async fn add_policy(&self, rule: &PolicyRule) -> DomainResult<bool> {
        let mut policies = self.policies.write().map_err(|_| poisoned())?;
        Ok(policies.insert(rule.clone()))
    }

    async fn add_grouping(&self, rule: &GroupingRule) -> DomainResult<bool> {
        let mut groupings = self.groupings.write().map_err(|_| poisoned())?;
        Ok(groupings.insert(rule.clone()))
    }

    async fn load_filtered(&self, filter: &PolicyFilter) -> DomainResult<PolicySnapshot> {
        let policies = self.policies.read().map_err(|_| poisoned())?;
        let groupings = self.groupings.read().map_err(|_| poisoned())?;

        Ok(PolicySnapshot {
            policies: policies.iter().filter(|p| filter.matches_policy(p)).cloned().collect(),
            groupings: groupings.iter().filter(|g| filter.matches_grouping(g)).cloned().collect(),
        })
    }

    async fn load_all(&self) -> DomainResult<PolicySnapshot> {
        let policies = self.policies.read().map_err(|_| poisoned())?;
        let groupings = self.groupings.read().map_err(|_| poisoned())?;

        Ok(PolicySnapshot {
            policies: policies.iter().cloned().collect(),
            groupings: groupings.iter().cloned().collect(),
        })
    }
}
