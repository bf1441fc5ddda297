use std::collections::BTreeSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use quire_core::DomainResult;

use crate::{Action, Object, Role, Subject};

/// Grant: any subject holding `role` may perform `action` on `object`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PolicyRule {
    pub role: Role,
    pub object: Object,
    pub action: Action,
}

impl PolicyRule {
    pub fn new(role: Role, object: Object, action: Action) -> Self {
        Self { role, object, action }
    }
}

/// Membership: `subject` holds `role`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct GroupingRule {
    pub subject: Subject,
    pub role: Role,
}

impl GroupingRule {
    pub fn new(subject: Subject, role: Role) -> Self {
        Self { subject, role }
    }
}

/// Selects the slice of the policy store relevant to one authorization question.
///
/// A row matches when its subject/role column is *any* of the candidate
/// identifiers:
/// - policy rows match on `role`
/// - grouping rows match on `subject` or `role`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PolicyFilter {
    identifiers: BTreeSet<String>,
}

impl PolicyFilter {
    pub fn new(roles: &[Role], subjects: &[Subject]) -> Self {
        let identifiers = roles
            .iter()
            .map(|r| r.as_str().to_string())
            .chain(subjects.iter().map(|s| s.as_str().to_string()))
            .collect();
        Self { identifiers }
    }

    pub fn is_empty(&self) -> bool {
        self.identifiers.is_empty()
    }

    pub fn len(&self) -> usize {
        self.identifiers.len()
    }

    /// Candidate identifiers in a stable (sorted) order.
    pub fn identifiers(&self) -> impl Iterator<Item = &str> {
        self.identifiers.iter().map(String::as_str)
    }

    pub fn matches_policy(&self, rule: &PolicyRule) -> bool {
        self.identifiers.contains(rule.role.as_str())
    }

    pub fn matches_grouping(&self, rule: &GroupingRule) -> bool {
        self.identifiers.contains(rule.subject.as_str()) || self.identifiers.contains(rule.role.as_str())
    }
}

/// Tuples returned by a (filtered) load.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicySnapshot {
    pub policies: Vec<PolicyRule>,
    pub groupings: Vec<GroupingRule>,
}

impl PolicySnapshot {
    pub fn is_empty(&self) -> bool {
        self.policies.is_empty() && self.groupings.is_empty()
    }
}

/// Durable storage for policy and grouping tuples.
///
/// ## Write semantics
///
/// Writes are append-only and idempotent: re-adding an existing tuple is a
/// no-op that returns `Ok(false)` rather than an error. This lets concurrent
/// provisioning of the same resource proceed without locks.
///
/// ## Load semantics
///
/// `load_filtered` returns only rows matching the [`PolicyFilter`]; it has no
/// side effects. Storage errors are surfaced as-is; no retry happens here.
#[async_trait::async_trait]
pub trait PolicyStore: Send + Sync {
    /// Persist a policy tuple. Returns `true` if a new row was written.
    async fn add_policy(&self, rule: &PolicyRule) -> DomainResult<bool>;

    /// Persist a grouping tuple. Returns `true` if a new row was written.
    async fn add_grouping(&self, rule: &GroupingRule) -> DomainResult<bool>;

    /// Load the rows touching any of the filter's identifiers.
    async fn load_filtered(&self, filter: &PolicyFilter) -> DomainResult<PolicySnapshot>;

    /// Load every row. Diagnostics only; the engine never calls this on the
    /// request path.
    async fn load_all(&self) -> DomainResult<PolicySnapshot>;
}

#[async_trait::async_trait]
impl<S> PolicyStore for Arc<S>
where
    S: PolicyStore + ?Sized,
{
    async fn add_policy(&self, rule: &PolicyRule) -> DomainResult<bool> {
        (**self).add_policy(rule).await
    }

    async fn add_grouping(&self, rule: &GroupingRule) -> DomainResult<bool> {
        (**self).add_grouping(rule).await
    }

    async fn load_filtered(&self, filter: &PolicyFilter) -> DomainResult<PolicySnapshot> {
        (**self).load_filtered(filter).await
    }

    async fn load_all(&self) -> DomainResult<PolicySnapshot> {
        (**self).load_all().await
    }
}
