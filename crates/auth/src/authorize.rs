//! Privilege evaluation.

use std::collections::BTreeSet;

use serde::Serialize;
use thiserror::Error;
use tracing::{instrument, warn};

use quire_core::{DomainError, Interrupted, OpContext};

use crate::enforcer::{Enforcer, EnforcerBuilder};
use crate::store::PolicyStore;
use crate::{Action, Object, ResourceRef, Subject};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthzError {
    /// Store failure, or `PermissionDenied` from [`Authorizer::check`].
    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error(transparent)]
    Interrupted(#[from] Interrupted),
}

impl AuthzError {
    pub fn is_permission_denied(&self) -> bool {
        matches!(self, AuthzError::Domain(e) if e.is_permission_denied())
    }
}

/// The actions a subject was found to hold on one object.
///
/// Absence of an action *is* the deny signal.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct PrivilegeSet(BTreeSet<Action>);

impl PrivilegeSet {
    pub fn contains(&self, action: &Action) -> bool {
        self.0.contains(action)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Action> {
        self.0.iter()
    }

    pub fn require(&self, action: &Action) -> Result<(), DomainError> {
        if self.contains(action) {
            Ok(())
        } else {
            Err(DomainError::permission_denied(format!("missing action '{action}'")))
        }
    }
}

impl FromIterator<Action> for PrivilegeSet {
    fn from_iter<I: IntoIterator<Item = Action>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl IntoIterator for PrivilegeSet {
    type Item = Action;
    type IntoIter = std::collections::btree_set::IntoIter<Action>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

/// Test each candidate action independently and collect the granted ones.
///
/// - No IO
/// - No panics
/// - The result is always a subset of `actions`
pub fn evaluate(enforcer: &Enforcer, subject: &Subject, object: &Object, actions: &[Action]) -> PrivilegeSet {
    actions
        .iter()
        .filter(|action| enforcer.enforce(subject, object, action))
        .cloned()
        .collect()
}

/// Builder + evaluator for the common "one subject, one resource" question.
///
/// Candidate roles are derived from the resource (writer, reader), so the
/// store only loads the handful of rows that can possibly matter.
#[derive(Debug, Clone)]
pub struct Authorizer<S> {
    builder: EnforcerBuilder<S>,
}

impl<S> Authorizer<S>
where
    S: PolicyStore,
{
    pub fn new(store: S) -> Self {
        Self {
            builder: EnforcerBuilder::new(store),
        }
    }

    pub async fn enforcer_for(
        &self,
        ctx: &OpContext,
        subject: &Subject,
        resource: &ResourceRef,
    ) -> Result<Enforcer, AuthzError> {
        self.builder
            .build(ctx, &resource.candidate_roles(), std::slice::from_ref(subject))
            .await
    }

    #[instrument(skip_all, fields(subject = %subject, resource = %resource), err)]
    pub async fn privileges(
        &self,
        ctx: &OpContext,
        subject: &Subject,
        resource: &ResourceRef,
        actions: &[Action],
    ) -> Result<PrivilegeSet, AuthzError> {
        let enforcer = self.enforcer_for(ctx, subject, resource).await?;
        Ok(evaluate(&enforcer, subject, &resource.object(), actions))
    }

    /// Fails with `PermissionDenied` unless `subject` may perform `action`.
    pub async fn check(
        &self,
        ctx: &OpContext,
        subject: &Subject,
        resource: &ResourceRef,
        action: &Action,
    ) -> Result<(), AuthzError> {
        let privileges = self
            .privileges(ctx, subject, resource, std::slice::from_ref(action))
            .await?;

        privileges.require(action).map_err(|e| {
            warn!(subject = %subject, resource = %resource, action = %action, "access denied");
            AuthzError::from(e)
        })
    }
}
