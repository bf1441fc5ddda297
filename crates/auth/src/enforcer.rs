//! Enforcer builder and the compiled, per-call evaluator.

use std::collections::{BTreeSet, HashMap};

use serde::Serialize;
use tracing::{debug, instrument};

use quire_core::OpContext;

use crate::authorize::AuthzError;
use crate::store::{PolicyFilter, PolicySnapshot, PolicyStore};
use crate::{Action, Object, Role, Subject};

/// Builds a fresh [`Enforcer`] from a filtered slice of the policy store.
///
/// Nothing is memoized across calls: tuples may be appended concurrently by
/// other requests, and a stale evaluator would deny legitimate access.
#[derive(Debug, Clone)]
pub struct EnforcerBuilder<S> {
    store: S,
}

impl<S> EnforcerBuilder<S>
where
    S: PolicyStore,
{
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Load rows touching `roles ∪ subjects` and compile them.
    #[instrument(
        skip_all,
        fields(candidate_roles = roles.len(), candidate_subjects = subjects.len()),
        err
    )]
    pub async fn build(
        &self,
        ctx: &OpContext,
        roles: &[Role],
        subjects: &[Subject],
    ) -> Result<Enforcer, AuthzError> {
        let filter = PolicyFilter::new(roles, subjects);
        let snapshot = ctx.run(self.store.load_filtered(&filter)).await??;

        debug!(
            policies = snapshot.policies.len(),
            groupings = snapshot.groupings.len(),
            "loaded policy slice"
        );

        Ok(Enforcer::from_snapshot(snapshot))
    }
}

/// In-memory evaluator over one loaded policy slice.
///
/// Answers "does subject S reach object O via action A" through the
/// grouping → policy chain: S holds role R, and `(R, O, A)` is granted.
#[derive(Debug, Clone, Default)]
pub struct Enforcer {
    subject_roles: HashMap<Subject, BTreeSet<Role>>,
    grants: HashMap<Object, HashMap<Action, BTreeSet<Role>>>,
    policy_count: usize,
    grouping_count: usize,
}

impl Enforcer {
    pub fn from_snapshot(snapshot: PolicySnapshot) -> Self {
        let mut enforcer = Self::default();

        for g in snapshot.groupings {
            if enforcer.subject_roles.entry(g.subject).or_default().insert(g.role) {
                enforcer.grouping_count += 1;
            }
        }

        for p in snapshot.policies {
            let inserted = enforcer
                .grants
                .entry(p.object)
                .or_default()
                .entry(p.action)
                .or_default()
                .insert(p.role);
            if inserted {
                enforcer.policy_count += 1;
            }
        }

        enforcer
    }

    pub fn policy_count(&self) -> usize {
        self.policy_count
    }

    pub fn grouping_count(&self) -> usize {
        self.grouping_count
    }

    /// Roles the subject holds within the loaded slice.
    pub fn roles_of(&self, subject: &Subject) -> Vec<Role> {
        self.subject_roles
            .get(subject)
            .map(|roles| roles.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn enforce(&self, subject: &Subject, object: &Object, action: &Action) -> bool {
        self.granting_role(subject, object, action).is_some()
    }

    /// The first (lexicographically smallest) role that grants the request.
    pub fn granting_role(&self, subject: &Subject, object: &Object, action: &Action) -> Option<&Role> {
        let held = self.subject_roles.get(subject)?;
        let granted = self.grants.get(object)?.get(action)?;
        granted.iter().find(|role| held.contains(*role))
    }

    /// Explain why a request would be allowed or denied.
    ///
    /// Intended for audit trails and operator tooling; the decision always
    /// agrees with [`Enforcer::enforce`].
    pub fn explain(&self, subject: &Subject, object: &Object, action: &Action) -> Decision {
        let subject_roles = self.roles_of(subject);
        let via_role = self.granting_role(subject, object, action).cloned();

        let reason = match &via_role {
            Some(role) => format!("'{subject}' holds '{role}', which may '{action}' on '{object}'"),
            None if subject_roles.is_empty() => {
                format!("'{subject}' holds no role relevant to '{object}'")
            }
            None => format!(
                "none of the roles held by '{subject}' ({}) may '{action}' on '{object}'",
                subject_roles
                    .iter()
                    .map(Role::as_str)
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
        };

        Decision {
            subject: subject.clone(),
            object: object.clone(),
            action: action.clone(),
            granted: via_role.is_some(),
            via_role,
            subject_roles,
            reason,
        }
    }
}

/// Auditable explanation of a single authorization decision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Decision {
    pub subject: Subject,
    pub object: Object,
    pub action: Action,
    pub granted: bool,
    /// The role that granted access, if any.
    pub via_role: Option<Role>,
    /// Roles the subject holds within the loaded slice.
    pub subject_roles: Vec<Role>,
    pub reason: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{GroupingRule, InMemoryPolicyStore, PolicyRule};
    use crate::ResourceRef;
    use quire_core::WorkbookId;

    async fn seeded_store() -> InMemoryPolicyStore {
        let store = InMemoryPolicyStore::new();
        let wb = ResourceRef::workbook(WorkbookId::new(42));
        for action in Action::full_control() {
            store
                .add_policy(&PolicyRule::new(wb.writer_role(), wb.object(), action))
                .await
                .unwrap();
        }
        store
            .add_policy(&PolicyRule::new(wb.reader_role(), wb.object(), Action::READ))
            .await
            .unwrap();
        store
            .add_grouping(&GroupingRule::new(Subject::new("user_7"), wb.writer_role()))
            .await
            .unwrap();
        store
            .add_grouping(&GroupingRule::new(Subject::new("user_9"), wb.reader_role()))
            .await
            .unwrap();
        store
    }

    #[tokio::test]
    async fn build_loads_only_the_candidate_slice() {
        let store = seeded_store().await;
        let other = ResourceRef::workbook(WorkbookId::new(43));
        store
            .add_policy(&PolicyRule::new(other.writer_role(), other.object(), Action::READ))
            .await
            .unwrap();

        let builder = EnforcerBuilder::new(store);
        let wb = ResourceRef::workbook(WorkbookId::new(42));
        let enforcer = builder
            .build(&OpContext::background(), &wb.candidate_roles(), &[Subject::new("user_7")])
            .await
            .unwrap();

        assert_eq!(enforcer.policy_count(), 4);
        assert!(enforcer.enforce(&Subject::new("user_7"), &wb.object(), &Action::REMOVE));
        assert!(!enforcer.enforce(&Subject::new("user_7"), &other.object(), &Action::READ));
    }

    #[tokio::test]
    async fn reader_role_only_reaches_read() {
        let builder = EnforcerBuilder::new(seeded_store().await);
        let wb = ResourceRef::workbook(WorkbookId::new(42));
        let reader = Subject::new("user_9");
        let enforcer = builder
            .build(&OpContext::background(), &wb.candidate_roles(), &[reader.clone()])
            .await
            .unwrap();

        assert!(enforcer.enforce(&reader, &wb.object(), &Action::READ));
        assert!(!enforcer.enforce(&reader, &wb.object(), &Action::UPDATE));
        assert_eq!(enforcer.roles_of(&reader), vec![wb.reader_role()]);
    }

    #[tokio::test]
    async fn explain_names_the_granting_role() {
        let builder = EnforcerBuilder::new(seeded_store().await);
        let wb = ResourceRef::workbook(WorkbookId::new(42));
        let enforcer = builder
            .build(&OpContext::background(), &wb.candidate_roles(), &[Subject::new("user_7")])
            .await
            .unwrap();

        let allowed = enforcer.explain(&Subject::new("user_7"), &wb.object(), &Action::UPDATE);
        assert!(allowed.granted);
        assert_eq!(allowed.via_role, Some(wb.writer_role()));

        let denied = enforcer.explain(&Subject::new("user_8"), &wb.object(), &Action::UPDATE);
        assert!(!denied.granted);
        assert!(denied.subject_roles.is_empty());
        assert!(denied.reason.contains("holds no role"));

        let json = serde_json::to_value(&allowed).unwrap();
        assert_eq!(json["via_role"], "workbook_42_writer");
    }

    #[tokio::test]
    async fn expired_context_fails_the_build() {
        let builder = EnforcerBuilder::new(seeded_store().await);
        let ctx = OpContext::background().with_timeout(std::time::Duration::ZERO);

        let err = builder.build(&ctx, &[], &[]).await.unwrap_err();
        assert!(matches!(err, AuthzError::Interrupted(_)));
    }
}
