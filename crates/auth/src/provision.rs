//! Role provisioning for newly created protected resources.
//!
//! Provisioning is a sequence of independent, idempotent tuple writes (not a
//! transaction). A crash between writes leaves a resource with partial
//! privileges; re-running the same call repairs it.

use thiserror::Error;
use tracing::{debug, info, instrument};

use quire_core::OpContext;

use crate::authorize::AuthzError;
use crate::store::{GroupingRule, PolicyRule, PolicyStore};
use crate::{Action, ResourceRef, RoleTier, Subject};

/// The tuple write that was in flight when provisioning failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProvisionStep {
    Policy { tier: RoleTier, action: Action },
    Grouping { tier: RoleTier },
}

impl core::fmt::Display for ProvisionStep {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            ProvisionStep::Policy { tier, action } => write!(f, "grant '{action}' to {tier} role"),
            ProvisionStep::Grouping { tier } => write!(f, "bind subject to {tier} role"),
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("provisioning {resource} failed at step '{step}': {source}")]
pub struct ProvisionError {
    pub resource: ResourceRef,
    pub step: ProvisionStep,
    #[source]
    pub source: AuthzError,
}

/// Writes the policy and grouping tuples that give a subject a role on a resource.
#[derive(Debug, Clone)]
pub struct RoleProvisioner<S> {
    store: S,
}

impl<S> RoleProvisioner<S>
where
    S: PolicyStore,
{
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Grant `owner` the writer role with `read`, `update` and `remove`.
    pub async fn grant_full_control(
        &self,
        ctx: &OpContext,
        resource: &ResourceRef,
        owner: &Subject,
    ) -> Result<(), ProvisionError> {
        self.grant_actions(ctx, resource, RoleTier::Writer, owner, &Action::full_control())
            .await
    }

    /// Grant `subject` the reader role (`read` only).
    pub async fn grant_reader(
        &self,
        ctx: &OpContext,
        resource: &ResourceRef,
        subject: &Subject,
    ) -> Result<(), ProvisionError> {
        self.grant_actions(ctx, resource, RoleTier::Reader, subject, &[Action::READ])
            .await
    }

    /// Write one policy tuple per action for the tier's role, then bind `subject`.
    #[instrument(skip_all, fields(resource = %resource, tier = %tier, subject = %subject), err)]
    pub async fn grant_actions(
        &self,
        ctx: &OpContext,
        resource: &ResourceRef,
        tier: RoleTier,
        subject: &Subject,
        actions: &[Action],
    ) -> Result<(), ProvisionError> {
        let role = resource.role(tier);
        let object = resource.object();

        for action in actions {
            let rule = PolicyRule::new(role.clone(), object.clone(), action.clone());
            let step = ProvisionStep::Policy {
                tier,
                action: action.clone(),
            };
            let inserted = self.write(ctx, resource, step, self.store.add_policy(&rule)).await?;
            debug!(action = %action, inserted, "policy tuple written");
        }

        let grouping = GroupingRule::new(subject.clone(), role);
        let inserted = self
            .write(
                ctx,
                resource,
                ProvisionStep::Grouping { tier },
                self.store.add_grouping(&grouping),
            )
            .await?;

        info!(inserted, "role provisioned");
        Ok(())
    }

    async fn write<F>(
        &self,
        ctx: &OpContext,
        resource: &ResourceRef,
        step: ProvisionStep,
        fut: F,
    ) -> Result<bool, ProvisionError>
    where
        F: Future<Output = quire_core::DomainResult<bool>>,
    {
        let fail = |source: AuthzError| ProvisionError {
            resource: resource.clone(),
            step: step.clone(),
            source,
        };

        match ctx.run(fut).await {
            Ok(Ok(inserted)) => Ok(inserted),
            // A concurrent writer got there first; the tuple is in place.
            Ok(Err(e)) if e.is_already_exists() => Ok(false),
            Ok(Err(e)) => Err(fail(e.into())),
            Err(interrupted) => Err(fail(interrupted.into())),
        }
    }
}
