//! Collaborator contracts for identity persistence.
//!
//! Lookups return `NotFound` on absence; creates return `AlreadyExists` on a
//! uniqueness violation. Both are distinct from `Storage` failures.

pub mod in_memory;

use std::sync::Arc;

use quire_auth::{InMemoryPolicyStore, PolicyStore};
use quire_core::{AppUserId, DomainResult, GroupId, OrganizationId, SpaceId};

use crate::model::{AppUser, NewAppUser, NewOrganization, NewSpace, Organization, Space, SpaceType, UserGroup};

pub use in_memory::{InMemoryAppUsers, InMemoryGroups, InMemoryOrganizations, InMemorySpaces};

#[async_trait::async_trait]
pub trait OrganizationRepository: Send + Sync {
    async fn find_by_id(&self, id: OrganizationId) -> DomainResult<Organization>;

    async fn find_by_name(&self, name: &str) -> DomainResult<Organization>;

    /// Fails with `AlreadyExists` if the name is taken.
    async fn create(&self, input: &NewOrganization) -> DomainResult<OrganizationId>;
}

#[async_trait::async_trait]
pub trait AppUserRepository: Send + Sync {
    async fn find_by_id(&self, organization_id: OrganizationId, id: AppUserId) -> DomainResult<AppUser>;

    async fn find_by_login_id(&self, organization_id: OrganizationId, login_id: &str) -> DomainResult<AppUser>;

    /// Fails with `AlreadyExists` if `(organization_id, login_id)` is taken.
    async fn create(&self, input: &NewAppUser) -> DomainResult<AppUserId>;
}

#[async_trait::async_trait]
pub trait SpaceRepository: Send + Sync {
    async fn find_by_type_and_key(
        &self,
        organization_id: OrganizationId,
        space_type: SpaceType,
        key: &str,
    ) -> DomainResult<Space>;

    /// Fails with `AlreadyExists` if `(organization_id, space_type, key)` is taken.
    async fn create(&self, input: &NewSpace) -> DomainResult<SpaceId>;
}

#[async_trait::async_trait]
pub trait GroupRepository: Send + Sync {
    async fn find_public_group(&self, organization_id: OrganizationId) -> DomainResult<UserGroup>;

    /// Fails with `AlreadyExists` if the organization already has one.
    async fn create_public_group(&self, organization_id: OrganizationId) -> DomainResult<GroupId>;

    /// Idempotent. Returns `true` if a new membership row was written.
    async fn add_member(&self, group_id: GroupId, user_id: AppUserId) -> DomainResult<bool>;

    async fn is_member(&self, group_id: GroupId, user_id: AppUserId) -> DomainResult<bool>;
}

/// Shared handles to every store the hierarchy manager touches.
#[derive(Clone)]
pub struct IdentityStores {
    pub organizations: Arc<dyn OrganizationRepository>,
    pub app_users: Arc<dyn AppUserRepository>,
    pub spaces: Arc<dyn SpaceRepository>,
    pub groups: Arc<dyn GroupRepository>,
    pub policies: Arc<dyn PolicyStore>,
}

impl IdentityStores {
    /// Fresh in-memory stores for tests/dev.
    pub fn in_memory() -> Self {
        Self {
            organizations: Arc::new(InMemoryOrganizations::new()),
            app_users: Arc::new(InMemoryAppUsers::new()),
            spaces: Arc::new(InMemorySpaces::new()),
            groups: Arc::new(InMemoryGroups::new()),
            policies: Arc::new(InMemoryPolicyStore::new()),
        }
    }
}

impl core::fmt::Debug for IdentityStores {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("IdentityStores").finish_non_exhaustive()
    }
}
