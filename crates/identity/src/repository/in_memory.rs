//! In-memory identity stores for tests/dev.
//!
//! Uniqueness is checked and the row inserted under one write lock, so a
//! create is atomic with respect to concurrent creates.

use std::collections::{HashMap, HashSet};
use std::sync::RwLock;
use std::sync::atomic::{AtomicI64, Ordering};

use chrono::Utc;

use quire_core::{AppUserId, DomainError, DomainResult, GroupId, OrganizationId, SpaceId};

use super::{AppUserRepository, GroupRepository, OrganizationRepository, SpaceRepository};
use crate::model::{
    AppUser, NewAppUser, NewOrganization, NewSpace, Organization, PUBLIC_GROUP_KEY, PUBLIC_GROUP_NAME, Space,
    SpaceType, UserGroup,
};

fn poisoned() -> DomainError {
    DomainError::storage("lock poisoned")
}

/// Monotonic ID source starting at 1.
#[derive(Debug)]
struct Sequence(AtomicI64);

impl Sequence {
    fn new() -> Self {
        Self(AtomicI64::new(1))
    }

    fn next(&self) -> i64 {
        self.0.fetch_add(1, Ordering::SeqCst)
    }
}

#[derive(Debug)]
pub struct InMemoryOrganizations {
    rows: RwLock<HashMap<OrganizationId, Organization>>,
    seq: Sequence,
}

impl InMemoryOrganizations {
    pub fn new() -> Self {
        Self {
            rows: RwLock::new(HashMap::new()),
            seq: Sequence::new(),
        }
    }
}

impl Default for InMemoryOrganizations {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl OrganizationRepository for InMemoryOrganizations {
    async fn find_by_id(&self, id: OrganizationId) -> DomainResult<Organization> {
        let rows = self.rows.read().map_err(|_| poisoned())?;
        rows.get(&id)
            .cloned()
            .ok_or_else(|| DomainError::not_found(format!("organization {id}")))
    }

    async fn find_by_name(&self, name: &str) -> DomainResult<Organization> {
        let rows = self.rows.read().map_err(|_| poisoned())?;
        rows.values()
            .find(|o| o.name == name)
            .cloned()
            .ok_or_else(|| DomainError::not_found(format!("organization '{name}'")))
    }

    async fn create(&self, input: &NewOrganization) -> DomainResult<OrganizationId> {
        let mut rows = self.rows.write().map_err(|_| poisoned())?;
        if rows.values().any(|o| o.name == input.name) {
            return Err(DomainError::already_exists(format!("organization '{}'", input.name)));
        }
        let id = OrganizationId::new(self.seq.next());
        rows.insert(
            id,
            Organization {
                id,
                name: input.name.clone(),
                created_at: Utc::now(),
            },
        );
        Ok(id)
    }
}

#[derive(Debug)]
pub struct InMemoryAppUsers {
    rows: RwLock<HashMap<AppUserId, AppUser>>,
    seq: Sequence,
}

impl InMemoryAppUsers {
    pub fn new() -> Self {
        Self {
            rows: RwLock::new(HashMap::new()),
            // ID 1 belongs to the system admin.
            seq: Sequence(AtomicI64::new(2)),
        }
    }

    /// Number of users in an organization.
    pub fn count(&self, organization_id: OrganizationId) -> usize {
        self.rows
            .read()
            .map(|rows| rows.values().filter(|u| u.organization_id == organization_id).count())
            .unwrap_or(0)
    }
}

impl Default for InMemoryAppUsers {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl AppUserRepository for InMemoryAppUsers {
    async fn find_by_id(&self, organization_id: OrganizationId, id: AppUserId) -> DomainResult<AppUser> {
        let rows = self.rows.read().map_err(|_| poisoned())?;
        rows.get(&id)
            .filter(|u| u.organization_id == organization_id)
            .cloned()
            .ok_or_else(|| DomainError::not_found(format!("app user {id} in organization {organization_id}")))
    }

    async fn find_by_login_id(&self, organization_id: OrganizationId, login_id: &str) -> DomainResult<AppUser> {
        let rows = self.rows.read().map_err(|_| poisoned())?;
        rows.values()
            .find(|u| u.organization_id == organization_id && u.login_id == login_id)
            .cloned()
            .ok_or_else(|| {
                DomainError::not_found(format!("app user '{login_id}' in organization {organization_id}"))
            })
    }

    async fn create(&self, input: &NewAppUser) -> DomainResult<AppUserId> {
        let mut rows = self.rows.write().map_err(|_| poisoned())?;
        if rows
            .values()
            .any(|u| u.organization_id == input.organization_id && u.login_id == input.login_id)
        {
            return Err(DomainError::already_exists(format!(
                "app user '{}' in organization {}",
                input.login_id, input.organization_id
            )));
        }
        let id = AppUserId::new(self.seq.next());
        rows.insert(
            id,
            AppUser {
                id,
                organization_id: input.organization_id,
                login_id: input.login_id.clone(),
                username: input.username.clone(),
                role_labels: input.role_labels.clone(),
                created_at: Utc::now(),
            },
        );
        Ok(id)
    }
}

#[derive(Debug)]
pub struct InMemorySpaces {
    rows: RwLock<HashMap<SpaceId, Space>>,
    seq: Sequence,
}

impl InMemorySpaces {
    pub fn new() -> Self {
        Self {
            rows: RwLock::new(HashMap::new()),
            seq: Sequence::new(),
        }
    }

    pub fn count(&self, organization_id: OrganizationId) -> usize {
        self.rows
            .read()
            .map(|rows| rows.values().filter(|s| s.organization_id == organization_id).count())
            .unwrap_or(0)
    }
}

impl Default for InMemorySpaces {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl SpaceRepository for InMemorySpaces {
    async fn find_by_type_and_key(
        &self,
        organization_id: OrganizationId,
        space_type: SpaceType,
        key: &str,
    ) -> DomainResult<Space> {
        let rows = self.rows.read().map_err(|_| poisoned())?;
        rows.values()
            .find(|s| s.organization_id == organization_id && s.space_type == space_type && s.key == key)
            .cloned()
            .ok_or_else(|| {
                DomainError::not_found(format!("{space_type} space '{key}' in organization {organization_id}"))
            })
    }

    async fn create(&self, input: &NewSpace) -> DomainResult<SpaceId> {
        let mut rows = self.rows.write().map_err(|_| poisoned())?;
        if rows.values().any(|s| {
            s.organization_id == input.organization_id && s.space_type == input.space_type && s.key == input.key
        }) {
            return Err(DomainError::already_exists(format!(
                "{} space '{}' in organization {}",
                input.space_type, input.key, input.organization_id
            )));
        }
        let id = SpaceId::new(self.seq.next());
        rows.insert(
            id,
            Space {
                id,
                organization_id: input.organization_id,
                space_type: input.space_type,
                key: input.key.clone(),
                name: input.name.clone(),
                created_at: Utc::now(),
            },
        );
        Ok(id)
    }
}

#[derive(Debug)]
pub struct InMemoryGroups {
    groups: RwLock<HashMap<GroupId, UserGroup>>,
    members: RwLock<HashSet<(GroupId, AppUserId)>>,
    seq: Sequence,
}

impl InMemoryGroups {
    pub fn new() -> Self {
        Self {
            groups: RwLock::new(HashMap::new()),
            members: RwLock::new(HashSet::new()),
            seq: Sequence::new(),
        }
    }

    pub fn group_count(&self, organization_id: OrganizationId) -> usize {
        self.groups
            .read()
            .map(|g| g.values().filter(|g| g.organization_id == organization_id).count())
            .unwrap_or(0)
    }
}

impl Default for InMemoryGroups {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl GroupRepository for InMemoryGroups {
    async fn find_public_group(&self, organization_id: OrganizationId) -> DomainResult<UserGroup> {
        let groups = self.groups.read().map_err(|_| poisoned())?;
        groups
            .values()
            .find(|g| g.organization_id == organization_id && g.key == PUBLIC_GROUP_KEY)
            .cloned()
            .ok_or_else(|| DomainError::not_found(format!("public group of organization {organization_id}")))
    }

    async fn create_public_group(&self, organization_id: OrganizationId) -> DomainResult<GroupId> {
        let mut groups = self.groups.write().map_err(|_| poisoned())?;
        if groups
            .values()
            .any(|g| g.organization_id == organization_id && g.key == PUBLIC_GROUP_KEY)
        {
            return Err(DomainError::already_exists(format!(
                "public group of organization {organization_id}"
            )));
        }
        let id = GroupId::new(self.seq.next());
        groups.insert(
            id,
            UserGroup {
                id,
                organization_id,
                key: PUBLIC_GROUP_KEY.to_string(),
                name: PUBLIC_GROUP_NAME.to_string(),
            },
        );
        Ok(id)
    }

    async fn add_member(&self, group_id: GroupId, user_id: AppUserId) -> DomainResult<bool> {
        if !self.groups.read().map_err(|_| poisoned())?.contains_key(&group_id) {
            return Err(DomainError::not_found(format!("group {group_id}")));
        }
        let mut members = self.members.write().map_err(|_| poisoned())?;
        Ok(members.insert((group_id, user_id)))
    }

    async fn is_member(&self, group_id: GroupId, user_id: AppUserId) -> DomainResult<bool> {
        let members = self.members.read().map_err(|_| poisoned())?;
        Ok(members.contains(&(group_id, user_id)))
    }
}
