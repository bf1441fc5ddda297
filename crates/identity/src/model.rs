//! Identity and space records, plus the inputs used to create them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use quire_core::{AppUserId, DomainError, DomainResult, GroupId, OrganizationId, SpaceId};

/// Login ID reserved for each organization's System Owner.
pub const SYSTEM_OWNER_LOGIN_ID: &str = "__system_owner";
pub const SYSTEM_OWNER_USERNAME: &str = "System Owner";

pub const LABEL_SYSTEM_OWNER: &str = "system_owner";
pub const LABEL_OWNER: &str = "owner";
pub const LABEL_STUDENT: &str = "student";

/// Key of the per-organization group every user joins.
pub const PUBLIC_GROUP_KEY: &str = "__public";
pub const PUBLIC_GROUP_NAME: &str = "Public Group";

/// Key of the per-organization default space.
pub const DEFAULT_SPACE_KEY: &str = "default";
pub const DEFAULT_SPACE_NAME: &str = "Default";

const MAX_NAME_LEN: usize = 64;

/// Trim and bound a user-supplied name or login ID.
pub fn normalize(field: &str, value: &str) -> DomainResult<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(DomainError::validation(format!("{field} must not be empty")));
    }
    if trimmed.chars().count() > MAX_NAME_LEN {
        return Err(DomainError::validation(format!(
            "{field} must be at most {MAX_NAME_LEN} characters"
        )));
    }
    Ok(trimmed.to_string())
}

/// Tenant boundary. Names are globally unique.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Organization {
    pub id: OrganizationId,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

/// Base record behind every organization-scoped identity.
///
/// `(organization_id, login_id)` is unique.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppUser {
    pub id: AppUserId,
    pub organization_id: OrganizationId,
    pub login_id: String,
    pub username: String,
    pub role_labels: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl AppUser {
    pub fn has_label(&self, label: &str) -> bool {
        self.role_labels.iter().any(|l| l == label)
    }
}

/// Usage kind of a space, stored as a numeric type code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpaceType {
    Default,
    Personal,
    System,
}

impl SpaceType {
    pub fn code(self) -> i16 {
        match self {
            SpaceType::Default => 1,
            SpaceType::Personal => 2,
            SpaceType::System => 3,
        }
    }

    pub fn from_code(code: i16) -> DomainResult<Self> {
        match code {
            1 => Ok(SpaceType::Default),
            2 => Ok(SpaceType::Personal),
            3 => Ok(SpaceType::System),
            other => Err(DomainError::storage(format!("unknown space type code {other}"))),
        }
    }
}

impl core::fmt::Display for SpaceType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            SpaceType::Default => f.write_str("default"),
            SpaceType::Personal => f.write_str("personal"),
            SpaceType::System => f.write_str("system"),
        }
    }
}

/// Container scoping workbook visibility. `(organization_id, space_type, key)` is unique.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Space {
    pub id: SpaceId,
    pub organization_id: OrganizationId,
    pub space_type: SpaceType,
    pub key: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

impl Space {
    /// Key of a user's personal space: the numeric user ID.
    pub fn personal_key(user_id: AppUserId) -> String {
        user_id.to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserGroup {
    pub id: GroupId,
    pub organization_id: OrganizationId,
    pub key: String,
    pub name: String,
}

// ─────────────────────────────────────────────────────────────────────────────
// Storage inputs
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewOrganization {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewAppUser {
    pub organization_id: OrganizationId,
    pub login_id: String,
    pub username: String,
    pub role_labels: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewSpace {
    pub organization_id: OrganizationId,
    pub space_type: SpaceType,
    pub key: String,
    pub name: String,
}

// ─────────────────────────────────────────────────────────────────────────────
// Flow inputs
// ─────────────────────────────────────────────────────────────────────────────

/// Login ID and display name of a human user to create.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub login_id: String,
    pub username: String,
}

impl UserProfile {
    pub fn new(login_id: impl Into<String>, username: impl Into<String>) -> Self {
        Self {
            login_id: login_id.into(),
            username: username.into(),
        }
    }

    pub(crate) fn normalized(&self) -> DomainResult<Self> {
        let login_id = normalize("login_id", &self.login_id)?;
        if login_id == SYSTEM_OWNER_LOGIN_ID {
            return Err(DomainError::validation(format!("login_id '{login_id}' is reserved")));
        }
        Ok(Self {
            login_id,
            username: normalize("username", &self.username)?,
        })
    }
}

/// Input to tenant onboarding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrganizationSetup {
    pub name: String,
    pub first_owner: UserProfile,
}

impl OrganizationSetup {
    pub fn new(name: impl Into<String>, first_owner: UserProfile) -> Self {
        Self {
            name: name.into(),
            first_owner,
        }
    }

    pub(crate) fn normalized(&self) -> DomainResult<Self> {
        Ok(Self {
            name: normalize("organization name", &self.name)?,
            first_owner: self.first_owner.normalized()?,
        })
    }
}
