//! Protected resources and the names derived from them.

use std::borrow::Cow;

use serde::{Deserialize, Serialize};

use quire_core::{SpaceId, WorkbookId};

use crate::{Role, RoleTier};

/// Kind prefix of a protected resource (e.g. `"workbook"`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceKind(Cow<'static, str>);

impl ResourceKind {
    pub const WORKBOOK: ResourceKind = ResourceKind(Cow::Borrowed("workbook"));
    pub const SPACE: ResourceKind = ResourceKind(Cow::Borrowed("space"));

    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier of a protected resource in the authorization model.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Object(String);

impl Object {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for Object {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A `(kind, id)` pair from which object and role names are derived.
///
/// Derivation is pure and deterministic:
/// - object: `<kind>_<id>`
/// - role:   `<kind>_<id>_<tier>`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceRef {
    pub kind: ResourceKind,
    pub id: i64,
}

impl ResourceRef {
    pub fn new(kind: ResourceKind, id: i64) -> Self {
        Self { kind, id }
    }

    pub fn workbook(id: WorkbookId) -> Self {
        Self::new(ResourceKind::WORKBOOK, id.value())
    }

    pub fn space(id: SpaceId) -> Self {
        Self::new(ResourceKind::SPACE, id.value())
    }

    pub fn object(&self) -> Object {
        Object(format!("{}_{}", self.kind, self.id))
    }

    pub fn role(&self, tier: RoleTier) -> Role {
        Role::new(format!("{}_{}_{}", self.kind, self.id, tier.suffix()))
    }

    pub fn writer_role(&self) -> Role {
        self.role(RoleTier::Writer)
    }

    pub fn reader_role(&self) -> Role {
        self.role(RoleTier::Reader)
    }

    /// Roles that can carry policy on this resource's object.
    pub fn candidate_roles(&self) -> Vec<Role> {
        RoleTier::ALL.iter().map(|tier| self.role(*tier)).collect()
    }
}

impl core::fmt::Display for ResourceRef {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}_{}", self.kind, self.id)
    }
}
