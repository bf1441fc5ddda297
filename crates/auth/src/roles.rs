use std::borrow::Cow;

use serde::{Deserialize, Serialize};

/// Role identifier used for resource-scoped RBAC.
///
/// Roles are opaque strings and are never declared up front: a role exists as
/// soon as a policy or grouping tuple names it. Use
/// [`ResourceRef::role`](crate::ResourceRef::role) to derive one.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Role(Cow<'static, str>);

impl Role {
    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for Role {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Capability tier provisioned per protected resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoleTier {
    Writer,
    Reader,
}

impl RoleTier {
    pub const ALL: [RoleTier; 2] = [RoleTier::Writer, RoleTier::Reader];

    pub fn suffix(self) -> &'static str {
        match self {
            RoleTier::Writer => "writer",
            RoleTier::Reader => "reader",
        }
    }
}

impl core::fmt::Display for RoleTier {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.suffix())
    }
}
