//! `quire-auth` — resource-scoped authorization engine.
//!
//! Roles, objects and subjects are derived per resource rather than declared
//! up front. Every authorization question loads only the policy slice that
//! touches the candidate roles and subject, compiles it into a fresh
//! [`Enforcer`], and evaluates the requested actions against it.
//!
//! This crate is decoupled from HTTP and from concrete storage.

pub mod action;
pub mod authorize;
pub mod enforcer;
pub mod provision;
pub mod resource;
pub mod roles;
pub mod store;
pub mod subject;

pub use action::Action;
pub use authorize::{evaluate, Authorizer, AuthzError, PrivilegeSet};
pub use enforcer::{Decision, Enforcer, EnforcerBuilder};
pub use provision::{ProvisionError, ProvisionStep, RoleProvisioner};
pub use resource::{Object, ResourceKind, ResourceRef};
pub use roles::{Role, RoleTier};
pub use store::{GroupingRule, InMemoryPolicyStore, PolicyFilter, PolicyRule, PolicySnapshot, PolicyStore};
pub use subject::Subject;
