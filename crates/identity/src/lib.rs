//! `quire-identity` — tenant identity hierarchy.
//!
//! Each organization has one System Owner, one or more Owners, and ordinary
//! app users ("students"). The [`IdentityHierarchyManager`] bootstraps an
//! organization step by step and onboards students, wiring each new identity
//! into spaces, the public group and the authorization engine.

pub mod admin;
pub mod confirm;
pub mod error;
pub mod manager;
pub mod model;
pub mod repository;

pub use admin::{Owner, Student, SystemAdmin, SystemOwner};
pub use confirm::ConfirmationPolicy;
pub use error::{HierarchyError, Step, StepFailure};
pub use manager::{IdentityHierarchyManager, OrganizationBootstrap, StudentEnrollment};
pub use model::{
    AppUser, NewAppUser, NewOrganization, NewSpace, Organization, OrganizationSetup, Space, SpaceType,
    UserGroup, UserProfile,
};
pub use repository::{
    AppUserRepository, GroupRepository, IdentityStores, OrganizationRepository, SpaceRepository,
};
