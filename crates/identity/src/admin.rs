//! Principals of the identity hierarchy.
//!
//! `SystemOwner`, `Owner` and `Student` decorate an [`AppUser`] whose role
//! labels prove the tier. The hierarchy manager takes them as the acting
//! principal, so only a System Owner can create Owners and only an Owner can
//! create Students.

use serde::Serialize;

use quire_auth::Subject;
use quire_core::{AppUserId, DomainError, OrganizationId};

use crate::model::{AppUser, LABEL_OWNER, LABEL_STUDENT, LABEL_SYSTEM_OWNER};

/// The one principal allowed to create organizations. Not organization-scoped.
///
/// Construct it once at process start and pass it to whatever needs it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SystemAdmin {
    id: AppUserId,
}

impl SystemAdmin {
    pub const ID: AppUserId = AppUserId::new(1);

    pub fn new() -> Self {
        Self { id: Self::ID }
    }

    pub fn id(&self) -> AppUserId {
        self.id
    }

    pub fn subject(&self) -> Subject {
        Subject::for_user(self.id)
    }
}

impl Default for SystemAdmin {
    fn default() -> Self {
        Self::new()
    }
}

macro_rules! labeled_user {
    ($(#[$meta:meta])* $t:ident, $label:expr) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Serialize)]
        #[serde(transparent)]
        pub struct $t(AppUser);

        impl $t {
            pub fn id(&self) -> AppUserId {
                self.0.id
            }

            pub fn organization_id(&self) -> OrganizationId {
                self.0.organization_id
            }

            pub fn login_id(&self) -> &str {
                &self.0.login_id
            }

            pub fn user(&self) -> &AppUser {
                &self.0
            }

            pub fn subject(&self) -> Subject {
                Subject::for_user(self.0.id)
            }

            pub fn into_inner(self) -> AppUser {
                self.0
            }
        }

        impl TryFrom<AppUser> for $t {
            type Error = DomainError;

            fn try_from(user: AppUser) -> Result<Self, Self::Error> {
                if user.has_label($label) {
                    Ok(Self(user))
                } else {
                    Err(DomainError::validation(format!(
                        "app user '{}' is not labeled '{}'",
                        user.login_id, $label
                    )))
                }
            }
        }
    };
}

labeled_user!(
    /// Per-organization administrative identity with a reserved login ID.
    SystemOwner,
    LABEL_SYSTEM_OWNER
);

labeled_user!(
    /// Human tenant administrator.
    Owner,
    LABEL_OWNER
);

labeled_user!(
    /// Ordinary end user.
    Student,
    LABEL_STUDENT
);
