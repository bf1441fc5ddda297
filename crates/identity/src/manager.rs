//! Identity hierarchy manager.
//!
//! ## Tenant bootstrap
//!
//! Strictly ordered; each step commits on its own and gates the next:
//!
//! 1. create the organization (name must be free)
//! 2. create its System Owner under the reserved login ID
//! 3. re-read the System Owner by organization name
//! 4. create the first Owner
//! 5. re-read the Owner by login ID
//! 6. create the public group
//! 7. add the Owner to the public group
//! 8. create the default space
//!
//! A failure aborts the remaining steps and reports the failing [`Step`].
//! Nothing is rolled back. [`IdentityHierarchyManager::repair_organization`]
//! re-runs steps 2–8 with find-or-create semantics for an organization whose
//! bootstrap stopped part-way.
//!
//! ## Student onboarding
//!
//! create app user → find public group → join it → create personal space →
//! grant the student `read` + `write` on that space.
//! [`IdentityHierarchyManager::repair_student`] re-runs the same steps with
//! find-or-create semantics.

use std::future::Future;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, instrument};

use quire_auth::{Action, Authorizer, PolicyStore, ResourceRef, RoleProvisioner, RoleTier};
use quire_core::{AppUserId, DomainResult, OpContext, OrganizationId};

use crate::admin::{Owner, Student, SystemAdmin, SystemOwner};
use crate::confirm::ConfirmationPolicy;
use crate::error::{AtStep, HierarchyError, Step};
use crate::model::{
    AppUser, DEFAULT_SPACE_KEY, DEFAULT_SPACE_NAME, LABEL_OWNER, LABEL_STUDENT, LABEL_SYSTEM_OWNER, NewAppUser,
    NewOrganization, NewSpace, Organization, OrganizationSetup, SYSTEM_OWNER_LOGIN_ID, SYSTEM_OWNER_USERNAME,
    Space, SpaceType, UserGroup, UserProfile,
};
use crate::repository::IdentityStores;

/// Everything a completed bootstrap produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrganizationBootstrap {
    pub organization: Organization,
    pub system_owner: SystemOwner,
    pub owner: Owner,
    pub public_group: UserGroup,
    pub default_space: Space,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StudentEnrollment {
    pub student: Student,
    pub personal_space: Space,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    /// Every create must succeed; duplicates are failures.
    Strict,
    /// Reuse what exists, create what is missing.
    Repair,
}

#[derive(Clone)]
pub struct IdentityHierarchyManager {
    stores: IdentityStores,
    provisioner: RoleProvisioner<Arc<dyn PolicyStore>>,
    confirmation: ConfirmationPolicy,
}

impl core::fmt::Debug for IdentityHierarchyManager {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("IdentityHierarchyManager")
            .field("stores", &self.stores)
            .field("confirmation", &self.confirmation)
            .finish_non_exhaustive()
    }
}

impl IdentityHierarchyManager {
    pub fn new(stores: IdentityStores, confirmation: ConfirmationPolicy) -> Self {
        let provisioner = RoleProvisioner::new(stores.policies.clone());
        Self {
            stores,
            provisioner,
            confirmation,
        }
    }

    pub fn stores(&self) -> &IdentityStores {
        &self.stores
    }

    pub fn provisioner(&self) -> &RoleProvisioner<Arc<dyn PolicyStore>> {
        &self.provisioner
    }

    pub fn authorizer(&self) -> Authorizer<Arc<dyn PolicyStore>> {
        Authorizer::new(self.stores.policies.clone())
    }

    // ─────────────────────────────────────────────────────────────────────
    // Tenant bootstrap
    // ─────────────────────────────────────────────────────────────────────

    #[instrument(skip_all, fields(organization = %setup.name), err)]
    pub async fn create_organization(
        &self,
        ctx: &OpContext,
        _admin: &SystemAdmin,
        setup: &OrganizationSetup,
    ) -> Result<OrganizationBootstrap, HierarchyError> {
        let setup = setup.normalized().at(Step::ValidateInput)?;

        let organization_id = self
            .step(
                ctx,
                Step::CreateOrganization,
                self.stores.organizations.create(&NewOrganization {
                    name: setup.name.clone(),
                }),
            )
            .await?;
        let organization = self
            .step(
                ctx,
                Step::CreateOrganization,
                self.stores.organizations.find_by_id(organization_id),
            )
            .await?;
        info!(%organization_id, "organization created");

        self.complete_bootstrap(ctx, organization, &setup.first_owner, Mode::Strict)
            .await
    }

    /// Finish the bootstrap of an existing organization, reusing whatever
    /// earlier attempts already created. Never creates the organization.
    #[instrument(skip_all, fields(organization = %setup.name), err)]
    pub async fn repair_organization(
        &self,
        ctx: &OpContext,
        _admin: &SystemAdmin,
        setup: &OrganizationSetup,
    ) -> Result<OrganizationBootstrap, HierarchyError> {
        let setup = setup.normalized().at(Step::ValidateInput)?;
        let organization = self
            .step(
                ctx,
                Step::FindOrganization,
                self.stores.organizations.find_by_name(&setup.name),
            )
            .await?;

        self.complete_bootstrap(ctx, organization, &setup.first_owner, Mode::Repair)
            .await
    }

    async fn complete_bootstrap(
        &self,
        ctx: &OpContext,
        organization: Organization,
        first_owner: &UserProfile,
        mode: Mode,
    ) -> Result<OrganizationBootstrap, HierarchyError> {
        let organization_id = organization.id;
        let app_users = &self.stores.app_users;

        let system_owner_row = NewAppUser {
            organization_id,
            login_id: SYSTEM_OWNER_LOGIN_ID.to_string(),
            username: SYSTEM_OWNER_USERNAME.to_string(),
            role_labels: vec![LABEL_SYSTEM_OWNER.to_string()],
        };
        self.ensure(
            ctx,
            Step::CreateSystemOwner,
            mode,
            app_users.find_by_login_id(organization_id, SYSTEM_OWNER_LOGIN_ID),
            app_users.create(&system_owner_row),
        )
        .await?;

        let system_owner = self.confirm_system_owner(ctx, &organization.name).await?;
        info!(%organization_id, system_owner_id = %system_owner.id(), "system owner ready");

        let owner_row = owner_row(organization_id, first_owner);
        self.ensure(
            ctx,
            Step::CreateOwner,
            mode,
            app_users.find_by_login_id(organization_id, &first_owner.login_id),
            app_users.create(&owner_row),
        )
        .await?;

        let owner = self
            .confirm_owner(ctx, organization_id, &first_owner.login_id)
            .await?;
        info!(%organization_id, owner_id = %owner.id(), "owner ready");

        let groups = &self.stores.groups;
        self.ensure(
            ctx,
            Step::CreatePublicGroup,
            mode,
            groups.find_public_group(organization_id),
            groups.create_public_group(organization_id),
        )
        .await?;
        let public_group = self
            .step(ctx, Step::CreatePublicGroup, groups.find_public_group(organization_id))
            .await?;

        self.step(
            ctx,
            Step::AddOwnerToPublicGroup,
            groups.add_member(public_group.id, owner.id()),
        )
        .await?;

        let default_space = self.ensure_default_space(ctx, organization_id, mode).await?;
        info!(%organization_id, default_space_id = %default_space.id, "organization bootstrap complete");

        Ok(OrganizationBootstrap {
            organization,
            system_owner,
            owner,
            public_group,
            default_space,
        })
    }

    // ─────────────────────────────────────────────────────────────────────
    // System Owner capabilities
    // ─────────────────────────────────────────────────────────────────────

    /// Create an additional Owner and add them to the public group.
    #[instrument(skip_all, fields(organization_id = %system_owner.organization_id()), err)]
    pub async fn create_owner(
        &self,
        ctx: &OpContext,
        system_owner: &SystemOwner,
        profile: &UserProfile,
    ) -> Result<Owner, HierarchyError> {
        let profile = profile.normalized().at(Step::ValidateInput)?;
        let organization_id = system_owner.organization_id();

        self.step(
            ctx,
            Step::CreateOwner,
            self.stores.app_users.create(&owner_row(organization_id, &profile)),
        )
        .await?;
        let owner = self
            .confirm_owner(ctx, organization_id, &profile.login_id)
            .await?;

        let public_group = self
            .step(
                ctx,
                Step::FindPublicGroup,
                self.stores.groups.find_public_group(organization_id),
            )
            .await?;
        self.step(
            ctx,
            Step::AddOwnerToPublicGroup,
            self.stores.groups.add_member(public_group.id, owner.id()),
        )
        .await?;

        info!(owner_id = %owner.id(), "owner created");
        Ok(owner)
    }

    /// Create the organization's default space. Fails with `AlreadyExists`
    /// if it is already there.
    pub async fn create_default_space(
        &self,
        ctx: &OpContext,
        system_owner: &SystemOwner,
    ) -> Result<Space, HierarchyError> {
        self.ensure_default_space(ctx, system_owner.organization_id(), Mode::Strict)
            .await
    }

    async fn ensure_default_space(
        &self,
        ctx: &OpContext,
        organization_id: OrganizationId,
        mode: Mode,
    ) -> Result<Space, HierarchyError> {
        let spaces = &self.stores.spaces;
        let row = NewSpace {
            organization_id,
            space_type: SpaceType::Default,
            key: DEFAULT_SPACE_KEY.to_string(),
            name: DEFAULT_SPACE_NAME.to_string(),
        };

        self.ensure(
            ctx,
            Step::CreateDefaultSpace,
            mode,
            spaces.find_by_type_and_key(organization_id, SpaceType::Default, DEFAULT_SPACE_KEY),
            spaces.create(&row),
        )
        .await?;

        self.step(
            ctx,
            Step::CreateDefaultSpace,
            spaces.find_by_type_and_key(organization_id, SpaceType::Default, DEFAULT_SPACE_KEY),
        )
        .await
    }

    // ─────────────────────────────────────────────────────────────────────
    // Owner capabilities
    // ─────────────────────────────────────────────────────────────────────

    #[instrument(skip_all, fields(organization_id = %owner.organization_id(), owner_id = %owner.id()), err)]
    pub async fn create_student(
        &self,
        ctx: &OpContext,
        owner: &Owner,
        profile: &UserProfile,
    ) -> Result<StudentEnrollment, HierarchyError> {
        self.enroll_student(ctx, owner, profile, Mode::Strict).await
    }

    /// Finish the enrollment of a student whose onboarding stopped part-way,
    /// reusing the existing app user and personal space. Creates whatever is
    /// missing, so it also enrolls a student that does not exist yet.
    #[instrument(skip_all, fields(organization_id = %owner.organization_id(), owner_id = %owner.id()), err)]
    pub async fn repair_student(
        &self,
        ctx: &OpContext,
        owner: &Owner,
        profile: &UserProfile,
    ) -> Result<StudentEnrollment, HierarchyError> {
        self.enroll_student(ctx, owner, profile, Mode::Repair).await
    }

    async fn enroll_student(
        &self,
        ctx: &OpContext,
        owner: &Owner,
        profile: &UserProfile,
        mode: Mode,
    ) -> Result<StudentEnrollment, HierarchyError> {
        let profile = profile.normalized().at(Step::ValidateInput)?;
        let organization_id = owner.organization_id();
        let app_users = &self.stores.app_users;

        let student_row = NewAppUser {
            organization_id,
            login_id: profile.login_id.clone(),
            username: profile.username.clone(),
            role_labels: vec![LABEL_STUDENT.to_string()],
        };
        self.ensure(
            ctx,
            Step::CreateStudent,
            mode,
            app_users.find_by_login_id(organization_id, &profile.login_id),
            app_users.create(&student_row),
        )
        .await?;
        let student = self
            .step(
                ctx,
                Step::CreateStudent,
                app_users.find_by_login_id(organization_id, &profile.login_id),
            )
            .await
            .and_then(|user| Student::try_from(user).at(Step::CreateStudent))?;
        let student_id = student.id();

        let public_group = self
            .step(
                ctx,
                Step::FindPublicGroup,
                self.stores.groups.find_public_group(organization_id),
            )
            .await?;
        self.step(
            ctx,
            Step::AddStudentToPublicGroup,
            self.stores.groups.add_member(public_group.id, student_id),
        )
        .await?;

        let spaces = &self.stores.spaces;
        let key = Space::personal_key(student_id);
        let space_row = NewSpace {
            organization_id,
            space_type: SpaceType::Personal,
            key: key.clone(),
            name: format!("{}'s space", profile.username),
        };
        self.ensure(
            ctx,
            Step::CreatePersonalSpace,
            mode,
            spaces.find_by_type_and_key(organization_id, SpaceType::Personal, &key),
            spaces.create(&space_row),
        )
        .await?;
        let personal_space = self
            .step(
                ctx,
                Step::CreatePersonalSpace,
                spaces.find_by_type_and_key(organization_id, SpaceType::Personal, &key),
            )
            .await?;
        debug!(space_id = %personal_space.id, "personal space ready");

        // Tuple writes are idempotent, so repair simply re-grants.
        self.provisioner
            .grant_actions(
                ctx,
                &ResourceRef::space(personal_space.id),
                RoleTier::Writer,
                &student.subject(),
                &[Action::READ, Action::WRITE],
            )
            .await
            .at(Step::ProvisionPersonalSpace)?;

        info!(%student_id, "student onboarded");
        Ok(StudentEnrollment {
            student,
            personal_space,
        })
    }

    // ─────────────────────────────────────────────────────────────────────
    // Lookups
    // ─────────────────────────────────────────────────────────────────────

    pub async fn find_system_owner(&self, organization_name: &str) -> DomainResult<SystemOwner> {
        SystemOwner::try_from(self.lookup_system_owner(organization_name).await?)
    }

    pub async fn find_owner(&self, organization_id: OrganizationId, login_id: &str) -> DomainResult<Owner> {
        let user = self
            .stores
            .app_users
            .find_by_login_id(organization_id, login_id)
            .await?;
        Owner::try_from(user)
    }

    pub async fn find_student(&self, organization_id: OrganizationId, login_id: &str) -> DomainResult<Student> {
        let user = self
            .stores
            .app_users
            .find_by_login_id(organization_id, login_id)
            .await?;
        Student::try_from(user)
    }

    pub async fn find_default_space(&self, organization_id: OrganizationId) -> DomainResult<Space> {
        self.stores
            .spaces
            .find_by_type_and_key(organization_id, SpaceType::Default, DEFAULT_SPACE_KEY)
            .await
    }

    pub async fn find_personal_space(&self, organization_id: OrganizationId, user_id: AppUserId) -> DomainResult<Space> {
        self.stores
            .spaces
            .find_by_type_and_key(organization_id, SpaceType::Personal, &Space::personal_key(user_id))
            .await
    }

    // ─────────────────────────────────────────────────────────────────────
    // Step plumbing
    // ─────────────────────────────────────────────────────────────────────

    async fn lookup_system_owner(&self, organization_name: &str) -> DomainResult<AppUser> {
        let organization = self.stores.organizations.find_by_name(organization_name).await?;
        self.stores
            .app_users
            .find_by_login_id(organization.id, SYSTEM_OWNER_LOGIN_ID)
            .await
    }

    async fn confirm_system_owner(&self, ctx: &OpContext, organization_name: &str) -> Result<SystemOwner, HierarchyError> {
        let user = self
            .step(
                ctx,
                Step::ConfirmSystemOwner,
                self.confirmation
                    .confirm("system owner", || self.lookup_system_owner(organization_name)),
            )
            .await?;
        SystemOwner::try_from(user).at(Step::ConfirmSystemOwner)
    }

    async fn confirm_owner(
        &self,
        ctx: &OpContext,
        organization_id: OrganizationId,
        login_id: &str,
    ) -> Result<Owner, HierarchyError> {
        let app_users = &self.stores.app_users;
        let user = self
            .step(
                ctx,
                Step::ConfirmOwner,
                self.confirmation
                    .confirm("owner", || app_users.find_by_login_id(organization_id, login_id)),
            )
            .await?;
        Owner::try_from(user).at(Step::ConfirmOwner)
    }

    /// Run one store call under the context and tag any failure with `step`.
    async fn step<T>(
        &self,
        ctx: &OpContext,
        step: Step,
        fut: impl Future<Output = DomainResult<T>>,
    ) -> Result<T, HierarchyError> {
        ctx.run(fut).await.at(step)?.at(step)
    }

    /// Create a record; in repair mode, first reuse an existing one.
    async fn ensure<R, I>(
        &self,
        ctx: &OpContext,
        step: Step,
        mode: Mode,
        find: impl Future<Output = DomainResult<R>>,
        create: impl Future<Output = DomainResult<I>>,
    ) -> Result<(), HierarchyError> {
        if mode == Mode::Repair {
            match ctx.run(find).await.at(step)? {
                Ok(_) => {
                    debug!(%step, "already present, reusing");
                    return Ok(());
                }
                Err(e) if e.is_not_found() => {}
                Err(e) => return Err(HierarchyError::new(step, e)),
            }
        }

        match ctx.run(create).await.at(step)? {
            Ok(_) => Ok(()),
            // Lost a race with a concurrent repair.
            Err(e) if mode == Mode::Repair && e.is_already_exists() => Ok(()),
            Err(e) => Err(HierarchyError::new(step, e)),
        }
    }
}

fn owner_row(organization_id: OrganizationId, profile: &UserProfile) -> NewAppUser {
    NewAppUser {
        organization_id,
        login_id: profile.login_id.clone(),
        username: profile.username.clone(),
        role_labels: vec![LABEL_OWNER.to_string()],
    }
}
