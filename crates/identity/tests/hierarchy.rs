use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use quire_auth::{Action, InMemoryPolicyStore, ResourceRef, Subject};
use quire_core::{AppUserId, DomainError, DomainResult, OpContext, OrganizationId, SpaceId, WorkbookId};
use quire_identity::model::{LABEL_OWNER, LABEL_SYSTEM_OWNER, SYSTEM_OWNER_LOGIN_ID};
use quire_identity::repository::{InMemoryAppUsers, InMemoryGroups, InMemoryOrganizations, InMemorySpaces};
use quire_identity::{
    AppUser, AppUserRepository, ConfirmationPolicy, GroupRepository, IdentityHierarchyManager, IdentityStores,
    NewAppUser, NewSpace, OrganizationRepository, OrganizationSetup, Space, SpaceRepository, SpaceType, Step,
    SystemAdmin, UserProfile,
};
use tokio_util::sync::CancellationToken;

/// Fails `create` for users carrying `label` while `failing` is set.
struct FaultyAppUsers {
    inner: Arc<InMemoryAppUsers>,
    label: &'static str,
    failing: AtomicBool,
}

impl FaultyAppUsers {
    fn heal(&self) {
        self.failing.store(false, Ordering::SeqCst);
    }
}

#[async_trait::async_trait]
impl AppUserRepository for FaultyAppUsers {
    async fn find_by_id(&self, organization_id: OrganizationId, id: AppUserId) -> DomainResult<AppUser> {
        self.inner.find_by_id(organization_id, id).await
    }

    async fn find_by_login_id(&self, organization_id: OrganizationId, login_id: &str) -> DomainResult<AppUser> {
        self.inner.find_by_login_id(organization_id, login_id).await
    }

    async fn create(&self, input: &NewAppUser) -> DomainResult<AppUserId> {
        if self.failing.load(Ordering::SeqCst) && input.role_labels.iter().any(|l| l == self.label) {
            return Err(DomainError::storage("injected write failure"));
        }
        self.inner.create(input).await
    }
}

/// Reads by login ID miss `misses` times before the row becomes visible.
struct LaggingAppUsers {
    inner: InMemoryAppUsers,
    misses: AtomicUsize,
}

#[async_trait::async_trait]
impl AppUserRepository for LaggingAppUsers {
    async fn find_by_id(&self, organization_id: OrganizationId, id: AppUserId) -> DomainResult<AppUser> {
        self.inner.find_by_id(organization_id, id).await
    }

    async fn find_by_login_id(&self, organization_id: OrganizationId, login_id: &str) -> DomainResult<AppUser> {
        let left = self.misses.load(Ordering::SeqCst);
        if left > 0 {
            self.misses.store(left - 1, Ordering::SeqCst);
            return Err(DomainError::not_found(format!("app user '{login_id}'")));
        }
        self.inner.find_by_login_id(organization_id, login_id).await
    }

    async fn create(&self, input: &NewAppUser) -> DomainResult<AppUserId> {
        self.inner.create(input).await
    }
}

/// The first personal-space create fails; everything else passes through.
struct FlakySpaces {
    inner: Arc<InMemorySpaces>,
    tripped: AtomicBool,
}

#[async_trait::async_trait]
impl SpaceRepository for FlakySpaces {
    async fn find_by_type_and_key(
        &self,
        organization_id: OrganizationId,
        space_type: SpaceType,
        key: &str,
    ) -> DomainResult<Space> {
        self.inner.find_by_type_and_key(organization_id, space_type, key).await
    }

    async fn create(&self, input: &NewSpace) -> DomainResult<SpaceId> {
        if input.space_type == SpaceType::Personal && !self.tripped.swap(true, Ordering::SeqCst) {
            return Err(DomainError::storage("transient"));
        }
        self.inner.create(input).await
    }
}

/// Space creation never completes.
struct StalledSpaces;

#[async_trait::async_trait]
impl SpaceRepository for StalledSpaces {
    async fn find_by_type_and_key(&self, _: OrganizationId, _: SpaceType, key: &str) -> DomainResult<Space> {
        Err(DomainError::not_found(format!("space '{key}'")))
    }

    async fn create(&self, _: &NewSpace) -> DomainResult<SpaceId> {
        std::future::pending().await
    }
}

struct Fixture {
    manager: IdentityHierarchyManager,
    organizations: Arc<InMemoryOrganizations>,
    app_users: Arc<InMemoryAppUsers>,
    spaces: Arc<InMemorySpaces>,
    groups: Arc<InMemoryGroups>,
    policies: Arc<InMemoryPolicyStore>,
}

impl Fixture {
    fn new() -> Self {
        let app_users = Arc::new(InMemoryAppUsers::new());
        Self::with_users(app_users.clone(), app_users)
    }

    fn faulty(label: &'static str) -> (Self, Arc<FaultyAppUsers>) {
        let app_users = Arc::new(InMemoryAppUsers::new());
        let wrapper = Arc::new(FaultyAppUsers {
            inner: app_users.clone(),
            label,
            failing: AtomicBool::new(true),
        });
        (Self::with_users(app_users, wrapper.clone()), wrapper)
    }

    fn with_users(app_users: Arc<InMemoryAppUsers>, repo: Arc<dyn AppUserRepository>) -> Self {
        let organizations = Arc::new(InMemoryOrganizations::new());
        let spaces = Arc::new(InMemorySpaces::new());
        let groups = Arc::new(InMemoryGroups::new());
        let policies = Arc::new(InMemoryPolicyStore::new());

        let stores = IdentityStores {
            organizations: organizations.clone(),
            app_users: repo,
            spaces: spaces.clone(),
            groups: groups.clone(),
            policies: policies.clone(),
        };

        Self {
            manager: IdentityHierarchyManager::new(stores, ConfirmationPolicy::immediate()),
            organizations,
            app_users,
            spaces,
            groups,
            policies,
        }
    }
}

fn org1() -> OrganizationSetup {
    OrganizationSetup::new("ORG1", UserProfile::new("OWNER1", "Owner One"))
}

fn ctx() -> OpContext {
    OpContext::background()
}

#[tokio::test]
async fn bootstrap_builds_the_full_hierarchy() {
    let fx = Fixture::new();
    let boot = fx
        .manager
        .create_organization(&ctx(), &SystemAdmin::new(), &org1())
        .await
        .unwrap();

    assert_eq!(boot.organization.name, "ORG1");
    assert_eq!(boot.system_owner.login_id(), SYSTEM_OWNER_LOGIN_ID);
    assert!(boot.system_owner.user().has_label(LABEL_SYSTEM_OWNER));
    assert_eq!(boot.owner.login_id(), "OWNER1");
    assert!(boot.owner.user().has_label(LABEL_OWNER));
    assert_eq!(boot.default_space.space_type, SpaceType::Default);

    let org = boot.organization.id;
    assert!(fx.groups.is_member(boot.public_group.id, boot.owner.id()).await.unwrap());
    assert_eq!(fx.app_users.count(org), 2);
    assert_eq!(fx.groups.group_count(org), 1);
    assert_eq!(fx.spaces.count(org), 1);

    assert_eq!(fx.manager.find_default_space(org).await.unwrap(), boot.default_space);
    assert_eq!(boot.default_space.key, "default");

    let resolved = fx.manager.find_system_owner("ORG1").await.unwrap();
    assert_eq!(resolved, boot.system_owner);
    assert_eq!(fx.manager.find_owner(org, "OWNER1").await.unwrap(), boot.owner);
}

#[tokio::test]
async fn duplicate_organization_is_rejected_without_side_effects() {
    let fx = Fixture::new();
    let admin = SystemAdmin::new();
    let first = fx.manager.create_organization(&ctx(), &admin, &org1()).await.unwrap();

    let again = OrganizationSetup::new("ORG1", UserProfile::new("OWNER2", "Owner Two"));
    let err = fx
        .manager
        .create_organization(&ctx(), &admin, &again)
        .await
        .unwrap_err();

    assert_eq!(err.step, Step::CreateOrganization);
    assert!(err.is_already_exists());

    let org = first.organization.id;
    assert_eq!(fx.organizations.find_by_name("ORG1").await.unwrap(), first.organization);
    assert_eq!(fx.app_users.count(org), 2);
    assert!(fx.manager.find_owner(org, "OWNER2").await.unwrap_err().is_not_found());
}

#[tokio::test]
async fn system_owner_failure_stops_the_bootstrap() {
    let (fx, _faulty) = Fixture::faulty(LABEL_SYSTEM_OWNER);
    let err = fx
        .manager
        .create_organization(&ctx(), &SystemAdmin::new(), &org1())
        .await
        .unwrap_err();

    assert_eq!(err.step, Step::CreateSystemOwner);

    // The organization row stays; nothing after it was written.
    let org = fx.organizations.find_by_name("ORG1").await.unwrap().id;
    assert_eq!(fx.app_users.count(org), 0);
    assert_eq!(fx.groups.group_count(org), 0);
    assert_eq!(fx.spaces.count(org), 0);
}

#[tokio::test]
async fn owner_failure_keeps_earlier_steps() {
    let (fx, _faulty) = Fixture::faulty(LABEL_OWNER);
    let err = fx
        .manager
        .create_organization(&ctx(), &SystemAdmin::new(), &org1())
        .await
        .unwrap_err();

    assert_eq!(err.step, Step::CreateOwner);

    let org = fx.organizations.find_by_name("ORG1").await.unwrap().id;
    assert!(fx.manager.find_system_owner("ORG1").await.is_ok());
    assert_eq!(fx.app_users.count(org), 1);
    assert_eq!(fx.groups.group_count(org), 0);
    assert_eq!(fx.spaces.count(org), 0);
}

#[tokio::test]
async fn repair_finishes_a_partial_bootstrap_and_is_idempotent() {
    let (fx, faulty) = Fixture::faulty(LABEL_OWNER);
    let admin = SystemAdmin::new();
    fx.manager
        .create_organization(&ctx(), &admin, &org1())
        .await
        .unwrap_err();

    faulty.heal();
    let repaired = fx.manager.repair_organization(&ctx(), &admin, &org1()).await.unwrap();
    let again = fx.manager.repair_organization(&ctx(), &admin, &org1()).await.unwrap();
    assert_eq!(repaired, again);

    let org = repaired.organization.id;
    assert_eq!(fx.app_users.count(org), 2);
    assert_eq!(fx.groups.group_count(org), 1);
    assert_eq!(fx.spaces.count(org), 1);
    assert!(fx.groups.is_member(repaired.public_group.id, repaired.owner.id()).await.unwrap());
}

#[tokio::test]
async fn repair_never_creates_the_organization() {
    let fx = Fixture::new();
    let err = fx
        .manager
        .repair_organization(&ctx(), &SystemAdmin::new(), &org1())
        .await
        .unwrap_err();

    assert_eq!(err.step, Step::FindOrganization);
    assert!(err.is_not_found());
}

#[tokio::test]
async fn confirmation_waits_for_lagging_reads() {
    let mut stores = IdentityStores::in_memory();
    stores.app_users = Arc::new(LaggingAppUsers {
        inner: InMemoryAppUsers::new(),
        misses: AtomicUsize::new(3),
    });
    let policy = ConfirmationPolicy {
        initial_interval: Duration::from_millis(1),
        max_interval: Duration::from_millis(5),
        max_elapsed: Duration::from_secs(2),
    };
    let manager = IdentityHierarchyManager::new(stores, policy);

    let boot = manager
        .create_organization(&ctx(), &SystemAdmin::new(), &org1())
        .await
        .unwrap();
    assert_eq!(boot.owner.login_id(), "OWNER1");
}

#[tokio::test]
async fn lagging_reads_without_retry_fail_at_confirmation() {
    let mut stores = IdentityStores::in_memory();
    stores.app_users = Arc::new(LaggingAppUsers {
        inner: InMemoryAppUsers::new(),
        misses: AtomicUsize::new(1),
    });
    let manager = IdentityHierarchyManager::new(stores, ConfirmationPolicy::immediate());

    let err = manager
        .create_organization(&ctx(), &SystemAdmin::new(), &org1())
        .await
        .unwrap_err();
    assert_eq!(err.step, Step::ConfirmSystemOwner);
    assert!(err.is_not_found());
}

#[tokio::test]
async fn deadline_reports_the_step_in_flight() {
    let mut stores = IdentityStores::in_memory();
    stores.spaces = Arc::new(StalledSpaces);
    let manager = IdentityHierarchyManager::new(stores, ConfirmationPolicy::immediate());

    let ctx = OpContext::background().with_timeout(Duration::from_millis(100));
    let err = manager
        .create_organization(&ctx, &SystemAdmin::new(), &org1())
        .await
        .unwrap_err();

    assert_eq!(err.step, Step::CreateDefaultSpace);
    assert!(err.is_interrupted());
}

#[tokio::test]
async fn cancelled_context_writes_nothing() {
    let fx = Fixture::new();
    let token = CancellationToken::new();
    token.cancel();
    let ctx = OpContext::background().with_cancellation(token);

    let err = fx
        .manager
        .create_organization(&ctx, &SystemAdmin::new(), &org1())
        .await
        .unwrap_err();

    assert_eq!(err.step, Step::CreateOrganization);
    assert!(err.is_interrupted());
    assert!(fx.organizations.find_by_name("ORG1").await.unwrap_err().is_not_found());
}

#[tokio::test]
async fn invalid_input_is_rejected_before_any_write() {
    let fx = Fixture::new();
    let reserved = OrganizationSetup::new("ORG1", UserProfile::new(SYSTEM_OWNER_LOGIN_ID, "Sneaky"));
    let err = fx
        .manager
        .create_organization(&ctx(), &SystemAdmin::new(), &reserved)
        .await
        .unwrap_err();

    assert_eq!(err.step, Step::ValidateInput);
    assert!(fx.organizations.find_by_name("ORG1").await.is_err());
}

#[tokio::test]
async fn student_gets_a_private_personal_space() {
    let fx = Fixture::new();
    let boot = fx
        .manager
        .create_organization(&ctx(), &SystemAdmin::new(), &org1())
        .await
        .unwrap();

    let enrolled = fx
        .manager
        .create_student(&ctx(), &boot.owner, &UserProfile::new("STUDENT1", "Student One"))
        .await
        .unwrap();

    let student = &enrolled.student;
    assert_eq!(enrolled.personal_space.space_type, SpaceType::Personal);
    assert_eq!(enrolled.personal_space.key, Space::personal_key(student.id()));
    assert!(fx.groups.is_member(boot.public_group.id, student.id()).await.unwrap());
    assert_eq!(
        fx.manager
            .find_personal_space(boot.organization.id, student.id())
            .await
            .unwrap(),
        enrolled.personal_space
    );

    // One tuple per granted action, one role binding.
    assert_eq!(fx.policies.policy_count(), 2);
    assert_eq!(fx.policies.grouping_count(), 1);

    let authz = fx.manager.authorizer();
    let space = ResourceRef::space(enrolled.personal_space.id);
    authz.check(&ctx(), &student.subject(), &space, &Action::READ).await.unwrap();
    authz.check(&ctx(), &student.subject(), &space, &Action::WRITE).await.unwrap();

    let err = authz
        .check(&ctx(), &student.subject(), &space, &Action::REMOVE)
        .await
        .unwrap_err();
    assert!(err.is_permission_denied());

    let err = authz
        .check(&ctx(), &boot.owner.subject(), &space, &Action::READ)
        .await
        .unwrap_err();
    assert!(err.is_permission_denied());
}

#[tokio::test]
async fn duplicate_student_login_fails_at_creation() {
    let fx = Fixture::new();
    let boot = fx
        .manager
        .create_organization(&ctx(), &SystemAdmin::new(), &org1())
        .await
        .unwrap();

    let profile = UserProfile::new("STUDENT1", "Student One");
    fx.manager.create_student(&ctx(), &boot.owner, &profile).await.unwrap();
    let err = fx
        .manager
        .create_student(&ctx(), &boot.owner, &profile)
        .await
        .unwrap_err();

    assert_eq!(err.step, Step::CreateStudent);
    assert!(err.is_already_exists());
    assert_eq!(fx.spaces.count(boot.organization.id), 2);
}

#[tokio::test]
async fn system_owner_adds_owners_to_the_public_group() {
    let fx = Fixture::new();
    let boot = fx
        .manager
        .create_organization(&ctx(), &SystemAdmin::new(), &org1())
        .await
        .unwrap();

    let owner2 = fx
        .manager
        .create_owner(&ctx(), &boot.system_owner, &UserProfile::new("OWNER2", "Owner Two"))
        .await
        .unwrap();
    assert!(fx.groups.is_member(boot.public_group.id, owner2.id()).await.unwrap());

    let err = fx
        .manager
        .create_default_space(&ctx(), &boot.system_owner)
        .await
        .unwrap_err();
    assert_eq!(err.step, Step::CreateDefaultSpace);
    assert!(err.is_already_exists());
}

#[tokio::test]
async fn workbook_owner_has_full_control_and_others_nothing() {
    let fx = Fixture::new();
    let workbook = ResourceRef::workbook(WorkbookId::new(42));
    let user7 = Subject::for_user(AppUserId::new(7));
    let user8 = Subject::for_user(AppUserId::new(8));

    fx.manager
        .provisioner()
        .grant_full_control(&ctx(), &workbook, &user7)
        .await
        .unwrap();

    let authz = fx.manager.authorizer();
    authz.check(&ctx(), &user7, &workbook, &Action::READ).await.unwrap();

    let granted = authz
        .privileges(&ctx(), &user7, &workbook, &Action::full_control())
        .await
        .unwrap();
    assert_eq!(granted.len(), 3);

    let err = authz.check(&ctx(), &user8, &workbook, &Action::READ).await.unwrap_err();
    assert!(err.is_permission_denied());
}

#[tokio::test]
async fn repair_treats_a_concurrent_insert_as_success() {
    let app_users = Arc::new(LaggingAppUsers {
        inner: InMemoryAppUsers::new(),
        misses: AtomicUsize::new(0),
    });
    let mut stores = IdentityStores::in_memory();
    stores.app_users = app_users.clone();
    let manager = IdentityHierarchyManager::new(stores, ConfirmationPolicy::immediate());
    let admin = SystemAdmin::new();

    let boot = manager.create_organization(&ctx(), &admin, &org1()).await.unwrap();

    // The existence check misses, so the create runs and finds the row taken.
    app_users.misses.store(1, Ordering::SeqCst);
    let repaired = manager.repair_organization(&ctx(), &admin, &org1()).await.unwrap();
    assert_eq!(repaired, boot);
}

#[tokio::test]
async fn stranded_student_is_finished_by_repair() {
    let inner = Arc::new(InMemorySpaces::new());
    let policies = Arc::new(InMemoryPolicyStore::new());
    let mut stores = IdentityStores::in_memory();
    stores.spaces = Arc::new(FlakySpaces {
        inner: inner.clone(),
        tripped: AtomicBool::new(false),
    });
    stores.policies = policies.clone();
    let manager = IdentityHierarchyManager::new(stores, ConfirmationPolicy::immediate());

    let boot = manager
        .create_organization(&ctx(), &SystemAdmin::new(), &org1())
        .await
        .unwrap();
    let org = boot.organization.id;
    let profile = UserProfile::new("STUDENT1", "Student One");

    let err = manager.create_student(&ctx(), &boot.owner, &profile).await.unwrap_err();
    assert_eq!(err.step, Step::CreatePersonalSpace);

    // The user row committed, so a plain retry collides with it.
    let stranded = manager.find_student(org, "STUDENT1").await.unwrap();
    assert!(manager.find_personal_space(org, stranded.id()).await.unwrap_err().is_not_found());
    let err = manager.create_student(&ctx(), &boot.owner, &profile).await.unwrap_err();
    assert_eq!(err.step, Step::CreateStudent);
    assert!(err.is_already_exists());

    let enrolled = manager.repair_student(&ctx(), &boot.owner, &profile).await.unwrap();
    assert_eq!(enrolled.student, stranded);
    assert_eq!(
        manager.find_personal_space(org, stranded.id()).await.unwrap(),
        enrolled.personal_space
    );

    let again = manager.repair_student(&ctx(), &boot.owner, &profile).await.unwrap();
    assert_eq!(again, enrolled);
    assert_eq!(inner.count(org), 2);
    assert_eq!(policies.policy_count(), 2);
    assert_eq!(policies.grouping_count(), 1);

    let authz = manager.authorizer();
    let space = ResourceRef::space(enrolled.personal_space.id);
    authz.check(&ctx(), &stranded.subject(), &space, &Action::READ).await.unwrap();
    authz.check(&ctx(), &stranded.subject(), &space, &Action::WRITE).await.unwrap();
}

#[tokio::test]
async fn concurrent_student_repairs_converge() {
    let fx = Fixture::new();
    let boot = fx
        .manager
        .create_organization(&ctx(), &SystemAdmin::new(), &org1())
        .await
        .unwrap();
    let profile = UserProfile::new("STUDENT1", "Student One");

    let (ctx_a, ctx_b) = (ctx(), ctx());
    let (a, b) = tokio::join!(
        fx.manager.repair_student(&ctx_a, &boot.owner, &profile),
        fx.manager.repair_student(&ctx_b, &boot.owner, &profile),
    );
    let (a, b) = (a.unwrap(), b.unwrap());
    assert_eq!(a, b);

    let org = boot.organization.id;
    assert_eq!(fx.app_users.count(org), 3);
    assert_eq!(fx.spaces.count(org), 2);
    assert_eq!(fx.policies.policy_count(), 2);
    assert_eq!(fx.policies.grouping_count(), 1);
}

#[test]
fn manager_debug_omits_store_internals() {
    let fx = Fixture::new();
    let rendered = format!("{:?}", fx.manager);
    assert!(rendered.starts_with("IdentityHierarchyManager"));
    assert!(rendered.contains("confirmation"));
}
