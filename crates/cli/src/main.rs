//! `quire-admin`: operator commands for tenant bootstrap and authorization.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::Serialize;
use tracing::info;

use quire_auth::{Action, Decision, ResourceRef, Subject};
use quire_core::{AppUserId, OpContext, SpaceId, WorkbookId};
use quire_identity::{IdentityHierarchyManager, OrganizationSetup, SystemAdmin, UserProfile};
use quire_infra::{PostgresStores, Settings, connect, migrate};

#[derive(Parser)]
#[command(name = "quire-admin", author, version, about, long_about = None)]
struct Cli {
    /// Path to the configuration file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Abort the command after this many seconds
    #[arg(long, value_name = "SECS", default_value_t = 30)]
    timeout: u64,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or update the database schema
    Migrate,

    /// Create an organization with its System Owner, first Owner, public group and default space
    Bootstrap(TenantArgs),

    /// Finish a bootstrap that stopped part-way
    Repair(TenantArgs),

    /// Create an additional Owner
    AddOwner {
        #[arg(long)]
        organization: String,

        #[command(flatten)]
        profile: ProfileArgs,
    },

    /// Create a student with a personal space
    AddStudent {
        #[arg(long)]
        organization: String,

        /// Login ID of the acting Owner
        #[arg(long, value_name = "LOGIN")]
        owner: String,

        /// Finish an enrollment that stopped part-way, reusing what exists
        #[arg(long)]
        repair: bool,

        #[command(flatten)]
        profile: ProfileArgs,
    },

    /// Grant a user full control (or read-only access) on a workbook
    ProvisionWorkbook {
        #[arg(long, value_parser = clap::value_parser!(i64).range(1..))]
        workbook: i64,

        #[arg(long, value_parser = clap::value_parser!(i64).range(1..))]
        user: i64,

        /// Grant the reader role instead of the writer role
        #[arg(long)]
        reader: bool,
    },

    /// Evaluate a user's privileges on a resource
    Check {
        #[arg(long, value_enum)]
        kind: Kind,

        #[arg(long, value_parser = clap::value_parser!(i64).range(1..))]
        id: i64,

        #[arg(long, value_parser = clap::value_parser!(i64).range(1..))]
        user: i64,

        /// Action to evaluate; repeatable
        #[arg(long = "action", value_name = "ACTION", required = true)]
        actions: Vec<String>,

        /// Print the deciding role for each action
        #[arg(long)]
        explain: bool,
    },
}

#[derive(Args)]
struct TenantArgs {
    #[arg(long)]
    organization: String,

    #[arg(long, value_name = "LOGIN")]
    owner_login: String,

    #[arg(long, value_name = "NAME")]
    owner_name: String,
}

impl TenantArgs {
    fn setup(&self) -> OrganizationSetup {
        OrganizationSetup::new(
            self.organization.clone(),
            UserProfile::new(self.owner_login.clone(), self.owner_name.clone()),
        )
    }
}

#[derive(Args)]
struct ProfileArgs {
    #[arg(long, value_name = "LOGIN")]
    login: String,

    #[arg(long)]
    name: String,
}

impl ProfileArgs {
    fn profile(&self) -> UserProfile {
        UserProfile::new(self.login.clone(), self.name.clone())
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum Kind {
    Workbook,
    Space,
}

impl Kind {
    fn resource(self, id: i64) -> ResourceRef {
        match self {
            Kind::Workbook => ResourceRef::workbook(WorkbookId::new(id)),
            Kind::Space => ResourceRef::space(SpaceId::new(id)),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let settings = Settings::load(cli.config.as_deref()).context("loading settings")?;
    quire_observability::init(settings.logging.format);

    let ctx = OpContext::background().with_timeout(Duration::from_secs(cli.timeout));
    let token = ctx.cancellation_token().clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            token.cancel();
        }
    });

    let pool = connect(&settings).await.context("connecting to database")?;
    if let Commands::Migrate = cli.command {
        migrate(&pool).await.context("applying schema")?;
        info!("migration complete");
        return Ok(());
    }

    let stores = PostgresStores::new(pool);
    let manager = IdentityHierarchyManager::new(stores.identity_stores(), settings.confirmation_policy());
    run(&ctx, &manager, cli.command).await
}

async fn run(ctx: &OpContext, manager: &IdentityHierarchyManager, command: Commands) -> Result<()> {
    let admin = SystemAdmin::new();

    match command {
        Commands::Migrate => Ok(()),

        Commands::Bootstrap(args) => {
            let bootstrap = manager.create_organization(ctx, &admin, &args.setup()).await?;
            print_json(&bootstrap)
        }

        Commands::Repair(args) => {
            let bootstrap = manager.repair_organization(ctx, &admin, &args.setup()).await?;
            print_json(&bootstrap)
        }

        Commands::AddOwner { organization, profile } => {
            let system_owner = ctx
                .run(manager.find_system_owner(&organization))
                .await?
                .with_context(|| format!("resolving the system owner of '{organization}'"))?;
            let owner = manager.create_owner(ctx, &system_owner, &profile.profile()).await?;
            print_json(&owner)
        }

        Commands::AddStudent {
            organization,
            owner,
            repair,
            profile,
        } => {
            let org = ctx
                .run(manager.stores().organizations.find_by_name(&organization))
                .await?
                .with_context(|| format!("resolving organization '{organization}'"))?;
            let owner = ctx
                .run(manager.find_owner(org.id, &owner))
                .await?
                .with_context(|| format!("resolving owner '{owner}'"))?;
            let enrollment = if repair {
                manager.repair_student(ctx, &owner, &profile.profile()).await?
            } else {
                manager.create_student(ctx, &owner, &profile.profile()).await?
            };
            print_json(&enrollment)
        }

        Commands::ProvisionWorkbook { workbook, user, reader } => {
            let resource = ResourceRef::workbook(WorkbookId::new(workbook));
            let subject = Subject::for_user(AppUserId::new(user));
            let provisioner = manager.provisioner();
            if reader {
                provisioner.grant_reader(ctx, &resource, &subject).await?;
            } else {
                provisioner.grant_full_control(ctx, &resource, &subject).await?;
            }
            info!(%resource, %subject, reader, "workbook provisioned");
            Ok(())
        }

        Commands::Check {
            kind,
            id,
            user,
            actions,
            explain,
        } => {
            let resource = kind.resource(id);
            let subject = Subject::for_user(AppUserId::new(user));
            let actions: Vec<Action> = actions.into_iter().map(Action::new).collect();
            let authorizer = manager.authorizer();

            let granted = if explain {
                let enforcer = authorizer.enforcer_for(ctx, &subject, &resource).await?;
                let object = resource.object();
                let decisions: Vec<Decision> = actions
                    .iter()
                    .map(|action| enforcer.explain(&subject, &object, action))
                    .collect();
                print_json(&decisions)?;
                decisions.iter().filter(|d| d.granted).count()
            } else {
                let privileges = authorizer.privileges(ctx, &subject, &resource, &actions).await?;
                print_json(&privileges)?;
                privileges.len()
            };

            if granted < actions.len() {
                let missing = actions.len() - granted;
                bail!("{subject} lacks {missing} of {} requested actions on {resource}", actions.len());
            }
            Ok(())
        }
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
