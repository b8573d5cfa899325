mod cmd;
mod output;

use clap::{Parser, Subcommand};
use cmd::{
    auth::AuthSubcommand, config::ConfigSubcommand, create::CreateSubcommand, db::DbSubcommand,
    destroy::DestroySubcommand, pipelines::PipelinesSubcommand, upgrade::UpgradeSubcommand,
};
use skiff_core::SkiffError;

#[derive(Parser)]
#[command(
    name = "skiff",
    about = "Control plane for skiff apps — provision, configure, and inspect workloads on AWS",
    version,
    propagate_version = true
)]
struct Cli {
    /// Application to operate on
    #[arg(long = "app", short = 'a', global = true, env = "SKIFF_APP")]
    app: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Log in to the identity provider and inspect the CLI identity
    Auth {
        #[command(subcommand)]
        subcommand: AuthSubcommand,
    },

    /// Provision account, cluster, and app resources
    Create {
        #[command(subcommand)]
        subcommand: CreateSubcommand,
    },

    /// Re-apply the latest templates to existing stacks
    Upgrade {
        #[command(subcommand)]
        subcommand: UpgradeSubcommand,
    },

    /// Tear down account, cluster, or app resources
    Destroy {
        #[command(subcommand)]
        subcommand: DestroySubcommand,
    },

    /// View and edit app environment variables
    Config {
        #[command(subcommand)]
        subcommand: ConfigSubcommand,
    },

    /// Show service deployment status
    Deployments {
        /// Redraw until every service is stable
        #[arg(long, short)]
        watch: bool,
    },

    /// Inspect deploy pipelines and promote builds
    Pipelines {
        #[command(subcommand)]
        subcommand: PipelinesSubcommand,
    },

    /// Open an interactive shell in the remote environment
    Shell,

    /// Database tasks
    Db {
        #[command(subcommand)]
        subcommand: DbSubcommand,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .with_target(false)
        .init();

    if let Err(e) = run(cli).await {
        // Print the full error chain (anyhow's alternate Display)
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Auth { subcommand } => cmd::auth::run(subcommand).await,
        Commands::Create { subcommand } => cmd::create::run(subcommand).await,
        Commands::Upgrade { subcommand } => cmd::upgrade::run(subcommand).await,
        Commands::Destroy { subcommand } => cmd::destroy::run(subcommand).await,
        Commands::Config { subcommand } => {
            cmd::config::run(require_app(&cli.app)?, subcommand).await
        }
        Commands::Deployments { watch } => cmd::deployments::run(require_app(&cli.app)?, watch).await,
        Commands::Pipelines { subcommand } => {
            cmd::pipelines::run(cli.app.as_deref(), subcommand).await
        }
        Commands::Shell => cmd::shell::run(require_app(&cli.app)?).await,
        Commands::Db { subcommand } => cmd::db::run(require_app(&cli.app)?, subcommand).await,
    }
}

fn require_app(app: &Option<String>) -> anyhow::Result<&str> {
    app.as_deref()
        .ok_or_else(|| SkiffError::NoApplication.into())
}
