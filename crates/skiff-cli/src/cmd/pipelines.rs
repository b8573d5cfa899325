use clap::Subcommand;
use console::style;
use skiff_core::app::Application;
use skiff_core::{aws, pipelines, SkiffError};

use crate::output;

#[derive(Subcommand)]
pub enum PipelinesSubcommand {
    /// List pipelines
    List,
    /// Show a pipeline's apps and stages
    Info { name: String },
    /// Promote this app's current build to a downstream app
    Promote {
        /// App to promote to
        #[arg(long, short = 't')]
        to: String,
    },
}

pub async fn run(app_name: Option<&str>, subcommand: PipelinesSubcommand) -> anyhow::Result<()> {
    match subcommand {
        PipelinesSubcommand::List => list().await,
        PipelinesSubcommand::Info { name } => info(&name).await,
        PipelinesSubcommand::Promote { to } => {
            let app_name = app_name.ok_or(SkiffError::NoApplication)?;
            promote(app_name, &to).await
        }
    }
}

async fn list() -> anyhow::Result<()> {
    let config = aws::ambient_config().await;
    let ssm = aws_sdk_ssm::Client::new(&config);
    output::progress("fetching pipelines");
    let pipelines = pipelines::pipeline_list(&ssm).await?;
    output::print_header("Pipelines");
    for name in pipelines.keys() {
        println!("{name}");
    }
    Ok(())
}

async fn info(name: &str) -> anyhow::Result<()> {
    let config = aws::ambient_config().await;
    let ssm = aws_sdk_ssm::Client::new(&config);
    let stages = pipelines::pipeline_detail(&ssm, name).await?;

    output::print_header(name);
    println!();
    let width = stages
        .iter()
        .map(|s| s.app.len())
        .chain(["app name".len()])
        .max()
        .unwrap_or(0)
        + 1;
    println!("{}", style(format!("{:width$} stage", "app name")).bold());
    for stage in &stages {
        println!(
            "{} {}",
            style(format!("{:width$}", stage.app)).green(),
            stage.stage
        );
    }
    Ok(())
}

async fn promote(app_name: &str, to: &str) -> anyhow::Result<()> {
    let app = Application::connect(app_name).await?;
    let current = app.current_status().await?;
    pipelines::promote(
        &app.ssm(),
        &app.name,
        current.build_number,
        &current.build_id,
        &current.commit,
        to,
    )
    .await?;
    output::success(&format!(
        "promoted build {} of {} to {to}",
        current.build_number, app.name
    ));
    Ok(())
}
