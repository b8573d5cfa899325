use std::path::Path;

use clap::Subcommand;
use skiff_core::app::Application;
use skiff_core::storage;
use skiff_core::tasks::{self, TaskState};

use crate::cmd::shell;
use crate::output;

#[derive(Subcommand)]
pub enum DbSubcommand {
    /// Dump the remote database to a local file
    Dump,
    /// Replace the remote database with a dump from the local filesystem
    /// or S3 (s3://...)
    Load { file: String },
    /// Run an interactive database shell
    Shell,
}

pub async fn run(app_name: &str, subcommand: DbSubcommand) -> anyhow::Result<()> {
    let app = Application::connect(app_name).await?;
    match subcommand {
        DbSubcommand::Dump => dump(&app).await,
        DbSubcommand::Load { file } => load(&app, &file).await,
        DbSubcommand::Shell => db_shell(&app).await,
    }
}

// ---------------------------------------------------------------------------
// dump / load
// ---------------------------------------------------------------------------

async fn dump(app: &Application) -> anyhow::Result<()> {
    let bucket = app.settings.db_utils.s3_bucket.clone();
    let object = storage::object_name("dumps/");

    let task_arn = run_dumpload_task(app, vec!["dump-to-s3.sh".into(), format!("s3://{bucket}/{object}")])
        .await?;
    output::progress("dumping database");
    tasks::wait_for_task(
        &app.ecs(),
        &app.settings.cluster.name,
        &task_arn,
        TaskState::Stopped,
    )
    .await?;

    let local = format!("{}.dump", app.name);
    output::progress(&format!("downloading file {local}"));
    storage::download_file(&app.s3(), &bucket, &object, Path::new(&local)).await?;
    output::success(&format!("saved {local}"));
    Ok(())
}

async fn load(app: &Application, file: &str) -> anyhow::Result<()> {
    let remote = if file.starts_with("s3://") {
        file.to_string()
    } else {
        let bucket = app.settings.db_utils.s3_bucket.clone();
        let object = storage::object_name("uploads/");
        output::progress(&format!("uploading file {file}"));
        storage::upload_file(&app.s3(), Path::new(file), &bucket, &object).await?;
        format!("s3://{bucket}/{object}")
    };

    let task_arn = run_dumpload_task(app, vec!["load-from-s3.sh".into(), remote]).await?;
    output::progress("loading database");
    tasks::wait_for_task(
        &app.ecs(),
        &app.settings.cluster.name,
        &task_arn,
        TaskState::Stopped,
    )
    .await?;
    output::success("database loaded");
    Ok(())
}

async fn run_dumpload_task(app: &Application, command: Vec<String>) -> anyhow::Result<String> {
    let args = app.run_task_args().await?;
    let started_by = format!("skiff-cli/db/{}", tasks::cli_user());
    let task = tasks::run_task(
        &app.ecs(),
        &app.settings.db_utils.dumpload_task_family,
        "app",
        command,
        &args,
        &started_by,
    )
    .await?;
    let task_arn = task.task_arn().unwrap_or_default().to_string();
    output::info(&format!("starting task {task_arn}"));
    Ok(task_arn)
}

// ---------------------------------------------------------------------------
// shell
// ---------------------------------------------------------------------------

async fn db_shell(app: &Application) -> anyhow::Result<()> {
    shell::ensure_session_manager_plugin()?;

    let ecs = app.ecs();
    let cluster = app.settings.cluster.name.clone();
    let args = app.run_task_args().await?;
    let started_by = format!("skiff-cli/db-shell/{}", tasks::cli_user());

    let task = tasks::run_task_until_disconnect(
        &ecs,
        &args,
        &app.settings.db_utils.shell_task_family,
        None,
        &started_by,
    )
    .await?;
    let task_arn = task.task_arn().unwrap_or_default().to_string();
    output::info(&format!("starting task {task_arn}"));
    output::progress("waiting for container...");
    tasks::wait_for_task(&ecs, &cluster, &task_arn, TaskState::Running).await?;

    let task = tasks::describe_task(&ecs, &cluster, &task_arn).await?;
    let instance_id = tasks::ec2_instance_for_task(&ecs, &cluster, &task).await?;
    shell::exec_session(&instance_id, &task_arn, "entrypoint.sh psql")
}
