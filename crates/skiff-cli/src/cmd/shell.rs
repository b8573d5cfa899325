use console::style;
use skiff_core::app::Application;
use skiff_core::tasks::{self, TaskState};
use skiff_core::SkiffError;

use crate::output;

pub async fn run(app_name: &str) -> anyhow::Result<()> {
    ensure_session_manager_plugin()?;

    let app = Application::connect(app_name).await?;
    let ecs = app.ecs();
    let cluster = app.settings.cluster.name.clone();
    let args = app.run_task_args().await?;
    let started_by = format!("skiff-cli/shell/{}", tasks::cli_user());

    let task = tasks::run_task_until_disconnect(
        &ecs,
        &args,
        &app.settings.shell.task_family,
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
    exec_session(&instance_id, &task_arn, &app.settings.shell.command)
}

pub fn ensure_session_manager_plugin() -> anyhow::Result<()> {
    if which::which("session-manager-plugin").is_err() {
        println!(
            "Installation instructions: {}",
            style("https://docs.aws.amazon.com/systems-manager/latest/userguide/session-manager-working-with-install-plugin.html")
                .bold()
        );
        return Err(SkiffError::MissingDependency("session-manager-plugin").into());
    }
    Ok(())
}

/// Replace this process with an interactive SSM session that docker-execs
/// into the task's container on its host instance.
pub fn exec_session(instance_id: &str, task_arn: &str, command: &str) -> anyhow::Result<()> {
    let parameters = format!(
        "command=sudo docker exec -it \
         $(sudo docker ps -q -f label=com.amazonaws.ecs.task-arn={task_arn}) {command}"
    );
    let mut session = std::process::Command::new("aws");
    session.args([
        "ssm",
        "start-session",
        "--target",
        instance_id,
        "--document-name",
        "AWS-StartInteractiveCommand",
        "--parameters",
        &parameters,
    ]);

    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        // exec only returns on failure
        Err(session.exec().into())
    }
    #[cfg(not(unix))]
    {
        let status = session.status()?;
        std::process::exit(status.code().unwrap_or(1));
    }
}
