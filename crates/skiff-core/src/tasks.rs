//! ECS task lifecycle: starting one-off tasks, the interactive-shell
//! watchdog, and polling a task to its desired lifecycle state.

use std::time::Duration;

use aws_sdk_ecs::types::{
    AssignPublicIp, AwsVpcConfiguration, ContainerOverride, LaunchType, NetworkConfiguration,
    Task, TaskDefinitionField, TaskField, TaskOverride,
};
use aws_sdk_ecs::Client;
use serde::Deserialize;
use tracing::debug;

use crate::error::{Result, SkiffError};

const POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Shell loop run as the task command for interactive sessions: gives the
/// user 60s to attach, then exits once fewer than six processes remain, with
/// a hard stop after twelve hours.
const WATCHDOG_SCRIPT: &str = "STOP=$(($(date +%s)+43200)); sleep 60; \
     while true; do \
     PROCS=\"$(ls /proc | grep [0-9] | wc -l)\"; \
     test \"$PROCS\" -lt \"6\" && exit; \
     test \"$STOP\" -lt \"$(date +%s)\" && exit 1; \
     sleep 30; done";

pub fn watchdog_command() -> Vec<String> {
    vec!["/bin/sh".into(), "-c".into(), WATCHDOG_SCRIPT.into()]
}

/// The local user, recorded in `startedBy` so operators can see who opened a
/// shell or ran a one-off task.
pub fn cli_user() -> String {
    std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .unwrap_or_else(|_| "unknown".into())
}

// ---------------------------------------------------------------------------
// RunTaskArgs
// ---------------------------------------------------------------------------

/// Launch arguments for one-off tasks, read from the app's `ecs-config`
/// parameter when present. Fargate apps need network configuration that the
/// cluster default (EC2 launch type) does not.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RunTaskArgs {
    #[serde(default)]
    pub cluster: Option<String>,
    #[serde(default)]
    pub launch_type: Option<String>,
    #[serde(default)]
    pub subnets: Vec<String>,
    #[serde(default)]
    pub security_groups: Vec<String>,
    #[serde(default)]
    pub assign_public_ip: bool,
}

#[derive(Debug, Deserialize)]
pub struct EcsConfig {
    pub run_task_args: RunTaskArgs,
}

impl RunTaskArgs {
    pub fn for_cluster(cluster: &str) -> Self {
        Self {
            cluster: Some(cluster.to_string()),
            ..Self::default()
        }
    }
}

// ---------------------------------------------------------------------------
// Running tasks
// ---------------------------------------------------------------------------

/// Start a one-off task overriding a single container's command.
pub async fn run_task(
    ecs: &Client,
    family: &str,
    container: &str,
    command: Vec<String>,
    args: &RunTaskArgs,
    started_by: &str,
) -> Result<Task> {
    let overrides = TaskOverride::builder()
        .container_overrides(
            ContainerOverride::builder()
                .name(container)
                .set_command(Some(command))
                .build(),
        )
        .build();

    let mut req = ecs
        .run_task()
        .task_definition(family)
        .overrides(overrides)
        .started_by(started_by);
    if let Some(cluster) = &args.cluster {
        req = req.cluster(cluster);
    }
    if let Some(launch_type) = &args.launch_type {
        req = req.launch_type(LaunchType::from(launch_type.as_str()));
    }
    if !args.subnets.is_empty() {
        let vpc = AwsVpcConfiguration::builder()
            .set_subnets(Some(args.subnets.clone()))
            .set_security_groups(Some(args.security_groups.clone()))
            .assign_public_ip(if args.assign_public_ip {
                AssignPublicIp::Enabled
            } else {
                AssignPublicIp::Disabled
            })
            .build()
            .map_err(|e| SkiffError::aws("ecs:RunTask", e))?;
        req = req.network_configuration(
            NetworkConfiguration::builder()
                .awsvpc_configuration(vpc)
                .build(),
        );
    }

    debug!(family, container, started_by, "running task");
    let resp = req
        .send()
        .await
        .map_err(|e| SkiffError::aws("ecs:RunTask", e))?;
    resp.tasks()
        .first()
        .cloned()
        .ok_or(SkiffError::TaskStopped)
}

/// Start a task that stays up only while someone is attached to it.
pub async fn run_task_until_disconnect(
    ecs: &Client,
    args: &RunTaskArgs,
    family: &str,
    container: Option<String>,
    started_by: &str,
) -> Result<Task> {
    let container = match container {
        Some(name) => name,
        None => first_container_name(ecs, family).await?,
    };
    run_task(ecs, family, &container, watchdog_command(), args, started_by).await
}

/// Name of the first container in a task definition.
pub async fn first_container_name(ecs: &Client, family: &str) -> Result<String> {
    let resp = ecs
        .describe_task_definition()
        .task_definition(family)
        .send()
        .await
        .map_err(|e| SkiffError::aws("ecs:DescribeTaskDefinition", e))?;
    resp.task_definition()
        .and_then(|d| d.container_definitions().first())
        .and_then(|c| c.name())
        .map(str::to_string)
        .ok_or(SkiffError::TaskStopped)
}

// ---------------------------------------------------------------------------
// Waiting
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Running,
    Stopped,
}

/// Poll DescribeTasks until the task reaches `until`. When waiting for stop,
/// a non-zero (or missing) exit code on the first container is a failure;
/// when waiting for running, a task that stops first is a failure.
pub async fn wait_for_task(
    ecs: &Client,
    cluster: &str,
    task_arn: &str,
    until: TaskState,
) -> Result<()> {
    debug!(task_arn, ?until, "waiting for task");
    loop {
        let resp = ecs
            .describe_tasks()
            .cluster(cluster)
            .tasks(task_arn)
            .send()
            .await
            .map_err(|e| SkiffError::aws("ecs:DescribeTasks", e))?;
        let task = resp.tasks().first().ok_or(SkiffError::TaskStopped)?;
        let status = task.last_status().unwrap_or_default();
        match (until, status) {
            (TaskState::Stopped, "STOPPED") => {
                let exit_code = task
                    .containers()
                    .first()
                    .and_then(|c| c.exit_code())
                    .unwrap_or(255);
                if exit_code != 0 {
                    return Err(SkiffError::TaskFailed(exit_code));
                }
                return Ok(());
            }
            (TaskState::Running, "RUNNING") => return Ok(()),
            (TaskState::Running, "STOPPED") => return Err(SkiffError::TaskStopped),
            _ => tokio::time::sleep(POLL_INTERVAL).await,
        }
    }
}

/// A single task, freshly described. Placement fields like the container
/// instance ARN are only populated once the task has been scheduled.
pub async fn describe_task(ecs: &Client, cluster: &str, task_arn: &str) -> Result<Task> {
    let resp = ecs
        .describe_tasks()
        .cluster(cluster)
        .tasks(task_arn)
        .send()
        .await
        .map_err(|e| SkiffError::aws("ecs:DescribeTasks", e))?;
    resp.tasks().first().cloned().ok_or(SkiffError::TaskStopped)
}

/// EC2 instance hosting a task's container instance. Interactive sessions
/// attach to the instance, not the task.
pub async fn ec2_instance_for_task(ecs: &Client, cluster: &str, task: &Task) -> Result<String> {
    let container_instance_arn = task
        .container_instance_arn()
        .ok_or(SkiffError::TaskStopped)?;
    let resp = ecs
        .describe_container_instances()
        .cluster(cluster)
        .container_instances(container_instance_arn)
        .send()
        .await
        .map_err(|e| SkiffError::aws("ecs:DescribeContainerInstances", e))?;
    resp.container_instances()
        .first()
        .and_then(|ci| ci.ec2_instance_id())
        .map(str::to_string)
        .ok_or(SkiffError::TaskStopped)
}

/// DescribeTasks accepts at most a hundred tasks per call.
const DESCRIBE_TASKS_CHUNK: usize = 100;

/// Tasks fetched with tags included.
pub async fn describe_tasks_with_tags(ecs: &Client, cluster: &str) -> Result<Vec<Task>> {
    let arns = ecs
        .list_tasks()
        .cluster(cluster)
        .send()
        .await
        .map_err(|e| SkiffError::aws("ecs:ListTasks", e))?
        .task_arns()
        .to_vec();
    let mut tasks = Vec::new();
    for chunk in arns.chunks(DESCRIBE_TASKS_CHUNK) {
        let resp = ecs
            .describe_tasks()
            .cluster(cluster)
            .set_tasks(Some(chunk.to_vec()))
            .include(TaskField::Tags)
            .send()
            .await
            .map_err(|e| SkiffError::aws("ecs:DescribeTasks", e))?;
        tasks.extend(resp.tasks().iter().cloned());
    }
    Ok(tasks)
}

/// Build number recorded on a task definition by the build pipeline, falling
/// back to the task definition revision.
pub async fn deployment_id(ecs: &Client, task_definition_arn: &str) -> Result<String> {
    let resp = ecs
        .describe_task_definition()
        .task_definition(task_definition_arn)
        .include(TaskDefinitionField::Tags)
        .send()
        .await
        .map_err(|e| SkiffError::aws("ecs:DescribeTaskDefinition", e))?;
    let build_number = resp.tags().iter().find_map(|t| match (t.key(), t.value()) {
        (Some("skiff:buildNumber"), Some(value)) => Some(value.to_string()),
        _ => None,
    });
    Ok(build_number.unwrap_or_else(|| {
        task_definition_arn
            .rsplit('/')
            .next()
            .unwrap_or(task_definition_arn)
            .to_string()
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn watchdog_runs_under_sh() {
        let cmd = watchdog_command();
        assert_eq!(cmd.len(), 3);
        assert_eq!(cmd[0], "/bin/sh");
        assert_eq!(cmd[1], "-c");
        // 12 hour hard stop and the process-count disconnect check
        assert!(cmd[2].contains("43200"));
        assert!(cmd[2].contains("/proc"));
    }

    #[test]
    fn run_task_args_default_to_cluster_only() {
        let args = RunTaskArgs::for_cluster("myapp");
        assert_eq!(args.cluster.as_deref(), Some("myapp"));
        assert!(args.launch_type.is_none());
        assert!(args.subnets.is_empty());
    }

    #[test]
    fn ecs_config_parses_fargate_shape() {
        let raw = r#"{
            "run_task_args": {
                "cluster": "shared",
                "launch_type": "FARGATE",
                "subnets": ["subnet-1", "subnet-2"],
                "security_groups": ["sg-1"],
                "assign_public_ip": true
            }
        }"#;
        let config: EcsConfig = serde_json::from_str(raw).unwrap();
        assert_eq!(config.run_task_args.launch_type.as_deref(), Some("FARGATE"));
        assert_eq!(config.run_task_args.subnets.len(), 2);
        assert!(config.run_task_args.assign_public_ip);
    }
}
