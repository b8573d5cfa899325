//! The per-invocation application context: resolved settings plus AWS
//! clients carrying credentials scoped to the app.

use aws_config::SdkConfig;
use aws_sdk_ecs::types::{Service, ServiceField, Task};
use serde_json::Value;
use tracing::debug;

use crate::auth::{self, AuthClient};
use crate::builds::{self, BuildStatus};
use crate::error::{Result, SkiffError};
use crate::settings::{self, ResourceTag, Settings};
use crate::tasks::{self, EcsConfig, RunTaskArgs};
use crate::{aws, parameters, PARAMETER_ROOT};

/// DescribeServices accepts at most ten services per call.
const DESCRIBE_SERVICES_CHUNK: usize = 10;

pub struct Application {
    pub name: String,
    pub settings: Settings,
    config: SdkConfig,
}

impl Application {
    /// Exchange the cached login for app-scoped AWS credentials, load the
    /// app's settings, and return a ready context.
    pub async fn connect(name: &str) -> Result<Self> {
        if name.is_empty() {
            return Err(SkiffError::NoApplication);
        }
        let auth = AuthClient::new()?;
        let ambient = aws::ambient_config().await;
        let sts = aws_sdk_sts::Client::new(&ambient);
        let credentials = auth::app_credentials(&auth, &sts, name).await?;
        let config = aws::config_with_credentials(credentials).await;

        let ssm = aws_sdk_ssm::Client::new(&config);
        let remote = match parameters::get_json_parameter::<Value>(
            &ssm,
            &format!("{PARAMETER_ROOT}/apps/{name}/settings"),
        )
        .await
        {
            Ok(value) => value,
            // Apps predating the settings blob deny reads on it; fall back
            // to the defaults like a missing parameter.
            Err(SkiffError::Aws { source, .. })
                if source.to_string().contains("AccessDenied") =>
            {
                None
            }
            Err(e) => return Err(e),
        };
        let settings = Settings::merged(name, remote)?;
        debug!(app = name, cluster = %settings.cluster.name, "application context ready");
        Ok(Self {
            name: name.to_string(),
            settings,
            config,
        })
    }

    pub fn ecs(&self) -> aws_sdk_ecs::Client {
        aws_sdk_ecs::Client::new(&self.config)
    }

    pub fn ssm(&self) -> aws_sdk_ssm::Client {
        aws_sdk_ssm::Client::new(&self.config)
    }

    pub fn s3(&self) -> aws_sdk_s3::Client {
        aws_sdk_s3::Client::new(&self.config)
    }

    pub fn codebuild(&self) -> aws_sdk_codebuild::Client {
        aws_sdk_codebuild::Client::new(&self.config)
    }

    /// Tasks in the app's cluster carrying the app's tags.
    pub async fn tasks(&self) -> Result<Vec<Task>> {
        let tasks =
            tasks::describe_tasks_with_tags(&self.ecs(), &self.settings.cluster.name).await?;
        Ok(tasks
            .into_iter()
            .filter(|t| settings::tags_match(&ecs_tags_to_resource(t.tags()), &self.settings.tags))
            .collect())
    }

    /// Services in the app's cluster carrying the app's tags.
    pub async fn services(&self) -> Result<Vec<Service>> {
        let ecs = self.ecs();
        let cluster = &self.settings.cluster.name;
        let arns = ecs
            .list_services()
            .cluster(cluster)
            .send()
            .await
            .map_err(|e| SkiffError::aws("ecs:ListServices", e))?
            .service_arns()
            .to_vec();

        let mut services = Vec::new();
        for chunk in arns.chunks(DESCRIBE_SERVICES_CHUNK) {
            let resp = ecs
                .describe_services()
                .cluster(cluster)
                .set_services(Some(chunk.to_vec()))
                .include(ServiceField::Tags)
                .send()
                .await
                .map_err(|e| SkiffError::aws("ecs:DescribeServices", e))?;
            services.extend(resp.services().iter().cloned());
        }
        Ok(services
            .into_iter()
            .filter(|s| settings::tags_match(&ecs_tags_to_resource(s.tags()), &self.settings.tags))
            .collect())
    }

    /// Launch arguments for one-off tasks, from the app's `ecs-config`
    /// parameter when present, defaulting to the app's cluster.
    pub async fn run_task_args(&self) -> Result<RunTaskArgs> {
        let config: Option<EcsConfig> = parameters::get_json_parameter(
            &self.ssm(),
            &format!("{PARAMETER_ROOT}/apps/{}/ecs-config", self.name),
        )
        .await?;
        Ok(match config {
            Some(config) => {
                let mut args = config.run_task_args;
                if args.cluster.is_none() {
                    args.cluster = Some(self.settings.cluster.name.clone());
                }
                args
            }
            None => RunTaskArgs::for_cluster(&self.settings.cluster.name),
        })
    }

    /// The build the app is currently running.
    pub async fn current_status(&self) -> Result<BuildStatus> {
        builds::latest_successful_build(&self.codebuild(), &self.settings.codebuild_project.name)
            .await
    }
}

fn ecs_tags_to_resource(tags: &[aws_sdk_ecs::types::Tag]) -> Vec<ResourceTag> {
    tags.iter()
        .filter_map(|t| match (t.key(), t.value()) {
            (Some(key), Some(value)) => Some(ResourceTag {
                key: key.to_string(),
                value: value.to_string(),
            }),
            _ => None,
        })
        .collect()
}
