//! CodeBuild queries. Promotion needs to know what an app is currently
//! running, which is the most recent successful build of its project.

use aws_sdk_codebuild::types::StatusType;
use aws_sdk_codebuild::Client;
use tracing::debug;

use crate::error::{Result, SkiffError};

/// How far back to look for a successful build.
const BUILD_LOOKBACK: usize = 20;

#[derive(Debug, Clone)]
pub struct BuildStatus {
    pub build_number: i64,
    pub build_id: String,
    pub commit: String,
}

/// The most recent successful build of `project`, with its resolved commit.
pub async fn latest_successful_build(client: &Client, project: &str) -> Result<BuildStatus> {
    debug!(project, "fetching recent builds");
    let ids: Vec<String> = client
        .list_builds_for_project()
        .project_name(project)
        .send()
        .await
        .map_err(|e| SkiffError::aws("codebuild:ListBuildsForProject", e))?
        .ids()
        .iter()
        .take(BUILD_LOOKBACK)
        .cloned()
        .collect();
    if ids.is_empty() {
        return Err(SkiffError::NoSuccessfulBuild(project.to_string()));
    }
    let resp = client
        .batch_get_builds()
        .set_ids(Some(ids))
        .send()
        .await
        .map_err(|e| SkiffError::aws("codebuild:BatchGetBuilds", e))?;
    resp.builds()
        .iter()
        .find(|b| b.build_status() == Some(&StatusType::Succeeded))
        .and_then(|b| {
            Some(BuildStatus {
                build_number: b.build_number()?,
                build_id: b.id()?.to_string(),
                commit: b
                    .resolved_source_version()
                    .or(b.source_version())?
                    .to_string(),
            })
        })
        .ok_or_else(|| SkiffError::NoSuccessfulBuild(project.to_string()))
}
