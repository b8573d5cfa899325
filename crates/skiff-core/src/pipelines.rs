//! Deploy pipelines: ordered lists of apps sharing a promotion flow. The
//! descriptors live in Parameter Store; promotion writes a record the target
//! app's build machinery picks up.

use std::collections::BTreeMap;

use aws_sdk_ssm::Client;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Result, SkiffError};
use crate::parameters;
use crate::PARAMETER_ROOT;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineStage {
    pub app: String,
    pub stage: String,
}

#[derive(Debug, Deserialize)]
struct PipelineMembership {
    name: String,
}

/// What gets written to `/skiff/apps/<dest>/pipeline/promoted`.
#[derive(Debug, Serialize)]
pub struct PromotionRecord {
    pub source: String,
    pub build_number: i64,
    pub build_id: String,
    pub commit: String,
    pub started: String,
}

// ---------------------------------------------------------------------------
// Lookups
// ---------------------------------------------------------------------------

pub async fn pipeline_list(ssm: &Client) -> Result<BTreeMap<String, String>> {
    parameters::load_parameters(ssm, &format!("{PARAMETER_ROOT}/pipelines/")).await
}

pub async fn pipeline_detail(ssm: &Client, name: &str) -> Result<Vec<PipelineStage>> {
    parameters::get_json_parameter(ssm, &format!("{PARAMETER_ROOT}/pipelines/{name}"))
        .await?
        .ok_or_else(|| SkiffError::PipelineNotFound(name.to_string()))
}

pub async fn pipeline_for_app(ssm: &Client, app: &str) -> Result<String> {
    let membership: PipelineMembership =
        parameters::get_json_parameter(ssm, &format!("{PARAMETER_ROOT}/apps/{app}/pipeline"))
            .await?
            .ok_or_else(|| SkiffError::PipelineNotFound(app.to_string()))?;
    Ok(membership.name)
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// A promotion is valid only within one pipeline and only to a stage that is
/// strictly downstream of the source.
pub fn validate_promotion(stages: &[PipelineStage], source: &str, dest: &str) -> Result<()> {
    let position = |app: &str| stages.iter().position(|s| s.app == app);
    let source_step = position(source)
        .ok_or_else(|| SkiffError::Promotion(format!("{source} is not part of the pipeline")))?;
    let dest_step = position(dest)
        .ok_or_else(|| SkiffError::Promotion(format!("{dest} is not part of the pipeline")))?;
    if source_step >= dest_step {
        return Err(SkiffError::Promotion(format!(
            "{dest} is not downstream from {source}"
        )));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Promotion
// ---------------------------------------------------------------------------

/// Validate and record a promotion of `source`'s current build to `dest`.
pub async fn promote(
    ssm: &Client,
    source: &str,
    build_number: i64,
    build_id: &str,
    commit: &str,
    dest: &str,
) -> Result<()> {
    let source_pipeline = pipeline_for_app(ssm, source).await?;
    let dest_pipeline = pipeline_for_app(ssm, dest).await?;
    if source_pipeline != dest_pipeline {
        return Err(SkiffError::Promotion(format!(
            "source pipeline ({source_pipeline}) does not equal destination ({dest_pipeline})"
        )));
    }
    let stages = pipeline_detail(ssm, &source_pipeline).await?;
    validate_promotion(&stages, source, dest)?;

    let record = PromotionRecord {
        source: source.to_string(),
        build_number,
        build_id: build_id.to_string(),
        commit: commit.to_string(),
        started: Utc::now().to_rfc3339(),
    };
    debug!(source, dest, build_number, "recording promotion");
    parameters::put_string_parameter(
        ssm,
        &format!("{PARAMETER_ROOT}/apps/{dest}/pipeline/promoted"),
        &serde_json::to_string(&record)?,
    )
    .await
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stages() -> Vec<PipelineStage> {
        ["dev", "staging", "prod"]
            .iter()
            .map(|app| PipelineStage {
                app: app.to_string(),
                stage: format!("{app}-stage"),
            })
            .collect()
    }

    #[test]
    fn downstream_promotion_is_valid() {
        assert!(validate_promotion(&stages(), "dev", "staging").is_ok());
        assert!(validate_promotion(&stages(), "dev", "prod").is_ok());
        assert!(validate_promotion(&stages(), "staging", "prod").is_ok());
    }

    #[test]
    fn upstream_and_self_promotions_are_rejected() {
        assert!(matches!(
            validate_promotion(&stages(), "prod", "dev"),
            Err(SkiffError::Promotion(_))
        ));
        assert!(matches!(
            validate_promotion(&stages(), "staging", "staging"),
            Err(SkiffError::Promotion(_))
        ));
    }

    #[test]
    fn unknown_apps_are_rejected() {
        let err = validate_promotion(&stages(), "dev", "qa").unwrap_err();
        assert!(err.to_string().contains("qa"));
        assert!(matches!(
            validate_promotion(&stages(), "qa", "prod"),
            Err(SkiffError::Promotion(_))
        ));
    }

    #[test]
    fn promotion_record_serializes_flat() {
        let record = PromotionRecord {
            source: "dev".into(),
            build_number: 42,
            build_id: "dev:abcd".into(),
            commit: "deadbeef".into(),
            started: "2024-01-01T00:00:00Z".into(),
        };
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["build_number"], 42);
        assert_eq!(value["source"], "dev");
    }
}
