//! CloudFormation plumbing: stack create/update/delete and the
//! poll-until-terminal-state wait that every provisioning command shares.

use std::collections::BTreeMap;
use std::time::Duration;

use aws_sdk_cloudformation::error::ProvideErrorMetadata;
use aws_sdk_cloudformation::types::{Capability, Parameter, Stack, Tag};
use aws_sdk_cloudformation::Client;
use serde::Deserialize;
use tracing::debug;

use crate::error::{Result, SkiffError};

/// Parameter blob pointing a control-plane record at its stack.
#[derive(Debug, Deserialize)]
pub struct StackRef {
    pub stack_id: String,
}

pub const ACCOUNT_TEMPLATE_URL: &str =
    "https://s3.amazonaws.com/skiff-cloudformations/latest/account.json";
pub const CLUSTER_TEMPLATE_URL: &str =
    "https://s3.amazonaws.com/skiff-cloudformations/latest/cluster.json";
pub const APP_TEMPLATE_URL: &str =
    "https://s3.amazonaws.com/skiff-cloudformations/latest/app.json";

const POLL_INTERVAL: Duration = Duration::from_secs(5);

// ---------------------------------------------------------------------------
// Status classification
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StackOutcome {
    InProgress,
    Succeeded,
    Failed,
}

pub fn classify(status: &str) -> StackOutcome {
    match status {
        "CREATE_COMPLETE" | "UPDATE_COMPLETE" | "DELETE_COMPLETE" => StackOutcome::Succeeded,
        s if s.ends_with("_IN_PROGRESS") => StackOutcome::InProgress,
        _ => StackOutcome::Failed,
    }
}

// ---------------------------------------------------------------------------
// Create / update / delete
// ---------------------------------------------------------------------------

pub fn parameters(pairs: Vec<(String, String)>) -> Vec<Parameter> {
    pairs
        .into_iter()
        .map(|(key, value)| {
            Parameter::builder()
                .parameter_key(key)
                .parameter_value(value)
                .build()
        })
        .collect()
}

pub fn tags(pairs: Vec<(String, String)>) -> Result<Vec<Tag>> {
    pairs
        .into_iter()
        .map(|(key, value)| {
            Ok(Tag::builder()
                .key(key)
                .value(value)
                .build())
        })
        .collect()
}

/// Create a stack and return its id. All control-plane stacks carry IAM
/// resources, so CAPABILITY_NAMED_IAM is always requested.
pub async fn create_stack(
    cfn: &Client,
    name: &str,
    template_url: &str,
    parameters: Vec<Parameter>,
    tags: Vec<Tag>,
) -> Result<String> {
    debug!(stack = name, template_url, "creating stack");
    let resp = cfn
        .create_stack()
        .stack_name(name)
        .template_url(template_url)
        .set_parameters(Some(parameters))
        .capabilities(Capability::CapabilityNamedIam)
        .set_tags(Some(tags))
        .send()
        .await
        .map_err(|e| SkiffError::aws("cloudformation:CreateStack", e))?;
    resp.stack_id()
        .map(str::to_string)
        .ok_or_else(|| SkiffError::StackFailed {
            name: name.to_string(),
            status: "NO_STACK_ID".to_string(),
        })
}

/// Re-issue the stack's template while keeping its current parameter values.
pub async fn update_stack(cfn: &Client, name: &str, template_url: &str) -> Result<String> {
    let stack = describe_stack(cfn, name)
        .await?
        .ok_or_else(|| SkiffError::StackFailed {
            name: name.to_string(),
            status: "DELETED".to_string(),
        })?;
    let previous: Vec<Parameter> = stack
        .parameters()
        .iter()
        .filter_map(|p| p.parameter_key())
        .map(|key| {
            Parameter::builder()
                .parameter_key(key)
                .use_previous_value(true)
                .build()
        })
        .collect();
    debug!(stack = name, template_url, "updating stack");
    let resp = cfn
        .update_stack()
        .stack_name(name)
        .template_url(template_url)
        .set_parameters(Some(previous))
        .capabilities(Capability::CapabilityIam)
        .send()
        .await
        .map_err(|e| SkiffError::aws("cloudformation:UpdateStack", e))?;
    resp.stack_id()
        .map(str::to_string)
        .ok_or_else(|| SkiffError::StackFailed {
            name: name.to_string(),
            status: "NO_STACK_ID".to_string(),
        })
}

pub async fn delete_stack(cfn: &Client, stack_id: &str) -> Result<()> {
    debug!(stack = stack_id, "deleting stack");
    cfn.delete_stack()
        .stack_name(stack_id)
        .send()
        .await
        .map_err(|e| SkiffError::aws("cloudformation:DeleteStack", e))?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Waiting
// ---------------------------------------------------------------------------

/// Poll until the stack leaves `*_IN_PROGRESS`, failing on any terminal
/// status other than create/update complete.
pub async fn wait_for_stack(cfn: &Client, name: &str) -> Result<Stack> {
    debug!(stack = name, "waiting for stack to settle");
    loop {
        let stack = describe_stack(cfn, name)
            .await?
            .ok_or_else(|| SkiffError::StackFailed {
                name: name.to_string(),
                status: "DELETED".to_string(),
            })?;
        let status = stack
            .stack_status()
            .map(|s| s.as_str().to_string())
            .unwrap_or_default();
        match classify(&status) {
            StackOutcome::InProgress => tokio::time::sleep(POLL_INTERVAL).await,
            StackOutcome::Succeeded => return Ok(stack),
            StackOutcome::Failed => {
                return Err(SkiffError::StackFailed {
                    name: name.to_string(),
                    status,
                })
            }
        }
    }
}

/// Like [`wait_for_stack`], but a stack that disappears counts as success.
pub async fn wait_for_delete(cfn: &Client, stack_id: &str) -> Result<()> {
    loop {
        let Some(stack) = describe_stack(cfn, stack_id).await? else {
            return Ok(());
        };
        let status = stack
            .stack_status()
            .map(|s| s.as_str().to_string())
            .unwrap_or_default();
        match classify(&status) {
            StackOutcome::InProgress => tokio::time::sleep(POLL_INTERVAL).await,
            StackOutcome::Succeeded => return Ok(()),
            StackOutcome::Failed => {
                return Err(SkiffError::StackFailed {
                    name: stack_id.to_string(),
                    status,
                })
            }
        }
    }
}

pub async fn describe_stack(cfn: &Client, name: &str) -> Result<Option<Stack>> {
    match cfn.describe_stacks().stack_name(name).send().await {
        Ok(resp) => Ok(resp.stacks().first().cloned()),
        Err(e) if stack_missing(&e) => Ok(None),
        Err(e) => Err(SkiffError::aws("cloudformation:DescribeStacks", e)),
    }
}

fn stack_missing<E: ProvideErrorMetadata>(err: &E) -> bool {
    err.message()
        .map(|m| m.contains("does not exist"))
        .unwrap_or(false)
}

// ---------------------------------------------------------------------------
// Outputs
// ---------------------------------------------------------------------------

pub fn outputs(stack: &Stack) -> BTreeMap<String, String> {
    stack
        .outputs()
        .iter()
        .filter_map(|o| match (o.output_key(), o.output_value()) {
            (Some(key), Some(value)) => Some((key.to_string(), value.to_string())),
            _ => None,
        })
        .collect()
}

/// Console deep-link to a stack's event stream, for update failures.
pub fn console_events_url(stack_id: &str) -> String {
    format!(
        "https://console.aws.amazon.com/cloudformation/home#/stacks/events?stackId={}",
        percent_encode(stack_id)
    )
}

fn percent_encode(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for b in raw.bytes() {
        match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(b as char)
            }
            _ => out.push_str(&format!("%{b:02X}")),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_terminal_states() {
        assert_eq!(classify("CREATE_COMPLETE"), StackOutcome::Succeeded);
        assert_eq!(classify("UPDATE_COMPLETE"), StackOutcome::Succeeded);
        assert_eq!(classify("DELETE_COMPLETE"), StackOutcome::Succeeded);
        assert_eq!(classify("ROLLBACK_COMPLETE"), StackOutcome::Failed);
        assert_eq!(classify("CREATE_FAILED"), StackOutcome::Failed);
        assert_eq!(
            classify("UPDATE_ROLLBACK_COMPLETE_CLEANUP_IN_PROGRESS"),
            StackOutcome::InProgress
        );
        assert_eq!(classify("CREATE_IN_PROGRESS"), StackOutcome::InProgress);
    }

    #[test]
    fn console_url_escapes_stack_id() {
        let url = console_events_url(
            "arn:aws:cloudformation:us-east-1:123456789012:stack/skiff-account/abc",
        );
        assert!(url.contains(
            "stackId=arn%3Aaws%3Acloudformation%3Aus-east-1%3A123456789012%3Astack%2Fskiff-account%2Fabc"
        ));
    }
}
