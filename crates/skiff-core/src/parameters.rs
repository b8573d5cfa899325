//! SSM Parameter Store access. The control plane keeps its own records under
//! [`crate::PARAMETER_ROOT`] and app config vars under each app's prefix.

use std::collections::BTreeMap;

use aws_sdk_ssm::types::{ParameterType, Tag};
use aws_sdk_ssm::Client;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::error::{Result, SkiffError};

/// Fetch every (decrypted) parameter below `prefix`, keyed by the name
/// relative to the prefix.
pub async fn load_parameters(ssm: &Client, prefix: &str) -> Result<BTreeMap<String, String>> {
    debug!(prefix, "loading parameters");
    let mut out = BTreeMap::new();
    let mut next_token = None;
    loop {
        let resp = ssm
            .get_parameters_by_path()
            .path(prefix)
            .recursive(true)
            .with_decryption(true)
            .set_next_token(next_token)
            .send()
            .await
            .map_err(|e| SkiffError::aws("ssm:GetParametersByPath", e))?;
        for p in resp.parameters() {
            if let (Some(name), Some(value)) = (p.name(), p.value()) {
                out.insert(display_key(prefix, name), value.to_string());
            }
        }
        next_token = resp.next_token().map(str::to_string);
        if next_token.is_none() {
            break;
        }
    }
    Ok(out)
}

/// A single parameter value, or `None` if it does not exist.
pub async fn get_parameter(ssm: &Client, name: &str) -> Result<Option<String>> {
    match ssm
        .get_parameter()
        .name(name)
        .with_decryption(true)
        .send()
        .await
    {
        Ok(resp) => Ok(resp
            .parameter()
            .and_then(|p| p.value())
            .map(str::to_string)),
        Err(e) => {
            let service_error = e.into_service_error();
            if service_error.is_parameter_not_found() {
                Ok(None)
            } else {
                Err(SkiffError::aws("ssm:GetParameter", service_error))
            }
        }
    }
}

/// A parameter holding a JSON document, decoded into `T`.
pub async fn get_json_parameter<T: DeserializeOwned>(
    ssm: &Client,
    name: &str,
) -> Result<Option<T>> {
    match get_parameter(ssm, name).await? {
        Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
        None => Ok(None),
    }
}

/// Overwrite (or create) a SecureString parameter.
pub async fn put_secure_parameter(ssm: &Client, name: &str, value: &str) -> Result<()> {
    ssm.put_parameter()
        .name(name)
        .value(value)
        .r#type(ParameterType::SecureString)
        .overwrite(true)
        .send()
        .await
        .map_err(|e| SkiffError::aws("ssm:PutParameter", e))?;
    Ok(())
}

/// Create a tagged SecureString parameter. PutParameter rejects tags together
/// with overwrite, so creation is a separate call from updates.
pub async fn create_secure_parameter(
    ssm: &Client,
    name: &str,
    value: &str,
    tags: Vec<Tag>,
) -> Result<()> {
    ssm.put_parameter()
        .name(name)
        .value(value)
        .r#type(ParameterType::SecureString)
        .set_tags(Some(tags))
        .send()
        .await
        .map_err(|e| SkiffError::aws("ssm:PutParameter", e))?;
    Ok(())
}

/// Overwrite (or create) a plain String parameter.
pub async fn put_string_parameter(ssm: &Client, name: &str, value: &str) -> Result<()> {
    ssm.put_parameter()
        .name(name)
        .value(value)
        .r#type(ParameterType::String)
        .overwrite(true)
        .send()
        .await
        .map_err(|e| SkiffError::aws("ssm:PutParameter", e))?;
    Ok(())
}

pub async fn delete_parameter(ssm: &Client, name: &str) -> Result<()> {
    ssm.delete_parameter()
        .name(name)
        .send()
        .await
        .map_err(|e| SkiffError::aws("ssm:DeleteParameter", e))?;
    Ok(())
}

fn display_key(prefix: &str, name: &str) -> String {
    name.strip_prefix(prefix)
        .unwrap_or(name)
        .trim_start_matches('/')
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_key_strips_prefix_and_slash() {
        assert_eq!(display_key("/myapp", "/myapp/DATABASE_URL"), "DATABASE_URL");
        assert_eq!(display_key("/skiff/pipelines/", "/skiff/pipelines/main"), "main");
        // names outside the prefix come through untouched apart from the slash
        assert_eq!(display_key("/other", "/myapp/KEY"), "myapp/KEY");
    }
}
