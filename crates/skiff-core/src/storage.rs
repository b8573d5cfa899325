//! S3 file transfer for database dumps and loads.

use std::path::Path;

use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use chrono::Utc;
use tracing::debug;

use crate::error::{Result, SkiffError};
use crate::tasks;

/// Object name for a dump or upload under `prefix`, stamped with the time
/// and the local user.
pub fn object_name(prefix: &str) -> String {
    format!(
        "{prefix}{}-{}.dump",
        Utc::now().format("%Y%m%d%H%M%S"),
        tasks::cli_user()
    )
}

pub async fn upload_file(s3: &Client, local: &Path, bucket: &str, key: &str) -> Result<()> {
    debug!(?local, bucket, key, "uploading file");
    let body = ByteStream::from_path(local)
        .await
        .map_err(|e| SkiffError::aws("s3:PutObject", e))?;
    s3.put_object()
        .bucket(bucket)
        .key(key)
        .body(body)
        .send()
        .await
        .map_err(|e| SkiffError::aws("s3:PutObject", e))?;
    Ok(())
}

pub async fn download_file(s3: &Client, bucket: &str, key: &str, local: &Path) -> Result<()> {
    debug!(bucket, key, ?local, "downloading file");
    let resp = s3
        .get_object()
        .bucket(bucket)
        .key(key)
        .send()
        .await
        .map_err(|e| SkiffError::aws("s3:GetObject", e))?;
    let bytes = resp
        .body
        .collect()
        .await
        .map_err(|e| SkiffError::aws("s3:GetObject", e))?
        .into_bytes();
    tokio::fs::write(local, &bytes).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn object_name_carries_prefix_and_suffix() {
        let name = object_name("dumps/");
        assert!(name.starts_with("dumps/"));
        assert!(name.ends_with(".dump"));
    }
}
