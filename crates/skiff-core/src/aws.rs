use aws_config::{BehaviorVersion, SdkConfig};
use aws_credential_types::Credentials;

/// Load SDK configuration from the ambient credential chain
/// (environment, shared config, instance profile).
pub async fn ambient_config() -> SdkConfig {
    aws_config::defaults(BehaviorVersion::latest()).load().await
}

/// Load SDK configuration backed by an explicit set of short-lived
/// credentials (the result of an STS role assumption). Region still
/// resolves from the ambient chain.
pub async fn config_with_credentials(credentials: Credentials) -> SdkConfig {
    aws_config::defaults(BehaviorVersion::latest())
        .credentials_provider(credentials)
        .load()
        .await
}

/// Region name for a loaded config, if one resolved.
pub fn region(config: &SdkConfig) -> Option<&str> {
    config.region().map(|r| r.as_ref())
}
