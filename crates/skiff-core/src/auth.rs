//! Device-flow login against the identity provider and the exchange of the
//! resulting OIDC token for per-app AWS credentials.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::json;
use tracing::debug;

use crate::error::{Result, SkiffError};

pub const PROVIDER_URL: &str = "https://auth.skiff.sh";
const CLIENT_ID: &str = "hD8kq1vGpXcT3yNdR7wLbJ2mZsQf4Ae0";
const SCOPE: &str = "openid profile email offline_access";
const AUDIENCE: &str = "https://api.skiff.sh";
const DEVICE_GRANT: &str = "urn:ietf:params:oauth:grant-type:device_code";

const TOKENS_FILE: &str = "tokens.json";
const USER_FILE: &str = "user.json";

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceAuthorization {
    pub device_code: String,
    pub user_code: String,
    pub verification_uri: String,
    pub verification_uri_complete: String,
    pub expires_in: u64,
    #[serde(default)]
    pub interval: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tokens {
    pub access_token: String,
    pub id_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_in: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserInfo {
    pub email: String,
    #[serde(default)]
    pub name: Option<String>,
    /// Custom claim carrying the app-name -> role-ARN map.
    #[serde(rename = "https://skiff.sh/aws_roles", default)]
    pub aws_roles: HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct TokenError {
    error: String,
    #[serde(default)]
    #[allow(dead_code)]
    error_description: Option<String>,
}

// ---------------------------------------------------------------------------
// Token cache
// ---------------------------------------------------------------------------

/// Filesystem cache for tokens and user info. Files are owner-readable only.
pub struct TokenCache {
    dir: PathBuf,
}

impl TokenCache {
    pub fn new() -> Result<Self> {
        let dirs = directories::ProjectDirs::from("sh", "skiff", "skiff")
            .ok_or_else(|| SkiffError::Io(std::io::Error::other("no home directory")))?;
        Ok(Self {
            dir: dirs.cache_dir().to_path_buf(),
        })
    }

    /// Cache rooted at an explicit directory. Used by tests.
    pub fn at(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn read<T: DeserializeOwned>(&self, name: &str) -> Result<Option<T>> {
        match std::fs::read(self.dir.join(name)) {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn write<T: Serialize>(&self, name: &str, value: &T) -> Result<()> {
        std::fs::create_dir_all(&self.dir)?;
        let path = self.dir.join(name);
        std::fs::write(&path, serde_json::to_vec(value)?)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o600))?;
        }
        Ok(())
    }

    pub fn clear(&self) -> Result<()> {
        for name in [TOKENS_FILE, USER_FILE] {
            match std::fs::remove_file(self.dir.join(name)) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// AuthClient
// ---------------------------------------------------------------------------

pub struct AuthClient {
    base_url: String,
    http: reqwest::Client,
    cache: TokenCache,
}

impl AuthClient {
    pub fn new() -> Result<Self> {
        Ok(Self::with(PROVIDER_URL, TokenCache::new()?))
    }

    pub fn with(base_url: impl Into<String>, cache: TokenCache) -> Self {
        Self {
            base_url: base_url.into(),
            http: reqwest::Client::new(),
            cache,
        }
    }

    /// Kick off the device flow: returns the user code and verification URLs.
    pub async fn request_device_authorization(&self) -> Result<DeviceAuthorization> {
        self.post_json(
            "/oauth/device/code",
            &json!({
                "client_id": CLIENT_ID,
                "scope": SCOPE,
                "audience": AUDIENCE,
            }),
        )
        .await
    }

    /// Poll the token endpoint until the user approves the device, honoring
    /// the advertised interval and `slow_down` responses. Persists the tokens
    /// on success.
    pub async fn poll_for_tokens(&self, authorization: &DeviceAuthorization) -> Result<Tokens> {
        let url = format!("{}/oauth/token", self.base_url);
        let deadline = Instant::now() + Duration::from_secs(authorization.expires_in);
        let mut interval = authorization.interval.unwrap_or(5).max(1);
        loop {
            let resp = self
                .http
                .post(&url)
                .json(&json!({
                    "grant_type": DEVICE_GRANT,
                    "device_code": authorization.device_code,
                    "client_id": CLIENT_ID,
                }))
                .send()
                .await?;
            if resp.status().is_success() {
                let tokens: Tokens = resp.json().await?;
                self.cache.write(TOKENS_FILE, &tokens)?;
                return Ok(tokens);
            }
            let status = resp.status().as_u16();
            match resp.json::<TokenError>().await {
                Ok(e) if e.error == "authorization_pending" => {}
                Ok(e) if e.error == "slow_down" => interval += 5,
                Ok(e) if e.error == "expired_token" => return Err(SkiffError::DeviceFlowExpired),
                Ok(e) if e.error == "access_denied" => return Err(SkiffError::DeviceFlowDenied),
                _ => {
                    return Err(SkiffError::Provider {
                        endpoint: url,
                        status,
                    })
                }
            }
            if Instant::now() + Duration::from_secs(interval) >= deadline {
                return Err(SkiffError::DeviceFlowExpired);
            }
            tokio::time::sleep(Duration::from_secs(interval)).await;
        }
    }

    /// Fetch (and cache) the identity behind an access token.
    pub async fn fetch_user_info(&self, access_token: &str) -> Result<UserInfo> {
        let url = format!("{}/userinfo", self.base_url);
        debug!("fetching user info");
        let resp = self.http.get(&url).bearer_auth(access_token).send().await?;
        if !resp.status().is_success() {
            return Err(SkiffError::Provider {
                endpoint: url,
                status: resp.status().as_u16(),
            });
        }
        let user: UserInfo = resp.json().await?;
        self.cache.write(USER_FILE, &user)?;
        Ok(user)
    }

    /// Trade the cached refresh token for a fresh token set.
    pub async fn refresh_tokens(&self) -> Result<Tokens> {
        let tokens = self.cached_tokens()?;
        let refresh_token = tokens.refresh_token.ok_or(SkiffError::NotLoggedIn)?;
        debug!("refreshing auth tokens");
        let fresh: Tokens = self
            .post_json(
                "/oauth/token",
                &json!({
                    "grant_type": "refresh_token",
                    "refresh_token": refresh_token,
                    "client_id": CLIENT_ID,
                }),
            )
            .await?;
        self.cache.write(TOKENS_FILE, &fresh)?;
        Ok(fresh)
    }

    pub fn cached_tokens(&self) -> Result<Tokens> {
        self.cache.read(TOKENS_FILE)?.ok_or(SkiffError::NotLoggedIn)
    }

    /// Cached tokens plus user info, fetching the latter if it is missing.
    pub async fn verify(&self) -> Result<(Tokens, UserInfo)> {
        let tokens = self.cached_tokens()?;
        let user = match self.cache.read(USER_FILE)? {
            Some(user) => user,
            None => self.fetch_user_info(&tokens.access_token).await?,
        };
        Ok((tokens, user))
    }

    pub fn logout(&self) -> Result<()> {
        self.cache.clear()
    }

    async fn post_json<T: DeserializeOwned>(
        &self,
        path: &str,
        body: &serde_json::Value,
    ) -> Result<T> {
        let url = format!("{}{}", self.base_url, path);
        let resp = self.http.post(&url).json(body).send().await?;
        if !resp.status().is_success() {
            return Err(SkiffError::Provider {
                endpoint: url,
                status: resp.status().as_u16(),
            });
        }
        Ok(resp.json().await?)
    }
}

// ---------------------------------------------------------------------------
// AWS credential exchange
// ---------------------------------------------------------------------------

/// Trade the cached OIDC token for short-lived AWS credentials scoped to
/// `app`. If the identity has no role mapping for the app, refresh once to
/// pick up newly granted access before giving up.
pub async fn app_credentials(
    auth: &AuthClient,
    sts: &aws_sdk_sts::Client,
    app: &str,
) -> Result<aws_credential_types::Credentials> {
    let (mut tokens, mut user) = auth.verify().await?;
    let role_arn = match user.aws_roles.get(app) {
        Some(arn) => arn.clone(),
        None => {
            debug!(app, "no cached role; refreshing tokens to check for new access");
            tokens = auth.refresh_tokens().await?;
            user = auth.fetch_user_info(&tokens.access_token).await?;
            user.aws_roles
                .get(app)
                .cloned()
                .ok_or_else(|| SkiffError::NoAccess(app.to_string()))?
        }
    };

    debug!(%role_arn, "fetching AWS credentials");
    match assume_role(sts, &role_arn, &tokens.id_token, &user.email).await {
        Ok(creds) => Ok(creds),
        Err(e) if token_expired(&e) => {
            let tokens = auth.refresh_tokens().await?;
            assume_role(sts, &role_arn, &tokens.id_token, &user.email)
                .await
                .map_err(|e| SkiffError::aws("sts:AssumeRoleWithWebIdentity", e))
        }
        Err(e) => Err(SkiffError::aws("sts:AssumeRoleWithWebIdentity", e)),
    }
}

type StsError = aws_sdk_sts::error::SdkError<
    aws_sdk_sts::operation::assume_role_with_web_identity::AssumeRoleWithWebIdentityError,
>;

fn token_expired(err: &StsError) -> bool {
    err.as_service_error()
        .map(|e| e.is_expired_token_exception())
        .unwrap_or(false)
}

async fn assume_role(
    sts: &aws_sdk_sts::Client,
    role_arn: &str,
    web_identity_token: &str,
    session_name: &str,
) -> std::result::Result<aws_credential_types::Credentials, StsError> {
    let resp = sts
        .assume_role_with_web_identity()
        .role_arn(role_arn)
        .web_identity_token(web_identity_token)
        .role_session_name(session_name)
        .duration_seconds(900)
        .send()
        .await?;
    let creds = resp
        .credentials()
        .expect("STS returns credentials on success");
    Ok(aws_credential_types::Credentials::new(
        creds.access_key_id(),
        creds.secret_access_key(),
        Some(creds.session_token().to_string()),
        None,
        "skiff-sts",
    ))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn cache(dir: &tempfile::TempDir) -> TokenCache {
        TokenCache::at(dir.path())
    }

    fn tokens() -> Tokens {
        Tokens {
            access_token: "at".into(),
            id_token: "it".into(),
            refresh_token: Some("rt".into()),
            expires_in: Some(86400),
        }
    }

    #[test]
    fn cache_round_trip_and_clear() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache(&dir);
        cache.write(TOKENS_FILE, &tokens()).unwrap();
        let read: Tokens = cache.read(TOKENS_FILE).unwrap().unwrap();
        assert_eq!(read.access_token, "at");

        cache.clear().unwrap();
        assert!(cache.read::<Tokens>(TOKENS_FILE).unwrap().is_none());
    }

    #[cfg(unix)]
    #[test]
    fn cache_files_are_owner_only() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().unwrap();
        cache(&dir).write(TOKENS_FILE, &tokens()).unwrap();
        let mode = std::fs::metadata(dir.path().join(TOKENS_FILE))
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn cached_tokens_requires_login() {
        let dir = tempfile::tempdir().unwrap();
        let client = AuthClient::with("http://unused", cache(&dir));
        assert!(matches!(
            client.cached_tokens(),
            Err(SkiffError::NotLoggedIn)
        ));
    }

    #[tokio::test]
    async fn device_authorization_request() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/oauth/device/code")
            .match_header("content-type", "application/json")
            .with_body(
                serde_json::json!({
                    "device_code": "dc",
                    "user_code": "ABCD-EFGH",
                    "verification_uri": "https://auth.skiff.sh/activate",
                    "verification_uri_complete": "https://auth.skiff.sh/activate?user_code=ABCD-EFGH",
                    "expires_in": 900,
                    "interval": 5,
                })
                .to_string(),
            )
            .create_async()
            .await;

        let dir = tempfile::tempdir().unwrap();
        let client = AuthClient::with(server.url(), cache(&dir));
        let authz = client.request_device_authorization().await.unwrap();
        assert_eq!(authz.user_code, "ABCD-EFGH");
        assert_eq!(authz.interval, Some(5));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn poll_for_tokens_success_persists_cache() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/oauth/token")
            .with_body(
                serde_json::json!({
                    "access_token": "at",
                    "id_token": "it",
                    "refresh_token": "rt",
                    "expires_in": 86400,
                })
                .to_string(),
            )
            .create_async()
            .await;

        let dir = tempfile::tempdir().unwrap();
        let client = AuthClient::with(server.url(), cache(&dir));
        let authz = DeviceAuthorization {
            device_code: "dc".into(),
            user_code: "u".into(),
            verification_uri: "v".into(),
            verification_uri_complete: "vc".into(),
            expires_in: 900,
            interval: Some(1),
        };
        let got = client.poll_for_tokens(&authz).await.unwrap();
        assert_eq!(got.id_token, "it");
        // cache was written
        assert_eq!(client.cached_tokens().unwrap().access_token, "at");
    }

    #[tokio::test]
    async fn poll_for_tokens_expired_code() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/oauth/token")
            .with_status(403)
            .with_body(r#"{"error": "expired_token"}"#)
            .create_async()
            .await;

        let dir = tempfile::tempdir().unwrap();
        let client = AuthClient::with(server.url(), cache(&dir));
        let authz = DeviceAuthorization {
            device_code: "dc".into(),
            user_code: "u".into(),
            verification_uri: "v".into(),
            verification_uri_complete: "vc".into(),
            expires_in: 900,
            interval: Some(1),
        };
        assert!(matches!(
            client.poll_for_tokens(&authz).await,
            Err(SkiffError::DeviceFlowExpired)
        ));
    }

    #[tokio::test]
    async fn user_info_parses_roles_claim() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/userinfo")
            .match_header("authorization", "Bearer at")
            .with_body(
                serde_json::json!({
                    "email": "dev@example.com",
                    "name": "Dev",
                    "https://skiff.sh/aws_roles": {
                        "demo": "arn:aws:iam::123456789012:role/skiff-demo"
                    },
                })
                .to_string(),
            )
            .create_async()
            .await;

        let dir = tempfile::tempdir().unwrap();
        let client = AuthClient::with(server.url(), cache(&dir));
        let user = client.fetch_user_info("at").await.unwrap();
        assert_eq!(user.email, "dev@example.com");
        assert_eq!(
            user.aws_roles.get("demo").map(String::as_str),
            Some("arn:aws:iam::123456789012:role/skiff-demo")
        );
        // verify() now reads from cache without another request
        let cached: Option<UserInfo> = cache(&dir).read(USER_FILE).unwrap();
        assert!(cached.is_some());
    }

    #[tokio::test]
    async fn refresh_requires_refresh_token() {
        let dir = tempfile::tempdir().unwrap();
        let c = cache(&dir);
        c.write(
            TOKENS_FILE,
            &Tokens {
                refresh_token: None,
                ..tokens()
            },
        )
        .unwrap();
        let client = AuthClient::with("http://unused", c);
        assert!(matches!(
            client.refresh_tokens().await,
            Err(SkiffError::NotLoggedIn)
        ));
    }
}
