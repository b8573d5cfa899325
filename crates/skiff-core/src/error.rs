use thiserror::Error;

#[derive(Debug, Error)]
pub enum SkiffError {
    #[error("no application given: pass --app or set SKIFF_APP")]
    NoApplication,

    #[error("not logged in: run 'skiff auth login'")]
    NotLoggedIn,

    #[error("you don't have access to {0}")]
    NoAccess(String),

    #[error("app already exists: {0}")]
    AppExists(String),

    #[error("app not found: {0}")]
    AppNotFound(String),

    #[error("cluster already exists: {0}")]
    ClusterExists(String),

    #[error("cluster not found: {0}")]
    ClusterNotFound(String),

    #[error("account resources already exist")]
    AccountExists,

    #[error("account resources not found")]
    AccountNotFound,

    #[error("stack {name} finished in {status}")]
    StackFailed { name: String, status: String },

    #[error("task exited with code {0}")]
    TaskFailed(i32),

    #[error("task stopped before reaching RUNNING")]
    TaskStopped,

    #[error("no successful build found for {0}")]
    NoSuccessfulBuild(String),

    #[error("pipeline not found: {0}")]
    PipelineNotFound(String),

    #[error("invalid promotion: {0}")]
    Promotion(String),

    #[error("unsupported repository url: {0}")]
    UnsupportedRepository(String),

    #[error("{0} is not installed")]
    MissingDependency(&'static str),

    #[error("request to {endpoint} failed with status {status}")]
    Provider { endpoint: String, status: u16 },

    #[error("device authorization expired before it was approved")]
    DeviceFlowExpired,

    #[error("device authorization was denied")]
    DeviceFlowDenied,

    #[error("aws {op} failed: {source}")]
    Aws {
        op: &'static str,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Http(#[from] reqwest::Error),
}

impl SkiffError {
    /// Wrap an AWS SDK error, recording the API operation that failed.
    pub fn aws<E>(op: &'static str, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        SkiffError::Aws {
            op,
            source: Box::new(source),
        }
    }
}

pub type Result<T> = std::result::Result<T, SkiffError>;
