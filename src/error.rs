use std::fmt;
use std::process::ExitStatus;

pub type DeployResult<T> = Result<T, DeployError>;

#[derive(Debug, thiserror::Error)]
pub enum DeployError {
    #[error("command failed: {command}")]
    CommandFailed { command: String, status: ExitStatus },

    #[error("command not found: {0}")]
    CommandNotFound(String),

    #[error("root privileges required: {0}")]
    PrivilegeRequired(String),

    #[error("package install failed: {0}")]
    PackageInstall(String),

    #[error("service error: {0}")]
    Service(String),

    #[error("repository error: {0}")]
    Repository(String),

    #[error("file not found: {0}")]
    FileNotFound(String),

    #[error("no containers running after deploy of '{0}'")]
    NoRunningContainers(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("lock error: {0}")]
    Lock(String),

    #[error("{0}")]
    Other(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Toml(#[from] toml::de::Error),
}

/// Outcome of a best-effort step. Never escalated into a
/// [`DeployError`]; the orchestrator only logs it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Advisory {
    Done,
    Skipped(String),
    Failed(String),
}

impl Advisory {
    /// Fold a fallible step into an advisory outcome.
    #[must_use]
    pub fn from_result<T>(result: DeployResult<T>) -> Self {
        match result {
            Ok(_) => Self::Done,
            Err(e) => Self::Failed(e.to_string()),
        }
    }

    #[must_use]
    pub const fn is_failed(&self) -> bool {
        matches!(self, Self::Failed(_))
    }

    /// Log the outcome of `step`: failures at warn, skips at
    /// debug.
    pub fn log(&self, step: &str) {
        match self {
            Self::Done => tracing::debug!(step, "done"),
            Self::Skipped(reason) => tracing::debug!(step, %reason, "skipped"),
            Self::Failed(reason) => tracing::warn!(step, %reason, "best-effort step failed"),
        }
    }
}

impl fmt::Display for Advisory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Done => f.write_str("done"),
            Self::Skipped(reason) => write!(f, "skipped: {reason}"),
            Self::Failed(reason) => write!(f, "failed: {reason}"),
        }
    }
}
