use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{DeployError, DeployResult};

/// Environment variable naming the config file when `--config`
/// is not given.
pub const CONFIG_ENV: &str = "PIZZARIA_DEPLOY_CONFIG";

/// Config file read when neither `--config` nor
/// [`CONFIG_ENV`] is set. Optional.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/pizzaria-deploy.toml";

/// Everything the deploy run needs to know about the target
/// application and host.
///
/// Loaded from TOML, every key optional:
///
/// ```
/// use pizzaria_deploy::Config;
///
/// let config = Config::from_toml_str(
///     r#"
///     repo_url = "https://example.com/pizzaria.git"
///     branch = "main"
///     settle_secs = 3
///     "#,
/// )
/// .unwrap();
///
/// assert_eq!(config.branch.as_deref(), Some("main"));
/// assert_eq!(config.settle_secs, 3);
/// assert_eq!(config.compose_file, "docker-compose.yml");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub name: String,
    pub repo_url: Option<String>,
    /// `None` detects the remote default branch.
    pub branch: Option<String>,
    pub checkout_dir: PathBuf,
    /// Relative to `checkout_dir`.
    pub compose_file: String,
    pub lock_file: PathBuf,
    pub log_file: Option<PathBuf>,
    pub packages: Vec<String>,
    pub runtime_service: String,
    /// Tried in order; the first one systemd accepts wins.
    pub cron_services: Vec<String>,
    pub schedule: String,
    pub settle_secs: u64,
    /// Empty means "published ports from the compose manifest".
    pub probe_ports: Vec<u16>,
    pub probe_timeout_secs: u64,
    pub prune: bool,
    pub require_root: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            name: "pizzaria".to_string(),
            repo_url: None,
            branch: None,
            checkout_dir: PathBuf::from("/opt/pizzaria"),
            compose_file: "docker-compose.yml".to_string(),
            lock_file: PathBuf::from("/tmp/pizzaria-deploy.lock"),
            log_file: Some(PathBuf::from("/var/log/pizzaria-deploy.log")),
            packages: vec![
                "docker.io".to_string(),
                "docker-compose".to_string(),
                "git".to_string(),
                "cron".to_string(),
            ],
            runtime_service: "docker".to_string(),
            cron_services: vec!["cron".to_string(), "crond".to_string()],
            schedule: "*/5 * * * *".to_string(),
            settle_secs: 10,
            probe_ports: Vec::new(),
            probe_timeout_secs: 5,
            prune: true,
            require_root: true,
        }
    }
}

impl Config {
    #[must_use]
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Self::default()
        }
    }

    pub fn from_toml_str(content: &str) -> DeployResult<Self> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> DeployResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                DeployError::FileNotFound(path.display().to_string())
            } else {
                DeployError::Io(e)
            }
        })?;
        Self::from_toml_str(&content)
    }

    /// File [`Config::load`] reads: explicit path, then
    /// [`CONFIG_ENV`], then [`DEFAULT_CONFIG_PATH`] if present.
    /// `None` means built-in defaults.
    #[must_use]
    pub fn source(explicit: Option<&Path>) -> Option<PathBuf> {
        if let Some(path) = explicit {
            return Some(path.to_path_buf());
        }
        if let Some(path) = std::env::var_os(CONFIG_ENV) {
            return Some(PathBuf::from(path));
        }
        let fallback = Path::new(DEFAULT_CONFIG_PATH);
        fallback.exists().then(|| fallback.to_path_buf())
    }

    /// Load from [`Config::source`], or defaults when there is
    /// no file.
    pub fn load(explicit: Option<&Path>) -> DeployResult<Self> {
        match Self::source(explicit) {
            Some(path) => Self::from_file(&path),
            None => Ok(Self::default()),
        }
    }

    pub fn validate(&self) -> DeployResult<()> {
        if !self.name.chars().any(|c| c.is_ascii_alphanumeric()) {
            return Err(DeployError::Config(
                "name must contain a letter or digit".into(),
            ));
        }
        if self.compose_file.trim().is_empty() {
            return Err(DeployError::Config("compose_file must not be empty".into()));
        }
        if self.schedule.split_whitespace().count() != 5 {
            return Err(DeployError::Config(format!(
                "schedule '{}' must have five cron fields",
                self.schedule
            )));
        }
        if self.branch.as_deref().is_some_and(|b| b.trim().is_empty()) {
            return Err(DeployError::Config("branch must not be empty".into()));
        }
        Ok(())
    }

    #[must_use]
    pub fn manifest_path(&self) -> PathBuf {
        self.checkout_dir.join(&self.compose_file)
    }

    #[must_use]
    pub fn repo_url(mut self, url: &str) -> Self {
        self.repo_url = Some(url.to_string());
        self
    }

    #[must_use]
    pub fn branch(mut self, branch: &str) -> Self {
        self.branch = Some(branch.to_string());
        self
    }

    #[must_use]
    pub fn checkout_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.checkout_dir = dir.into();
        self
    }

    #[must_use]
    pub fn compose_file(mut self, file: &str) -> Self {
        self.compose_file = file.to_string();
        self
    }

    #[must_use]
    pub fn lock_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.lock_file = path.into();
        self
    }

    #[must_use]
    pub fn log_file(mut self, path: Option<PathBuf>) -> Self {
        self.log_file = path;
        self
    }

    #[must_use]
    pub fn package(mut self, name: &str) -> Self {
        self.packages.push(name.to_string());
        self
    }

    #[must_use]
    pub fn packages(mut self, names: &[&str]) -> Self {
        self.packages = names.iter().map(|n| (*n).to_string()).collect();
        self
    }

    #[must_use]
    pub fn schedule(mut self, schedule: &str) -> Self {
        self.schedule = schedule.to_string();
        self
    }

    #[must_use]
    pub const fn settle_secs(mut self, secs: u64) -> Self {
        self.settle_secs = secs;
        self
    }

    #[must_use]
    pub fn probe_port(mut self, port: u16) -> Self {
        self.probe_ports.push(port);
        self
    }

    #[must_use]
    pub const fn prune(mut self, prune: bool) -> Self {
        self.prune = prune;
        self
    }

    #[must_use]
    pub const fn require_root(mut self, require: bool) -> Self {
        self.require_root = require;
        self
    }
}
