use crate::cmd;
use crate::error::{DeployError, DeployResult};

/// Keeps `apt-get` and package maintainer scripts from
/// prompting.
pub const APT_ENV: [(&str, &str); 1] = [("DEBIAN_FRONTEND", "noninteractive")];

/// Host-level operations: packages, services, crontab, and
/// identity.
pub trait System {
    fn is_root(&self) -> bool;

    fn package_installed(&self, name: &str) -> bool;

    /// Refresh the package index. Called once before installs.
    fn refresh_packages(&self) -> DeployResult<()>;

    fn install_package(&self, name: &str) -> DeployResult<()>;

    fn service_active(&self, name: &str) -> bool;

    /// Whether the service starts at boot.
    fn service_enabled(&self, name: &str) -> bool;

    fn enable_service(&self, name: &str) -> DeployResult<()>;

    fn start_service(&self, name: &str) -> DeployResult<()>;

    /// Current user's crontab; empty when none is installed.
    fn read_crontab(&self) -> DeployResult<String>;

    fn write_crontab(&self, content: &str) -> DeployResult<()>;

    /// Address other hosts can reach this one on.
    fn host_address(&self) -> Option<String>;
}

/// [`System`] for Debian-family hosts: `dpkg`/`apt-get`,
/// `systemctl` and `crontab`.
#[derive(Debug, Clone, Copy, Default)]
pub struct HostSystem;

impl HostSystem {
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl System for HostSystem {
    fn is_root(&self) -> bool {
        cmd::run("id", &["-u"]).is_ok_and(|uid| uid == "0")
    }

    fn package_installed(&self, name: &str) -> bool {
        cmd::run("dpkg-query", &["-W", "-f=${Status}", name])
            .is_ok_and(|status| status.ends_with("installed") && !status.contains("not-installed"))
    }

    fn refresh_packages(&self) -> DeployResult<()> {
        cmd::run_interactive_env(&APT_ENV, "apt-get", &["update", "-qq"])
            .map_err(|e| DeployError::PackageInstall(format!("apt-get update: {e}")))
    }

    fn install_package(&self, name: &str) -> DeployResult<()> {
        cmd::run_interactive_env(&APT_ENV, "apt-get", &["install", "-y", "-qq", name])
            .map_err(|e| DeployError::PackageInstall(format!("{name}: {e}")))
    }

    fn service_active(&self, name: &str) -> bool {
        cmd::succeeds(None, "systemctl", &["is-active", "--quiet", name])
    }

    fn service_enabled(&self, name: &str) -> bool {
        cmd::succeeds(None, "systemctl", &["is-enabled", "--quiet", name])
    }

    fn enable_service(&self, name: &str) -> DeployResult<()> {
        cmd::run("systemctl", &["enable", name])
            .map(drop)
            .map_err(|e| DeployError::Service(format!("enable {name}: {e}")))
    }

    fn start_service(&self, name: &str) -> DeployResult<()> {
        cmd::run("systemctl", &["start", name])
            .map(drop)
            .map_err(|e| DeployError::Service(format!("start {name}: {e}")))
    }

    fn read_crontab(&self) -> DeployResult<String> {
        let output = cmd::output_in(None, "crontab", &["-l"])?;
        if output.status.success() {
            return Ok(String::from_utf8_lossy(&output.stdout).into_owned());
        }
        let stderr = String::from_utf8_lossy(&output.stderr);
        if stderr.contains("no crontab") {
            Ok(String::new())
        } else {
            Err(DeployError::CommandFailed {
                command: "crontab -l".to_string(),
                status: output.status,
            })
        }
    }

    fn write_crontab(&self, content: &str) -> DeployResult<()> {
        cmd::run_with_stdin("crontab", &["-"], content.as_bytes())?;
        Ok(())
    }

    fn host_address(&self) -> Option<String> {
        cmd::run("hostname", &["-I"])
            .ok()
            .and_then(|out| out.split_whitespace().next().map(ToString::to_string))
    }
}

/// Installs missing packages and keeps the container runtime
/// service up.
pub struct Installer<'a> {
    system: &'a dyn System,
    packages: Vec<String>,
    runtime_service: String,
}

impl<'a> Installer<'a> {
    #[must_use]
    pub fn new(system: &'a dyn System, packages: &[String], runtime_service: &str) -> Self {
        Self {
            system,
            packages: packages.to_vec(),
            runtime_service: runtime_service.to_string(),
        }
    }

    #[must_use]
    pub fn missing(&self) -> Vec<String> {
        self.packages
            .iter()
            .filter(|p| !self.system.package_installed(p))
            .cloned()
            .collect()
    }

    /// Install whatever is missing and make sure the runtime
    /// service is enabled and running. A no-op once everything
    /// is in place.
    pub fn ensure(&self) -> DeployResult<()> {
        let missing = self.missing();
        if missing.is_empty() {
            tracing::debug!("all required packages installed");
        } else {
            tracing::info!(packages = %missing.join(" "), "installing missing packages");
            self.system.refresh_packages()?;
            for package in &missing {
                self.system.install_package(package)?;
                tracing::info!(%package, "installed");
            }
        }

        let service = self.runtime_service.as_str();
        if !self.system.service_enabled(service) {
            tracing::info!(%service, "enabling container runtime at boot");
            self.system.enable_service(service)?;
        }
        if !self.system.service_active(service) {
            tracing::info!(%service, "starting container runtime");
            self.system.start_service(service)?;
        }
        Ok(())
    }
}
