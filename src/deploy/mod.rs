pub mod probe;

use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use crate::compose::{self, ContainerRuntime};
use crate::deploy::probe::Probe;
use crate::error::{Advisory, DeployError, DeployResult};

/// Port probed when neither the config nor the manifest names
/// one.
pub const DEFAULT_PROBE_PORT: u16 = 80;

/// What a successful deploy observed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeployReport {
    pub running: usize,
    pub prune: Advisory,
    pub probes: Vec<(u16, Advisory)>,
}

impl DeployReport {
    /// Whether every liveness probe answered.
    #[must_use]
    pub fn all_probes_ok(&self) -> bool {
        self.probes.iter().all(|(_, a)| !a.is_failed())
    }
}

/// Tears down and rebuilds the compose project in a checkout.
pub struct Deployer<'a> {
    runtime: &'a dyn ContainerRuntime,
    probe: &'a dyn Probe,
    name: String,
    dir: PathBuf,
    manifest: PathBuf,
    prune: bool,
    settle: Duration,
    probe_ports: Vec<u16>,
}

impl<'a> Deployer<'a> {
    #[must_use]
    pub fn new(
        runtime: &'a dyn ContainerRuntime,
        probe: &'a dyn Probe,
        name: &str,
        dir: &Path,
        manifest: &Path,
    ) -> Self {
        Self {
            runtime,
            probe,
            name: name.to_string(),
            dir: dir.to_path_buf(),
            manifest: manifest.to_path_buf(),
            prune: true,
            settle: Duration::from_secs(10),
            probe_ports: Vec::new(),
        }
    }

    #[must_use]
    pub const fn prune(mut self, prune: bool) -> Self {
        self.prune = prune;
        self
    }

    #[must_use]
    pub const fn settle(mut self, settle: Duration) -> Self {
        self.settle = settle;
        self
    }

    #[must_use]
    pub fn probe_ports(mut self, ports: &[u16]) -> Self {
        self.probe_ports = ports.to_vec();
        self
    }

    /// Stop, prune, rebuild, start, then verify.
    ///
    /// Fatal: missing manifest, failed build or start, nothing
    /// running after the settle delay. Everything else is
    /// advisory.
    pub fn deploy(&self) -> DeployResult<DeployReport> {
        if !self.manifest.is_file() {
            return Err(DeployError::FileNotFound(format!(
                "compose manifest {}",
                self.manifest.display()
            )));
        }

        tracing::info!(app = %self.name, "stopping existing containers");
        if let Err(e) = self.runtime.down(&self.dir, &self.manifest) {
            tracing::warn!(error = %e, "compose down failed, continuing");
        }

        let prune = if self.prune {
            Advisory::from_result(self.runtime.prune())
        } else {
            Advisory::Skipped("disabled".into())
        };
        prune.log("prune");

        tracing::info!(app = %self.name, "building images");
        self.runtime.build(&self.dir, &self.manifest)?;

        tracing::info!(app = %self.name, "starting containers");
        self.runtime.up(&self.dir, &self.manifest)?;

        if !self.settle.is_zero() {
            tracing::info!(secs = self.settle.as_secs(), "waiting for containers to settle");
            thread::sleep(self.settle);
        }

        let running = self.running()?;
        if running == 0 {
            return Err(DeployError::NoRunningContainers(self.name.clone()));
        }
        tracing::info!(running, "containers up");

        let ports = self.resolve_probe_ports();
        let probes = probe::probe_all(self.probe, &ports);

        Ok(DeployReport {
            running,
            prune,
            probes,
        })
    }

    /// Number of running containers in the project.
    pub fn running(&self) -> DeployResult<usize> {
        let containers = self.runtime.containers(&self.dir, &self.manifest)?;
        Ok(containers.iter().filter(|c| c.is_running()).count())
    }

    fn resolve_probe_ports(&self) -> Vec<u16> {
        if !self.probe_ports.is_empty() {
            return self.probe_ports.clone();
        }
        let from_manifest = std::fs::read_to_string(&self.manifest)
            .map_err(DeployError::from)
            .and_then(|text| compose::published_ports(&text));
        match from_manifest {
            Ok(ports) if !ports.is_empty() => ports,
            Ok(_) => vec![DEFAULT_PROBE_PORT],
            Err(e) => {
                tracing::warn!(error = %e, "cannot read published ports from manifest");
                vec![DEFAULT_PROBE_PORT]
            }
        }
    }
}
