use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use crate::compose::{ContainerRuntime, DockerCompose};
use crate::config::Config;
use crate::deploy::probe::{HttpProbe, Probe};
use crate::deploy::{DeployReport, Deployer};
use crate::error::{Advisory, DeployError, DeployResult};
use crate::git::{GitCli, Synchronizer, UpdateCheck, Vcs};
use crate::lock::LockGuard;
use crate::logging::LogFormat;
use crate::revision::Revision;
use crate::schedule::{ScheduleEntry, Scheduler};
use crate::status::StatusReport;
use crate::system::{HostSystem, Installer, System};

/// Which path a run takes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Deploy when upstream moved or nothing is running.
    Normal,
    /// Sync and deploy unconditionally.
    Forced,
    /// Report only. Takes no lock and changes nothing.
    Status,
}

/// Why a deploy happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeployReason {
    Cloned,
    Updated,
    NoContainers,
    Forced,
}

/// How a run ended. Every variant maps to exit code 0.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    AlreadyRunning,
    UpToDate {
        revision: Revision,
    },
    Deployed {
        reason: DeployReason,
        revision: Revision,
        report: DeployReport,
    },
    Reported(StatusReport),
}

/// Deploy run orchestrating lock, dependencies, sync, deploy,
/// schedule and status.
pub struct Pipeline {
    config: Config,
    vcs: Box<dyn Vcs>,
    runtime: Box<dyn ContainerRuntime>,
    system: Box<dyn System>,
    probe: Box<dyn Probe>,
    schedule_command: Option<PathBuf>,
    config_path: Option<PathBuf>,
}

impl Pipeline {
    #[must_use]
    pub fn new(
        config: Config,
        vcs: impl Vcs + 'static,
        runtime: impl ContainerRuntime + 'static,
        system: impl System + 'static,
        probe: impl Probe + 'static,
    ) -> Self {
        Self {
            config,
            vcs: Box::new(vcs),
            runtime: Box::new(runtime),
            system: Box::new(system),
            probe: Box::new(probe),
            schedule_command: None,
            config_path: None,
        }
    }

    /// Pipeline wired to the real host tools.
    pub fn host(config: Config) -> DeployResult<Self> {
        let probe = HttpProbe::new(Duration::from_secs(config.probe_timeout_secs))?;
        let runtime = DockerCompose::detect(&config.name);
        tracing::debug!(
            compose = %runtime.program(),
            project = runtime.project(),
            "compose command"
        );
        Ok(Self::new(config, GitCli::new(), runtime, HostSystem::new(), probe))
    }

    /// Command the crontab entry runs. Defaults to the current
    /// executable.
    #[must_use]
    pub fn schedule_command(mut self, path: impl Into<PathBuf>) -> Self {
        self.schedule_command = Some(path.into());
        self
    }

    /// Config file the crontab entry passes back via `--config`.
    /// Made absolute, since cron runs from another directory.
    #[must_use]
    pub fn config_path(mut self, path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        self.config_path = Some(std::path::absolute(&path).unwrap_or(path));
        self
    }

    #[must_use]
    pub const fn config(&self) -> &Config {
        &self.config
    }

    pub fn run(&self, mode: Mode) -> DeployResult<RunOutcome> {
        if mode == Mode::Status {
            let report = self.status();
            report.log();
            return Ok(RunOutcome::Reported(report));
        }

        let Some(lock) = LockGuard::acquire(&self.config.lock_file)? else {
            return Ok(RunOutcome::AlreadyRunning);
        };

        let outcome = self.run_locked(mode);
        if let Err(e) = lock.release() {
            tracing::warn!(error = %e, "failed to release lock");
        }
        outcome
    }

    fn run_locked(&self, mode: Mode) -> DeployResult<RunOutcome> {
        tracing::info!(app = %self.config.name, ?mode, "deploy run started");

        if self.config.require_root && !self.system.is_root() {
            return Err(DeployError::PrivilegeRequired(
                "run as root or set require_root = false".into(),
            ));
        }

        Installer::new(
            self.system.as_ref(),
            &self.config.packages,
            &self.config.runtime_service,
        )
        .ensure()?;

        let sync = Synchronizer::new(
            self.vcs.as_ref(),
            &self.config.checkout_dir,
            self.config.repo_url.as_deref(),
            self.config.branch.as_deref(),
        );
        let deployer = self.deployer();

        let check = sync.check()?;
        let outcome = match (mode, check) {
            (Mode::Forced, check) => {
                let revision = Self::sync_for(&sync, &check)?;
                self.deploy(&deployer, DeployReason::Forced, revision)?
            }
            (_, UpdateCheck::Cloned(revision)) => {
                self.deploy(&deployer, DeployReason::Cloned, revision)?
            }
            (_, check @ UpdateCheck::Behind { .. }) => {
                let revision = Self::sync_for(&sync, &check)?;
                self.deploy(&deployer, DeployReason::Updated, revision)?
            }
            (_, UpdateCheck::UpToDate(revision)) => {
                let running = deployer.running().unwrap_or_else(|e| {
                    tracing::warn!(error = %e, "cannot list containers, assuming none running");
                    0
                });
                if running == 0 {
                    tracing::info!("no containers running, redeploying");
                    self.deploy(&deployer, DeployReason::NoContainers, revision)?
                } else {
                    tracing::info!(running, "nothing to do");
                    RunOutcome::UpToDate { revision }
                }
            }
        };

        self.install_schedule().log("schedule");
        self.status().log();

        tracing::info!("deploy run finished");
        Ok(outcome)
    }

    fn sync_for(sync: &Synchronizer<'_>, check: &UpdateCheck) -> DeployResult<Revision> {
        match check {
            UpdateCheck::Cloned(revision) => Ok(revision.clone()),
            other => sync.synchronize(other.target()),
        }
    }

    fn deploy(
        &self,
        deployer: &Deployer<'_>,
        reason: DeployReason,
        revision: Revision,
    ) -> DeployResult<RunOutcome> {
        tracing::info!(?reason, revision = revision.short(), "deploying");
        let report = deployer.deploy()?;
        if !report.all_probes_ok() {
            tracing::warn!("deploy succeeded but not every port answered yet");
        }
        Ok(RunOutcome::Deployed {
            reason,
            revision,
            report,
        })
    }

    fn deployer(&self) -> Deployer<'_> {
        Deployer::new(
            self.runtime.as_ref(),
            self.probe.as_ref(),
            &self.config.name,
            &self.config.checkout_dir,
            &self.config.manifest_path(),
        )
        .prune(self.config.prune)
        .settle(Duration::from_secs(self.config.settle_secs))
        .probe_ports(&self.config.probe_ports)
    }

    fn install_schedule(&self) -> Advisory {
        let entry = match &self.schedule_command {
            Some(path) => Ok(ScheduleEntry::new(&self.config.schedule, path)),
            None => ScheduleEntry::for_current_exe(&self.config.schedule),
        };
        let entry = match entry {
            Ok(entry) => entry
                .config(self.config_path.as_deref())
                .log_file(self.config.log_file.as_deref()),
            Err(e) => return Advisory::Failed(e.to_string()),
        };

        let scheduler = Scheduler::new(self.system.as_ref(), &self.config.cron_services);
        let installed = Advisory::from_result(scheduler.install(&entry));
        scheduler.ensure_service().log("cron service");
        installed
    }

    fn status(&self) -> StatusReport {
        StatusReport::gather(
            self.vcs.as_ref(),
            self.runtime.as_ref(),
            self.system.as_ref(),
            &self.config.checkout_dir,
            &self.config.manifest_path(),
        )
    }
}

#[derive(Debug, Parser)]
#[command(name = "deploy")]
#[command(about = "Sync the pizzaria checkout, rebuild and restart its containers")]
pub struct Cli {
    /// Report git and container state only
    #[arg(long, conflicts_with = "force")]
    pub status: bool,

    /// Redeploy even when the checkout is up to date
    #[arg(long)]
    pub force: bool,

    /// Path to a TOML config file
    #[arg(long, short)]
    pub config: Option<PathBuf>,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Human)]
    pub log_format: LogFormat,
}

impl Cli {
    #[must_use]
    pub const fn mode(&self) -> Mode {
        if self.status {
            Mode::Status
        } else if self.force {
            Mode::Forced
        } else {
            Mode::Normal
        }
    }
}
