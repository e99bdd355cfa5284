//! Recording fakes for the collaborator traits.

#![allow(dead_code)]

use std::cell::RefCell;
use std::path::{Path, PathBuf};
use std::process::{Child, Command};
use std::rc::Rc;

use chrono::Utc;

use pizzaria_deploy::compose::{ContainerInfo, ContainerRuntime, Publisher};
use pizzaria_deploy::deploy::probe::Probe;
use pizzaria_deploy::error::{DeployError, DeployResult};
use pizzaria_deploy::git::Vcs;
use pizzaria_deploy::lock::LockRecord;
use pizzaria_deploy::pipeline::Pipeline;
use pizzaria_deploy::system::System;
use pizzaria_deploy::{Config, Revision};
use tempfile::TempDir;

pub const REV_A: &str = "aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa";
pub const REV_B: &str = "bbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb";
pub const DEPLOY_BIN: &str = "/usr/local/bin/deploy";

pub type Calls = Rc<RefCell<Vec<String>>>;

pub fn rev(hash: &str) -> Revision {
    Revision::parse(hash).unwrap()
}

fn record(calls: &Calls, call: impl Into<String>) {
    calls.borrow_mut().push(call.into());
}

pub fn called(calls: &Calls, prefix: &str) -> bool {
    calls.borrow().iter().any(|c| c.starts_with(prefix))
}

// --- processes ---

/// A live process other than the test itself, killed on drop.
pub struct OtherProcess(Child);

impl OtherProcess {
    pub fn spawn() -> Self {
        Self(Command::new("sleep").arg("60").spawn().unwrap())
    }

    pub fn pid(&self) -> u32 {
        self.0.id()
    }

    /// Lock body naming this process as the holder.
    pub fn lock_record(&self) -> Vec<u8> {
        let record = LockRecord {
            pid: self.pid(),
            acquired_at: Utc::now(),
        };
        serde_json::to_vec(&record).unwrap()
    }
}

impl Drop for OtherProcess {
    fn drop(&mut self) {
        let _ = self.0.kill();
        let _ = self.0.wait();
    }
}

/// Pid of a process that has already exited.
pub fn exited_pid() -> u32 {
    let mut child = Command::new("true").spawn().unwrap();
    let pid = child.id();
    child.wait().unwrap();
    pid
}

// --- git ---

#[derive(Debug, Clone)]
pub struct VcsState {
    pub checkout: bool,
    pub local: Revision,
    pub remote: Revision,
    pub branch: String,
    pub default_branch: Option<String>,
    pub fail_clone: bool,
}

#[derive(Clone)]
pub struct FakeVcs {
    pub calls: Calls,
    pub state: Rc<RefCell<VcsState>>,
}

impl FakeVcs {
    pub fn new(calls: &Calls, local: &str, remote: &str) -> Self {
        Self {
            calls: calls.clone(),
            state: Rc::new(RefCell::new(VcsState {
                checkout: true,
                local: rev(local),
                remote: rev(remote),
                branch: "main".to_string(),
                default_branch: Some("main".to_string()),
                fail_clone: false,
            })),
        }
    }
}

impl Vcs for FakeVcs {
    fn is_checkout(&self, _dir: &Path) -> bool {
        self.state.borrow().checkout
    }

    fn clone_repo(&self, url: &str, _dir: &Path, _branch: Option<&str>) -> DeployResult<()> {
        record(&self.calls, format!("git clone {url}"));
        let mut state = self.state.borrow_mut();
        if state.fail_clone {
            return Err(DeployError::Other("remote hung up".into()));
        }
        state.checkout = true;
        state.local = state.remote.clone();
        Ok(())
    }

    fn fetch(&self, _dir: &Path) -> DeployResult<()> {
        record(&self.calls, "git fetch");
        Ok(())
    }

    fn head(&self, _dir: &Path) -> DeployResult<Revision> {
        let state = self.state.borrow();
        if state.checkout {
            Ok(state.local.clone())
        } else {
            Err(DeployError::Repository("not a checkout".into()))
        }
    }

    fn remote_head(&self, _dir: &Path, branch: &str) -> DeployResult<Option<Revision>> {
        let state = self.state.borrow();
        Ok((branch == state.branch).then(|| state.remote.clone()))
    }

    fn remote_default_branch(&self, _dir: &Path) -> Option<String> {
        self.state.borrow().default_branch.clone()
    }

    fn fast_forward(&self, _dir: &Path, target: &Revision) -> DeployResult<()> {
        record(&self.calls, format!("git merge {target}"));
        self.state.borrow_mut().local = target.clone();
        Ok(())
    }

    fn pull(&self, _dir: &Path, branch: &str) -> DeployResult<()> {
        record(&self.calls, format!("git pull {branch}"));
        let mut state = self.state.borrow_mut();
        state.local = state.remote.clone();
        Ok(())
    }

    fn current_branch(&self, _dir: &Path) -> DeployResult<String> {
        Ok(self.state.borrow().branch.clone())
    }

    fn last_commit_date(&self, _dir: &Path) -> DeployResult<String> {
        Ok("2026-10-01 12:00:00 +0000".to_string())
    }
}

// --- containers ---

#[derive(Debug, Clone, Default)]
pub struct RuntimeState {
    pub running: usize,
    pub after_up: usize,
    pub fail_down: bool,
    pub fail_prune: bool,
    pub fail_build: bool,
    pub fail_up: bool,
    pub fail_ps: bool,
}

#[derive(Clone)]
pub struct FakeRuntime {
    pub calls: Calls,
    pub state: Rc<RefCell<RuntimeState>>,
}

impl FakeRuntime {
    pub fn new(calls: &Calls, running: usize) -> Self {
        Self {
            calls: calls.clone(),
            state: Rc::new(RefCell::new(RuntimeState {
                running,
                after_up: 2,
                ..RuntimeState::default()
            })),
        }
    }
}

pub fn container(name: &str, state: &str, published: &[u16]) -> ContainerInfo {
    ContainerInfo {
        name: name.to_string(),
        service: name.to_string(),
        state: state.to_string(),
        status: "Up 5 seconds".to_string(),
        publishers: published
            .iter()
            .map(|&p| Publisher {
                url: "0.0.0.0".to_string(),
                target_port: 80,
                published_port: p,
                protocol: "tcp".to_string(),
            })
            .collect(),
    }
}

impl ContainerRuntime for FakeRuntime {
    fn down(&self, _dir: &Path, _manifest: &Path) -> DeployResult<()> {
        record(&self.calls, "compose down");
        let mut state = self.state.borrow_mut();
        if state.fail_down {
            return Err(DeployError::Other("no such project".into()));
        }
        state.running = 0;
        Ok(())
    }

    fn prune(&self) -> DeployResult<()> {
        record(&self.calls, "docker prune");
        if self.state.borrow().fail_prune {
            return Err(DeployError::Other("prune refused".into()));
        }
        Ok(())
    }

    fn build(&self, _dir: &Path, _manifest: &Path) -> DeployResult<()> {
        record(&self.calls, "compose build");
        if self.state.borrow().fail_build {
            return Err(DeployError::Other("build failed".into()));
        }
        Ok(())
    }

    fn up(&self, _dir: &Path, _manifest: &Path) -> DeployResult<()> {
        record(&self.calls, "compose up");
        let mut state = self.state.borrow_mut();
        if state.fail_up {
            return Err(DeployError::Other("up failed".into()));
        }
        state.running = state.after_up;
        Ok(())
    }

    fn containers(&self, _dir: &Path, _manifest: &Path) -> DeployResult<Vec<ContainerInfo>> {
        let state = self.state.borrow();
        if state.fail_ps {
            return Err(DeployError::Other("daemon not reachable".into()));
        }
        Ok((0..state.running)
            .map(|i| container(&format!("pizzaria-{i}"), "running", &[8080]))
            .collect())
    }

    fn stats(&self) -> DeployResult<Vec<String>> {
        Err(DeployError::Other("stats unavailable".into()))
    }
}

// --- host ---

#[derive(Debug, Clone, Default)]
pub struct SystemState {
    pub root: bool,
    pub installed: Vec<String>,
    pub active: Vec<String>,
    pub enabled: Vec<String>,
    pub broken_services: Vec<String>,
    pub crontab: String,
}

#[derive(Clone)]
pub struct FakeSystem {
    pub calls: Calls,
    pub state: Rc<RefCell<SystemState>>,
}

impl FakeSystem {
    pub fn new(calls: &Calls) -> Self {
        Self {
            calls: calls.clone(),
            state: Rc::new(RefCell::new(SystemState {
                root: true,
                installed: vec!["docker.io".into(), "git".into(), "cron".into()],
                active: vec!["docker".into(), "cron".into()],
                enabled: vec!["docker".into(), "cron".into()],
                ..SystemState::default()
            })),
        }
    }
}

impl System for FakeSystem {
    fn is_root(&self) -> bool {
        self.state.borrow().root
    }

    fn package_installed(&self, name: &str) -> bool {
        self.state.borrow().installed.iter().any(|p| p == name)
    }

    fn refresh_packages(&self) -> DeployResult<()> {
        record(&self.calls, "apt update");
        Ok(())
    }

    fn install_package(&self, name: &str) -> DeployResult<()> {
        record(&self.calls, format!("apt install {name}"));
        self.state.borrow_mut().installed.push(name.to_string());
        Ok(())
    }

    fn service_active(&self, name: &str) -> bool {
        self.state.borrow().active.iter().any(|s| s == name)
    }

    fn service_enabled(&self, name: &str) -> bool {
        self.state.borrow().enabled.iter().any(|s| s == name)
    }

    fn enable_service(&self, name: &str) -> DeployResult<()> {
        record(&self.calls, format!("systemctl enable {name}"));
        let mut state = self.state.borrow_mut();
        if state.broken_services.iter().any(|s| s == name) {
            return Err(DeployError::Service(format!("unit {name} not found")));
        }
        state.enabled.push(name.to_string());
        Ok(())
    }

    fn start_service(&self, name: &str) -> DeployResult<()> {
        record(&self.calls, format!("systemctl start {name}"));
        let mut state = self.state.borrow_mut();
        if state.broken_services.iter().any(|s| s == name) {
            return Err(DeployError::Service(format!("unit {name} not found")));
        }
        state.active.push(name.to_string());
        Ok(())
    }

    fn read_crontab(&self) -> DeployResult<String> {
        Ok(self.state.borrow().crontab.clone())
    }

    fn write_crontab(&self, content: &str) -> DeployResult<()> {
        record(&self.calls, "crontab write");
        self.state.borrow_mut().crontab = content.to_string();
        Ok(())
    }

    fn host_address(&self) -> Option<String> {
        Some("10.0.0.5".to_string())
    }
}

// --- probe ---

#[derive(Clone, Default)]
pub struct FakeProbe {
    pub fail: bool,
}

impl Probe for FakeProbe {
    fn check(&self, port: u16) -> DeployResult<u16> {
        if self.fail {
            Err(DeployError::Other(format!("connection refused on {port}")))
        } else {
            Ok(200)
        }
    }
}

// --- harness ---

pub struct Harness {
    pub dir: TempDir,
    pub calls: Calls,
    pub vcs: FakeVcs,
    pub runtime: FakeRuntime,
    pub system: FakeSystem,
    pub probe: FakeProbe,
}

impl Harness {
    /// Checkout at `local`, remote at `remote`, `running`
    /// containers up, manifest present.
    pub fn new(local: &str, remote: &str, running: usize) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let checkout = dir.path().join("checkout");
        std::fs::create_dir_all(&checkout).unwrap();
        std::fs::write(
            checkout.join("docker-compose.yml"),
            "services:\n  web:\n    build: .\n    ports:\n      - \"8080:80\"\n",
        )
        .unwrap();

        let calls = Calls::default();
        Self {
            vcs: FakeVcs::new(&calls, local, remote),
            runtime: FakeRuntime::new(&calls, running),
            system: FakeSystem::new(&calls),
            probe: FakeProbe::default(),
            calls,
            dir,
        }
    }

    pub fn checkout(&self) -> PathBuf {
        self.dir.path().join("checkout")
    }

    pub fn lock_path(&self) -> PathBuf {
        self.dir.path().join("deploy.lock")
    }

    pub fn config(&self) -> Config {
        Config::new("pizzaria")
            .repo_url("https://example.com/pizzaria.git")
            .checkout_dir(self.checkout())
            .lock_file(self.lock_path())
            .log_file(None)
            .packages(&["docker.io", "git", "cron"])
            .settle_secs(0)
    }

    pub fn pipeline(&self) -> Pipeline {
        self.pipeline_with(self.config())
    }

    pub fn pipeline_with(&self, config: Config) -> Pipeline {
        Pipeline::new(
            config,
            self.vcs.clone(),
            self.runtime.clone(),
            self.system.clone(),
            self.probe.clone(),
        )
        .schedule_command(DEPLOY_BIN)
    }
}
