use std::path::Path;

use docker_compose_types::{Compose, Ports, PublishedPort};
use indexmap::IndexSet;
use serde::Deserialize;

use crate::cmd;
use crate::error::{DeployError, DeployResult};

/// Published host ports declared in a compose manifest, in
/// declaration order, deduplicated.
pub fn published_ports(manifest: &str) -> DeployResult<Vec<u16>> {
    let compose: Compose = serde_yaml::from_str(manifest)?;
    let mut ports = IndexSet::new();

    for service in compose.services.0.values().flatten() {
        if let Ports::Short(entries) = &service.ports {
            ports.extend(entries.iter().filter_map(|e| parse_short_port(e)));
        }
        if let Ports::Long(entries) = &service.ports {
            for entry in entries {
                if let Some(PublishedPort::Single(port)) = &entry.published {
                    ports.insert(*port);
                }
            }
        }
    }

    Ok(ports.into_iter().collect())
}

/// Host side of a short port mapping: `"8080:80"`,
/// `"127.0.0.1:8080:80/tcp"`. A bare container port publishes
/// nothing fixed, and ranges are skipped.
#[must_use]
pub fn parse_short_port(entry: &str) -> Option<u16> {
    let mapping = entry.split('/').next()?;
    let parts: Vec<&str> = mapping.rsplitn(3, ':').collect();
    match parts.as_slice() {
        [_container, host] | [_container, host, _] => host.parse().ok(),
        _ => None,
    }
}

/// Label compose puts on every container it creates, holding
/// the project name. Compose v1 and v2 both set it.
pub const PROJECT_LABEL: &str = "com.docker.compose.project";

const SERVICE_LABEL: &str = "com.docker.compose.service";

/// Compose project name for an app name: lowercase ASCII
/// letters, digits, `-` and `_`, as both compose releases
/// normalize it.
#[must_use]
pub fn project_name(name: &str) -> String {
    name.chars()
        .map(|c| c.to_ascii_lowercase())
        .filter(|c| c.is_ascii_alphanumeric() || *c == '-' || *c == '_')
        .collect()
}

/// A container of the project, as listed by the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerInfo {
    pub name: String,
    pub service: String,
    pub state: String,
    pub status: String,
    pub publishers: Vec<Publisher>,
}

impl ContainerInfo {
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.state.eq_ignore_ascii_case("running")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Publisher {
    pub url: String,
    pub target_port: u16,
    pub published_port: u16,
    pub protocol: String,
}

/// One line of `docker ps --format '{{json .}}'`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct EngineContainer {
    names: String,
    #[serde(default)]
    state: String,
    #[serde(default)]
    status: String,
    #[serde(default)]
    ports: String,
    #[serde(default)]
    labels: String,
}

impl From<EngineContainer> for ContainerInfo {
    fn from(c: EngineContainer) -> Self {
        let service = label(&c.labels, SERVICE_LABEL).unwrap_or_default();
        // engines before 20.10 print no State
        let state = if c.state.is_empty() {
            if c.status.starts_with("Up") {
                "running".to_string()
            } else {
                "exited".to_string()
            }
        } else {
            c.state
        };
        Self {
            name: c.names.split(',').next().unwrap_or_default().to_string(),
            service,
            state,
            status: c.status,
            publishers: parse_engine_ports(&c.ports),
        }
    }
}

fn label(labels: &str, key: &str) -> Option<String> {
    labels
        .split(',')
        .filter_map(|pair| pair.split_once('='))
        .find(|(k, _)| *k == key)
        .map(|(_, v)| v.to_string())
}

/// Published mappings from the engine's `Ports` column:
/// `0.0.0.0:8080->80/tcp, :::8080->80/tcp, 9000/tcp`.
/// Unpublished ports and ranges are skipped.
#[must_use]
pub fn parse_engine_ports(ports: &str) -> Vec<Publisher> {
    ports
        .split(',')
        .map(str::trim)
        .filter_map(|entry| {
            let (host, container) = entry.split_once("->")?;
            let (addr, published) = host.rsplit_once(':')?;
            let (target, protocol) = container.split_once('/').unwrap_or((container, "tcp"));
            Some(Publisher {
                url: addr.to_string(),
                target_port: target.parse().ok()?,
                published_port: published.parse().ok()?,
                protocol: protocol.to_string(),
            })
        })
        .collect()
}

/// Parse `docker ps --format '{{json .}}'`, one object per line.
pub fn parse_ps(output: &str) -> DeployResult<Vec<ContainerInfo>> {
    output
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(|l| {
            serde_json::from_str::<EngineContainer>(l)
                .map(ContainerInfo::from)
                .map_err(DeployError::from)
        })
        .collect()
}

/// Container runtime operations for one compose project.
pub trait ContainerRuntime {
    /// Stop and remove the project's containers.
    fn down(&self, dir: &Path, manifest: &Path) -> DeployResult<()>;

    /// Remove unused images, networks and build cache.
    fn prune(&self) -> DeployResult<()>;

    /// Rebuild images without layer cache, pulling fresh bases.
    fn build(&self, dir: &Path, manifest: &Path) -> DeployResult<()>;

    /// Start containers detached.
    fn up(&self, dir: &Path, manifest: &Path) -> DeployResult<()>;

    /// Containers of the project, running or not.
    fn containers(&self, dir: &Path, manifest: &Path) -> DeployResult<Vec<ContainerInfo>>;

    /// One line per container: name, CPU, memory.
    fn stats(&self) -> DeployResult<Vec<String>>;
}

/// [`ContainerRuntime`] driving `docker compose` (or the
/// standalone `docker-compose` when the plugin is absent) for a
/// fixed project name.
///
/// Containers are listed through the engine by project label,
/// so both compose releases report the same way.
#[derive(Debug, Clone)]
pub struct DockerCompose {
    program: String,
    prefix: Vec<String>,
    project: String,
}

impl DockerCompose {
    #[must_use]
    pub fn detect(project: &str) -> Self {
        if cmd::succeeds(None, "docker", &["compose", "version"]) {
            Self::plugin(project)
        } else if cmd::command_exists("docker-compose") {
            Self::standalone(project)
        } else {
            Self::plugin(project)
        }
    }

    #[must_use]
    pub fn plugin(project: &str) -> Self {
        Self {
            program: "docker".to_string(),
            prefix: vec!["compose".to_string()],
            project: project_name(project),
        }
    }

    #[must_use]
    pub fn standalone(project: &str) -> Self {
        Self {
            program: "docker-compose".to_string(),
            prefix: Vec::new(),
            project: project_name(project),
        }
    }

    #[must_use]
    pub fn program(&self) -> String {
        let mut parts = vec![self.program.clone()];
        parts.extend(self.prefix.iter().cloned());
        parts.join(" ")
    }

    #[must_use]
    pub fn project(&self) -> &str {
        &self.project
    }

    fn args<'a>(&'a self, manifest: &'a str, rest: &[&'a str]) -> Vec<&'a str> {
        let mut args: Vec<&str> = self.prefix.iter().map(String::as_str).collect();
        args.extend(["-p", self.project.as_str(), "-f", manifest]);
        args.extend_from_slice(rest);
        args
    }

    /// Arguments to `docker` that list the project's containers.
    fn ps_args(&self) -> Vec<String> {
        vec![
            "ps".to_string(),
            "--all".to_string(),
            "--filter".to_string(),
            format!("label={PROJECT_LABEL}={}", self.project),
            "--format".to_string(),
            "{{json .}}".to_string(),
        ]
    }

    fn compose(&self, dir: &Path, manifest: &Path, rest: &[&str]) -> DeployResult<String> {
        let manifest = manifest.to_string_lossy();
        let args = self.args(&manifest, rest);
        cmd::run_in(Some(dir), &self.program, &args)
    }

    fn compose_streamed(&self, dir: &Path, manifest: &Path, rest: &[&str]) -> DeployResult<()> {
        let manifest = manifest.to_string_lossy();
        let args = self.args(&manifest, rest);
        cmd::run_interactive_in(Some(dir), &self.program, &args)
    }
}

impl ContainerRuntime for DockerCompose {
    fn down(&self, dir: &Path, manifest: &Path) -> DeployResult<()> {
        self.compose(dir, manifest, &["down", "--remove-orphans"])?;
        Ok(())
    }

    fn prune(&self) -> DeployResult<()> {
        cmd::run("docker", &["system", "prune", "-f"])?;
        Ok(())
    }

    fn build(&self, dir: &Path, manifest: &Path) -> DeployResult<()> {
        self.compose_streamed(dir, manifest, &["build", "--no-cache", "--pull"])
    }

    fn up(&self, dir: &Path, manifest: &Path) -> DeployResult<()> {
        self.compose_streamed(dir, manifest, &["up", "-d"])
    }

    fn containers(&self, _dir: &Path, _manifest: &Path) -> DeployResult<Vec<ContainerInfo>> {
        let args = self.ps_args();
        let args: Vec<&str> = args.iter().map(String::as_str).collect();
        let out = cmd::run("docker", &args)?;
        parse_ps(&out)
    }

    fn stats(&self) -> DeployResult<Vec<String>> {
        let out = cmd::run(
            "docker",
            &[
                "stats",
                "--no-stream",
                "--format",
                "{{.Name}}\t{{.CPUPerc}}\t{{.MemUsage}}",
            ],
        )?;
        Ok(out.lines().map(ToString::to_string).collect())
    }
}
