use std::fmt;
use std::path::Path;

use indexmap::IndexSet;

use crate::compose::{ContainerInfo, ContainerRuntime};
use crate::git::Vcs;
use crate::system::System;

const UNKNOWN: &str = "unknown";
const UNAVAILABLE: &str = "unavailable";

/// Point-in-time view of the checkout and its containers.
/// Fields that could not be read hold `None`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StatusReport {
    pub branch: Option<String>,
    pub commit: Option<String>,
    pub commit_date: Option<String>,
    pub containers: Option<Vec<ContainerInfo>>,
    pub urls: Vec<String>,
    pub stats: Option<Vec<String>>,
}

impl StatusReport {
    /// Collect the report. Never fails; each unreadable part is
    /// left empty.
    #[must_use]
    pub fn gather(
        vcs: &dyn Vcs,
        runtime: &dyn ContainerRuntime,
        system: &dyn System,
        dir: &Path,
        manifest: &Path,
    ) -> Self {
        let checkout = vcs.is_checkout(dir);

        let branch = checkout.then(|| vcs.current_branch(dir).ok()).flatten();
        let commit = checkout
            .then(|| vcs.head(dir).ok())
            .flatten()
            .map(|r| r.short().to_string());
        let commit_date = checkout.then(|| vcs.last_commit_date(dir).ok()).flatten();

        let containers = if manifest.is_file() {
            runtime
                .containers(dir, manifest)
                .inspect_err(|e| tracing::debug!(error = %e, "container list unavailable"))
                .ok()
        } else {
            None
        };

        let urls = containers
            .as_deref()
            .map(|c| access_urls(c, system.host_address().as_deref()))
            .unwrap_or_default();

        let stats = runtime
            .stats()
            .inspect_err(|e| tracing::debug!(error = %e, "resource stats unavailable"))
            .ok();

        Self {
            branch,
            commit,
            commit_date,
            containers,
            urls,
            stats,
        }
    }

    /// Emit the report to the log, one line per item.
    pub fn log(&self) {
        for line in self.to_string().lines() {
            tracing::info!("{line}");
        }
    }
}

/// `http://<host>:<port>` for every distinct published port of
/// a running container.
#[must_use]
pub fn access_urls(containers: &[ContainerInfo], host: Option<&str>) -> Vec<String> {
    let host = host.unwrap_or("localhost");
    let ports: IndexSet<u16> = containers
        .iter()
        .filter(|c| c.is_running())
        .flat_map(|c| c.publishers.iter())
        .map(|p| p.published_port)
        .filter(|&p| p != 0)
        .collect();
    ports
        .into_iter()
        .map(|port| format!("http://{host}:{port}"))
        .collect()
}

impl fmt::Display for StatusReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "branch: {}", self.branch.as_deref().unwrap_or(UNKNOWN))?;
        writeln!(f, "commit: {}", self.commit.as_deref().unwrap_or(UNKNOWN))?;
        writeln!(
            f,
            "last commit: {}",
            self.commit_date.as_deref().unwrap_or(UNKNOWN)
        )?;

        match &self.containers {
            None => writeln!(f, "containers: {UNAVAILABLE}")?,
            Some(list) if list.is_empty() => writeln!(f, "containers: none")?,
            Some(list) => {
                writeln!(f, "containers:")?;
                for c in list {
                    writeln!(f, "  {} [{}] {}", c.name, c.state, c.status)?;
                }
            }
        }

        if self.urls.is_empty() {
            writeln!(f, "access: {UNAVAILABLE}")?;
        } else {
            writeln!(f, "access:")?;
            for url in &self.urls {
                writeln!(f, "  {url}")?;
            }
        }

        match &self.stats {
            Some(lines) if !lines.is_empty() => {
                writeln!(f, "resources:")?;
                for line in lines {
                    writeln!(f, "  {}", line.replace('\t', "  "))?;
                }
                Ok(())
            }
            _ => writeln!(f, "resources: {UNAVAILABLE}"),
        }
    }
}
