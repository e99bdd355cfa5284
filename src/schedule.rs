use std::path::{Path, PathBuf};

use crate::error::{Advisory, DeployError, DeployResult};
use crate::system::System;

/// One crontab line that re-runs the deploy binary, keyed by
/// the binary's absolute path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduleEntry {
    pub schedule: String,
    pub command: PathBuf,
    /// Passed back as `--config` so scheduled runs read the same
    /// file as the run that installed the entry.
    pub config: Option<PathBuf>,
    pub log_file: Option<PathBuf>,
}

impl ScheduleEntry {
    #[must_use]
    pub fn new(schedule: &str, command: &Path) -> Self {
        Self {
            schedule: schedule.to_string(),
            command: command.to_path_buf(),
            config: None,
            log_file: None,
        }
    }

    #[must_use]
    pub fn config(mut self, path: Option<&Path>) -> Self {
        self.config = path.map(Path::to_path_buf);
        self
    }

    #[must_use]
    pub fn log_file(mut self, path: Option<&Path>) -> Self {
        self.log_file = path.map(Path::to_path_buf);
        self
    }

    /// Entry for the running executable.
    pub fn for_current_exe(schedule: &str) -> DeployResult<Self> {
        let exe = std::env::current_exe()?;
        let exe = exe.canonicalize().unwrap_or(exe);
        Ok(Self::new(schedule, &exe))
    }

    /// The command as it appears in the crontab.
    #[must_use]
    pub fn key(&self) -> String {
        shell_quote(&self.command.display().to_string())
    }

    #[must_use]
    pub fn line(&self) -> String {
        let mut line = format!("{} {}", self.schedule, self.key());
        if let Some(config) = &self.config {
            line.push_str(" --config ");
            line.push_str(&shell_quote(&config.display().to_string()));
        }
        if let Some(log) = &self.log_file {
            line.push_str(" >> ");
            line.push_str(&shell_quote(&log.display().to_string()));
            line.push_str(" 2>&1");
        }
        line
    }
}

/// Quote `word` for `/bin/sh` unless it only holds characters
/// the shell passes through unchanged.
#[must_use]
pub fn shell_quote(word: &str) -> String {
    let plain = !word.is_empty()
        && word
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "/._-+=:@,%".contains(c));
    if plain {
        word.to_string()
    } else {
        format!("'{}'", word.replace('\'', r"'\''"))
    }
}

/// Whether `word` occurs in `line` delimited by whitespace or
/// the line ends. `word` may itself contain spaces.
fn contains_word(line: &str, word: &str) -> bool {
    line.match_indices(word).any(|(i, _)| {
        let before = line[..i].chars().next_back();
        let after = line[i + word.len()..].chars().next();
        before.is_none_or(char::is_whitespace) && after.is_none_or(char::is_whitespace)
    })
}

/// Crontab text with `entry` appended, or `None` if a line
/// already references the entry's command.
#[must_use]
pub fn with_entry(crontab: &str, entry: &ScheduleEntry) -> Option<String> {
    let key = entry.key();
    let present = crontab
        .lines()
        .map(str::trim)
        .filter(|l| !l.starts_with('#'))
        .any(|l| contains_word(l, &key));
    if present {
        return None;
    }

    let mut content = crontab.to_string();
    if !content.is_empty() && !content.ends_with('\n') {
        content.push('\n');
    }
    content.push_str(&entry.line());
    content.push('\n');
    Some(content)
}

/// Installs the recurring entry and keeps the cron daemon up.
pub struct Scheduler<'a> {
    system: &'a dyn System,
    services: Vec<String>,
}

impl<'a> Scheduler<'a> {
    #[must_use]
    pub fn new(system: &'a dyn System, services: &[String]) -> Self {
        Self {
            system,
            services: services.to_vec(),
        }
    }

    /// Add `entry` unless the crontab already has it. Returns
    /// whether the crontab was changed.
    pub fn install(&self, entry: &ScheduleEntry) -> DeployResult<bool> {
        let current = self.system.read_crontab()?;
        let Some(updated) = with_entry(&current, entry) else {
            tracing::debug!(command = %entry.key(), "schedule entry already present");
            return Ok(false);
        };
        self.system
            .write_crontab(&updated)
            .map_err(|e| DeployError::Service(format!("crontab install: {e}")))?;
        tracing::info!(line = %entry.line(), "schedule entry installed");
        Ok(true)
    }

    /// Enable and start the first cron service name that
    /// systemd accepts.
    #[must_use]
    pub fn ensure_service(&self) -> Advisory {
        let mut errors = Vec::new();
        for name in &self.services {
            let enabled = self.system.service_enabled(name);
            let active = self.system.service_active(name);
            if enabled && active {
                return Advisory::Done;
            }
            let enable = || {
                if enabled {
                    Ok(())
                } else {
                    self.system.enable_service(name)
                }
            };
            let start = || {
                if active {
                    Ok(())
                } else {
                    self.system.start_service(name)
                }
            };
            match enable().and_then(|()| start()) {
                Ok(()) => {
                    tracing::info!(service = %name, "cron service started");
                    return Advisory::Done;
                }
                Err(e) => errors.push(e.to_string()),
            }
        }
        if errors.is_empty() {
            Advisory::Skipped("no cron service configured".into())
        } else {
            Advisory::Failed(errors.join("; "))
        }
    }
}
