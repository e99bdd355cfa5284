use std::path::{Path, PathBuf};

use crate::cmd;
use crate::error::{DeployError, DeployResult};
use crate::revision::Revision;

/// Branches probed, in order, when neither the config nor the
/// remote HEAD names one.
pub const FALLBACK_BRANCHES: [&str; 2] = ["main", "master"];

/// Version-control operations the synchronizer needs.
pub trait Vcs {
    /// Whether `dir` holds a checkout.
    fn is_checkout(&self, dir: &Path) -> bool;

    fn clone_repo(&self, url: &str, dir: &Path, branch: Option<&str>) -> DeployResult<()>;

    fn fetch(&self, dir: &Path) -> DeployResult<()>;

    fn head(&self, dir: &Path) -> DeployResult<Revision>;

    /// Revision of `origin/<branch>`, or `None` if that ref does
    /// not exist.
    fn remote_head(&self, dir: &Path, branch: &str) -> DeployResult<Option<Revision>>;

    /// Branch the remote's HEAD points at, if advertised.
    fn remote_default_branch(&self, dir: &Path) -> Option<String>;

    fn fast_forward(&self, dir: &Path, target: &Revision) -> DeployResult<()>;

    fn pull(&self, dir: &Path, branch: &str) -> DeployResult<()>;

    fn current_branch(&self, dir: &Path) -> DeployResult<String>;

    fn last_commit_date(&self, dir: &Path) -> DeployResult<String>;
}

/// [`Vcs`] backed by the `git` CLI.
#[derive(Debug, Clone, Copy, Default)]
pub struct GitCli;

impl GitCli {
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    fn git(dir: &Path, args: &[&str]) -> DeployResult<String> {
        cmd::run_in(Some(dir), "git", args)
    }

    fn rev(dir: &Path, refname: &str) -> DeployResult<Revision> {
        let out = Self::git(dir, &["rev-parse", "--verify", "--quiet", refname])?;
        Revision::parse(&out)
            .ok_or_else(|| DeployError::Repository(format!("cannot resolve {refname}: '{out}'")))
    }
}

impl Vcs for GitCli {
    fn is_checkout(&self, dir: &Path) -> bool {
        dir.join(".git").exists()
    }

    fn clone_repo(&self, url: &str, dir: &Path, branch: Option<&str>) -> DeployResult<()> {
        let dir_str = dir.to_string_lossy().to_string();
        let mut args = vec!["clone"];
        if let Some(branch) = branch {
            args.extend(["--branch", branch]);
        }
        args.extend([url, dir_str.as_str()]);
        cmd::run("git", &args)?;
        Ok(())
    }

    fn fetch(&self, dir: &Path) -> DeployResult<()> {
        Self::git(dir, &["fetch", "--prune", "origin"])?;
        Ok(())
    }

    fn head(&self, dir: &Path) -> DeployResult<Revision> {
        Self::rev(dir, "HEAD")
    }

    fn remote_head(&self, dir: &Path, branch: &str) -> DeployResult<Option<Revision>> {
        let refname = format!("refs/remotes/origin/{branch}");
        let exists = cmd::succeeds(
            Some(dir),
            "git",
            &["show-ref", "--verify", "--quiet", &refname],
        );
        if !exists {
            return Ok(None);
        }
        Self::rev(dir, &refname).map(Some)
    }

    fn remote_default_branch(&self, dir: &Path) -> Option<String> {
        let out = Self::git(dir, &["symbolic-ref", "--quiet", "refs/remotes/origin/HEAD"]).ok()?;
        out.strip_prefix("refs/remotes/origin/")
            .filter(|b| !b.is_empty())
            .map(ToString::to_string)
    }

    fn fast_forward(&self, dir: &Path, target: &Revision) -> DeployResult<()> {
        Self::git(dir, &["merge", "--ff-only", target.as_str()])?;
        Ok(())
    }

    fn pull(&self, dir: &Path, branch: &str) -> DeployResult<()> {
        Self::git(dir, &["pull", "--ff-only", "origin", branch])?;
        Ok(())
    }

    fn current_branch(&self, dir: &Path) -> DeployResult<String> {
        Self::git(dir, &["rev-parse", "--abbrev-ref", "HEAD"])
    }

    fn last_commit_date(&self, dir: &Path) -> DeployResult<String> {
        Self::git(dir, &["log", "-1", "--format=%cd", "--date=iso"])
    }
}

/// Result of comparing the checkout against its remote.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateCheck {
    /// No checkout existed; a fresh clone was made.
    Cloned(Revision),
    UpToDate(Revision),
    Behind { local: Revision, remote: Revision },
}

impl UpdateCheck {
    #[must_use]
    pub const fn needs_deploy(&self) -> bool {
        !matches!(self, Self::UpToDate(_))
    }

    /// Remote revision observed at fetch time, when it differs
    /// from the checkout.
    #[must_use]
    pub const fn target(&self) -> Option<&Revision> {
        match self {
            Self::Behind { remote, .. } => Some(remote),
            _ => None,
        }
    }
}

/// Keeps the local checkout in step with its remote.
pub struct Synchronizer<'a> {
    vcs: &'a dyn Vcs,
    dir: PathBuf,
    url: Option<String>,
    branch: Option<String>,
}

impl<'a> Synchronizer<'a> {
    #[must_use]
    pub fn new(vcs: &'a dyn Vcs, dir: &Path, url: Option<&str>, branch: Option<&str>) -> Self {
        Self {
            vcs,
            dir: dir.to_path_buf(),
            url: url.map(ToString::to_string),
            branch: branch.map(ToString::to_string),
        }
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Clone when no checkout exists; otherwise fetch and compare
    /// HEAD with the remote branch. The working tree is left
    /// untouched in the second case.
    pub fn check(&self) -> DeployResult<UpdateCheck> {
        if !self.vcs.is_checkout(&self.dir) {
            let url = self.url.as_deref().ok_or_else(|| {
                DeployError::Config(format!(
                    "no checkout at {} and repo_url is not set",
                    self.dir.display()
                ))
            })?;
            tracing::info!(%url, dir = %self.dir.display(), "cloning repository");
            self.vcs
                .clone_repo(url, &self.dir, self.branch.as_deref())
                .map_err(|e| DeployError::Repository(format!("clone failed: {e}")))?;
            let head = self.vcs.head(&self.dir)?;
            tracing::info!(revision = head.short(), "repository cloned");
            return Ok(UpdateCheck::Cloned(head));
        }

        self.vcs
            .fetch(&self.dir)
            .map_err(|e| DeployError::Repository(format!("fetch failed: {e}")))?;

        let branch = self.resolve_branch()?;
        let local = self.vcs.head(&self.dir)?;
        let remote = self.vcs.remote_head(&self.dir, &branch)?.ok_or_else(|| {
            DeployError::Repository(format!("remote branch origin/{branch} not found"))
        })?;

        if local == remote {
            tracing::info!(%branch, revision = local.short(), "repository up to date");
            Ok(UpdateCheck::UpToDate(local))
        } else {
            tracing::info!(
                %branch,
                local = local.short(),
                remote = remote.short(),
                "update available"
            );
            Ok(UpdateCheck::Behind { local, remote })
        }
    }

    /// Bring the checkout to `target` (fast-forward), or pull the
    /// branch when no target was observed. Returns the new HEAD.
    pub fn synchronize(&self, target: Option<&Revision>) -> DeployResult<Revision> {
        match target {
            Some(rev) => self
                .vcs
                .fast_forward(&self.dir, rev)
                .map_err(|e| DeployError::Repository(format!("fast-forward failed: {e}")))?,
            None => {
                let branch = self.resolve_branch()?;
                self.vcs
                    .pull(&self.dir, &branch)
                    .map_err(|e| DeployError::Repository(format!("pull failed: {e}")))?;
            }
        }

        let head = self.vcs.head(&self.dir)?;
        if let Some(rev) = target {
            if &head != rev {
                return Err(DeployError::Repository(format!(
                    "checkout at {} after sync, expected {}",
                    head.short(),
                    rev.short()
                )));
            }
        }
        tracing::info!(revision = head.short(), "repository synchronized");
        Ok(head)
    }

    /// Configured branch, else the remote default, else the
    /// first of [`FALLBACK_BRANCHES`] present on the remote.
    pub fn resolve_branch(&self) -> DeployResult<String> {
        if let Some(branch) = &self.branch {
            return Ok(branch.clone());
        }
        if let Some(branch) = self.vcs.remote_default_branch(&self.dir) {
            return Ok(branch);
        }
        for candidate in FALLBACK_BRANCHES {
            if self.vcs.remote_head(&self.dir, candidate)?.is_some() {
                return Ok(candidate.to_string());
            }
        }
        Err(DeployError::Repository(format!(
            "cannot determine branch: none of {} exist on origin",
            FALLBACK_BRANCHES.join(", ")
        )))
    }
}
