//! Single-server auto-deploy for the pizzaria compose stack.
//!
//! `deploy` keeps one host running the latest commit of a git
//! repository: it syncs the checkout, rebuilds and restarts the
//! compose project when upstream moved, and installs itself in
//! the crontab so the check repeats every few minutes.
//!
//! # Overview
//!
//! A run is a [`Pipeline`] over four collaborators, each behind
//! a trait so the sequencing can be exercised without the real
//! tools:
//!
//! - [`Vcs`](git::Vcs) - clone, fetch, compare and fast-forward
//!   ([`GitCli`])
//! - [`ContainerRuntime`](compose::ContainerRuntime) - compose
//!   down/build/up/ps plus prune and stats ([`DockerCompose`])
//! - [`System`](system::System) - packages, services, crontab
//!   ([`HostSystem`])
//! - [`Probe`](deploy::probe::Probe) - HTTP liveness
//!   ([`HttpProbe`](deploy::probe::HttpProbe))
//!
//! # Run order
//!
//! 1. **Lock** - a PID file; a live holder means "already
//!    running" and the run exits 0
//! 2. **Dependencies** - install missing packages, start the
//!    container runtime
//! 3. **Sync** - clone, or fetch and compare `HEAD` with the
//!    remote branch
//! 4. **Deploy** - when the remote moved, nothing is running, or
//!    `--force` was given
//! 5. **Schedule** - ensure the crontab entry exists
//! 6. **Status** - log branch, commit, containers, URLs and
//!    resource usage
//!
//! # Example
//!
//! ```rust,no_run
//! use pizzaria_deploy::{Config, Pipeline};
//! use pizzaria_deploy::pipeline::Mode;
//!
//! fn main() -> anyhow::Result<()> {
//!     let config = Config::new("pizzaria")
//!         .repo_url("https://example.com/pizzaria.git")
//!         .checkout_dir("/opt/pizzaria")
//!         .settle_secs(15);
//!
//!     Pipeline::host(config)?.run(Mode::Normal)?;
//!     Ok(())
//! }
//! ```
//!
//! Or from the shell:
//!
//! ```sh
//! deploy            # deploy if upstream has new commits
//! deploy --force    # rebuild regardless
//! deploy --status   # report only
//! ```

// Allow noisy pedantic lints that don't add value for a
// deployment tool crate.
#![allow(
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::module_name_repetitions
)]

pub mod cmd;
pub mod compose;
pub mod config;
pub mod deploy;
pub mod error;
pub mod git;
pub mod lock;
pub mod logging;
pub mod pipeline;
pub mod revision;
pub mod schedule;
pub mod status;
pub mod system;

pub use compose::DockerCompose;
pub use config::Config;
pub use git::GitCli;
pub use pipeline::Pipeline;
pub use revision::Revision;
pub use system::HostSystem;
