//! Simple-index generation for a mirror directory.

use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Result};

use crate::util::config::Config;
use crate::util::process::{find_executable, ProcessBuilder};

/// Turns a directory of artifacts into a browsable package index.
///
/// After [`publish`](Indexer::publish) returns, `repo_root/simple/` serves the
/// artifacts under the simple repository protocol.
pub trait Indexer: Sync {
    fn publish(&self, repo_root: &Path) -> Result<()>;
}

/// Runs a configured index command with the mirror root appended.
#[derive(Debug, Clone)]
pub struct CommandIndexer {
    argv: Vec<String>,
    timeout: Duration,
}

impl CommandIndexer {
    pub fn new(argv: Vec<String>, timeout: Duration) -> Self {
        CommandIndexer { argv, timeout }
    }

    /// The pip indexer described by `config`.
    pub fn pip(config: &Config) -> Self {
        Self::new(config.pip_index_command(), config.timeout())
    }
}

impl Indexer for CommandIndexer {
    fn publish(&self, repo_root: &Path) -> Result<()> {
        let Some(program) = self.argv.first() else {
            bail!("no index command configured");
        };
        if find_executable(program).is_none() {
            bail!(
                "index command `{}` not found; install it or set `pip.index-command` in the config",
                program
            );
        }

        ProcessBuilder::from_argv(&self.argv)?
            .arg(repo_root)
            .timeout(self.timeout)
            .exec_and_check()?;

        if !repo_root.join("simple").is_dir() {
            tracing::warn!(
                "index command finished but {} has no simple/ directory",
                repo_root.display()
            );
        }
        Ok(())
    }
}
