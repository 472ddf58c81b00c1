//! Global context for prefetch operations.
//!
//! Provides centralized access to configuration, paths, and environment.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::util::config::{global_config_path, load_config, project_config_path, Config};

/// Global context containing configuration and paths.
#[derive(Debug, Clone)]
pub struct GlobalContext {
    /// Current working directory
    cwd: PathBuf,

    /// Global config file (~/.prefetch/config.toml), if a home dir exists
    global_config: Option<PathBuf>,

    /// Whether to use colors in output
    color: bool,

    config: Config,
}

impl GlobalContext {
    /// Create a new GlobalContext with defaults.
    pub fn new() -> Result<Self> {
        let cwd = std::env::current_dir().context("failed to get current directory")?;

        Ok(GlobalContext {
            cwd,
            global_config: global_config_path(),
            color: true,
            config: Config::default(),
        })
    }

    /// Create a GlobalContext with a specific working directory.
    pub fn with_cwd(cwd: PathBuf) -> Result<Self> {
        let mut ctx = Self::new()?;
        ctx.cwd = cwd;
        Ok(ctx)
    }

    /// Load global, project (`<source>/.prefetch/config.toml`) and explicit
    /// configuration.
    pub fn load_config(&mut self, source: &Path, explicit: Option<&Path>) -> Result<()> {
        let explicit = explicit.map(|path| self.cwd.join(path));
        self.config = load_config(
            self.global_config.as_deref(),
            &project_config_path(source),
            explicit.as_deref(),
        )?;
        tracing::debug!("loaded config: {:?}", self.config);
        Ok(())
    }

    /// Set color output.
    pub fn set_color(&mut self, color: bool) {
        self.color = color;
    }

    /// Get the current working directory.
    pub fn cwd(&self) -> &Path {
        &self.cwd
    }

    /// Resolve a user-supplied path against the working directory.
    pub fn absolute(&self, path: &Path) -> PathBuf {
        self.cwd.join(path)
    }

    /// Get the loaded configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Check if color output is enabled.
    pub fn color(&self) -> bool {
        self.color
    }
}
