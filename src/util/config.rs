//! Configuration file support.
//!
//! Configuration is read from up to three locations, later ones winning:
//! - Global: `~/.prefetch/config.toml`
//! - Project: `<source>/.prefetch/config.toml`
//! - Explicit: `--config <file>` (or `PREFETCH_CONFIG`)
//!
//! ```toml
//! [process]
//! timeout = 900
//!
//! [pip]
//! fetch-command = ["pip-prefetch"]
//! index-command = ["piprepo", "build"]
//! index-env-var = "PIP_INDEX_URL"
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::util::process::DEFAULT_TIMEOUT;

/// Prefetch configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// External process settings
    pub process: ProcessConfig,

    /// pip settings
    pub pip: PipConfig,
}

/// Settings shared by every external tool invocation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessConfig {
    /// Time budget per invocation, in seconds
    pub timeout: Option<u64>,
}

/// pip collaborator settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct PipConfig {
    /// Command that downloads a package's dependencies
    pub fetch_command: Option<Vec<String>>,

    /// Command that generates the simple index for a mirror directory
    pub index_command: Option<Vec<String>>,

    /// Environment variable pointed at the mirror's index
    pub index_env_var: Option<String>,
}

impl Config {
    /// Load configuration from a file.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;

        toml::from_str(&contents)
            .with_context(|| format!("failed to parse config file: {}", path.display()))
    }

    /// Load configuration with fallback to defaults if file doesn't exist.
    pub fn load_or_default(path: &Path) -> Self {
        if path.exists() {
            Self::load(path).unwrap_or_else(|e| {
                tracing::warn!("Failed to load config from {}: {}", path.display(), e);
                Self::default()
            })
        } else {
            Self::default()
        }
    }

    /// Merge another config into this one (other takes precedence).
    pub fn merge(&mut self, other: Config) {
        if other.process.timeout.is_some() {
            self.process.timeout = other.process.timeout;
        }

        if other.pip.fetch_command.is_some() {
            self.pip.fetch_command = other.pip.fetch_command;
        }
        if other.pip.index_command.is_some() {
            self.pip.index_command = other.pip.index_command;
        }
        if other.pip.index_env_var.is_some() {
            self.pip.index_env_var = other.pip.index_env_var;
        }
    }

    /// Time budget for external tools.
    pub fn timeout(&self) -> Duration {
        self.process
            .timeout
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_TIMEOUT)
    }

    pub fn pip_fetch_command(&self) -> Vec<String> {
        self.pip
            .fetch_command
            .clone()
            .unwrap_or_else(|| vec!["pip-prefetch".to_string()])
    }

    pub fn pip_index_command(&self) -> Vec<String> {
        self.pip
            .index_command
            .clone()
            .unwrap_or_else(|| vec!["piprepo".to_string(), "build".to_string()])
    }

    pub fn pip_index_env_var(&self) -> &str {
        self.pip.index_env_var.as_deref().unwrap_or("PIP_INDEX_URL")
    }
}

/// Load merged configuration from global, project and explicit locations.
///
/// A missing or broken global/project file falls back to defaults with a
/// warning; an explicit file must load.
pub fn load_config(
    global_path: Option<&Path>,
    project_path: &Path,
    explicit: Option<&Path>,
) -> Result<Config> {
    let mut config = Config::default();

    if let Some(global_path) = global_path {
        config.merge(Config::load_or_default(global_path));
    }

    config.merge(Config::load_or_default(project_path));

    if let Some(explicit) = explicit {
        config.merge(Config::load(explicit)?);
    }

    Ok(config)
}

/// Get the global config directory (~/.prefetch).
pub fn global_config_dir() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|b| b.home_dir().join(".prefetch"))
}

/// Get the global config path (~/.prefetch/config.toml).
pub fn global_config_path() -> Option<PathBuf> {
    global_config_dir().map(|dir| dir.join("config.toml"))
}

/// Get the project config path (<source>/.prefetch/config.toml).
pub fn project_config_path(project_root: &Path) -> PathBuf {
    project_root.join(".prefetch").join("config.toml")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.timeout(), Duration::from_secs(900));
        assert_eq!(config.pip_fetch_command(), vec!["pip-prefetch"]);
        assert_eq!(config.pip_index_command(), vec!["piprepo", "build"]);
        assert_eq!(config.pip_index_env_var(), "PIP_INDEX_URL");
    }

    #[test]
    fn test_config_load() {
        let tmp = TempDir::new().unwrap();
        let config_path = tmp.path().join("config.toml");

        std::fs::write(
            &config_path,
            r#"
[process]
timeout = 60

[pip]
fetch-command = ["python3", "-m", "prefetch_pip"]
index-env-var = "PIP_EXTRA_INDEX_URL"
"#,
        )
        .unwrap();

        let config = Config::load(&config_path).unwrap();
        assert_eq!(config.timeout(), Duration::from_secs(60));
        assert_eq!(
            config.pip_fetch_command(),
            vec!["python3", "-m", "prefetch_pip"]
        );
        assert_eq!(config.pip_index_command(), vec!["piprepo", "build"]);
        assert_eq!(config.pip_index_env_var(), "PIP_EXTRA_INDEX_URL");
    }

    #[test]
    fn test_config_merge() {
        let mut base = Config::default();
        base.process.timeout = Some(10);
        base.pip.index_env_var = Some("A".to_string());

        let mut override_cfg = Config::default();
        override_cfg.pip.index_env_var = Some("B".to_string());

        base.merge(override_cfg);

        assert_eq!(base.process.timeout, Some(10));
        assert_eq!(base.pip.index_env_var.as_deref(), Some("B"));
    }

    #[test]
    fn test_load_config_precedence() {
        let tmp = TempDir::new().unwrap();
        let global = tmp.path().join("global.toml");
        let project = project_config_path(tmp.path());
        let explicit = tmp.path().join("explicit.toml");

        std::fs::write(&global, "[process]\ntimeout = 1\n[pip]\nindex-env-var = \"G\"\n").unwrap();
        std::fs::create_dir_all(project.parent().unwrap()).unwrap();
        std::fs::write(&project, "[process]\ntimeout = 2\n").unwrap();
        std::fs::write(&explicit, "[process]\ntimeout = 3\n").unwrap();

        let config = load_config(Some(&global), &project, None).unwrap();
        assert_eq!(config.process.timeout, Some(2));
        assert_eq!(config.pip_index_env_var(), "G");

        let config = load_config(Some(&global), &project, Some(&explicit)).unwrap();
        assert_eq!(config.process.timeout, Some(3));
    }

    #[test]
    fn test_explicit_config_must_exist() {
        let tmp = TempDir::new().unwrap();
        let missing = tmp.path().join("nope.toml");

        assert!(load_config(None, &tmp.path().join("p.toml"), Some(&missing)).is_err());
    }
}
