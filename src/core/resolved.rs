//! Resolution outputs.
//!
//! These types describe what a prefetch run produced: the dependencies that
//! were downloaded for each package, the config files to write back into the
//! package, and the environment a hermetic build needs. Collections are only
//! assembled through [`reduce_to_unique`], so a finished [`ResolvedRequest`]
//! is conflict-free by construction.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::core::errors::PrefetchError;
use crate::core::spec::PackageType;
use crate::core::unique::{reduce_to_unique, Unique};

/// A downloaded dependency artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedDependency {
    #[serde(rename = "type")]
    pub package_type: PackageType,
    pub name: String,
    pub version: String,
    pub downloaded_path: PathBuf,
    #[serde(default)]
    pub dev: bool,
}

impl ResolvedDependency {
    /// Create a runtime (non-dev) dependency.
    pub fn new(
        package_type: PackageType,
        name: impl Into<String>,
        version: impl Into<String>,
        downloaded_path: impl Into<PathBuf>,
    ) -> Self {
        ResolvedDependency {
            package_type,
            name: name.into(),
            version: version.into(),
            downloaded_path: downloaded_path.into(),
            dev: false,
        }
    }

    /// Mark as a dev (build-time) dependency.
    pub fn dev(mut self, dev: bool) -> Self {
        self.dev = dev;
        self
    }

    /// Whether the artifact came from a direct URL or VCS reference rather
    /// than a package index. Such versions carry a URL scheme.
    pub fn is_external(&self) -> bool {
        Url::parse(&self.version)
            .map(|url| !url.cannot_be_a_base())
            .unwrap_or(false)
    }
}

impl Unique for ResolvedDependency {
    type Key = (PackageType, String, String, bool);
    const DEDUPE: bool = true;
    const KIND: &'static str = "dependency";

    fn unique_key(&self) -> Self::Key {
        (
            self.package_type,
            self.name.clone(),
            self.version.clone(),
            self.dev,
        )
    }
}

/// A generated file, relative to its package root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigFile {
    pub relpath: PathBuf,
    pub content: String,
}

impl Unique for ConfigFile {
    type Key = PathBuf;
    const DEDUPE: bool = true;
    const KIND: &'static str = "config file";

    fn unique_key(&self) -> Self::Key {
        self.relpath.clone()
    }
}

/// An environment variable for the hermetic build.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvVar {
    pub name: String,
    pub value: String,
}

impl EnvVar {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        EnvVar {
            name: name.into(),
            value: value.into(),
        }
    }
}

impl Unique for EnvVar {
    type Key = String;
    const DEDUPE: bool = true;
    const KIND: &'static str = "environment variable";

    fn unique_key(&self) -> Self::Key {
        self.name.clone()
    }
}

/// Output of resolving a single package.
///
/// Only [`ResolvedPackage::new`] builds one, so its lists are always unique.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedPackage {
    #[serde(rename = "type")]
    pub package_type: PackageType,
    pub abspath: PathBuf,
    dependencies: Vec<ResolvedDependency>,
    config_files: Vec<ConfigFile>,
}

impl ResolvedPackage {
    /// Create a package; repeated dependencies are collapsed.
    pub fn new(
        package_type: PackageType,
        abspath: impl Into<PathBuf>,
        dependencies: Vec<ResolvedDependency>,
    ) -> Result<Self, PrefetchError> {
        Ok(ResolvedPackage {
            package_type,
            abspath: abspath.into(),
            dependencies: reduce_to_unique(dependencies)?,
            config_files: Vec::new(),
        })
    }

    pub fn dependencies(&self) -> &[ResolvedDependency] {
        &self.dependencies
    }

    pub fn config_files(&self) -> &[ConfigFile] {
        &self.config_files
    }

    /// Attach the config files generated for this package.
    pub fn set_config_files(&mut self, config_files: Vec<ConfigFile>) -> Result<(), PrefetchError> {
        self.config_files = reduce_to_unique(config_files)?;
        Ok(())
    }
}

impl Unique for ResolvedPackage {
    type Key = (PackageType, PathBuf);
    const DEDUPE: bool = false;
    const KIND: &'static str = "package";

    fn unique_key(&self) -> Self::Key {
        (self.package_type, self.abspath.clone())
    }
}

/// Output of processing a whole set of packages.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct ResolvedRequest {
    packages: Vec<ResolvedPackage>,
    env_vars: Vec<EnvVar>,
}

impl ResolvedRequest {
    /// Validate and assemble a request.
    pub fn new(
        packages: Vec<ResolvedPackage>,
        env_vars: Vec<EnvVar>,
    ) -> Result<Self, PrefetchError> {
        Ok(ResolvedRequest {
            packages: reduce_to_unique(packages)?,
            env_vars: reduce_to_unique(env_vars)?,
        })
    }

    /// Combine two requests, re-checking uniqueness across both.
    pub fn merge(self, other: ResolvedRequest) -> Result<Self, PrefetchError> {
        let packages = self.packages.into_iter().chain(other.packages).collect();
        let env_vars = self.env_vars.into_iter().chain(other.env_vars).collect();
        ResolvedRequest::new(packages, env_vars)
    }

    pub fn packages(&self) -> &[ResolvedPackage] {
        &self.packages
    }

    pub fn env_vars(&self) -> &[EnvVar] {
        &self.env_vars
    }

    /// Absolute destination path and content of every config file.
    pub fn config_file_contents(&self) -> impl Iterator<Item = (PathBuf, &str)> + '_ {
        self.packages.iter().flat_map(|pkg| {
            pkg.config_files
                .iter()
                .map(move |cf| (pkg.abspath.join(&cf.relpath), cf.content.as_str()))
        })
    }
}
