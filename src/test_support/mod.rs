//! Test doubles for the external collaborators.
//!
//! # Example
//!
//! ```rust,ignore
//! use prefetch::test_support::{FakeFetcher, FakePackage, RecordingIndexer};
//!
//! let fetcher = FakeFetcher::new()
//!     .package(&app_dir, FakePackage::new().artifact("foo", "1.0", "foo-1.0.tar.gz", "bytes"));
//! let indexer = RecordingIndexer::default();
//! ```

pub mod fixtures;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{bail, Result};

use crate::core::resolved::ResolvedDependency;
use crate::core::spec::{PackageSpec, PackageType};
use crate::sources::{FetchedPackage, Fetcher, Indexer};
use crate::util::paths::OutputDir;

// Re-export fixtures for convenience
pub use fixtures::*;

/// An artifact a [`FakePackage`] "downloads".
#[derive(Debug, Clone)]
pub struct FakeArtifact {
    pub name: String,
    pub version: String,
    /// Path under the pip staging directory.
    pub staged_as: PathBuf,
    pub content: Vec<u8>,
    pub dev: bool,
}

/// Canned fetch result for one package directory.
#[derive(Debug, Clone, Default)]
pub struct FakePackage {
    artifacts: Vec<FakeArtifact>,
    requirement_files: Vec<PathBuf>,
}

impl FakePackage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a runtime artifact.
    pub fn artifact(
        mut self,
        name: &str,
        version: &str,
        staged_as: impl AsRef<Path>,
        content: impl Into<Vec<u8>>,
    ) -> Self {
        self.artifacts.push(FakeArtifact {
            name: name.to_string(),
            version: version.to_string(),
            staged_as: staged_as.as_ref().to_path_buf(),
            content: content.into(),
            dev: false,
        });
        self
    }

    /// Add a build-time artifact.
    pub fn dev_artifact(
        self,
        name: &str,
        version: &str,
        staged_as: impl AsRef<Path>,
        content: impl Into<Vec<u8>>,
    ) -> Self {
        let mut pkg = self.artifact(name, version, staged_as, content);
        if let Some(last) = pkg.artifacts.last_mut() {
            last.dev = true;
        }
        pkg
    }

    /// Report a requirements file (relative to the package directory).
    pub fn requirements(mut self, relpath: impl AsRef<Path>) -> Self {
        self.requirement_files.push(relpath.as_ref().to_path_buf());
        self
    }
}

/// In-process [`Fetcher`] serving canned packages.
///
/// Artifacts are written into the staging directory on each fetch, unless
/// something already exists there (as a real downloader would skip them).
#[derive(Debug, Default)]
pub struct FakeFetcher {
    packages: HashMap<PathBuf, FakePackage>,
    calls: Mutex<Vec<PathBuf>>,
}

impl FakeFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `package` for the directory `dir`.
    pub fn package(mut self, dir: impl AsRef<Path>, package: FakePackage) -> Self {
        self.packages.insert(canonical(dir.as_ref()), package);
        self
    }

    /// Package directories fetched so far, in call order.
    pub fn calls(&self) -> Vec<PathBuf> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }
}

impl Fetcher for FakeFetcher {
    fn name(&self) -> &str {
        "fake"
    }

    fn fetch(&self, spec: &PackageSpec, output_dir: &OutputDir) -> Result<FetchedPackage> {
        let dir = canonical(spec.path());
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(dir.clone());
        }

        let Some(package) = self.packages.get(&dir) else {
            bail!("no fake package registered for {}", dir.display());
        };

        let deps_dir = output_dir.pip_deps()?;
        let mut dependencies = Vec::new();
        for artifact in &package.artifacts {
            let staged = deps_dir.path().join(&artifact.staged_as);
            if std::fs::symlink_metadata(&staged).is_err() {
                if let Some(parent) = staged.parent() {
                    std::fs::create_dir_all(parent)?;
                }
                std::fs::write(&staged, &artifact.content)?;
            }
            dependencies.push(
                ResolvedDependency::new(
                    PackageType::Pip,
                    artifact.name.as_str(),
                    artifact.version.as_str(),
                    staged,
                )
                .dev(artifact.dev),
            );
        }

        Ok(FetchedPackage {
            dependencies,
            requirement_files: package
                .requirement_files
                .iter()
                .map(|file| dir.join(file))
                .collect(),
        })
    }
}

/// [`Indexer`] that records each call and creates an empty `simple/`.
#[derive(Debug, Default)]
pub struct RecordingIndexer {
    published: Mutex<Vec<PathBuf>>,
}

impl RecordingIndexer {
    pub fn published(&self) -> Vec<PathBuf> {
        self.published
            .lock()
            .map(|p| p.clone())
            .unwrap_or_default()
    }
}

impl Indexer for RecordingIndexer {
    fn publish(&self, repo_root: &Path) -> Result<()> {
        std::fs::create_dir_all(repo_root.join("simple"))?;
        if let Ok(mut published) = self.published.lock() {
            published.push(repo_root.to_path_buf());
        }
        Ok(())
    }
}

/// [`Indexer`] that always fails.
#[derive(Debug, Default)]
pub struct FailingIndexer;

impl Indexer for FailingIndexer {
    fn publish(&self, repo_root: &Path) -> Result<()> {
        bail!("index generation failed for {}", repo_root.display())
    }
}

fn canonical(path: &Path) -> PathBuf {
    path.canonicalize().unwrap_or_else(|_| path.to_path_buf())
}
