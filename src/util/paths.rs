//! Contained filesystem paths.
//!
//! Relative paths handed to us by packages (requirement file names, artifact
//! file names) are never joined onto a directory directly. They go through a
//! [`RootedPath`], which resolves the result and rejects anything that lands
//! outside the root.

use std::path::{Component, Path, PathBuf};

use anyhow::{Context, Result};

use crate::core::errors::PrefetchError;

/// A canonical directory that relative paths are confined to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RootedPath {
    root: PathBuf,
}

impl RootedPath {
    /// Canonicalize `root`. The directory must exist.
    pub fn new(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref();
        let root = root
            .canonicalize()
            .with_context(|| format!("failed to resolve directory: {}", root.display()))?;
        Ok(RootedPath { root })
    }

    /// Create the directory if needed, then canonicalize it.
    pub fn create(root: impl AsRef<Path>) -> Result<Self> {
        crate::util::fs::ensure_dir(root.as_ref())?;
        Self::new(root)
    }

    /// The canonical root.
    pub fn path(&self) -> &Path {
        &self.root
    }

    /// Resolve `relpath` under the root.
    ///
    /// Symlinks in the existing part of the path are followed, so a link that
    /// points out of the root is caught as well.
    pub fn join_within_root(&self, relpath: impl AsRef<Path>) -> Result<PathBuf, PrefetchError> {
        let joined = self.root.join(relpath.as_ref());
        let resolved = resolve_path(&joined);

        if !resolved.starts_with(&self.root) {
            return Err(PrefetchError::PathEscape {
                path: relpath.as_ref().to_path_buf(),
                root: self.root.clone(),
            });
        }
        Ok(resolved)
    }

    /// Like [`join_within_root`](Self::join_within_root), but for a directory
    /// that should exist afterwards.
    pub fn subdir(&self, relpath: impl AsRef<Path>) -> Result<RootedPath> {
        let dir = self.join_within_root(relpath)?;
        RootedPath::create(dir)
    }
}

impl AsRef<Path> for RootedPath {
    fn as_ref(&self) -> &Path {
        &self.root
    }
}

/// Collapse `.` and `..` components without touching the filesystem.
pub fn normalize_lexically(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                let at_root = matches!(
                    normalized.components().next_back(),
                    None | Some(Component::RootDir) | Some(Component::Prefix(_))
                );
                if at_root {
                    if !path.has_root() {
                        normalized.push("..");
                    }
                } else if normalized.ends_with("..") {
                    normalized.push("..");
                } else {
                    normalized.pop();
                }
            }
            other => normalized.push(other.as_os_str()),
        }
    }
    if normalized.as_os_str().is_empty() {
        normalized.push(".");
    }
    normalized
}

/// Resolve a path that may not exist yet.
///
/// The longest existing prefix is canonicalized (following symlinks); the
/// rest is appended with `.` and `..` collapsed lexically.
pub fn resolve_path(path: &Path) -> PathBuf {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .map(|cwd| cwd.join(path))
            .unwrap_or_else(|_| path.to_path_buf())
    };
    let absolute = normalize_after_links(&absolute);

    let mut existing = absolute.clone();
    let mut rest: Vec<std::ffi::OsString> = Vec::new();
    loop {
        if let Ok(canonical) = existing.canonicalize() {
            let mut resolved = canonical;
            for part in rest.iter().rev() {
                resolved.push(part);
            }
            return resolved;
        }
        match (existing.file_name(), existing.parent()) {
            (Some(name), Some(parent)) => {
                rest.push(name.to_os_string());
                existing = parent.to_path_buf();
            }
            _ => return absolute,
        }
    }
}

// `..` directly after a symlink has to be applied to the link target, which
// `canonicalize` does for us. Only collapse `..` lexically once the prefix
// stops existing.
fn normalize_after_links(path: &Path) -> PathBuf {
    let mut current = PathBuf::new();
    let mut components = path.components().peekable();

    while let Some(component) = components.next() {
        current.push(component.as_os_str());
        if !current.exists() {
            let rest: PathBuf = components.map(|c| c.as_os_str()).collect();
            return normalize_lexically(&current.join(rest));
        }
        if matches!(component, Component::ParentDir) {
            if let Ok(canonical) = current.canonicalize() {
                current = canonical;
            }
        }
    }
    current
}

/// Output directory layout for a prefetch run.
///
/// Every location is a fixed offset under the root and is handed out through
/// [`RootedPath::join_within_root`].
#[derive(Debug, Clone)]
pub struct OutputDir {
    root: RootedPath,
}

impl OutputDir {
    /// Create the output directory if needed.
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        Ok(OutputDir {
            root: RootedPath::create(path)?,
        })
    }

    /// Open an existing output directory.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Ok(OutputDir {
            root: RootedPath::new(path)?,
        })
    }

    /// The canonical output root.
    pub fn path(&self) -> &Path {
        self.root.path()
    }

    /// Staging directory for downloaded pip artifacts.
    pub fn pip_deps(&self) -> Result<RootedPath> {
        self.root.subdir("deps/pip")
    }

    /// Root of the local pip index.
    pub fn pip_local_index(&self) -> Result<PathBuf, PrefetchError> {
        self.root.join_within_root("piprepo")
    }

    /// JSON list of generated config files.
    pub fn configs_file(&self) -> Result<PathBuf, PrefetchError> {
        self.root.join_within_root("config-files.json")
    }

    /// JSON list of environment variables.
    pub fn env_file(&self) -> Result<PathBuf, PrefetchError> {
        self.root.join_within_root("env.json")
    }

    /// JSON listing of the mirrored artifacts.
    pub fn content_manifest(&self) -> Result<PathBuf, PrefetchError> {
        self.root.join_within_root("content-manifest.json")
    }
}
