//! Offline repository building.
//!
//! Downloaded artifacts are moved from their staging locations into one
//! shared mirror directory:
//!
//! ```text
//! <repo_root>/
//! ├── requests-2.31.0.tar.gz     # indexable artifacts
//! ├── external/
//! │   └── x-external-gitcommit-abc.tar.gz
//! └── simple/                    # written by the indexer
//! ```
//!
//! Each staging path is left as a relative symlink to its mirrored file.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;
use url::Url;
use walkdir::WalkDir;

use crate::core::errors::PrefetchError;
use crate::core::resolved::ResolvedDependency;
use crate::sources::Indexer;
use crate::util::fs::{
    files_identical, links_to, move_file, remove_file_if_exists, same_file, symlink_relative,
};
use crate::util::hash::sha256_file;
use crate::util::paths::RootedPath;

/// Subdirectory for artifacts that cannot be listed in the index.
pub const EXTERNAL_DIR: &str = "external";

/// Subdirectory the indexer writes index pages to.
pub const INDEX_DIR: &str = "simple";

/// A built mirror.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalRepository {
    pub root: PathBuf,
    /// `file://{root}/simple/`
    pub index_url: Url,
    pub external_dir: PathBuf,
}

/// One mirrored file, for the content manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MirrorEntry {
    /// Path relative to the mirror root, `/`-separated.
    pub path: String,
    pub sha256: String,
}

/// Place `dependencies` into the mirror at `repo_root` and publish its index.
///
/// Placement runs on a single thread; filenames are the shared namespace and
/// each existence check, comparison and move happens as one step.
pub fn build_repository(
    dependencies: &[ResolvedDependency],
    repo_root: &Path,
    indexer: &dyn Indexer,
) -> Result<LocalRepository> {
    let root = RootedPath::create(repo_root)?;
    let external = root.subdir(EXTERNAL_DIR)?;

    let mut placer = Placer::default();
    for dep in dependencies {
        let dir = if dep.is_external() { &external } else { &root };
        placer
            .place(&dep.downloaded_path, dir)
            .with_context(|| format!("failed to mirror {} {}", dep.name, dep.version))?;
    }
    tracing::info!(
        "mirrored {} artifacts into {}",
        placer.placed.len(),
        root.path().display()
    );

    indexer.publish(root.path())?;

    let index_dir = root.join_within_root(INDEX_DIR)?;
    let index_url = Url::from_directory_path(&index_dir)
        .map_err(|()| anyhow::anyhow!("cannot express {} as a URL", index_dir.display()))?;

    Ok(LocalRepository {
        root: root.path().to_path_buf(),
        index_url,
        external_dir: external.path().to_path_buf(),
    })
}

/// Tracks which staged file first claimed each mirror path in this run.
#[derive(Debug, Default)]
struct Placer {
    placed: HashMap<PathBuf, PathBuf>,
}

impl Placer {
    fn place(&mut self, staged: &Path, dir: &RootedPath) -> Result<()> {
        let filename = staged
            .file_name()
            .with_context(|| format!("artifact path has no file name: {}", staged.display()))?;
        let target = dir.join_within_root(filename)?;

        // a link left by an earlier run, or the mirrored file itself
        if links_to(staged, &target) || same_file(staged, &target) {
            tracing::debug!("{} already mirrored", target.display());
            self.placed.entry(target).or_insert_with(|| staged.to_path_buf());
            return Ok(());
        }

        if !staged.exists() {
            anyhow::bail!("downloaded artifact is missing: {}", staged.display());
        }

        if target.exists() {
            if !files_identical(staged, &target)? {
                let existing = self.placed.get(&target).cloned().unwrap_or_else(|| target.clone());
                return Err(PrefetchError::ArtifactContentConflict {
                    filename: filename.to_string_lossy().into_owned(),
                    existing_sha256: sha256_file(&target)?,
                    incoming_sha256: sha256_file(staged)?,
                    existing,
                    incoming: staged.to_path_buf(),
                }
                .into());
            }
            tracing::debug!("{} matches mirrored copy, dropping duplicate", staged.display());
            remove_file_if_exists(staged)?;
        } else {
            tracing::debug!("moving {} to {}", staged.display(), target.display());
            move_file(staged, &target)?;
        }

        // the artifact is in place before anything links to it
        symlink_relative(&target, staged)?;
        self.placed.entry(target).or_insert_with(|| staged.to_path_buf());
        Ok(())
    }
}

/// List every mirrored artifact with its digest, sorted by path.
///
/// Index pages are generated output and left out.
pub fn mirror_contents(repo_root: &Path) -> Result<Vec<MirrorEntry>> {
    let root = RootedPath::new(repo_root)?;
    let index_dir = root.path().join(INDEX_DIR);

    let mut entries = Vec::new();
    for entry in WalkDir::new(root.path())
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| e.path() != index_dir)
    {
        let entry = entry.with_context(|| format!("failed to walk {}", root.path().display()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let relative = entry
            .path()
            .strip_prefix(root.path())
            .with_context(|| format!("{} is not in the mirror", entry.path().display()))?;
        let path = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");

        entries.push(MirrorEntry {
            path,
            sha256: sha256_file(entry.path())?,
        });
    }

    entries.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(entries)
}
