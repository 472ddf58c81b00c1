//! Requirement manifest rewriting.
//!
//! Entries that name a VCS or URL source are pointed at the matching
//! artifact in the mirror's `external/` directory. Every other line,
//! including options, includes and comments, is copied through unchanged.

use std::path::Path;

use anyhow::{anyhow, Result};
use url::Url;

use crate::core::errors::PrefetchError;
use crate::core::requirements::RequirementsFile;
use crate::util::paths::RootedPath;

/// Rewrite the requirements file at `path` against `external_dir`.
///
/// Returns `None` when no entry needed rewriting. The file on disk is never
/// modified, and neither is the mirror.
pub fn rewrite_requirements_file(path: &Path, external_dir: &Path) -> Result<Option<String>> {
    let file = RequirementsFile::load(path)?;
    let external = RootedPath::new(external_dir)?;

    let mut rewritten = String::new();
    let mut changed = 0;

    for line in file.lines() {
        let Some(requirement) = line.requirement().filter(|r| r.is_external()) else {
            rewritten.push_str(line.raw());
            continue;
        };

        let filename = requirement.external_filename().map_err(|reason| {
            PrefetchError::InvalidRequirementsFile {
                path: path.to_path_buf(),
                line: line.number,
                reason,
            }
        })?;
        let artifact = external.join_within_root(&filename)?;
        if !artifact.exists() {
            tracing::warn!(
                "{}:{}: {} is not in the mirror",
                path.display(),
                line.number,
                filename
            );
        }

        let url = Url::from_file_path(&artifact)
            .map_err(|()| anyhow!("cannot express {} as a URL", artifact.display()))?;
        rewritten.push_str(&line.render_with(&requirement.with_url(url.as_str())));
        changed += 1;
    }

    if changed == 0 {
        tracing::debug!("{} needs no changes", path.display());
        return Ok(None);
    }

    tracing::info!("rewrote {} entries in {}", changed, path.display());
    Ok(Some(rewritten))
}
