//! Filesystem fixtures for tests.

use std::fs;
use std::path::{Path, PathBuf};

/// Write `content` to `base/relpath`, creating parent directories.
pub fn write_file(base: &Path, relpath: impl AsRef<Path>, content: &str) -> PathBuf {
    let path = base.join(relpath);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(&path, content).unwrap();
    path
}

/// Stage a downloaded artifact at `base/relpath`.
pub fn stage_artifact(base: &Path, relpath: impl AsRef<Path>, content: &str) -> PathBuf {
    write_file(base, relpath, content)
}

/// Create a package directory with a `requirements.txt`.
pub fn pip_package(source: &Path, relpath: &str, requirements: &str) -> PathBuf {
    let dir = source.join(relpath);
    write_file(&dir, "requirements.txt", requirements);
    dir
}
