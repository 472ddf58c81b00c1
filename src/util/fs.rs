//! Filesystem utilities.

use std::fs::{self, File};
use std::io::{self, BufReader, Read, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

/// Ensure a directory exists, creating it if necessary.
pub fn ensure_dir(path: &Path) -> Result<()> {
    if !path.exists() {
        fs::create_dir_all(path)
            .with_context(|| format!("failed to create directory: {}", path.display()))?;
    }
    Ok(())
}

/// Read a file to string, with nice error messages.
pub fn read_to_string(path: &Path) -> Result<String> {
    fs::read_to_string(path).with_context(|| format!("failed to read file: {}", path.display()))
}

/// Write a string to a file atomically, creating parent directories if needed.
///
/// The content goes to a temporary file in the same directory first and is
/// renamed over `path`, so readers never observe a half-written file.
pub fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    ensure_dir(parent)?;

    let mut tmp = tempfile::NamedTempFile::new_in(parent)
        .with_context(|| format!("failed to create temporary file in {}", parent.display()))?;
    tmp.write_all(contents.as_bytes())
        .with_context(|| format!("failed to write file: {}", path.display()))?;
    tmp.persist(path)
        .with_context(|| format!("failed to write file: {}", path.display()))?;
    Ok(())
}

/// Move a file, falling back to copy + remove across filesystems.
pub fn move_file(src: &Path, dst: &Path) -> Result<()> {
    if let Some(parent) = dst.parent() {
        ensure_dir(parent)?;
    }

    if let Err(e) = fs::rename(src, dst) {
        tracing::debug!("rename {} failed ({}), copying instead", src.display(), e);
        fs::copy(src, dst).with_context(|| {
            format!("failed to move {} to {}", src.display(), dst.display())
        })?;
        fs::remove_file(src)
            .with_context(|| format!("failed to remove file: {}", src.display()))?;
    }
    Ok(())
}

/// Compare two files byte for byte.
pub fn files_identical(a: &Path, b: &Path) -> Result<bool> {
    let len_a = fs::metadata(a)
        .with_context(|| format!("failed to stat {}", a.display()))?
        .len();
    let len_b = fs::metadata(b)
        .with_context(|| format!("failed to stat {}", b.display()))?
        .len();
    if len_a != len_b {
        return Ok(false);
    }

    let open = |p: &Path| {
        File::open(p)
            .map(BufReader::new)
            .with_context(|| format!("failed to open {}", p.display()))
    };
    let mut reader_a = open(a)?;
    let mut reader_b = open(b)?;
    let mut buf_a = [0u8; 8192];
    let mut buf_b = [0u8; 8192];

    loop {
        let n = reader_a.read(&mut buf_a)?;
        if n == 0 {
            return Ok(true);
        }
        reader_b.read_exact(&mut buf_b[..n])?;
        if buf_a[..n] != buf_b[..n] {
            return Ok(false);
        }
    }
}

/// Remove a file or symlink, if it exists.
pub fn remove_file_if_exists(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e).with_context(|| format!("failed to remove file: {}", path.display())),
    }
}

/// Get the relative path from `base` to `path`.
pub fn relative_path(base: &Path, path: &Path) -> PathBuf {
    pathdiff::diff_paths(path, base).unwrap_or_else(|| path.to_path_buf())
}

/// Replace `link` with a relative symlink to `target`.
pub fn symlink_relative(target: &Path, link: &Path) -> Result<()> {
    let link_dir = link.parent().unwrap_or_else(|| Path::new("."));
    let relative = relative_path(link_dir, target);

    remove_file_if_exists(link)?;
    symlink(&relative, link).with_context(|| {
        format!(
            "failed to link {} -> {}",
            link.display(),
            relative.display()
        )
    })
}

/// Check whether `link` is a symlink that resolves to `target`.
pub fn links_to(link: &Path, target: &Path) -> bool {
    let is_link = fs::symlink_metadata(link)
        .map(|m| m.file_type().is_symlink())
        .unwrap_or(false);
    if !is_link {
        return false;
    }
    match (link.canonicalize(), target.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

/// Check whether `a` and `b` resolve to the same existing file.
pub fn same_file(a: &Path, b: &Path) -> bool {
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

/// Create a symlink (platform-aware).
#[cfg(unix)]
pub fn symlink(src: &Path, dst: &Path) -> io::Result<()> {
    std::os::unix::fs::symlink(src, dst)
}

#[cfg(windows)]
pub fn symlink(src: &Path, dst: &Path) -> io::Result<()> {
    std::os::windows::fs::symlink_file(src, dst)
}
