//! Output files and the apply step.
//!
//! A finished request is persisted as three JSON files in the output
//! directory. `apply_configs` later writes the generated config files back
//! into the source tree.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::core::resolved::ResolvedRequest;
use crate::ops::repository::{mirror_contents, MirrorEntry};
use crate::util::fs::{read_to_string, write_atomic};
use crate::util::paths::{OutputDir, RootedPath};

/// One entry of `config-files.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigFileEntry {
    pub abspath: PathBuf,
    pub content: String,
}

/// Persist `request` into `output_dir`.
///
/// Each file is replaced atomically. The content manifest lists the pip
/// mirror, if one was built.
pub fn write_output(request: &ResolvedRequest, output_dir: &OutputDir) -> Result<()> {
    let configs: Vec<ConfigFileEntry> = request
        .config_file_contents()
        .map(|(abspath, content)| ConfigFileEntry {
            abspath,
            content: content.to_string(),
        })
        .collect();
    write_json(&output_dir.configs_file()?, &configs)?;

    write_json(&output_dir.env_file()?, request.env_vars())?;

    let repo = output_dir.pip_local_index()?;
    let contents: Vec<MirrorEntry> = if repo.is_dir() {
        mirror_contents(&repo)?
    } else {
        Vec::new()
    };
    write_json(&output_dir.content_manifest()?, &contents)?;

    tracing::info!(
        "wrote {} config files, {} env vars and {} mirrored artifacts to {}",
        configs.len(),
        request.env_vars().len(),
        contents.len(),
        output_dir.path().display()
    );
    Ok(())
}

/// Write the config files recorded in `output_dir` to their destinations.
///
/// With `to_dirs`, only files under one of those directories are written.
/// Returns the paths written.
pub fn apply_configs(output_dir: &OutputDir, to_dirs: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let entries: Vec<ConfigFileEntry> = read_json(&output_dir.configs_file()?)?;
    let roots = to_dirs
        .iter()
        .map(RootedPath::new)
        .collect::<Result<Vec<_>>>()?;

    let mut written = Vec::new();
    for entry in entries {
        let destination = if roots.is_empty() {
            entry.abspath.clone()
        } else {
            match roots
                .iter()
                .find_map(|root| root.join_within_root(&entry.abspath).ok())
            {
                Some(destination) => destination,
                None => {
                    tracing::debug!("skipping {}", entry.abspath.display());
                    continue;
                }
            }
        };

        write_atomic(&destination, &entry.content)?;
        tracing::info!("wrote {}", destination.display());
        written.push(destination);
    }
    Ok(written)
}

fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let mut json = serde_json::to_string_pretty(value)
        .with_context(|| format!("failed to serialize {}", path.display()))?;
    json.push('\n');
    write_atomic(path, &json)
}

fn read_json<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<T> {
    let contents = read_to_string(path)?;
    serde_json::from_str(&contents).with_context(|| format!("failed to parse {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::resolved::{ConfigFile, EnvVar, ResolvedPackage};
    use crate::core::spec::PackageType;
    use std::fs;
    use tempfile::TempDir;

    fn request(package_dir: &Path) -> ResolvedRequest {
        let mut pkg = ResolvedPackage::new(PackageType::Pip, package_dir, vec![]).unwrap();
        pkg.set_config_files(vec![ConfigFile {
            relpath: PathBuf::from("requirements.txt"),
            content: "x @ file:///mirror/external/x.tar.gz\n".to_string(),
        }])
        .unwrap();
        ResolvedRequest::new(vec![pkg], vec![EnvVar::new("PIP_INDEX_URL", "file:///mirror/simple/")])
            .unwrap()
    }

    #[test]
    fn test_write_output() {
        let tmp = TempDir::new().unwrap();
        let output = OutputDir::new(tmp.path().join("out")).unwrap();
        fs::create_dir_all(output.path().join("piprepo/simple")).unwrap();
        fs::write(output.path().join("piprepo/foo-1.0.tar.gz"), "foo").unwrap();

        write_output(&request(Path::new("/src/app")), &output).unwrap();

        let configs: Vec<ConfigFileEntry> = read_json(&output.configs_file().unwrap()).unwrap();
        assert_eq!(configs.len(), 1);
        assert_eq!(configs[0].abspath, PathBuf::from("/src/app/requirements.txt"));

        let env: Vec<EnvVar> = read_json(&output.env_file().unwrap()).unwrap();
        assert_eq!(env, vec![EnvVar::new("PIP_INDEX_URL", "file:///mirror/simple/")]);

        let manifest = fs::read_to_string(output.content_manifest().unwrap()).unwrap();
        assert!(manifest.contains("foo-1.0.tar.gz"));
    }

    #[test]
    fn test_apply_configs() {
        let tmp = TempDir::new().unwrap();
        let app = tmp.path().join("src/app");
        fs::create_dir_all(&app).unwrap();
        fs::write(app.join("requirements.txt"), "original\n").unwrap();
        let output = OutputDir::new(tmp.path().join("out")).unwrap();
        write_output(&request(&app.canonicalize().unwrap()), &output).unwrap();

        let written = apply_configs(&output, &[]).unwrap();

        assert_eq!(written.len(), 1);
        assert_eq!(
            fs::read_to_string(app.join("requirements.txt")).unwrap(),
            "x @ file:///mirror/external/x.tar.gz\n"
        );
    }

    #[test]
    fn test_apply_configs_restricted_to_dirs() {
        let tmp = TempDir::new().unwrap();
        let app = tmp.path().join("src/app");
        let other = tmp.path().join("elsewhere");
        fs::create_dir_all(&app).unwrap();
        fs::create_dir_all(&other).unwrap();
        let output = OutputDir::new(tmp.path().join("out")).unwrap();
        write_output(&request(&app.canonicalize().unwrap()), &output).unwrap();

        assert!(apply_configs(&output, &[other]).unwrap().is_empty());
        assert!(!app.join("requirements.txt").exists());

        let written = apply_configs(&output, &[tmp.path().join("src")]).unwrap();
        assert_eq!(written.len(), 1);
    }
}
