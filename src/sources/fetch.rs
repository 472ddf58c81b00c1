//! Dependency fetching.
//!
//! Downloading is delegated to an external tool. The tool is given the
//! package directory and a staging directory, downloads everything the
//! package needs, and prints a JSON report on stdout:
//!
//! ```json
//! {
//!   "dependencies": [
//!     {"name": "requests", "version": "2.31.0", "path": "deps/pip/requests-2.31.0.tar.gz"},
//!     {"name": "x", "version": "git+https://example.com/x.git@abc", "path": "...", "dev": true}
//!   ],
//!   "requirements": ["/src/app/requirements.txt"]
//! }
//! ```
//!
//! Dependency paths are taken relative to the staging directory and must stay
//! inside it. Relative requirement paths are relative to the package directory.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::Deserialize;

use crate::core::errors::PrefetchError;
use crate::core::resolved::ResolvedDependency;
use crate::core::spec::{PackageSpec, PackageType, PipPackageSpec};
use crate::util::config::Config;
use crate::util::paths::{normalize_lexically, OutputDir, RootedPath};
use crate::util::process::ProcessBuilder;

/// What a fetch produced for one package.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchedPackage {
    pub dependencies: Vec<ResolvedDependency>,
    /// Absolute paths of the manifests the dependencies were read from.
    pub requirement_files: Vec<PathBuf>,
}

/// Downloads a package's dependencies into the output directory.
///
/// Fetches for different packages may run concurrently.
pub trait Fetcher: Sync {
    /// Name for display.
    fn name(&self) -> &str;

    /// Fetch everything `spec` needs. `spec` paths are absolute.
    fn fetch(&self, spec: &PackageSpec, output_dir: &OutputDir) -> Result<FetchedPackage>;
}

#[derive(Debug, Deserialize)]
struct FetchReport {
    #[serde(default)]
    dependencies: Vec<ReportedDependency>,
    #[serde(default)]
    requirements: Vec<PathBuf>,
}

#[derive(Debug, Deserialize)]
struct ReportedDependency {
    name: String,
    version: String,
    #[serde(alias = "downloaded_path")]
    path: PathBuf,
    #[serde(default)]
    dev: bool,
}

/// Runs a configured command to fetch pip dependencies.
#[derive(Debug, Clone)]
pub struct CommandFetcher {
    argv: Vec<String>,
    timeout: Duration,
}

impl CommandFetcher {
    pub fn new(argv: Vec<String>, timeout: Duration) -> Self {
        CommandFetcher { argv, timeout }
    }

    /// The pip fetcher described by `config`.
    pub fn pip(config: &Config) -> Self {
        Self::new(config.pip_fetch_command(), config.timeout())
    }

    fn command(&self, spec: &PipPackageSpec, deps_dir: &RootedPath) -> Result<ProcessBuilder> {
        let mut cmd = ProcessBuilder::from_argv(&self.argv)
            .context("no pip fetch command configured")?
            .arg("--package-dir")
            .arg(&spec.path)
            .arg("--output-dir")
            .arg(deps_dir.path())
            .cwd(&spec.path)
            .timeout(self.timeout);

        for file in spec.requirements_files.iter().flatten() {
            cmd = cmd.arg("--requirements-file").arg(file);
        }
        for file in spec.requirements_build_files.iter().flatten() {
            cmd = cmd.arg("--requirements-build-file").arg(file);
        }
        Ok(cmd)
    }
}

impl Fetcher for CommandFetcher {
    fn name(&self) -> &str {
        "pip"
    }

    fn fetch(&self, spec: &PackageSpec, output_dir: &OutputDir) -> Result<FetchedPackage> {
        let PackageSpec::Pip(pip) = spec else {
            bail!("{} fetcher cannot handle {} packages", self.name(), spec.package_type());
        };

        let deps_dir = output_dir.pip_deps()?;
        let output = self.command(pip, &deps_dir)?.exec_and_check()?;

        let report: FetchReport = serde_json::from_slice(&output.stdout).with_context(|| {
            format!(
                "fetch command for {} printed an invalid report",
                pip.path.display()
            )
        })?;

        let package_dir = RootedPath::new(&pip.path)?;
        parse_report(report, &package_dir, &deps_dir)
    }
}

fn parse_report(
    report: FetchReport,
    package_dir: &RootedPath,
    deps_dir: &RootedPath,
) -> Result<FetchedPackage> {
    let dependencies = report
        .dependencies
        .into_iter()
        .map(|dep| -> Result<ResolvedDependency> {
            let staged = staged_path(deps_dir, &dep.path)?;
            Ok(ResolvedDependency::new(PackageType::Pip, dep.name, dep.version, staged).dev(dep.dev))
        })
        .collect::<Result<Vec<_>>>()?;

    let requirement_files = report
        .requirements
        .iter()
        .map(|file| package_dir.join_within_root(file))
        .collect::<Result<Vec<_>, _>>()?;

    tracing::debug!(
        "{}: {} dependencies, {} requirement files",
        package_dir.path().display(),
        dependencies.len(),
        requirement_files.len()
    );

    Ok(FetchedPackage {
        dependencies,
        requirement_files,
    })
}

/// Resolve a reported artifact path, which must stay inside the staging directory.
///
/// The file itself may already be a link into the mirror, so only its
/// directory is resolved through symlinks.
fn staged_path(deps_dir: &RootedPath, reported: &Path) -> Result<PathBuf, PrefetchError> {
    let staged = normalize_lexically(&deps_dir.path().join(reported));
    let escape = || PrefetchError::PathEscape {
        path: reported.to_path_buf(),
        root: deps_dir.path().to_path_buf(),
    };

    let relative = staged.strip_prefix(deps_dir.path()).map_err(|_| escape())?;
    let (Some(filename), Some(parent)) = (relative.file_name(), relative.parent()) else {
        return Err(escape());
    };
    Ok(deps_dir.join_within_root(parent)?.join(filename))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn report(json: &str) -> FetchReport {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_parse_report() {
        let tmp = TempDir::new().unwrap();
        let output_dir = OutputDir::new(tmp.path().join("out")).unwrap();
        let deps_dir = output_dir.pip_deps().unwrap();
        let package_dir = RootedPath::create(tmp.path().join("src")).unwrap();

        let fetched = parse_report(
            report(
                r#"{
                    "dependencies": [
                        {"name": "a", "version": "1.0", "path": "a-1.0.tar.gz"},
                        {"name": "b", "version": "2.0", "downloaded_path": "b-2.0.whl", "dev": true}
                    ],
                    "requirements": ["requirements.txt"]
                }"#,
            ),
            &package_dir,
            &deps_dir,
        )
        .unwrap();

        assert_eq!(fetched.dependencies.len(), 2);
        assert_eq!(
            fetched.dependencies[0].downloaded_path,
            deps_dir.path().join("a-1.0.tar.gz")
        );
        assert!(fetched.dependencies[1].dev);
        assert_eq!(
            fetched.requirement_files,
            vec![package_dir.path().join("requirements.txt")]
        );
    }

    #[test]
    fn test_report_paths_are_contained() {
        let tmp = TempDir::new().unwrap();
        let output_dir = OutputDir::new(tmp.path().join("out")).unwrap();
        let deps_dir = output_dir.pip_deps().unwrap();
        let package_dir = RootedPath::create(tmp.path().join("src")).unwrap();

        let err = parse_report(
            report(r#"{"dependencies": [{"name": "a", "version": "1", "path": "../../../a.tar.gz"}]}"#),
            &package_dir,
            &deps_dir,
        )
        .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<PrefetchError>(),
            Some(PrefetchError::PathEscape { .. })
        ));

        let err = parse_report(
            report(r#"{"requirements": ["/etc/passwd"]}"#),
            &package_dir,
            &deps_dir,
        )
        .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<PrefetchError>(),
            Some(PrefetchError::PathEscape { .. })
        ));
    }

    #[test]
    fn test_report_paths_stay_in_staging_dir() {
        let tmp = TempDir::new().unwrap();
        let output_dir = OutputDir::new(tmp.path().join("out")).unwrap();
        let deps_dir = output_dir.pip_deps().unwrap();
        let package_dir = RootedPath::create(tmp.path().join("src")).unwrap();
        std::fs::create_dir_all(output_dir.pip_local_index().unwrap()).unwrap();

        // inside the output directory, but pointing straight at the mirror
        let err = parse_report(
            report(r#"{"dependencies": [{"name": "foo", "version": "1.0", "path": "../../piprepo/foo-1.0.tar.gz"}]}"#),
            &package_dir,
            &deps_dir,
        )
        .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<PrefetchError>(),
            Some(PrefetchError::PathEscape { .. })
        ));

        let fetched = parse_report(
            report(r#"{"dependencies": [{"name": "x", "version": "git+https://e.com/x.git", "path": "external-x/../x.tar.gz"}]}"#),
            &package_dir,
            &deps_dir,
        )
        .unwrap();
        assert_eq!(fetched.dependencies[0].downloaded_path, deps_dir.path().join("x.tar.gz"));
    }

    #[cfg(unix)]
    #[test]
    fn test_report_rejects_linked_staging_subdir() {
        let tmp = TempDir::new().unwrap();
        let output_dir = OutputDir::new(tmp.path().join("out")).unwrap();
        let deps_dir = output_dir.pip_deps().unwrap();
        let package_dir = RootedPath::create(tmp.path().join("src")).unwrap();
        let repo = output_dir.pip_local_index().unwrap();
        std::fs::create_dir_all(&repo).unwrap();
        std::os::unix::fs::symlink(&repo, deps_dir.path().join("sub")).unwrap();

        let err = parse_report(
            report(r#"{"dependencies": [{"name": "foo", "version": "1.0", "path": "sub/foo-1.0.tar.gz"}]}"#),
            &package_dir,
            &deps_dir,
        )
        .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<PrefetchError>(),
            Some(PrefetchError::PathEscape { .. })
        ));
    }

    #[test]
    fn test_command_arguments() {
        let tmp = TempDir::new().unwrap();
        let deps_dir = RootedPath::create(tmp.path().join("deps")).unwrap();
        let spec = PipPackageSpec {
            path: tmp.path().to_path_buf(),
            requirements_files: Some(vec![tmp.path().join("req.txt")]),
            requirements_build_files: Some(vec![tmp.path().join("build.txt")]),
        };

        let fetcher = CommandFetcher::new(
            vec!["pip-prefetch".to_string(), "--quiet".to_string()],
            Duration::from_secs(1),
        );
        let args = fetcher.command(&spec, &deps_dir).unwrap().get_args().to_vec();

        assert_eq!(args[0], "--quiet");
        assert_eq!(args[1], "--package-dir");
        assert!(args.contains(&"--requirements-file".to_string()));
        assert!(args.contains(&"--requirements-build-file".to_string()));
        assert_eq!(args.last().unwrap(), &tmp.path().join("build.txt").display().to_string());
    }

    #[cfg(unix)]
    #[test]
    fn test_fetch_runs_command() {
        let tmp = TempDir::new().unwrap();
        let src = tmp.path().join("src");
        std::fs::create_dir_all(&src).unwrap();
        let output_dir = OutputDir::new(tmp.path().join("out")).unwrap();

        let script = r#"echo '{"dependencies": [{"name": "a", "version": "1.0", "path": "a-1.0.tar.gz"}], "requirements": []}'"#;
        let fetcher = CommandFetcher::new(
            vec!["sh".to_string(), "-c".to_string(), script.to_string()],
            Duration::from_secs(30),
        );

        let spec = PackageSpec::new(PackageType::Pip, &src);
        let fetched = fetcher.fetch(&spec, &output_dir).unwrap();
        assert_eq!(fetched.dependencies[0].name, "a");
    }

    #[test]
    fn test_fetch_rejects_other_types() {
        let tmp = TempDir::new().unwrap();
        let output_dir = OutputDir::new(tmp.path()).unwrap();
        let fetcher = CommandFetcher::new(vec!["true".to_string()], Duration::from_secs(1));

        let spec = PackageSpec::new(PackageType::Gomod, tmp.path());
        assert!(fetcher.fetch(&spec, &output_dir).is_err());
    }
}
