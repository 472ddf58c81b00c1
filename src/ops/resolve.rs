//! Request resolution.
//!
//! Drives a batch of package specs through fetch, mirroring and manifest
//! rewriting, and assembles one validated [`ResolvedRequest`]. Any failure
//! fails the whole request.

use std::path::Path;

use anyhow::{Context, Result};
use rayon::prelude::*;

use crate::core::errors::PrefetchError;
use crate::core::resolved::{ConfigFile, EnvVar, ResolvedPackage, ResolvedRequest};
use crate::core::spec::{PackageSpec, PackageType};
use crate::core::unique::reduce_to_unique;
use crate::ops::repository::build_repository;
use crate::ops::rewrite::rewrite_requirements_file;
use crate::sources::{FetchedPackage, Fetcher, Indexer};
use crate::util::paths::{OutputDir, RootedPath};

/// Collaborators and settings for a resolution run.
pub struct ResolveOptions<'a> {
    /// Downloads pip packages.
    pub pip_fetcher: &'a dyn Fetcher,
    /// Generates the mirror's index pages.
    pub pip_indexer: &'a dyn Indexer,
    /// Environment variable set to the mirror's index URL.
    pub index_env_var: String,
}

/// Resolve `specs` (relative to `source`) into `output_dir`.
pub fn resolve_request(
    specs: &[PackageSpec],
    source: &RootedPath,
    output_dir: &OutputDir,
    opts: &ResolveOptions<'_>,
) -> Result<ResolvedRequest> {
    let specs = specs
        .iter()
        .map(|spec| spec.rooted(source))
        .collect::<Result<Vec<_>, _>>()?;
    let specs = reduce_to_unique(specs)?;

    let fetchers = specs
        .iter()
        .map(|spec| fetcher_for(spec, opts))
        .collect::<Result<Vec<_>, _>>()?;

    tracing::info!("fetching dependencies for {} packages", specs.len());
    let fetched: Vec<FetchedPackage> = specs
        .par_iter()
        .zip(fetchers.par_iter())
        .map(|(spec, fetcher)| {
            tracing::debug!("fetching {} with {}", spec.path().display(), fetcher.name());
            fetcher.fetch(spec, output_dir).with_context(|| {
                format!(
                    "failed to fetch {} package at {}",
                    spec.package_type(),
                    spec.path().display()
                )
            })
        })
        .collect::<Result<Vec<_>>>()?;

    let mut packages = Vec::with_capacity(specs.len());
    let mut requirement_files = Vec::with_capacity(specs.len());
    for (spec, fetched) in specs.iter().zip(fetched) {
        packages.push(ResolvedPackage::new(
            spec.package_type(),
            spec.path(),
            fetched.dependencies,
        )?);
        requirement_files.push(fetched.requirement_files);
    }

    let mut env_vars = Vec::new();
    if packages.iter().any(|pkg| pkg.package_type == PackageType::Pip) {
        let dependencies: Vec<_> = packages
            .iter()
            .filter(|pkg| pkg.package_type == PackageType::Pip)
            .flat_map(|pkg| pkg.dependencies().iter().cloned())
            .collect();

        let repo = build_repository(&dependencies, &output_dir.pip_local_index()?, opts.pip_indexer)?;

        for (pkg, files) in packages.iter_mut().zip(&requirement_files) {
            if pkg.package_type != PackageType::Pip {
                continue;
            }
            let config_files = rewrite_package_files(&pkg.abspath, files, &repo.external_dir)?;
            pkg.set_config_files(config_files)?;
        }

        env_vars.push(EnvVar::new(opts.index_env_var.as_str(), repo.index_url.as_str()));
    }

    let request = ResolvedRequest::new(packages, env_vars)?;
    tracing::info!(
        "resolved {} packages with {} generated files",
        request.packages().len(),
        request.config_file_contents().count()
    );
    Ok(request)
}

fn fetcher_for<'a>(
    spec: &PackageSpec,
    opts: &ResolveOptions<'a>,
) -> Result<&'a dyn Fetcher, PrefetchError> {
    match spec.package_type() {
        PackageType::Pip => Ok(opts.pip_fetcher),
        PackageType::Gomod => Err(PrefetchError::InvalidPackageSpec {
            spec: format!("{}:{}", spec.package_type(), spec.path().display()),
            reason: "gomod packages cannot be prefetched yet".to_string(),
        }),
    }
}

fn rewrite_package_files(
    package_dir: &Path,
    files: &[std::path::PathBuf],
    external_dir: &Path,
) -> Result<Vec<ConfigFile>> {
    let package_root = RootedPath::new(package_dir)?;

    let mut config_files = Vec::new();
    for file in files {
        let file = package_root.join_within_root(file)?;
        let Some(content) = rewrite_requirements_file(&file, external_dir)? else {
            continue;
        };
        let relpath = file
            .strip_prefix(package_root.path())
            .with_context(|| format!("{} is not in {}", file.display(), package_dir.display()))?
            .to_path_buf();
        config_files.push(ConfigFile { relpath, content });
    }
    Ok(config_files)
}
