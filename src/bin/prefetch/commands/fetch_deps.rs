//! `prefetch fetch-deps` command

use std::path::PathBuf;

use anyhow::{bail, Result};

use crate::cli::FetchDepsArgs;
use prefetch::core::spec::{parse_package_arg, parse_package_list};
use prefetch::ops::{resolve_request, write_output, ResolveOptions};
use prefetch::sources::{CommandFetcher, CommandIndexer};
use prefetch::util::diagnostic::suggestions;
use prefetch::util::{GlobalContext, OutputDir, RootedPath};

pub fn execute(args: FetchDepsArgs, mut ctx: GlobalContext, config: Option<PathBuf>) -> Result<()> {
    let specs = match &args.packagelist {
        Some(list) => parse_package_list(list)?,
        None => args
            .packages
            .iter()
            .map(|arg| parse_package_arg(arg))
            .collect::<Result<Vec<_>, _>>()?,
    };
    if specs.is_empty() {
        bail!("no packages to fetch\n{}", suggestions::NO_PACKAGES);
    }

    let source = RootedPath::new(ctx.absolute(&args.source))?;
    ctx.load_config(source.path(), config.as_deref())?;
    let output_dir = OutputDir::new(ctx.absolute(&args.output_dir))?;

    let fetcher = CommandFetcher::pip(ctx.config());
    let indexer = CommandIndexer::pip(ctx.config());
    let opts = ResolveOptions {
        pip_fetcher: &fetcher,
        pip_indexer: &indexer,
        index_env_var: ctx.config().pip_index_env_var().to_string(),
    };

    let request = resolve_request(&specs, &source, &output_dir, &opts)?;
    write_output(&request, &output_dir)?;

    eprintln!(
        "     Fetched {} packages into {}",
        request.packages().len(),
        output_dir.path().display()
    );
    Ok(())
}
