//! `prefetch apply-configs` command

use anyhow::{bail, Result};

use crate::cli::ApplyConfigsArgs;
use prefetch::ops::apply_configs;
use prefetch::util::diagnostic::{emit, suggestions};
use prefetch::util::{Diagnostic, GlobalContext, OutputDir};

pub fn execute(args: ApplyConfigsArgs, ctx: GlobalContext) -> Result<()> {
    let from = ctx.absolute(&args.from_output_dir);
    if !from.is_dir() {
        bail!(
            "output directory {} does not exist\n{}",
            from.display(),
            suggestions::NO_OUTPUT
        );
    }
    let output_dir = OutputDir::open(&from)?;
    let to_dirs: Vec<_> = args.to_dirs.iter().map(|dir| ctx.absolute(dir)).collect();

    let written = apply_configs(&output_dir, &to_dirs)?;
    if written.is_empty() {
        let mut diag = Diagnostic::warning("nothing to apply");
        if !to_dirs.is_empty() {
            diag = diag.with_context("no generated file is under the given --to-dir paths");
        }
        emit(&diag, ctx.color());
    } else {
        eprintln!("     Applied {} config files", written.len());
    }
    Ok(())
}
