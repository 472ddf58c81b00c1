//! prefetch CLI - offline dependency mirrors

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

mod cli;
mod commands;

use cli::{Cli, Commands};
use prefetch::util::diagnostic::emit;
use prefetch::util::GlobalContext;
use prefetch::PrefetchError;

fn main() {
    let cli = Cli::parse();
    let color = !cli.no_color;

    if let Err(e) = run(cli) {
        match e.downcast_ref::<PrefetchError>() {
            Some(err) => emit(&err.to_diagnostic(), color),
            None => eprintln!("error: {:#}", e),
        }
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    // Set up logging
    let filter = if cli.verbose {
        EnvFilter::new("prefetch=debug")
    } else {
        EnvFilter::new("prefetch=info")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .without_time()
        .with_writer(std::io::stderr)
        .init();

    let mut ctx = GlobalContext::new()?;
    ctx.set_color(!cli.no_color);

    // Execute command
    match cli.command {
        Commands::FetchDeps(args) => commands::fetch_deps::execute(args, ctx, cli.config),
        Commands::ApplyConfigs(args) => commands::apply_configs::execute(args, ctx),
    }
}
