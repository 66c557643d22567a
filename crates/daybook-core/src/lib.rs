pub mod assistant;
pub mod chain;
pub mod cli;
pub mod commands;
pub mod config;
pub mod datastore;
pub mod datekey;
pub mod grid;
pub mod placement;
pub mod prayer;
pub mod projection;
pub mod quickadd;
pub mod render;
pub mod state;
pub mod task;

use std::ffi::OsString;

use anyhow::Context;
use clap::Parser;
use tracing::info;

#[tracing::instrument(skip_all)]
pub fn run(raw_args: Vec<OsString>) -> anyhow::Result<()> {
    let cli = cli::GlobalCli::parse_from(raw_args);

    cli::init_tracing(cli.verbose, cli.quiet)?;

    info!(
        verbose = cli.verbose,
        quiet = cli.quiet,
        "starting daybook CLI"
    );

    let mut cfg = config::Config::load(cli.config.as_deref())?;
    if let Some(tz) = cli.timezone.as_deref() {
        cfg.override_timezone(tz)?;
    }

    let data_dir = config::resolve_data_dir(&cfg, cli.data.as_deref())
        .context("failed to resolve data directory")?;

    let store = datastore::DataStore::open(&data_dir)
        .with_context(|| format!("failed to open datastore at {}", data_dir.display()))?;

    let mut renderer = render::Renderer::new(&cfg);
    let inv = cli::Invocation::parse(cli.rest)?;

    commands::dispatch(&store, &cfg, &mut renderer, inv)?;

    info!("done");
    Ok(())
}
