pub mod classify;
pub mod cli;
pub mod commands;
pub mod config;
pub mod datetime;
pub mod paths;
pub mod progress;
pub mod render;
pub mod task;

use std::ffi::OsString;

use clap::Parser;
use tracing::{
  debug,
  info
};

pub use classify::{
  Variant,
  badge_label,
  classify,
  classify_task,
  describe
};
pub use datetime::{
  Clock,
  FixedClock,
  SystemClock,
  elapsed_millis,
  from_milliseconds,
  from_nanoseconds
};
pub use paths::end_of_path;
pub use progress::{
  Bucket,
  BuildTally,
  aggregate_counts,
  render_progress_bar
};
pub use task::{
  Build,
  ClassifyInput,
  Task,
  TaskEndDetails,
  TaskStatus
};

#[tracing::instrument(skip_all)]
pub fn run(
  raw_args: Vec<OsString>
) -> anyhow::Result<()> {
  let pre =
    cli::preprocess_args(&raw_args)?;
  let cli = cli::GlobalCli::parse_from(
    pre.cleaned_args
  );

  cli::init_tracing(
    cli.verbose,
    cli.quiet
  )?;

  info!(
    verbose = cli.verbose,
    quiet = cli.quiet,
    "starting tally"
  );
  debug!(?pre.rc_overrides, "preprocessed rc overrides");

  let mut cfg = config::Config::load(
    cli.tallyrc.as_deref()
  )?;
  cfg.apply_overrides(
    pre.rc_overrides.into_iter().chain(
      cli
        .rc_overrides
        .into_iter()
        .map(|kv| (kv.key, kv.value))
    )
  );

  let mut renderer =
    render::Renderer::new(
      &cfg, cli.json
    )?;

  commands::dispatch(
    &cfg,
    &mut renderer,
    cli.command
  )?;

  info!("done");
  Ok(())
}
