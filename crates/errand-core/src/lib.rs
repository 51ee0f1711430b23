pub mod calendar;
pub mod cli;
pub mod commands;
pub mod config;
pub mod datetime;
pub mod error;
pub mod filter;
pub mod reminder;
pub mod render;
pub mod store;
pub mod task;
pub mod tracker;

use std::ffi::OsString;

use anyhow::Context;
use clap::Parser;
use tracing::{
  debug,
  info
};

use crate::calendar::{
  CalendarBridge,
  GoogleCalendar
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
    "starting errand"
  );
  debug!(?pre.rc_overrides, "preprocessed rc overrides");

  let mut cfg = config::Config::load(
    cli.errandrc.as_deref()
  )?;
  cfg.apply_overrides(
    pre.rc_overrides.into_iter().chain(
      cli
        .rc_overrides
        .into_iter()
        .map(|kv| (kv.key, kv.value))
    )
  );

  let data_dir =
    config::resolve_data_dir(
      &cfg,
      cli.data.as_deref()
    )
    .context(
      "failed to resolve data \
       directory"
    )?;

  let mut store =
    store::open_store(&cfg, &data_dir)
      .with_context(|| {
        format!(
          "failed to open task store \
           (data dir {})",
          data_dir.display()
        )
      })?;

  let calendar =
    GoogleCalendar::from_config(&cfg)
      .context(
        "failed to set up calendar \
         reminders"
      )?;

  let mut renderer =
    render::Renderer::new(&cfg)?;
  let inv = cli::Invocation::parse(
    &cfg, cli.rest
  )?;

  commands::dispatch(
    store.as_mut(),
    calendar
      .as_ref()
      .map(|c| c as &dyn CalendarBridge),
    &cfg,
    &mut renderer,
    inv
  )?;

  info!("done");
  Ok(())
}
