pub mod schedule;

use std::{path::PathBuf, sync::Arc};

use clap::{Parser, Subcommand};
use color_eyre::eyre;
use time::{Date, OffsetDateTime, macros::format_description};
use tracing_subscriber::EnvFilter;

use chanlake_pipeline::{Capabilities, Pipeline, RunReport, RunState, Stage};

#[derive(Debug, Parser)]
#[command(
	version = chanlake_cli::VERSION,
	rename_all = "kebab",
	styles = chanlake_cli::styles(),
)]
pub struct Args {
	#[arg(long, short = 'c', value_name = "FILE")]
	pub config: PathBuf,
	#[command(subcommand)]
	pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
	/// Execute one pipeline run now, for recovery or backfill.
	Run {
		/// Logical date of the run. Defaults to today in UTC.
		#[arg(long, value_name = "YYYY-MM-DD", value_parser = parse_date)]
		date: Option<Date>,
		/// First stage to execute; earlier stages are recorded as skipped.
		#[arg(long, value_name = "STAGE", default_value = "scrape")]
		start_at: Stage,
	},
	/// Trigger a full run on the configured cron schedule until interrupted.
	Schedule,
}

pub async fn run(args: Args) -> color_eyre::Result<()> {
	let config = chanlake_config::load(&args.config)?;

	init_tracing(&config);

	let capabilities = Capabilities::from_config(&config)?;
	let pipeline = Pipeline::new(config, capabilities);

	match args.command {
		Command::Run { date, start_at } => {
			let logical_date = date.unwrap_or_else(|| OffsetDateTime::now_utc().date());
			let report = pipeline.run_from(logical_date, start_at).await;

			println!("{}", serde_json::to_string_pretty(&report)?);

			ensure_succeeded(&report)
		},
		Command::Schedule => schedule::run_scheduled(Arc::new(pipeline)).await,
	}
}

fn ensure_succeeded(report: &RunReport) -> color_eyre::Result<()> {
	match report.state {
		RunState::Complete => Ok(()),
		RunState::Failed(stage) => Err(eyre::eyre!(
			"Pipeline run {} failed at the {stage} stage. Re-run with --start-at {stage} after \
			 fixing the cause.",
			report.run_id
		)),
		RunState::Refused => Err(eyre::eyre!(
			"Pipeline run {} was refused: {}",
			report.run_id,
			report.refused_reason.as_deref().unwrap_or("no reason recorded.")
		)),
		state => Err(eyre::eyre!("Pipeline run {} ended in state {state:?}.", report.run_id)),
	}
}

fn parse_date(raw: &str) -> Result<Date, time::error::Parse> {
	Date::parse(raw.trim(), format_description!("[year]-[month]-[day]"))
}

fn init_tracing(config: &chanlake_config::Config) {
	let filter =
		EnvFilter::try_new(&config.service.log_level).unwrap_or_else(|_| EnvFilter::new("info"));

	tracing_subscriber::fmt().with_env_filter(filter).init();
}
