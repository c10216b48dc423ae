//! Stage Scheduler: `Scrape -> Load -> Transform -> Enrich`, halting at the first stage-fatal
//! error.

use std::{fmt, str::FromStr, time::Instant};

use serde::Serialize;
use time::{Date, OffsetDateTime};
use tokio::sync::Mutex;
use tracing::Instrument;
use uuid::Uuid;

use chanlake_config::Config;
use chanlake_domain::ingest;

use crate::{
	Capabilities, EnrichSummary, Error, LoadSummary, Result, enrich, loader, time_serde,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
	Scrape,
	Load,
	Transform,
	Enrich,
}
impl Stage {
	pub const ALL: [Stage; 4] = [Self::Scrape, Self::Load, Self::Transform, Self::Enrich];

	pub fn as_str(self) -> &'static str {
		match self {
			Self::Scrape => "scrape",
			Self::Load => "load",
			Self::Transform => "transform",
			Self::Enrich => "enrich",
		}
	}
}

impl fmt::Display for Stage {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

impl FromStr for Stage {
	type Err = UnknownStage;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		Self::ALL
			.into_iter()
			.find(|stage| stage.as_str().eq_ignore_ascii_case(s.trim()))
			.ok_or_else(|| UnknownStage(s.to_string()))
	}
}

#[derive(Debug, thiserror::Error)]
#[error("Unknown stage {0:?}; expected scrape, load, transform or enrich.")]
pub struct UnknownStage(String);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
	Pending,
	Running,
	Succeeded,
	Failed,
	/// Before the requested start stage of a recovery run.
	Skipped,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ScrapeSummary {
	pub channels_attempted: u64,
	pub channels_succeeded: u64,
	pub channels_failed: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TransformSummary {
	pub elapsed_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum StageSummary {
	Scrape(ScrapeSummary),
	Load(LoadSummary),
	Transform(TransformSummary),
	Enrich(EnrichSummary),
}

#[derive(Debug, Clone, Serialize)]
pub struct StageRun {
	pub stage: Stage,
	pub status: StageStatus,
	#[serde(with = "time_serde::option")]
	pub started_at: Option<OffsetDateTime>,
	#[serde(with = "time_serde::option")]
	pub finished_at: Option<OffsetDateTime>,
	pub summary: Option<StageSummary>,
	pub error: Option<String>,
}
impl StageRun {
	fn new(stage: Stage) -> Self {
		Self {
			stage,
			status: StageStatus::Pending,
			started_at: None,
			finished_at: None,
			summary: None,
			error: None,
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "stage", rename_all = "snake_case")]
pub enum RunState {
	NotStarted,
	Running(Stage),
	Complete,
	Failed(Stage),
	/// Another run for the same logical date held the run lock, or the lock was unreachable.
	Refused,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
	pub run_id: Uuid,
	#[serde(with = "time_serde::date")]
	pub logical_date: Date,
	pub state: RunState,
	pub stages: Vec<StageRun>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub refused_reason: Option<String>,
}
impl RunReport {
	fn new(run_id: Uuid, logical_date: Date) -> Self {
		Self {
			run_id,
			logical_date,
			state: RunState::NotStarted,
			stages: Stage::ALL.into_iter().map(StageRun::new).collect(),
			refused_reason: None,
		}
	}

	fn refused(run_id: Uuid, logical_date: Date, reason: String) -> Self {
		Self {
			state: RunState::Refused,
			refused_reason: Some(reason),
			..Self::new(run_id, logical_date)
		}
	}

	pub fn succeeded(&self) -> bool {
		self.state == RunState::Complete
	}

	pub fn stage(&self, stage: Stage) -> Option<&StageRun> {
		self.stages.iter().find(|run| run.stage == stage)
	}
}

/// Owns the configuration and capabilities for every run. Runs through one `Pipeline` never
/// overlap; a second trigger waits for the active run to finish. With a run locker configured,
/// a run for a date another process is already running is refused instead.
pub struct Pipeline {
	cfg: Config,
	capabilities: Capabilities,
	run_lock: Mutex<()>,
}
impl Pipeline {
	pub fn new(cfg: Config, capabilities: Capabilities) -> Self {
		Self { cfg, capabilities, run_lock: Mutex::new(()) }
	}

	pub fn config(&self) -> &Config {
		&self.cfg
	}

	pub async fn run(&self, logical_date: Date) -> RunReport {
		self.run_from(logical_date, Stage::Scrape).await
	}

	/// Starts at `start_at`, recording earlier stages as skipped. Used for operator recovery and
	/// backfill.
	pub async fn run_from(&self, logical_date: Date, start_at: Stage) -> RunReport {
		let _guard = self.run_lock.lock().await;
		let run_id = Uuid::new_v4();
		let span = tracing::info_span!(
			"pipeline_run",
			run_id = %run_id,
			logical_date = %ingest::date_segment(logical_date),
		);

		self.locked(run_id, logical_date, start_at).instrument(span).await
	}

	async fn locked(&self, run_id: Uuid, logical_date: Date, start_at: Stage) -> RunReport {
		let Some(locker) = self.capabilities.run_locker.as_ref() else {
			return self.execute(run_id, logical_date, start_at).await;
		};
		let lease = match locker.try_lock(logical_date).await {
			Ok(Some(lease)) => lease,
			Ok(None) => {
				tracing::error!("Another run for this date holds the run lock; refusing.");

				return RunReport::refused(
					run_id,
					logical_date,
					"Another run for this logical date is in progress.".to_string(),
				);
			},
			Err(err) => {
				tracing::error!(error = %err, "Failed to take the run lock; refusing.");

				return RunReport::refused(
					run_id,
					logical_date,
					format!("Failed to take the run lock: {err}"),
				);
			},
		};
		let report = self.execute(run_id, logical_date, start_at).await;

		lease.release().await;

		report
	}

	async fn execute(&self, run_id: Uuid, logical_date: Date, start_at: Stage) -> RunReport {
		let mut report = RunReport::new(run_id, logical_date);

		tracing::info!(start_at = %start_at, "Pipeline run started.");

		for stage_run in &mut report.stages {
			let stage = stage_run.stage;

			if stage < start_at {
				stage_run.status = StageStatus::Skipped;

				continue;
			}

			report.state = RunState::Running(stage);
			stage_run.status = StageStatus::Running;
			stage_run.started_at = Some(OffsetDateTime::now_utc());

			tracing::info!(stage = %stage, "Stage started.");

			let outcome = self.run_stage(stage, logical_date).await;

			stage_run.finished_at = Some(OffsetDateTime::now_utc());

			match outcome {
				Ok(summary) => {
					stage_run.status = StageStatus::Succeeded;
					stage_run.summary = Some(summary);

					tracing::info!(stage = %stage, "Stage succeeded.");
				},
				Err(err) => {
					stage_run.status = StageStatus::Failed;
					stage_run.error = Some(err.to_string());
					report.state = RunState::Failed(stage);

					tracing::error!(stage = %stage, error = %err, "Stage failed; halting run.");

					break;
				},
			}
		}

		if !matches!(report.state, RunState::Failed(_)) {
			report.state = RunState::Complete;

			tracing::info!("Pipeline run complete.");
		}

		report
	}

	async fn run_stage(&self, stage: Stage, logical_date: Date) -> Result<StageSummary> {
		match stage {
			Stage::Scrape => self.scrape(logical_date).await.map(StageSummary::Scrape),
			Stage::Load => loader::run_load(&self.cfg).await.map(StageSummary::Load),
			Stage::Transform => self.transform().await.map(StageSummary::Transform),
			Stage::Enrich =>
				enrich::run_enrich(&self.cfg, self.capabilities.detector_loader.as_ref())
					.await
					.map(StageSummary::Enrich),
		}
	}

	async fn scrape(&self, logical_date: Date) -> Result<ScrapeSummary> {
		let mut summary = ScrapeSummary::default();
		let Some(scraper) = self.capabilities.scraper.as_ref() else {
			tracing::info!("Scraping is disabled; using files already on disk.");

			return Ok(summary);
		};

		for channel in &self.cfg.sources.channels {
			let output_dir =
				ingest::partition_dir(&self.cfg.sources.raw_root, logical_date, channel);

			summary.channels_attempted += 1;

			match scraper.scrape(channel, &output_dir, self.cfg.scrape.message_limit).await {
				Ok(()) => {
					summary.channels_succeeded += 1;

					tracing::info!(
						channel = %channel,
						output_dir = %output_dir.display(),
						"Scraped channel."
					);
				},
				Err(err) if err.is_fatal() => return Err(Error::Scrape(err)),
				Err(err) => {
					summary.channels_failed += 1;

					tracing::error!(
						channel = %channel,
						error = %err,
						"Failed to scrape channel; continuing."
					);
				},
			}
		}

		Ok(summary)
	}

	async fn transform(&self) -> Result<TransformSummary> {
		let started = Instant::now();

		self.capabilities.transformer.run_transform().await?;

		let elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

		Ok(TransformSummary { elapsed_ms })
	}
}
