//! Cron-triggered runs. Each tick starts a full run for the current UTC date; ticks that land
//! during an active run wait for it.

use std::sync::Arc;

use time::OffsetDateTime;
use tokio_cron_scheduler::{Job, JobScheduler};

use chanlake_pipeline::{Pipeline, RunReport};

pub async fn run_scheduled(pipeline: Arc<Pipeline>) -> color_eyre::Result<()> {
	let cron = pipeline.config().schedule.cron.clone();
	let mut scheduler = JobScheduler::new().await?;
	let job_pipeline = pipeline.clone();
	let job = Job::new_async(cron.as_str(), move |_job_id, _scheduler| {
		let pipeline = job_pipeline.clone();

		Box::pin(async move {
			let report = pipeline.run(OffsetDateTime::now_utc().date()).await;

			log_report(&report);
		})
	})?;

	scheduler.add(job).await?;
	scheduler.start().await?;

	tracing::info!(cron = %cron, "Scheduler started.");

	tokio::signal::ctrl_c().await?;

	tracing::info!("Shutdown requested; stopping scheduler.");

	scheduler.shutdown().await?;

	Ok(())
}

fn log_report(report: &RunReport) {
	if report.succeeded() {
		tracing::info!(run_id = %report.run_id, "Scheduled run complete.");
	} else {
		tracing::error!(run_id = %report.run_id, state = ?report.state, "Scheduled run failed.");
	}

	match serde_json::to_string(report) {
		Ok(json) => tracing::debug!(report = %json, "Scheduled run report."),
		Err(err) => tracing::warn!(error = %err, "Failed to serialize run report."),
	}
}
