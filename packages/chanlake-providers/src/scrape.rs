use std::{path::Path, process::Stdio};

use tokio::process::Command;

const MAX_LOGGED_OUTPUT_CHARS: usize = 4_096;

#[derive(Debug, thiserror::Error)]
pub enum ScrapeError {
	#[error("Scrape command must be non-empty.")]
	EmptyCommand,
	#[error("Failed to launch scrape command {program:?}.")]
	Spawn { program: String, source: std::io::Error },
	#[error("Failed to prepare output directory {path:?}.")]
	OutputDir { path: std::path::PathBuf, source: std::io::Error },
	#[error("Scrape of channel {channel} exited with status {code:?}.")]
	Exit { channel: String, code: Option<i32>, stderr: String },
}
impl ScrapeError {
	/// Launch failures mean no channel can be scraped; everything else is scoped to one channel.
	pub fn is_fatal(&self) -> bool {
		matches!(self, Self::EmptyCommand | Self::Spawn { .. })
	}
}

/// Invokes the external scraping client once per channel.
///
/// The client writes `{output_dir}/*.json` batches and `{output_dir}/images/{message_id}.jpg`.
pub struct CommandScraper {
	command: Vec<String>,
}
impl CommandScraper {
	pub fn new(cfg: &chanlake_config::Scrape) -> Result<Self, ScrapeError> {
		if cfg.command.is_empty() {
			return Err(ScrapeError::EmptyCommand);
		}

		Ok(Self { command: cfg.command.clone() })
	}

	pub async fn scrape(
		&self,
		channel: &str,
		output_dir: &Path,
		limit: u32,
	) -> Result<(), ScrapeError> {
		tokio::fs::create_dir_all(output_dir)
			.await
			.map_err(|err| ScrapeError::OutputDir { path: output_dir.to_path_buf(), source: err })?;

		let output_dir_text = output_dir.display().to_string();
		let limit_text = limit.to_string();
		let argv = crate::substitute(
			&self.command,
			&[("channel", channel), ("output_dir", &output_dir_text), ("limit", &limit_text)],
		);
		let (program, args) = argv.split_first().ok_or(ScrapeError::EmptyCommand)?;
		let output = Command::new(program)
			.args(args)
			.stdin(Stdio::null())
			.kill_on_drop(true)
			.output()
			.await
			.map_err(|err| ScrapeError::Spawn { program: program.clone(), source: err })?;
		let stderr = String::from_utf8_lossy(&output.stderr);

		tracing::debug!(
			channel,
			stdout = %crate::truncate_output(
				&String::from_utf8_lossy(&output.stdout),
				MAX_LOGGED_OUTPUT_CHARS
			),
			"Scraper output."
		);

		if !output.status.success() {
			tracing::error!(
				channel,
				stderr = %crate::truncate_output(&stderr, MAX_LOGGED_OUTPUT_CHARS),
				"Scraper stderr."
			);

			return Err(ScrapeError::Exit {
				channel: channel.to_string(),
				code: output.status.code(),
				stderr: crate::truncate_output(&stderr, MAX_LOGGED_OUTPUT_CHARS),
			});
		}

		Ok(())
	}
}
