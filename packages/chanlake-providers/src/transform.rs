use std::{path::PathBuf, process::Stdio, time::Duration};

use tokio::{process::Command, time};

const MAX_LOGGED_OUTPUT_CHARS: usize = 16_384;

#[derive(Debug, thiserror::Error)]
pub enum TransformError {
	#[error("Transformation command must be non-empty.")]
	EmptyCommand,
	#[error("Failed to launch transformation command {program:?}.")]
	Spawn { program: String, source: std::io::Error },
	#[error("Failed to collect transformation output.")]
	Wait { source: std::io::Error },
	#[error("Transformation exited with status {code:?}.")]
	Exit { code: Option<i32>, stderr: String },
	#[error("Transformation timed out after {timeout_ms} ms.")]
	TimedOut { timeout_ms: u64 },
}

/// Runs the warehouse transformation as an opaque subprocess; exit code 0 is success.
pub struct CommandTransformer {
	program: String,
	args: Vec<String>,
	working_dir: PathBuf,
	timeout_ms: Option<u64>,
}
impl CommandTransformer {
	pub fn new(cfg: &chanlake_config::Transform) -> Result<Self, TransformError> {
		let (program, args) = cfg.command.split_first().ok_or(TransformError::EmptyCommand)?;

		Ok(Self {
			program: program.clone(),
			args: args.to_vec(),
			working_dir: cfg.working_dir.clone(),
			timeout_ms: cfg.timeout_ms,
		})
	}

	pub async fn run(&self) -> Result<(), TransformError> {
		tracing::info!(
			program = %self.program,
			working_dir = %self.working_dir.display(),
			"Running transformation."
		);

		let child = Command::new(&self.program)
			.args(&self.args)
			.current_dir(&self.working_dir)
			.stdin(Stdio::null())
			.stdout(Stdio::piped())
			.stderr(Stdio::piped())
			.kill_on_drop(true)
			.spawn()
			.map_err(|err| TransformError::Spawn { program: self.program.clone(), source: err })?;
		let output = match self.timeout_ms {
			Some(timeout_ms) => time::timeout(
				Duration::from_millis(timeout_ms),
				child.wait_with_output(),
			)
			.await
			.map_err(|_| TransformError::TimedOut { timeout_ms })?,
			None => child.wait_with_output().await,
		}
		.map_err(|err| TransformError::Wait { source: err })?;
		let stdout = String::from_utf8_lossy(&output.stdout);
		let stderr = String::from_utf8_lossy(&output.stderr);

		tracing::info!(
			stdout = %crate::truncate_output(&stdout, MAX_LOGGED_OUTPUT_CHARS),
			"Transformation stdout."
		);

		if !stderr.trim().is_empty() {
			tracing::error!(
				stderr = %crate::truncate_output(&stderr, MAX_LOGGED_OUTPUT_CHARS),
				"Transformation stderr."
			);
		}
		if !output.status.success() {
			return Err(TransformError::Exit {
				code: output.status.code(),
				stderr: crate::truncate_output(&stderr, MAX_LOGGED_OUTPUT_CHARS),
			});
		}

		Ok(())
	}
}
