use std::path::{Path, PathBuf};

use serde::Serialize;

use chanlake_config::Config;
use chanlake_domain::{
	ingest::IngestFile,
	message::{self, RawMessage},
};
use chanlake_storage::{db::Db, queries, schema::SchemaPart};

use crate::{Error, Result, locator::FileLocator};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LoadSummary {
	pub files_attempted: u64,
	pub files_succeeded: u64,
	pub files_failed: u64,
	pub messages_inserted: u64,
	/// Already present under the same `(id, channel)`.
	pub messages_skipped: u64,
}

struct FileLoad {
	inserted: u64,
	skipped: u64,
}

enum FileFault {
	Recoverable(String),
	Fatal(Error),
}
impl From<chanlake_storage::Error> for FileFault {
	fn from(err: chanlake_storage::Error) -> Self {
		if err.is_connection() {
			Self::Fatal(Error::Connection(err))
		} else {
			Self::Recoverable(err.to_string())
		}
	}
}
impl From<sqlx::Error> for FileFault {
	fn from(err: sqlx::Error) -> Self {
		chanlake_storage::Error::from(err).into()
	}
}

/// Locates batch files and loads them, opening one pool for the whole stage and closing it on
/// every exit path.
pub async fn run_load(cfg: &Config) -> Result<LoadSummary> {
	let files = FileLocator::new(&cfg.sources.raw_root, &cfg.sources.message_pattern)?.locate();

	if files.is_empty() {
		tracing::info!(
			root = %cfg.sources.raw_root.display(),
			pattern = %cfg.sources.message_pattern,
			"No batch files located; nothing to load."
		);

		return Ok(LoadSummary::default());
	}

	let db = Db::connect(&cfg.storage.postgres).await.map_err(Error::Connection)?;
	let result = async {
		db.ensure_schema(SchemaPart::RawMessages).await.map_err(Error::Schema)?;

		load_batches(&db, &files).await
	}
	.await;

	db.close().await;

	result
}

/// Loads each file in its own transaction. A bad file is logged and skipped; only a lost
/// connection aborts the batch.
pub async fn load_batches(db: &Db, files: &[PathBuf]) -> Result<LoadSummary> {
	let mut summary = LoadSummary::default();

	for path in files {
		summary.files_attempted += 1;

		match load_file(db, path).await {
			Ok(load) => {
				summary.files_succeeded += 1;
				summary.messages_inserted += load.inserted;
				summary.messages_skipped += load.skipped;

				tracing::info!(
					path = %path.display(),
					inserted = load.inserted,
					skipped = load.skipped,
					"Loaded batch file."
				);
			},
			Err(FileFault::Recoverable(reason)) => {
				summary.files_failed += 1;

				tracing::error!(
					path = %path.display(),
					error = %reason,
					"Failed to load batch file; skipping."
				);
			},
			Err(FileFault::Fatal(err)) => {
				tracing::error!(
					path = %path.display(),
					error = %err,
					"Lost storage connection while loading batch file."
				);

				return Err(err);
			},
		}
	}

	tracing::info!(
		attempted = summary.files_attempted,
		succeeded = summary.files_succeeded,
		failed = summary.files_failed,
		"Batch load finished."
	);

	Ok(summary)
}

async fn load_file(db: &Db, path: &Path) -> Result<FileLoad, FileFault> {
	let file = IngestFile::batch(path)
		.map_err(|code| {
			FileFault::Recoverable(format!("Cannot derive channel from path: {code:?}."))
		})?;
	let raw = tokio::fs::read(path)
		.await
		.map_err(|err| FileFault::Recoverable(format!("Failed to read file: {err}.")))?;
	let batch = message::parse_batch(&raw)
		.map_err(|err| FileFault::Recoverable(format!("Malformed batch JSON: {err}.")))?;
	let source_file = path.display().to_string();
	let mut tx = db.pool.begin().await?;
	let mut load = FileLoad { inserted: 0, skipped: 0 };

	for item in batch {
		let row = RawMessage::from_batch(item, &file.channel, &source_file);

		match queries::insert_raw_message_tx(&mut tx, &row).await {
			Ok(true) => load.inserted += 1,
			Ok(false) => load.skipped += 1,
			Err(err) => {
				if let Err(rollback_err) = tx.rollback().await {
					tracing::warn!(path = %source_file, error = %rollback_err, "Rollback failed.");
				}

				return Err(err.into());
			},
		}
	}

	tx.commit().await?;

	Ok(load)
}
