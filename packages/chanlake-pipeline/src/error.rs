use chanlake_providers::{scrape::ScrapeError, transform::TransformError};

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Stage-fatal failures. Item-level faults never surface here; they are counted in summaries.
#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("Storage connection failed: {0}")]
	Connection(#[source] chanlake_storage::Error),
	#[error("Schema setup failed: {0}")]
	Schema(#[source] chanlake_storage::Error),
	#[error("Invalid file pattern {pattern:?}: {message}")]
	Pattern { pattern: String, message: String },
	#[error(transparent)]
	Scrape(#[from] ScrapeError),
	#[error(transparent)]
	Transform(#[from] TransformError),
	#[error("Failed to load detection model: {0}")]
	DetectorLoad(#[source] chanlake_providers::Error),
}
