pub mod enrich;
pub mod loader;
pub mod locator;
pub mod run;
pub mod time_serde;

mod error;

pub use enrich::EnrichSummary;
pub use error::{Error, Result};
pub use loader::LoadSummary;
pub use locator::FileLocator;
pub use run::{
	Pipeline, RunReport, RunState, ScrapeSummary, Stage, StageRun, StageStatus, StageSummary,
	TransformSummary,
};

use std::{future::Future, path::Path, pin::Pin, sync::Arc};

use time::Date;

use chanlake_config::Config;
use chanlake_domain::detection::DetectedObject;
use chanlake_providers::{
	detector::HttpDetector,
	scrape::{CommandScraper, ScrapeError},
	transform::{CommandTransformer, TransformError},
};
use chanlake_storage::lock::RunLock;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Fetches one channel's recent messages into `output_dir`.
pub trait Scraper
where
	Self: Send + Sync,
{
	fn scrape<'a>(
		&'a self,
		channel: &'a str,
		output_dir: &'a Path,
		limit: u32,
	) -> BoxFuture<'a, Result<(), ScrapeError>>;
}

/// The warehouse transformation step. Any error fails the Transform stage.
pub trait Transformer
where
	Self: Send + Sync,
{
	fn run_transform(&self) -> BoxFuture<'_, Result<(), TransformError>>;
}

pub trait Detector
where
	Self: Send + Sync,
{
	/// Identifier stored alongside every detection this instance produces.
	fn model(&self) -> &str;

	fn detect<'a>(
		&'a self,
		image_path: &'a Path,
	) -> BoxFuture<'a, chanlake_providers::Result<Vec<DetectedObject>>>;
}

/// Performs the expensive model initialization. Called at most once per Enrich stage; the returned
/// detector is dropped when the stage ends.
pub trait DetectorLoader
where
	Self: Send + Sync,
{
	fn load(&self) -> BoxFuture<'_, chanlake_providers::Result<Box<dyn Detector>>>;
}

/// Grants exclusive use of one logical date across every process sharing the database.
pub trait RunLocker
where
	Self: Send + Sync,
{
	/// Resolves to `None` when another run for `logical_date` holds the lock.
	fn try_lock(&self, logical_date: Date) -> BoxFuture<'_, Result<Option<Box<dyn RunLease>>>>;
}

/// A held run lock. Dropping it also frees the lock, but without waiting for the server.
pub trait RunLease
where
	Self: Send,
{
	fn release(self: Box<Self>) -> BoxFuture<'static, ()>;
}

#[derive(Clone)]
pub struct Capabilities {
	/// `None` turns the Scrape stage into a no-op.
	pub scraper: Option<Arc<dyn Scraper>>,
	pub transformer: Arc<dyn Transformer>,
	pub detector_loader: Arc<dyn DetectorLoader>,
	/// `None` limits exclusion to the runs of one `Pipeline`.
	pub run_locker: Option<Arc<dyn RunLocker>>,
}
impl Capabilities {
	pub fn new(
		scraper: Option<Arc<dyn Scraper>>,
		transformer: Arc<dyn Transformer>,
		detector_loader: Arc<dyn DetectorLoader>,
	) -> Self {
		Self { scraper, transformer, detector_loader, run_locker: None }
	}

	pub fn with_run_locker(mut self, run_locker: Arc<dyn RunLocker>) -> Self {
		self.run_locker = Some(run_locker);

		self
	}

	/// Wires the subprocess and HTTP adapters described by `cfg`.
	pub fn from_config(cfg: &Config) -> Result<Self> {
		let scraper: Option<Arc<dyn Scraper>> = if cfg.scrape.enabled {
			Some(Arc::new(CommandScraper::new(&cfg.scrape)?))
		} else {
			None
		};
		let transformer = Arc::new(CommandTransformer::new(&cfg.transform)?);
		let detector_loader = Arc::new(HttpDetectorLoader { cfg: cfg.detector.clone() });
		let run_locker: Arc<dyn RunLocker> =
			Arc::new(PgRunLocker::new(cfg.storage.postgres.clone()));

		Ok(Self { scraper, transformer, detector_loader, run_locker: Some(run_locker) })
	}
}

/// Session advisory lock keyed by the logical date's Julian day.
pub struct PgRunLocker {
	cfg: chanlake_config::Postgres,
}
impl PgRunLocker {
	pub fn new(cfg: chanlake_config::Postgres) -> Self {
		Self { cfg }
	}
}

struct PgRunLease(RunLock);

pub struct HttpDetectorLoader {
	cfg: chanlake_config::Detector,
}
impl HttpDetectorLoader {
	pub fn new(cfg: chanlake_config::Detector) -> Self {
		Self { cfg }
	}
}

impl Scraper for CommandScraper {
	fn scrape<'a>(
		&'a self,
		channel: &'a str,
		output_dir: &'a Path,
		limit: u32,
	) -> BoxFuture<'a, Result<(), ScrapeError>> {
		Box::pin(CommandScraper::scrape(self, channel, output_dir, limit))
	}
}

impl Transformer for CommandTransformer {
	fn run_transform(&self) -> BoxFuture<'_, Result<(), TransformError>> {
		Box::pin(self.run())
	}
}

impl Detector for HttpDetector {
	fn model(&self) -> &str {
		HttpDetector::model(self)
	}

	fn detect<'a>(
		&'a self,
		image_path: &'a Path,
	) -> BoxFuture<'a, chanlake_providers::Result<Vec<DetectedObject>>> {
		Box::pin(HttpDetector::detect(self, image_path))
	}
}

impl DetectorLoader for HttpDetectorLoader {
	fn load(&self) -> BoxFuture<'_, chanlake_providers::Result<Box<dyn Detector>>> {
		Box::pin(async move {
			let detector = HttpDetector::load(&self.cfg).await?;

			Ok(Box::new(detector) as Box<dyn Detector>)
		})
	}
}

impl RunLocker for PgRunLocker {
	fn try_lock(&self, logical_date: Date) -> BoxFuture<'_, Result<Option<Box<dyn RunLease>>>> {
		Box::pin(async move {
			let lock = RunLock::try_acquire(&self.cfg, logical_date.to_julian_day())
				.await
				.map_err(Error::Connection)?;

			Ok(lock.map(|lock| Box::new(PgRunLease(lock)) as Box<dyn RunLease>))
		})
	}
}

impl RunLease for PgRunLease {
	fn release(self: Box<Self>) -> BoxFuture<'static, ()> {
		Box::pin(async move {
			let key = self.0.key();

			if let Err(err) = self.0.release().await {
				tracing::warn!(
					key,
					error = %err,
					"Failed to release run lock; session close frees it."
				);
			}
		})
	}
}
