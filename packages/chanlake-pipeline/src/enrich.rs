//! Enrichment: object detection over scraped images, persisted per image.

use std::path::{Path, PathBuf};

use serde::Serialize;

use chanlake_config::Config;
use chanlake_domain::{
	detection::{self, DetectedObject},
	ingest::IngestFile,
};
use chanlake_storage::{db::Db, models::NewDetection, queries, schema::SchemaPart};

use crate::{Detector, DetectorLoader, Error, Result, locator::FileLocator};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EnrichSummary {
	pub images_attempted: u64,
	pub images_succeeded: u64,
	pub images_failed: u64,
	/// File stem is not a message id; never sent to the detector.
	pub images_skipped: u64,
	pub detections_stored: u64,
	/// Rejected by sanitation or below the confidence floor.
	pub detections_dropped: u64,
}

enum ImageFault {
	Recoverable(String),
	Fatal(Error),
}
impl From<chanlake_storage::Error> for ImageFault {
	fn from(err: chanlake_storage::Error) -> Self {
		if err.is_connection() {
			Self::Fatal(Error::Connection(err))
		} else {
			Self::Recoverable(err.to_string())
		}
	}
}
impl From<sqlx::Error> for ImageFault {
	fn from(err: sqlx::Error) -> Self {
		chanlake_storage::Error::from(err).into()
	}
}

/// Runs the Enrich stage: locate images, load the model once, detect and store.
///
/// The model and the pool live only for the duration of this call. Nothing is opened when no
/// image is located.
pub async fn run_enrich(cfg: &Config, loader: &dyn DetectorLoader) -> Result<EnrichSummary> {
	let images = FileLocator::new(&cfg.sources.raw_root, &cfg.sources.image_pattern)?.locate();

	if images.is_empty() {
		tracing::info!(
			root = %cfg.sources.raw_root.display(),
			pattern = %cfg.sources.image_pattern,
			"No images located; nothing to enrich."
		);

		return Ok(EnrichSummary::default());
	}

	let db = Db::connect(&cfg.storage.postgres).await.map_err(Error::Connection)?;
	let result = async {
		db.ensure_schema(SchemaPart::Detections).await.map_err(Error::Schema)?;

		let detector = loader.load().await.map_err(Error::DetectorLoad)?;

		tracing::info!(model = detector.model(), images = images.len(), "Detection model loaded.");

		enrich_images(
			&db,
			detector.as_ref(),
			&images,
			&cfg.sources.images_dir,
			cfg.detector.min_confidence,
		)
		.await
	}
	.await;

	db.close().await;

	result
}

pub async fn enrich_images(
	db: &Db,
	detector: &dyn Detector,
	images: &[PathBuf],
	images_dir: &str,
	min_confidence: f32,
) -> Result<EnrichSummary> {
	let mut summary = EnrichSummary::default();

	for path in images {
		summary.images_attempted += 1;

		let file = match IngestFile::image(path, images_dir) {
			Ok(file) => file,
			Err(code) => {
				summary.images_skipped += 1;

				tracing::warn!(
					path = %path.display(),
					code = ?code,
					"Image name is not a message id; skipping."
				);

				continue;
			},
		};
		let objects = match detector.detect(path).await {
			Ok(objects) => objects,
			Err(err) => {
				summary.images_failed += 1;

				tracing::error!(
					path = %path.display(),
					error = %err,
					"Detection failed for image; skipping."
				);

				continue;
			},
		};
		let kept = keep_valid(path, objects, min_confidence, &mut summary);

		match store_image(db, &file, detector.model(), &kept).await {
			Ok(()) => {
				summary.images_succeeded += 1;
				summary.detections_stored += kept.len() as u64;

				tracing::debug!(
					path = %path.display(),
					detections = kept.len(),
					"Stored image detections."
				);
			},
			Err(ImageFault::Recoverable(reason)) => {
				summary.images_failed += 1;

				tracing::error!(
					path = %path.display(),
					error = %reason,
					"Failed to store image detections; skipping."
				);
			},
			Err(ImageFault::Fatal(err)) => {
				tracing::error!(
					path = %path.display(),
					error = %err,
					"Lost storage connection while storing detections."
				);

				return Err(err);
			},
		}
	}

	tracing::info!(
		attempted = summary.images_attempted,
		succeeded = summary.images_succeeded,
		failed = summary.images_failed,
		skipped = summary.images_skipped,
		detections = summary.detections_stored,
		"Enrichment finished."
	);

	Ok(summary)
}

fn keep_valid(
	path: &Path,
	objects: Vec<DetectedObject>,
	min_confidence: f32,
	summary: &mut EnrichSummary,
) -> Vec<DetectedObject> {
	let mut kept = Vec::with_capacity(objects.len());

	for object in objects {
		match detection::sanitize(object, min_confidence) {
			Ok(object) => kept.push(object),
			Err(code) => {
				summary.detections_dropped += 1;

				if code != detection::DetectionRejectCode::BelowThreshold {
					tracing::warn!(
						path = %path.display(),
						code = ?code,
						"Dropped invalid detection."
					);
				}
			},
		}
	}

	kept
}

/// Replaces every stored detection of one image in a single transaction.
async fn store_image(
	db: &Db,
	file: &IngestFile,
	model: &str,
	detections: &[DetectedObject],
) -> Result<(), ImageFault> {
	let Some(message_id) = file.message_id else {
		return Err(ImageFault::Recoverable("Image has no message id.".to_string()));
	};
	let image_path = file.path.display().to_string();
	let mut tx = db.pool.begin().await?;
	let result = async {
		queries::delete_image_detections_tx(&mut tx, &image_path).await?;

		for object in detections {
			let row = NewDetection {
				message_id,
				channel: &file.channel,
				image_path: &image_path,
				detected_class: &object.class_name,
				confidence: object.confidence,
				bbox_xyxy: object.bbox_xyxy.to_array(),
				model,
			};

			queries::insert_detection_tx(&mut tx, &row).await?;
		}

		Ok::<_, chanlake_storage::Error>(())
	}
	.await;

	match result {
		Ok(()) => {
			tx.commit().await?;

			Ok(())
		},
		Err(err) => {
			if let Err(rollback_err) = tx.rollback().await {
				tracing::warn!(path = %image_path, error = %rollback_err, "Rollback failed.");
			}

			Err(err.into())
		},
	}
}
