use sqlx::{Postgres, Transaction};

use chanlake_domain::message::RawMessage;

use crate::{
	Error, Result,
	db::Db,
	models::{ImageDetection, NewDetection, StoredMessage},
};

/// Returns `false` when a row with the same `(id, channel)` already exists.
pub async fn insert_raw_message_tx(
	tx: &mut Transaction<'_, Postgres>,
	message: &RawMessage,
) -> Result<bool> {
	let result = sqlx::query(
		"\
INSERT INTO raw.telegram_messages (id, channel, date, text, has_image, photo_path, source_file)
VALUES ($1, $2, $3, $4, $5, $6, $7)
ON CONFLICT (id, channel) DO NOTHING",
	)
	.bind(message.id)
	.bind(message.channel.as_str())
	.bind(message.timestamp)
	.bind(message.text.as_deref())
	.bind(message.has_image)
	.bind(message.photo_path.as_deref())
	.bind(message.source_file.as_str())
	.execute(&mut **tx)
	.await?;

	Ok(result.rows_affected() == 1)
}

pub async fn delete_image_detections_tx(
	tx: &mut Transaction<'_, Postgres>,
	image_path: &str,
) -> Result<u64> {
	let result = sqlx::query("DELETE FROM enrichment.image_detections WHERE image_path = $1")
		.bind(image_path)
		.execute(&mut **tx)
		.await?;

	Ok(result.rows_affected())
}

pub async fn insert_detection_tx(
	tx: &mut Transaction<'_, Postgres>,
	detection: &NewDetection<'_>,
) -> Result<i64> {
	if !(0.0..=1.0).contains(&detection.confidence) {
		return Err(Error::InvalidArgument(format!(
			"Detection confidence {} is outside 0.0-1.0.",
			detection.confidence
		)));
	}

	let bbox = serde_json::to_value(detection.bbox_xyxy)?;
	let detection_id: i64 = sqlx::query_scalar(
		"\
INSERT INTO enrichment.image_detections (
	message_id,
	channel,
	image_path,
	detected_class,
	confidence,
	bbox_xyxy,
	model
)
VALUES ($1, $2, $3, $4, $5, $6, $7)
RETURNING detection_id",
	)
	.bind(detection.message_id)
	.bind(detection.channel)
	.bind(detection.image_path)
	.bind(detection.detected_class)
	.bind(detection.confidence)
	.bind(bbox)
	.bind(detection.model)
	.fetch_one(&mut **tx)
	.await?;

	Ok(detection_id)
}

pub async fn list_messages_by_source(db: &Db, source_file: &str) -> Result<Vec<StoredMessage>> {
	let rows = sqlx::query_as::<_, StoredMessage>(
		"\
SELECT id, channel, date, text, has_image, photo_path, source_file, loaded_at
FROM raw.telegram_messages
WHERE source_file = $1
ORDER BY id ASC",
	)
	.bind(source_file)
	.fetch_all(&db.pool)
	.await?;

	Ok(rows)
}

pub async fn count_raw_messages(db: &Db) -> Result<i64> {
	let count = sqlx::query_scalar("SELECT count(*) FROM raw.telegram_messages")
		.fetch_one(&db.pool)
		.await?;

	Ok(count)
}

pub async fn list_detections_for_image(db: &Db, image_path: &str) -> Result<Vec<ImageDetection>> {
	let rows = sqlx::query_as::<_, ImageDetection>(
		"\
SELECT
	detection_id,
	message_id,
	channel,
	image_path,
	detected_class,
	confidence,
	bbox_xyxy,
	model,
	detected_at
FROM enrichment.image_detections
WHERE image_path = $1
ORDER BY detection_id ASC",
	)
	.bind(image_path)
	.fetch_all(&db.pool)
	.await?;

	Ok(rows)
}

pub async fn count_detections(db: &Db) -> Result<i64> {
	let count = sqlx::query_scalar("SELECT count(*) FROM enrichment.image_detections")
		.fetch_one(&db.pool)
		.await?;

	Ok(count)
}
