use serde_json::Value;
use time::OffsetDateTime;

#[derive(Debug, sqlx::FromRow)]
pub struct StoredMessage {
	pub id: i64,
	pub channel: String,
	pub date: OffsetDateTime,
	pub text: Option<String>,
	pub has_image: bool,
	pub photo_path: Option<String>,
	pub source_file: String,
	pub loaded_at: OffsetDateTime,
}

#[derive(Debug, sqlx::FromRow)]
pub struct ImageDetection {
	pub detection_id: i64,
	pub message_id: i64,
	pub channel: String,
	pub image_path: String,
	pub detected_class: String,
	pub confidence: f32,
	pub bbox_xyxy: Value,
	pub model: String,
	pub detected_at: OffsetDateTime,
}

#[derive(Debug)]
pub struct NewDetection<'a> {
	pub message_id: i64,
	pub channel: &'a str,
	pub image_path: &'a str,
	pub detected_class: &'a str,
	pub confidence: f32,
	pub bbox_xyxy: [f32; 4],
	pub model: &'a str,
}
