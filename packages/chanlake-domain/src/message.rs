use serde::{Deserialize, Deserializer};
use time::{
	OffsetDateTime, PrimitiveDateTime, format_description::well_known::Rfc3339,
	macros::format_description,
};

/// One message object as the scraper writes it.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct BatchMessage {
	pub id: i64,
	#[serde(deserialize_with = "deserialize_timestamp")]
	pub date: OffsetDateTime,
	#[serde(default)]
	pub text: Option<String>,
	pub has_image: bool,
	#[serde(default)]
	pub photo_path: Option<String>,
}

/// A row of the raw layer. Identity is `(id, channel)`.
#[derive(Debug, Clone, PartialEq)]
pub struct RawMessage {
	pub id: i64,
	pub channel: String,
	pub timestamp: OffsetDateTime,
	pub text: Option<String>,
	pub has_image: bool,
	pub photo_path: Option<String>,
	pub source_file: String,
}
impl RawMessage {
	pub fn from_batch(message: BatchMessage, channel: &str, source_file: &str) -> Self {
		Self {
			id: message.id,
			channel: channel.to_string(),
			timestamp: message.date,
			text: message.text,
			has_image: message.has_image,
			photo_path: message.photo_path,
			source_file: source_file.to_string(),
		}
	}
}

pub fn parse_batch(raw: &[u8]) -> serde_json::Result<Vec<BatchMessage>> {
	serde_json::from_slice(raw)
}

/// Accepts RFC 3339 and offset-less ISO 8601 timestamps; the latter are taken as UTC.
pub fn parse_timestamp(raw: &str) -> Result<OffsetDateTime, time::error::Parse> {
	let raw = raw.trim();

	match OffsetDateTime::parse(raw, &Rfc3339) {
		Ok(ts) => Ok(ts),
		Err(rfc_err) => {
			let naive = format_description!(
				"[year]-[month]-[day]T[hour]:[minute]:[second][optional [.[subsecond]]]"
			);
			let normalized = raw.replacen(' ', "T", 1);

			PrimitiveDateTime::parse(&normalized, naive)
				.map(PrimitiveDateTime::assume_utc)
				.map_err(|_| rfc_err)
		},
	}
}

fn deserialize_timestamp<'de, D>(deserializer: D) -> Result<OffsetDateTime, D::Error>
where
	D: Deserializer<'de>,
{
	let raw = String::deserialize(deserializer)?;

	parse_timestamp(&raw).map_err(serde::de::Error::custom)
}
