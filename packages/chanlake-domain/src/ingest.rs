//! Identity derived from the `raw_root/{date}/{channel}/...` layout.
//!
//! Batch files sit directly in the channel directory. Images sit one level deeper, in the
//! configured images directory, and are named after the message they belong to.

use std::path::{Path, PathBuf};

use time::Date;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathRejectCode {
	MissingChannel,
	NonUtf8Segment,
	MissingStem,
	InvalidMessageId,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestFile {
	pub path: PathBuf,
	pub channel: String,
	/// Set for images only.
	pub message_id: Option<i64>,
}
impl IngestFile {
	pub fn batch(path: &Path) -> Result<Self, PathRejectCode> {
		let channel = parent_name(path)?;

		Ok(Self { path: path.to_path_buf(), channel, message_id: None })
	}

	pub fn image(path: &Path, images_dir: &str) -> Result<Self, PathRejectCode> {
		let parent = path.parent().ok_or(PathRejectCode::MissingChannel)?;
		let in_images_dir = parent.file_name().and_then(|name| name.to_str()) == Some(images_dir);
		let channel = if in_images_dir { parent_name(parent)? } else { parent_name(path)? };
		let message_id = message_id_from_stem(path)?;

		Ok(Self { path: path.to_path_buf(), channel, message_id: Some(message_id) })
	}
}

pub fn message_id_from_stem(path: &Path) -> Result<i64, PathRejectCode> {
	let stem = path.file_stem().ok_or(PathRejectCode::MissingStem)?;
	let stem = stem.to_str().ok_or(PathRejectCode::NonUtf8Segment)?;

	stem.trim().parse::<i64>().map_err(|_| PathRejectCode::InvalidMessageId)
}

/// Directory a channel's scraper writes into for one logical date.
pub fn partition_dir(raw_root: &Path, date: Date, channel: &str) -> PathBuf {
	raw_root.join(date_segment(date)).join(channel)
}

/// `YYYY-MM-DD`, the name of a date partition.
pub fn date_segment(date: Date) -> String {
	format!("{:04}-{:02}-{:02}", date.year(), u8::from(date.month()), date.day())
}

fn parent_name(path: &Path) -> Result<String, PathRejectCode> {
	let name = path
		.parent()
		.and_then(Path::file_name)
		.ok_or(PathRejectCode::MissingChannel)?
		.to_str()
		.ok_or(PathRejectCode::NonUtf8Segment)?;

	if name.is_empty() {
		return Err(PathRejectCode::MissingChannel);
	}

	Ok(name.to_string())
}
