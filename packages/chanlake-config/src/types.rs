use std::path::PathBuf;

use serde::Deserialize;
use serde_json::{Map, Value};

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
	pub service: Service,
	pub storage: Storage,
	pub sources: Sources,
	pub scrape: Scrape,
	#[serde(default)]
	pub transform: Transform,
	pub detector: Detector,
	#[serde(default)]
	pub schedule: Schedule,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Service {
	pub log_level: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Storage {
	pub postgres: Postgres,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Postgres {
	pub dsn: String,
	pub pool_max_conns: u32,
	/// Upper bound on waiting for a connection, including the first connect.
	#[serde(default = "default_acquire_timeout_ms")]
	pub acquire_timeout_ms: u64,
}

/// Where scraped artifacts live and how they are discovered.
///
/// The tree under `raw_root` is partitioned as `{date}/{channel}/...`; both patterns are matched
/// against paths relative to `raw_root`.
#[derive(Debug, Clone, Deserialize)]
pub struct Sources {
	pub raw_root: PathBuf,
	/// Scraped in this order.
	pub channels: Vec<String>,
	#[serde(default = "default_message_pattern")]
	pub message_pattern: String,
	#[serde(default = "default_image_pattern")]
	pub image_pattern: String,
	#[serde(default = "default_images_dir")]
	pub images_dir: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Scrape {
	#[serde(default = "default_true")]
	pub enabled: bool,
	/// Program and arguments. `{channel}`, `{output_dir}` and `{limit}` are substituted per
	/// channel.
	#[serde(default)]
	pub command: Vec<String>,
	#[serde(default = "default_message_limit")]
	pub message_limit: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Transform {
	pub command: Vec<String>,
	pub working_dir: PathBuf,
	pub timeout_ms: Option<u64>,
}
impl Default for Transform {
	fn default() -> Self {
		Self {
			command: vec!["dbt".to_string(), "run".to_string()],
			working_dir: PathBuf::from("medical_data_dbt"),
			timeout_ms: None,
		}
	}
}

#[derive(Debug, Clone, Deserialize)]
pub struct Detector {
	pub api_base: String,
	#[serde(default = "default_detect_path")]
	pub detect_path: String,
	#[serde(default = "default_health_path")]
	pub health_path: String,
	pub model: String,
	pub api_key: Option<String>,
	pub timeout_ms: u64,
	#[serde(default)]
	pub min_confidence: f32,
	#[serde(default)]
	pub default_headers: Map<String, Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Schedule {
	/// Six fields, seconds first.
	pub cron: String,
}
impl Default for Schedule {
	fn default() -> Self {
		Self { cron: "0 0 0 * * *".to_string() }
	}
}

fn default_acquire_timeout_ms() -> u64 {
	5_000
}

fn default_message_pattern() -> String {
	"*/*/*.json".to_string()
}

fn default_image_pattern() -> String {
	"*/*/images/*.jpg".to_string()
}

fn default_images_dir() -> String {
	"images".to_string()
}

fn default_true() -> bool {
	true
}

fn default_message_limit() -> u32 {
	100
}

fn default_detect_path() -> String {
	"/v1/detect".to_string()
}

fn default_health_path() -> String {
	"/health".to_string()
}
