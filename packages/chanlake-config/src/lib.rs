mod error;
mod types;

pub use error::{Error, Result};
pub use types::{Config, Detector, Postgres, Schedule, Scrape, Service, Sources, Storage, Transform};

use std::{collections::HashSet, fs, path::Path};

pub fn load(path: &Path) -> Result<Config> {
	let raw = fs::read_to_string(path)
		.map_err(|err| Error::ReadConfig { path: path.to_path_buf(), source: err })?;

	let mut cfg: Config = toml::from_str(&raw)
		.map_err(|err| Error::ParseConfig { path: path.to_path_buf(), source: err })?;

	normalize(&mut cfg);

	validate(&cfg)?;

	Ok(cfg)
}

pub fn validate(cfg: &Config) -> Result<()> {
	if cfg.storage.postgres.dsn.trim().is_empty() {
		return Err(Error::Validation {
			message: "storage.postgres.dsn must be non-empty.".to_string(),
		});
	}
	if cfg.storage.postgres.pool_max_conns == 0 {
		return Err(Error::Validation {
			message: "storage.postgres.pool_max_conns must be greater than zero.".to_string(),
		});
	}
	if cfg.storage.postgres.acquire_timeout_ms == 0 {
		return Err(Error::Validation {
			message: "storage.postgres.acquire_timeout_ms must be greater than zero.".to_string(),
		});
	}
	if cfg.sources.raw_root.as_os_str().is_empty() {
		return Err(Error::Validation {
			message: "sources.raw_root must be non-empty.".to_string(),
		});
	}
	if cfg.sources.channels.is_empty() {
		return Err(Error::Validation {
			message: "sources.channels must be non-empty.".to_string(),
		});
	}

	let mut seen = HashSet::new();

	for channel in &cfg.sources.channels {
		if channel.trim().is_empty() {
			return Err(Error::Validation {
				message: "sources.channels entries must be non-empty.".to_string(),
			});
		}
		if channel.contains(['/', '\\']) || channel == "." || channel == ".." {
			return Err(Error::Validation {
				message: format!(
					"sources.channels entry {channel:?} must be a single path segment."
				),
			});
		}
		if !seen.insert(channel.as_str()) {
			return Err(Error::Validation {
				message: format!("sources.channels entry {channel:?} is listed more than once."),
			});
		}
	}

	for (label, value) in [
		("sources.message_pattern", &cfg.sources.message_pattern),
		("sources.image_pattern", &cfg.sources.image_pattern),
		("sources.images_dir", &cfg.sources.images_dir),
		("detector.api_base", &cfg.detector.api_base),
		("detector.model", &cfg.detector.model),
		("schedule.cron", &cfg.schedule.cron),
	] {
		if value.trim().is_empty() {
			return Err(Error::Validation { message: format!("{label} must be non-empty.") });
		}
	}

	if cfg.scrape.enabled && cfg.scrape.command.is_empty() {
		return Err(Error::Validation {
			message: "scrape.command must be non-empty when scrape.enabled is true.".to_string(),
		});
	}
	if cfg.scrape.message_limit == 0 {
		return Err(Error::Validation {
			message: "scrape.message_limit must be greater than zero.".to_string(),
		});
	}
	if cfg.transform.command.is_empty() {
		return Err(Error::Validation {
			message: "transform.command must be non-empty.".to_string(),
		});
	}
	if let Some(timeout_ms) = cfg.transform.timeout_ms
		&& timeout_ms == 0
	{
		return Err(Error::Validation {
			message: "transform.timeout_ms must be greater than zero.".to_string(),
		});
	}
	if cfg.detector.timeout_ms == 0 {
		return Err(Error::Validation {
			message: "detector.timeout_ms must be greater than zero.".to_string(),
		});
	}
	if !cfg.detector.min_confidence.is_finite() {
		return Err(Error::Validation {
			message: "detector.min_confidence must be a finite number.".to_string(),
		});
	}
	if !(0.0..=1.0).contains(&cfg.detector.min_confidence) {
		return Err(Error::Validation {
			message: "detector.min_confidence must be in the range 0.0-1.0.".to_string(),
		});
	}

	for value in cfg.detector.default_headers.values() {
		if !value.is_string() {
			return Err(Error::Validation {
				message: "detector.default_headers values must be strings.".to_string(),
			});
		}
	}

	Ok(())
}

fn normalize(cfg: &mut Config) {
	if cfg.detector.api_key.as_deref().map(|key| key.trim().is_empty()).unwrap_or(false) {
		cfg.detector.api_key = None;
	}

	cfg.detector.api_base = cfg.detector.api_base.trim_end_matches('/').to_string();
}
