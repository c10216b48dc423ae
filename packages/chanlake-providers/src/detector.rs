//! Client for an object-detection inference server.
//!
//! The server owns the model weights. `load` asks it to have the configured model ready and fails
//! when it cannot, so an unusable model is discovered once, before any image is processed.

use std::{path::Path, time::Duration};

use reqwest::{
	Client,
	header::{CONTENT_TYPE, HeaderMap, HeaderValue},
};
use serde_json::Value;

use chanlake_domain::detection::{BoundingBox, DetectedObject};

use crate::{Error, Result};

pub struct HttpDetector {
	client: Client,
	detect_url: String,
	model: String,
	headers: HeaderMap,
}
impl HttpDetector {
	pub async fn load(cfg: &chanlake_config::Detector) -> Result<Self> {
		let client = Client::builder().timeout(Duration::from_millis(cfg.timeout_ms)).build()?;
		let headers = crate::auth_headers(cfg.api_key.as_deref(), &cfg.default_headers)?;
		let health_url = format!("{}{}", cfg.api_base, cfg.health_path);

		client
			.get(health_url)
			.headers(headers.clone())
			.query(&[("model", cfg.model.as_str())])
			.send()
			.await?
			.error_for_status()?;

		Ok(Self {
			client,
			detect_url: format!("{}{}", cfg.api_base, cfg.detect_path),
			model: cfg.model.clone(),
			headers,
		})
	}

	pub fn model(&self) -> &str {
		&self.model
	}

	pub async fn detect(&self, image_path: &Path) -> Result<Vec<DetectedObject>> {
		let bytes = tokio::fs::read(image_path).await?;

		if bytes.is_empty() {
			return Err(Error::InvalidResponse {
				message: format!("Image {} is empty.", image_path.display()),
			});
		}

		let res = self
			.client
			.post(self.detect_url.as_str())
			.headers(self.headers.clone())
			.header(CONTENT_TYPE, HeaderValue::from_static("image/jpeg"))
			.query(&[("model", self.model.as_str())])
			.body(bytes)
			.send()
			.await?;
		let json: Value = res.error_for_status()?.json().await?;

		parse_detection_response(json)
	}
}

fn parse_detection_response(json: Value) -> Result<Vec<DetectedObject>> {
	let items = json
		.get("detections")
		.and_then(|v| v.as_array())
		.ok_or_else(|| invalid("Detection response is missing detections array."))?;
	let mut out = Vec::with_capacity(items.len());

	for item in items {
		let class_name = item
			.get("class_name")
			.or_else(|| item.get("class"))
			.and_then(|v| v.as_str())
			.ok_or_else(|| invalid("Detection item missing class_name."))?;
		let confidence = item
			.get("confidence")
			.and_then(|v| v.as_f64())
			.ok_or_else(|| invalid("Detection item missing numeric confidence."))?;
		let coords = item
			.get("bbox_xyxy")
			.and_then(|v| v.as_array())
			.ok_or_else(|| invalid("Detection item missing bbox_xyxy array."))?;

		if coords.len() != 4 {
			return Err(invalid(&format!(
				"Detection bbox_xyxy must have 4 elements, got {}.",
				coords.len()
			)));
		}

		let mut bbox = [0.0_f32; 4];

		for (slot, value) in bbox.iter_mut().zip(coords) {
			*slot = value.as_f64().ok_or_else(|| invalid("Detection bbox value must be numeric."))?
				as f32;
		}

		out.push(DetectedObject {
			class_name: class_name.to_string(),
			confidence: confidence as f32,
			bbox_xyxy: BoundingBox::from(bbox),
		});
	}

	Ok(out)
}

fn invalid(message: &str) -> Error {
	Error::InvalidResponse { message: message.to_string() }
}
