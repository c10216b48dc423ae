use serde::{Deserialize, Serialize};

/// Absolute pixel coordinates, `[x_min, y_min, x_max, y_max]` once serialized.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f32; 4]", into = "[f32; 4]")]
pub struct BoundingBox {
	pub x_min: f32,
	pub y_min: f32,
	pub x_max: f32,
	pub y_max: f32,
}
impl BoundingBox {
	pub fn is_finite(&self) -> bool {
		self.to_array().iter().all(|value| value.is_finite())
	}

	/// Orders each axis and clamps coordinates at zero.
	pub fn normalized(&self) -> Self {
		let (x_min, x_max) = ordered(self.x_min, self.x_max);
		let (y_min, y_max) = ordered(self.y_min, self.y_max);

		Self {
			x_min: x_min.max(0.0),
			y_min: y_min.max(0.0),
			x_max: x_max.max(0.0),
			y_max: y_max.max(0.0),
		}
	}

	pub fn to_array(&self) -> [f32; 4] {
		[self.x_min, self.y_min, self.x_max, self.y_max]
	}
}
impl From<[f32; 4]> for BoundingBox {
	fn from(value: [f32; 4]) -> Self {
		Self { x_min: value[0], y_min: value[1], x_max: value[2], y_max: value[3] }
	}
}
impl From<BoundingBox> for [f32; 4] {
	fn from(value: BoundingBox) -> Self {
		value.to_array()
	}
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectedObject {
	pub class_name: String,
	pub confidence: f32,
	pub bbox_xyxy: BoundingBox,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectionRejectCode {
	NonFiniteConfidence,
	NonFiniteBox,
	EmptyClass,
	BelowThreshold,
}

/// Brings a raw model output into the stored invariants: confidence in `[0, 1]` and a box with
/// `x_min <= x_max` and `y_min <= y_max`.
pub fn sanitize(
	object: DetectedObject,
	min_confidence: f32,
) -> Result<DetectedObject, DetectionRejectCode> {
	if !object.confidence.is_finite() {
		return Err(DetectionRejectCode::NonFiniteConfidence);
	}
	if !object.bbox_xyxy.is_finite() {
		return Err(DetectionRejectCode::NonFiniteBox);
	}

	let class_name = object.class_name.trim();

	if class_name.is_empty() {
		return Err(DetectionRejectCode::EmptyClass);
	}

	let confidence = object.confidence.clamp(0.0, 1.0);

	if confidence < min_confidence {
		return Err(DetectionRejectCode::BelowThreshold);
	}

	Ok(DetectedObject {
		class_name: class_name.to_string(),
		confidence,
		bbox_xyxy: object.bbox_xyxy.normalized(),
	})
}

fn ordered(a: f32, b: f32) -> (f32, f32) {
	if a <= b { (a, b) } else { (b, a) }
}
