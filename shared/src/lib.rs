use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct HealthResponse {
    pub ok: bool,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct IngestResponse {
    pub asset_id: String,
    pub asset_type: String,
    pub path: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct DetectRequest {
    pub asset_id: Option<String>,
}

/// One predicted object. `bbox` is `[x1, y1, x2, y2]` in source pixels.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Detection {
    pub label: String,
    pub score: f64,
    pub bbox: [i32; 4],
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Artifacts {
    pub annotated_image_path: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct DetectResponse {
    pub asset_id: String,
    pub detections: Vec<Detection>,
    pub model: String,
    pub latency_ms: u64,
    pub artifacts: Artifacts,
}

/// Introspection payload for `/detect/debug`. Box columns are plain nested arrays.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct DebugDetectResponse {
    pub asset_id: String,
    #[serde(rename = "type")]
    pub result_type: String,
    pub orig_shape: Option<Vec<u32>>,
    pub names_sample: Option<BTreeMap<u32, String>>,
    pub has_boxes: bool,
    pub boxes_type: Option<String>,
    pub num_boxes: usize,
    pub boxes_xyxy: Vec<Vec<f32>>,
    pub boxes_conf: Vec<f32>,
    pub boxes_cls: Vec<f32>,
    pub latency_ms: u64,
    pub model: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct AskRequest {
    pub asset_id: Option<String>,
    pub question: Option<String>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct AskResponse {
    pub answer: String,
    pub evidence: Vec<String>,
    pub mode: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ErrorResponse {
    pub detail: String,
}
