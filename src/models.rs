use serde::{Serialize, Deserialize};
use serde_json::Value;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq)]
pub struct Dimensions {
    pub width: f64,
    pub height: f64,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ScoringCriterion {
    pub parameter: String,
    pub weight: f64,
}

/// A creative brief that has passed validation.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct CreativeRequest {
    pub product_name: String,
    pub tagline: String,
    pub brand_palette: Vec<String>,
    pub dimensions: Dimensions,
    pub cta_text: String,
    pub logo_url: String,
    pub product_image_url: String,
    #[serde(default)]
    pub target_audience: Option<String>,
    pub scoring_criteria: Vec<ScoringCriterion>, // nominally five, weights summing to 100
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub struct PixelDimensions {
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ImageMetadata {
    pub file_size_kb: String,
    pub dimensions: PixelDimensions,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ObservedScore {
    pub parameter: String,
    pub observed: f64,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Scoring {
    #[serde(rename = "completeScore")]
    pub complete_score: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub observed: Vec<ObservedScore>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct EvaluationResponse {
    pub status: String,
    pub creative_url: String,
    pub scoring: Scoring,
    pub metadata: ImageMetadata,
}

// --- Studio payloads ---

fn default_aspect_ratio() -> String { "1:1".into() }
fn default_png() -> String { "png".into() }

#[derive(Debug, Deserialize, Clone)]
pub struct GenerateImageRequest {
    #[serde(default)]
    pub prompt: Option<String>,
    #[serde(default)]
    pub negative_prompt: Option<String>,
    #[serde(default = "default_aspect_ratio")]
    pub aspect_ratio: String,
    /// Relayed as written; Stability judges its validity.
    #[serde(default)]
    pub seed: Option<Value>,
    #[serde(default)]
    pub style_preset: Option<String>,
    #[serde(default = "default_png")]
    pub output_format: String,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct UpscaleRequest {
    #[serde(default)]
    pub generation_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct StudioSuccess {
    pub success: bool,
    pub file: String,
}
