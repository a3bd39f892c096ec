use serde::{Deserialize, Serialize};
use strum_macros::Display;

/// One class of the classifier with its probability for a single image.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ClassProbability {
    pub label: String,
    pub probability: f32,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct PredictionResponse {
    pub label: String,
    pub class_index: usize,
    pub confidence: f32,
    /// Confidence as a percentage rounded to two decimals.
    pub confidence_percent: f64,
    pub probabilities: Vec<ClassProbability>,
    pub image_url: String,
    pub file_name: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ErrorResponse {
    pub error: String,
}

/// Per-class sample counts shown on the performance page.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ClassDistribution {
    pub labels: Vec<String>,
    pub values: Vec<u32>,
}

impl ClassDistribution {
    pub fn total(&self) -> u32 {
        self.values.iter().sum()
    }
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Display)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum FlashLevel {
    Success,
    Info,
    Error,
}

pub fn round_percent(confidence: f32) -> f64 {
    (confidence as f64 * 100.0 * 100.0).round() / 100.0
}
