pub mod generator;

pub use generator::{generate, unavailable};

use serde::{Deserialize, Serialize};

use crate::inference::{WeightsSource, CLASS_COUNT};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum StatusTier {
    Normal,
    Suspect,
    Concerning,
    Unknown,
}

impl StatusTier {
    pub fn from_class(class: usize) -> Self {
        match class {
            0 => StatusTier::Normal,
            1 => StatusTier::Suspect,
            2 => StatusTier::Concerning,
            _ => StatusTier::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            StatusTier::Normal => "Normal",
            StatusTier::Suspect => "Suspect",
            StatusTier::Concerning => "Concerning",
            StatusTier::Unknown => "Unknown",
        }
    }

    pub fn emoji(&self) -> &'static str {
        match self {
            StatusTier::Normal => "✅",
            StatusTier::Suspect => "⚠️",
            StatusTier::Concerning => "🚨",
            StatusTier::Unknown => "❔",
        }
    }
}

/// One explainable assessment. Built per inference call and never mutated.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AssessmentResult {
    /// `None` when no prediction could be made.
    pub predicted_class: Option<usize>,
    pub confidence: f32,
    pub status_tier: StatusTier,
    pub message: String,
    pub recommendation: String,
    pub kicks_per_hour: f64,
    /// Set when the result came from the classifier.
    pub weights_source: Option<WeightsSource>,
    pub probabilities: Option<[f32; CLASS_COUNT]>,
}

impl AssessmentResult {
    pub fn with_model_output(
        mut self,
        weights_source: WeightsSource,
        probabilities: [f32; CLASS_COUNT],
    ) -> Self {
        self.weights_source = Some(weights_source);
        self.probabilities = Some(probabilities);
        self
    }

    /// True only for predictions made with pretrained weights.
    pub fn is_clinical(&self) -> bool {
        self.predicted_class.is_some() && self.weights_source == Some(WeightsSource::Pretrained)
    }
}
