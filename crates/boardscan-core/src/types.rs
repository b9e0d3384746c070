//! Core types for BoardScan

use serde::{Deserialize, Serialize};
use std::fmt;

/// PCB defect category predicted by the classifier.
///
/// Variant order matches the position of each class in the classifier's
/// output vector and must not change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DefectClass {
    #[serde(rename = "Missing_hole")]
    MissingHole,
    #[serde(rename = "Mouse_bite")]
    MouseBite,
    #[serde(rename = "Open_circuit")]
    OpenCircuit,
    #[serde(rename = "Short")]
    Short,
    #[serde(rename = "Spur")]
    Spur,
    #[serde(rename = "Spurious_copper")]
    SpuriousCopper,
}

/// The fixed label set, index-aligned with the classifier output.
pub const DEFECT_CLASSES: [DefectClass; 6] = [
    DefectClass::MissingHole,
    DefectClass::MouseBite,
    DefectClass::OpenCircuit,
    DefectClass::Short,
    DefectClass::Spur,
    DefectClass::SpuriousCopper,
];

impl DefectClass {
    /// Number of classes the classifier must output
    pub const COUNT: usize = DEFECT_CLASSES.len();

    /// Class at the given output index
    pub fn from_index(index: usize) -> Option<Self> {
        DEFECT_CLASSES.get(index).copied()
    }

    /// Position of this class in the output vector
    pub fn index(self) -> usize {
        self as usize
    }

    /// Label identifier as used by the training set
    pub fn as_str(self) -> &'static str {
        match self {
            Self::MissingHole => "Missing_hole",
            Self::MouseBite => "Mouse_bite",
            Self::OpenCircuit => "Open_circuit",
            Self::Short => "Short",
            Self::Spur => "Spur",
            Self::SpuriousCopper => "Spurious_copper",
        }
    }

    /// Human-readable label ("Missing hole")
    pub fn display_name(self) -> String {
        self.as_str().replace('_', " ")
    }
}

impl fmt::Display for DefectClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Score for a single class
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClassScore {
    pub label: DefectClass,
    pub score: f32,
}

/// Result of classifying one image
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    /// Winning class
    #[serde(rename = "prediction")]
    pub label: DefectClass,

    /// Raw classifier score of the winning class (0.0-1.0 for softmax heads)
    pub confidence: f32,

    /// All class scores, in label-set order
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub scores: Vec<ClassScore>,

    /// Latency in microseconds
    #[serde(default)]
    pub latency_us: u64,
}

impl Prediction {
    /// Create a new prediction
    pub fn new(label: DefectClass, confidence: f32) -> Self {
        Self {
            label,
            confidence,
            scores: Vec::new(),
            latency_us: 0,
        }
    }

    /// Attach the full score vector
    pub fn with_scores(mut self, scores: &[f32]) -> Self {
        self.scores = DEFECT_CLASSES
            .iter()
            .zip(scores)
            .map(|(&label, &score)| ClassScore { label, score })
            .collect();
        self
    }

    /// Check if confidence exceeds threshold
    pub fn exceeds_threshold(&self, threshold: f32) -> bool {
        self.confidence >= threshold
    }
}
