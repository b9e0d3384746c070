//! Classifier trait and common types

use crate::preprocess::{ImageTensor, INPUT_SHAPE};
use async_trait::async_trait;
use boardscan_core::{DefectClass, Result};

/// A ready-to-run PCB defect classifier
#[async_trait]
pub trait DefectClassifier: Send + Sync {
    /// Run a forward pass. Returns one score per defect class, in label-set
    /// order. The output buffer is owned by the caller.
    async fn forward(&self, input: &ImageTensor) -> Result<Vec<f32>>;

    /// Get the classifier name
    fn name(&self) -> &str;

    /// Input shape the classifier expects (NHWC)
    fn input_shape(&self) -> [usize; 4] {
        INPUT_SHAPE
    }

    /// Length of the output vector
    fn output_len(&self) -> usize {
        DefectClass::COUNT
    }

    /// One line per layer, for diagnostics
    fn summary(&self) -> Vec<String> {
        Vec::new()
    }
}
