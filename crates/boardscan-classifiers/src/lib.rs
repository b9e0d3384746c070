//! BoardScan Classifiers
//!
//! PCB defect classification on CPU.
//!
//! The pieces, in the order an inspection uses them:
//! - Artifact sources serve a layers-model manifest and its weight shards
//!   over HTTP or from disk
//! - The loader fetches and builds the model once and shares the handle
//! - The preprocessor turns image bytes into a `[1, 224, 224, 3]` tensor
//! - The Candle-backed sequential network runs the forward pass
//! - Arg-max decoding maps the scores to a defect class

pub mod classifier;
pub mod config;
pub mod decode;
pub mod inspector;
pub mod manifest;
pub mod model_loader;
pub mod network;
pub mod preprocess;
pub mod source;
pub mod weights;

pub use classifier::DefectClassifier;
pub use config::{InspectorConfig, ModelSettings, PreprocessSettings, SourceSpec};
pub use decode::{arg_max, decode_scores};
pub use inspector::{BatchItem, DefectInspector, ImageInput};
pub use manifest::ModelManifest;
pub use model_loader::{ClassifierHandle, ModelLoader};
pub use network::{FeatureShape, SequentialNetwork};
pub use preprocess::{
    preprocess, preprocess_image, ImageTensor, ResizeFilter, INPUT_CHANNELS, INPUT_SHAPE,
    INPUT_SIZE, PIXEL_SCALE,
};
pub use source::{ArtifactSource, HttpSource, LocalSource};
pub use weights::WeightMap;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::classifier::DefectClassifier;
    pub use crate::config::InspectorConfig;
    pub use crate::inspector::{BatchItem, DefectInspector, ImageInput};
    pub use crate::model_loader::ModelLoader;
    pub use crate::preprocess::{preprocess, ImageTensor, ResizeFilter};
    pub use boardscan_core::prelude::*;
}
