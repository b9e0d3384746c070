//! BoardScan Core
//!
//! Core types and utilities shared across BoardScan components.
//!
//! This crate provides:
//! - The fixed PCB defect label set and prediction types
//! - Error types and result handling
//! - Inspection metrics

pub mod error;
pub mod metrics;
pub mod types;

pub use error::{Error, Result};
pub use metrics::{InspectionMetrics, MetricsSnapshot};
pub use types::{ClassScore, DefectClass, Prediction, DEFECT_CLASSES};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::error::{Error, Result};
    pub use crate::types::{DefectClass, Prediction, DEFECT_CLASSES};
}
