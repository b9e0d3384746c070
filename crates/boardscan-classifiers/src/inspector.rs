//! Defect inspection pipeline
//!
//! Probe the model, decode the image, load the model, run the forward pass,
//! decode the arg-max. Each stage fails with its own error kind so callers
//! can tell a missing model from a bad upload.

use crate::config::InspectorConfig;
use crate::decode::decode_scores;
use crate::model_loader::{ClassifierHandle, ModelLoader};
use crate::preprocess::{preprocess, ResizeFilter};
use boardscan_core::{Error, InspectionMetrics, Prediction, Result};
use bytes::Bytes;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

/// One image submitted for inspection
#[derive(Debug, Clone)]
pub struct ImageInput {
    pub name: String,
    pub bytes: Bytes,
}

impl ImageInput {
    pub fn new(name: impl Into<String>, bytes: impl Into<Bytes>) -> Self {
        Self {
            name: name.into(),
            bytes: bytes.into(),
        }
    }
}

/// Outcome for one image of a batch
#[derive(Debug)]
pub struct BatchItem {
    pub name: String,
    pub outcome: Result<Prediction>,
}

/// Classifies PCB images with a lazily loaded model
pub struct DefectInspector {
    loader: Arc<ModelLoader>,
    filter: ResizeFilter,
    metrics: InspectionMetrics,
}

impl DefectInspector {
    /// Create an inspector over an existing loader
    pub fn new(loader: Arc<ModelLoader>) -> Self {
        Self {
            loader,
            filter: ResizeFilter::default(),
            metrics: InspectionMetrics::new(),
        }
    }

    /// Build the source, loader and inspector described by `config`.
    /// Nothing is fetched yet.
    pub fn from_config(config: &InspectorConfig) -> Result<Self> {
        let metrics = InspectionMetrics::new();
        let source = config.model.build_source()?;
        let loader = ModelLoader::new(source).with_metrics(metrics.clone());

        Ok(Self {
            loader: Arc::new(loader),
            filter: config.preprocess.filter,
            metrics,
        })
    }

    /// Use a different resize filter
    pub fn with_filter(mut self, filter: ResizeFilter) -> Self {
        self.filter = filter;
        self
    }

    /// Record into a shared metrics collector
    pub fn with_metrics(mut self, metrics: InspectionMetrics) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn loader(&self) -> &Arc<ModelLoader> {
        &self.loader
    }

    pub fn filter(&self) -> ResizeFilter {
        self.filter
    }

    pub fn metrics(&self) -> &InspectionMetrics {
        &self.metrics
    }

    /// Load the model now instead of on first prediction. Idempotent.
    pub async fn load_model(&self) -> Result<ClassifierHandle> {
        self.loader.ensure_loaded().await
    }

    /// Classify one image
    pub async fn predict_defect(&self, bytes: &[u8]) -> Result<Prediction> {
        let start = Instant::now();
        match self.run(bytes).await {
            Ok(mut prediction) => {
                prediction.latency_us = start.elapsed().as_micros() as u64;
                self.metrics.record_prediction(prediction.latency_us);
                debug!(
                    "Predicted {} ({:.3}) in {}us",
                    prediction.label, prediction.confidence, prediction.latency_us
                );
                Ok(prediction)
            }
            Err(e) => {
                self.metrics.record_failure(&e);
                Err(e)
            }
        }
    }

    async fn run(&self, bytes: &[u8]) -> Result<Prediction> {
        if !self.loader.is_loaded() {
            self.loader.probe().await?;
        }

        let input = preprocess(bytes, self.filter)?;
        let classifier = self.loader.ensure_loaded().await?;

        let scores = classifier.forward(&input).await.map_err(|e| match e {
            Error::Inference(_) => e,
            other => Error::inference(other.to_string()),
        })?;
        drop(input);

        decode_scores(&scores)
    }

    /// Classify images one after another, in submission order. A failure
    /// is recorded for its item and the batch continues.
    pub async fn inspect_batch(&self, inputs: Vec<ImageInput>) -> Vec<BatchItem> {
        let mut results = Vec::with_capacity(inputs.len());
        for input in inputs {
            let outcome = self.predict_defect(&input.bytes).await;
            if let Err(e) = &outcome {
                warn!("Inspection of {} failed: {}", input.name, e);
            }
            results.push(BatchItem {
                name: input.name,
                outcome,
            });
        }
        results
    }

    /// Read files and inspect them as a batch. Unreadable files fail with
    /// `Io` for their item only.
    pub async fn inspect_paths(&self, paths: &[PathBuf]) -> Vec<BatchItem> {
        let mut results = Vec::with_capacity(paths.len());
        for path in paths {
            let name = path.display().to_string();
            let outcome = match tokio::fs::read(path).await {
                Ok(bytes) => self.predict_defect(&bytes).await,
                Err(e) => {
                    let e = Error::from(e);
                    self.metrics.record_failure(&e);
                    Err(e)
                }
            };
            if let Err(e) = &outcome {
                warn!("Inspection of {} failed: {}", name, e);
            }
            results.push(BatchItem { name, outcome });
        }
        results
    }
}
