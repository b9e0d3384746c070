//! Shared fixtures for integration tests
//!
//! An in-memory artifact source with call counters, a tiny colour model
//! that runs on real inputs, and a fake classifier with fixed scores.

#![allow(dead_code)]

use async_trait::async_trait;
use boardscan_classifiers::{ArtifactSource, DefectClassifier, ImageTensor};
use boardscan_core::{Error, Result};
use bytes::Bytes;
use image::{ImageFormat, Rgb, RgbImage};
use serde_json::json;
use std::collections::HashMap;
use std::io::Cursor;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

pub const SHARD_PATH: &str = "group1-shard1of1.bin";

/// Artifact source backed by in-memory bytes
pub struct MemorySource {
    manifest: Bytes,
    shards: HashMap<String, Bytes>,
    reachable: bool,
    latency: Option<Duration>,
    probe_calls: AtomicU32,
    manifest_calls: AtomicU32,
    shard_calls: AtomicU32,
}

impl MemorySource {
    pub fn new(manifest: Vec<u8>, shards: Vec<(&str, Vec<u8>)>) -> Self {
        Self {
            manifest: Bytes::from(manifest),
            shards: shards
                .into_iter()
                .map(|(path, bytes)| (path.to_string(), Bytes::from(bytes)))
                .collect(),
            reachable: true,
            latency: None,
            probe_calls: AtomicU32::new(0),
            manifest_calls: AtomicU32::new(0),
            shard_calls: AtomicU32::new(0),
        }
    }

    /// A source whose every request fails as if the host were down
    pub fn unreachable() -> Self {
        let mut source = Self::new(Vec::new(), Vec::new());
        source.reachable = false;
        source
    }

    /// Delay every request so concurrent callers overlap
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub fn probe_calls(&self) -> u32 {
        self.probe_calls.load(Ordering::SeqCst)
    }

    pub fn manifest_calls(&self) -> u32 {
        self.manifest_calls.load(Ordering::SeqCst)
    }

    pub fn shard_calls(&self) -> u32 {
        self.shard_calls.load(Ordering::SeqCst)
    }

    async fn respond(&self) -> Result<()> {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        if self.reachable {
            Ok(())
        } else {
            Err(Error::model_unavailable("GET memory://model.json failed: connection refused"))
        }
    }
}

#[async_trait]
impl ArtifactSource for MemorySource {
    fn location(&self) -> String {
        "memory://model.json".to_string()
    }

    async fn probe(&self) -> Result<()> {
        self.probe_calls.fetch_add(1, Ordering::SeqCst);
        self.respond().await
    }

    async fn fetch_manifest(&self) -> Result<Bytes> {
        self.manifest_calls.fetch_add(1, Ordering::SeqCst);
        self.respond().await?;
        Ok(self.manifest.clone())
    }

    async fn fetch_shard(&self, path: &str) -> Result<Bytes> {
        self.shard_calls.fetch_add(1, Ordering::SeqCst);
        self.respond().await?;
        self.shards
            .get(path)
            .cloned()
            .ok_or_else(|| Error::model_unavailable(format!("No shard {}", path)))
    }
}

fn f32_bytes(values: &[f32]) -> Vec<u8> {
    values.iter().flat_map(|v| v.to_le_bytes()).collect()
}

fn manifest(layers: serde_json::Value, weights: serde_json::Value) -> Vec<u8> {
    serde_json::to_vec(&json!({
        "format": "layers-model",
        "generatedBy": "keras v2.12.0",
        "convertedBy": "TensorFlow.js Converter v4.4.0",
        "modelTopology": {
            "class_name": "Sequential",
            "config": {"name": "pcb_defects", "layers": layers}
        },
        "weightsManifest": [{"paths": [SHARD_PATH], "weights": weights}]
    }))
    .unwrap()
}

/// Global average pooling followed by a 3 -> `units` softmax head. Red
/// drives class 0, green class 2 and blue class 4.
pub fn colour_model_with_units(units: usize) -> (Vec<u8>, Vec<u8>) {
    let layers = json!([
        {"class_name": "InputLayer", "config": {"name": "input", "batch_input_shape": [null, 224, 224, 3]}},
        {"class_name": "GlobalAveragePooling2D", "config": {"name": "gap"}},
        {"class_name": "Dropout", "config": {"name": "dropout", "rate": 0.2}},
        {"class_name": "Dense", "config": {"name": "head", "units": units, "activation": "softmax"}}
    ]);
    let weights = json!([
        {"name": "head/kernel", "shape": [3, units], "dtype": "float32"},
        {"name": "head/bias", "shape": [units], "dtype": "float32"}
    ]);

    let mut kernel = vec![0.0f32; 3 * units];
    for (channel, class) in [(0, 0), (1, 2), (2, 4)] {
        if class < units {
            kernel[channel * units + class] = 4.0;
        }
    }
    let mut values = kernel;
    values.extend(vec![0.0f32; units]);
    (manifest(layers, weights), f32_bytes(&values))
}

/// Six-class colour model served from memory
pub fn colour_source() -> MemorySource {
    let (manifest, shard) = colour_model_with_units(6);
    MemorySource::new(manifest, vec![(SHARD_PATH, shard)])
}

/// Encode a solid-colour PNG
pub fn solid_png(width: u32, height: u32, rgb: [u8; 3]) -> Vec<u8> {
    let mut buf = Vec::new();
    RgbImage::from_pixel(width, height, Rgb(rgb))
        .write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
        .unwrap();
    buf
}

/// Bytes that no image decoder accepts
pub fn not_an_image() -> Vec<u8> {
    b"%PDF-1.4 this is a datasheet, not a board photo".to_vec()
}

/// Classifier that returns the same scores for every input
pub struct FixedClassifier {
    scores: Vec<f32>,
    calls: AtomicU32,
}

impl FixedClassifier {
    pub fn new(scores: Vec<f32>) -> Self {
        Self {
            scores,
            calls: AtomicU32::new(0),
        }
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DefectClassifier for FixedClassifier {
    async fn forward(&self, _input: &ImageTensor) -> Result<Vec<f32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.scores.clone())
    }

    fn name(&self) -> &str {
        "fixed"
    }
}
