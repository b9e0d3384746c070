//! Single-flight model loading
//!
//! The artifact is fetched and parsed at most once per loader. Callers that
//! arrive while a load is in flight attach to the same shared future and
//! observe the same handle or the same failure. A failed load returns the
//! loader to `Unloaded` so a later call can try again; a loaded handle is
//! never replaced.

use crate::classifier::DefectClassifier;
use crate::manifest::ModelManifest;
use crate::network::SequentialNetwork;
use crate::source::ArtifactSource;
use crate::weights::WeightMap;
use boardscan_core::{Error, InspectionMetrics, Result};
use candle_core::Device;
use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Shared handle to a ready-to-run classifier
pub type ClassifierHandle = Arc<dyn DefectClassifier>;

type LoadOutcome = std::result::Result<ClassifierHandle, String>;
type LoadFuture = Shared<BoxFuture<'static, LoadOutcome>>;

enum LoadState {
    Unloaded,
    Loading { attempt: u64, future: LoadFuture },
    Loaded(ClassifierHandle),
}

/// Owns the classifier handle and coordinates loading it
pub struct ModelLoader {
    source: Option<Arc<dyn ArtifactSource>>,
    state: Mutex<LoadState>,
    attempts: AtomicU64,
    /// Set by a successful [`ModelLoader::probe`]; the next load skips its own
    probed: AtomicBool,
    metrics: InspectionMetrics,
}

impl ModelLoader {
    /// Create a loader for the given artifact source. Nothing is fetched
    /// until the first call to [`ModelLoader::ensure_loaded`].
    pub fn new(source: Arc<dyn ArtifactSource>) -> Self {
        Self {
            source: Some(source),
            state: Mutex::new(LoadState::Unloaded),
            attempts: AtomicU64::new(0),
            probed: AtomicBool::new(false),
            metrics: InspectionMetrics::new(),
        }
    }

    /// Create a loader that already holds a classifier (e.g. a fake in tests)
    pub fn preloaded(classifier: ClassifierHandle) -> Self {
        Self {
            source: None,
            state: Mutex::new(LoadState::Loaded(classifier)),
            attempts: AtomicU64::new(0),
            probed: AtomicBool::new(false),
            metrics: InspectionMetrics::new(),
        }
    }

    /// Report model loads to the given metrics collector
    pub fn with_metrics(mut self, metrics: InspectionMetrics) -> Self {
        self.metrics = metrics;
        self
    }

    /// Whether the handle is available without I/O
    pub fn is_loaded(&self) -> bool {
        matches!(*self.state.lock(), LoadState::Loaded(_))
    }

    /// Number of load attempts started so far
    pub fn load_attempts(&self) -> u64 {
        self.attempts.load(Ordering::Relaxed)
    }

    /// Location of the artifact, if the loader has a source
    pub fn location(&self) -> Option<String> {
        self.source.as_ref().map(|s| s.location())
    }

    /// Existence check of the manifest. Succeeds without I/O once loaded or
    /// while a load is in flight, since that load reports its own outcome.
    pub async fn probe(&self) -> Result<()> {
        if !matches!(*self.state.lock(), LoadState::Unloaded) {
            return Ok(());
        }
        let source = self
            .source
            .as_ref()
            .ok_or_else(|| Error::model_unavailable("No model source configured"))?;
        source.probe().await?;
        self.probed.store(true, Ordering::SeqCst);
        Ok(())
    }

    /// Return the classifier handle, loading it if needed
    pub async fn ensure_loaded(&self) -> Result<ClassifierHandle> {
        let (attempt, future) = {
            let mut state = self.state.lock();
            match &*state {
                LoadState::Loaded(handle) => return Ok(Arc::clone(handle)),
                LoadState::Loading { attempt, future } => {
                    debug!("Model load #{} in flight, waiting", attempt);
                    (*attempt, future.clone())
                }
                LoadState::Unloaded => {
                    let source = self
                        .source
                        .clone()
                        .ok_or_else(|| Error::model_unavailable("No model source configured"))?;
                    let attempt = self.attempts.fetch_add(1, Ordering::Relaxed) + 1;
                    let metrics = self.metrics.clone();
                    let probe = !self.probed.swap(false, Ordering::SeqCst);
                    let future = load_classifier(source, metrics, probe).boxed().shared();
                    *state = LoadState::Loading {
                        attempt,
                        future: future.clone(),
                    };
                    (attempt, future)
                }
            }
        };

        let outcome = future.await;

        {
            let mut state = self.state.lock();
            let settles_this_attempt =
                matches!(&*state, LoadState::Loading { attempt: current, .. } if *current == attempt);
            if settles_this_attempt {
                *state = match &outcome {
                    Ok(handle) => LoadState::Loaded(Arc::clone(handle)),
                    Err(_) => LoadState::Unloaded,
                };
            }
        }

        outcome.map_err(Error::ModelUnavailable)
    }
}

/// Fetch, decode and build the classifier. Errors are flattened to their
/// message so every waiter on the shared future receives the same failure.
async fn load_classifier(
    source: Arc<dyn ArtifactSource>,
    metrics: InspectionMetrics,
    probe: bool,
) -> LoadOutcome {
    let location = source.location();
    let start = Instant::now();
    info!("Loading PCB defect model from {}", location);

    match fetch_and_build(source.as_ref(), &location, probe).await {
        Ok(network) => {
            let latency_us = start.elapsed().as_micros() as u64;
            metrics.record_model_load(latency_us);
            info!(
                "Model loaded: input {:?}, output [{}], {} layers, {} ms",
                network.input_shape(),
                network.output_len(),
                network.layer_count(),
                latency_us / 1000
            );
            Ok(Arc::new(network) as ClassifierHandle)
        }
        Err(e) => {
            warn!("Failed to load model from {}: {}", location, e);
            Err(match e {
                Error::ModelUnavailable(msg) => msg,
                other => other.to_string(),
            })
        }
    }
}

async fn fetch_and_build(
    source: &dyn ArtifactSource,
    location: &str,
    probe: bool,
) -> Result<SequentialNetwork> {
    if probe {
        source.probe().await?;
    }

    let manifest_bytes = source.fetch_manifest().await?;
    let manifest = ModelManifest::parse(&manifest_bytes)?;
    let declared = manifest.weights_byte_len()?;
    debug!(
        "Manifest parsed: format={:?}, {} weight groups, {} bytes of weights",
        manifest.format,
        manifest.weights_manifest.len(),
        declared
    );

    // Buffers grow with the bytes actually fetched; the declared sizes are
    // checked against them when decoding
    let mut buffers = Vec::with_capacity(manifest.weights_manifest.len());
    for group in &manifest.weights_manifest {
        let mut buffer = Vec::new();
        for path in &group.paths {
            let shard = source.fetch_shard(path).await?;
            debug!("Fetched shard {} ({} bytes)", path, shard.len());
            buffer.extend_from_slice(&shard);
        }
        buffers.push(buffer);
    }

    let weights = WeightMap::decode(&manifest.weights_manifest, &buffers, &Device::Cpu)?;
    SequentialNetwork::build(location, &manifest, &weights)
}
