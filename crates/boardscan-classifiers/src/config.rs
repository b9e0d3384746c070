//! Inspector configuration
//!
//! Loaded from YAML. A missing file means defaults.

use crate::preprocess::ResizeFilter;
use crate::source::{ArtifactSource, HttpSource, LocalSource};
use boardscan_core::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Top-level inspector configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InspectorConfig {
    /// Model artifact settings
    #[serde(default)]
    pub model: ModelSettings,

    /// Image preprocessing settings
    #[serde(default)]
    pub preprocess: PreprocessSettings,
}

impl InspectorConfig {
    /// Load configuration from a YAML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&content)
            .map_err(|e| Error::config(format!("{}: {}", path.display(), e)))
    }

    /// Parse configuration from a YAML string
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml).map_err(|e| Error::config(format!("Invalid config: {}", e)))
    }

    /// Load from `path` if it exists, otherwise use defaults
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if path.exists() {
            Self::from_file(path)
        } else {
            tracing::debug!("No config at {}, using defaults", path.display());
            Ok(Self::default())
        }
    }
}

/// Model artifact settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelSettings {
    #[serde(default)]
    pub source: SourceSpec,

    /// Per-request timeout for HTTP sources; 0 disables it
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            source: SourceSpec::default(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

impl ModelSettings {
    /// Instantiate the configured artifact source
    pub fn build_source(&self) -> Result<Arc<dyn ArtifactSource>> {
        match &self.source {
            SourceSpec::Http { base_url, manifest } => {
                let timeout = match self.request_timeout_secs {
                    0 => None,
                    secs => Some(Duration::from_secs(secs)),
                };
                Ok(Arc::new(HttpSource::new(base_url, manifest, timeout)?))
            }
            SourceSpec::Local { path } => Ok(Arc::new(LocalSource::new(path.clone()))),
        }
    }
}

/// Where the model artifact is read from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SourceSpec {
    /// Manifest served over HTTP, relative to `base_url`
    Http {
        #[serde(default = "default_base_url")]
        base_url: String,
        #[serde(default = "default_manifest")]
        manifest: String,
    },
    /// Manifest on disk; shards are read from the same directory
    Local { path: PathBuf },
}

impl Default for SourceSpec {
    fn default() -> Self {
        Self::Http {
            base_url: default_base_url(),
            manifest: default_manifest(),
        }
    }
}

impl SourceSpec {
    /// HTTP source at `base_url`, keeping the manifest path if this is
    /// already an HTTP source
    pub fn with_base_url(&self, base_url: impl Into<String>) -> Self {
        let manifest = match self {
            Self::Http { manifest, .. } => manifest.clone(),
            Self::Local { .. } => default_manifest(),
        };
        Self::Http {
            base_url: base_url.into(),
            manifest,
        }
    }
}

/// Image preprocessing settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PreprocessSettings {
    #[serde(default)]
    pub filter: ResizeFilter,
}

fn default_base_url() -> String {
    "http://localhost:8080/".to_string()
}

fn default_manifest() -> String {
    "model/model.json".to_string()
}

fn default_request_timeout() -> u64 {
    30
}
