//! Layers-model manifest (`model.json`) structures
//!
//! A manifest carries the Keras topology of the classifier and the layout of
//! its weight shards. Only `Sequential` topologies are executable; the layer
//! classes understood here are listed in [`LayerKind`].

use boardscan_core::{Error, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Parsed `model.json`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelManifest {
    /// Artifact format, normally `layers-model`
    #[serde(default)]
    pub format: Option<String>,

    /// Tool that produced the Keras model
    #[serde(default)]
    pub generated_by: Option<String>,

    /// Converter that produced the manifest
    #[serde(default)]
    pub converted_by: Option<String>,

    /// Keras model topology, kept raw until [`ModelManifest::layers`] is called
    pub model_topology: Value,

    /// Weight shard groups
    #[serde(default)]
    pub weights_manifest: Vec<WeightGroup>,
}

/// One group of weight shards. The files in `paths` are concatenated and the
/// weights are laid out back to back in `weights` order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeightGroup {
    pub paths: Vec<String>,
    pub weights: Vec<WeightEntry>,
}

/// A single named weight
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeightEntry {
    pub name: String,
    pub shape: Vec<usize>,
    pub dtype: WeightDtype,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quantization: Option<Quantization>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WeightDtype {
    Float32,
    Int32,
}

/// Quantized storage of a weight: `value = q * scale + min`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Quantization {
    pub dtype: QuantizedDtype,
    #[serde(default)]
    pub scale: Option<f32>,
    #[serde(default)]
    pub min: Option<f32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuantizedDtype {
    Uint8,
    Uint16,
    Float16,
}

impl WeightEntry {
    /// Number of scalar elements. Fails if the declared shape overflows.
    pub fn element_count(&self) -> Result<usize> {
        self.shape
            .iter()
            .try_fold(1usize, |acc, &dim| acc.checked_mul(dim))
            .ok_or_else(|| {
                Error::model_unavailable(format!(
                    "Weight '{}' declares shape {:?}, which is too large",
                    self.name, self.shape
                ))
            })
    }

    /// Bytes this weight occupies in its shard group
    pub fn byte_len(&self) -> Result<usize> {
        let width: usize = match (&self.quantization, self.dtype) {
            (Some(q), _) => match q.dtype {
                QuantizedDtype::Uint8 => 1,
                QuantizedDtype::Uint16 | QuantizedDtype::Float16 => 2,
            },
            (None, WeightDtype::Float32) | (None, WeightDtype::Int32) => 4,
        };
        self.element_count()?.checked_mul(width).ok_or_else(|| {
            Error::model_unavailable(format!(
                "Weight '{}' declares shape {:?}, which is too large",
                self.name, self.shape
            ))
        })
    }
}

impl WeightGroup {
    /// Total bytes the group's shards must contain
    pub fn byte_len(&self) -> Result<usize> {
        self.weights.iter().try_fold(0usize, |total, entry| {
            total.checked_add(entry.byte_len()?).ok_or_else(|| {
                Error::model_unavailable(format!(
                    "Weight group {} declares more bytes than fit in memory",
                    self.paths.join(", ")
                ))
            })
        })
    }
}

/// Activation functions understood by the executor
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Activation {
    #[default]
    Linear,
    Relu,
    Relu6,
    Sigmoid,
    Softmax,
    Tanh,
}

/// Keras padding mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Padding {
    #[default]
    Valid,
    Same,
}

/// Window sizes and strides may be written as a scalar or a pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Pair {
    Scalar(usize),
    Pair([usize; 2]),
}

impl Pair {
    pub fn dims(self) -> (usize, usize) {
        match self {
            Self::Scalar(v) => (v, v),
            Self::Pair([a, b]) => (a, b),
        }
    }
}

/// Batch-normalization axis, scalar or single-element list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Axis {
    Scalar(i64),
    List(Vec<i64>),
}

#[derive(Debug, Clone, Deserialize)]
pub struct Conv2DConfig {
    pub filters: usize,
    pub kernel_size: Pair,
    #[serde(default = "unit_pair")]
    pub strides: Pair,
    #[serde(default)]
    pub padding: Padding,
    #[serde(default = "unit_pair")]
    pub dilation_rate: Pair,
    #[serde(default = "default_groups")]
    pub groups: usize,
    #[serde(default)]
    pub activation: Activation,
    #[serde(default = "default_true")]
    pub use_bias: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PoolingConfig {
    #[serde(default = "default_pool")]
    pub pool_size: Pair,
    #[serde(default)]
    pub strides: Option<Pair>,
    #[serde(default)]
    pub padding: Padding,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DenseConfig {
    pub units: usize,
    #[serde(default)]
    pub activation: Activation,
    #[serde(default = "default_true")]
    pub use_bias: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BatchNormConfig {
    #[serde(default = "default_axis")]
    pub axis: Axis,
    #[serde(default = "default_epsilon")]
    pub epsilon: f64,
    #[serde(default = "default_true")]
    pub center: bool,
    #[serde(default = "default_true")]
    pub scale: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RescalingConfig {
    pub scale: f64,
    #[serde(default)]
    pub offset: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ActivationConfig {
    pub activation: Activation,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReluConfig {
    #[serde(default)]
    pub max_value: Option<f64>,
    #[serde(default)]
    pub negative_slope: f64,
    #[serde(default)]
    pub threshold: f64,
}

fn unit_pair() -> Pair {
    Pair::Scalar(1)
}

fn default_pool() -> Pair {
    Pair::Scalar(2)
}

fn default_groups() -> usize {
    1
}

fn default_true() -> bool {
    true
}

fn default_axis() -> Axis {
    Axis::Scalar(-1)
}

fn default_epsilon() -> f64 {
    1e-3
}

/// Supported layer classes with their typed configuration
#[derive(Debug, Clone)]
pub enum LayerKind {
    Input,
    Conv2D(Conv2DConfig),
    MaxPooling2D(PoolingConfig),
    AveragePooling2D(PoolingConfig),
    GlobalAveragePooling2D,
    GlobalMaxPooling2D,
    Flatten,
    Dense(DenseConfig),
    Dropout,
    BatchNormalization(BatchNormConfig),
    Rescaling(RescalingConfig),
    Activation(ActivationConfig),
    ReLU(ReluConfig),
}

/// A layer of a sequential topology
#[derive(Debug, Clone)]
pub struct LayerDef {
    /// Layer name, also the prefix of its weights
    pub name: String,

    /// Keras class name as written in the manifest
    pub class_name: String,

    /// Declared `[batch, height, width, channels]` input shape, if any
    pub batch_input_shape: Option<Vec<Option<usize>>>,

    pub kind: LayerKind,
}

#[derive(Debug, Deserialize)]
struct RawLayer {
    class_name: String,
    #[serde(default)]
    config: Value,
}

impl ModelManifest {
    /// Parse a manifest from raw JSON bytes
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes)
            .map_err(|e| Error::model_unavailable(format!("Failed to parse model manifest: {}", e)))
    }

    /// Total bytes of weight data across all groups
    pub fn weights_byte_len(&self) -> Result<usize> {
        self.weights_manifest.iter().try_fold(0usize, |total, group| {
            total
                .checked_add(group.byte_len()?)
                .ok_or_else(|| Error::model_unavailable("Model declares more weight bytes than fit in memory"))
        })
    }

    /// Resolve the sequential layer list from the topology
    pub fn layers(&self) -> Result<Vec<LayerDef>> {
        // Keras exports with a training config nest the model under `model_config`
        let topology = self
            .model_topology
            .get("model_config")
            .unwrap_or(&self.model_topology);

        let class_name = topology
            .get("class_name")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::model_unavailable("Model topology has no class_name"))?;

        if class_name != "Sequential" {
            return Err(Error::model_unavailable(format!(
                "Unsupported model topology '{}': only Sequential models can be executed",
                class_name
            )));
        }

        let config = topology.get("config").unwrap_or(&Value::Null);
        let raw_layers = match config {
            Value::Array(layers) => layers,
            Value::Object(_) => config
                .get("layers")
                .and_then(Value::as_array)
                .ok_or_else(|| Error::model_unavailable("Sequential topology has no layers"))?,
            _ => return Err(Error::model_unavailable("Sequential topology has no layers")),
        };

        raw_layers
            .iter()
            .enumerate()
            .map(|(index, raw)| parse_layer(index, raw))
            .collect()
    }
}

fn parse_layer(index: usize, raw: &Value) -> Result<LayerDef> {
    let raw: RawLayer = serde_json::from_value(raw.clone()).map_err(|e| {
        Error::model_unavailable(format!("Malformed layer #{}: {}", index, e))
    })?;

    let name = raw
        .config
        .get("name")
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| format!("layer_{}", index));

    // Keras 2 writes `batch_input_shape`, Keras 3 writes `batch_shape`
    let batch_input_shape = raw
        .config
        .get("batch_input_shape")
        .or_else(|| raw.config.get("batch_shape"))
        .map(|v| typed::<Vec<Option<usize>>>(&name, v.clone()))
        .transpose()?;

    if let Some(format) = raw.config.get("data_format").and_then(Value::as_str) {
        if format != "channels_last" {
            return Err(Error::model_unavailable(format!(
                "Layer '{}' uses data_format '{}', only channels_last is supported",
                name, format
            )));
        }
    }

    let config = raw.config;
    let kind = match raw.class_name.as_str() {
        "InputLayer" => LayerKind::Input,
        "Conv2D" => LayerKind::Conv2D(typed(&name, config)?),
        "MaxPooling2D" => LayerKind::MaxPooling2D(typed(&name, config)?),
        "AveragePooling2D" => LayerKind::AveragePooling2D(typed(&name, config)?),
        "GlobalAveragePooling2D" => LayerKind::GlobalAveragePooling2D,
        "GlobalMaxPooling2D" => LayerKind::GlobalMaxPooling2D,
        "Flatten" => LayerKind::Flatten,
        "Dense" => LayerKind::Dense(typed(&name, config)?),
        "Dropout" | "SpatialDropout2D" | "GaussianNoise" => LayerKind::Dropout,
        "BatchNormalization" => LayerKind::BatchNormalization(typed(&name, config)?),
        "Rescaling" => LayerKind::Rescaling(typed(&name, config)?),
        "Activation" => LayerKind::Activation(typed(&name, config)?),
        "ReLU" => LayerKind::ReLU(typed(&name, config)?),
        other => {
            return Err(Error::model_unavailable(format!(
                "Unsupported layer class '{}' (layer '{}')",
                other, name
            )))
        }
    };

    Ok(LayerDef {
        name,
        class_name: raw.class_name,
        batch_input_shape,
        kind,
    })
}

fn typed<T: DeserializeOwned>(layer: &str, value: Value) -> Result<T> {
    serde_json::from_value(value).map_err(|e| {
        Error::model_unavailable(format!("Invalid config for layer '{}': {}", layer, e))
    })
}
