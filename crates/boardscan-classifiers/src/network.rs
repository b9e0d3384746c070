//! Candle executor for sequential layers-model classifiers
//!
//! Layer configs and weights come from the manifest in channels-last (NHWC)
//! layout. Internally activations are kept channels-first (NCHW), which is
//! what Candle's convolution and pooling kernels expect; `Flatten` converts
//! back to channels-last order so dense kernels line up with training.

use crate::classifier::DefectClassifier;
use crate::manifest::{Activation, Axis, LayerDef, LayerKind, ModelManifest, Padding, PoolingConfig};
use crate::preprocess::{ImageTensor, INPUT_CHANNELS, INPUT_SIZE};
use crate::weights::WeightMap;
use async_trait::async_trait;
use boardscan_core::{DefectClass, Error, Result};
use candle_core::{Device, Tensor};
use std::fmt;

/// Shape of the activations between layers, batch dimension excluded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeatureShape {
    Spatial {
        height: usize,
        width: usize,
        channels: usize,
    },
    Flat(usize),
}

impl fmt::Display for FeatureShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Spatial {
                height,
                width,
                channels,
            } => write!(f, "{}x{}x{}", height, width, channels),
            Self::Flat(n) => write!(f, "{}", n),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct SamePadding {
    top: usize,
    bottom: usize,
    left: usize,
    right: usize,
}

impl SamePadding {
    fn non_zero(self) -> Option<Self> {
        if self.top + self.bottom + self.left + self.right == 0 {
            None
        } else {
            Some(self)
        }
    }
}

enum Op {
    Conv2D {
        kernel: Tensor,
        bias: Option<Tensor>,
        stride: usize,
        dilation: usize,
        groups: usize,
        padding: Option<SamePadding>,
        activation: Activation,
    },
    MaxPool {
        window: (usize, usize),
        stride: (usize, usize),
        padding: Option<SamePadding>,
    },
    AvgPool {
        window: (usize, usize),
        stride: (usize, usize),
    },
    GlobalAvgPool,
    GlobalMaxPool,
    Flatten,
    Dense {
        kernel: Tensor,
        bias: Option<Tensor>,
        activation: Activation,
    },
    /// Inference-time batch normalization folded into `x * scale + shift`
    Affine {
        scale: Tensor,
        shift: Tensor,
    },
    Rescale {
        scale: f64,
        offset: f64,
    },
    Activation(Activation),
    ClampedRelu {
        max: f64,
    },
    Identity,
}

struct Layer {
    name: String,
    class_name: String,
    op: Op,
    output: FeatureShape,
}

/// Executable sequential classifier
pub struct SequentialNetwork {
    name: String,
    layers: Vec<Layer>,
    output: FeatureShape,
}

impl SequentialNetwork {
    /// Build the network described by `manifest` from decoded weights.
    ///
    /// Fails with `ModelUnavailable` if the topology cannot be executed, a
    /// weight is missing or misshapen, the declared input is not
    /// 224x224x3, or the output does not have one score per defect class.
    pub fn build(name: impl Into<String>, manifest: &ModelManifest, weights: &WeightMap) -> Result<Self> {
        let defs = manifest.layers()?;
        if defs.is_empty() {
            return Err(Error::model_unavailable("Model topology has no layers"));
        }

        if let Some(declared) = &defs[0].batch_input_shape {
            check_input_shape(declared)?;
        }

        let mut shape = FeatureShape::Spatial {
            height: INPUT_SIZE,
            width: INPUT_SIZE,
            channels: INPUT_CHANNELS,
        };

        let mut layers = Vec::with_capacity(defs.len());
        for def in defs {
            let (op, output) = build_op(&def, shape, weights)?;
            layers.push(Layer {
                name: def.name,
                class_name: def.class_name,
                op,
                output,
            });
            shape = output;
        }

        match shape {
            FeatureShape::Flat(n) if n == DefectClass::COUNT => {}
            other => {
                return Err(Error::model_unavailable(format!(
                    "Classifier outputs {} scores but the label set has {} classes",
                    other,
                    DefectClass::COUNT
                )))
            }
        }

        Ok(Self {
            name: name.into(),
            layers,
            output: shape,
        })
    }

    /// Parse a manifest and decode its shard buffers, then build
    pub fn from_artifact(name: impl Into<String>, manifest: &[u8], shards: &[Vec<u8>]) -> Result<Self> {
        let manifest = ModelManifest::parse(manifest)?;
        let weights = WeightMap::decode(&manifest.weights_manifest, shards, &Device::Cpu)?;
        Self::build(name, &manifest, &weights)
    }

    /// Number of executable layers
    pub fn layer_count(&self) -> usize {
        self.layers.len()
    }

    /// Output shape (always `Flat(6)` once built)
    pub fn output_shape(&self) -> FeatureShape {
        self.output
    }

    /// Run the layers on an NHWC input tensor
    pub fn forward_tensor(&self, input: &Tensor) -> candle_core::Result<Tensor> {
        let mut x = input.permute((0, 3, 1, 2))?.contiguous()?;
        for layer in &self.layers {
            x = layer.op.forward(&x)?;
        }
        Ok(x)
    }
}

#[async_trait]
impl DefectClassifier for SequentialNetwork {
    async fn forward(&self, input: &ImageTensor) -> Result<Vec<f32>> {
        let output = self
            .forward_tensor(input.tensor())
            .map_err(|e| Error::inference(format!("Model forward pass failed: {}", e)))?;

        output
            .flatten_all()
            .and_then(|t| t.to_vec1::<f32>())
            .map_err(|e| Error::inference(format!("Failed to read model output: {}", e)))
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn output_len(&self) -> usize {
        match self.output {
            FeatureShape::Flat(n) => n,
            FeatureShape::Spatial { .. } => 0,
        }
    }

    fn summary(&self) -> Vec<String> {
        self.layers
            .iter()
            .map(|l| format!("{} ({}) -> {}", l.name, l.class_name, l.output))
            .collect()
    }
}

fn check_input_shape(declared: &[Option<usize>]) -> Result<()> {
    let matches = declared.len() == 4
        && matches!(declared[0], None | Some(1))
        && declared[1] == Some(INPUT_SIZE)
        && declared[2] == Some(INPUT_SIZE)
        && declared[3] == Some(INPUT_CHANNELS);

    if matches {
        Ok(())
    } else {
        Err(Error::model_unavailable(format!(
            "Model expects input {:?}, but images are preprocessed to [null, {}, {}, {}]",
            declared, INPUT_SIZE, INPUT_SIZE, INPUT_CHANNELS
        )))
    }
}

/// Output length and leading/trailing padding of one spatial axis
fn window_output(
    input: usize,
    window: usize,
    stride: usize,
    dilation: usize,
    padding: Padding,
) -> Option<(usize, usize, usize)> {
    if window == 0 || stride == 0 || dilation == 0 {
        return None;
    }
    let effective = (window - 1) * dilation + 1;
    match padding {
        Padding::Valid => {
            if input < effective {
                None
            } else {
                Some(((input - effective) / stride + 1, 0, 0))
            }
        }
        Padding::Same => {
            let out = (input + stride - 1) / stride;
            let needed = ((out - 1) * stride + effective).saturating_sub(input);
            Some((out, needed / 2, needed - needed / 2))
        }
    }
}

fn spatial_input(def: &LayerDef, shape: FeatureShape) -> Result<(usize, usize, usize)> {
    match shape {
        FeatureShape::Spatial {
            height,
            width,
            channels,
        } => Ok((height, width, channels)),
        FeatureShape::Flat(_) => Err(Error::model_unavailable(format!(
            "Layer '{}' ({}) needs spatial input, got flat input of {}",
            def.name, def.class_name, shape
        ))),
    }
}

fn candle_err(layer: &str) -> impl Fn(candle_core::Error) -> Error + '_ {
    move |e| Error::model_unavailable(format!("Failed to prepare weights of layer '{}': {}", layer, e))
}

fn build_op(def: &LayerDef, shape: FeatureShape, weights: &WeightMap) -> Result<(Op, FeatureShape)> {
    let name = def.name.as_str();
    match &def.kind {
        LayerKind::Input | LayerKind::Dropout => Ok((Op::Identity, shape)),

        LayerKind::Conv2D(cfg) => {
            let (height, width, channels) = spatial_input(def, shape)?;
            let (kh, kw) = cfg.kernel_size.dims();
            let (sh, sw) = cfg.strides.dims();
            let (dh, dw) = cfg.dilation_rate.dims();
            if sh != sw || dh != dw {
                return Err(Error::model_unavailable(format!(
                    "Layer '{}' uses asymmetric strides or dilation, which is not supported",
                    name
                )));
            }
            let groups = cfg.groups;
            if groups == 0 || channels % groups != 0 || cfg.filters % groups != 0 {
                return Err(Error::model_unavailable(format!(
                    "Layer '{}' has {} groups for {} input channels and {} filters",
                    name, groups, channels, cfg.filters
                )));
            }

            let invalid = || {
                Error::model_unavailable(format!(
                    "Layer '{}' kernel {}x{} does not fit input {}",
                    name, kh, kw, shape
                ))
            };
            let (out_h, top, bottom) = window_output(height, kh, sh, dh, cfg.padding).ok_or_else(invalid)?;
            let (out_w, left, right) = window_output(width, kw, sw, dw, cfg.padding).ok_or_else(invalid)?;

            let kernel = weights
                .require(name, "kernel", &[kh, kw, channels / groups, cfg.filters])?
                .permute((3, 2, 0, 1))
                .and_then(|k| k.contiguous())
                .map_err(candle_err(name))?;
            let bias = if cfg.use_bias {
                Some(
                    weights
                        .require(name, "bias", &[cfg.filters])?
                        .reshape((1, cfg.filters, 1, 1))
                        .map_err(candle_err(name))?,
                )
            } else {
                None
            };

            let op = Op::Conv2D {
                kernel,
                bias,
                stride: sh,
                dilation: dh,
                groups,
                padding: SamePadding {
                    top,
                    bottom,
                    left,
                    right,
                }
                .non_zero(),
                activation: cfg.activation,
            };
            let output = FeatureShape::Spatial {
                height: out_h,
                width: out_w,
                channels: cfg.filters,
            };
            Ok((op, output))
        }

        LayerKind::MaxPooling2D(cfg) => {
            let (window, stride, padding, output) = pooling_geometry(def, shape, cfg)?;
            Ok((
                Op::MaxPool {
                    window,
                    stride,
                    padding: padding.non_zero(),
                },
                output,
            ))
        }

        LayerKind::AveragePooling2D(cfg) => {
            let (window, stride, padding, output) = pooling_geometry(def, shape, cfg)?;
            // Keras excludes padded cells from the average; Candle cannot
            if padding.non_zero().is_some() {
                return Err(Error::model_unavailable(format!(
                    "Layer '{}' needs same-padded average pooling, which is not supported",
                    name
                )));
            }
            Ok((Op::AvgPool { window, stride }, output))
        }

        LayerKind::GlobalAveragePooling2D => {
            let (_, _, channels) = spatial_input(def, shape)?;
            Ok((Op::GlobalAvgPool, FeatureShape::Flat(channels)))
        }

        LayerKind::GlobalMaxPooling2D => {
            let (_, _, channels) = spatial_input(def, shape)?;
            Ok((Op::GlobalMaxPool, FeatureShape::Flat(channels)))
        }

        LayerKind::Flatten => match shape {
            FeatureShape::Spatial {
                height,
                width,
                channels,
            } => Ok((Op::Flatten, FeatureShape::Flat(height * width * channels))),
            FeatureShape::Flat(_) => Ok((Op::Identity, shape)),
        },

        LayerKind::Dense(cfg) => {
            let inputs = match shape {
                FeatureShape::Flat(n) => n,
                FeatureShape::Spatial { .. } => {
                    return Err(Error::model_unavailable(format!(
                        "Dense layer '{}' applied to spatial input {}; only flattened inputs are supported",
                        name, shape
                    )))
                }
            };
            let kernel = weights.require(name, "kernel", &[inputs, cfg.units])?;
            let bias = if cfg.use_bias {
                Some(weights.require(name, "bias", &[cfg.units])?)
            } else {
                None
            };
            Ok((
                Op::Dense {
                    kernel,
                    bias,
                    activation: cfg.activation,
                },
                FeatureShape::Flat(cfg.units),
            ))
        }

        LayerKind::BatchNormalization(cfg) => {
            let (channels, rank) = match shape {
                FeatureShape::Spatial { channels, .. } => (channels, 4),
                FeatureShape::Flat(n) => (n, 2),
            };
            let axis = match &cfg.axis {
                Axis::Scalar(a) => Some(*a),
                Axis::List(list) if list.len() == 1 => Some(list[0]),
                Axis::List(_) => None,
            };
            if !matches!(axis, Some(a) if a == -1 || a == rank - 1) {
                return Err(Error::model_unavailable(format!(
                    "Layer '{}' normalizes over axis {:?}; only the channel axis is supported",
                    name, cfg.axis
                )));
            }

            let param = |key: &str, enabled: bool, fill: f64| -> Result<Tensor> {
                if enabled {
                    weights.require(name, key, &[channels])
                } else {
                    Tensor::full(fill as f32, channels, &Device::Cpu).map_err(candle_err(name))
                }
            };
            let gamma = param("gamma", cfg.scale, 1.0)?;
            let beta = param("beta", cfg.center, 0.0)?;
            let mean = weights.require(name, "moving_mean", &[channels])?;
            let variance = weights.require(name, "moving_variance", &[channels])?;

            let fold = || -> candle_core::Result<(Tensor, Tensor)> {
                let std = variance.affine(1.0, cfg.epsilon)?.sqrt()?;
                let scale = gamma.div(&std)?;
                let shift = beta.sub(&mean.mul(&scale)?)?;
                if rank == 4 {
                    Ok((
                        scale.reshape((1, channels, 1, 1))?,
                        shift.reshape((1, channels, 1, 1))?,
                    ))
                } else {
                    Ok((scale.reshape((1, channels))?, shift.reshape((1, channels))?))
                }
            };
            let (scale, shift) = fold().map_err(candle_err(name))?;
            Ok((Op::Affine { scale, shift }, shape))
        }

        LayerKind::Rescaling(cfg) => Ok((
            Op::Rescale {
                scale: cfg.scale,
                offset: cfg.offset,
            },
            shape,
        )),

        LayerKind::Activation(cfg) => Ok((Op::Activation(cfg.activation), shape)),

        LayerKind::ReLU(cfg) => {
            if cfg.negative_slope != 0.0 || cfg.threshold != 0.0 {
                return Err(Error::model_unavailable(format!(
                    "Layer '{}' uses a leaky or thresholded ReLU, which is not supported",
                    name
                )));
            }
            let op = match cfg.max_value {
                Some(max) => Op::ClampedRelu { max },
                None => Op::Activation(Activation::Relu),
            };
            Ok((op, shape))
        }
    }
}

type PoolGeometry = ((usize, usize), (usize, usize), SamePadding, FeatureShape);

fn pooling_geometry(def: &LayerDef, shape: FeatureShape, cfg: &PoolingConfig) -> Result<PoolGeometry> {
    let (height, width, channels) = spatial_input(def, shape)?;
    let window = cfg.pool_size.dims();
    let stride = cfg.strides.unwrap_or(cfg.pool_size).dims();

    let invalid = || {
        Error::model_unavailable(format!(
            "Layer '{}' pool {:?} does not fit input {}",
            def.name, window, shape
        ))
    };
    let (out_h, top, bottom) =
        window_output(height, window.0, stride.0, 1, cfg.padding).ok_or_else(invalid)?;
    let (out_w, left, right) =
        window_output(width, window.1, stride.1, 1, cfg.padding).ok_or_else(invalid)?;

    Ok((
        window,
        stride,
        SamePadding {
            top,
            bottom,
            left,
            right,
        },
        FeatureShape::Spatial {
            height: out_h,
            width: out_w,
            channels,
        },
    ))
}

impl Op {
    fn forward(&self, x: &Tensor) -> candle_core::Result<Tensor> {
        match self {
            Op::Conv2D {
                kernel,
                bias,
                stride,
                dilation,
                groups,
                padding,
                activation,
            } => {
                let x = match padding {
                    Some(p) => x
                        .pad_with_zeros(2, p.top, p.bottom)?
                        .pad_with_zeros(3, p.left, p.right)?,
                    None => x.clone(),
                };
                let mut y = x.conv2d(kernel, 0, *stride, *dilation, *groups)?;
                if let Some(bias) = bias {
                    y = y.broadcast_add(bias)?;
                }
                apply_activation(&y, *activation)
            }
            Op::MaxPool {
                window,
                stride,
                padding,
            } => {
                // Edge replication never changes a window maximum
                let x = match padding {
                    Some(p) => x
                        .pad_with_same(2, p.top, p.bottom)?
                        .pad_with_same(3, p.left, p.right)?,
                    None => x.clone(),
                };
                x.max_pool2d_with_stride(*window, *stride)
            }
            Op::AvgPool { window, stride } => x.avg_pool2d_with_stride(*window, *stride),
            Op::GlobalAvgPool => x.mean(3)?.mean(2),
            Op::GlobalMaxPool => x.max(3)?.max(2),
            Op::Flatten => x.permute((0, 2, 3, 1))?.contiguous()?.flatten_from(1),
            Op::Dense {
                kernel,
                bias,
                activation,
            } => {
                let mut y = x.contiguous()?.matmul(kernel)?;
                if let Some(bias) = bias {
                    y = y.broadcast_add(bias)?;
                }
                apply_activation(&y, *activation)
            }
            Op::Affine { scale, shift } => x.broadcast_mul(scale)?.broadcast_add(shift),
            Op::Rescale { scale, offset } => x.affine(*scale, *offset),
            Op::Activation(activation) => apply_activation(x, *activation),
            Op::ClampedRelu { max } => x.clamp(0f32, *max as f32),
            Op::Identity => Ok(x.clone()),
        }
    }
}

/// Channels sit on axis 1 in both NCHW and flat layouts
fn apply_activation(x: &Tensor, activation: Activation) -> candle_core::Result<Tensor> {
    match activation {
        Activation::Linear => Ok(x.clone()),
        Activation::Relu => x.relu(),
        Activation::Relu6 => x.clamp(0f32, 6f32),
        Activation::Sigmoid => candle_nn::ops::sigmoid(x),
        Activation::Softmax => candle_nn::ops::softmax(x, 1),
        Activation::Tanh => x.tanh(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::preprocess::{preprocess_image, ResizeFilter};
    use image::{DynamicImage, Rgb, RgbImage};
    use serde_json::json;

    fn f32_bytes(values: &[f32]) -> Vec<u8> {
        values.iter().flat_map(|v| v.to_le_bytes()).collect()
    }

    fn manifest(layers: serde_json::Value, weights: serde_json::Value) -> Vec<u8> {
        serde_json::to_vec(&json!({
            "format": "layers-model",
            "modelTopology": {"class_name": "Sequential", "config": {"name": "sequential", "layers": layers}},
            "weightsManifest": [{"paths": ["group1-shard1of1.bin"], "weights": weights}]
        }))
        .unwrap()
    }

    /// GAP over RGB followed by a 3->6 softmax head: red votes for class 0,
    /// green for class 2, blue for class 4.
    fn colour_head() -> (Vec<u8>, Vec<u8>) {
        let layers = json!([
            {"class_name": "InputLayer", "config": {"name": "input", "batch_input_shape": [null, 224, 224, 3]}},
            {"class_name": "GlobalAveragePooling2D", "config": {"name": "gap"}},
            {"class_name": "Dense", "config": {"name": "head", "units": 6, "activation": "softmax"}}
        ]);
        let weights = json!([
            {"name": "head/kernel", "shape": [3, 6], "dtype": "float32"},
            {"name": "head/bias", "shape": [6], "dtype": "float32"}
        ]);
        let mut kernel = vec![0.0f32; 18];
        kernel[0] = 4.0; // r -> 0
        kernel[6 + 2] = 4.0; // g -> 2
        kernel[12 + 4] = 4.0; // b -> 4
        let mut values = kernel;
        values.extend([0.0f32; 6]);
        (manifest(layers, weights), f32_bytes(&values))
    }

    fn solid(rgb: [u8; 3]) -> ImageTensor {
        let image = RgbImage::from_pixel(50, 40, Rgb(rgb));
        preprocess_image(&DynamicImage::ImageRgb8(image), ResizeFilter::Nearest).unwrap()
    }

    #[tokio::test]
    async fn test_colour_head_forward() {
        let (manifest, shard) = colour_head();
        let network = SequentialNetwork::from_artifact("colour", &manifest, &[shard]).unwrap();
        assert_eq!(network.layer_count(), 3);
        assert_eq!(network.output_len(), 6);

        let scores = network.forward(&solid([0, 255, 0])).await.unwrap();
        assert_eq!(scores.len(), 6);
        let sum: f32 = scores.iter().sum();
        assert!((sum - 1.0).abs() < 1e-5);
        let best = scores
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .unwrap()
            .0;
        assert_eq!(best, 2);
    }

    #[test]
    fn test_conv_pool_flatten_shapes() {
        let layers = json!([
            {"class_name": "Conv2D", "config": {"name": "conv", "batch_input_shape": [null, 224, 224, 3],
                "filters": 2, "kernel_size": [3, 3], "strides": [2, 2], "padding": "same", "activation": "relu"}},
            {"class_name": "BatchNormalization", "config": {"name": "bn", "axis": [3], "epsilon": 0.001}},
            {"class_name": "MaxPooling2D", "config": {"name": "pool", "pool_size": [4, 4], "padding": "valid"}},
            {"class_name": "AveragePooling2D", "config": {"name": "avg", "pool_size": 4}},
            {"class_name": "Flatten", "config": {"name": "flatten"}},
            {"class_name": "Dense", "config": {"name": "out", "units": 6, "activation": "softmax"}}
        ]);
        let weights = json!([
            {"name": "conv/kernel", "shape": [3, 3, 3, 2], "dtype": "float32"},
            {"name": "conv/bias", "shape": [2], "dtype": "float32"},
            {"name": "bn/gamma", "shape": [2], "dtype": "float32"},
            {"name": "bn/beta", "shape": [2], "dtype": "float32"},
            {"name": "bn/moving_mean", "shape": [2], "dtype": "float32"},
            {"name": "bn/moving_variance", "shape": [2], "dtype": "float32"},
            {"name": "out/kernel", "shape": [98, 6], "dtype": "float32"},
            {"name": "out/bias", "shape": [6], "dtype": "float32"}
        ]);
        // 224 -same/2-> 112 -pool4-> 28 -avg4-> 7; 7*7*2 = 98
        let mut values = vec![0.01f32; 54 + 2];
        values.extend([1.0, 1.0, 0.0, 0.0, 0.0, 0.0, 1.0, 1.0]);
        values.extend(vec![0.001f32; 98 * 6 + 6]);

        let network =
            SequentialNetwork::from_artifact("conv", &manifest(layers, weights), &[f32_bytes(&values)])
                .unwrap();
        let summary = network.summary();
        assert_eq!(summary[0], "conv (Conv2D) -> 112x112x2");
        assert_eq!(summary[2], "pool (MaxPooling2D) -> 28x28x2");
        assert_eq!(summary[4], "flatten (Flatten) -> 98");

        let output = network.forward_tensor(solid([10, 20, 30]).tensor()).unwrap();
        assert_eq!(output.dims(), &[1, 6]);
    }

    #[test]
    fn test_wrong_output_width_rejected() {
        let layers = json!([
            {"class_name": "GlobalAveragePooling2D", "config": {"name": "gap"}},
            {"class_name": "Dense", "config": {"name": "head", "units": 5, "activation": "softmax"}}
        ]);
        let weights = json!([
            {"name": "head/kernel", "shape": [3, 5], "dtype": "float32"},
            {"name": "head/bias", "shape": [5], "dtype": "float32"}
        ]);
        let shard = f32_bytes(&[0.0; 20]);
        let err = SequentialNetwork::from_artifact("five", &manifest(layers, weights), &[shard])
            .err()
            .unwrap();
        assert!(matches!(err, Error::ModelUnavailable(_)));
        assert!(err.to_string().contains("5 scores"));
    }

    #[test]
    fn test_wrong_input_shape_rejected() {
        let layers = json!([
            {"class_name": "InputLayer", "config": {"name": "input", "batch_input_shape": [null, 128, 128, 3]}},
            {"class_name": "GlobalAveragePooling2D", "config": {"name": "gap"}}
        ]);
        let err = SequentialNetwork::from_artifact("small", &manifest(layers, json!([])), &[vec![]])
            .err()
            .unwrap();
        assert!(err.to_string().contains("128"));
    }

    #[test]
    fn test_missing_weight_rejected() {
        let layers = json!([
            {"class_name": "GlobalAveragePooling2D", "config": {"name": "gap"}},
            {"class_name": "Dense", "config": {"name": "head", "units": 6}}
        ]);
        let weights = json!([{"name": "head/kernel", "shape": [3, 6], "dtype": "float32"}]);
        let shard = f32_bytes(&[0.0; 18]);
        let err = SequentialNetwork::from_artifact("nobias", &manifest(layers, weights), &[shard])
            .err()
            .unwrap();
        assert!(err.to_string().contains("head/bias"));
    }

    #[test]
    fn test_window_output_matches_keras() {
        assert_eq!(window_output(224, 3, 1, 1, Padding::Valid), Some((222, 0, 0)));
        assert_eq!(window_output(224, 3, 2, 1, Padding::Same), Some((112, 0, 1)));
        assert_eq!(window_output(224, 3, 1, 1, Padding::Same), Some((224, 1, 1)));
        assert_eq!(window_output(7, 2, 2, 1, Padding::Valid), Some((3, 0, 0)));
        assert_eq!(window_output(2, 3, 1, 1, Padding::Valid), None);
    }
}
