//! Image preprocessing into the classifier's input tensor
//!
//! The classifier was trained on 224x224 RGB images with channel values
//! scaled to [0, 1]. Feeding it anything else produces meaningless scores
//! without any error, so these constants are part of the model contract.

use boardscan_core::{Error, Result};
use candle_core::{Device, Tensor};
use image::imageops::FilterType;
use image::{DynamicImage, RgbImage};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Input height and width in pixels
pub const INPUT_SIZE: usize = 224;

/// Colour channels (RGB)
pub const INPUT_CHANNELS: usize = 3;

/// Divisor mapping 8-bit channel values into [0, 1]
pub const PIXEL_SCALE: f32 = 255.0;

/// Full input shape, NHWC with a batch of one
pub const INPUT_SHAPE: [usize; 4] = [1, INPUT_SIZE, INPUT_SIZE, INPUT_CHANNELS];

/// Resampling filter used when resizing to the input size
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResizeFilter {
    #[default]
    Nearest,
    Triangle,
    CatmullRom,
    Gaussian,
    Lanczos3,
}

impl From<ResizeFilter> for FilterType {
    fn from(filter: ResizeFilter) -> Self {
        match filter {
            ResizeFilter::Nearest => FilterType::Nearest,
            ResizeFilter::Triangle => FilterType::Triangle,
            ResizeFilter::CatmullRom => FilterType::CatmullRom,
            ResizeFilter::Gaussian => FilterType::Gaussian,
            ResizeFilter::Lanczos3 => FilterType::Lanczos3,
        }
    }
}

impl FromStr for ResizeFilter {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "nearest" => Ok(Self::Nearest),
            "triangle" | "bilinear" => Ok(Self::Triangle),
            "catmull-rom" | "bicubic" => Ok(Self::CatmullRom),
            "gaussian" => Ok(Self::Gaussian),
            "lanczos3" => Ok(Self::Lanczos3),
            other => Err(format!(
                "unknown resize filter '{}' (expected nearest, triangle, catmull-rom, gaussian or lanczos3)",
                other
            )),
        }
    }
}

impl fmt::Display for ResizeFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Nearest => "nearest",
            Self::Triangle => "triangle",
            Self::CatmullRom => "catmull-rom",
            Self::Gaussian => "gaussian",
            Self::Lanczos3 => "lanczos3",
        };
        f.write_str(name)
    }
}

/// Normalized `[1, 224, 224, 3]` input tensor for a single inference call.
///
/// Owned by the call that created it; its buffer is freed when it drops.
#[derive(Debug)]
pub struct ImageTensor {
    tensor: Tensor,
}

impl ImageTensor {
    /// Wrap an existing tensor, checking the input contract
    pub fn new(tensor: Tensor) -> Result<Self> {
        if tensor.dims() != INPUT_SHAPE {
            return Err(Error::image_decode(format!(
                "Input tensor has shape {:?}, expected {:?}",
                tensor.dims(),
                INPUT_SHAPE
            )));
        }
        Ok(Self { tensor })
    }

    /// Build from a 224x224 RGB image
    fn from_rgb(image: &RgbImage) -> Result<Self> {
        let data: Vec<f32> = image
            .as_raw()
            .iter()
            .map(|&v| v as f32 / PIXEL_SCALE)
            .collect();

        let shape = (1, INPUT_SIZE, INPUT_SIZE, INPUT_CHANNELS);
        let tensor = Tensor::from_vec(data, shape, &Device::Cpu).map_err(|e| {
            Error::image_decode(format!("Failed to create input tensor: {}", e))
        })?;
        Self::new(tensor)
    }

    /// Underlying tensor (NHWC)
    pub fn tensor(&self) -> &Tensor {
        &self.tensor
    }

    pub fn dims(&self) -> &[usize] {
        self.tensor.dims()
    }

    /// Copy the values out in NHWC order
    pub fn to_vec(&self) -> Result<Vec<f32>> {
        self.tensor
            .flatten_all()
            .and_then(|t| t.to_vec1::<f32>())
            .map_err(|e| Error::internal(format!("Failed to read input tensor: {}", e)))
    }
}

/// Decode raw image bytes and turn them into the classifier input
pub fn preprocess(bytes: &[u8], filter: ResizeFilter) -> Result<ImageTensor> {
    let image = image::load_from_memory(bytes)
        .map_err(|e| Error::image_decode(format!("Failed to decode image: {}", e)))?;
    preprocess_image(&image, filter)
}

/// Resize and normalize an already decoded image
pub fn preprocess_image(image: &DynamicImage, filter: ResizeFilter) -> Result<ImageTensor> {
    if image.width() == 0 || image.height() == 0 {
        return Err(Error::image_decode(format!(
            "Image has zero-sized dimension ({}x{})",
            image.width(),
            image.height()
        )));
    }

    let rgb = image.to_rgb8();
    let size = INPUT_SIZE as u32;
    let resized = if rgb.dimensions() == (size, size) {
        rgb
    } else {
        image::imageops::resize(&rgb, size, size, filter.into())
    };

    ImageTensor::from_rgb(&resized)
}
