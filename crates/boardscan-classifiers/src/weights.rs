//! Weight shard decoding

use crate::manifest::{QuantizedDtype, WeightDtype, WeightEntry, WeightGroup};
use boardscan_core::{Error, Result};
use candle_core::{Device, Tensor};
use std::collections::HashMap;

/// Named weight tensors decoded from shard groups
pub struct WeightMap {
    tensors: HashMap<String, Tensor>,
}

impl WeightMap {
    /// Decode every group. `buffers[i]` holds the concatenated shard bytes of
    /// `groups[i]`.
    pub fn decode(groups: &[WeightGroup], buffers: &[Vec<u8>], device: &Device) -> Result<Self> {
        if groups.len() != buffers.len() {
            return Err(Error::model_unavailable(format!(
                "Expected {} weight groups, got {} shard buffers",
                groups.len(),
                buffers.len()
            )));
        }

        let mut tensors = HashMap::new();
        for (index, (group, buffer)) in groups.iter().zip(buffers).enumerate() {
            let expected = group.byte_len()?;
            if buffer.len() != expected {
                return Err(Error::model_unavailable(format!(
                    "Weight group {} ({}) holds {} bytes, manifest declares {}",
                    index,
                    group.paths.join(", "),
                    buffer.len(),
                    expected
                )));
            }

            let mut offset = 0;
            for entry in &group.weights {
                let len = entry.byte_len()?;
                let values = decode_values(entry, &buffer[offset..offset + len])?;
                offset += len;

                let tensor = Tensor::from_vec(values, entry.shape.clone(), device).map_err(|e| {
                    Error::model_unavailable(format!("Failed to build weight '{}': {}", entry.name, e))
                })?;
                tensors.insert(entry.name.clone(), tensor);
            }
        }

        Ok(Self { tensors })
    }

    /// Build from already decoded tensors
    pub fn from_tensors(tensors: HashMap<String, Tensor>) -> Self {
        Self { tensors }
    }

    /// Look up `layer/param`. Converters sometimes prefix weight names with
    /// the enclosing model scope, so a `.../layer/param` suffix also matches.
    pub fn get(&self, layer: &str, param: &str) -> Option<&Tensor> {
        let key = format!("{}/{}", layer, param);
        if let Some(tensor) = self.tensors.get(&key) {
            return Some(tensor);
        }
        let suffix = format!("/{}", key);
        self.tensors
            .iter()
            .find(|(name, _)| name.ends_with(&suffix))
            .map(|(_, tensor)| tensor)
    }

    /// Fetch a weight and check its shape
    pub fn require(&self, layer: &str, param: &str, shape: &[usize]) -> Result<Tensor> {
        let tensor = self.get(layer, param).ok_or_else(|| {
            Error::model_unavailable(format!("Missing weight '{}/{}'", layer, param))
        })?;

        if tensor.dims() != shape {
            return Err(Error::model_unavailable(format!(
                "Weight '{}/{}' has shape {:?}, expected {:?}",
                layer,
                param,
                tensor.dims(),
                shape
            )));
        }

        Ok(tensor.clone())
    }

    /// Number of weights
    pub fn len(&self) -> usize {
        self.tensors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tensors.is_empty()
    }
}

fn decode_values(entry: &WeightEntry, bytes: &[u8]) -> Result<Vec<f32>> {
    if let Some(quantization) = &entry.quantization {
        let scale = quantization.scale.unwrap_or(1.0);
        let min = quantization.min.unwrap_or(0.0);
        return match quantization.dtype {
            QuantizedDtype::Uint8 => Ok(bytes.iter().map(|&q| q as f32 * scale + min).collect()),
            QuantizedDtype::Uint16 => Ok(bytes
                .chunks_exact(2)
                .map(|c| u16::from_le_bytes([c[0], c[1]]) as f32 * scale + min)
                .collect()),
            QuantizedDtype::Float16 => Err(Error::model_unavailable(format!(
                "Weight '{}' uses float16 quantization, which is not supported",
                entry.name
            ))),
        };
    }

    Ok(match entry.dtype {
        WeightDtype::Float32 => bytes
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect(),
        WeightDtype::Int32 => bytes
            .chunks_exact(4)
            .map(|c| i32::from_le_bytes([c[0], c[1], c[2], c[3]]) as f32)
            .collect(),
    })
}
