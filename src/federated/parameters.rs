//! Parameter wire representation.
//!
//! Tensors travel as raw little-endian `f32` bytes, one buffer per tensor,
//! the same layout mobile clients read straight into their interpreter
//! buffers.

use crate::core::{Error, NDArray, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Tensor type tag for raw little-endian `f32` buffers.
pub const FLOAT32_LE: &str = "float32_le";

/// Model parameters in their wire form.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Parameters {
    /// One byte buffer per tensor
    #[serde(serialize_with = "to_base64", deserialize_with = "from_base64")]
    pub tensors: Vec<Vec<u8>>,
    /// Encoding of each buffer
    pub tensor_type: String,
}

impl Parameters {
    /// Parameters with no tensors.
    pub fn empty() -> Self {
        Self {
            tensors: Vec::new(),
            tensor_type: FLOAT32_LE.to_string(),
        }
    }

    /// Number of tensors.
    pub fn len(&self) -> usize {
        self.tensors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tensors.is_empty()
    }
}

/// Encode NDArrays into wire parameters.
pub fn ndarrays_to_parameters(ndarrays: &[NDArray]) -> Parameters {
    let tensors = ndarrays
        .iter()
        .map(|array| array.iter().flat_map(|v| v.to_le_bytes()).collect())
        .collect();

    Parameters {
        tensors,
        tensor_type: FLOAT32_LE.to_string(),
    }
}

/// Decode wire parameters into NDArrays.
pub fn parameters_to_ndarrays(parameters: &Parameters) -> Result<Vec<NDArray>> {
    if parameters.tensor_type != FLOAT32_LE {
        return Err(Error::InvalidParameters(format!(
            "Unsupported tensor type: {}",
            parameters.tensor_type
        )));
    }

    parameters
        .tensors
        .iter()
        .enumerate()
        .map(|(i, bytes)| {
            if bytes.len() % 4 != 0 {
                return Err(Error::InvalidParameters(format!(
                    "Tensor {} has {} bytes, not a multiple of 4",
                    i,
                    bytes.len()
                )));
            }
            Ok(bytes
                .chunks_exact(4)
                .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
                .collect())
        })
        .collect()
}

fn to_base64<S: Serializer>(tensors: &[Vec<u8>], serializer: S) -> std::result::Result<S::Ok, S::Error> {
    let encoded: Vec<String> = tensors.iter().map(|t| STANDARD.encode(t)).collect();
    encoded.serialize(serializer)
}

fn from_base64<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Vec<Vec<u8>>, D::Error> {
    let encoded = Vec::<String>::deserialize(deserializer)?;
    encoded
        .iter()
        .map(|s| STANDARD.decode(s).map_err(serde::de::Error::custom))
        .collect()
}
