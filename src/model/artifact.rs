//! Mobile-model artifacts.
//!
//! A [`MobileModel`] names the on-device model file that aggregated
//! weights are written into, and describes the tensors it expects in
//! parameter order.

use crate::core::{Error, NDArray, Result, Timestamp};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Shape of one trainable tensor in the model.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TensorSpec {
    /// Tensor name inside the model
    pub name: String,
    /// Tensor dimensions
    pub shape: Vec<usize>,
}

impl TensorSpec {
    /// Create a new tensor spec.
    pub fn new(name: &str, shape: &[usize]) -> Self {
        Self {
            name: name.to_string(),
            shape: shape.to_vec(),
        }
    }

    /// Number of elements the tensor holds.
    pub fn num_elements(&self) -> usize {
        self.shape.iter().product()
    }
}

/// Reference to a mobile-model artifact on disk.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MobileModel {
    /// Model name
    pub name: String,
    /// Artifact file the weights are written into
    pub path: PathBuf,
    /// Trainable tensors, in parameter order
    pub tensors: Vec<TensorSpec>,
}

impl MobileModel {
    /// Create a model reference.
    pub fn new(name: &str, path: impl Into<PathBuf>, tensors: Vec<TensorSpec>) -> Self {
        Self {
            name: name.to_string(),
            path: path.into(),
            tensors,
        }
    }

    /// Load a model reference from a JSON descriptor file.
    pub fn from_descriptor(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    /// Read back the weights most recently saved into the artifact.
    pub fn load_weights(&self) -> Result<SavedModel> {
        let bytes = std::fs::read(&self.path)?;
        let saved: SavedModel = bincode::deserialize(&bytes)?;
        if saved.model != self.name {
            return Err(Error::InvalidParameters(format!(
                "Artifact belongs to model {}, expected {}",
                saved.model, self.name
            )));
        }
        Ok(saved)
    }
}

/// One tensor as stored in the artifact.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SavedTensor {
    pub name: String,
    pub shape: Vec<usize>,
    pub data: NDArray,
}

/// Contents of a saved artifact.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SavedModel {
    /// Model name
    pub model: String,
    /// When the weights were written
    pub saved_at: Timestamp,
    /// Tensors in parameter order
    pub tensors: Vec<SavedTensor>,
}

impl SavedModel {
    /// Tensor data in parameter order.
    pub fn ndarrays(&self) -> Vec<NDArray> {
        self.tensors.iter().map(|t| t.data.clone()).collect()
    }
}
