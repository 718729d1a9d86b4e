//! Binding of aggregated parameters to a mobile-model artifact.

use crate::core::{now, Error, NDArray, Result};
use crate::model::artifact::{MobileModel, SavedModel, SavedTensor};
use std::path::PathBuf;

/// Aggregated arrays bound to the artifact they should be written into.
///
/// Lives only for the duration of one save.
pub struct ModelParams<'a> {
    pub params: &'a [NDArray],
    pub model: &'a MobileModel,
}

impl<'a> ModelParams<'a> {
    pub fn new(params: &'a [NDArray], model: &'a MobileModel) -> Self {
        Self { params, model }
    }

    /// Check the arrays against the model's tensor layout.
    pub fn validate(&self) -> Result<()> {
        if self.params.len() != self.model.tensors.len() {
            return Err(Error::Persistence(format!(
                "Model {} has {} tensors, got {} arrays",
                self.model.name,
                self.model.tensors.len(),
                self.params.len()
            )));
        }

        for (spec, array) in self.model.tensors.iter().zip(self.params) {
            if spec.num_elements() != array.len() {
                return Err(Error::Persistence(format!(
                    "Tensor {} expects {} elements (shape {:?}), got {}",
                    spec.name,
                    spec.num_elements(),
                    spec.shape,
                    array.len()
                )));
            }
        }

        Ok(())
    }

    /// Write the arrays into the artifact.
    ///
    /// The file is replaced atomically: readers see either the previous
    /// weights or the new ones.
    pub fn save(&self) -> Result<()> {
        self.validate()?;

        let saved = SavedModel {
            model: self.model.name.clone(),
            saved_at: now(),
            tensors: self
                .model
                .tensors
                .iter()
                .zip(self.params)
                .map(|(spec, data)| SavedTensor {
                    name: spec.name.clone(),
                    shape: spec.shape.clone(),
                    data: data.clone(),
                })
                .collect(),
        };

        let bytes = bincode::serialize(&saved)
            .map_err(|e| Error::Persistence(format!("encoding {}: {}", self.model.name, e)))?;

        let tmp = self.tmp_path();
        std::fs::write(&tmp, &bytes).map_err(|e| self.io_error(e))?;
        std::fs::rename(&tmp, &self.model.path).map_err(|e| {
            let _ = std::fs::remove_file(&tmp);
            self.io_error(e)
        })?;

        Ok(())
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = self
            .model
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.model.path.with_file_name(name)
    }

    fn io_error(&self, err: std::io::Error) -> Error {
        Error::Persistence(format!("writing {}: {}", self.model.path.display(), err))
    }
}
