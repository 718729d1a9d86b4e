//! Model Module
//!
//! Persistence of aggregated weights:
//! - Mobile-model artifact references
//! - Params-to-artifact binding with validated, atomic saves

pub mod artifact;
pub mod params;

pub use artifact::{MobileModel, SavedModel, SavedTensor, TensorSpec};
pub use params::ModelParams;

use crate::core::{NDArray, Result};

/// Destination for aggregated parameters.
pub trait Persister: Send + Sync {
    /// Persist one set of aggregated arrays, in model parameter order.
    fn persist(&self, params: &[NDArray]) -> Result<()>;
}

impl Persister for MobileModel {
    fn persist(&self, params: &[NDArray]) -> Result<()> {
        ModelParams::new(params, self).save()
    }
}
