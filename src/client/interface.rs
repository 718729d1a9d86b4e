//! Client interface.
//!
//! Defines what a participant must implement to take part in a run.

use crate::core::{Config, Metrics, NDArray, Result};

/// Outcome of local training.
#[derive(Clone, Debug)]
pub struct FitOutcome {
    /// Locally updated tensors
    pub parameters: Vec<NDArray>,
    /// Number of local examples used
    pub num_examples: u64,
    /// Training metrics
    pub metrics: Metrics,
}

/// Outcome of local evaluation.
#[derive(Clone, Debug)]
pub struct EvaluateOutcome {
    pub loss: f64,
    pub num_examples: u64,
    pub metrics: Metrics,
}

/// A federated-learning participant.
pub trait Client: Send {
    /// Return the current local model parameters.
    fn get_parameters(&mut self) -> Result<Vec<NDArray>>;

    /// Refine the provided weights using the locally held dataset.
    ///
    /// The configuration carries the per-round training settings chosen
    /// by the server, such as `batch_size` and `local_epochs`.
    fn fit(&mut self, parameters: Vec<NDArray>, config: &Config) -> Result<FitOutcome>;

    /// Evaluate the provided weights using the locally held dataset.
    fn evaluate(&mut self, parameters: Vec<NDArray>, config: &Config) -> Result<EvaluateOutcome>;
}
