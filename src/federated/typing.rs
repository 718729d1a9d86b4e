//! Instruction and result records exchanged during a round.

use crate::core::{Config, Error, Metrics};
use crate::federated::parameters::Parameters;
use crate::server::ClientProxy;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Training instructions for one client.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FitIns {
    /// Current global parameters
    pub parameters: Parameters,
    /// Per-round training configuration
    pub config: Config,
}

/// A client's training result.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FitRes {
    /// Locally updated parameters
    pub parameters: Parameters,
    /// Number of local examples used
    pub num_examples: u64,
    /// Client-reported metrics
    #[serde(default)]
    pub metrics: Metrics,
}

/// Evaluation instructions for one client.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EvaluateIns {
    pub parameters: Parameters,
    pub config: Config,
}

/// A client's evaluation result.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EvaluateRes {
    pub loss: f64,
    pub num_examples: u64,
    #[serde(default)]
    pub metrics: Metrics,
}

/// A successful fit, paired with the client that produced it.
pub type ClientResult = (Arc<dyn ClientProxy>, FitRes);

/// A successful evaluation, paired with the client that produced it.
pub type EvaluateResult = (Arc<dyn ClientProxy>, EvaluateRes);

/// A client call that did not produce a usable result.
#[derive(Debug)]
pub enum Failure<R> {
    /// The client answered, but the answer was rejected
    Result(Arc<dyn ClientProxy>, R),
    /// The call itself failed
    Error(Error),
}

impl<R> Failure<R> {
    /// Client id, when the failure is attributable to a client.
    pub fn cid(&self) -> Option<&str> {
        match self {
            Failure::Result(client, _) => Some(client.cid()),
            Failure::Error(_) => None,
        }
    }
}
