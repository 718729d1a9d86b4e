//! Federated Learning Module
//!
//! Provides the round logic of federated averaging:
//! - Parameter wire format
//! - Weighted aggregation with FedAvg
//! - Round strategies, including one that saves aggregated weights

pub mod aggregator;
pub mod parameters;
pub mod saving;
pub mod strategy;
pub mod typing;

pub use aggregator::{aggregate, weighted_loss_avg};
pub use parameters::{ndarrays_to_parameters, parameters_to_ndarrays, Parameters};
pub use saving::SavingStrategy;
pub use strategy::{FedAvg, FedAvgConfig, Strategy};
pub use typing::{
    ClientResult, EvaluateIns, EvaluateRes, EvaluateResult, Failure, FitIns, FitRes,
};
