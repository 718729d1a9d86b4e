//! Client Module
//!
//! Participant side of the server protocol:
//! - Client interface for local training and evaluation
//! - Connection loop answering server instructions

pub mod app;
pub mod interface;

pub use app::start_client;
pub use interface::{Client, EvaluateOutcome, FitOutcome};
