//! Run configuration.
//!
//! Defaults reproduce the fixed deployment: all interfaces on port 8080,
//! ten rounds, two clients minimum, full participation.

use crate::core::{Error, Result};
use crate::federated::FedAvgConfig;
use crate::server::ServerConfig;
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::Path;

/// Default server port.
pub const PORT: u16 = 8080;

/// Default number of federated rounds.
pub const NUM_ROUNDS: u64 = 10;

/// Configuration of one server run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Interface to bind
    pub host: IpAddr,
    /// Port to bind
    pub port: u16,
    /// Number of rounds
    pub num_rounds: u64,
    /// Per-request client timeout, in seconds
    pub round_timeout: Option<f64>,
    /// Fraction of clients used for training
    pub fraction_fit: f64,
    /// Fraction of clients used for evaluation
    pub fraction_evaluate: f64,
    /// Minimum training clients
    pub min_fit_clients: usize,
    /// Minimum evaluation clients
    pub min_evaluate_clients: usize,
    /// Minimum connected clients before a round starts
    pub min_available_clients: usize,
    /// Aggregate despite client failures
    pub accept_failures: bool,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            host: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: PORT,
            num_rounds: NUM_ROUNDS,
            round_timeout: None,
            fraction_fit: 1.0,
            fraction_evaluate: 1.0,
            min_fit_clients: 2,
            min_evaluate_clients: 2,
            min_available_clients: 2,
            accept_failures: true,
        }
    }
}

impl RunConfig {
    /// Load a configuration from a JSON file. Missing fields keep their
    /// defaults.
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&text)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Override the port.
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Override the number of rounds.
    pub fn with_rounds(mut self, num_rounds: u64) -> Self {
        self.num_rounds = num_rounds;
        self
    }

    /// Reject configurations no run could satisfy.
    pub fn validate(&self) -> Result<()> {
        for (name, fraction) in [
            ("fraction_fit", self.fraction_fit),
            ("fraction_evaluate", self.fraction_evaluate),
        ] {
            if !(0.0..=1.0).contains(&fraction) {
                return Err(Error::Config(format!(
                    "{} must be within [0, 1], got {}",
                    name, fraction
                )));
            }
        }
        if self.min_fit_clients == 0 || self.min_available_clients == 0 {
            return Err(Error::Config(
                "minimum client counts must be at least 1".to_string(),
            ));
        }
        if self.round_timeout.map_or(false, |t| !(t > 0.0)) {
            return Err(Error::Config("round_timeout must be positive".to_string()));
        }
        Ok(())
    }

    /// Socket address to bind.
    pub fn address(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    /// Strategy settings.
    pub fn fedavg_config(&self) -> FedAvgConfig {
        FedAvgConfig {
            fraction_fit: self.fraction_fit,
            fraction_evaluate: self.fraction_evaluate,
            min_fit_clients: self.min_fit_clients,
            min_evaluate_clients: self.min_evaluate_clients,
            min_available_clients: self.min_available_clients,
            accept_failures: self.accept_failures,
            ..Default::default()
        }
    }

    /// Server loop settings.
    pub fn server_config(&self) -> ServerConfig {
        ServerConfig {
            num_rounds: self.num_rounds,
            round_timeout: self.round_timeout,
        }
    }
}
