//! Round strategies.
//!
//! A strategy decides which clients take part in a round, what they are
//! told to do, and how their answers are combined.

use crate::core::{Config, Metrics, Result, Round};
use crate::federated::aggregator::{aggregate, weighted_loss_avg};
use crate::federated::parameters::{ndarrays_to_parameters, parameters_to_ndarrays, Parameters};
use crate::federated::typing::{
    ClientResult, EvaluateIns, EvaluateRes, EvaluateResult, Failure, FitIns, FitRes,
};
use crate::server::{ClientManager, ClientProxy};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, warn};

/// How long sampling waits for enough clients to connect.
pub const DEFAULT_SAMPLE_TIMEOUT: Duration = Duration::from_secs(86_400);

/// Per-round configuration callback.
pub type ConfigFn = Arc<dyn Fn(Round) -> Config + Send + Sync>;

/// Centralized evaluation callback: `(round, parameters, config) -> (loss, metrics)`.
pub type EvaluateFn =
    Arc<dyn Fn(Round, &[Vec<f32>], &Config) -> Option<(f64, Metrics)> + Send + Sync>;

/// Round strategy driven by the server.
#[async_trait]
pub trait Strategy: Send + Sync {
    /// Initial global parameters, if the strategy provides them.
    fn initialize_parameters(&self) -> Option<Parameters>;

    /// Select clients and build their fit instructions.
    async fn configure_fit(
        &self,
        round: Round,
        parameters: &Parameters,
        client_manager: &ClientManager,
    ) -> Vec<(Arc<dyn ClientProxy>, FitIns)>;

    /// Combine fit results into new global parameters.
    ///
    /// Results that cannot be combined, such as tensor shapes that differ
    /// between clients, are logged at error level and the round yields
    /// `None`, leaving the global parameters unchanged.
    fn aggregate_fit(
        &self,
        round: Round,
        results: &[ClientResult],
        failures: &[Failure<FitRes>],
    ) -> (Option<Parameters>, Metrics);

    /// Select clients and build their evaluate instructions.
    async fn configure_evaluate(
        &self,
        round: Round,
        parameters: &Parameters,
        client_manager: &ClientManager,
    ) -> Vec<(Arc<dyn ClientProxy>, EvaluateIns)>;

    /// Combine evaluation results into a loss. Unusable results are
    /// logged at error level and yield `None`.
    fn aggregate_evaluate(
        &self,
        round: Round,
        results: &[EvaluateResult],
        failures: &[Failure<EvaluateRes>],
    ) -> (Option<f64>, Metrics);

    /// Centralized evaluation of the current global parameters.
    fn evaluate(&self, round: Round, parameters: &Parameters) -> Option<(f64, Metrics)>;
}

/// FedAvg configuration.
#[derive(Clone, Debug)]
pub struct FedAvgConfig {
    /// Fraction of available clients used for training
    pub fraction_fit: f64,
    /// Fraction of available clients used for evaluation
    pub fraction_evaluate: f64,
    /// Minimum clients used for training
    pub min_fit_clients: usize,
    /// Minimum clients used for evaluation
    pub min_evaluate_clients: usize,
    /// Minimum clients that must be connected before a round starts
    pub min_available_clients: usize,
    /// Aggregate even if some clients failed
    pub accept_failures: bool,
    /// How long to wait for clients when sampling
    pub sample_timeout: Duration,
}

impl Default for FedAvgConfig {
    fn default() -> Self {
        Self {
            fraction_fit: 1.0,
            fraction_evaluate: 1.0,
            min_fit_clients: 2,
            min_evaluate_clients: 2,
            min_available_clients: 2,
            accept_failures: true,
            sample_timeout: DEFAULT_SAMPLE_TIMEOUT,
        }
    }
}

/// Federated averaging.
pub struct FedAvg {
    pub config: FedAvgConfig,
    initial_parameters: Option<Parameters>,
    on_fit_config_fn: Option<ConfigFn>,
    on_evaluate_config_fn: Option<ConfigFn>,
    evaluate_fn: Option<EvaluateFn>,
}

impl FedAvg {
    /// Create a new FedAvg strategy.
    pub fn new(config: FedAvgConfig) -> Self {
        Self {
            config,
            initial_parameters: None,
            on_fit_config_fn: None,
            on_evaluate_config_fn: None,
            evaluate_fn: None,
        }
    }

    /// Set initial global parameters.
    pub fn with_initial_parameters(mut self, parameters: Parameters) -> Self {
        self.initial_parameters = Some(parameters);
        self
    }

    /// Set the per-round fit configuration callback.
    pub fn with_fit_config(mut self, f: impl Fn(Round) -> Config + Send + Sync + 'static) -> Self {
        self.on_fit_config_fn = Some(Arc::new(f));
        self
    }

    /// Set the per-round evaluate configuration callback.
    pub fn with_evaluate_config(
        mut self,
        f: impl Fn(Round) -> Config + Send + Sync + 'static,
    ) -> Self {
        self.on_evaluate_config_fn = Some(Arc::new(f));
        self
    }

    /// Set the centralized evaluation callback.
    pub fn with_evaluate_fn(
        mut self,
        f: impl Fn(Round, &[Vec<f32>], &Config) -> Option<(f64, Metrics)> + Send + Sync + 'static,
    ) -> Self {
        self.evaluate_fn = Some(Arc::new(f));
        self
    }

    /// Sample size and minimum client count for training.
    pub fn num_fit_clients(&self, num_available: usize) -> (usize, usize) {
        let num = (num_available as f64 * self.config.fraction_fit) as usize;
        (
            num.max(self.config.min_fit_clients),
            self.config.min_available_clients,
        )
    }

    /// Sample size and minimum client count for evaluation.
    pub fn num_evaluation_clients(&self, num_available: usize) -> (usize, usize) {
        let num = (num_available as f64 * self.config.fraction_evaluate) as usize;
        (
            num.max(self.config.min_evaluate_clients),
            self.config.min_available_clients,
        )
    }

    fn round_config(f: &Option<ConfigFn>, round: Round) -> Config {
        f.as_ref().map(|f| f(round)).unwrap_or_default()
    }
}

impl Default for FedAvg {
    fn default() -> Self {
        Self::new(FedAvgConfig::default())
    }
}

#[async_trait]
impl Strategy for FedAvg {
    fn initialize_parameters(&self) -> Option<Parameters> {
        self.initial_parameters.clone()
    }

    async fn configure_fit(
        &self,
        round: Round,
        parameters: &Parameters,
        client_manager: &ClientManager,
    ) -> Vec<(Arc<dyn ClientProxy>, FitIns)> {
        let config = Self::round_config(&self.on_fit_config_fn, round);
        let (sample_size, min_num_clients) = self.num_fit_clients(client_manager.num_available());
        let clients = client_manager
            .sample(sample_size, min_num_clients, self.config.sample_timeout)
            .await;

        clients
            .into_iter()
            .map(|client| {
                let ins = FitIns {
                    parameters: parameters.clone(),
                    config: config.clone(),
                };
                (client, ins)
            })
            .collect()
    }

    fn aggregate_fit(
        &self,
        round: Round,
        results: &[ClientResult],
        failures: &[Failure<FitRes>],
    ) -> (Option<Parameters>, Metrics) {
        if results.is_empty() {
            return (None, Metrics::new());
        }
        // Do not aggregate if there are failures and failures are not accepted
        if !self.config.accept_failures && !failures.is_empty() {
            return (None, Metrics::new());
        }

        let weights_results: Result<Vec<_>> = results
            .iter()
            .map(|(_, fit_res)| {
                parameters_to_ndarrays(&fit_res.parameters).map(|w| (w, fit_res.num_examples))
            })
            .collect();

        match weights_results.and_then(|w| aggregate(&w)) {
            Ok(aggregated) => (Some(ndarrays_to_parameters(&aggregated)), Metrics::new()),
            Err(e) => {
                error!(round, error = %e, "aggregate_fit: cannot combine client results, discarding round");
                (None, Metrics::new())
            }
        }
    }

    async fn configure_evaluate(
        &self,
        round: Round,
        parameters: &Parameters,
        client_manager: &ClientManager,
    ) -> Vec<(Arc<dyn ClientProxy>, EvaluateIns)> {
        if self.config.fraction_evaluate == 0.0 {
            return Vec::new();
        }

        let config = Self::round_config(&self.on_evaluate_config_fn, round);
        let (sample_size, min_num_clients) =
            self.num_evaluation_clients(client_manager.num_available());
        let clients = client_manager
            .sample(sample_size, min_num_clients, self.config.sample_timeout)
            .await;

        clients
            .into_iter()
            .map(|client| {
                let ins = EvaluateIns {
                    parameters: parameters.clone(),
                    config: config.clone(),
                };
                (client, ins)
            })
            .collect()
    }

    fn aggregate_evaluate(
        &self,
        round: Round,
        results: &[EvaluateResult],
        failures: &[Failure<EvaluateRes>],
    ) -> (Option<f64>, Metrics) {
        if results.is_empty() {
            return (None, Metrics::new());
        }
        if !self.config.accept_failures && !failures.is_empty() {
            return (None, Metrics::new());
        }

        let losses: Vec<(u64, f64)> = results
            .iter()
            .map(|(_, res)| (res.num_examples, res.loss))
            .collect();

        match weighted_loss_avg(&losses) {
            Ok(loss) => (Some(loss), Metrics::new()),
            Err(e) => {
                error!(round, error = %e, "aggregate_evaluate: cannot combine client results, discarding round");
                (None, Metrics::new())
            }
        }
    }

    fn evaluate(&self, round: Round, parameters: &Parameters) -> Option<(f64, Metrics)> {
        let evaluate_fn = self.evaluate_fn.as_ref()?;
        let weights = match parameters_to_ndarrays(parameters) {
            Ok(w) => w,
            Err(e) => {
                warn!(error = %e, "evaluate: undecodable global parameters");
                return None;
            }
        };
        evaluate_fn(round, weights.as_slice(), &Config::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Error;
    use crate::server::client_manager::tests::{stub, StubClient};

    fn fit_result(cid: &str, weights: Vec<Vec<f32>>, num_examples: u64) -> ClientResult {
        let client: Arc<dyn ClientProxy> =
            Arc::new(StubClient::new(cid, weights.clone(), num_examples));
        let res = FitRes {
            parameters: ndarrays_to_parameters(&weights),
            num_examples,
            metrics: Metrics::new(),
        };
        (client, res)
    }

    #[test]
    fn test_num_fit_clients() {
        let strategy = FedAvg::default();
        assert_eq!(strategy.num_fit_clients(0), (2, 2));
        assert_eq!(strategy.num_fit_clients(5), (5, 2));

        let strategy = FedAvg::new(FedAvgConfig {
            fraction_fit: 0.5,
            min_fit_clients: 1,
            ..Default::default()
        });
        assert_eq!(strategy.num_fit_clients(5), (2, 2));
    }

    #[test]
    fn test_aggregate_fit_weighted() {
        let strategy = FedAvg::default();
        let results = vec![
            fit_result("a", vec![vec![1.0, 1.0]], 10),
            fit_result("b", vec![vec![3.0, 5.0]], 30),
        ];

        let (params, metrics) = strategy.aggregate_fit(1, &results, &[]);
        let weights = parameters_to_ndarrays(&params.unwrap()).unwrap();
        assert!((weights[0][0] - 2.5).abs() < 1e-6);
        assert!((weights[0][1] - 4.0).abs() < 1e-6);
        assert!(metrics.is_empty());
    }

    #[test]
    fn test_aggregate_fit_shape_mismatch_discards_round() {
        let strategy = FedAvg::default();
        let results = vec![
            fit_result("a", vec![vec![1.0, 1.0]], 1),
            fit_result("b", vec![vec![3.0]], 1),
        ];

        let (params, metrics) = strategy.aggregate_fit(1, &results, &[]);
        assert!(params.is_none());
        assert!(metrics.is_empty());
    }

    #[test]
    fn test_aggregate_fit_zero_examples_discards_round() {
        let strategy = FedAvg::default();
        let results = vec![fit_result("a", vec![vec![1.0]], 0)];

        let (params, _) = strategy.aggregate_fit(1, &results, &[]);
        assert!(params.is_none());
    }

    #[test]
    fn test_aggregate_fit_empty_results() {
        let strategy = FedAvg::default();
        let (params, metrics) = strategy.aggregate_fit(1, &[], &[]);
        assert!(params.is_none());
        assert!(metrics.is_empty());
    }

    #[test]
    fn test_aggregate_fit_failures_rejected() {
        let strategy = FedAvg::new(FedAvgConfig {
            accept_failures: false,
            ..Default::default()
        });
        let results = vec![fit_result("a", vec![vec![1.0]], 1)];
        let failures = vec![Failure::Error(Error::Disconnected("b".to_string()))];

        let (params, _) = strategy.aggregate_fit(1, &results, &failures);
        assert!(params.is_none());
    }

    #[test]
    fn test_aggregate_fit_failures_accepted() {
        let strategy = FedAvg::default();
        let results = vec![fit_result("a", vec![vec![1.0]], 1)];
        let failures = vec![Failure::Error(Error::Disconnected("b".to_string()))];

        let (params, _) = strategy.aggregate_fit(1, &results, &failures);
        assert!(params.is_some());
    }

    #[test]
    fn test_aggregate_evaluate() {
        let strategy = FedAvg::default();
        let a: Arc<dyn ClientProxy> = stub("a");
        let b: Arc<dyn ClientProxy> = stub("b");
        let results = vec![
            (a, EvaluateRes { loss: 1.0, num_examples: 1, metrics: Metrics::new() }),
            (b, EvaluateRes { loss: 4.0, num_examples: 3, metrics: Metrics::new() }),
        ];

        let (loss, _) = strategy.aggregate_evaluate(1, &results, &[]);
        assert!((loss.unwrap() - 3.25).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_configure_fit_uses_round_config() {
        let strategy = FedAvg::default().with_fit_config(|round| {
            let mut config = Config::new();
            config.insert("round".to_string(), (round as i64).into());
            config
        });
        let manager = ClientManager::new();
        manager.register(stub("a"));
        manager.register(stub("b"));

        let instructions = strategy
            .configure_fit(3, &Parameters::empty(), &manager)
            .await;
        assert_eq!(instructions.len(), 2);
        for (_, ins) in &instructions {
            assert_eq!(ins.config["round"].as_int(), Some(3));
        }
    }

    #[tokio::test]
    async fn test_configure_evaluate_disabled() {
        let strategy = FedAvg::new(FedAvgConfig {
            fraction_evaluate: 0.0,
            ..Default::default()
        });
        let manager = ClientManager::new();
        manager.register(stub("a"));
        manager.register(stub("b"));

        let instructions = strategy
            .configure_evaluate(1, &Parameters::empty(), &manager)
            .await;
        assert!(instructions.is_empty());
    }

    #[test]
    fn test_centralized_evaluate() {
        let strategy = FedAvg::default();
        assert!(strategy.evaluate(0, &Parameters::empty()).is_none());

        let strategy = FedAvg::default().with_evaluate_fn(|_, weights, _| {
            Some((weights.len() as f64, Metrics::new()))
        });
        let params = ndarrays_to_parameters(&[vec![1.0], vec![2.0]]);
        assert_eq!(strategy.evaluate(0, &params).map(|(l, _)| l), Some(2.0));
    }
}
