//! Round-running federated server.

use crate::core::{Error, Metrics, Result, Round, Scalar};
use crate::federated::strategy::DEFAULT_SAMPLE_TIMEOUT;
use crate::federated::{ClientResult, EvaluateResult, Failure, Parameters, Strategy};
use crate::server::client_manager::ClientManager;
use crate::server::ClientProxy;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Server run configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Number of federated rounds
    pub num_rounds: u64,
    /// Per-request client timeout, in seconds
    pub round_timeout: Option<f64>,
}

impl ServerConfig {
    pub fn new(num_rounds: u64) -> Self {
        Self {
            num_rounds,
            round_timeout: None,
        }
    }

    /// Set a per-request client timeout.
    pub fn with_round_timeout(mut self, seconds: f64) -> Self {
        self.round_timeout = Some(seconds);
        self
    }

    fn timeout(&self) -> Option<Duration> {
        self.round_timeout.map(Duration::from_secs_f64)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::new(1)
    }
}

/// Losses and metrics collected over a run.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct History {
    pub losses_distributed: Vec<(Round, f64)>,
    pub losses_centralized: Vec<(Round, f64)>,
    pub metrics_distributed_fit: HashMap<String, Vec<(Round, Scalar)>>,
    pub metrics_distributed: HashMap<String, Vec<(Round, Scalar)>>,
    pub metrics_centralized: HashMap<String, Vec<(Round, Scalar)>>,
}

impl History {
    fn add_metrics(target: &mut HashMap<String, Vec<(Round, Scalar)>>, round: Round, metrics: Metrics) {
        for (key, value) in metrics {
            target.entry(key).or_default().push((round, value));
        }
    }

    /// Most recent distributed loss.
    pub fn last_distributed_loss(&self) -> Option<f64> {
        self.losses_distributed.last().map(|(_, loss)| *loss)
    }
}

/// Drives federated rounds over the clients of a client manager.
pub struct Server {
    client_manager: Arc<ClientManager>,
    strategy: Box<dyn Strategy>,
    parameters: Parameters,
}

impl Server {
    pub fn new(client_manager: Arc<ClientManager>, strategy: Box<dyn Strategy>) -> Self {
        Self {
            client_manager,
            strategy,
            parameters: Parameters::empty(),
        }
    }

    pub fn client_manager(&self) -> &Arc<ClientManager> {
        &self.client_manager
    }

    /// Current global parameters.
    pub fn parameters(&self) -> &Parameters {
        &self.parameters
    }

    /// Run `config.num_rounds` rounds of federated learning.
    pub async fn fit(&mut self, config: &ServerConfig) -> Result<History> {
        let timeout = config.timeout();
        let mut history = History::default();

        info!("initializing global parameters");
        self.parameters = self.initial_parameters(timeout).await?;

        info!("evaluating initial parameters");
        if let Some((loss, metrics)) = self.strategy.evaluate(0, &self.parameters) {
            info!(loss, "initial centralized evaluation");
            history.losses_centralized.push((0, loss));
            History::add_metrics(&mut history.metrics_centralized, 0, metrics);
        }

        let started = Instant::now();
        for round in 1..=config.num_rounds {
            if let Some((parameters, metrics)) = self.fit_round(round, timeout).await {
                self.parameters = parameters;
                History::add_metrics(&mut history.metrics_distributed_fit, round, metrics);
            }

            if let Some((loss, metrics)) = self.strategy.evaluate(round, &self.parameters) {
                info!(round, loss, elapsed = ?started.elapsed(), "centralized evaluation");
                history.losses_centralized.push((round, loss));
                History::add_metrics(&mut history.metrics_centralized, round, metrics);
            }

            if let Some((loss, metrics)) = self.evaluate_round(round, timeout).await {
                history.losses_distributed.push((round, loss));
                History::add_metrics(&mut history.metrics_distributed, round, metrics);
            }
        }

        info!(rounds = config.num_rounds, elapsed = ?started.elapsed(), "federated run finished");
        Ok(history)
    }

    async fn initial_parameters(&self, timeout: Option<Duration>) -> Result<Parameters> {
        if let Some(parameters) = self.strategy.initialize_parameters() {
            info!("using initial parameters provided by strategy");
            return Ok(parameters);
        }

        info!("requesting initial parameters from one random client");
        let client = self
            .client_manager
            .sample(1, 1, DEFAULT_SAMPLE_TIMEOUT)
            .await
            .pop()
            .ok_or_else(|| Error::Internal("No client available for initial parameters".to_string()))?;
        let parameters = client.get_parameters(timeout).await?;
        info!(cid = client.cid(), "received initial parameters");
        Ok(parameters)
    }

    /// Perform one round of federated training.
    pub async fn fit_round(&self, round: Round, timeout: Option<Duration>) -> Option<(Parameters, Metrics)> {
        let instructions = self
            .strategy
            .configure_fit(round, &self.parameters, &self.client_manager)
            .await;
        if instructions.is_empty() {
            info!(round, "fit_round: no clients selected, cancel");
            return None;
        }
        info!(round, clients = instructions.len(), available = self.client_manager.num_available(), "fit_round: strategy sampled clients");

        let replies = join_all(instructions.into_iter().map(|(client, ins)| async move {
            let res = client.fit(ins, timeout).await;
            (client, res)
        }))
        .await;

        let (results, failures): (Vec<ClientResult>, Vec<Failure<_>>) = self.partition(replies);
        info!(round, results = results.len(), failures = failures.len(), "fit_round received");

        let (parameters, metrics) = self.strategy.aggregate_fit(round, &results, &failures);
        parameters.map(|p| (p, metrics))
    }

    /// Perform one round of federated evaluation.
    pub async fn evaluate_round(&self, round: Round, timeout: Option<Duration>) -> Option<(f64, Metrics)> {
        let instructions = self
            .strategy
            .configure_evaluate(round, &self.parameters, &self.client_manager)
            .await;
        if instructions.is_empty() {
            info!(round, "evaluate_round: no clients selected, cancel");
            return None;
        }

        let replies = join_all(instructions.into_iter().map(|(client, ins)| async move {
            let res = client.evaluate(ins, timeout).await;
            (client, res)
        }))
        .await;

        let (results, failures): (Vec<EvaluateResult>, Vec<Failure<_>>) = self.partition(replies);
        info!(round, results = results.len(), failures = failures.len(), "evaluate_round received");

        let (loss, metrics) = self.strategy.aggregate_evaluate(round, &results, &failures);
        loss.map(|l| (l, metrics))
    }

    fn partition<R>(
        &self,
        replies: Vec<(Arc<dyn ClientProxy>, Result<R>)>,
    ) -> (Vec<(Arc<dyn ClientProxy>, R)>, Vec<Failure<R>>) {
        let mut results = Vec::new();
        let mut failures = Vec::new();

        for (client, reply) in replies {
            match reply {
                Ok(res) => results.push((client, res)),
                Err(e) => {
                    warn!(cid = client.cid(), error = %e, "client call failed");
                    // The stream may be out of sync after any of these.
                    if matches!(
                        e,
                        Error::Disconnected(_) | Error::Io(_) | Error::Timeout(_) | Error::Protocol(_)
                    ) {
                        self.client_manager.unregister(client.cid());
                    }
                    failures.push(Failure::Error(e));
                }
            }
        }

        (results, failures)
    }

    /// Tell every connected client that the run is over.
    pub async fn disconnect_all_clients(&self) {
        let clients = self.client_manager.all();
        join_all(clients.iter().map(|client| async move {
            if let Err(e) = client.reconnect(None).await {
                warn!(cid = client.cid(), error = %e, "failed to send reconnect");
            }
        }))
        .await;
        for client in clients {
            self.client_manager.unregister(client.cid());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::federated::{ndarrays_to_parameters, parameters_to_ndarrays, FedAvg, FedAvgConfig};
    use crate::server::client_manager::tests::StubClient;

    fn manager_with(clients: Vec<StubClient>) -> Arc<ClientManager> {
        let manager = Arc::new(ClientManager::new());
        for client in clients {
            manager.register(Arc::new(client));
        }
        manager
    }

    fn quick_fedavg() -> FedAvg {
        FedAvg::new(FedAvgConfig {
            sample_timeout: Duration::from_millis(50),
            ..Default::default()
        })
    }

    #[tokio::test]
    async fn test_fit_runs_all_rounds() {
        let mut a = StubClient::new("a", vec![vec![1.0, 1.0]], 1);
        a.loss = 2.0;
        let mut b = StubClient::new("b", vec![vec![3.0, 5.0]], 3);
        b.loss = 6.0;
        let manager = manager_with(vec![a, b]);

        let mut server = Server::new(manager, Box::new(quick_fedavg()));
        let history = server.fit(&ServerConfig::new(3)).await.unwrap();

        let weights = parameters_to_ndarrays(server.parameters()).unwrap();
        assert_eq!(weights, vec![vec![2.5, 4.0]]);
        assert_eq!(history.losses_distributed.len(), 3);
        assert_eq!(history.losses_distributed[0].0, 1);
        // (2*1 + 6*3) / 4
        assert!((history.last_distributed_loss().unwrap() - 5.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_initial_parameters_from_strategy() {
        let manager = manager_with(vec![]);
        let strategy = quick_fedavg().with_initial_parameters(ndarrays_to_parameters(&[vec![9.0]]));

        let mut server = Server::new(manager, Box::new(strategy));
        let history = server.fit(&ServerConfig::new(1)).await.unwrap();

        // No clients: the round is skipped and the initial parameters stay.
        assert_eq!(parameters_to_ndarrays(server.parameters()).unwrap(), vec![vec![9.0]]);
        assert!(history.losses_distributed.is_empty());
    }

    #[tokio::test]
    async fn test_failed_client_is_unregistered() {
        let a = StubClient::new("a", vec![vec![1.0]], 1);
        let mut b = StubClient::new("b", vec![vec![3.0]], 1);
        b.fail = true;
        let manager = manager_with(vec![a, b]);
        let strategy = quick_fedavg().with_initial_parameters(ndarrays_to_parameters(&[vec![0.0]]));

        let server = Server::new(manager.clone(), Box::new(strategy));
        let (parameters, _) = server.fit_round(1, None).await.unwrap();

        // Failures are accepted by default; only "a" contributes.
        assert_eq!(parameters_to_ndarrays(&parameters).unwrap(), vec![vec![1.0]]);
        assert_eq!(manager.num_available(), 1);
    }

    #[tokio::test]
    async fn test_centralized_evaluation_recorded() {
        let manager = manager_with(vec![
            StubClient::new("a", vec![vec![1.0]], 1),
            StubClient::new("b", vec![vec![1.0]], 1),
        ]);
        let strategy = quick_fedavg().with_evaluate_fn(|round, _, _| Some((round as f64, Metrics::new())));

        let mut server = Server::new(manager, Box::new(strategy));
        let history = server.fit(&ServerConfig::new(2)).await.unwrap();

        assert_eq!(history.losses_centralized, vec![(0, 0.0), (1, 1.0), (2, 2.0)]);
    }

    #[tokio::test]
    async fn test_disconnect_all_clients() {
        let manager = manager_with(vec![StubClient::new("a", vec![vec![1.0]], 1)]);
        let server = Server::new(manager.clone(), Box::new(quick_fedavg()));

        server.disconnect_all_clients().await;
        assert_eq!(manager.num_available(), 0);
    }
}
