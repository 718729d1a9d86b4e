//! Strategy decorator that persists aggregated parameters.
//!
//! Wraps a base strategy; whenever the base produces new global
//! parameters for a round, they are also written to the configured
//! persistence target.

use crate::core::{Metrics, NDArray, Round};
use crate::federated::parameters::{parameters_to_ndarrays, Parameters};
use crate::federated::strategy::{FedAvg, Strategy};
use crate::federated::typing::{
    ClientResult, EvaluateIns, EvaluateRes, EvaluateResult, Failure, FitIns, FitRes,
};
use crate::model::{MobileModel, Persister};
use crate::server::{ClientManager, ClientProxy};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{error, info};

/// A strategy that saves every aggregated parameter set.
pub struct SavingStrategy<S = FedAvg> {
    inner: S,
    target: Option<Arc<dyn Persister>>,
}

impl<S: Strategy> SavingStrategy<S> {
    /// Wrap a strategy without a persistence target.
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            target: None,
        }
    }

    /// Persist into the given mobile model, if any.
    pub fn with_model(mut self, model: Option<MobileModel>) -> Self {
        self.target = model.map(|m| Arc::new(m) as Arc<dyn Persister>);
        self
    }

    /// Persist through an arbitrary target.
    pub fn with_persister(mut self, target: Arc<dyn Persister>) -> Self {
        self.target = Some(target);
        self
    }

    /// The wrapped strategy.
    pub fn inner(&self) -> &S {
        &self.inner
    }

    /// Persist aggregated arrays. Failures are logged, never returned.
    pub fn save_params(&self, params: &[NDArray]) {
        let Some(target) = &self.target else {
            // No model corresponds to these parameters.
            return;
        };

        info!(tensors = params.len(), "saving aggregated parameters");
        if let Err(e) = target.persist(params) {
            error!(error = %e, "failed to save aggregated parameters");
        }
    }
}

#[async_trait]
impl<S: Strategy> Strategy for SavingStrategy<S> {
    fn initialize_parameters(&self) -> Option<Parameters> {
        self.inner.initialize_parameters()
    }

    async fn configure_fit(
        &self,
        round: Round,
        parameters: &Parameters,
        client_manager: &ClientManager,
    ) -> Vec<(Arc<dyn ClientProxy>, FitIns)> {
        self.inner.configure_fit(round, parameters, client_manager).await
    }

    fn aggregate_fit(
        &self,
        round: Round,
        results: &[ClientResult],
        failures: &[Failure<FitRes>],
    ) -> (Option<Parameters>, Metrics) {
        let (aggregated, metrics) = self.inner.aggregate_fit(round, results, failures);

        if let Some(parameters) = &aggregated {
            match parameters_to_ndarrays(parameters) {
                Ok(arrays) => self.save_params(&arrays),
                Err(e) => error!(round, error = %e, "cannot decode aggregated parameters for saving"),
            }
        }

        (aggregated, metrics)
    }

    async fn configure_evaluate(
        &self,
        round: Round,
        parameters: &Parameters,
        client_manager: &ClientManager,
    ) -> Vec<(Arc<dyn ClientProxy>, EvaluateIns)> {
        self.inner
            .configure_evaluate(round, parameters, client_manager)
            .await
    }

    fn aggregate_evaluate(
        &self,
        round: Round,
        results: &[EvaluateResult],
        failures: &[Failure<EvaluateRes>],
    ) -> (Option<f64>, Metrics) {
        self.inner.aggregate_evaluate(round, results, failures)
    }

    fn evaluate(&self, round: Round, parameters: &Parameters) -> Option<(f64, Metrics)> {
        self.inner.evaluate(round, parameters)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Error, Result};
    use crate::federated::parameters::ndarrays_to_parameters;
    use crate::federated::strategy::FedAvgConfig;
    use crate::model::TensorSpec;
    use crate::server::client_manager::tests::StubClient;
    use std::sync::Mutex;

    /// Records every persisted parameter set.
    #[derive(Default)]
    struct Recorder {
        saved: Mutex<Vec<Vec<NDArray>>>,
        fail: bool,
    }

    impl Persister for Recorder {
        fn persist(&self, params: &[NDArray]) -> Result<()> {
            self.saved.lock().unwrap().push(params.to_vec());
            if self.fail {
                return Err(Error::Persistence("disk full".to_string()));
            }
            Ok(())
        }
    }

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
    fn test_aggregate_fit_persists_weighted_average() {
        let recorder = Arc::new(Recorder::default());
        let strategy = SavingStrategy::new(FedAvg::default()).with_persister(recorder.clone());
        let results = vec![
            fit_result("a", vec![vec![1.0, 2.0], vec![0.0]], 1),
            fit_result("b", vec![vec![3.0, 6.0], vec![4.0]], 3),
        ];

        let (params, metrics) = strategy.aggregate_fit(1, &results, &[]);
        let returned = parameters_to_ndarrays(&params.unwrap()).unwrap();
        assert_eq!(returned, vec![vec![2.5, 5.0], vec![3.0]]);
        assert!(metrics.is_empty());

        let saved = recorder.saved.lock().unwrap();
        assert_eq!(saved.len(), 1);
        assert_eq!(saved[0], returned);
    }

    #[test]
    fn test_no_persistence_without_results() {
        let recorder = Arc::new(Recorder::default());
        let strategy = SavingStrategy::new(FedAvg::default()).with_persister(recorder.clone());

        let (params, metrics) = strategy.aggregate_fit(1, &[], &[]);
        assert!(params.is_none());
        assert!(metrics.is_empty());
        assert!(recorder.saved.lock().unwrap().is_empty());
    }

    #[test]
    fn test_no_persistence_when_failures_rejected() {
        let recorder = Arc::new(Recorder::default());
        let base = FedAvg::new(FedAvgConfig {
            accept_failures: false,
            ..Default::default()
        });
        let strategy = SavingStrategy::new(base).with_persister(recorder.clone());
        let results = vec![fit_result("a", vec![vec![1.0]], 1)];
        let failures = vec![Failure::Error(Error::Timeout(std::time::Duration::from_secs(1)))];

        let (params, _) = strategy.aggregate_fit(1, &results, &failures);
        assert!(params.is_none());
        assert!(recorder.saved.lock().unwrap().is_empty());
    }

    #[test]
    fn test_persistence_failure_does_not_change_result() {
        let recorder = Arc::new(Recorder {
            fail: true,
            ..Default::default()
        });
        let strategy = SavingStrategy::new(FedAvg::default()).with_persister(recorder.clone());
        let results = vec![fit_result("a", vec![vec![1.0]], 1)];

        let (params, _) = strategy.aggregate_fit(1, &results, &[]);
        assert_eq!(parameters_to_ndarrays(&params.unwrap()).unwrap(), vec![vec![1.0]]);
        assert_eq!(recorder.saved.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_aggregate_fit_without_target_still_aggregates() {
        let strategy = SavingStrategy::new(FedAvg::default()).with_model(None);
        let results = vec![fit_result("a", vec![vec![2.0]], 1)];

        let (params, _) = strategy.aggregate_fit(1, &results, &[]);
        assert_eq!(parameters_to_ndarrays(&params.unwrap()).unwrap(), vec![vec![2.0]]);
    }

    #[test]
    fn test_save_params_without_model_is_noop() {
        let strategy = SavingStrategy::new(FedAvg::default()).with_model(None);
        strategy.save_params(&[vec![1.0, 2.0]]);
    }

    #[test]
    fn test_save_params_swallows_shape_error() {
        let path = std::env::temp_dir().join(format!("fedsave-{}.bin", uuid::Uuid::new_v4()));
        let model = MobileModel::new("m", path.clone(), vec![TensorSpec::new("w", &[3])]);
        let strategy = SavingStrategy::new(FedAvg::default()).with_model(Some(model));

        strategy.save_params(&[vec![1.0]]);
        assert!(!path.exists());
    }

    #[test]
    fn test_save_params_writes_model() {
        let path = std::env::temp_dir().join(format!("fedsave-{}.bin", uuid::Uuid::new_v4()));
        let model = MobileModel::new("m", path.clone(), vec![TensorSpec::new("w", &[2])]);
        let strategy = SavingStrategy::new(FedAvg::default()).with_model(Some(model.clone()));

        strategy.save_params(&[vec![1.0, 2.0]]);
        assert_eq!(model.load_weights().unwrap().ndarrays(), vec![vec![1.0, 2.0]]);

        std::fs::remove_file(&path).unwrap();
    }
}
