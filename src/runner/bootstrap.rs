//! Server bootstrap.
//!
//! Wires the saving FedAvg strategy to the server and runs it to
//! completion.

use crate::core::{Config, Result, Round};
use crate::federated::{FedAvg, SavingStrategy};
use crate::model::MobileModel;
use crate::runner::config::RunConfig;
use crate::server::{start_server, History};
use async_trait::async_trait;
use tracing::info;

/// Local batch size sent to clients.
pub const BATCH_SIZE: i64 = 32;

/// Local epochs per round sent to clients.
pub const LOCAL_EPOCHS: i64 = 5;

/// Training configuration for a round. Identical for every round.
pub fn fit_config(_round: Round) -> Config {
    let mut config = Config::new();
    config.insert("batch_size".to_string(), BATCH_SIZE.into());
    config.insert("local_epochs".to_string(), LOCAL_EPOCHS.into());
    config
}

/// Build the strategy for one run.
pub fn build_strategy(config: &RunConfig, model: Option<MobileModel>) -> SavingStrategy<FedAvg> {
    let base = FedAvg::new(config.fedavg_config()).with_fit_config(fit_config);
    SavingStrategy::new(base).with_model(model)
}

/// Run the server with the default configuration.
///
/// Completes only after all rounds have run. Without a model, aggregated
/// weights are not persisted.
pub async fn server(model: Option<MobileModel>) -> Result<History> {
    serve_with(&RunConfig::default(), model).await
}

/// Run the server with an explicit configuration.
pub async fn serve_with(config: &RunConfig, model: Option<MobileModel>) -> Result<History> {
    config.validate()?;
    info!(
        address = %config.address(),
        rounds = config.num_rounds,
        model = model.as_ref().map(|m| m.name.as_str()),
        "bootstrapping federated server"
    );

    let strategy = build_strategy(config, model);
    start_server(config.address(), config.server_config(), strategy).await
}

/// Something that can run the federated server on request.
#[async_trait]
pub trait Launcher: Send + Sync {
    /// Run the server once, returning when it has finished.
    async fn launch(&self, model: Option<MobileModel>) -> Result<()>;
}

/// Launches the real TCP server.
#[derive(Clone, Debug, Default)]
pub struct ServerLauncher {
    config: RunConfig,
}

impl ServerLauncher {
    pub fn new(config: RunConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }
}

#[async_trait]
impl Launcher for ServerLauncher {
    async fn launch(&self, model: Option<MobileModel>) -> Result<()> {
        let history = serve_with(&self.config, model).await?;
        info!(
            final_loss = history.last_distributed_loss(),
            rounds_evaluated = history.losses_distributed.len(),
            "federated server finished"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Scalar;
    use crate::federated::Strategy;

    #[test]
    fn test_fit_config_constant_across_rounds() {
        for round in [0, 1, 2, 3, 10, u64::MAX] {
            let config = fit_config(round);
            assert_eq!(config.len(), 2);
            assert_eq!(config["batch_size"], Scalar::Int(32));
            assert_eq!(config["local_epochs"], Scalar::Int(5));
        }
    }

    #[test]
    fn test_build_strategy_policy() {
        let strategy = build_strategy(&RunConfig::default(), None);
        let base = strategy.inner();

        assert_eq!(base.config.fraction_fit, 1.0);
        assert_eq!(base.config.fraction_evaluate, 1.0);
        assert_eq!(base.config.min_fit_clients, 2);
        assert_eq!(base.config.min_evaluate_clients, 2);
        assert_eq!(base.config.min_available_clients, 2);
        assert!(strategy.initialize_parameters().is_none());
        assert!(strategy.evaluate(0, &crate::federated::Parameters::empty()).is_none());
    }

    #[tokio::test]
    async fn test_invalid_config_is_rejected_before_binding() {
        let config = RunConfig {
            min_available_clients: 0,
            ..Default::default()
        };
        assert!(serve_with(&config, None).await.is_err());
    }
}
