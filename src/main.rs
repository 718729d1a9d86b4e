use clap::{Parser, Subcommand};
use fedsave::model::MobileModel;
use fedsave::runner::{serve_with, Dispatcher, LineConnection, RunConfig, ServerLauncher};
use fedsave::{Error, Result};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "fedsave")]
#[command(about = "Federated averaging server that saves aggregated weights into mobile models", long_about = None)]
struct Cli {
    /// JSON run configuration
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Override the listening port
    #[arg(long, global = true)]
    port: Option<u16>,
    /// Override the number of rounds
    #[arg(long, global = true)]
    rounds: Option<u64>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Answer JSON-line commands on stdin (`ping`, `server`) until EOF or Ctrl-C
    Run,

    /// Run the federated server once and exit
    Serve {
        /// JSON model descriptor; aggregated weights are saved into it
        #[arg(long)]
        model: Option<PathBuf>,
    },
}

impl Cli {
    fn run_config(&self) -> Result<RunConfig> {
        let mut config = match &self.config {
            Some(path) => RunConfig::from_file(path)?,
            None => RunConfig::default(),
        };
        if let Some(port) = self.port {
            config = config.with_port(port);
        }
        if let Some(rounds) = self.rounds {
            config = config.with_rounds(rounds);
        }
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // stdout carries replies; logs go to stderr.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = cli.run_config()?;

    match cli.command {
        Commands::Run => {
            let dispatcher = Dispatcher::new(ServerLauncher::new(config));
            let mut channel = LineConnection::stdio();
            match dispatcher.run(&mut channel, tokio::signal::ctrl_c()).await {
                Err(Error::ChannelClosed) => tracing::info!("control channel closed"),
                other => other?,
            }
        }
        Commands::Serve { model } => {
            let model = model.as_deref().map(MobileModel::from_descriptor).transpose()?;
            let history = serve_with(&config, model).await?;
            tracing::info!(
                final_loss = history.last_distributed_loss(),
                "run complete"
            );
        }
    }

    Ok(())
}
