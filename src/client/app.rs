//! Client entry point: connect to a server and answer its instructions.

use crate::client::interface::Client;
use crate::core::{Error, Result};
use crate::federated::{ndarrays_to_parameters, parameters_to_ndarrays};
use crate::server::protocol::{read_message, write_message, ClientMessage, ServerMessage};
use tokio::io::BufReader;
use tokio::net::{TcpStream, ToSocketAddrs};
use tracing::{debug, info, warn};

/// Connect to a server and serve instructions until it sends `Reconnect`.
///
/// A client error is reported to the server as `Disconnect` and then
/// returned.
pub async fn start_client<A, C>(address: A, mut client: C) -> Result<()>
where
    A: ToSocketAddrs,
    C: Client,
{
    let stream = TcpStream::connect(address).await?;
    let server = stream.peer_addr()?;
    info!(server = %server, "connected to federated server");

    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);

    loop {
        let message: ServerMessage = match read_message(&mut reader).await? {
            Some(message) => message,
            None => return Err(Error::Disconnected(server.to_string())),
        };

        let reply = match message {
            ServerMessage::Reconnect { seconds } => {
                info!(?seconds, "server ended the run");
                return Ok(());
            }
            ServerMessage::GetParameters => client
                .get_parameters()
                .map(|w| ClientMessage::Parameters {
                    parameters: ndarrays_to_parameters(&w),
                }),
            ServerMessage::Fit { parameters, config } => parameters_to_ndarrays(&parameters)
                .and_then(|w| client.fit(w, &config))
                .map(|outcome| {
                    debug!(num_examples = outcome.num_examples, "local fit finished");
                    ClientMessage::FitRes {
                        parameters: ndarrays_to_parameters(&outcome.parameters),
                        num_examples: outcome.num_examples,
                        metrics: outcome.metrics,
                    }
                }),
            ServerMessage::Evaluate { parameters, config } => parameters_to_ndarrays(&parameters)
                .and_then(|w| client.evaluate(w, &config))
                .map(|outcome| ClientMessage::EvaluateRes {
                    loss: outcome.loss,
                    num_examples: outcome.num_examples,
                    metrics: outcome.metrics,
                }),
        };

        match reply {
            Ok(reply) => write_message(&mut writer, &reply).await?,
            Err(e) => {
                warn!(error = %e, "client failed, disconnecting");
                let reason = e.to_string();
                write_message(&mut writer, &ClientMessage::Disconnect { reason }).await?;
                return Err(e);
            }
        }
    }
}
