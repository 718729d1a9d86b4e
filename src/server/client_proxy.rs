//! Server-side handles to connected clients.

use crate::core::{Error, Result};
use crate::federated::{EvaluateIns, EvaluateRes, FitIns, FitRes, Parameters};
use crate::server::protocol::{read_message, write_message, ClientMessage, ServerMessage};
use async_trait::async_trait;
use std::fmt;
use std::time::Duration;
use tokio::io::BufReader;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::Mutex;

/// A handle the server uses to talk to one client.
#[async_trait]
pub trait ClientProxy: Send + Sync + fmt::Debug {
    /// Client identifier, unique within a client manager.
    fn cid(&self) -> &str;

    /// Fetch the client's current local parameters.
    async fn get_parameters(&self, timeout: Option<Duration>) -> Result<Parameters>;

    /// Train on the given parameters.
    async fn fit(&self, ins: FitIns, timeout: Option<Duration>) -> Result<FitRes>;

    /// Evaluate the given parameters.
    async fn evaluate(&self, ins: EvaluateIns, timeout: Option<Duration>) -> Result<EvaluateRes>;

    /// Tell the client the run is over.
    async fn reconnect(&self, seconds: Option<u64>) -> Result<()>;
}

struct Connection {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
}

/// Client proxy over one TCP connection.
///
/// Requests are strictly sequential: the connection lock is held from
/// sending an instruction until its reply has been read.
pub struct TcpClientProxy {
    cid: String,
    peer: String,
    conn: Mutex<Connection>,
}

impl TcpClientProxy {
    /// Wrap an accepted stream.
    pub fn new(cid: &str, stream: TcpStream) -> Result<Self> {
        let peer = stream.peer_addr()?.to_string();
        let (reader, writer) = stream.into_split();
        Ok(Self {
            cid: cid.to_string(),
            peer,
            conn: Mutex::new(Connection {
                reader: BufReader::new(reader),
                writer,
            }),
        })
    }

    /// Remote address of the client.
    pub fn peer(&self) -> &str {
        &self.peer
    }

    async fn request(&self, message: ServerMessage, timeout: Option<Duration>) -> Result<ClientMessage> {
        let exchange = async {
            let mut conn = self.conn.lock().await;
            write_message(&mut conn.writer, &message).await?;
            match read_message::<_, ClientMessage>(&mut conn.reader).await? {
                Some(ClientMessage::Disconnect { reason }) => Err(Error::Disconnected(format!(
                    "{} ({})",
                    self.cid, reason
                ))),
                Some(reply) => Ok(reply),
                None => Err(Error::Disconnected(self.cid.clone())),
            }
        };

        match timeout {
            Some(limit) => tokio::time::timeout(limit, exchange)
                .await
                .map_err(|_| Error::Timeout(limit))?,
            None => exchange.await,
        }
    }
}

impl fmt::Debug for TcpClientProxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TcpClientProxy")
            .field("cid", &self.cid)
            .field("peer", &self.peer)
            .finish()
    }
}

fn unexpected(expected: &str, got: ClientMessage) -> Error {
    Error::Protocol(format!("expected {}, got {:?}", expected, got))
}

#[async_trait]
impl ClientProxy for TcpClientProxy {
    fn cid(&self) -> &str {
        &self.cid
    }

    async fn get_parameters(&self, timeout: Option<Duration>) -> Result<Parameters> {
        match self.request(ServerMessage::GetParameters, timeout).await? {
            ClientMessage::Parameters { parameters } => Ok(parameters),
            other => Err(unexpected("Parameters", other)),
        }
    }

    async fn fit(&self, ins: FitIns, timeout: Option<Duration>) -> Result<FitRes> {
        let message = ServerMessage::Fit {
            parameters: ins.parameters,
            config: ins.config,
        };
        match self.request(message, timeout).await? {
            ClientMessage::FitRes {
                parameters,
                num_examples,
                metrics,
            } => Ok(FitRes {
                parameters,
                num_examples,
                metrics,
            }),
            other => Err(unexpected("FitRes", other)),
        }
    }

    async fn evaluate(&self, ins: EvaluateIns, timeout: Option<Duration>) -> Result<EvaluateRes> {
        let message = ServerMessage::Evaluate {
            parameters: ins.parameters,
            config: ins.config,
        };
        match self.request(message, timeout).await? {
            ClientMessage::EvaluateRes {
                loss,
                num_examples,
                metrics,
            } => Ok(EvaluateRes {
                loss,
                num_examples,
                metrics,
            }),
            other => Err(unexpected("EvaluateRes", other)),
        }
    }

    async fn reconnect(&self, seconds: Option<u64>) -> Result<()> {
        let mut conn = self.conn.lock().await;
        write_message(&mut conn.writer, &ServerMessage::Reconnect { seconds }).await
    }
}
