//! Server/client wire protocol.
//!
//! One JSON object per line over a TCP stream. The server sends an
//! instruction and the client answers with exactly one reply.

use crate::core::{Config, Error, Metrics, Result};
use crate::federated::Parameters;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

/// Messages sent by the server.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ServerMessage {
    /// Ask the client for its current local parameters
    GetParameters,
    /// Train on the given parameters
    Fit {
        parameters: Parameters,
        config: Config,
    },
    /// Evaluate the given parameters
    Evaluate {
        parameters: Parameters,
        config: Config,
    },
    /// The run is over; the client should hang up and may reconnect later
    Reconnect { seconds: Option<u64> },
}

/// Messages sent by the client.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ClientMessage {
    Parameters {
        parameters: Parameters,
    },
    FitRes {
        parameters: Parameters,
        num_examples: u64,
        #[serde(default)]
        metrics: Metrics,
    },
    EvaluateRes {
        loss: f64,
        num_examples: u64,
        #[serde(default)]
        metrics: Metrics,
    },
    Disconnect {
        reason: String,
    },
}

/// Write one message as a JSON line.
pub async fn write_message<W, T>(writer: &mut W, message: &T) -> Result<()>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let mut line = serde_json::to_string(message)?;
    line.push('\n');
    writer.write_all(line.as_bytes()).await?;
    writer.flush().await?;
    Ok(())
}

/// Read the next JSON line, skipping blank lines. `None` on end of stream.
pub async fn read_message<R, T>(reader: &mut R) -> Result<Option<T>>
where
    R: AsyncBufRead + Unpin,
    T: for<'de> Deserialize<'de>,
{
    loop {
        let mut line = String::new();
        let n = reader.read_line(&mut line).await?;
        if n == 0 {
            return Ok(None);
        }

        let raw = line.trim();
        if raw.is_empty() {
            continue;
        }

        return serde_json::from_str(raw)
            .map(Some)
            .map_err(|e| Error::Protocol(format!("{} | raw: {}", e, raw)));
    }
}
