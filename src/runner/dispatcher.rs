//! Command dispatcher.
//!
//! Reads one command at a time from a control channel, acts on it and
//! answers with exactly one reply. A `server` command blocks the loop
//! until the federated run finishes.

use crate::core::Result;
use crate::model::MobileModel;
use crate::runner::bootstrap::Launcher;
use crate::runner::command::{Command, Reply};
use crate::runner::connection::Connection;
use serde_json::Value;
use std::future::Future;
use tracing::{error, info, warn};

/// Serves commands from a control channel.
pub struct Dispatcher<L> {
    launcher: L,
}

impl<L: Launcher> Dispatcher<L> {
    /// Create a dispatcher that starts servers through `launcher`
    pub fn new(launcher: L) -> Self {
        Self { launcher }
    }

    pub fn launcher(&self) -> &L {
        &self.launcher
    }

    /// Handle a single command and send its reply.
    ///
    /// Errors from the channel or from the server run are returned and no
    /// reply is sent.
    pub async fn execute<C>(&self, conn: &mut C) -> Result<Reply>
    where
        C: Connection + ?Sized,
    {
        let Command { kind, payload } = conn.recv().await?;

        let reply = match kind.as_str() {
            "ping" => {
                info!(message = %payload, "ping received");
                Reply::Pong
            }
            "server" => {
                info!(payload = %payload, "server requested");
                self.launcher.launch(model_from_payload(&payload)).await?;
                Reply::Done
            }
            _ => {
                error!(kind = %kind, payload = %payload, "unknown command");
                Reply::CannotUnderstand
            }
        };

        conn.send(reply).await?;
        Ok(reply)
    }

    /// Serve commands until `shutdown` resolves or the channel fails.
    ///
    /// Resolving `shutdown` ends the loop cleanly, including while a
    /// command is waited for or a server run is in progress.
    pub async fn run<C, F>(&self, conn: &mut C, shutdown: F) -> Result<()>
    where
        C: Connection + ?Sized,
        F: Future,
    {
        warn!("Runner started.");
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                biased;
                _ = &mut shutdown => {
                    info!("runner interrupted, exiting");
                    return Ok(());
                }
                res = self.execute(&mut *conn) => {
                    res?;
                }
            }
        }
    }
}

/// A model descriptor enables persistence; anything else runs without one.
fn model_from_payload(payload: &Value) -> Option<MobileModel> {
    if payload.is_null() {
        return None;
    }
    match serde_json::from_value(payload.clone()) {
        Ok(model) => Some(model),
        Err(e) => {
            error!(payload = %payload, error = %e, "unknown argument for federated server, running without a model");
            None
        }
    }
}
