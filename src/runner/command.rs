//! Control-channel frames.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// A command received on the control channel.
///
/// `payload` is free-form; its meaning depends on `kind`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Command {
    pub kind: String,
    #[serde(default)]
    pub payload: Value,
}

impl Command {
    /// Create a command
    pub fn new(kind: impl Into<String>, payload: Value) -> Self {
        Self {
            kind: kind.into(),
            payload,
        }
    }

    /// Liveness probe carrying an arbitrary message
    pub fn ping(message: impl Into<Value>) -> Self {
        Self::new("ping", message.into())
    }

    /// Request a server run, optionally bound to a model
    pub fn server(payload: Value) -> Self {
        Self::new("server", payload)
    }
}

/// Reply sent back for every command.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Reply {
    #[serde(rename = "pong")]
    Pong,
    #[serde(rename = "done")]
    Done,
    #[serde(rename = "cannot understand")]
    CannotUnderstand,
}

impl Reply {
    pub fn as_str(&self) -> &'static str {
        match self {
            Reply::Pong => "pong",
            Reply::Done => "done",
            Reply::CannotUnderstand => "cannot understand",
        }
    }
}

impl fmt::Display for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
