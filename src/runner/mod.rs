//! Runner Module
//!
//! Command-driven entry point for the federated server:
//! - Run configuration and server bootstrap
//! - Control-channel frames and transports
//! - Dispatcher answering `ping` and `server` commands

pub mod bootstrap;
pub mod command;
pub mod config;
pub mod connection;
pub mod dispatcher;

pub use bootstrap::{build_strategy, fit_config, serve_with, server, Launcher, ServerLauncher};
pub use command::{Command, Reply};
pub use config::RunConfig;
pub use connection::{pipe, Connection, LineConnection, Pipe};
pub use dispatcher::Dispatcher;
