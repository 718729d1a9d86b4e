//! Server Module
//!
//! Runs federated rounds against remote clients:
//! - Client registry and sampling
//! - Client proxies over TCP
//! - Line-delimited JSON wire protocol
//! - Round loop with loss/metrics history

pub mod app;
pub mod client_manager;
pub mod client_proxy;
pub mod protocol;
pub mod server;

pub use app::{serve, start_server};
pub use client_manager::ClientManager;
pub use client_proxy::{ClientProxy, TcpClientProxy};
pub use server::{History, Server, ServerConfig};
