//! Server entry point: accept clients and run rounds.

use crate::core::{Error, Result};
use crate::federated::Strategy;
use crate::server::client_manager::ClientManager;
use crate::server::client_proxy::TcpClientProxy;
use crate::server::server::{History, Server, ServerConfig};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::task::JoinSet;
use tracing::{info, warn};
use uuid::Uuid;

/// Bind `address` and run a federated server to completion.
pub async fn start_server<S>(address: SocketAddr, config: ServerConfig, strategy: S) -> Result<History>
where
    S: Strategy + 'static,
{
    let listener = TcpListener::bind(address)
        .await
        .map_err(|e| Error::Transport(format!("cannot bind {}: {}", address, e)))?;
    serve(listener, config, strategy).await
}

/// Run a federated server on an already bound listener.
pub async fn serve<S>(listener: TcpListener, config: ServerConfig, strategy: S) -> Result<History>
where
    S: Strategy + 'static,
{
    let local = listener.local_addr()?;
    info!(address = %local, rounds = config.num_rounds, "starting federated server");

    let client_manager = Arc::new(ClientManager::new());
    // Dropping the set aborts the accept loop and releases the listener,
    // including when this future is cancelled mid-run.
    let mut accept_loop = JoinSet::new();
    accept_loop.spawn(accept_clients(listener, client_manager.clone()));

    let mut server = Server::new(client_manager, Box::new(strategy));
    let history = server.fit(&config).await;

    accept_loop.shutdown().await;
    server.disconnect_all_clients().await;
    info!(address = %local, "federated server stopped");

    history
}

async fn accept_clients(listener: TcpListener, client_manager: Arc<ClientManager>) {
    loop {
        let (stream, peer) = match listener.accept().await {
            Ok(conn) => conn,
            Err(e) => {
                warn!(error = %e, "accept failed");
                continue;
            }
        };

        let cid = Uuid::new_v4().to_string();
        match TcpClientProxy::new(&cid, stream) {
            Ok(proxy) => {
                info!(cid = %cid, peer = %peer, "client connected");
                client_manager.register(Arc::new(proxy));
            }
            Err(e) => warn!(peer = %peer, error = %e, "dropping client connection"),
        }
    }
}
