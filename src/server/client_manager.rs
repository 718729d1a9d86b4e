//! Registry of connected clients.

use crate::server::client_proxy::ClientProxy;
use rand::seq::SliceRandom;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info};

/// Tracks available clients and samples them for rounds.
pub struct ClientManager {
    clients: RwLock<HashMap<String, Arc<dyn ClientProxy>>>,
    /// Broadcasts the number of registered clients
    available: watch::Sender<usize>,
}

impl ClientManager {
    /// Create an empty manager.
    pub fn new() -> Self {
        let (available, _) = watch::channel(0);
        Self {
            clients: RwLock::new(HashMap::new()),
            available,
        }
    }

    /// Register a client. Returns false if the cid is already taken.
    pub fn register(&self, client: Arc<dyn ClientProxy>) -> bool {
        let count = {
            let mut clients = self.clients.write().unwrap_or_else(|e| e.into_inner());
            if clients.contains_key(client.cid()) {
                return false;
            }
            clients.insert(client.cid().to_string(), client);
            clients.len()
        };
        self.available.send_replace(count);
        debug!(available = count, "client registered");
        true
    }

    /// Remove a client.
    pub fn unregister(&self, cid: &str) {
        let count = {
            let mut clients = self.clients.write().unwrap_or_else(|e| e.into_inner());
            if clients.remove(cid).is_none() {
                return;
            }
            clients.len()
        };
        self.available.send_replace(count);
        info!(cid, available = count, "client unregistered");
    }

    /// Number of registered clients.
    pub fn num_available(&self) -> usize {
        *self.available.borrow()
    }

    /// All registered clients.
    pub fn all(&self) -> Vec<Arc<dyn ClientProxy>> {
        self.clients
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .cloned()
            .collect()
    }

    /// Wait until at least `num_clients` are registered.
    ///
    /// Returns false if the timeout elapsed first.
    pub async fn wait_for(&self, num_clients: usize, timeout: Duration) -> bool {
        let mut rx = self.available.subscribe();
        let wait = rx.wait_for(|count| *count >= num_clients);
        let ready = matches!(tokio::time::timeout(timeout, wait).await, Ok(Ok(_)));
        ready
    }

    /// Randomly sample `num_clients` clients, waiting up to `timeout` for
    /// at least `min_num_clients` to be available.
    ///
    /// Returns an empty list if not enough clients showed up.
    pub async fn sample(
        &self,
        num_clients: usize,
        min_num_clients: usize,
        timeout: Duration,
    ) -> Vec<Arc<dyn ClientProxy>> {
        if !self.wait_for(min_num_clients, timeout).await {
            info!(
                requested = num_clients,
                available = self.num_available(),
                "sampling failed: not enough clients"
            );
            return Vec::new();
        }

        let mut clients = self.all();
        if clients.len() < num_clients {
            info!(
                requested = num_clients,
                available = clients.len(),
                "sampling failed: fewer clients than requested"
            );
            return Vec::new();
        }

        clients.shuffle(&mut rand::thread_rng());
        clients.truncate(num_clients);
        clients
    }
}

impl Default for ClientManager {
    fn default() -> Self {
        Self::new()
    }
}
