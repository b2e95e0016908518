use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::info;

use crate::client::Client;
use crate::config::ClientConfig;
use crate::error::{Error, Result};

/// Clients keyed by a logical endpoint name.
///
/// Connections are opened on first use. A client whose connection has closed is replaced by a
/// fresh one the next time its endpoint is requested.
#[derive(Debug, Default)]
pub struct ClientPool {
    endpoints: HashMap<String, ClientConfig>,
    clients: Mutex<HashMap<String, Client>>,
}

impl ClientPool {
    pub fn new() -> ClientPool {
        ClientPool::default()
    }

    pub fn with_endpoint(mut self, name: impl Into<String>, config: ClientConfig) -> ClientPool {
        self.register(name, config);
        self
    }

    /// Adds or replaces an endpoint. An already connected client keeps its old settings until it
    /// is replaced.
    pub fn register(&mut self, name: impl Into<String>, config: ClientConfig) {
        self.endpoints.insert(name.into(), config);
    }

    pub fn endpoints(&self) -> impl Iterator<Item = &str> {
        self.endpoints.keys().map(String::as_str)
    }

    pub async fn get(&self, name: &str) -> Result<Client> {
        let config = self
            .endpoints
            .get(name)
            .ok_or_else(|| Error::argument(format!("unknown endpoint {}", name)))?;

        let cached = self.lock().get(name).cloned();
        if let Some(client) = cached {
            if !client.is_closed() {
                return Ok(client);
            }
            info!(endpoint = name, "replacing closed client");
        }

        // The map is never locked across a connect.
        let client = Client::connect(config).await?;

        let mut clients = self.lock();
        if let Some(existing) = clients.get(name) {
            if !existing.is_closed() {
                // Another caller connected first.
                client.close();
                return Ok(existing.clone());
            }
        }
        clients.insert(name.to_string(), client.clone());
        Ok(client)
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Client>> {
        self.clients.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
