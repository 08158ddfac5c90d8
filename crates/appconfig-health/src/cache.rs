//! Per-endpoint client cache shared by every probe bound to the same address.
//!
//! Entries are created lazily on first use and never evicted. The cache is
//! keyed by endpoint only: the credential that created an entry stays bound
//! to it for the life of the cache.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use tracing::debug;

use crate::client::{ClientFactory, ConfigurationClient, HttpClientFactory};
use crate::credential::TokenCredential;
use crate::endpoint::Endpoint;
use crate::error::{ConstructionError, ReadResult};

/// Concurrency-safe get-or-create map from endpoint to client.
///
/// Lookups of an already-cached endpoint only take the shared read lock.
pub struct ClientCache {
    clients: RwLock<HashMap<Endpoint, Arc<dyn ConfigurationClient>>>,
    factory: Arc<dyn ClientFactory>,
}

impl ClientCache {
    /// Empty cache building clients with `factory`.
    pub fn new(factory: Arc<dyn ClientFactory>) -> Self {
        Self {
            clients: RwLock::new(HashMap::new()),
            factory,
        }
    }

    /// Cache backed by [`HttpClientFactory`].
    pub fn http() -> Result<Self, ConstructionError> {
        Ok(Self::new(Arc::new(HttpClientFactory::new()?)))
    }

    /// Return the client for `endpoint`, creating it with `credential` on a
    /// miss.
    ///
    /// Two callers racing on the same uncached endpoint may both build a
    /// client; the first insert wins and both callers receive that entry.
    pub fn get_or_create(
        &self,
        endpoint: &Endpoint,
        credential: &Arc<dyn TokenCredential>,
    ) -> ReadResult<Arc<dyn ConfigurationClient>> {
        if let Some(client) = self.lookup(endpoint) {
            return Ok(client);
        }

        // Build outside the lock; construction may be slow.
        let created = self.factory.create(endpoint, Arc::clone(credential))?;

        let mut clients = self.clients.write().unwrap_or_else(PoisonError::into_inner);
        let client = clients
            .entry(endpoint.clone())
            .or_insert_with(|| {
                debug!(%endpoint, "cached configuration client");
                created
            })
            .clone();
        Ok(client)
    }

    // Entries are immutable once inserted, so a poisoned lock still holds a
    // consistent map.
    fn lookup(&self, endpoint: &Endpoint) -> Option<Arc<dyn ConfigurationClient>> {
        let clients = self.clients.read().unwrap_or_else(PoisonError::into_inner);
        clients.get(endpoint).cloned()
    }

    /// Number of cached endpoints.
    pub fn len(&self) -> usize {
        self.clients.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, endpoint: &Endpoint) -> bool {
        self.lookup(endpoint).is_some()
    }
}

impl std::fmt::Debug for ClientCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientCache").field("entries", &self.len()).finish()
    }
}
