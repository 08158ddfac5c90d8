//! Configuration-service health probe.
//!
//! Reads every configured key through the cached client for the probe's
//! endpoint. The first failing read ends the probe with the registration's
//! failure status and the read error attached.

use std::any::Any;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::cache::ClientCache;
use crate::cancel::CancelSignal;
use crate::credential::TokenCredential;
use crate::endpoint::Endpoint;
use crate::error::{Cancelled, ReadError, ReadResult};
use crate::options::AppConfigurationOptions;
use crate::registry::{CheckFuture, HealthCheck, HealthCheckContext, HealthCheckResult};

/// Outcome of a single probe before it is mapped to a reported status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeResult {
    /// Every configured key was read.
    Healthy,
    /// A read failed; carries the failing read's error.
    Unhealthy(ReadError),
}

/// Probes a configuration-service endpoint by reading a fixed set of keys.
pub struct AppConfigurationHealthCheck {
    endpoint: Endpoint,
    credential: Arc<dyn TokenCredential>,
    options: AppConfigurationOptions,
    clients: Arc<ClientCache>,
}

impl AppConfigurationHealthCheck {
    /// Probe `endpoint` for the keys in `options`, sharing clients through `clients`.
    pub fn new(
        endpoint: Endpoint,
        credential: Arc<dyn TokenCredential>,
        options: AppConfigurationOptions,
        clients: Arc<ClientCache>,
    ) -> Self {
        Self {
            endpoint,
            credential,
            options,
            clients,
        }
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    pub fn options(&self) -> &AppConfigurationOptions {
        &self.options
    }

    /// Cache the probe resolves its client from.
    pub fn clients(&self) -> &Arc<ClientCache> {
        &self.clients
    }

    /// Read each key in turn, stopping at the first failure.
    pub async fn probe(&self, cancel: &CancelSignal) -> Result<ProbeResult, Cancelled> {
        for key in self.options.keys() {
            let read = async {
                let client = self.clients.get_or_create(&self.endpoint, &self.credential)?;
                client.get_setting(key).await.map(|_| ())
            };

            let outcome: ReadResult<()> = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    debug!(endpoint = %self.endpoint, %key, "configuration probe cancelled");
                    return Err(Cancelled);
                }
                outcome = read => outcome,
            };

            if let Err(error) = outcome {
                warn!(endpoint = %self.endpoint, %key, %error, "configuration key read failed");
                return Ok(ProbeResult::Unhealthy(error));
            }
            debug!(endpoint = %self.endpoint, %key, "configuration key read");
        }

        Ok(ProbeResult::Healthy)
    }
}

impl HealthCheck for AppConfigurationHealthCheck {
    fn check<'a>(
        &'a self,
        context: &'a HealthCheckContext,
        cancel: &'a CancelSignal,
    ) -> CheckFuture<'a> {
        Box::pin(async move {
            Ok(match self.probe(cancel).await? {
                ProbeResult::Healthy => HealthCheckResult::healthy(),
                ProbeResult::Unhealthy(error) => {
                    HealthCheckResult::failure(context.failure_status, error)
                }
            })
        })
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl std::fmt::Debug for AppConfigurationHealthCheck {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfigurationHealthCheck")
            .field("endpoint", &self.endpoint)
            .field("credential", &self.credential)
            .field("keys", &self.options.len())
            .finish()
    }
}
