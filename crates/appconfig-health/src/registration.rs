//! Registering configuration-service probes with a [`HealthChecksBuilder`].
//!
//! Registration is two-phase: [`AppConfigurationCheckBuilder::register`]
//! validates its arguments immediately, and the stored factory resolves the
//! endpoint and key set once per build before constructing the probe.

use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::cache::ClientCache;
use crate::checker::AppConfigurationHealthCheck;
use crate::credential::TokenCredential;
use crate::endpoint::Endpoint;
use crate::error::ConstructionError;
use crate::options::AppConfigurationOptions;
use crate::registry::{
    CheckFactory, HealthCheck, HealthCheckRegistration, HealthChecksBuilder, HealthStatus,
    ServiceContext,
};

/// Name used when a registration does not supply one.
pub const DEFAULT_CHECK_NAME: &str = "azureappconfiguration";

/// Resolves the endpoint from the service context at build time.
pub type EndpointFactory =
    Arc<dyn Fn(&ServiceContext) -> Result<Endpoint, ConstructionError> + Send + Sync>;

/// Populates the key set, optionally using the service context.
pub type SetupFn = Arc<dyn Fn(&ServiceContext, &mut AppConfigurationOptions) + Send + Sync>;

enum EndpointSource {
    Fixed(String),
    Factory(EndpointFactory),
}

/// Collects the arguments of a configuration-service probe registration.
#[derive(Default)]
pub struct AppConfigurationCheckBuilder {
    endpoint: Option<EndpointSource>,
    credential: Option<Arc<dyn TokenCredential>>,
    setup: Option<SetupFn>,
    name: Option<String>,
    failure_status: Option<HealthStatus>,
    tags: Vec<String>,
    timeout: Option<Duration>,
    clients: Option<Arc<ClientCache>>,
}

impl AppConfigurationCheckBuilder {
    /// Builder with no arguments set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Fixed endpoint address; validated by [`register`](Self::register).
    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(EndpointSource::Fixed(endpoint.into()));
        self
    }

    /// Endpoint computed from the service context each time the check is built.
    pub fn endpoint_factory<F>(mut self, factory: F) -> Self
    where
        F: Fn(&ServiceContext) -> Result<Endpoint, ConstructionError> + Send + Sync + 'static,
    {
        self.endpoint = Some(EndpointSource::Factory(Arc::new(factory)));
        self
    }

    /// Token provider used for every read. Required.
    pub fn credential(mut self, credential: Arc<dyn TokenCredential>) -> Self {
        self.credential = Some(credential);
        self
    }

    /// Populate the key set. Runs once per build.
    pub fn setup<F>(mut self, setup: F) -> Self
    where
        F: Fn(&mut AppConfigurationOptions) + Send + Sync + 'static,
    {
        self.setup = Some(Arc::new(
            move |_: &ServiceContext, options: &mut AppConfigurationOptions| setup(options),
        ));
        self
    }

    /// Populate the key set with access to the service context.
    pub fn setup_with_context<F>(mut self, setup: F) -> Self
    where
        F: Fn(&ServiceContext, &mut AppConfigurationOptions) + Send + Sync + 'static,
    {
        self.setup = Some(Arc::new(setup));
        self
    }

    /// Registration name; defaults to [`DEFAULT_CHECK_NAME`].
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Status reported when a read fails; defaults to unhealthy.
    pub fn failure_status(mut self, status: HealthStatus) -> Self {
        self.failure_status = Some(status);
        self
    }

    /// Labels the runner can filter on.
    pub fn tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags.extend(tags.into_iter().map(Into::into));
        self
    }

    /// Upper bound on one check run, enforced by the runner.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Client cache used when the service context does not provide one.
    pub fn client_cache(mut self, clients: Arc<ClientCache>) -> Self {
        self.clients = Some(clients);
        self
    }

    /// Validate the arguments and produce a registration.
    pub fn build(self) -> Result<HealthCheckRegistration, ConstructionError> {
        let resolve_endpoint: EndpointFactory = match self.endpoint {
            Some(EndpointSource::Fixed(raw)) => {
                let endpoint = Endpoint::parse(&raw)?;
                Arc::new(move |_: &ServiceContext| Ok::<_, ConstructionError>(endpoint.clone()))
            }
            Some(EndpointSource::Factory(factory)) => factory,
            None => return Err(ConstructionError::MissingArgument("endpoint")),
        };
        let credential = self
            .credential
            .ok_or(ConstructionError::MissingArgument("credential"))?;
        let clients = match self.clients {
            Some(clients) => clients,
            None => Arc::new(ClientCache::http()?),
        };
        let setup = self.setup;
        let name = self.name.unwrap_or_else(|| DEFAULT_CHECK_NAME.to_string());

        let factory: CheckFactory = Arc::new(
            move |services: &ServiceContext| -> Result<Arc<dyn HealthCheck>, ConstructionError> {
                let mut options = AppConfigurationOptions::new();
                if let Some(setup) = &setup {
                    setup(services, &mut options);
                }
                let endpoint = resolve_endpoint(services)?;
                let clients = services
                    .get::<ClientCache>()
                    .unwrap_or_else(|| Arc::clone(&clients));
                debug!(%endpoint, keys = options.len(), "building configuration health check");

                Ok(Arc::new(AppConfigurationHealthCheck::new(
                    endpoint,
                    Arc::clone(&credential),
                    options,
                    clients,
                )))
            },
        );

        let mut registration = HealthCheckRegistration::new(name, factory)
            .with_failure_status(self.failure_status.unwrap_or(HealthStatus::Unhealthy))
            .with_tags(self.tags);
        if let Some(timeout) = self.timeout {
            registration = registration.with_timeout(timeout);
        }
        Ok(registration)
    }

    /// Validate the arguments and add the registration to `builder`.
    pub fn register<'b>(
        self,
        builder: &'b mut HealthChecksBuilder,
    ) -> Result<&'b mut HealthChecksBuilder, ConstructionError> {
        let registration = self.build()?;
        Ok(builder.add(registration))
    }
}

impl HealthChecksBuilder {
    /// Register a probe for `endpoint` with the default name and status.
    pub fn add_app_configuration<F>(
        &mut self,
        endpoint: &str,
        credential: Arc<dyn TokenCredential>,
        setup: F,
    ) -> Result<&mut Self, ConstructionError>
    where
        F: Fn(&mut AppConfigurationOptions) + Send + Sync + 'static,
    {
        AppConfigurationCheckBuilder::new()
            .endpoint(endpoint)
            .credential(credential)
            .setup(setup)
            .register(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credential::StaticTokenCredential;

    fn credential() -> Arc<dyn TokenCredential> {
        Arc::new(StaticTokenCredential::new("token"))
    }

    #[test]
    fn defaults_applied() {
        let registration = AppConfigurationCheckBuilder::new()
            .endpoint("http://localhost")
            .credential(credential())
            .build()
            .unwrap();

        assert_eq!(registration.name, DEFAULT_CHECK_NAME);
        assert_eq!(registration.failure_status, HealthStatus::Unhealthy);
        assert!(registration.tags.is_empty());
        assert_eq!(registration.timeout, None);
    }

    #[test]
    fn optional_arguments_are_kept() {
        let registration = AppConfigurationCheckBuilder::new()
            .endpoint("http://localhost")
            .credential(credential())
            .name("appconfigurationcheck")
            .failure_status(HealthStatus::Degraded)
            .tags(["ready"])
            .timeout(Duration::from_secs(2))
            .build()
            .unwrap();

        assert_eq!(registration.name, "appconfigurationcheck");
        assert_eq!(registration.failure_status, HealthStatus::Degraded);
        assert!(registration.tags.contains("ready"));
        assert_eq!(registration.timeout, Some(Duration::from_secs(2)));
    }

    #[test]
    fn missing_endpoint_fails() {
        let err = AppConfigurationCheckBuilder::new()
            .credential(credential())
            .build()
            .unwrap_err();
        assert_eq!(err, ConstructionError::MissingArgument("endpoint"));
        assert!(err.is_invalid_argument());
    }

    #[test]
    fn missing_credential_fails() {
        let err = AppConfigurationCheckBuilder::new()
            .endpoint("http://localhost")
            .build()
            .unwrap_err();
        assert_eq!(err, ConstructionError::MissingArgument("credential"));
        assert!(err.is_invalid_argument());
    }

    #[test]
    fn invalid_endpoint_fails_at_registration() {
        let mut builder = HealthChecksBuilder::new();
        let err = builder
            .add_app_configuration("", credential(), |options| {
                options.add_key("configkey");
            })
            .unwrap_err();

        assert!(matches!(
            err,
            ConstructionError::InvalidArgument { name: "endpoint", .. }
        ));
        assert!(builder.registrations().is_empty());
    }

    #[test]
    fn context_cache_takes_precedence() {
        let bound = Arc::new(ClientCache::http().unwrap());
        let shared = Arc::new(ClientCache::http().unwrap());
        let registration = AppConfigurationCheckBuilder::new()
            .endpoint("http://localhost")
            .credential(credential())
            .client_cache(bound.clone())
            .build()
            .unwrap();

        let mut services = ServiceContext::new();
        services.insert(shared.clone());
        let check = registration.build(&services).unwrap();
        let check = check
            .as_any()
            .downcast_ref::<AppConfigurationHealthCheck>()
            .unwrap();

        assert!(Arc::ptr_eq(check.clients(), &shared));
        assert!(!Arc::ptr_eq(check.clients(), &bound));
    }
}
