//! appconfig-health: liveness probe for configuration-service endpoints.
//!
//! A probe reads a fixed set of configuration keys from one endpoint and
//! reports healthy when every read succeeds. The first failing read makes
//! the whole check fail, carrying the read error for diagnostics.
//!
//! # Architecture
//!
//! ```text
//! AppConfigurationCheckBuilder ── register() ──▶ HealthCheckRegistration
//!                                                  │ build(&ServiceContext)
//!                                                  ▼
//! HealthCheckService / HealthMonitor ──▶ AppConfigurationHealthCheck
//!                                          ├── ClientCache (endpoint → client)
//!                                          │     └── ClientFactory → HttpConfigurationClient
//!                                          └── get_setting(key) per key, raced
//!                                              against the CancelSignal
//! ```
//!
//! # Client cache
//!
//! Clients are cached per endpoint and never evicted. The cache is an
//! explicit [`ClientCache`] value: registrations carry one, and a
//! [`ClientCache`] placed in the [`ServiceContext`] takes precedence so one
//! cache can be shared across every probe a host builds.

pub mod cache;
pub mod cancel;
pub mod checker;
pub mod client;
pub mod credential;
pub mod endpoint;
pub mod error;
pub mod monitor;
pub mod options;
pub mod registration;
pub mod registry;
pub mod settings;

pub use cache::ClientCache;
pub use cancel::{CancelHandle, CancelSignal};
pub use checker::{AppConfigurationHealthCheck, ProbeResult};
pub use client::{
    ClientFactory, ConfigurationClient, ConfigurationSetting, HttpClientFactory,
    HttpConfigurationClient,
};
pub use credential::{AccessToken, CredentialError, StaticTokenCredential, TokenCredential};
pub use endpoint::Endpoint;
pub use error::{Cancelled, ConstructionError, ReadError, ReadResult};
pub use monitor::{
    HealthCheckService, HealthMonitor, HealthReport, HealthReportEntry, StatusCallback, StatusFuture,
};
pub use options::AppConfigurationOptions;
pub use registration::{AppConfigurationCheckBuilder, DEFAULT_CHECK_NAME};
pub use registry::{
    HealthCheck, HealthCheckContext, HealthCheckRegistration, HealthCheckResult,
    HealthChecksBuilder, HealthStatus, ServiceContext,
};
pub use settings::ProbeSettings;
