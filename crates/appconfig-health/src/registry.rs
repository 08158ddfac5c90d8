//! Host-side health check surface: statuses, results, the [`HealthCheck`]
//! trait, and the registrations a runner builds checks from.

use std::any::{Any, TypeId};
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::cancel::CancelSignal;
use crate::error::{Cancelled, ConstructionError, ReadError};

/// Reported health of a single check or an aggregated report.
///
/// Ordered from best to worst so reports can take the maximum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            HealthStatus::Healthy => "healthy",
            HealthStatus::Degraded => "degraded",
            HealthStatus::Unhealthy => "unhealthy",
        })
    }
}

/// Outcome of one check invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthCheckResult {
    /// Reported status.
    pub status: HealthStatus,
    /// Human-readable detail, set for every failure.
    pub description: Option<String>,
    /// The read failure that made the check fail, if any.
    pub error: Option<ReadError>,
}

impl HealthCheckResult {
    /// Passing result with no detail.
    pub fn healthy() -> Self {
        Self {
            status: HealthStatus::Healthy,
            description: None,
            error: None,
        }
    }

    /// Failing result carrying the read error and its message.
    pub fn failure(status: HealthStatus, error: ReadError) -> Self {
        Self {
            status,
            description: Some(error.to_string()),
            error: Some(error),
        }
    }

    /// Result with a description but no read error (timeouts, build failures).
    pub fn with_description(status: HealthStatus, description: impl Into<String>) -> Self {
        Self {
            status,
            description: Some(description.into()),
            error: None,
        }
    }
}

/// Per-invocation information supplied by the runner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthCheckContext {
    /// Name of the registration being run.
    pub name: String,
    /// Status to report when the check fails.
    pub failure_status: HealthStatus,
}

pub type CheckFuture<'a> =
    Pin<Box<dyn Future<Output = Result<HealthCheckResult, Cancelled>> + Send + 'a>>;

/// A single health check.
///
/// Failures are returned as results; only caller cancellation is an `Err`.
pub trait HealthCheck: Send + Sync + 'static {
    fn check<'a>(&'a self, context: &'a HealthCheckContext, cancel: &'a CancelSignal)
        -> CheckFuture<'a>;

    fn as_any(&self) -> &dyn Any;
}

// ── ServiceContext ───────────────────────────────────────────────────

/// Typed dependency map handed to registration factories.
#[derive(Clone, Default)]
pub struct ServiceContext {
    services: HashMap<TypeId, Arc<dyn Any + Send + Sync>>,
}

impl ServiceContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a shared service, replacing any previous one of the same type.
    pub fn insert<T: Any + Send + Sync>(&mut self, service: Arc<T>) -> &mut Self {
        self.services.insert(TypeId::of::<T>(), service);
        self
    }

    /// Look up a service by type.
    pub fn get<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        self.services
            .get(&TypeId::of::<T>())
            .and_then(|service| Arc::clone(service).downcast::<T>().ok())
    }
}

impl fmt::Debug for ServiceContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceContext")
            .field("services", &self.services.len())
            .finish()
    }
}

// ── Registrations ────────────────────────────────────────────────────

/// Builds a check instance from the service context.
pub type CheckFactory =
    Arc<dyn Fn(&ServiceContext) -> Result<Arc<dyn HealthCheck>, ConstructionError> + Send + Sync>;

/// A named, filterable recipe for building a check.
#[derive(Clone)]
pub struct HealthCheckRegistration {
    /// Unique name; the key of the entry in a report.
    pub name: String,
    /// Status reported when the check fails, times out, or cannot be built.
    pub failure_status: HealthStatus,
    /// Labels for filtering which checks run.
    pub tags: BTreeSet<String>,
    /// Runner-enforced limit on a single run.
    pub timeout: Option<Duration>,
    factory: CheckFactory,
}

impl HealthCheckRegistration {
    /// New registration reporting [`HealthStatus::Unhealthy`] on failure.
    pub fn new(name: impl Into<String>, factory: CheckFactory) -> Self {
        Self {
            name: name.into(),
            failure_status: HealthStatus::Unhealthy,
            tags: BTreeSet::new(),
            timeout: None,
            factory,
        }
    }

    /// Override the failure status.
    pub fn with_failure_status(mut self, status: HealthStatus) -> Self {
        self.failure_status = status;
        self
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags.extend(tags.into_iter().map(Into::into));
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Build a check instance.
    pub fn build(&self, services: &ServiceContext) -> Result<Arc<dyn HealthCheck>, ConstructionError> {
        (self.factory)(services)
    }

    /// Per-run context handed to the check.
    pub fn context(&self) -> HealthCheckContext {
        HealthCheckContext {
            name: self.name.clone(),
            failure_status: self.failure_status,
        }
    }
}

impl fmt::Debug for HealthCheckRegistration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HealthCheckRegistration")
            .field("name", &self.name)
            .field("failure_status", &self.failure_status)
            .field("tags", &self.tags)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

/// Ordered collection of registrations.
#[derive(Debug, Clone, Default)]
pub struct HealthChecksBuilder {
    registrations: Vec<HealthCheckRegistration>,
}

impl HealthChecksBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, registration: HealthCheckRegistration) -> &mut Self {
        self.registrations.push(registration);
        self
    }

    pub fn registrations(&self) -> &[HealthCheckRegistration] {
        &self.registrations
    }

    pub fn into_registrations(self) -> Vec<HealthCheckRegistration> {
        self.registrations
    }
}
