//! Check runner and background monitor.
//!
//! [`HealthCheckService`] builds each registered check, runs the checks
//! concurrently with their registration timeouts, and aggregates a
//! [`HealthReport`]. [`HealthMonitor`] re-runs the service on an interval in
//! a background task and keeps the latest report.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::sync::{watch, Mutex, RwLock};
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, error, info, warn};

use crate::cancel::CancelSignal;
use crate::error::{Cancelled, ConstructionError};
use crate::registry::{HealthCheckRegistration, HealthCheckResult, HealthStatus, ServiceContext};

/// Result of one registration within a report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HealthReportEntry {
    pub status: HealthStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Wall time of this check, including construction.
    pub duration_ms: u64,
    /// Registration tags, sorted.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    /// Rendered read error, when a read failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl HealthReportEntry {
    fn new(result: HealthCheckResult, elapsed: Duration, registration: &HealthCheckRegistration) -> Self {
        Self {
            status: result.status,
            description: result.description,
            duration_ms: elapsed.as_millis() as u64,
            tags: registration.tags.iter().cloned().collect(),
            error: result.error.map(|e| e.to_string()),
        }
    }
}

/// Aggregated outcome of a run. The overall status is the worst entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub total_duration_ms: u64,
    pub entries: BTreeMap<String, HealthReportEntry>,
}

impl HealthReport {
    pub fn new(entries: BTreeMap<String, HealthReportEntry>, total: Duration) -> Self {
        let status = entries
            .values()
            .map(|entry| entry.status)
            .max()
            .unwrap_or(HealthStatus::Healthy);
        Self {
            status,
            total_duration_ms: total.as_millis() as u64,
            entries,
        }
    }

    pub fn is_healthy(&self) -> bool {
        self.status == HealthStatus::Healthy
    }
}

/// Runs registered checks on demand.
#[derive(Clone)]
pub struct HealthCheckService {
    registrations: Arc<[HealthCheckRegistration]>,
    services: Arc<ServiceContext>,
}

impl HealthCheckService {
    /// Registration names must be unique.
    pub fn new(
        registrations: Vec<HealthCheckRegistration>,
        services: ServiceContext,
    ) -> Result<Self, ConstructionError> {
        let mut seen = HashSet::new();
        for registration in &registrations {
            if !seen.insert(registration.name.as_str()) {
                return Err(ConstructionError::invalid(
                    "registrations",
                    format!("duplicate health check name `{}`", registration.name),
                ));
            }
        }

        Ok(Self {
            registrations: registrations.into(),
            services: Arc::new(services),
        })
    }

    pub fn registrations(&self) -> &[HealthCheckRegistration] {
        &self.registrations
    }

    pub async fn check_all(&self, cancel: &CancelSignal) -> Result<HealthReport, Cancelled> {
        self.check(cancel, |_| true).await
    }

    /// Run every registration accepted by `predicate`.
    pub async fn check<P>(&self, cancel: &CancelSignal, predicate: P) -> Result<HealthReport, Cancelled>
    where
        P: Fn(&HealthCheckRegistration) -> bool,
    {
        let started = Instant::now();
        let mut tasks = JoinSet::new();
        let mut running = HashMap::new();

        for registration in self.registrations.iter().filter(|r| predicate(r)) {
            let registration = registration.clone();
            let services = Arc::clone(&self.services);
            let cancel = cancel.clone();
            let name = registration.name.clone();
            let failure_status = registration.failure_status;
            let tags: Vec<String> = registration.tags.iter().cloned().collect();
            let spawned = Instant::now();
            let handle = tasks.spawn(async move {
                let entry = run_registration(&registration, &services, &cancel).await;
                (registration.name, entry)
            });
            running.insert(handle.id(), (name, failure_status, tags, spawned));
        }

        let mut entries = BTreeMap::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((name, Ok(entry))) => {
                    entries.insert(name, entry);
                }
                // Dropping the set aborts the remaining checks.
                Ok((_, Err(Cancelled))) => return Err(Cancelled),
                Err(e) => {
                    let Some((name, failure_status, tags, spawned)) = running.remove(&e.id())
                    else {
                        continue;
                    };
                    error!(check = %name, error = %e, "health check task failed");
                    entries.insert(
                        name,
                        HealthReportEntry {
                            status: failure_status,
                            description: Some(format!("check task failed: {e}")),
                            duration_ms: spawned.elapsed().as_millis() as u64,
                            tags,
                            error: None,
                        },
                    );
                }
            }
        }

        let report = HealthReport::new(entries, started.elapsed());
        debug!(status = %report.status, checks = report.entries.len(), "health report completed");
        Ok(report)
    }
}

/// Build and run a single registration.
///
/// Construction failures and timeouts are reported with the registration's
/// failure status; only caller cancellation escapes as an error.
pub async fn run_registration(
    registration: &HealthCheckRegistration,
    services: &ServiceContext,
    cancel: &CancelSignal,
) -> Result<HealthReportEntry, Cancelled> {
    let started = Instant::now();
    let context = registration.context();

    let result = match registration.build(services) {
        Err(e) => {
            error!(check = %registration.name, error = %e, "failed to build health check");
            HealthCheckResult::with_description(registration.failure_status, e.to_string())
        }
        Ok(check) => {
            let run = check.check(&context, cancel);
            match registration.timeout {
                Some(limit) => match tokio::time::timeout(limit, run).await {
                    Ok(outcome) => outcome?,
                    Err(_) => HealthCheckResult::with_description(
                        registration.failure_status,
                        format!("check timed out after {}ms", limit.as_millis()),
                    ),
                },
                None => run.await?,
            }
        }
    };

    match result.status {
        HealthStatus::Healthy => debug!(check = %registration.name, "health check passed"),
        status => warn!(
            check = %registration.name,
            %status,
            description = result.description.as_deref().unwrap_or_default(),
            "health check failed"
        ),
    }

    Ok(HealthReportEntry::new(result, started.elapsed(), registration))
}

// ── Monitor ──────────────────────────────────────────────────────────

/// Callback invoked when the overall status changes.
pub type StatusCallback = Arc<dyn Fn(HealthReport) -> StatusFuture + Send + Sync>;

pub type StatusFuture = std::pin::Pin<Box<dyn std::future::Future<Output = ()> + Send>>;

/// Background task state.
struct MonitorSlot {
    handle: JoinHandle<()>,
    shutdown_tx: watch::Sender<bool>,
}

/// Re-runs a [`HealthCheckService`] on an interval.
pub struct HealthMonitor {
    service: HealthCheckService,
    latest: Arc<RwLock<Option<HealthReport>>>,
    slot: Mutex<Option<MonitorSlot>>,
    on_status_change: Option<StatusCallback>,
}

impl HealthMonitor {
    pub fn new(service: HealthCheckService) -> Self {
        Self {
            service,
            latest: Arc::new(RwLock::new(None)),
            slot: Mutex::new(None),
            on_status_change: None,
        }
    }

    pub fn with_callback(mut self, callback: StatusCallback) -> Self {
        self.on_status_change = Some(callback);
        self
    }

    /// Start the background loop, replacing one that is already running.
    ///
    /// The first run starts immediately.
    pub async fn start(&self, interval: Duration) {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let handle = tokio::spawn(run_monitor_loop(
            self.service.clone(),
            interval,
            Arc::clone(&self.latest),
            self.on_status_change.clone(),
            shutdown_rx,
        ));

        let mut slot = self.slot.lock().await;
        if let Some(old) = slot.replace(MonitorSlot {
            handle,
            shutdown_tx,
        }) {
            let _ = old.shutdown_tx.send(true);
            old.handle.abort();
        }

        info!(
            interval_ms = interval.as_millis() as u64,
            checks = self.service.registrations().len(),
            "health monitor started"
        );
    }

    pub async fn stop(&self) {
        let mut slot = self.slot.lock().await;
        if let Some(slot) = slot.take() {
            let _ = slot.shutdown_tx.send(true);
            let _ = slot.handle.await;
            info!("health monitor stopped");
        }
    }

    pub async fn is_running(&self) -> bool {
        self.slot.lock().await.is_some()
    }

    /// Most recent completed report.
    pub async fn latest(&self) -> Option<HealthReport> {
        self.latest.read().await.clone()
    }
}

async fn run_monitor_loop(
    service: HealthCheckService,
    interval: Duration,
    latest: Arc<RwLock<Option<HealthReport>>>,
    callback: Option<StatusCallback>,
    mut shutdown: watch::Receiver<bool>,
) {
    let cancel = CancelSignal::never();
    let mut previous: Option<HealthStatus> = None;

    loop {
        let outcome = tokio::select! {
            outcome = service.check_all(&cancel) => outcome,
            _ = shutdown.changed() => break,
        };

        let Ok(report) = outcome else {
            break;
        };

        let status = report.status;
        *latest.write().await = Some(report.clone());

        if previous != Some(status) {
            info!(%status, "overall health changed");
            if let Some(ref cb) = callback {
                cb(report).await;
            }
            previous = Some(status);
        }

        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            _ = shutdown.changed() => break,
        }
    }

    debug!("health monitor loop exiting");
}
