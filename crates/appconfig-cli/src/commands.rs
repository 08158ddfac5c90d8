use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use appconfig_health::{
    CancelSignal, ClientCache, HealthCheckService, HealthChecksBuilder, HealthMonitor,
    HealthReport, ProbeSettings, ServiceContext, StatusCallback, StatusFuture,
};
use tracing::info;

use crate::OutputFormat;

/// Load settings and build a service whose probes share one client cache.
pub fn load_service(config: &Path) -> anyhow::Result<HealthCheckService> {
    let settings = ProbeSettings::from_file(config)
        .with_context(|| format!("reading settings from {}", config.display()))?;
    if settings.checks.is_empty() {
        anyhow::bail!("{} defines no [[check]] tables", config.display());
    }

    let clients = Arc::new(ClientCache::http()?);
    let mut builder = HealthChecksBuilder::new();
    settings.register_all(&mut builder, Arc::clone(&clients))?;

    let mut services = ServiceContext::new();
    services.insert(clients);
    Ok(HealthCheckService::new(builder.into_registrations(), services)?)
}

/// Run the checks once. Returns whether the report is healthy.
pub async fn check(config: &Path, tag: Option<&str>, format: OutputFormat) -> anyhow::Result<bool> {
    let service = load_service(config)?;
    let (cancel_handle, cancel) = CancelSignal::new();

    let run = service.check(&cancel, |r| tag.is_none_or(|t| r.tags.contains(t)));
    let report = tokio::select! {
        report = run => report?,
        _ = tokio::signal::ctrl_c() => {
            cancel_handle.cancel();
            anyhow::bail!("interrupted");
        }
    };

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
        OutputFormat::Text => print!("{}", render_text(&report)),
    }
    Ok(report.is_healthy())
}

/// Run the checks on an interval until Ctrl-C.
pub async fn watch(config: &Path, interval: u64) -> anyhow::Result<()> {
    let callback: StatusCallback = Arc::new(|report: HealthReport| -> StatusFuture {
        Box::pin(async move {
            print!("{}", render_text(&report));
        })
    });
    let monitor = HealthMonitor::new(load_service(config)?).with_callback(callback);

    monitor.start(Duration::from_secs(interval.max(1))).await;
    tokio::signal::ctrl_c().await?;
    info!("interrupted, stopping");
    monitor.stop().await;
    Ok(())
}

pub fn render_text(report: &HealthReport) -> String {
    let mut out = format!(
        "{} ({} checks, {}ms)\n",
        report.status.to_string().to_uppercase(),
        report.entries.len(),
        report.total_duration_ms
    );
    for (name, entry) in &report.entries {
        out.push_str(&format!("  {name}: {} ({}ms)", entry.status, entry.duration_ms));
        if let Some(description) = &entry.description {
            out.push_str(&format!(": {description}"));
        }
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use appconfig_health::{HealthReportEntry, HealthStatus};

    use super::*;

    #[test]
    fn render_text_lists_entries() {
        let mut entries = BTreeMap::new();
        entries.insert(
            "azureappconfiguration".to_string(),
            HealthReportEntry {
                status: HealthStatus::Unhealthy,
                description: Some("configuration key not found: k".into()),
                duration_ms: 12,
                tags: vec![],
                error: None,
            },
        );
        let report = HealthReport::new(entries, Duration::from_millis(15));

        let text = render_text(&report);
        assert!(text.starts_with("UNHEALTHY (1 checks, 15ms)"));
        assert!(text.contains("azureappconfiguration: unhealthy (12ms): configuration key not found: k"));
    }

    #[test]
    fn load_service_rejects_empty_settings() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("appconfig-probe.toml");
        std::fs::write(&path, "").unwrap();

        let err = load_service(&path).err().unwrap();
        assert!(err.to_string().contains("no [[check]] tables"));
    }

    #[test]
    fn load_service_registers_checks() {
        // SAFETY: test-only variable with a unique name.
        unsafe { std::env::set_var("APPCONFIG_CLI_TEST_TOKEN", "token") };
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("appconfig-probe.toml");
        std::fs::write(
            &path,
            r#"
[[check]]
endpoint = "http://localhost:8080"
keys = ["a"]
token_env = "APPCONFIG_CLI_TEST_TOKEN"

[[check]]
name = "secondary"
endpoint = "http://localhost:8081"
token_env = "APPCONFIG_CLI_TEST_TOKEN"
"#,
        )
        .unwrap();

        let service = load_service(&path).unwrap();
        let names: Vec<_> = service.registrations().iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["azureappconfiguration", "secondary"]);
    }

    #[test]
    fn load_service_missing_file_fails() {
        let err = load_service(Path::new("/nonexistent/appconfig-probe.toml"))
            .err()
            .unwrap();
        assert!(err.to_string().contains("reading settings"));
    }
}
