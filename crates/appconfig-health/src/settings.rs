//! Probe settings file (`appconfig-probe.toml`).
//!
//! ```toml
//! [[check]]
//! name = "appconfig-prod"
//! endpoint = "https://demo.azconfig.io"
//! keys = ["feature:checkout", "app:color"]
//! token_env = "APPCONFIG_TOKEN"
//! failure_status = "degraded"
//! tags = ["ready"]
//! timeout = "5s"
//! ```

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::cache::ClientCache;
use crate::credential::{StaticTokenCredential, TokenCredential};
use crate::error::ConstructionError;
use crate::registration::AppConfigurationCheckBuilder;
use crate::registry::{HealthChecksBuilder, HealthStatus};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProbeSettings {
    #[serde(default, rename = "check")]
    pub checks: Vec<CheckSettings>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckSettings {
    pub name: Option<String>,
    pub endpoint: String,
    #[serde(default)]
    pub keys: Vec<String>,
    /// Environment variable holding the bearer token.
    pub token_env: String,
    pub failure_status: Option<HealthStatus>,
    #[serde(default)]
    pub tags: Vec<String>,
    pub timeout: Option<String>,
}

impl ProbeSettings {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> anyhow::Result<Self> {
        let settings: ProbeSettings = toml::from_str(content)?;
        Ok(settings)
    }

    pub fn to_toml_string(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Register one probe per `[[check]]` table, sharing `clients`.
    ///
    /// Tokens are read from the environment now, so a missing variable fails
    /// registration rather than the first check.
    pub fn register_all(
        &self,
        builder: &mut HealthChecksBuilder,
        clients: Arc<ClientCache>,
    ) -> Result<(), ConstructionError> {
        for check in &self.checks {
            check.register(builder, Arc::clone(&clients))?;
        }
        Ok(())
    }
}

impl CheckSettings {
    pub fn register(
        &self,
        builder: &mut HealthChecksBuilder,
        clients: Arc<ClientCache>,
    ) -> Result<(), ConstructionError> {
        let credential: Arc<dyn TokenCredential> = Arc::new(
            StaticTokenCredential::from_env(&self.token_env)
                .map_err(|e| ConstructionError::invalid("token_env", e.0))?,
        );

        let keys = self.keys.clone();
        let mut check = AppConfigurationCheckBuilder::new()
            .endpoint(self.endpoint.as_str())
            .credential(credential)
            .setup(move |options| {
                for key in &keys {
                    options.add_key(key.as_str());
                }
            })
            .tags(self.tags.iter().cloned())
            .client_cache(clients);

        if let Some(name) = &self.name {
            check = check.name(name.as_str());
        }
        if let Some(status) = self.failure_status {
            check = check.failure_status(status);
        }
        if let Some(raw) = &self.timeout {
            let timeout = parse_duration(raw).ok_or_else(|| {
                ConstructionError::invalid("timeout", format!("unrecognised duration `{raw}`"))
            })?;
            check = check.timeout(timeout);
        }

        check.register(builder)?;
        Ok(())
    }
}

/// Parse a duration string like "5s", "500ms", "1m"; bare numbers are seconds.
pub fn parse_duration(s: &str) -> Option<Duration> {
    let s = s.trim();
    if let Some(ms) = s.strip_suffix("ms") {
        ms.trim().parse::<u64>().ok().map(Duration::from_millis)
    } else if let Some(secs) = s.strip_suffix('s') {
        secs.trim().parse::<u64>().ok().map(Duration::from_secs)
    } else if let Some(mins) = s.strip_suffix('m') {
        mins.trim()
            .parse::<u64>()
            .ok()
            .and_then(|m| m.checked_mul(60))
            .map(Duration::from_secs)
    } else {
        s.parse::<u64>().ok().map(Duration::from_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::HttpClientFactory;

    const SAMPLE: &str = r#"
[[check]]
name = "appconfig-prod"
endpoint = "https://demo.azconfig.io"
keys = ["feature:checkout", "app:color"]
token_env = "APPCONFIG_SETTINGS_TEST_TOKEN"
failure_status = "degraded"
tags = ["ready"]
timeout = "500ms"

[[check]]
endpoint = "http://localhost:8080"
token_env = "APPCONFIG_SETTINGS_TEST_TOKEN"
"#;

    fn clients() -> Arc<ClientCache> {
        Arc::new(ClientCache::new(Arc::new(HttpClientFactory::new().unwrap())))
    }

    #[test]
    fn parses_check_tables() {
        let settings = ProbeSettings::parse(SAMPLE).unwrap();
        assert_eq!(settings.checks.len(), 2);

        let prod = &settings.checks[0];
        assert_eq!(prod.name.as_deref(), Some("appconfig-prod"));
        assert_eq!(prod.keys, vec!["feature:checkout", "app:color"]);
        assert_eq!(prod.failure_status, Some(HealthStatus::Degraded));
        assert_eq!(prod.timeout.as_deref(), Some("500ms"));

        let local = &settings.checks[1];
        assert!(local.name.is_none());
        assert!(local.keys.is_empty());
        assert!(local.tags.is_empty());
    }

    #[test]
    fn empty_file_has_no_checks() {
        let settings = ProbeSettings::parse("").unwrap();
        assert!(settings.checks.is_empty());
    }

    #[test]
    fn settings_round_trip_through_toml() {
        let settings = ProbeSettings::parse(SAMPLE).unwrap();
        let rendered = settings.to_toml_string().unwrap();
        assert!(rendered.contains("appconfig-prod"));
        assert!(rendered.contains("[[check]]"));
    }

    #[test]
    fn from_file_reads_settings() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("appconfig-probe.toml");
        std::fs::write(&path, SAMPLE).unwrap();

        let settings = ProbeSettings::from_file(&path).unwrap();
        assert_eq!(settings.checks.len(), 2);
    }

    #[test]
    fn register_all_builds_registrations() {
        // SAFETY: test-only variable with a unique name.
        unsafe { std::env::set_var("APPCONFIG_SETTINGS_TEST_TOKEN", "token") };
        let settings = ProbeSettings::parse(SAMPLE).unwrap();
        let mut builder = HealthChecksBuilder::new();

        settings.register_all(&mut builder, clients()).unwrap();

        let regs = builder.registrations();
        assert_eq!(regs.len(), 2);
        assert_eq!(regs[0].name, "appconfig-prod");
        assert_eq!(regs[0].failure_status, HealthStatus::Degraded);
        assert_eq!(regs[0].timeout, Some(Duration::from_millis(500)));
        assert!(regs[0].tags.contains("ready"));
        assert_eq!(regs[1].name, "azureappconfiguration");
        assert_eq!(regs[1].failure_status, HealthStatus::Unhealthy);
    }

    #[test]
    fn missing_token_variable_fails_registration() {
        let settings = ProbeSettings::parse(
            r#"
[[check]]
endpoint = "http://localhost"
token_env = "APPCONFIG_SETTINGS_TEST_MISSING"
"#,
        )
        .unwrap();
        let mut builder = HealthChecksBuilder::new();

        let err = settings.register_all(&mut builder, clients()).unwrap_err();
        assert!(matches!(
            err,
            ConstructionError::InvalidArgument { name: "token_env", .. }
        ));
    }

    #[test]
    fn bad_timeout_fails_registration() {
        // SAFETY: test-only variable with a unique name.
        unsafe { std::env::set_var("APPCONFIG_SETTINGS_TEST_TOKEN_2", "token") };
        let settings = ProbeSettings::parse(
            r#"
[[check]]
endpoint = "http://localhost"
token_env = "APPCONFIG_SETTINGS_TEST_TOKEN_2"
timeout = "soon"
"#,
        )
        .unwrap();

        let err = settings
            .register_all(&mut HealthChecksBuilder::new(), clients())
            .unwrap_err();
        assert!(matches!(
            err,
            ConstructionError::InvalidArgument { name: "timeout", .. }
        ));
    }

    #[test]
    fn parse_duration_units() {
        assert_eq!(parse_duration("5s"), Some(Duration::from_secs(5)));
        assert_eq!(parse_duration("500ms"), Some(Duration::from_millis(500)));
        assert_eq!(parse_duration("2m"), Some(Duration::from_secs(120)));
        assert_eq!(parse_duration("10"), Some(Duration::from_secs(10)));
        assert_eq!(parse_duration("soon"), None);
    }

    #[test]
    fn oversized_minutes_are_rejected() {
        assert_eq!(parse_duration("400000000000000000m"), None);

        // SAFETY: test-only variable with a unique name.
        unsafe { std::env::set_var("APPCONFIG_SETTINGS_TEST_TOKEN_3", "token") };
        let settings = ProbeSettings::parse(
            r#"
[[check]]
endpoint = "http://localhost"
token_env = "APPCONFIG_SETTINGS_TEST_TOKEN_3"
timeout = "400000000000000000m"
"#,
        )
        .unwrap();

        let err = settings
            .register_all(&mut HealthChecksBuilder::new(), clients())
            .unwrap_err();
        assert!(matches!(
            err,
            ConstructionError::InvalidArgument { name: "timeout", .. }
        ));
    }
}
