//! Prometheus metrics pushed to a gateway.
//!
//! A run is a short-lived process, so there is no scrape listener. The
//! recorder is rendered once at the end and pushed.

use crate::config::MetricsSettings;
use crate::{Error, Result};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use reqwest::blocking::Client;
use reqwest::header::CONTENT_TYPE;
use std::time::Duration;

const PUSH_TIMEOUT: Duration = Duration::from_secs(5);

/// Job label used in the push gateway path.
pub const JOB_NAME: &str = "adt_twincache";

/// Push gateway configuration.
#[derive(Debug, Clone)]
pub struct PushGatewayConfig {
    /// Push gateway base URI.
    pub endpoint: String,
    /// Optional username for basic auth.
    pub username: Option<String>,
    /// Optional password for basic auth.
    pub password: Option<String>,
}

impl PushGatewayConfig {
    /// Full URL for this job's metric group.
    #[must_use]
    pub fn job_url(&self) -> String {
        let base = self.endpoint.trim_end_matches('/');
        if base.contains("/metrics/job/") {
            base.to_string()
        } else {
            format!("{base}/metrics/job/{JOB_NAME}")
        }
    }
}

/// Metrics configuration.
#[derive(Debug, Clone, Default)]
pub struct MetricsConfig {
    /// Push gateway; metrics are disabled when absent.
    pub push_gateway: Option<PushGatewayConfig>,
}

impl MetricsConfig {
    /// Builds metrics configuration from settings.
    #[must_use]
    pub fn from_settings(settings: &MetricsSettings) -> Self {
        let trimmed = |value: &Option<String>| {
            value
                .as_ref()
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let push_gateway = trimmed(&settings.push_gateway).map(|endpoint| PushGatewayConfig {
            endpoint,
            username: trimmed(&settings.username),
            password: trimmed(&settings.password),
        });
        Self { push_gateway }
    }

    /// Whether a recorder should be installed.
    #[must_use]
    pub const fn enabled(&self) -> bool {
        self.push_gateway.is_some()
    }
}

/// Installed recorder plus where to push it.
#[derive(Debug)]
pub struct MetricsHandle {
    prometheus: PrometheusHandle,
    push_gateway: PushGatewayConfig,
}

impl MetricsHandle {
    /// Renders the current metrics in the Prometheus text format.
    #[must_use]
    pub fn render(&self) -> String {
        let mut payload = self.prometheus.render();
        if !payload.ends_with('\n') {
            payload.push('\n');
        }
        payload
    }
}

/// Installs the global Prometheus recorder when a push gateway is configured.
///
/// # Errors
///
/// Returns an error if a global recorder is already installed.
pub fn install(config: &MetricsConfig) -> Result<Option<MetricsHandle>> {
    let Some(push_gateway) = config.push_gateway.clone() else {
        return Ok(None);
    };

    let prometheus = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| Error::operation("metrics_recorder_install", e))?;

    Ok(Some(MetricsHandle {
        prometheus,
        push_gateway,
    }))
}

/// Pushes the rendered metrics to the gateway.
///
/// Failures are logged and otherwise ignored; a run never fails because its
/// metrics could not be delivered.
pub fn flush(handle: &MetricsHandle) {
    let payload = handle.render();
    let gateway = &handle.push_gateway;
    let url = gateway.job_url();

    tracing::debug!(bytes = payload.len(), endpoint = %url, "Pushing metrics to push gateway");

    let client = Client::new();
    let request = client.put(&url);
    let request = match &gateway.username {
        Some(username) => request.basic_auth(username, gateway.password.as_deref()),
        None => request,
    };

    match request
        .header(CONTENT_TYPE, "text/plain; version=0.0.4")
        .timeout(PUSH_TIMEOUT)
        .body(payload)
        .send()
    {
        Ok(resp) if resp.status().is_success() => {
            tracing::debug!(status = %resp.status(), "Metrics pushed");
        },
        Ok(resp) => tracing::warn!(status = %resp.status(), "Metrics push rejected"),
        Err(err) => tracing::warn!(error = %err, "Failed to push metrics"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disabled_without_gateway() {
        let config = MetricsConfig::from_settings(&MetricsSettings::default());
        assert!(!config.enabled());
        assert!(install(&config).unwrap().is_none());
    }

    #[test]
    fn test_blank_settings_are_ignored() {
        let config = MetricsConfig::from_settings(&MetricsSettings {
            push_gateway: Some("http://gateway:9091".to_string()),
            username: Some("  ".to_string()),
            password: None,
        });
        let gateway = config.push_gateway.unwrap();
        assert!(gateway.username.is_none());
        assert_eq!(
            gateway.job_url(),
            "http://gateway:9091/metrics/job/adt_twincache"
        );
    }

    #[test]
    fn test_job_url_kept_when_present() {
        let gateway = PushGatewayConfig {
            endpoint: "http://gateway:9091/metrics/job/plant/".to_string(),
            username: None,
            password: None,
        };
        assert_eq!(gateway.job_url(), "http://gateway:9091/metrics/job/plant");
    }

    #[test]
    fn test_render_smoke() {
        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = MetricsHandle {
            prometheus: recorder.handle(),
            push_gateway: PushGatewayConfig {
                endpoint: "http://localhost:9091".to_string(),
                username: None,
                password: None,
            },
        };
        ::metrics::with_local_recorder(&recorder, || {
            ::metrics::counter!("twin_cache_test_total").increment(1);
        });
        assert!(handle.render().contains("twin_cache_test_total"));
    }
}
