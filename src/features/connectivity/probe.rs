//! Liveness probes.
//!
//! The platform's reachability flag is trusted only as far as a real round
//! trip to the backend confirms it.

use std::time::Duration;

use async_trait::async_trait;

use crate::config::{BackendConfig, MonitorConfig};
use crate::error::ExecutorError;

/// Active connectivity check.
#[async_trait]
pub trait LivenessProbe: Send + Sync {
    /// Whether the backend answered in time.
    ///
    /// Never fails: an error is simply a dead link.
    async fn probe(&self) -> bool;
}

/// Probe issuing `HEAD` against the backend's health endpoint.
#[derive(Debug, Clone)]
pub struct HttpProbe {
    client: reqwest::Client,
    url: String,
}

impl HttpProbe {
    /// Build a probe from backend and monitor settings.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(backend: &BackendConfig, monitor: &MonitorConfig) -> Result<Self, ExecutorError> {
        Self::with_timeout(backend.health_url(), monitor.probe_timeout())
    }

    /// Build a probe for an explicit URL.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn with_timeout(url: impl Into<String>, timeout: Duration) -> Result<Self, ExecutorError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ExecutorError::Application(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            url: url.into(),
        })
    }

    /// Probed URL.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl LivenessProbe for HttpProbe {
    async fn probe(&self) -> bool {
        match self.client.head(&self.url).send().await {
            Ok(response) => {
                let ok = response.status().is_success();
                if !ok {
                    tracing::debug!(url = %self.url, status = %response.status(), "liveness probe rejected");
                }
                ok
            }
            Err(e) => {
                tracing::debug!(url = %self.url, error = %e, "liveness probe failed");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_probe_url_from_config() {
        let backend = BackendConfig {
            base_url: "https://api.example.com/".to_string(),
            ..BackendConfig::default()
        };
        let probe = HttpProbe::new(&backend, &MonitorConfig::default()).unwrap();
        assert_eq!(probe.url(), "https://api.example.com/api/health");
    }

    #[tokio::test]
    async fn test_unreachable_host_is_dead() {
        // Port 9 on loopback: nothing listens there
        let probe =
            HttpProbe::with_timeout("http://127.0.0.1:9/api/health", Duration::from_millis(500))
                .unwrap();
        assert!(!probe.probe().await);
    }
}
