//! # Application State Management
//!
//! Shared state handed to every HTTP handler through `web::Data`.
//!
//! ## What is shared:
//! - **config**: loaded once at startup, never changed afterwards
//! - **registry**: connection handles, built before the server binds and read-only after
//! - **metrics**: request/error counters updated by middleware on every request
//!
//! Only the metrics are mutated while serving, so they are the only part
//! behind a lock. Config and registry are plain `Arc`s.

use crate::config::AppConfig;
use crate::error::StatusPolicy;
use crate::registry::ConnectionRegistry;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Instant;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub registry: Arc<ConnectionRegistry>,

    /// Performance metrics (constantly being updated by requests)
    pub metrics: Arc<RwLock<AppMetrics>>,

    /// When the server started
    pub start_time: Instant,
}

/// Performance metrics collected across all HTTP requests.
#[derive(Debug, Default, Clone)]
pub struct AppMetrics {
    /// Total number of HTTP requests processed since server start
    pub request_count: u64,

    /// Total number of error responses since server start
    pub error_count: u64,

    /// Remote predict calls currently awaiting a reply
    pub active_relays: u32,

    /// Key: endpoint name (e.g., "POST /transcribe")
    pub endpoint_metrics: HashMap<String, EndpointMetric>,
}

/// Detailed performance metrics for a specific API endpoint.
#[derive(Debug, Default, Clone)]
pub struct EndpointMetric {
    pub request_count: u64,
    pub total_duration_ms: u64,
    pub error_count: u64,
}

impl AppState {
    pub fn new(config: AppConfig, registry: ConnectionRegistry) -> Self {
        Self {
            config: Arc::new(config),
            registry: Arc::new(registry),
            metrics: Arc::new(RwLock::new(AppMetrics::default())),
            start_time: Instant::now(),
        }
    }

    pub fn status_policy(&self) -> StatusPolicy {
        StatusPolicy::from_flag(self.config.server.distinct_error_status)
    }

    /// Increment the total request counter (called by middleware for every request).
    pub fn increment_request_count(&self) {
        let mut metrics = self.metrics.write().unwrap();
        metrics.request_count += 1;
    }

    /// Increment the total error counter (called for every 4xx/5xx response).
    pub fn increment_error_count(&self) {
        let mut metrics = self.metrics.write().unwrap();
        metrics.error_count += 1;
    }

    /// Record detailed metrics for a specific endpoint.
    ///
    /// The first request to an endpoint creates its entry with zeroed counters.
    pub fn record_endpoint_request(&self, endpoint: &str, duration_ms: u64, is_error: bool) {
        let mut metrics = self.metrics.write().unwrap();

        let endpoint_metric = metrics.endpoint_metrics.entry(endpoint.to_string()).or_default();

        endpoint_metric.request_count += 1;
        endpoint_metric.total_duration_ms += duration_ms;

        if is_error {
            endpoint_metric.error_count += 1;
        }
    }

    /// Mark a remote call as started. The returned guard marks it finished on drop,
    /// so the counter stays right on early returns and errors.
    pub fn track_relay(&self) -> RelayGuard {
        self.metrics.write().unwrap().active_relays += 1;
        RelayGuard {
            metrics: self.metrics.clone(),
        }
    }

    /// Get a snapshot of current metrics (used for the /metrics endpoint).
    pub fn get_metrics_snapshot(&self) -> AppMetrics {
        self.metrics.read().unwrap().clone()
    }

    pub fn get_uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}

/// Decrements the in-flight relay counter when dropped.
pub struct RelayGuard {
    metrics: Arc<RwLock<AppMetrics>>,
}

impl Drop for RelayGuard {
    fn drop(&mut self) {
        let mut metrics = self.metrics.write().unwrap();
        // Underflow protection
        if metrics.active_relays > 0 {
            metrics.active_relays -= 1;
        }
    }
}

impl EndpointMetric {
    pub fn average_duration_ms(&self) -> f64 {
        if self.request_count > 0 {
            self.total_duration_ms as f64 / self.request_count as f64
        } else {
            0.0
        }
    }

    /// Error rate as a fraction (0.0 to 1.0).
    pub fn error_rate(&self) -> f64 {
        if self.request_count > 0 {
            self.error_count as f64 / self.request_count as f64
        } else {
            0.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state() -> AppState {
        AppState::new(AppConfig::default(), ConnectionRegistry::default())
    }

    #[test]
    fn test_endpoint_metrics() {
        let state = state();
        state.record_endpoint_request("POST /transcribe", 100, false);
        state.record_endpoint_request("POST /transcribe", 300, true);

        let snapshot = state.get_metrics_snapshot();
        let metric = &snapshot.endpoint_metrics["POST /transcribe"];
        assert_eq!(metric.request_count, 2);
        assert_eq!(metric.average_duration_ms(), 200.0);
        assert_eq!(metric.error_rate(), 0.5);
        assert_eq!(EndpointMetric::default().error_rate(), 0.0);
    }

    #[test]
    fn test_relay_guard_tracks_in_flight_calls() {
        let state = state();
        {
            let _first = state.track_relay();
            let _second = state.track_relay();
            assert_eq!(state.get_metrics_snapshot().active_relays, 2);
        }
        assert_eq!(state.get_metrics_snapshot().active_relays, 0);
    }

    #[test]
    fn test_status_policy_follows_config() {
        let mut config = AppConfig::default();
        config.server.distinct_error_status = true;
        let state = AppState::new(config, ConnectionRegistry::default());
        assert_eq!(state.status_policy(), StatusPolicy::Distinct);
    }
}
