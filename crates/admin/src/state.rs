use std::collections::VecDeque;
use std::sync::{Arc, RwLock};

use authguard_common::AppConfig;
use authguard_rate_limit::escalation::truncate_identity;
use authguard_rate_limit::{AuthRateLimiter, GuardOutcome};
use prometheus::{
    HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
};
use serde::{Deserialize, Serialize};

/// Shared state type alias used across all route handlers.
pub type SharedState = Arc<AppState>;

/// Maximum number of rejection events kept in memory.
pub const REJECTION_LOG_CAPACITY: usize = 1000;

/// Central application state: configuration, the live limiter, metrics and
/// the recent rejection log.
pub struct AppState {
    pub config: AppConfig,
    pub limiter: AuthRateLimiter,
    pub metrics: GuardMetrics,
    pub rejection_log: RwLock<VecDeque<RejectionLogEntry>>,
    pub start_time: std::time::Instant,
}

/// Prometheus metrics collected by the gateway.
pub struct GuardMetrics {
    pub registry: Registry,
    pub requests_total: IntCounter,
    pub guarded_requests: IntCounterVec,
    pub rate_limited: IntCounterVec,
    pub escalations_total: IntCounter,
    pub tracked_keys: IntGauge,
    pub request_duration: HistogramVec,
}

/// One rejected request, as shown by `GET /api/logs`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RejectionLogEntry {
    pub id: String,
    pub timestamp: String,
    /// Identity key truncated for display.
    pub identity: String,
    pub endpoint: String,
    pub attempts: usize,
    pub limit: u32,
    pub escalated: bool,
}

impl GuardMetrics {
    /// Create all counters, gauges and histograms against a fresh registry.
    pub fn new() -> Self {
        let registry = Registry::new();

        let requests_total = IntCounter::with_opts(Opts::new(
            "authguard_requests_total",
            "Total number of requests seen by the gateway",
        ))
        .expect("failed to create requests_total counter");

        let guarded_requests = IntCounterVec::new(
            Opts::new(
                "authguard_guarded_requests_total",
                "Requests that matched an auth endpoint policy",
            ),
            &["endpoint"],
        )
        .expect("failed to create guarded_requests counter");

        let rate_limited = IntCounterVec::new(
            Opts::new(
                "authguard_rate_limited_total",
                "Requests rejected by the auth endpoint limiter",
            ),
            &["endpoint"],
        )
        .expect("failed to create rate_limited counter");

        let escalations_total = IntCounter::with_opts(Opts::new(
            "authguard_escalations_total",
            "Denials flagged as likely brute-force attempts",
        ))
        .expect("failed to create escalations_total counter");

        let tracked_keys = IntGauge::with_opts(Opts::new(
            "authguard_tracked_keys",
            "Client/endpoint pairs currently held by the attempt store",
        ))
        .expect("failed to create tracked_keys gauge");

        let request_duration = HistogramVec::new(
            HistogramOpts::new(
                "authguard_request_duration_seconds",
                "Request processing duration in seconds",
            )
            .buckets(vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 5.0]),
            &["status"],
        )
        .expect("failed to create request_duration histogram");

        registry.register(Box::new(requests_total.clone())).expect("failed to register requests_total");
        registry.register(Box::new(guarded_requests.clone())).expect("failed to register guarded_requests");
        registry.register(Box::new(rate_limited.clone())).expect("failed to register rate_limited");
        registry.register(Box::new(escalations_total.clone())).expect("failed to register escalations_total");
        registry.register(Box::new(tracked_keys.clone())).expect("failed to register tracked_keys");
        registry.register(Box::new(request_duration.clone())).expect("failed to register request_duration");

        Self {
            registry,
            requests_total,
            guarded_requests,
            rate_limited,
            escalations_total,
            tracked_keys,
            request_duration,
        }
    }
}

impl Default for GuardMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl AppState {
    pub fn new(config: AppConfig, limiter: AuthRateLimiter) -> Self {
        Self {
            config,
            limiter,
            metrics: GuardMetrics::new(),
            rejection_log: RwLock::new(VecDeque::with_capacity(REJECTION_LOG_CAPACITY)),
            start_time: std::time::Instant::now(),
        }
    }

    /// Append a rejection, dropping the oldest once the log is full.
    pub fn record_rejection(&self, entry: RejectionLogEntry) {
        let mut log = match self.rejection_log.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if log.len() >= REJECTION_LOG_CAPACITY {
            log.pop_front();
        }
        log.push_back(entry);
    }

    /// Account for one limiter outcome in metrics and the rejection log.
    pub fn observe(&self, outcome: &GuardOutcome) {
        match outcome {
            GuardOutcome::Bypass => {}
            GuardOutcome::Admitted { endpoint, .. } => {
                self.metrics
                    .guarded_requests
                    .with_label_values(&[endpoint.as_str()])
                    .inc();
            }
            GuardOutcome::Rejected {
                endpoint,
                identity,
                attempts,
                rejection,
                escalation,
            } => {
                self.metrics
                    .guarded_requests
                    .with_label_values(&[endpoint.as_str()])
                    .inc();
                self.metrics
                    .rate_limited
                    .with_label_values(&[endpoint.as_str()])
                    .inc();
                if escalation.is_some() {
                    self.metrics.escalations_total.inc();
                }

                self.record_rejection(RejectionLogEntry {
                    id: uuid::Uuid::new_v4().to_string(),
                    timestamp: chrono::Utc::now().to_rfc3339(),
                    identity: truncate_identity(identity),
                    endpoint: endpoint.clone(),
                    attempts: *attempts,
                    limit: rejection.body.details.limit,
                    escalated: escalation.is_some(),
                });
            }
        }
    }

    /// Refresh gauges that mirror limiter state.
    pub fn refresh_gauges(&self) {
        self.metrics
            .tracked_keys
            .set(self.limiter.tracked_keys() as i64);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use authguard_common::{AuthLimitConfig, PolicyConfig};
    use authguard_rate_limit::Policy;
    use chrono::{Duration, Utc};

    const CONFIG: &str = r#"
server:
  listen: ["0.0.0.0:8080"]
upstream:
  name: auth-service
  servers:
    - addr: "127.0.0.1:5000"
"#;

    fn state() -> AppState {
        let config = AppConfig::from_yaml(CONFIG).unwrap();
        let limits = AuthLimitConfig {
            policies: vec![PolicyConfig::new("/api/auth/login", 60, 1)],
            ..AuthLimitConfig::default()
        };
        let limiter = AuthRateLimiter::new(&limits).unwrap();
        AppState::new(config, limiter)
    }

    #[test]
    fn observe_counts_and_logs_rejections() {
        let state = state();
        let policy = Policy::new("/api/auth/login", Duration::minutes(1), 1);
        let now = Utc::now();

        let admitted = state.limiter.evaluate_identity("auth_9.9.9.9_abc", &policy, now);
        let rejected = state.limiter.evaluate_identity("auth_9.9.9.9_abc", &policy, now);
        state.observe(&admitted);
        state.observe(&rejected);
        state.observe(&GuardOutcome::Bypass);

        let guarded = state
            .metrics
            .guarded_requests
            .with_label_values(&["/api/auth/login"])
            .get();
        let limited = state
            .metrics
            .rate_limited
            .with_label_values(&["/api/auth/login"])
            .get();
        assert_eq!((guarded, limited), (2, 1));

        let log = state.rejection_log.read().unwrap();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].endpoint, "/api/auth/login");
        assert_eq!(log[0].attempts, 1);
        assert!(!log[0].escalated);
    }

    #[test]
    fn rejection_log_is_bounded() {
        let state = state();
        for i in 0..(REJECTION_LOG_CAPACITY + 5) {
            state.record_rejection(RejectionLogEntry {
                id: i.to_string(),
                timestamp: String::new(),
                identity: String::new(),
                endpoint: "/api/auth/login".to_string(),
                attempts: 1,
                limit: 1,
                escalated: false,
            });
        }

        let log = state.rejection_log.read().unwrap();
        assert_eq!(log.len(), REJECTION_LOG_CAPACITY);
        assert_eq!(log.front().map(|e| e.id.as_str()), Some("5"));
    }

    #[test]
    fn gauge_tracks_store_size() {
        let state = state();
        let policy = Policy::new("/api/auth/login", Duration::minutes(1), 1);
        state.limiter.evaluate_identity("a", &policy, Utc::now());
        state.limiter.evaluate_identity("b", &policy, Utc::now());

        state.refresh_gauges();
        assert_eq!(state.metrics.tracked_keys.get(), 2);
    }
}
