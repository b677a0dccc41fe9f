use axum::extract::State;
use axum::Json;
use serde_json::{json, Value};

use crate::state::SharedState;

/// GET /api/stats
///
/// Returns aggregated traffic statistics derived from Prometheus counters,
/// the attempt store size and the server's uptime.
pub async fn get_stats(State(state): State<SharedState>) -> Json<Value> {
    let uptime_secs = state.start_time.elapsed().as_secs();
    let total_requests = state.metrics.requests_total.get();
    let escalations = state.metrics.escalations_total.get();

    let mut guarded_requests = 0;
    let mut rate_limited_requests = 0;
    let mut per_endpoint = serde_json::Map::new();
    for policy in state.limiter.registry().policies() {
        let endpoint = policy.endpoint.as_str();
        let guarded = state
            .metrics
            .guarded_requests
            .with_label_values(&[endpoint])
            .get();
        let limited = state
            .metrics
            .rate_limited
            .with_label_values(&[endpoint])
            .get();
        guarded_requests += guarded;
        rate_limited_requests += limited;
        per_endpoint.insert(
            endpoint.to_string(),
            json!({ "guarded": guarded, "rate_limited": limited }),
        );
    }

    let requests_per_second = if uptime_secs > 0 {
        total_requests as f64 / uptime_secs as f64
    } else {
        0.0
    };

    Json(json!({
        "total_requests": total_requests,
        "guarded_requests": guarded_requests,
        "rate_limited_requests": rate_limited_requests,
        "escalations": escalations,
        "tracked_keys": state.limiter.tracked_keys(),
        "endpoints": per_endpoint,
        "uptime_secs": uptime_secs,
        "requests_per_second": requests_per_second
    }))
}
