use axum::extract::State;
use axum::Json;
use serde_json::{json, Value};

use authguard_rate_limit::response::format_window;

use crate::state::SharedState;

/// GET /api/policies
///
/// Lists the endpoint policies the limiter is enforcing.
pub async fn list_policies(State(state): State<SharedState>) -> Json<Value> {
    let policies: Vec<Value> = state
        .limiter
        .registry()
        .policies()
        .into_iter()
        .map(|p| {
            json!({
                "endpoint": p.endpoint,
                "method": "POST",
                "window_secs": p.window_secs(),
                "window": format_window(p.window),
                "limit": p.limit,
            })
        })
        .collect();

    Json(json!({
        "record_denied_attempts": state.config.auth_limit.record_denied_attempts,
        "escalation_factor": state.config.auth_limit.escalation_factor,
        "grace_secs": state.config.auth_limit.grace_secs,
        "policies": policies
    }))
}
