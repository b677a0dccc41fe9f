use axum::extract::{Query, State};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::state::SharedState;

/// Query parameters for the rejection log endpoint.
#[derive(Debug, Deserialize)]
pub struct LogQuery {
    /// Maximum number of entries to return (default: 100).
    #[serde(default = "default_limit")]
    pub limit: usize,
    /// Number of entries to skip (default: 0).
    #[serde(default)]
    pub offset: usize,
    /// Optional filter by endpoint path.
    pub endpoint: Option<String>,
    /// Only return escalated rejections.
    #[serde(default)]
    pub escalated: bool,
}

fn default_limit() -> usize {
    100
}

/// GET /api/logs
///
/// Returns a paginated, optionally filtered list of recent rejections
/// from the in-memory ring buffer, oldest first.
pub async fn get_logs(
    State(state): State<SharedState>,
    Query(params): Query<LogQuery>,
) -> Json<Value> {
    let logs = match state.rejection_log.read() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    };

    let filtered: Vec<_> = logs
        .iter()
        .filter(|entry| {
            if let Some(ref endpoint) = params.endpoint {
                if !entry.endpoint.eq_ignore_ascii_case(endpoint) {
                    return false;
                }
            }
            !params.escalated || entry.escalated
        })
        .collect();

    let total = filtered.len();

    let page: Vec<_> = filtered
        .into_iter()
        .skip(params.offset)
        .take(params.limit)
        .cloned()
        .collect();

    Json(json!({
        "total": total,
        "offset": params.offset,
        "limit": params.limit,
        "entries": page
    }))
}
