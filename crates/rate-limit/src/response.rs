use chrono::{DateTime, Duration, SecondsFormat, Utc};
use http::StatusCode;
use serde::Serialize;

use crate::policy::Policy;

/// JSON body of a 429 rejection.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RejectionBody {
    pub error: String,
    pub message: String,
    pub retry_after: i64,
    pub details: RejectionDetails,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RejectionDetails {
    pub endpoint: String,
    pub limit: u32,
    pub window: String,
    pub reset_time: String,
}

/// A fully composed rate-limit rejection, ready to be written to the client.
#[derive(Debug, Clone)]
pub struct Rejection {
    pub status: StatusCode,
    pub headers: Vec<(&'static str, String)>,
    pub body: RejectionBody,
}

impl Rejection {
    /// Compose the rejection for `policy` as seen at `now`.
    pub fn compose(policy: &Policy, now: DateTime<Utc>) -> Self {
        let retry_after = policy.window_secs();
        let reset = now
            .checked_add_signed(policy.window)
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        let window = format_window(policy.window);

        let headers = vec![
            ("X-RateLimit-Limit", policy.limit.to_string()),
            ("X-RateLimit-Remaining", "0".to_string()),
            ("X-RateLimit-Reset", reset.timestamp().to_string()),
            ("Retry-After", retry_after.to_string()),
            ("Content-Type", "application/json".to_string()),
        ];

        let body = RejectionBody {
            error: "Rate limit exceeded".to_string(),
            message: format!(
                "Too many requests to {}. Maximum {} attempts allowed per {}.",
                policy.endpoint, policy.limit, window
            ),
            retry_after,
            details: RejectionDetails {
                endpoint: policy.endpoint.clone(),
                limit: policy.limit,
                window,
                reset_time: reset.to_rfc3339_opts(SecondsFormat::Millis, true),
            },
        };

        Self {
            status: StatusCode::TOO_MANY_REQUESTS,
            headers,
            body,
        }
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Serialized JSON body.
    pub fn body_bytes(&self) -> Vec<u8> {
        match serde_json::to_vec(&self.body) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::error!(error = %e, "failed to serialize rejection body");
                br#"{"error":"Rate limit exceeded"}"#.to_vec()
            }
        }
    }
}

/// Render a window in its largest whole unit, e.g. `"15 minute(s)"`.
pub fn format_window(window: Duration) -> String {
    if window.num_days() >= 1 {
        format!("{} day(s)", window.num_days())
    } else if window.num_hours() >= 1 {
        format!("{} hour(s)", window.num_hours())
    } else if window.num_minutes() >= 1 {
        format!("{} minute(s)", window.num_minutes())
    } else {
        format!("{} second(s)", window.num_seconds())
    }
}
