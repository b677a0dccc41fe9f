use std::time::Instant;

/// Per-request context carried through the Pingora proxy pipeline.
pub struct RequestContext {
    /// Request start time for latency measurement.
    pub request_start: Instant,

    /// HTTP method (cached for logging).
    pub method: String,

    /// Request path without the query string.
    pub path: String,

    /// Guarded endpoint the request matched, if any.
    pub endpoint: Option<String>,

    /// Whether the limiter rejected the request.
    pub rate_limited: bool,

    /// Response status code (set during response phase).
    pub response_status: u16,
}

impl RequestContext {
    pub fn new() -> Self {
        Self {
            request_start: Instant::now(),
            method: String::new(),
            path: String::new(),
            endpoint: None,
            rate_limited: false,
            response_status: 0,
        }
    }
}

impl Default for RequestContext {
    fn default() -> Self {
        Self::new()
    }
}
