use std::collections::HashMap;

use authguard_common::{AuthGuardError, AuthGuardResult, PolicyConfig};
use chrono::Duration;

/// Attempt budget for a single guarded endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Policy {
    /// Endpoint path as configured (original casing).
    pub endpoint: String,
    pub window: Duration,
    pub limit: u32,
}

impl Policy {
    pub fn new(endpoint: &str, window: Duration, limit: u32) -> Self {
        Self {
            endpoint: endpoint.to_string(),
            window,
            limit,
        }
    }

    fn from_config(config: &PolicyConfig) -> AuthGuardResult<Self> {
        let window = i64::try_from(config.window_secs)
            .ok()
            .and_then(Duration::try_seconds)
            .ok_or_else(|| AuthGuardError::InvalidPolicy {
                path: config.path.clone(),
                reason: format!("window_secs {} is out of range", config.window_secs),
            })?;

        Ok(Self::new(&config.path, window, config.limit))
    }

    /// Whole seconds in the window, as sent in `Retry-After`.
    pub fn window_secs(&self) -> i64 {
        self.window.num_seconds()
    }
}

/// Immutable endpoint → policy table, built once at startup.
///
/// Only `POST` requests whose path matches a configured endpoint exactly
/// (ignoring ASCII case) are subject to limiting.
#[derive(Debug, Clone, Default)]
pub struct PolicyRegistry {
    policies: HashMap<String, Policy>,
}

impl PolicyRegistry {
    pub fn from_configs(configs: &[PolicyConfig]) -> AuthGuardResult<Self> {
        let mut policies = HashMap::with_capacity(configs.len());
        for config in configs {
            let policy = Policy::from_config(config)?;
            if policies
                .insert(config.path.to_ascii_lowercase(), policy)
                .is_some()
            {
                return Err(AuthGuardError::InvalidPolicy {
                    path: config.path.clone(),
                    reason: "duplicate path".to_string(),
                });
            }
        }
        Ok(Self { policies })
    }

    pub fn lookup(&self, method: &str, path: &str) -> Option<&Policy> {
        if !method.eq_ignore_ascii_case("POST") {
            return None;
        }
        self.policies.get(&path.to_ascii_lowercase())
    }

    /// Policies sorted by endpoint, for display.
    pub fn policies(&self) -> Vec<&Policy> {
        let mut all: Vec<&Policy> = self.policies.values().collect();
        all.sort_by(|a, b| a.endpoint.cmp(&b.endpoint));
        all
    }

    pub fn len(&self) -> usize {
        self.policies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.policies.is_empty()
    }
}
