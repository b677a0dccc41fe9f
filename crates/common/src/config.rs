use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::error::{AuthGuardError, AuthGuardResult};

/// Top-level gateway configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub upstream: UpstreamConfig,
    #[serde(default)]
    pub auth_limit: AuthLimitConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub listen: Vec<String>,
    #[serde(default)]
    pub admin: AdminConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdminConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_admin_listen")]
    pub listen: String,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            listen: default_admin_listen(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamConfig {
    pub name: String,
    pub servers: Vec<UpstreamServer>,
    #[serde(default)]
    pub tls: bool,
    #[serde(default)]
    pub sni: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamServer {
    pub addr: String,
    #[serde(default = "default_weight")]
    pub weight: u32,
}

/// Settings for the authentication endpoint limiter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthLimitConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Extra retention added to each attempt record beyond its policy window.
    #[serde(default = "default_grace_secs")]
    pub grace_secs: u64,
    /// Denial-time attempt count, as a multiple of the limit, that is logged
    /// as an escalation.
    #[serde(default = "default_escalation_factor")]
    pub escalation_factor: u32,
    /// When set, denied attempts are stored and keep the block alive.
    #[serde(default)]
    pub record_denied_attempts: bool,
    /// Honor `X-Forwarded-For` / `X-Real-IP` when resolving the client address.
    #[serde(default = "default_true")]
    pub trust_forwarded_headers: bool,
    #[serde(default = "default_cleanup_interval")]
    pub cleanup_interval_secs: u64,
    #[serde(default = "default_policies")]
    pub policies: Vec<PolicyConfig>,
}

impl Default for AuthLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            grace_secs: default_grace_secs(),
            escalation_factor: default_escalation_factor(),
            record_denied_attempts: false,
            trust_forwarded_headers: true,
            cleanup_interval_secs: default_cleanup_interval(),
            policies: default_policies(),
        }
    }
}

/// One guarded endpoint: at most `limit` POSTs per `window_secs`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyConfig {
    pub path: String,
    pub window_secs: u64,
    pub limit: u32,
}

impl PolicyConfig {
    pub fn new(path: &str, window_secs: u64, limit: u32) -> Self {
        Self {
            path: path.to_string(),
            window_secs,
            limit,
        }
    }
}

// Default value helpers
fn default_admin_listen() -> String {
    "127.0.0.1:9090".to_string()
}
fn default_true() -> bool {
    true
}
fn default_weight() -> u32 {
    1
}
fn default_grace_secs() -> u64 {
    5 * 60
}
fn default_escalation_factor() -> u32 {
    2
}
fn default_cleanup_interval() -> u64 {
    60
}

/// The built-in policy table for the storefront's auth endpoints.
pub fn default_policies() -> Vec<PolicyConfig> {
    vec![
        PolicyConfig::new("/api/auth/login", 15 * 60, 5),
        PolicyConfig::new("/api/auth/register", 60 * 60, 3),
        PolicyConfig::new("/api/auth/refresh-token", 5 * 60, 10),
        PolicyConfig::new("/api/auth/forgot-password", 60 * 60, 3),
        PolicyConfig::new("/api/auth/reset-password", 30 * 60, 5),
    ]
}

impl AppConfig {
    /// Load configuration from a YAML file.
    pub fn load(path: &str) -> AuthGuardResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse and validate configuration from a YAML document.
    pub fn from_yaml(content: &str) -> AuthGuardResult<Self> {
        let config: Self = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration for consistency.
    pub fn validate(&self) -> AuthGuardResult<()> {
        if self.server.listen.is_empty() {
            return Err(AuthGuardError::Config(
                "server.listen must have at least one address".to_string(),
            ));
        }

        if self.upstream.servers.is_empty() {
            return Err(AuthGuardError::Config(format!(
                "upstream '{}' has no servers",
                self.upstream.name
            )));
        }

        self.auth_limit.validate()
    }
}

impl AuthLimitConfig {
    pub fn validate(&self) -> AuthGuardResult<()> {
        if self.escalation_factor == 0 {
            return Err(AuthGuardError::Config(
                "auth_limit.escalation_factor must be at least 1".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for policy in &self.policies {
            let invalid = |reason: &str| AuthGuardError::InvalidPolicy {
                path: policy.path.clone(),
                reason: reason.to_string(),
            };

            if !policy.path.starts_with('/') {
                return Err(invalid("path must start with '/'"));
            }
            if policy.window_secs == 0 {
                return Err(invalid("window_secs must be greater than zero"));
            }
            if policy.limit == 0 {
                return Err(invalid("limit must be greater than zero"));
            }
            if !seen.insert(policy.path.to_ascii_lowercase()) {
                return Err(invalid("duplicate path"));
            }
        }

        tracing::debug!(policies = self.policies.len(), "auth limit config validated");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
server:
  listen: ["0.0.0.0:8080"]
upstream:
  name: auth-service
  servers:
    - addr: "127.0.0.1:5000"
"#;

    #[test]
    fn minimal_config_uses_default_policies() {
        let config = AppConfig::from_yaml(MINIMAL).unwrap();
        let limits = &config.auth_limit;

        assert!(limits.enabled);
        assert_eq!(limits.grace_secs, 300);
        assert_eq!(limits.escalation_factor, 2);
        assert!(!limits.record_denied_attempts);
        assert_eq!(limits.policies, default_policies());
        assert_eq!(config.server.admin.listen, "127.0.0.1:9090");
        assert_eq!(config.upstream.servers[0].weight, 1);
    }

    #[test]
    fn default_table_matches_baseline() {
        let policies = default_policies();
        let table: Vec<(&str, u64, u32)> = policies
            .iter()
            .map(|p| (p.path.as_str(), p.window_secs, p.limit))
            .collect();

        assert_eq!(
            table,
            vec![
                ("/api/auth/login", 900, 5),
                ("/api/auth/register", 3600, 3),
                ("/api/auth/refresh-token", 300, 10),
                ("/api/auth/forgot-password", 3600, 3),
                ("/api/auth/reset-password", 1800, 5),
            ]
        );
    }

    #[test]
    fn policies_can_be_overridden() {
        let yaml = format!(
            "{}auth_limit:\n  record_denied_attempts: true\n  policies:\n    - path: /api/auth/login\n      window_secs: 60\n      limit: 2\n",
            MINIMAL
        );
        let config = AppConfig::from_yaml(&yaml).unwrap();

        assert!(config.auth_limit.record_denied_attempts);
        assert_eq!(
            config.auth_limit.policies,
            vec![PolicyConfig::new("/api/auth/login", 60, 2)]
        );
    }

    #[test]
    fn rejects_zero_limit() {
        let mut limits = AuthLimitConfig::default();
        limits.policies.push(PolicyConfig::new("/api/auth/otp", 60, 0));

        let err = limits.validate().unwrap_err();
        assert!(matches!(err, AuthGuardError::InvalidPolicy { ref path, .. } if path == "/api/auth/otp"));
    }

    #[test]
    fn rejects_zero_window_and_relative_path() {
        let limits = AuthLimitConfig {
            policies: vec![PolicyConfig::new("/api/auth/login", 0, 5)],
            ..AuthLimitConfig::default()
        };
        assert!(limits.validate().is_err());

        let limits = AuthLimitConfig {
            policies: vec![PolicyConfig::new("api/auth/login", 60, 5)],
            ..AuthLimitConfig::default()
        };
        assert!(limits.validate().is_err());
    }

    #[test]
    fn rejects_case_insensitive_duplicates() {
        let limits = AuthLimitConfig {
            policies: vec![
                PolicyConfig::new("/api/auth/login", 60, 5),
                PolicyConfig::new("/API/Auth/Login", 120, 3),
            ],
            ..AuthLimitConfig::default()
        };
        assert!(limits.validate().is_err());
    }

    #[test]
    fn rejects_empty_listen_and_upstream() {
        let mut config = AppConfig::from_yaml(MINIMAL).unwrap();
        config.server.listen.clear();
        assert!(matches!(config.validate(), Err(AuthGuardError::Config(_))));

        let mut config = AppConfig::from_yaml(MINIMAL).unwrap();
        config.upstream.servers.clear();
        assert!(matches!(config.validate(), Err(AuthGuardError::Config(_))));
    }

    #[test]
    fn malformed_yaml_is_reported() {
        let err = AppConfig::from_yaml("server: [").unwrap_err();
        assert!(matches!(err, AuthGuardError::Yaml(_)));
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let err = AppConfig::load("/nonexistent/authguard.yaml").unwrap_err();
        assert!(matches!(err, AuthGuardError::Io(_)));
        assert!(err.to_string().starts_with("I/O error"));
    }
}
