use anyhow::Result;
use authguard_common::AppConfig;
use std::path::PathBuf;
use tracing::info;

/// Resolved configuration with the source path it was read from.
pub struct ProxyConfig {
    pub config: AppConfig,
    pub config_path: PathBuf,
}

impl ProxyConfig {
    pub fn load(path: &str) -> Result<Self> {
        info!(path = path, "loading configuration");
        let config = AppConfig::load(path)?;
        info!(
            policies = config.auth_limit.policies.len(),
            upstream = %config.upstream.name,
            "configuration loaded"
        );
        Ok(Self {
            config,
            config_path: PathBuf::from(path),
        })
    }
}
