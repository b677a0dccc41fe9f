mod config;
mod context;
mod service;
mod upstream;

use anyhow::Result;
use authguard_admin::SharedStateType;
use authguard_rate_limit::AuthRateLimiter;
use pingora_core::server::Server;
use pingora_proxy::http_proxy_service;
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::ProxyConfig;
use crate::service::AuthGuardProxy;

fn main() -> Result<()> {
    // Initialize tracing
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt()
        .with_env_filter(filter)
        .json()
        .init();

    // Parse command-line args for config path
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config/authguard.yaml".to_string());

    info!(config_path = %config_path, "starting auth guard");

    let proxy_config = ProxyConfig::load(&config_path)?;
    let app_config = proxy_config.config.clone();

    let limiter = AuthRateLimiter::new(&app_config.auth_limit)?;
    limiter.start_cleanup_task()?;

    let state = authguard_admin::new_shared_state(app_config.clone(), limiter);

    // Create Pingora server
    let mut server = Server::new(None)?;
    server.bootstrap();

    let guard_proxy = AuthGuardProxy::new(state.clone());
    let mut proxy_service = http_proxy_service(&server.configuration, guard_proxy);

    for listen_addr in &app_config.server.listen {
        info!(addr = %listen_addr, "adding listener");
        proxy_service.add_tcp(listen_addr);
    }

    server.add_service(proxy_service);

    if app_config.server.admin.enabled {
        server.add_service(pingora_core::services::background::background_service(
            "admin API",
            AdminBackgroundService {
                listen_addr: app_config.server.admin.listen.clone(),
                state,
            },
        ));
    }

    info!(
        config_path = %proxy_config.config_path.display(),
        "auth guard started successfully"
    );
    server.run_forever();
}

/// Background service to run the admin API alongside Pingora.
struct AdminBackgroundService {
    listen_addr: String,
    state: SharedStateType,
}

#[async_trait::async_trait]
impl pingora_core::services::background::BackgroundService for AdminBackgroundService {
    async fn start(&self, mut shutdown: pingora_core::server::ShutdownWatch) {
        info!(addr = %self.listen_addr, "starting admin API");

        tokio::select! {
            result = authguard_admin::run_admin_server(self.state.clone(), &self.listen_addr) => {
                if let Err(e) = result {
                    error!(error = %e, "admin API server error");
                }
            }
            _ = shutdown.changed() => {
                info!("admin API shutting down");
            }
        }
    }
}
