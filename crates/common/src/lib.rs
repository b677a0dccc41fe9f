pub mod config;
pub mod error;

pub use config::{
    AdminConfig, AppConfig, AuthLimitConfig, PolicyConfig, ServerConfig, UpstreamConfig,
    UpstreamServer,
};
pub use error::{AuthGuardError, AuthGuardResult};
