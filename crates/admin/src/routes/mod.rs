pub mod config;
pub mod health;
pub mod logs;
pub mod metrics;
pub mod policies;
pub mod stats;
