use thiserror::Error;

#[derive(Debug, Error)]
pub enum AuthGuardError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("invalid policy for '{path}': {reason}")]
    InvalidPolicy { path: String, reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

pub type AuthGuardResult<T> = Result<T, AuthGuardError>;
