//! Error types for Skeetsweep

use thiserror::Error;

pub type Result<T> = std::result::Result<T, SweepError>;

#[derive(Error, Debug)]
pub enum SweepError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Platform error: {0}")]
    Platform(#[from] PlatformError),

    #[error("Credential error: {0}")]
    Credentials(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl SweepError {
    /// Returns the appropriate exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            SweepError::InvalidInput(_) => 3,
            SweepError::Platform(PlatformError::Authentication(_)) => 2,
            SweepError::Credentials(_) => 2,
            SweepError::Platform(_) => 1,
            SweepError::Config(_) => 1,
        }
    }

    /// Whether retrying the failed call could succeed
    ///
    /// Only network failures, rate limiting and server-side errors qualify.
    /// Anything the server rejected on its merits is permanent.
    pub fn is_transient(&self) -> bool {
        match self {
            SweepError::Platform(platform_error) => platform_error.is_transient(),
            _ => false,
        }
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid value: {0}")]
    Invalid(String),
}

#[derive(Error, Debug, Clone)]
pub enum PlatformError {
    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Fetch failed: {0}")]
    Fetch(String),

    #[error("Delete failed: {0}")]
    Delete(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Rate limit exceeded: {0}")]
    RateLimit(String),

    #[error("Validation failed: {0}")]
    Validation(String),
}

impl PlatformError {
    pub fn is_transient(&self) -> bool {
        match self {
            PlatformError::Network(_) | PlatformError::RateLimit(_) => true,
            PlatformError::Authentication(_)
            | PlatformError::Fetch(_)
            | PlatformError::Delete(_)
            | PlatformError::Validation(_) => false,
        }
    }
}
