//! Error types for towers

use thiserror::Error;

/// Body used for every 5xx response. Internal details only go to the log.
pub const INTERNAL_ERROR_MESSAGE: &str = "Internal server error";

/// Towers error types
#[derive(Error, Debug)]
pub enum Error {
    // Registration Errors
    #[error("Function {0} is already registered")]
    DuplicateFunction(String),

    #[error("Invalid function descriptor: {0}")]
    InvalidDescriptor(String),

    #[error("No {0} hook installed while registered functions require it")]
    MissingHook(&'static str),

    // Dispatch Errors
    #[error("Function not found: {0}")]
    FunctionNotFound(String),

    #[error("Unauthorized")]
    Unauthorized,

    /// Carries the authorization hook's denial reason verbatim
    #[error("{0}")]
    Forbidden(String),

    #[error("Handler fault: {0}")]
    HandlerFault(String),

    // Transport Errors
    #[error("{0}")]
    Upload(String),

    #[error("Invalid request body: {0}")]
    InvalidBody(String),

    #[error("Payload too large: max {max_size} bytes")]
    PayloadTooLarge { max_size: usize },

    #[error("TLS error: {0}")]
    Tls(String),

    // General Errors
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("TOML error: {0}")]
    TomlError(#[from] toml::de::Error),
}

/// Result type alias for towers operations
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// HTTP status code for each error type
    #[must_use]
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Upload(_) | Self::InvalidBody(_) => 400,
            Self::Unauthorized => 401,
            Self::Forbidden(_) => 403,
            Self::FunctionNotFound(_) => 404,
            Self::PayloadTooLarge { .. } => 413,
            Self::DuplicateFunction(_)
            | Self::InvalidDescriptor(_)
            | Self::MissingHook(_)
            | Self::HandlerFault(_)
            | Self::Tls(_)
            | Self::ConfigError(_)
            | Self::IoError(_)
            | Self::JsonError(_)
            | Self::TomlError(_) => 500,
        }
    }

    /// Whether the error is a server-side fault rather than a caller error
    #[must_use]
    pub fn is_internal(&self) -> bool {
        self.status_code() >= 500
    }

    /// Single-field JSON body reported to the caller
    #[must_use]
    pub fn to_body(&self) -> serde_json::Value {
        let message = if self.is_internal() {
            INTERNAL_ERROR_MESSAGE.to_string()
        } else {
            self.to_string()
        };
        serde_json::json!({ "error": message })
    }
}
