//! # Service Error Types
//!
//! Error types for the storefront services.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Service Error Categories                           │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────────────┐ │
//! │  │  Configuration  │  │    Outbound     │  │      Wrapped            │ │
//! │  │                 │  │                 │  │                         │ │
//! │  │  InvalidConfig  │  │  Mail           │  │  Database (DbError)     │ │
//! │  │  ConfigLoad     │  │  Download       │  │  Core (CoreError)       │ │
//! │  │  ConfigSave     │  │  Io             │  │  Validation             │ │
//! │  │  ProviderNot... │  │                 │  │                         │ │
//! │  └─────────────────┘  └─────────────────┘  └─────────────────────────┘ │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Most business failures never become a `ServiceError`: a failing tax
//! provider yields a zero rate, a failed download becomes an import message,
//! a failed mail increments its attempt counter.

use thiserror::Error;

use mercato_core::{CoreError, ValidationError};
use mercato_db::DbError;

/// Result type alias for service operations.
pub type ServiceResult<T> = Result<T, ServiceError>;

/// Service error type.
#[derive(Debug, Error)]
pub enum ServiceError {
    // =========================================================================
    // Configuration Errors
    // =========================================================================
    /// Invalid configuration value.
    ///
    /// ## When This Occurs
    /// - `validate()` rejects a loaded config
    /// - The mail pickup directory does not exist
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Failed to load config file.
    #[error("Failed to load config: {0}")]
    ConfigLoadFailed(String),

    /// Failed to save config file.
    #[error("Failed to save config: {0}")]
    ConfigSaveFailed(String),

    /// A provider was requested by system name but is not registered.
    #[error("Provider not registered: {0}")]
    ProviderNotFound(String),

    // =========================================================================
    // Outbound Errors
    // =========================================================================
    /// SMTP connection or send failure.
    #[error("Mail error: {0}")]
    Mail(String),

    /// HTTP download failure.
    #[error("Download failed for {url}: {reason}")]
    Download { url: String, reason: String },

    /// File system failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // =========================================================================
    // Wrapped Errors
    // =========================================================================
    #[error(transparent)]
    Database(#[from] DbError),

    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Validation(#[from] ValidationError),
}

// =============================================================================
// Error Conversions
// =============================================================================

impl From<toml::de::Error> for ServiceError {
    fn from(err: toml::de::Error) -> Self {
        ServiceError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::ser::Error> for ServiceError {
    fn from(err: toml::ser::Error) -> Self {
        ServiceError::ConfigSaveFailed(err.to_string())
    }
}

impl From<lettre::transport::smtp::Error> for ServiceError {
    fn from(err: lettre::transport::smtp::Error) -> Self {
        ServiceError::Mail(err.to_string())
    }
}

impl From<lettre::error::Error> for ServiceError {
    fn from(err: lettre::error::Error) -> Self {
        ServiceError::Mail(err.to_string())
    }
}

impl From<lettre::address::AddressError> for ServiceError {
    fn from(err: lettre::address::AddressError) -> Self {
        ServiceError::Mail(err.to_string())
    }
}

// =============================================================================
// Error Categorization
// =============================================================================

impl ServiceError {
    /// Returns true if this error indicates a configuration problem.
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            ServiceError::InvalidConfig(_)
                | ServiceError::ConfigLoadFailed(_)
                | ServiceError::ConfigSaveFailed(_)
                | ServiceError::ProviderNotFound(_)
        )
    }

    /// Returns true if retrying the operation later may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ServiceError::Mail(_)
                | ServiceError::Download { .. }
                | ServiceError::Database(DbError::PoolExhausted)
                | ServiceError::Database(DbError::ConnectionFailed(_))
        )
    }
}
