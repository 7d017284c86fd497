//! # Error Types
//!
//! Domain-specific error types for mercato-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  mercato-core errors (this file)                                       │
//! │  ├── CoreError        - General domain errors                          │
//! │  └── ValidationError  - Input validation failures                      │
//! │                                                                         │
//! │  mercato-db errors (separate crate)                                    │
//! │  └── DbError          - Database operation failures                    │
//! │                                                                         │
//! │  mercato-services errors (separate crate)                              │
//! │  └── ServiceError     - Config, mail, download, store failures         │
//! │                                                                         │
//! │  Flow: ValidationError → CoreError → ServiceError → caller             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## What is NOT an error here
//! Tax provider failures, unresolved slugs and bad VAT numbers are part of
//! normal flow: they come back as a zero rate, `SlugOutcome::NoMatch` and
//! `VatNumberStatus::Invalid` respectively.

use thiserror::Error;

// =============================================================================
// Core Error
// =============================================================================

/// Core business logic errors.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Two money values with different currencies were combined.
    ///
    /// ## When This Occurs
    /// - Adding a EUR shipping fee to a USD subtotal
    /// - Comparing prices that were never exchanged to a common currency
    #[error("Currency mismatch: {left} vs {right}")]
    CurrencyMismatch { left: String, right: String },

    /// No currency could be resolved (empty currency table).
    #[error("Unable to load primary currency")]
    NoCurrency,

    /// A currency with this code is unknown.
    #[error("Currency not found: {0}")]
    CurrencyNotFound(String),

    /// A lazily loaded reference was read before it was loaded.
    #[error("{entity} #{id} has not been loaded")]
    NotLoaded { entity: &'static str, id: i64 },

    /// Validation error (wraps ValidationError).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Field value is too long.
    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    /// Invalid format (e.g., invalid e-mail address, invalid slug).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },

    /// Duplicate value (e.g., URL prefix registered twice).
    #[error("{field} '{value}' already exists")]
    Duplicate { field: String, value: String },
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = CoreError::CurrencyMismatch {
            left: "EUR".to_string(),
            right: "USD".to_string(),
        };
        assert_eq!(err.to_string(), "Currency mismatch: EUR vs USD");

        let err = CoreError::NotLoaded {
            entity: "MediaStorage",
            id: 7,
        };
        assert_eq!(err.to_string(), "MediaStorage #7 has not been loaded");
    }

    #[test]
    fn test_validation_converts_to_core_error() {
        let validation_err = ValidationError::Required {
            field: "slug".to_string(),
        };
        let core_err: CoreError = validation_err.into();
        assert!(matches!(core_err, CoreError::Validation(_)));
    }
}
