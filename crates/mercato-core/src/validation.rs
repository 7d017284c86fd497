//! # Validation Module
//!
//! Input validation utilities for Mercato.
//!
//! ## Validation Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Validation Layers                                  │
//! │                                                                         │
//! │  Layer 1: Service call (Rust)                                          │
//! │  ├── THIS MODULE: format rules (slugs, e-mail, VAT numbers)            │
//! │  └── VAT numbers never fail: they map to a VatNumberStatus             │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 2: Database (SQLite)                                            │
//! │  ├── NOT NULL constraints                                              │
//! │  ├── UNIQUE constraints                                                │
//! │  └── Foreign key constraints                                           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use mercato_core::validation::{get_vat_number_status, validate_slug_format};
//! use mercato_core::types::VatNumberStatus;
//!
//! validate_slug_format("iphone-15-pro").unwrap();
//!
//! let check = get_vat_number_status("gb 111 1111 11");
//! assert_eq!(check.status, VatNumberStatus::Valid);
//! assert_eq!(check.country_code, "GB");
//! ```

use std::sync::LazyLock;

use regex::Regex;

use crate::error::ValidationError;
use crate::types::VatNumberStatus;
use crate::MAX_SLUG_LENGTH;

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

// =============================================================================
// VAT Numbers
// =============================================================================

/// Outcome of [`get_vat_number_status`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VatNumberCheck {
    pub status: VatNumberStatus,
    /// Upper-cased two-letter prefix ("GB"); empty unless `Valid`.
    pub country_code: String,
    /// Remainder with spaces removed; empty unless `Valid`.
    pub number: String,
}

impl VatNumberCheck {
    fn without_parts(status: VatNumberStatus) -> Self {
        VatNumberCheck {
            status,
            country_code: String::new(),
            number: String::new(),
        }
    }
}

/// Two word characters, then the rest.
static VAT_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\w{2})(.*)$").expect("Invalid regex"));

/// Checks the shape of a full VAT number ("GB 111 1111 111").
///
/// ## Rules
/// - Trimmed input shorter than 3 characters → `Empty`
/// - Not two word characters followed by the rest → `Invalid`
/// - Otherwise → `Valid`, with the prefix upper-cased and spaces removed
///
/// Only the shape is checked; no registry lookup happens here.
///
/// ## Example
/// ```rust
/// use mercato_core::validation::get_vat_number_status;
/// use mercato_core::types::VatNumberStatus;
///
/// assert_eq!(get_vat_number_status("GB111111111").status, VatNumberStatus::Valid);
/// assert_eq!(get_vat_number_status(" G ").status, VatNumberStatus::Empty);
/// assert_eq!(get_vat_number_status("--123").status, VatNumberStatus::Invalid);
/// ```
pub fn get_vat_number_status(full_vat_number: &str) -> VatNumberCheck {
    let trimmed = full_vat_number.trim();

    if trimmed.chars().count() < 3 {
        return VatNumberCheck::without_parts(VatNumberStatus::Empty);
    }

    let Some(captures) = VAT_PATTERN.captures(trimmed) else {
        return VatNumberCheck::without_parts(VatNumberStatus::Invalid);
    };

    let prefix = captures.get(1).map_or("", |m| m.as_str());
    let rest = captures.get(2).map_or("", |m| m.as_str());

    let number: String = rest.chars().filter(|c| *c != ' ').collect();
    if prefix.is_empty() || number.is_empty() {
        return VatNumberCheck::without_parts(VatNumberStatus::Empty);
    }

    VatNumberCheck {
        status: VatNumberStatus::Valid,
        country_code: prefix.to_uppercase(),
        number,
    }
}

// =============================================================================
// String Validators
// =============================================================================

/// Validates a slug before it is persisted.
///
/// ## Rules
/// - Must not be empty
/// - At most [`MAX_SLUG_LENGTH`] characters
/// - No whitespace, no `?`, no `#`, must not start with `/`
pub fn validate_slug_format(slug: &str) -> ValidationResult<()> {
    if slug.trim().is_empty() {
        return Err(ValidationError::Required {
            field: "slug".to_string(),
        });
    }

    if slug.chars().count() > MAX_SLUG_LENGTH {
        return Err(ValidationError::TooLong {
            field: "slug".to_string(),
            max: MAX_SLUG_LENGTH,
        });
    }

    if slug.starts_with('/') {
        return Err(ValidationError::InvalidFormat {
            field: "slug".to_string(),
            reason: "must not start with '/'".to_string(),
        });
    }

    if slug
        .chars()
        .any(|c| c.is_whitespace() || c == '?' || c == '#')
    {
        return Err(ValidationError::InvalidFormat {
            field: "slug".to_string(),
            reason: "must not contain whitespace, '?' or '#'".to_string(),
        });
    }

    Ok(())
}

/// Validates a single e-mail address.
///
/// Deliberately loose: one `@`, a non-empty local part and a domain with a dot.
pub fn validate_email_address(address: &str) -> ValidationResult<()> {
    let address = address.trim();

    if address.is_empty() {
        return Err(ValidationError::Required {
            field: "email".to_string(),
        });
    }

    let invalid = || ValidationError::InvalidFormat {
        field: "email".to_string(),
        reason: format!("'{address}' is not an e-mail address"),
    };

    let (local, domain) = address.split_once('@').ok_or_else(invalid)?;
    if local.is_empty()
        || domain.contains('@')
        || !domain.contains('.')
        || domain.starts_with('.')
        || domain.ends_with('.')
        || address.chars().any(char::is_whitespace)
    {
        return Err(invalid());
    }

    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================
