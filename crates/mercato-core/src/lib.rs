//! # mercato-core: Pure Business Rules for Mercato
//!
//! This crate holds the storefront rules that are worth more than CRUD glue:
//! tax resolution, price adjustment, slug routing primitives, media import
//! bookkeeping and queued mail conversion. All of it is pure; no I/O here.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Mercato Architecture                             │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                    mercato-services                             │   │
//! │  │  TaxService  SlugRouteTransformer  MediaImporter  MailQueue     │   │
//! │  └──────────────┬──────────────────────────────────┬───────────────┘   │
//! │                 │                                  │                    │
//! │  ┌──────────────▼──────────────────┐   ┌──────────▼────────────────┐   │
//! │  │   ★ mercato-core (THIS CRATE) ★ │   │  mercato-db               │   │
//! │  │                                 │◄──│  SQLite repositories      │   │
//! │  │  money   tax      pricing       │   └───────────────────────────┘   │
//! │  │  types   seo      media         │                                    │
//! │  │  validation       messaging     │                                    │
//! │  │                                 │                                    │
//! │  │  NO I/O • NO DATABASE • NO NET  │                                    │
//! │  └─────────────────────────────────┘                                    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Domain types (Customer, Address, Product, UrlRecord, ...)
//! - [`money`] - Decimal `Money` bound to a `Currency`
//! - [`tax`] - Tax address, exemption and price adjustment rules
//! - [`pricing`] - Price calculator pipeline (offer & tier prices)
//! - [`seo`] - URL prefixes, slug routers, slug helpers
//! - [`media`] - Download items, content hashes, unique file names
//! - [`messaging`] - Queued e-mails and outgoing messages
//! - [`validation`] - VAT numbers, slugs, e-mail addresses
//! - [`error`] - Domain error types
//!
//! ## Example Usage
//!
//! ```rust
//! use mercato_core::money::Currency;
//! use mercato_core::tax::{adjust_price, tax_adjustment, TaxAdjustment};
//! use rust_decimal::Decimal;
//!
//! let eur = Currency::new("EUR");
//! let gross = eur.as_money(Decimal::new(11900, 2), false); // 119.00 EUR
//!
//! // catalog prices include tax, customer sees net prices
//! assert_eq!(tax_adjustment(true, false), TaxAdjustment::RemoveTax);
//! let net = adjust_price(&gross, Decimal::new(19, 0), false, &eur);
//! assert_eq!(net.amount(), Decimal::new(100, 0));
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod media;
pub mod messaging;
pub mod money;
pub mod pricing;
pub mod seo;
pub mod tax;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use error::{CoreError, CoreResult, ValidationError};
pub use money::{Currency, Money};
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Maximum slug length accepted by [`validation::validate_slug_format`].
pub const MAX_SLUG_LENGTH: usize = 400;

/// Language id of language-neutral url records.
pub const NEUTRAL_LANGUAGE_ID: i64 = 0;
