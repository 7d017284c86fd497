//! # mercato-db: Database Layer for Mercato
//!
//! This crate provides database access for Mercato.
//! It uses SQLite with sqlx for async operations.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Mercato Data Flow                                │
//! │                                                                         │
//! │  SlugRouteTransformer / TaxService / MailQueue (mercato-services)      │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     mercato-db (THIS CRATE)                     │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐    ┌───────────────────┐  ┌─────────────┐  │   │
//! │  │   │   Database    │    │   Repositories    │  │ Migrations  │  │   │
//! │  │   │   (pool.rs)   │    │                   │  │ (embedded)  │  │   │
//! │  │   │               │    │ UrlRecordRepo     │  │             │  │   │
//! │  │   │ SqlitePool    │◄───│ LanguageRepo      │  │ 001_initial │  │   │
//! │  │   │ Connection    │    │ QueuedEmailRepo   │  │             │  │   │
//! │  │   │ Management    │    │ MediaRepo ...     │  │             │  │   │
//! │  │   └───────────────┘    └───────────────────┘  └─────────────┘  │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  SQLite Database (path from MercatoConfig [database])                  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`pool`] - Connection pool creation and configuration
//! - [`migrations`] - Embedded database migrations
//! - [`error`] - Database error types
//! - [`repository`] - Repository implementations
//!
//! ## Usage
//!
//! ```rust,ignore
//! use mercato_db::{Database, DbConfig};
//!
//! let db = Database::new(DbConfig::new("mercato.db")).await?;
//! let record = db.url_records().find_by_slug("espresso-machine").await?;
//! let pending = db.queued_emails().get_pending(500).await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod migrations;
pub mod pool;
pub mod repository;

// =============================================================================
// Re-exports
// =============================================================================

pub use error::{DbError, DbResult};
pub use pool::{Database, DbConfig};

// Repository re-exports for convenience
pub use repository::address::AddressRepository;
pub use repository::checkout_attribute::CheckoutAttributeRepository;
pub use repository::email_account::EmailAccountRepository;
pub use repository::language::LanguageRepository;
pub use repository::media::{MediaRepository, NewMediaFile};
pub use repository::queued_email::QueuedEmailRepository;
pub use repository::url_record::UrlRecordRepository;
