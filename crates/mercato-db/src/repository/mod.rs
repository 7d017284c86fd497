//! # Repository Module
//!
//! Database repository implementations for Mercato.
//!
//! ## Repository Pattern
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  Service (mercato-services)                                            │
//! │       │                                                                 │
//! │       │  db.url_records().find_by_slug("espresso-machine")             │
//! │       ▼                                                                 │
//! │  UrlRecordRepository                                                   │
//! │  ├── find_by_slug(&self, slug)                                         │
//! │  ├── get_active_slug(&self, entity_id, entity_name, language_id)       │
//! │  └── save_slug(&self, ...)          ← one transaction                  │
//! │       │                                                                 │
//! │       │  SQL Query                                                      │
//! │       ▼                                                                 │
//! │  SQLite Database                                                       │
//! │                                                                         │
//! │  Services never see SQL; they talk to the store traits that             │
//! │  mercato-services implements on top of these repositories.             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Available Repositories
//!
//! - [`url_record::UrlRecordRepository`] - Slugs and slug history
//! - [`language::LanguageRepository`] - Storefront languages
//! - [`address::AddressRepository`] - Addresses and countries
//! - [`checkout_attribute::CheckoutAttributeRepository`] - Checkout attributes
//! - [`queued_email::QueuedEmailRepository`] - Mail queue and attachments
//! - [`email_account::EmailAccountRepository`] - SMTP accounts
//! - [`media::MediaRepository`] - Media folders, files, blobs, assignments

pub mod address;
pub mod checkout_attribute;
pub mod email_account;
pub mod language;
pub mod media;
pub mod queued_email;
pub mod url_record;
