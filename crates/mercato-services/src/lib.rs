//! # mercato-services: Storefront Services for Mercato
//!
//! The I/O half of the storefront rules: providers, caches, storage access
//! and outbound transports around the pure rules of `mercato-core`.
//!
//! ## Architecture Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Request Handling                                │
//! │                                                                         │
//! │  price/tax request                         URL request                  │
//! │       │                                         │                       │
//! │       ▼                                         ▼                       │
//! │  TaxService::get_tax_address            SlugRouteTransformer            │
//! │       │                                  ├─ URL prefix                  │
//! │       ▼                                  ├─ UrlRecord lookup            │
//! │  TaxService::get_tax_rate                ├─ inactive → redirect         │
//! │   (ProviderRegistry<dyn TaxProvider>)    ├─ language → redirect         │
//! │       │                                  └─ RouterRegistry → values     │
//! │       ▼                                                                 │
//! │  adjust_price (mercato-core)                                            │
//! │                                                                         │
//! │                          Background                                     │
//! │                                                                         │
//! │  mail-worker ──► QueuedEmailService::send_mails ──► SMTP / pickup dir   │
//! │  import jobs ──► MediaImporter ──► HTTP download ──► media album        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`config`] - `MercatoConfig` (TOML + environment)
//! - [`context`] - Per-request work context (customer, currency, display type)
//! - [`currency`] - Primary currencies, conversion, exchange rate providers
//! - [`error`] - Service error types
//! - [`mail`] - Queued e-mail dispatch
//! - [`media`] - Media import with de-duplication
//! - [`provider`] - Provider registry keyed by system name
//! - [`routing`] - Slug route transformer
//! - [`store`] - Storage traits, implemented for `mercato_db::Database`
//! - [`tax`] - Tax rates, tax addresses and tax-aware prices
//! - [`telemetry`] - tracing subscriber setup
//! - [`url`] - Slugs, URL prefixes and slug routers
//!
//! ## Usage
//!
//! ```rust,ignore
//! use mercato_services::{MercatoConfig, TaxService, WorkContext};
//!
//! let config = MercatoConfig::load_or_default(None);
//! let db = Database::new(DbConfig::new(&config.database.path)).await?;
//!
//! let tax = TaxService::new(Arc::new(db), providers, config.tax.clone(), context);
//! let (price, rate) = tax.get_product_price(Some(&product), price, PriceOptions::default()).await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod config;
pub mod context;
pub mod currency;
pub mod error;
pub mod mail;
pub mod media;
pub mod provider;
pub mod routing;
pub mod store;
pub mod tax;
pub mod telemetry;
pub mod url;

// =============================================================================
// Re-exports
// =============================================================================

pub use config::MercatoConfig;
pub use context::WorkContext;
pub use currency::{CurrencyService, ExchangeRate, ExchangeRateProvider, StaticRatesProvider};
pub use error::{ServiceError, ServiceResult};
pub use mail::{LettreTransportFactory, MailClient, MailTransportFactory, QueuedEmailService};
pub use media::{Downloader, HttpDownloader, MediaImporter};
pub use provider::{ProviderMetadata, ProviderRegistry};
pub use routing::{SlugRequest, SlugRouteTransformer};
pub use store::{LanguageStore, MailQueueStore, MediaStore, TaxDataStore, UrlRecordStore};
pub use tax::{FixedRateTaxProvider, GeoCountryLookup, PriceOptions, TaxProvider, TaxService};
pub use url::UrlService;
