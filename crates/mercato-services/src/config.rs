//! # Mercato Configuration
//!
//! Configuration management for the storefront services.
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                           │
//! │     MERCATO_DB_PATH=/srv/mercato/mercato.db                            │
//! │     MERCATO_MAIL_PICKUP_DIR=/tmp/mails                                 │
//! │                                                                         │
//! │  2. TOML Config File                                                   │
//! │     ~/.config/mercato/mercato.toml (Linux)                             │
//! │     ~/Library/Application Support/com.mercato.storefront/mercato.toml │
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! [database]
//! path = "mercato.db"
//!
//! [tax]
//! tax_based_on = "billing_address"
//! prices_include_tax = true
//! eu_vat_enabled = true
//! eu_vat_shop_country_id = 1
//!
//! [[tax_rates]]
//! tax_category_id = 1
//! rate = "19"
//!
//! [localization]
//! default_language_redirect_behaviour = "strip_seo_code"
//!
//! [[url_prefixes]]
//! prefix = "shop"
//! entity_names = ["Product"]
//!
//! [email]
//! poll_interval_secs = 30
//! mail_sending_delay_ms = 0
//!
//! [currency]
//! primary_currency_id = 1
//! ```

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::{debug, info, warn};

use mercato_core::seo::{DefaultLanguageRedirectBehaviour, LocalizationSettings, SeoSettings};
use mercato_core::tax::TaxSettings;
use mercato_core::Currency;

use crate::error::{ServiceError, ServiceResult};

// =============================================================================
// Database Settings
// =============================================================================

/// The `[database]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseSettings {
    /// SQLite file path.
    #[serde(default = "default_db_path")]
    pub path: PathBuf,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_db_path() -> PathBuf {
    PathBuf::from("mercato.db")
}

fn default_max_connections() -> u32 {
    5
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        DatabaseSettings {
            path: default_db_path(),
            max_connections: default_max_connections(),
        }
    }
}

// =============================================================================
// Tax Rates
// =============================================================================

/// One `[[tax_rates]]` entry for the fixed-rate tax provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FixedTaxRate {
    pub tax_category_id: i64,
    /// Percent, e.g. `"19"`.
    pub rate: Decimal,
}

// =============================================================================
// URL Prefixes
// =============================================================================

/// One `[[url_prefixes]]` entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UrlPrefixSettings {
    pub prefix: String,
    pub entity_names: Vec<String>,
}

// =============================================================================
// E-mail Settings
// =============================================================================

/// The `[email]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailSettings {
    /// Write `.eml` files here instead of sending over SMTP.
    #[serde(default)]
    pub pickup_directory: Option<PathBuf>,

    /// Pause after each SMTP send (milliseconds).
    #[serde(default)]
    pub mail_sending_delay_ms: u64,

    /// Interval between queue polls of the mail worker (seconds).
    #[serde(default = "default_mail_poll_interval")]
    pub poll_interval_secs: u64,

    /// Mails loaded per poll.
    #[serde(default = "default_mail_fetch_size")]
    pub fetch_size: u32,

    /// SMTP connect/send timeout (seconds).
    #[serde(default = "default_smtp_timeout")]
    pub smtp_timeout_secs: u64,

    /// Delete sent or exhausted mails after every poll.
    #[serde(default = "default_true")]
    pub delete_sent_mails: bool,
}

fn default_mail_poll_interval() -> u64 {
    30
}

fn default_mail_fetch_size() -> u32 {
    500
}

fn default_smtp_timeout() -> u64 {
    30
}

fn default_true() -> bool {
    true
}

impl Default for EmailSettings {
    fn default() -> Self {
        EmailSettings {
            pickup_directory: None,
            mail_sending_delay_ms: 0,
            poll_interval_secs: default_mail_poll_interval(),
            fetch_size: default_mail_fetch_size(),
            smtp_timeout_secs: default_smtp_timeout(),
            delete_sent_mails: true,
        }
    }
}

// =============================================================================
// Data Exchange Settings
// =============================================================================

/// The `[data_exchange]` section (media import).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataExchangeSettings {
    /// Base directory for relative image paths in import files.
    #[serde(default = "default_image_import_folder")]
    pub image_import_folder: PathBuf,

    /// Where downloaded images are stored before import.
    #[serde(default = "default_image_download_folder")]
    pub image_download_folder: PathBuf,

    /// Media folder (album) imported files go to.
    #[serde(default = "default_media_album")]
    pub media_album: String,

    /// HTTP timeout per download (seconds).
    #[serde(default = "default_download_timeout")]
    pub download_timeout_secs: u64,
}

fn default_image_import_folder() -> PathBuf {
    PathBuf::from("import/images")
}

fn default_image_download_folder() -> PathBuf {
    PathBuf::from("import/downloads")
}

fn default_media_album() -> String {
    "catalog".to_string()
}

fn default_download_timeout() -> u64 {
    30
}

impl Default for DataExchangeSettings {
    fn default() -> Self {
        DataExchangeSettings {
            image_import_folder: default_image_import_folder(),
            image_download_folder: default_image_download_folder(),
            media_album: default_media_album(),
            download_timeout_secs: default_download_timeout(),
        }
    }
}

// =============================================================================
// Currency Settings
// =============================================================================

/// The `[currency]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CurrencySettings {
    /// Currency prices are stored in.
    #[serde(default)]
    pub primary_currency_id: i64,

    /// Currency all exchange rates are relative to.
    #[serde(default)]
    pub primary_exchange_currency_id: i64,

    /// Exchange rate provider system name. First registered if unset.
    #[serde(default)]
    pub active_exchange_rate_provider_system_name: Option<String>,

    #[serde(default = "default_currencies")]
    pub currencies: Vec<Currency>,
}

fn default_currencies() -> Vec<Currency> {
    vec![
        Currency::new("EUR").with_id(1),
        Currency::new("USD").with_id(2).with_rate(Decimal::new(108, 2)),
    ]
}

impl Default for CurrencySettings {
    fn default() -> Self {
        CurrencySettings {
            primary_currency_id: 1,
            primary_exchange_currency_id: 1,
            active_exchange_rate_provider_system_name: None,
            currencies: default_currencies(),
        }
    }
}

// =============================================================================
// Main Configuration
// =============================================================================

/// Complete storefront services configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MercatoConfig {
    #[serde(default)]
    pub database: DatabaseSettings,

    #[serde(default)]
    pub tax: TaxSettings,

    #[serde(default)]
    pub tax_rates: Vec<FixedTaxRate>,

    #[serde(default)]
    pub localization: LocalizationSettings,

    #[serde(default)]
    pub seo: SeoSettings,

    #[serde(default)]
    pub url_prefixes: Vec<UrlPrefixSettings>,

    #[serde(default)]
    pub email: EmailSettings,

    #[serde(default)]
    pub data_exchange: DataExchangeSettings,

    #[serde(default)]
    pub currency: CurrencySettings,
}

impl MercatoConfig {
    /// Creates a config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads configuration from file, environment, and defaults.
    ///
    /// ## Load Order (later overrides earlier)
    /// 1. Default values
    /// 2. Config file (mercato.toml)
    /// 3. Environment variables
    pub fn load(config_path: Option<PathBuf>) -> ServiceResult<Self> {
        let mut config = Self::default();

        if let Some(path) = config_path.or_else(Self::default_config_path) {
            if path.exists() {
                info!(?path, "Loading config from file");
                let contents = std::fs::read_to_string(&path)
                    .map_err(|e| ServiceError::ConfigLoadFailed(e.to_string()))?;
                config = toml::from_str(&contents)?;
            } else {
                debug!(?path, "Config file not found, using defaults");
            }
        }

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Loads config or returns default if load fails.
    pub fn load_or_default(config_path: Option<PathBuf>) -> Self {
        Self::load(config_path).unwrap_or_else(|e| {
            warn!("Failed to load config: {}. Using defaults.", e);
            Self::default()
        })
    }

    /// Saves configuration to file.
    pub fn save(&self, config_path: Option<PathBuf>) -> ServiceResult<()> {
        let path = config_path
            .or_else(Self::default_config_path)
            .ok_or_else(|| ServiceError::ConfigSaveFailed("No config path available".into()))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| ServiceError::ConfigSaveFailed(e.to_string()))?;
        }

        let contents = toml::to_string_pretty(self)?;
        std::fs::write(&path, contents).map_err(|e| ServiceError::ConfigSaveFailed(e.to_string()))?;

        info!(?path, "Config saved");
        Ok(())
    }

    /// Validates the configuration.
    pub fn validate(&self) -> ServiceResult<()> {
        if self.database.path.as_os_str().is_empty() {
            return Err(ServiceError::InvalidConfig("database.path must not be empty".into()));
        }

        if self.database.max_connections == 0 {
            return Err(ServiceError::InvalidConfig(
                "database.max_connections must be greater than 0".into(),
            ));
        }

        if self.email.fetch_size == 0 {
            return Err(ServiceError::InvalidConfig(
                "email.fetch_size must be greater than 0".into(),
            ));
        }

        // tokio::time::interval panics on a zero period
        if self.email.poll_interval_secs == 0 {
            return Err(ServiceError::InvalidConfig(
                "email.poll_interval_secs must be greater than 0".into(),
            ));
        }

        if let Some(rate) = self.tax_rates.iter().find(|r| r.rate.is_sign_negative()) {
            return Err(ServiceError::InvalidConfig(format!(
                "Tax rate for category {} must not be negative",
                rate.tax_category_id
            )));
        }

        if let Some(currency) = self
            .currency
            .currencies
            .iter()
            .find(|c| c.rate <= Decimal::ZERO)
        {
            return Err(ServiceError::InvalidConfig(format!(
                "Exchange rate of {} must be positive",
                currency.code
            )));
        }

        if let Some(prefix) = self
            .url_prefixes
            .iter()
            .find(|p| p.prefix.trim_matches('/').is_empty() || p.entity_names.is_empty())
        {
            return Err(ServiceError::InvalidConfig(format!(
                "URL prefix '{}' needs a name and at least one entity",
                prefix.prefix
            )));
        }

        Ok(())
    }

    /// Applies environment variable overrides.
    fn apply_env_overrides(&mut self) {
        if let Ok(path) = std::env::var("MERCATO_DB_PATH") {
            debug!(path = %path, "Overriding database path from environment");
            self.database.path = PathBuf::from(path);
        }

        if let Ok(name) = std::env::var("MERCATO_TAX_PROVIDER") {
            debug!(provider = %name, "Overriding tax provider from environment");
            self.tax.active_tax_provider_system_name = Some(name);
        }

        if let Ok(dir) = std::env::var("MERCATO_MAIL_PICKUP_DIR") {
            debug!(dir = %dir, "Overriding mail pickup directory from environment");
            self.email.pickup_directory = (!dir.is_empty()).then(|| PathBuf::from(dir));
        }

        if let Ok(secs) = std::env::var("MERCATO_MAIL_POLL_SECS") {
            if let Ok(s) = secs.parse::<u64>() {
                self.email.poll_interval_secs = s;
            }
        }

        if let Ok(id) = std::env::var("MERCATO_PRIMARY_CURRENCY_ID") {
            if let Ok(id) = id.parse::<i64>() {
                self.currency.primary_currency_id = id;
            }
        }

        if let Ok(behaviour) = std::env::var("MERCATO_DEFAULT_LANGUAGE_REDIRECT") {
            match behaviour.to_lowercase().as_str() {
                "prepend" | "prepend_seo_code_and_redirect" => {
                    self.localization.default_language_redirect_behaviour =
                        DefaultLanguageRedirectBehaviour::PrependSeoCodeAndRedirect
                }
                "none" | "do_not_redirect" => {
                    self.localization.default_language_redirect_behaviour =
                        DefaultLanguageRedirectBehaviour::DoNotRedirect
                }
                "strip" | "strip_seo_code" => {
                    self.localization.default_language_redirect_behaviour =
                        DefaultLanguageRedirectBehaviour::StripSeoCode
                }
                _ => warn!(behaviour = %behaviour, "Unknown language redirect behaviour in environment"),
            }
        }
    }

    /// Returns the default config file path.
    fn default_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("com", "mercato", "storefront")
            .map(|dirs| dirs.config_dir().join("mercato.toml"))
    }
}
