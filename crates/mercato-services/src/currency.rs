//! # Currency Service
//!
//! Primary currencies, conversion into the working currency, live exchange
//! rates and the "incl./excl. tax" display suffix.
//!
//! ## Primary Currency Resolution
//! ```text
//! configured id ──► found ─────────────────────► currency
//!       │
//!       └── missing ──► first published ─────────► currency
//!                          │
//!                          └── none ──► first ──► currency
//!                                         │
//!                                         └── none ──► CoreError::NoCurrency
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use mercato_core::{CoreError, CoreResult, Currency, Money};

use crate::config::CurrencySettings;
use crate::context::WorkContext;
use crate::error::ServiceResult;
use crate::provider::ProviderRegistry;

/// Display format for prices shown including tax.
pub const INCL_TAX_FORMAT: &str = "{0} incl. tax";

/// Display format for prices shown excluding tax.
pub const EXCL_TAX_FORMAT: &str = "{0} excl. tax";

// =============================================================================
// Exchange Rates
// =============================================================================

/// One live rate relative to the primary exchange currency.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExchangeRate {
    pub currency_code: String,
    pub rate: Decimal,
    pub updated_on: DateTime<Utc>,
}

/// Source of live exchange rates.
#[async_trait]
pub trait ExchangeRateProvider: Send + Sync {
    /// Rates of all known currencies relative to `exchange_rate_currency_code`.
    async fn get_currency_live_rates(
        &self,
        exchange_rate_currency_code: &str,
    ) -> ServiceResult<Vec<ExchangeRate>>;
}

/// Fixed table of rates, each relative to a common base.
#[derive(Debug, Clone, Default)]
pub struct StaticRatesProvider {
    rates: HashMap<String, Decimal>,
}

impl StaticRatesProvider {
    pub const SYSTEM_NAME: &'static str = "CurrencyExchange.Static";

    pub fn new(rates: impl IntoIterator<Item = (String, Decimal)>) -> Self {
        StaticRatesProvider {
            rates: rates
                .into_iter()
                .map(|(code, rate)| (code.to_uppercase(), rate))
                .collect(),
        }
    }

    /// Uses the configured rates of the currencies.
    pub fn from_currencies(currencies: &[Currency]) -> Self {
        Self::new(currencies.iter().map(|c| (c.code.clone(), c.rate)))
    }
}

#[async_trait]
impl ExchangeRateProvider for StaticRatesProvider {
    async fn get_currency_live_rates(
        &self,
        exchange_rate_currency_code: &str,
    ) -> ServiceResult<Vec<ExchangeRate>> {
        let base_code = exchange_rate_currency_code.to_uppercase();
        let base = match self.rates.get(&base_code) {
            Some(rate) if !rate.is_zero() => *rate,
            _ => {
                return Err(CoreError::CurrencyNotFound(exchange_rate_currency_code.to_string()).into());
            }
        };

        let now = Utc::now();
        let mut rates: Vec<ExchangeRate> = self
            .rates
            .iter()
            .filter(|(code, _)| **code != base_code)
            .map(|(code, rate)| ExchangeRate {
                currency_code: code.clone(),
                rate: *rate / base,
                updated_on: now,
            })
            .collect();
        rates.sort_by(|a, b| a.currency_code.cmp(&b.currency_code));

        Ok(rates)
    }
}

// =============================================================================
// Currency Service
// =============================================================================

/// Currency lookups and conversions.
pub struct CurrencyService {
    settings: CurrencySettings,
    providers: Arc<ProviderRegistry<dyn ExchangeRateProvider>>,
    display_tax_suffix: bool,
}

impl CurrencyService {
    pub fn new(
        settings: CurrencySettings,
        providers: Arc<ProviderRegistry<dyn ExchangeRateProvider>>,
    ) -> Self {
        CurrencyService {
            settings,
            providers,
            display_tax_suffix: false,
        }
    }

    /// Default for [`get_tax_format`](Self::get_tax_format), usually
    /// `TaxSettings::display_tax_suffix`.
    pub fn with_display_tax_suffix(mut self, display_tax_suffix: bool) -> Self {
        self.display_tax_suffix = display_tax_suffix;
        self
    }

    pub fn currencies(&self) -> &[Currency] {
        &self.settings.currencies
    }

    pub fn get_currency_by_id(&self, id: i64) -> Option<&Currency> {
        self.settings.currencies.iter().find(|c| c.id == id)
    }

    /// Currency by ISO code (case-insensitive).
    pub fn get_currency_by_code(&self, code: &str) -> Option<&Currency> {
        self.settings
            .currencies
            .iter()
            .find(|c| c.code.eq_ignore_ascii_case(code))
    }

    /// The currency catalog prices are stored in.
    pub fn primary_currency(&self) -> CoreResult<&Currency> {
        self.resolve(self.settings.primary_currency_id, "primary")
    }

    /// The currency all exchange rates are relative to.
    pub fn primary_exchange_currency(&self) -> CoreResult<&Currency> {
        self.resolve(self.settings.primary_exchange_currency_id, "primary exchange")
    }

    fn resolve(&self, id: i64, role: &str) -> CoreResult<&Currency> {
        if let Some(currency) = self.get_currency_by_id(id) {
            return Ok(currency);
        }

        let fallback = self
            .settings
            .currencies
            .iter()
            .find(|c| c.published)
            .or_else(|| self.settings.currencies.first())
            .ok_or(CoreError::NoCurrency)?;

        warn!(
            configured_id = id,
            fallback = %fallback.code,
            role = role,
            "Configured currency not found, using fallback"
        );
        Ok(fallback)
    }

    // =========================================================================
    // Conversion
    // =========================================================================

    /// Converts an amount into `working_currency` via the primary exchange
    /// currency.
    pub fn convert_to_working_currency(
        &self,
        amount: &Money,
        working_currency: &Currency,
    ) -> CoreResult<Money> {
        let primary_exchange = self.primary_exchange_currency()?;
        Ok(amount.exchange_to(working_currency, primary_exchange))
    }

    /// Converts an amount of the primary currency into `currency`.
    pub fn convert_from_primary_currency(
        &self,
        amount: Decimal,
        currency: &Currency,
    ) -> CoreResult<Money> {
        let primary = self.primary_currency()?;
        self.convert_to_working_currency(&primary.as_money(amount, false), currency)
    }

    /// Money in the currency with the given code, or in the primary currency.
    ///
    /// ## Errors
    /// `CurrencyNotFound` for an unknown code.
    pub fn create_money(&self, amount: Decimal, currency_code: Option<&str>) -> CoreResult<Money> {
        let currency = match currency_code {
            Some(code) => self
                .get_currency_by_code(code)
                .ok_or_else(|| CoreError::CurrencyNotFound(code.to_string()))?,
            None => self.primary_currency()?,
        };
        Ok(currency.as_money(amount, false))
    }

    // =========================================================================
    // Live Rates
    // =========================================================================

    /// Live rates from the active exchange rate provider.
    ///
    /// Empty when no provider is registered.
    pub async fn get_currency_live_rates(&self) -> ServiceResult<Vec<ExchangeRate>> {
        let Some(provider) = self.providers.active(
            self.settings
                .active_exchange_rate_provider_system_name
                .as_deref(),
        ) else {
            return Ok(Vec::new());
        };

        let base = self.primary_exchange_currency()?;
        let rates = provider.value.get_currency_live_rates(&base.code).await?;

        debug!(
            provider = %provider.metadata.system_name,
            base = %base.code,
            count = rates.len(),
            "Live exchange rates fetched"
        );
        Ok(rates)
    }

    // =========================================================================
    // Tax Suffix
    // =========================================================================

    /// Tax suffix format for displayed prices, `None` when suffixes are off.
    ///
    /// `price_includes_tax` defaults to the context's display type.
    pub fn get_tax_format(
        &self,
        context: &WorkContext,
        display_tax_suffix: Option<bool>,
        price_includes_tax: Option<bool>,
    ) -> Option<&'static str> {
        if !display_tax_suffix.unwrap_or(self.display_tax_suffix) {
            return None;
        }

        if price_includes_tax.unwrap_or_else(|| context.displays_including_tax()) {
            Some(INCL_TAX_FORMAT)
        } else {
            Some(EXCL_TAX_FORMAT)
        }
    }

    /// Attaches the tax suffix format to a price.
    pub fn apply_tax_format(
        &self,
        amount: Money,
        context: &WorkContext,
        display_tax_suffix: Option<bool>,
        price_includes_tax: Option<bool>,
    ) -> Money {
        match self.get_tax_format(context, display_tax_suffix, price_includes_tax) {
            Some(format) => amount.with_post_format(format),
            None => amount,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::ProviderMetadata;
    use mercato_core::{Customer, TaxDisplayType};

    fn settings() -> CurrencySettings {
        CurrencySettings::default()
    }

    fn service() -> CurrencyService {
        CurrencyService::new(settings(), Arc::new(ProviderRegistry::new()))
    }

    fn context() -> WorkContext {
        WorkContext::new(Customer::default(), Currency::new("EUR").with_id(1))
    }

    #[test]
    fn test_primary_currency_fallbacks() {
        let service = service();
        assert_eq!(service.primary_currency().unwrap().code, "EUR");

        let mut s = settings();
        s.primary_currency_id = 42;
        s.currencies[0].published = false;
        let service = CurrencyService::new(s.clone(), Arc::new(ProviderRegistry::new()));
        assert_eq!(service.primary_currency().unwrap().code, "USD");

        s.currencies.iter_mut().for_each(|c| c.published = false);
        let service = CurrencyService::new(s.clone(), Arc::new(ProviderRegistry::new()));
        assert_eq!(service.primary_currency().unwrap().code, "EUR");

        s.currencies.clear();
        let service = CurrencyService::new(s, Arc::new(ProviderRegistry::new()));
        assert!(matches!(service.primary_currency(), Err(CoreError::NoCurrency)));
    }

    #[test]
    fn test_convert_to_working_currency() {
        let service = service();
        let usd = service.get_currency_by_code("usd").unwrap().clone();

        let price = service.create_money(Decimal::new(100, 0), None).unwrap();
        let converted = service.convert_to_working_currency(&price, &usd).unwrap();
        assert_eq!(converted.currency().code, "USD");
        assert_eq!(converted.amount(), Decimal::new(108, 0));

        let back = service
            .convert_to_working_currency(&converted, service.primary_currency().unwrap())
            .unwrap();
        assert_eq!(back.amount(), Decimal::new(100, 0));
    }

    #[test]
    fn test_create_money_unknown_code() {
        let err = service().create_money(Decimal::ONE, Some("XYZ")).unwrap_err();
        assert!(matches!(err, CoreError::CurrencyNotFound(code) if code == "XYZ"));
    }

    #[tokio::test]
    async fn test_live_rates_without_provider() {
        assert!(service().get_currency_live_rates().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_live_rates_from_static_provider() {
        let s = settings();
        let mut registry: ProviderRegistry<dyn ExchangeRateProvider> = ProviderRegistry::new();
        registry
            .register(
                ProviderMetadata::new(StaticRatesProvider::SYSTEM_NAME, "Static rates"),
                Arc::new(StaticRatesProvider::from_currencies(&s.currencies)),
            )
            .unwrap();
        let service = CurrencyService::new(s, Arc::new(registry));

        let rates = service.get_currency_live_rates().await.unwrap();
        assert_eq!(rates.len(), 1);
        assert_eq!(rates[0].currency_code, "USD");
        assert_eq!(rates[0].rate, Decimal::new(108, 2));
    }

    #[tokio::test]
    async fn test_static_provider_unknown_base() {
        let provider = StaticRatesProvider::new([("EUR".to_string(), Decimal::ONE)]);
        assert!(provider.get_currency_live_rates("CHF").await.is_err());
    }

    #[test]
    fn test_tax_format() {
        let service = service();
        let ctx = context();
        assert_eq!(service.get_tax_format(&ctx, None, None), None);

        let service = service.with_display_tax_suffix(true);
        assert_eq!(service.get_tax_format(&ctx, None, None), Some(INCL_TAX_FORMAT));

        let net_ctx = context().with_tax_display_type(TaxDisplayType::ExcludingTax);
        assert_eq!(service.get_tax_format(&net_ctx, None, None), Some(EXCL_TAX_FORMAT));
        assert_eq!(service.get_tax_format(&net_ctx, None, Some(true)), Some(INCL_TAX_FORMAT));
        assert_eq!(service.get_tax_format(&ctx, Some(false), None), None);

        let price = Currency::new("EUR").as_money(Decimal::new(1999, 2), false);
        let formatted = service.apply_tax_format(price, &ctx, None, None);
        assert_eq!(formatted.to_string(), "19.99 EUR incl. tax");
    }
}
