//! # Tax Service
//!
//! Tax rates, tax addresses and tax-aware prices.
//!
//! ## Rate Resolution
//! ```text
//! get_tax_rate(product?, tax_category_id?, customer?)
//!   │
//!   ├── product with price 0 ───────────────────────────► 0 (no provider call)
//!   ├── rate cache hit (customer, category, product) ───► cached rate
//!   ├── no provider / tax exempt ───────────────────────► 0
//!   │
//!   ├── get_tax_address(customer, product) ──┐
//!   │     cached per (customer, is_esd)      │
//!   │                                        ▼
//!   └── active TaxProvider ◄── CalculateTaxRequest
//!           ├── Ok(rate)  → max(0, rate), cached
//!           └── Err(_)    → 0, not cached
//! ```
//!
//! ## Caching
//! Both caches are unbounded `RwLock<HashMap>`s owned by the service
//! instance. Create one `TaxService` per request or unit of work so cached
//! rates never outlive the customer data they were computed from.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use rust_decimal::Decimal;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use mercato_core::tax::{
    self, adjust_price, is_eu_consumer, needs_eu_consumer_check, tax_adjustment, tax_basis,
    CalculateTaxRequest, GeoCountry, TaxAddressKey, TaxAdjustment, TaxRateCacheKey, TaxSettings,
};
use mercato_core::validation::{get_vat_number_status, VatNumberCheck};
use mercato_core::{
    Address, CheckoutAttribute, CheckoutAttributeValue, Currency, Customer, Money, Product, TaxBasedOn,
};
use mercato_db::DbError;

use crate::config::FixedTaxRate;
use crate::context::WorkContext;
use crate::error::ServiceResult;
use crate::provider::ProviderRegistry;
use crate::store::TaxDataStore;

// =============================================================================
// Provider Traits
// =============================================================================

/// Calculates tax rates (percent) for a request.
#[async_trait]
pub trait TaxProvider: Send + Sync {
    /// A failure makes the caller fall back to a zero rate.
    async fn get_tax_rate(&self, request: &CalculateTaxRequest<'_>) -> ServiceResult<Decimal>;
}

/// Resolves the country of an IP address.
pub trait GeoCountryLookup: Send + Sync {
    fn lookup_country(&self, ip_address: &str) -> Option<GeoCountry>;
}

/// Lookup that never knows the country.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoGeoCountryLookup;

impl GeoCountryLookup for NoGeoCountryLookup {
    fn lookup_country(&self, _ip_address: &str) -> Option<GeoCountry> {
        None
    }
}

// =============================================================================
// Fixed Rate Provider
// =============================================================================

/// One rate per tax category, regardless of the address.
#[derive(Debug, Clone, Default)]
pub struct FixedRateTaxProvider {
    rates: HashMap<i64, Decimal>,
}

impl FixedRateTaxProvider {
    pub const SYSTEM_NAME: &'static str = "Tax.FixedRate";

    pub fn new(rates: impl IntoIterator<Item = (i64, Decimal)>) -> Self {
        FixedRateTaxProvider {
            rates: rates.into_iter().collect(),
        }
    }

    /// Builds the provider from the `[[tax_rates]]` config entries.
    pub fn from_config(rates: &[FixedTaxRate]) -> Self {
        Self::new(rates.iter().map(|r| (r.tax_category_id, r.rate)))
    }
}

#[async_trait]
impl TaxProvider for FixedRateTaxProvider {
    async fn get_tax_rate(&self, request: &CalculateTaxRequest<'_>) -> ServiceResult<Decimal> {
        Ok(self
            .rates
            .get(&request.tax_category_id)
            .copied()
            .unwrap_or(Decimal::ZERO))
    }
}

// =============================================================================
// Price Options
// =============================================================================

/// Optional overrides for [`TaxService::get_product_price`].
///
/// Anything left `None` comes from the settings or the work context.
#[derive(Debug, Clone, Copy, Default)]
pub struct PriceOptions<'a> {
    /// Show the price including tax.
    pub including_tax: Option<bool>,
    /// The given price already includes tax.
    pub price_includes_tax: Option<bool>,
    pub tax_category_id: Option<i64>,
    pub customer: Option<&'a Customer>,
    /// Currency of the result.
    pub currency: Option<&'a Currency>,
}

// =============================================================================
// Tax Service
// =============================================================================

/// Tax resolution for one unit of work.
pub struct TaxService {
    store: Arc<dyn TaxDataStore>,
    providers: Arc<ProviderRegistry<dyn TaxProvider>>,
    geo_lookup: Arc<dyn GeoCountryLookup>,
    settings: TaxSettings,
    context: WorkContext,
    rate_cache: RwLock<HashMap<TaxRateCacheKey, Decimal>>,
    address_cache: RwLock<HashMap<TaxAddressKey, Option<Address>>>,
}

impl TaxService {
    pub fn new(
        store: Arc<dyn TaxDataStore>,
        providers: Arc<ProviderRegistry<dyn TaxProvider>>,
        settings: TaxSettings,
        context: WorkContext,
    ) -> Self {
        TaxService {
            store,
            providers,
            geo_lookup: Arc::new(NoGeoCountryLookup),
            settings,
            context,
            rate_cache: RwLock::new(HashMap::new()),
            address_cache: RwLock::new(HashMap::new()),
        }
    }

    pub fn with_geo_lookup(mut self, geo_lookup: Arc<dyn GeoCountryLookup>) -> Self {
        self.geo_lookup = geo_lookup;
        self
    }

    pub fn settings(&self) -> &TaxSettings {
        &self.settings
    }

    pub fn context(&self) -> &WorkContext {
        &self.context
    }

    // =========================================================================
    // Tax Address
    // =========================================================================

    /// The address that decides the tax jurisdiction for a customer.
    ///
    /// ## Rules
    /// 1. Basis from settings (billing, shipping, default)
    /// 2. EU VAT on + digital good + EU consumer → billing
    /// 3. Chosen address missing → store default tax address
    pub async fn get_tax_address(
        &self,
        customer: &Customer,
        product: Option<&Product>,
    ) -> ServiceResult<Option<Address>> {
        let key = TaxAddressKey {
            customer_id: customer.id,
            product_is_esd: product.is_some_and(|p| p.is_esd),
        };

        if let Some(address) = self.address_cache.read().await.get(&key) {
            return Ok(address.clone());
        }

        let force_billing = needs_eu_consumer_check(&self.settings, product) && {
            let ip_country = customer
                .last_ip_address
                .as_deref()
                .and_then(|ip| self.geo_lookup.lookup_country(ip));
            is_eu_consumer(customer, ip_country.as_ref())
        };

        let address = match tax_basis(&self.settings, customer, force_billing) {
            TaxBasedOn::BillingAddress => customer.billing_address.clone(),
            TaxBasedOn::ShippingAddress => customer.shipping_address.clone(),
            TaxBasedOn::DefaultAddress => self.default_tax_address().await?,
        };

        debug!(
            customer_id = customer.id,
            is_esd = key.product_is_esd,
            address_id = address.as_ref().map(|a| a.id),
            "Tax address resolved"
        );

        self.address_cache.write().await.insert(key, address.clone());
        Ok(address)
    }

    async fn default_tax_address(&self) -> ServiceResult<Option<Address>> {
        if self.settings.default_tax_address_id <= 0 {
            return Ok(None);
        }
        Ok(self
            .store
            .get_address(self.settings.default_tax_address_id)
            .await?)
    }

    // =========================================================================
    // Tax Rate
    // =========================================================================

    /// Tax rate in percent.
    ///
    /// `tax_category_id` defaults to the product's category and `customer`
    /// to the work context's customer. Provider failures yield `0`.
    pub async fn get_tax_rate(
        &self,
        product: Option<&Product>,
        tax_category_id: Option<i64>,
        customer: Option<&Customer>,
    ) -> ServiceResult<Decimal> {
        if product.is_some_and(|p| p.price.is_zero()) {
            return Ok(Decimal::ZERO);
        }

        let tax_category_id = tax_category_id
            .or_else(|| product.map(|p| p.tax_category_id))
            .unwrap_or(0);
        let customer = customer.unwrap_or(&self.context.customer);

        let key = TaxRateCacheKey::new(Some(customer), tax_category_id, product);
        if let Some(rate) = self.rate_cache.read().await.get(&key) {
            return Ok(*rate);
        }

        let Some(provider) = self
            .providers
            .active(self.settings.active_tax_provider_system_name.as_deref())
        else {
            return Ok(Decimal::ZERO);
        };

        if self.is_tax_exempt(product, Some(customer)) {
            return Ok(Decimal::ZERO);
        }

        let request = CalculateTaxRequest {
            customer,
            tax_category_id: if tax_category_id > 0 {
                tax_category_id
            } else {
                product.map_or(0, |p| p.tax_category_id)
            },
            address: self.get_tax_address(customer, product).await?,
        };

        match provider.value.get_tax_rate(&request).await {
            Ok(rate) => {
                let rate = rate.max(Decimal::ZERO);
                self.rate_cache.write().await.insert(key, rate);
                Ok(rate)
            }
            Err(e) => {
                warn!(
                    provider = %provider.metadata.system_name,
                    customer_id = customer.id,
                    tax_category_id = tax_category_id,
                    error = %e,
                    "Tax provider failed, using zero rate"
                );
                Ok(Decimal::ZERO)
            }
        }
    }

    // =========================================================================
    // Prices
    // =========================================================================

    /// Price with tax added or removed as the display settings require.
    ///
    /// Returns the adjusted price and the rate used. A zero price is
    /// returned as is with rate `0`.
    pub async fn get_product_price(
        &self,
        product: Option<&Product>,
        price: Money,
        options: PriceOptions<'_>,
    ) -> ServiceResult<(Money, Decimal)> {
        if price.is_zero() {
            return Ok((price, Decimal::ZERO));
        }

        let customer = options.customer.unwrap_or(&self.context.customer);
        let tax_category_id = options
            .tax_category_id
            .or_else(|| product.map(|p| p.tax_category_id));
        let currency = options.currency.unwrap_or(&self.context.working_currency);

        let rate = self
            .get_tax_rate(product, tax_category_id, Some(customer))
            .await?;

        let adjustment = tax_adjustment(
            options
                .price_includes_tax
                .unwrap_or(self.settings.prices_include_tax),
            options
                .including_tax
                .unwrap_or_else(|| self.context.displays_including_tax()),
        );

        let adjusted = match adjustment {
            TaxAdjustment::Unchanged => price,
            TaxAdjustment::AddTax => adjust_price(&price, rate, true, currency),
            TaxAdjustment::RemoveTax => adjust_price(&price, rate, false, currency),
        };

        Ok((adjusted, rate))
    }

    /// Shipping charge, taxed with the shipping tax class.
    pub async fn get_shipping_price(
        &self,
        price: Money,
        including_tax: Option<bool>,
        customer: Option<&Customer>,
        tax_category_id: Option<i64>,
    ) -> ServiceResult<(Money, Decimal)> {
        if !self.settings.shipping_is_taxable {
            return Ok((price, Decimal::ZERO));
        }

        let options = PriceOptions {
            including_tax,
            price_includes_tax: Some(self.settings.shipping_price_includes_tax),
            tax_category_id: Some(tax_category_id.unwrap_or(self.settings.shipping_tax_class_id)),
            customer,
            currency: None,
        };
        self.get_product_price(None, price, options).await
    }

    /// Payment method fee, taxed with the payment fee tax class.
    pub async fn get_payment_method_additional_fee(
        &self,
        price: Money,
        including_tax: Option<bool>,
        tax_category_id: Option<i64>,
        customer: Option<&Customer>,
    ) -> ServiceResult<(Money, Decimal)> {
        if !self.settings.payment_method_additional_fee_is_taxable {
            return Ok((price, Decimal::ZERO));
        }

        let options = PriceOptions {
            including_tax,
            price_includes_tax: Some(self.settings.payment_method_additional_fee_includes_tax),
            tax_category_id: Some(
                tax_category_id.unwrap_or(self.settings.payment_method_additional_fee_tax_class_id),
            ),
            customer,
            currency: None,
        };
        self.get_product_price(None, price, options).await
    }

    /// Price adjustment of a checkout attribute value.
    ///
    /// The attribute is loaded from the store when the reference is not
    /// loaded yet.
    pub async fn get_checkout_attribute_price(
        &self,
        value: &CheckoutAttributeValue,
        customer: Option<&Customer>,
        currency: Option<&Currency>,
        including_tax: Option<bool>,
    ) -> ServiceResult<(Money, Decimal)> {
        let attribute: CheckoutAttribute = match value.attribute.value() {
            Some(attribute) => attribute.clone(),
            None => {
                let id = value.attribute.id();
                self.store
                    .get_checkout_attribute(id)
                    .await?
                    .ok_or_else(|| DbError::not_found("CheckoutAttribute", id))?
            }
        };

        let currency = currency.unwrap_or(&self.context.working_currency);
        let money = currency.as_money(value.price_adjustment, false);

        if attribute.is_tax_exempt {
            return Ok((money, Decimal::ZERO));
        }

        let options = PriceOptions {
            including_tax,
            price_includes_tax: Some(self.settings.prices_include_tax),
            tax_category_id: Some(attribute.tax_category_id),
            customer,
            currency: Some(currency),
        };
        self.get_product_price(None, money, options).await
    }

    // =========================================================================
    // Exemptions & VAT
    // =========================================================================

    /// Customer flag, active tax-exempt customer role, or product flag.
    pub fn is_tax_exempt(&self, product: Option<&Product>, customer: Option<&Customer>) -> bool {
        tax::is_tax_exempt(product, customer)
    }

    /// Whether no VAT is charged for this customer and address.
    ///
    /// Without an explicit address the customer's tax address is used.
    pub async fn is_vat_exempt(
        &self,
        customer: Option<&Customer>,
        address: Option<&Address>,
    ) -> ServiceResult<bool> {
        let Some(customer) = customer else {
            return Ok(false);
        };
        if !self.settings.eu_vat_enabled {
            return Ok(false);
        }

        let resolved;
        let address = match address {
            Some(address) => Some(address),
            None => {
                resolved = self.get_tax_address(customer, None).await?;
                resolved.as_ref()
            }
        };

        Ok(tax::is_vat_exempt(&self.settings, customer, address))
    }

    /// Syntactic VAT number check.
    pub fn get_vat_number_status(&self, full_vat_number: &str) -> VatNumberCheck {
        get_vat_number_status(full_vat_number)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
