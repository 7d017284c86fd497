//! # Tax Rules
//!
//! The pure half of tax resolution: which address counts, who is exempt,
//! and how a rate changes a price. Lookups that need I/O (providers,
//! geo-IP, the default address) live in `mercato-services`.
//!
//! ## Resolution Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  Customer ──► tax_basis() ──► Address ──► TaxProvider ──► rate (%)     │
//! │     │            │                                            │         │
//! │     │            ├─ EU VAT + digital good + EU consumer       │         │
//! │     │            │     → billing address forced               │         │
//! │     │            └─ chosen address missing → default address  │         │
//! │     │                                                         ▼         │
//! │     └──► is_tax_exempt() ── true ──► 0 %            adjust_price()      │
//! │                                                     × or ÷ (1 + r/100) │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::money::{Currency, Money};
use crate::types::{Address, Customer, Product, TaxBasedOn, TaxDisplayType, VatNumberStatus};

// =============================================================================
// Settings
// =============================================================================

/// Store-wide tax settings (the `[tax]` config section).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TaxSettings {
    pub tax_based_on: TaxBasedOn,

    /// Address used when the customer's own address is missing (0 = none).
    pub default_tax_address_id: i64,

    /// Whether catalog prices are entered including tax.
    pub prices_include_tax: bool,

    /// Display type used when the work context does not override it.
    pub tax_display_type: TaxDisplayType,

    /// Append "incl. tax" / "excl. tax" to formatted prices.
    pub display_tax_suffix: bool,

    /// System name of the tax provider to use. First by display order if unset.
    pub active_tax_provider_system_name: Option<String>,

    pub eu_vat_enabled: bool,
    pub eu_vat_shop_country_id: i64,
    pub eu_vat_allow_vat_exemption: bool,

    pub shipping_is_taxable: bool,
    pub shipping_price_includes_tax: bool,
    pub shipping_tax_class_id: i64,

    pub payment_method_additional_fee_is_taxable: bool,
    pub payment_method_additional_fee_includes_tax: bool,
    pub payment_method_additional_fee_tax_class_id: i64,
}

impl Default for TaxSettings {
    fn default() -> Self {
        TaxSettings {
            tax_based_on: TaxBasedOn::BillingAddress,
            default_tax_address_id: 0,
            prices_include_tax: false,
            tax_display_type: TaxDisplayType::IncludingTax,
            display_tax_suffix: false,
            active_tax_provider_system_name: None,
            eu_vat_enabled: false,
            eu_vat_shop_country_id: 0,
            eu_vat_allow_vat_exemption: true,
            shipping_is_taxable: false,
            shipping_price_includes_tax: false,
            shipping_tax_class_id: 0,
            payment_method_additional_fee_is_taxable: false,
            payment_method_additional_fee_includes_tax: false,
            payment_method_additional_fee_tax_class_id: 0,
        }
    }
}

// =============================================================================
// Cache Keys & Requests
// =============================================================================

/// Key of the tax rate cache. `0` stands for "no customer" / "no product".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TaxRateCacheKey {
    pub customer_id: i64,
    pub tax_category_id: i64,
    pub product_id: i64,
}

impl TaxRateCacheKey {
    pub fn new(customer: Option<&Customer>, tax_category_id: i64, product: Option<&Product>) -> Self {
        TaxRateCacheKey {
            customer_id: customer.map_or(0, |c| c.id),
            tax_category_id,
            product_id: product.map_or(0, |p| p.id),
        }
    }
}

/// Key of the tax address cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TaxAddressKey {
    pub customer_id: i64,
    pub product_is_esd: bool,
}

/// Everything a tax provider gets to see.
#[derive(Debug, Clone)]
pub struct CalculateTaxRequest<'a> {
    pub customer: &'a Customer,
    pub tax_category_id: i64,
    pub address: Option<Address>,
}

/// Country resolved from an IP address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeoCountry {
    pub iso_code: String,
    pub is_in_eu: bool,
}

// =============================================================================
// Address Rules
// =============================================================================

/// EU consumer heuristic.
///
/// 1. Billing address without a company → consumer
/// 2. IP country unknown or outside the EU → not a consumer
/// 3. Otherwise a consumer unless the VAT number was validated
pub fn is_eu_consumer(customer: &Customer, ip_country: Option<&GeoCountry>) -> bool {
    if let Some(billing) = &customer.billing_address {
        if billing.has_no_company() {
            return true;
        }
    }

    if !ip_country.is_some_and(|c| c.is_in_eu) {
        return false;
    }

    customer.vat_number_status != VatNumberStatus::Valid
}

/// Picks the address basis for a customer.
///
/// ## Arguments
/// * `force_billing` - EU VAT rules apply (digital good sold to an EU consumer)
///
/// Falls back to [`TaxBasedOn::DefaultAddress`] when the chosen address is
/// missing on the customer.
pub fn tax_basis(settings: &TaxSettings, customer: &Customer, force_billing: bool) -> TaxBasedOn {
    let based_on = if force_billing {
        TaxBasedOn::BillingAddress
    } else {
        settings.tax_based_on
    };

    match based_on {
        TaxBasedOn::BillingAddress if customer.billing_address.is_none() => TaxBasedOn::DefaultAddress,
        TaxBasedOn::ShippingAddress if customer.shipping_address.is_none() => TaxBasedOn::DefaultAddress,
        other => other,
    }
}

/// Whether the EU consumer check is needed at all for this product.
pub fn needs_eu_consumer_check(settings: &TaxSettings, product: Option<&Product>) -> bool {
    settings.eu_vat_enabled && product.is_some_and(|p| p.is_esd)
}

// =============================================================================
// Exemptions
// =============================================================================

/// Customer flag, any active tax-exempt role, or the product flag.
pub fn is_tax_exempt(product: Option<&Product>, customer: Option<&Customer>) -> bool {
    if let Some(customer) = customer {
        if customer.is_tax_exempt || customer.has_tax_exempt_role() {
            return true;
        }
    }

    product.is_some_and(|p| p.is_tax_exempt)
}

/// VAT exemption for an already resolved tax address.
///
/// ## Rules
/// - EU VAT disabled → false
/// - No address or no country → false
/// - Country not subject to VAT, or not the shop's country → true
/// - Otherwise → valid VAT number AND exemptions allowed
pub fn is_vat_exempt(settings: &TaxSettings, customer: &Customer, address: Option<&Address>) -> bool {
    if !settings.eu_vat_enabled {
        return false;
    }

    let Some(country) = address.and_then(|a| a.country.as_ref()) else {
        return false;
    };

    if !country.subject_to_vat || country.id != settings.eu_vat_shop_country_id {
        return true;
    }

    customer.vat_number_status == VatNumberStatus::Valid && settings.eu_vat_allow_vat_exemption
}

// =============================================================================
// Price Adjustment
// =============================================================================

/// Direction of a tax adjustment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaxAdjustment {
    Unchanged,
    AddTax,
    RemoveTax,
}

/// What to do with a price given how it was entered and how it is shown.
///
/// ```text
/// entered \ shown │ incl. tax   │ excl. tax
/// ────────────────┼─────────────┼────────────
/// incl. tax       │ unchanged   │ remove tax
/// excl. tax       │ add tax     │ unchanged
/// ```
pub fn tax_adjustment(price_includes_tax: bool, including_tax: bool) -> TaxAdjustment {
    match (price_includes_tax, including_tax) {
        (true, false) => TaxAdjustment::RemoveTax,
        (false, true) => TaxAdjustment::AddTax,
        _ => TaxAdjustment::Unchanged,
    }
}

/// Applies a percentage change to a price.
///
/// `percent == 0` returns the price unchanged. Otherwise
/// `factor = percent / 100 + 1` and the price is multiplied (`increase`) or
/// divided by it. The result is expressed in `currency`, rounded if the
/// currency rounds.
///
/// ## Example
/// ```rust
/// use mercato_core::money::Currency;
/// use mercato_core::tax::adjust_price;
/// use rust_decimal::Decimal;
///
/// let eur = Currency::new("EUR");
/// let net = eur.as_money(Decimal::new(100, 0), false);
/// let gross = adjust_price(&net, Decimal::new(19, 0), true, &eur);
/// assert_eq!(gross.amount(), Decimal::new(119, 0));
/// ```
pub fn adjust_price(price: &Money, percent: Decimal, increase: bool, currency: &Currency) -> Money {
    if percent.is_zero() {
        return currency.as_money(price.amount(), true);
    }

    let factor = percent / Decimal::ONE_HUNDRED + Decimal::ONE;
    let result = if increase {
        price.clone() * factor
    } else {
        price.clone() / factor
    };

    currency.as_money(result.amount(), true)
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Country, CustomerRole};

    fn address(company: Option<&str>, country: Option<Country>) -> Address {
        Address {
            id: 10,
            company: company.map(str::to_string),
            country,
            ..Default::default()
        }
    }

    fn germany() -> Country {
        Country {
            id: 1,
            name: "Germany".into(),
            two_letter_iso_code: "DE".into(),
            subject_to_vat: true,
        }
    }

    fn eu_ip() -> GeoCountry {
        GeoCountry {
            iso_code: "FR".into(),
            is_in_eu: true,
        }
    }

    #[test]
    fn test_eu_consumer_billing_without_company() {
        let customer = Customer {
            id: 1,
            billing_address: Some(address(None, None)),
            vat_number_status: VatNumberStatus::Valid,
            ..Default::default()
        };
        assert!(is_eu_consumer(&customer, None));
    }

    #[test]
    fn test_eu_consumer_outside_eu_is_not_consumer() {
        let customer = Customer {
            id: 1,
            billing_address: Some(address(Some("ACME"), None)),
            ..Default::default()
        };
        let us = GeoCountry {
            iso_code: "US".into(),
            is_in_eu: false,
        };
        assert!(!is_eu_consumer(&customer, Some(&us)));
        assert!(!is_eu_consumer(&customer, None));
    }

    #[test]
    fn test_eu_company_with_valid_vat_is_not_consumer() {
        let mut customer = Customer {
            id: 1,
            billing_address: Some(address(Some("ACME"), None)),
            vat_number_status: VatNumberStatus::Valid,
            ..Default::default()
        };
        assert!(!is_eu_consumer(&customer, Some(&eu_ip())));

        customer.vat_number_status = VatNumberStatus::Invalid;
        assert!(is_eu_consumer(&customer, Some(&eu_ip())));
    }

    #[test]
    fn test_tax_basis_falls_back_to_default() {
        let settings = TaxSettings {
            tax_based_on: TaxBasedOn::ShippingAddress,
            ..Default::default()
        };
        let mut customer = Customer::default();
        assert_eq!(tax_basis(&settings, &customer, false), TaxBasedOn::DefaultAddress);

        customer.shipping_address = Some(address(None, None));
        assert_eq!(tax_basis(&settings, &customer, false), TaxBasedOn::ShippingAddress);

        // forced billing without a billing address still ends at the default
        assert_eq!(tax_basis(&settings, &customer, true), TaxBasedOn::DefaultAddress);

        customer.billing_address = Some(address(None, None));
        assert_eq!(tax_basis(&settings, &customer, true), TaxBasedOn::BillingAddress);
    }

    #[test]
    fn test_eu_check_only_for_digital_goods() {
        let settings = TaxSettings {
            eu_vat_enabled: true,
            ..Default::default()
        };
        let mut product = Product::default();
        assert!(!needs_eu_consumer_check(&settings, Some(&product)));
        product.is_esd = true;
        assert!(needs_eu_consumer_check(&settings, Some(&product)));
        assert!(!needs_eu_consumer_check(&settings, None));
        assert!(!needs_eu_consumer_check(&TaxSettings::default(), Some(&product)));
    }

    #[test]
    fn test_tax_exempt_sources() {
        let product = Product {
            is_tax_exempt: true,
            ..Default::default()
        };
        assert!(is_tax_exempt(Some(&product), None));
        assert!(!is_tax_exempt(None, None));

        let exempt = Customer {
            id: 1,
            is_tax_exempt: true,
            ..Default::default()
        };
        assert!(is_tax_exempt(None, Some(&exempt)));

        let reseller = Customer {
            id: 2,
            roles: vec![CustomerRole {
                id: 3,
                name: "Reseller".into(),
                active: true,
                tax_exempt: true,
            }],
            ..Default::default()
        };
        assert!(is_tax_exempt(None, Some(&reseller)));
    }

    #[test]
    fn test_vat_exempt_rules() {
        let settings = TaxSettings {
            eu_vat_enabled: true,
            eu_vat_shop_country_id: 1,
            eu_vat_allow_vat_exemption: true,
            ..Default::default()
        };
        let mut customer = Customer {
            id: 1,
            ..Default::default()
        };

        assert!(!is_vat_exempt(&settings, &customer, None));
        assert!(!is_vat_exempt(&settings, &customer, Some(&address(None, None))));

        let swiss = Country {
            id: 2,
            name: "Switzerland".into(),
            two_letter_iso_code: "CH".into(),
            subject_to_vat: false,
        };
        assert!(is_vat_exempt(&settings, &customer, Some(&address(None, Some(swiss)))));

        let home = address(None, Some(germany()));
        assert!(!is_vat_exempt(&settings, &customer, Some(&home)));

        customer.vat_number_status = VatNumberStatus::Valid;
        assert!(is_vat_exempt(&settings, &customer, Some(&home)));

        let disabled = TaxSettings::default();
        assert!(!is_vat_exempt(&disabled, &customer, Some(&home)));
    }

    #[test]
    fn test_tax_adjustment_matrix() {
        assert_eq!(tax_adjustment(true, false), TaxAdjustment::RemoveTax);
        assert_eq!(tax_adjustment(false, true), TaxAdjustment::AddTax);
        assert_eq!(tax_adjustment(true, true), TaxAdjustment::Unchanged);
        assert_eq!(tax_adjustment(false, false), TaxAdjustment::Unchanged);
    }

    #[test]
    fn test_adjust_price() {
        let eur = Currency::new("EUR");
        let price = eur.as_money(Decimal::new(1999, 2), false);

        let same = adjust_price(&price, Decimal::ZERO, true, &eur);
        assert_eq!(same, price);

        let gross = adjust_price(&price, Decimal::new(19, 0), true, &eur);
        assert_eq!(gross.amount(), Decimal::new(2379, 2)); // 23.7881

        let net = adjust_price(&gross, Decimal::new(19, 0), false, &eur);
        assert_eq!(net.amount(), Decimal::new(1999, 2));
    }

    #[test]
    fn test_zero_rate_still_uses_target_currency() {
        let usd = Currency::new("USD");
        let eur = Currency::new("EUR");
        let price = usd.as_money(Decimal::new(10005, 3), false);

        let same = adjust_price(&price, Decimal::ZERO, true, &eur);
        assert_eq!(same.currency().code, "EUR");
        assert_eq!(same.amount(), Decimal::new(1001, 2));

        let taxed = adjust_price(&price, Decimal::new(10, 0), true, &eur);
        assert_eq!(taxed.currency().code, same.currency().code);
    }

    #[test]
    fn test_adjust_price_without_rounding() {
        let mut raw = Currency::new("EUR");
        raw.rounding_enabled = false;
        let price = raw.as_money(Decimal::new(10, 0), false);
        let gross = adjust_price(&price, Decimal::new(7, 0), true, &raw);
        assert_eq!(gross.amount(), Decimal::new(1070, 2));
    }

    #[test]
    fn test_cache_key_uses_zero_for_missing() {
        let key = TaxRateCacheKey::new(None, 4, None);
        assert_eq!(key.customer_id, 0);
        assert_eq!(key.product_id, 0);
        assert_eq!(key.tax_category_id, 4);
    }
}
