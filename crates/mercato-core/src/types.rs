//! # Domain Types
//!
//! Core domain types used throughout Mercato.
//!
//! ## Type Map
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │    Customer     │   │     Address     │   │    Product      │       │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────  │       │
//! │  │  id             │──►│  company        │   │  price          │       │
//! │  │  is_tax_exempt  │   │  country ───────┼─► │  tax_category   │       │
//! │  │  roles          │   └─────────────────┘   │  is_esd         │       │
//! │  │  vat_status     │                         │  special_price  │       │
//! │  └─────────────────┘                         └─────────────────┘       │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │   UrlRecord     │   │    Language     │   │  Reference<T>   │       │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────  │       │
//! │  │  entity_id/name │   │  culture        │   │  id             │       │
//! │  │  slug           │   │  seo code       │   │  value: Option  │       │
//! │  │  is_active      │   │  published      │   │  (lazy nav.)    │       │
//! │  └─────────────────┘   └─────────────────┘   └─────────────────┘       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Entities use numeric surrogate keys (`i64`). `0` means "not persisted".

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};

// =============================================================================
// Lazy References
// =============================================================================

/// A navigation property that may or may not have been loaded yet.
///
/// ## Why not load everything eagerly?
/// A queued e-mail's attachment blob or a checkout attribute's parent are
/// only needed on some code paths. The owner stores the foreign key and,
/// once somebody needs the value, a loader fills it in:
///
/// ```rust
/// use mercato_core::types::Reference;
///
/// let mut blob: Reference<Vec<u8>> = Reference::unloaded(42);
/// assert!(!blob.is_loaded());
///
/// let data = blob
///     .load_with(|id| Ok::<_, std::convert::Infallible>(vec![id as u8]))
///     .unwrap();
/// assert_eq!(data, &vec![42u8]);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reference<T> {
    id: i64,
    value: Option<T>,
}

impl<T> Reference<T> {
    /// A reference that only knows its foreign key.
    pub fn unloaded(id: i64) -> Self {
        Reference { id, value: None }
    }

    /// A reference whose value is already present.
    pub fn loaded(id: i64, value: T) -> Self {
        Reference {
            id,
            value: Some(value),
        }
    }

    #[inline]
    pub fn id(&self) -> i64 {
        self.id
    }

    #[inline]
    pub fn is_loaded(&self) -> bool {
        self.value.is_some()
    }

    /// Returns the loaded value.
    ///
    /// ## Errors
    /// [`CoreError::NotLoaded`] when nobody loaded it yet.
    pub fn get(&self, entity: &'static str) -> CoreResult<&T> {
        self.value
            .as_ref()
            .ok_or(CoreError::NotLoaded { entity, id: self.id })
    }

    /// Returns the value if loaded.
    pub fn value(&self) -> Option<&T> {
        self.value.as_ref()
    }

    /// Stores a loaded value.
    pub fn set(&mut self, value: T) {
        self.value = Some(value);
    }

    /// Loads the value through `loader` unless already loaded.
    pub fn load_with<E>(&mut self, loader: impl FnOnce(i64) -> Result<T, E>) -> Result<&T, E> {
        if self.value.is_none() {
            self.value = Some(loader(self.id)?);
        }
        match self.value.as_ref() {
            Some(value) => Ok(value),
            None => unreachable!("value was set above"),
        }
    }
}

// =============================================================================
// Tax Enums
// =============================================================================

/// Which address decides the tax jurisdiction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaxBasedOn {
    /// Customer's billing address.
    #[default]
    BillingAddress,
    /// Customer's shipping address.
    ShippingAddress,
    /// Store-configured default tax address.
    DefaultAddress,
}

/// How prices are shown to the current customer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaxDisplayType {
    #[default]
    IncludingTax,
    ExcludingTax,
}

/// Result of checking a VAT identification number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
pub enum VatNumberStatus {
    #[default]
    Unknown,
    Empty,
    Valid,
    Invalid,
}

// =============================================================================
// Geography
// =============================================================================

/// A country.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Country {
    pub id: i64,
    pub name: String,
    /// ISO 3166-1 alpha-2 ("DE", "GB").
    pub two_letter_iso_code: String,
    /// Whether VAT applies when shipping to this country.
    pub subject_to_vat: bool,
}

/// A postal address.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Address {
    pub id: i64,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub company: Option<String>,
    pub city: Option<String>,
    pub country: Option<Country>,
}

impl Address {
    /// Country id, when a country is attached.
    pub fn country_id(&self) -> Option<i64> {
        self.country.as_ref().map(|c| c.id)
    }

    /// True when no (non-blank) company name is set.
    pub fn has_no_company(&self) -> bool {
        self.company.as_deref().map_or(true, |c| c.trim().is_empty())
    }
}

// =============================================================================
// Customers
// =============================================================================

/// A customer role (e.g. "Registered", "Reseller").
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerRole {
    pub id: i64,
    pub name: String,
    pub active: bool,
    pub tax_exempt: bool,
}

/// A customer, with the navigation data tax resolution needs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Customer {
    /// `0` for guests that were never persisted.
    pub id: i64,
    pub email: Option<String>,
    pub is_tax_exempt: bool,
    pub roles: Vec<CustomerRole>,
    pub billing_address: Option<Address>,
    pub shipping_address: Option<Address>,
    pub last_ip_address: Option<String>,
    pub vat_number_status: VatNumberStatus,
}

impl Customer {
    /// True if any of the customer's *active* roles is tax exempt.
    pub fn has_tax_exempt_role(&self) -> bool {
        self.roles.iter().any(|r| r.active && r.tax_exempt)
    }
}

// =============================================================================
// Catalog
// =============================================================================

/// A quantity-based price.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TierPrice {
    /// Minimum quantity for this price.
    pub quantity: u32,
    pub price: Decimal,
}

/// A product, as far as pricing and tax are concerned.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Product {
    pub id: i64,
    pub name: String,
    pub price: Decimal,
    pub tax_category_id: i64,
    /// Electronically supplied service (digital good).
    pub is_esd: bool,
    pub is_tax_exempt: bool,
    pub special_price: Option<Decimal>,
    pub special_price_start: Option<DateTime<Utc>>,
    pub special_price_end: Option<DateTime<Utc>>,
    #[serde(default)]
    pub tier_prices: Vec<TierPrice>,
}

/// Checkout attribute (e.g. "Gift wrapping").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckoutAttribute {
    pub id: i64,
    pub name: String,
    pub is_tax_exempt: bool,
    pub tax_category_id: i64,
}

/// A selectable value of a checkout attribute.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckoutAttributeValue {
    pub id: i64,
    pub name: String,
    pub price_adjustment: Decimal,
    /// Parent attribute; loaded on demand.
    pub attribute: Reference<CheckoutAttribute>,
}

// =============================================================================
// Localization & SEO
// =============================================================================

/// A storefront language.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Language {
    pub id: i64,
    pub name: String,
    /// Full culture ("de-DE").
    pub language_culture: String,
    /// Code used in URLs ("de").
    pub unique_seo_code: String,
    pub published: bool,
    pub display_order: i32,
}

impl Language {
    /// Two-letter ISO language name derived from the culture ("de-DE" → "de").
    pub fn two_letter_iso_name(&self) -> String {
        self.language_culture
            .split(['-', '_'])
            .next()
            .unwrap_or_default()
            .to_lowercase()
    }
}

/// A persisted slug for an entity.
///
/// Several records may exist per entity and language (slug history); at most
/// one of them is active.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct UrlRecord {
    pub id: i64,
    pub entity_id: i64,
    /// Entity type name ("Product", "Category", "BlogPost").
    pub entity_name: String,
    pub slug: String,
    pub is_active: bool,
    /// `0` = language neutral.
    pub language_id: i64,
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reference_get_before_load_fails() {
        let r: Reference<String> = Reference::unloaded(3);
        assert!(matches!(
            r.get("Thing"),
            Err(CoreError::NotLoaded { entity: "Thing", id: 3 })
        ));
    }

    #[test]
    fn test_reference_loader_runs_once() {
        let mut calls = 0;
        let mut r: Reference<i64> = Reference::unloaded(5);
        for _ in 0..3 {
            let v = r
                .load_with(|id| {
                    calls += 1;
                    Ok::<_, ()>(id * 2)
                })
                .unwrap();
            assert_eq!(*v, 10);
        }
        assert_eq!(calls, 1);
    }

    #[test]
    fn test_tax_exempt_role_must_be_active() {
        let mut customer = Customer {
            id: 1,
            roles: vec![CustomerRole {
                id: 1,
                name: "Reseller".into(),
                active: false,
                tax_exempt: true,
            }],
            ..Default::default()
        };
        assert!(!customer.has_tax_exempt_role());

        customer.roles[0].active = true;
        assert!(customer.has_tax_exempt_role());
    }

    #[test]
    fn test_address_company_blank_counts_as_missing() {
        let mut address = Address::default();
        assert!(address.has_no_company());
        address.company = Some("   ".into());
        assert!(address.has_no_company());
        address.company = Some("ACME".into());
        assert!(!address.has_no_company());
    }

    #[test]
    fn test_language_two_letter_name() {
        let lang = Language {
            id: 2,
            name: "Deutsch".into(),
            language_culture: "de-DE".into(),
            unique_seo_code: "de".into(),
            published: true,
            display_order: 1,
        };
        assert_eq!(lang.two_letter_iso_name(), "de");
    }

    #[test]
    fn test_defaults() {
        assert_eq!(TaxBasedOn::default(), TaxBasedOn::BillingAddress);
        assert_eq!(VatNumberStatus::default(), VatNumberStatus::Unknown);
    }
}
