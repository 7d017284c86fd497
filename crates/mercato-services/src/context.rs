//! Per-request work context.

use mercato_core::{Currency, Customer, Language, TaxDisplayType};

/// The customer, currency and display preferences of the current request.
///
/// Services hold a clone; build one per request or unit of work.
#[derive(Debug, Clone)]
pub struct WorkContext {
    pub customer: Customer,
    pub working_currency: Currency,
    pub working_language: Option<Language>,
    pub tax_display_type: TaxDisplayType,
}

impl WorkContext {
    pub fn new(customer: Customer, working_currency: Currency) -> Self {
        WorkContext {
            customer,
            working_currency,
            working_language: None,
            tax_display_type: TaxDisplayType::IncludingTax,
        }
    }

    pub fn with_tax_display_type(mut self, tax_display_type: TaxDisplayType) -> Self {
        self.tax_display_type = tax_display_type;
        self
    }

    pub fn with_language(mut self, language: Language) -> Self {
        self.working_language = Some(language);
        self
    }

    /// Whether prices are shown including tax.
    pub fn displays_including_tax(&self) -> bool {
        self.tax_display_type == TaxDisplayType::IncludingTax
    }
}
