//! # Price Calculation Pipeline
//!
//! Chain of responsibility over a [`CalculatorContext`].
//!
//! ```text
//! ┌──────────────┐    ┌────────────────┐    ┌────────────────┐
//! │   context    │──► │ OfferPrice     │──► │ TierPrice      │──► done
//! │ regular=final│    │ special price  │    │ qty discounts  │
//! └──────────────┘    │ in date range  │    │ if cheaper     │
//!                     └────────────────┘    └────────────────┘
//! ```
//!
//! Each calculator may modify the context and then calls `next.run(ctx)`.
//! A calculator that does not call `next` ends the chain.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use crate::types::Product;

// =============================================================================
// Context
// =============================================================================

/// Mutable state passed through the pipeline.
#[derive(Debug, Clone)]
pub struct CalculatorContext<'a> {
    pub product: &'a Product,
    pub quantity: u32,
    /// Evaluation time for date-bound prices.
    pub now: DateTime<Utc>,
    pub regular_price: Decimal,
    pub offer_price: Option<Decimal>,
    pub final_price: Decimal,
}

impl<'a> CalculatorContext<'a> {
    /// Starts with regular = final = the product price.
    pub fn new(product: &'a Product, quantity: u32, now: DateTime<Utc>) -> Self {
        CalculatorContext {
            product,
            quantity,
            now,
            regular_price: product.price,
            offer_price: None,
            final_price: product.price,
        }
    }
}

// =============================================================================
// Pipeline
// =============================================================================

/// A single pipeline step.
pub trait PriceCalculator: Send + Sync {
    fn calculate(&self, context: &mut CalculatorContext<'_>, next: Next<'_>);
}

/// The remainder of the pipeline.
pub struct Next<'a> {
    rest: &'a [Box<dyn PriceCalculator>],
}

impl Next<'_> {
    /// Invokes the next calculator, if any.
    pub fn run(self, context: &mut CalculatorContext<'_>) {
        if let Some((current, rest)) = self.rest.split_first() {
            current.calculate(context, Next { rest });
        }
    }
}

/// An ordered list of calculators.
#[derive(Default)]
pub struct PricePipeline {
    calculators: Vec<Box<dyn PriceCalculator>>,
}

impl PricePipeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a calculator.
    pub fn with(mut self, calculator: impl PriceCalculator + 'static) -> Self {
        self.calculators.push(Box::new(calculator));
        self
    }

    /// Offer price, then tier price.
    pub fn standard() -> Self {
        Self::new().with(OfferPriceCalculator).with(TierPriceCalculator)
    }

    pub fn len(&self) -> usize {
        self.calculators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.calculators.is_empty()
    }

    /// Runs every calculator against `context`.
    pub fn calculate(&self, context: &mut CalculatorContext<'_>) {
        Next {
            rest: &self.calculators,
        }
        .run(context);
    }
}

// =============================================================================
// Calculators
// =============================================================================

/// Applies the product's special price inside its (inclusive) date range.
pub struct OfferPriceCalculator;

impl PriceCalculator for OfferPriceCalculator {
    fn calculate(&self, context: &mut CalculatorContext<'_>, next: Next<'_>) {
        let product = context.product;
        if let Some(special) = product.special_price {
            let started = product.special_price_start.map_or(true, |from| context.now >= from);
            let not_ended = product.special_price_end.map_or(true, |to| context.now <= to);

            if started && not_ended {
                context.offer_price = Some(special);
                context.final_price = special;
            }
        }

        next.run(context);
    }
}

/// Applies the cheapest tier price reachable with the requested quantity.
pub struct TierPriceCalculator;

impl PriceCalculator for TierPriceCalculator {
    fn calculate(&self, context: &mut CalculatorContext<'_>, next: Next<'_>) {
        let tier = context
            .product
            .tier_prices
            .iter()
            .filter(|t| t.quantity <= context.quantity)
            .map(|t| t.price)
            .min();

        if let Some(price) = tier {
            if price < context.final_price {
                context.final_price = price;
            }
        }

        next.run(context);
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TierPrice;
    use chrono::{Duration, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
    }

    fn product() -> Product {
        Product {
            id: 1,
            name: "Espresso Machine".into(),
            price: Decimal::new(49900, 2),
            ..Default::default()
        }
    }

    #[test]
    fn test_offer_inside_range() {
        let mut p = product();
        p.special_price = Some(Decimal::new(44900, 2));
        p.special_price_start = Some(now() - Duration::days(1));
        p.special_price_end = Some(now());

        let mut ctx = CalculatorContext::new(&p, 1, now());
        PricePipeline::standard().calculate(&mut ctx);

        assert_eq!(ctx.offer_price, Some(Decimal::new(44900, 2)));
        assert_eq!(ctx.final_price, Decimal::new(44900, 2));
        assert_eq!(ctx.regular_price, Decimal::new(49900, 2));
    }

    #[test]
    fn test_offer_outside_range() {
        let mut p = product();
        p.special_price = Some(Decimal::new(44900, 2));
        p.special_price_start = Some(now() + Duration::hours(1));

        let mut ctx = CalculatorContext::new(&p, 1, now());
        PricePipeline::standard().calculate(&mut ctx);

        assert_eq!(ctx.offer_price, None);
        assert_eq!(ctx.final_price, Decimal::new(49900, 2));
    }

    #[test]
    fn test_offer_without_range_always_applies() {
        let mut p = product();
        p.special_price = Some(Decimal::new(100, 0));

        let mut ctx = CalculatorContext::new(&p, 1, now());
        PricePipeline::new().with(OfferPriceCalculator).calculate(&mut ctx);
        assert_eq!(ctx.final_price, Decimal::new(100, 0));
    }

    #[test]
    fn test_tier_price_by_quantity() {
        let mut p = product();
        p.tier_prices = vec![
            TierPrice {
                quantity: 5,
                price: Decimal::new(47000, 2),
            },
            TierPrice {
                quantity: 10,
                price: Decimal::new(45000, 2),
            },
        ];

        let mut ctx = CalculatorContext::new(&p, 7, now());
        PricePipeline::standard().calculate(&mut ctx);
        assert_eq!(ctx.final_price, Decimal::new(47000, 2));

        let mut ctx = CalculatorContext::new(&p, 2, now());
        PricePipeline::standard().calculate(&mut ctx);
        assert_eq!(ctx.final_price, Decimal::new(49900, 2));
    }

    #[test]
    fn test_tier_never_raises_offer() {
        let mut p = product();
        p.special_price = Some(Decimal::new(40000, 2));
        p.tier_prices = vec![TierPrice {
            quantity: 1,
            price: Decimal::new(45000, 2),
        }];

        let mut ctx = CalculatorContext::new(&p, 3, now());
        PricePipeline::standard().calculate(&mut ctx);
        assert_eq!(ctx.final_price, Decimal::new(40000, 2));
    }

    struct Stop;

    impl PriceCalculator for Stop {
        fn calculate(&self, _context: &mut CalculatorContext<'_>, _next: Next<'_>) {}
    }

    #[test]
    fn test_calculator_can_end_chain() {
        let mut p = product();
        p.special_price = Some(Decimal::ONE);

        let mut ctx = CalculatorContext::new(&p, 1, now());
        let pipeline = PricePipeline::new().with(Stop).with(OfferPriceCalculator);
        assert_eq!(pipeline.len(), 2);
        pipeline.calculate(&mut ctx);
        assert_eq!(ctx.final_price, Decimal::new(49900, 2));
    }
}
