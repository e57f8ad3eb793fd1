//! # Pricing Engine
//!
//! Pure cart pricing. Discounts are allocated per line: a percentage scales
//! each line total, a fixed amount comes off each line on its own and floors
//! that line at zero without carrying the remainder to other lines.

use crate::cart::CartItem;
use crate::discount::DiscountDescriptor;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A priced cart line
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricedLine {
    pub product_name: String,
    pub unit_price: Decimal,
    pub quantity: u32,
    /// unit_price × quantity
    pub line_total: Decimal,
    /// line_total less this line's discount, never below zero
    pub line_discounted: Decimal,
}

/// Priced cart
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricingResult {
    pub items: Vec<PricedLine>,
    pub total_original: Decimal,
    pub total_discounted: Decimal,
    pub discount_applied: DiscountDescriptor,
}

impl PricingResult {
    /// How much the discount takes off overall
    pub fn savings(&self) -> Decimal {
        self.total_original - self.total_discounted
    }
}

/// Discount allocated to a single line, clamped to `[0, line_total]`
fn line_discount(line_total: Decimal, discount: &DiscountDescriptor) -> Decimal {
    let raw = match discount {
        DiscountDescriptor::Percent { value } => line_total * *value / Decimal::ONE_HUNDRED,
        DiscountDescriptor::FixedAmount { value, .. } => *value,
        DiscountDescriptor::None => Decimal::ZERO,
    };
    raw.max(Decimal::ZERO).min(line_total)
}

/// Price a set of cart lines under a discount
pub fn compute(items: &[CartItem], discount: &DiscountDescriptor) -> PricingResult {
    let items: Vec<PricedLine> = items
        .iter()
        .map(|item| {
            let line_total = item.total();
            let line_discounted = (line_total - line_discount(line_total, discount)).max(Decimal::ZERO);
            PricedLine {
                product_name: item.product_name.clone(),
                unit_price: item.unit_price,
                quantity: item.quantity,
                line_total,
                line_discounted,
            }
        })
        .collect();

    let total_original = items.iter().map(|l| l.line_total).sum();
    let total_discounted = items.iter().map(|l| l.line_discounted).sum();

    PricingResult {
        items,
        total_original,
        total_discounted,
        discount_applied: discount.clone(),
    }
}
