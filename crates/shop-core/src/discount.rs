//! # Discounts
//!
//! Coupon codes resolve to a [`DiscountDescriptor`] through the payment
//! processor's coupon registry. Any failure to resolve is an invalid coupon,
//! never a silent "no discount".

use crate::error::{with_timeout, ShopError, ShopResult};
use crate::money::Currency;
use crate::strategy::{BoxedPaymentStrategy, Coupon, CouponLookup};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, instrument, warn};

/// A price reduction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DiscountDescriptor {
    /// Percentage off each line, 0–100
    Percent { value: Decimal },
    /// Amount off each line, in major units
    FixedAmount { value: Decimal, currency: Currency },
    #[default]
    None,
}

impl DiscountDescriptor {
    /// Validated percentage discount
    pub fn percent(value: Decimal) -> ShopResult<Self> {
        if value.is_sign_negative() || value > Decimal::ONE_HUNDRED {
            return Err(ShopError::InvalidRequest(format!(
                "percent discount out of range: {}",
                value
            )));
        }
        Ok(DiscountDescriptor::Percent { value })
    }

    /// Validated fixed-amount discount
    pub fn fixed_amount(value: Decimal, currency: Currency) -> ShopResult<Self> {
        if value.is_sign_negative() {
            return Err(ShopError::InvalidRequest(format!(
                "fixed discount must not be negative: {}",
                value
            )));
        }
        Ok(DiscountDescriptor::FixedAmount { value, currency })
    }

    pub fn is_none(&self) -> bool {
        matches!(self, DiscountDescriptor::None)
    }

    /// Map a processor coupon onto a descriptor.
    ///
    /// Percent wins when a coupon carries both fields.
    pub fn from_coupon(coupon: &Coupon) -> Result<Self, String> {
        if !coupon.valid {
            return Err("coupon is no longer valid".to_string());
        }

        if let Some(percent) = coupon.percent_off.filter(|p| !p.is_zero()) {
            return Self::percent(percent).map_err(|e| e.to_string());
        }

        if let Some(amount) = coupon.amount_off.filter(|a| *a != 0) {
            let currency = Currency::new(coupon.currency.as_deref().unwrap_or("usd"));
            return Self::fixed_amount(currency.from_minor_units(amount), currency)
                .map_err(|e| e.to_string());
        }

        Ok(DiscountDescriptor::None)
    }
}

/// A coupon resolved to both its processor reference and its effect
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedCoupon {
    pub coupon_id: String,
    pub discount: DiscountDescriptor,
}

/// Resolves coupon codes against the payment processor
#[derive(Clone)]
pub struct DiscountResolver {
    strategy: BoxedPaymentStrategy,
    timeout: Duration,
}

impl DiscountResolver {
    pub fn new(strategy: BoxedPaymentStrategy, timeout: Duration) -> Self {
        Self { strategy, timeout }
    }

    /// Resolve a code; every failure mode is `ShopError::InvalidCoupon`
    #[instrument(skip(self), fields(provider = self.strategy.provider_name()))]
    pub async fn resolve(&self, code: &str) -> ShopResult<ResolvedCoupon> {
        let invalid = |reason: String| ShopError::InvalidCoupon {
            code: code.to_string(),
            reason,
        };

        let code = code.trim();
        if code.is_empty() {
            return Err(invalid("empty coupon code".to_string()));
        }

        let lookup = with_timeout(
            "retrieve_coupon",
            self.timeout,
            self.strategy.retrieve_coupon(code),
        )
        .await
        .map_err(|e| {
            warn!("Coupon lookup failed: {}", e);
            invalid(e.to_string())
        })?;

        let coupon = match lookup {
            CouponLookup::Found(coupon) => coupon,
            CouponLookup::NotFound => return Err(invalid("coupon not found".to_string())),
        };

        let discount = DiscountDescriptor::from_coupon(&coupon).map_err(invalid)?;
        debug!("Resolved coupon {} to {:?}", coupon.id, discount);

        Ok(ResolvedCoupon {
            coupon_id: coupon.id,
            discount,
        })
    }

    /// Resolve an optional code; blank counts as absent
    pub async fn resolve_optional(&self, code: Option<&str>) -> ShopResult<Option<ResolvedCoupon>> {
        match code.map(str::trim).filter(|c| !c.is_empty()) {
            Some(code) => self.resolve(code).await.map(Some),
            None => Ok(None),
        }
    }
}
