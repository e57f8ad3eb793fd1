//! # Checkout Initiation
//!
//! Turns the owner's cart (and an optional coupon) into a hosted payment
//! session and hands back the redirect target. Nothing is persisted here.

use crate::cart::CartStore;
use crate::config::CheckoutConfig;
use crate::discount::{DiscountDescriptor, DiscountResolver};
use crate::error::{with_timeout, ShopError, ShopResult};
use crate::pricing;
use crate::strategy::{BoxedPaymentStrategy, SessionLineItem, SessionRequest, OWNER_ID_METADATA_KEY};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{error, info, instrument};

/// Where to send the customer to pay
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutRedirect {
    pub session_id: String,
    pub redirect_url: String,
}

/// Opens payment sessions from carts
#[derive(Clone)]
pub struct CheckoutInitiator {
    carts: CartStore,
    discounts: DiscountResolver,
    strategy: BoxedPaymentStrategy,
    config: Arc<CheckoutConfig>,
}

impl CheckoutInitiator {
    pub fn new(
        carts: CartStore,
        discounts: DiscountResolver,
        strategy: BoxedPaymentStrategy,
        config: Arc<CheckoutConfig>,
    ) -> Self {
        Self {
            carts,
            discounts,
            strategy,
            config,
        }
    }

    /// Open a session for the owner's current cart
    #[instrument(skip(self), fields(provider = self.strategy.provider_name()))]
    pub async fn initiate(
        &self,
        owner_id: &str,
        coupon_code: Option<&str>,
    ) -> ShopResult<CheckoutRedirect> {
        let cart = self.carts.read(owner_id).await?;
        if cart.is_empty() {
            return Err(ShopError::EmptyCart);
        }

        // an unknown coupon stops the checkout before any session exists
        let coupon = self.discounts.resolve_optional(coupon_code).await?;
        let discount = coupon
            .as_ref()
            .map(|c| c.discount.clone())
            .unwrap_or(DiscountDescriptor::None);

        let priced = pricing::compute(&cart.items, &discount);

        let request = SessionRequest {
            line_items: cart
                .items
                .iter()
                .map(|item| SessionLineItem {
                    price_id: item.price_id.clone(),
                    quantity: item.quantity,
                })
                .collect(),
            coupon_id: coupon.map(|c| c.coupon_id),
            success_url: self.config.urls.success_url_with_session(),
            cancel_url: self.config.urls.cancel_url(),
            metadata: HashMap::from([(OWNER_ID_METADATA_KEY.to_string(), owner_id.to_string())]),
        };

        info!(
            "Creating checkout: {} lines, {} units, original={}, discounted={}",
            request.line_items.len(),
            cart.item_count(),
            priced.total_original,
            priced.total_discounted
        );

        let session = with_timeout(
            "create_session",
            self.config.external_timeout,
            self.strategy.create_session(&request),
        )
        .await
        .map_err(|e| {
            error!("Failed to create checkout session: {}", e);
            match e {
                ShopError::SessionCreationFailed(_) => e,
                other => ShopError::SessionCreationFailed(other.to_string()),
            }
        })?;

        info!("Created checkout session: {}", session.session_id);

        Ok(CheckoutRedirect {
            session_id: session.session_id,
            redirect_url: session.redirect_url,
        })
    }
}
