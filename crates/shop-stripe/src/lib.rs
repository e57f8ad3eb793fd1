//! # shop-stripe
//!
//! Stripe payment strategy for licensed-cart-rs.
//!
//! - **StripeCheckoutStrategy** implements `shop_core::PaymentStrategy` over
//!   the Coupons and Checkout Sessions APIs
//! - **WebhookVerifier** checks `Stripe-Signature` headers and parses events
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use shop_stripe::{StripeCheckoutStrategy, WebhookVerifier};
//! use std::sync::Arc;
//!
//! let strategy = Arc::new(StripeCheckoutStrategy::from_env()?);
//!
//! // In your webhook endpoint:
//! let event = verifier.verify(&body, signature)?;
//! if let Some(session_id) = event.checkout_session_id() {
//!     reconciler.reconcile(session_id).await?;
//! }
//! ```

pub mod checkout;
pub mod config;
pub mod webhook;

// Re-exports
pub use checkout::StripeCheckoutStrategy;
pub use config::StripeConfig;
pub use webhook::{sign_payload, StripeEvent, WebhookVerifier, REQUIRED_WEBHOOK_EVENTS};
