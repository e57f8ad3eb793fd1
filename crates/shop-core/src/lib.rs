//! # shop-core
//!
//! Cart pricing and checkout reconciliation engine for licensed-cart.
//!
//! This crate provides:
//! - `pricing::compute` for per-line discounted cart totals
//! - `CartStore` over a `CartRepository` for per-owner carts
//! - `DiscountResolver` mapping coupon codes to `DiscountDescriptor`s
//! - `CheckoutInitiator` for opening hosted payment sessions
//! - `CheckoutReconciler` for turning a paid session into exactly one `Order`
//! - `PaymentStrategy`, `LicenseIssuer`, `Notifier` traits for the external services
//! - `ShopError` for typed error handling
//!
//! ## Example
//!
//! ```rust,ignore
//! use shop_core::{CheckoutInitiator, CheckoutReconciler, ReconcileOutcome};
//!
//! // Send the customer off to pay
//! let redirect = initiator.initiate("google-123", Some("HALF")).await?;
//!
//! // ...processor redirects back with ?session_id=...
//! match reconciler.reconcile(&session_id).await? {
//!     ReconcileOutcome::Completed { receipt, .. } => show(receipt),
//!     ReconcileOutcome::PaymentNotCompleted { .. } => retry_later(),
//! }
//! ```

pub mod cart;
pub mod checkout;
pub mod config;
pub mod discount;
pub mod error;
pub mod license;
pub mod money;
pub mod notify;
pub mod order;
pub mod pricing;
pub mod reconcile;
pub mod strategy;

#[cfg(test)]
pub(crate) mod testing;

// Re-exports for convenience
pub use cart::{Cart, CartItem, CartMutation, CartRepository, CartStore, InMemoryCartRepository};
pub use checkout::{CheckoutInitiator, CheckoutRedirect};
pub use config::{CheckoutConfig, CheckoutUrls, SESSION_ID_PLACEHOLDER};
pub use discount::{DiscountDescriptor, DiscountResolver, ResolvedCoupon};
pub use error::{with_timeout, ShopError, ShopResult};
pub use license::{BoxedLicenseIssuer, KeyMaskTable, LicenseIssuer, LicenseKey, LicenseRequest};
pub use money::Currency;
pub use notify::{BoxedNotifier, LoggingNotifier, Notifier};
pub use order::{
    CheckoutReceipt, DownloadLink, InMemoryOrderRepository, Order, OrderRepository,
    PurchasedProduct,
};
pub use pricing::{PricedLine, PricingResult};
pub use reconcile::{CheckoutReconciler, ReconcileOutcome};
pub use strategy::{
    BoxedPaymentStrategy, Coupon, CouponLookup, CreatedSession, CustomerDetails, PaymentStatus,
    PaymentStrategy, SessionDetails, SessionLine, SessionLineItem, SessionRequest,
    OWNER_ID_METADATA_KEY,
};
