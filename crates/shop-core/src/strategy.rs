//! # Payment Strategy Trait
//!
//! The seam between the checkout engine and an external payment processor.
//! Implementations: Stripe (see `shop-stripe`), test fakes.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    PaymentStrategy (trait)                  │
//! │  ├── retrieve_coupon()    coupon code -> discount           │
//! │  ├── create_session()     cart lines -> redirect URL        │
//! │  ├── retrieve_session()   session id -> payment outcome     │
//! │  └── provider_name()                                        │
//! └─────────────────────────────────────────────────────────────┘
//!          ▲                        ▲                  ▲
//!  DiscountResolver        CheckoutInitiator   CheckoutReconciler
//! ```

use crate::error::ShopResult;
use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

/// Session metadata key carrying the cart owner's identity
pub const OWNER_ID_METADATA_KEY: &str = "owner_id";

/// A coupon as the processor reports it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Coupon {
    /// Processor coupon id (what sessions reference)
    pub id: String,

    /// Percentage off, 0–100
    #[serde(default)]
    pub percent_off: Option<Decimal>,

    /// Amount off in minor currency units
    #[serde(default)]
    pub amount_off: Option<i64>,

    /// Currency of `amount_off`
    #[serde(default)]
    pub currency: Option<String>,

    /// False once expired or redeemed out
    #[serde(default = "default_true")]
    pub valid: bool,
}

fn default_true() -> bool {
    true
}

/// Result of a coupon lookup
#[derive(Debug, Clone, PartialEq)]
pub enum CouponLookup {
    Found(Coupon),
    NotFound,
}

/// One line of a session request: processor price id plus quantity.
/// Amounts come from the processor's own price registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionLineItem {
    pub price_id: String,
    pub quantity: u32,
}

/// Everything needed to open a hosted checkout session
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionRequest {
    pub line_items: Vec<SessionLineItem>,

    /// Processor-native coupon reference
    pub coupon_id: Option<String>,

    /// Redirect after payment; may contain the processor's session placeholder
    pub success_url: String,

    /// Redirect if the customer backs out
    pub cancel_url: String,

    /// Opaque metadata echoed back on retrieval
    pub metadata: HashMap<String, String>,
}

/// A session the processor has opened
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatedSession {
    pub session_id: String,
    pub redirect_url: String,
}

/// Payment status of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Paid,
    Unpaid,
    NoPaymentRequired,
    #[serde(other)]
    Unknown,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Paid => "paid",
            PaymentStatus::Unpaid => "unpaid",
            PaymentStatus::NoPaymentRequired => "no_payment_required",
            PaymentStatus::Unknown => "unknown",
        }
    }

    pub fn is_paid(&self) -> bool {
        matches!(self, PaymentStatus::Paid)
    }
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Customer contact captured by the processor
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerDetails {
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
}

/// A purchased line as reported on the session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionLine {
    pub price_id: String,
    /// Processor's human-readable description (the product name)
    pub description: String,
    pub quantity: u32,
}

/// Current state of a session, with its line items expanded
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDetails {
    pub id: String,
    pub payment_status: PaymentStatus,
    /// Amount charged, minor units
    pub amount_total: i64,
    /// Lowercase ISO code
    pub currency: String,
    #[serde(default)]
    pub customer: CustomerDetails,
    #[serde(default)]
    pub payment_method_types: Vec<String>,
    #[serde(default)]
    pub line_items: Vec<SessionLine>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl SessionDetails {
    /// Owner identity stamped at checkout initiation
    pub fn owner_id(&self) -> Option<&str> {
        self.metadata.get(OWNER_ID_METADATA_KEY).map(|s| s.as_str())
    }
}

/// Core trait for payment processor implementations.
#[async_trait]
pub trait PaymentStrategy: Send + Sync {
    /// Look up a coupon by its code.
    async fn retrieve_coupon(&self, code: &str) -> ShopResult<CouponLookup>;

    /// Open a hosted checkout session.
    ///
    /// # Returns
    /// The session id and the URL to redirect the customer to.
    async fn create_session(&self, request: &SessionRequest) -> ShopResult<CreatedSession>;

    /// Fetch a session's current state, line items included.
    async fn retrieve_session(&self, session_id: &str) -> ShopResult<SessionDetails>;

    /// Get the provider name (for logging).
    fn provider_name(&self) -> &'static str;
}

/// Type alias for a shared payment strategy (dynamic dispatch)
pub type BoxedPaymentStrategy = Arc<dyn PaymentStrategy>;
