//! # Shop Error Types
//!
//! Typed error handling for the licensed-cart checkout engine.
//! All core operations return `Result<T, ShopError>`.

use std::future::Future;
use std::time::Duration;
use thiserror::Error;

/// Core error type for cart, checkout and reconciliation operations
#[derive(Debug, Error)]
pub enum ShopError {
    /// Configuration errors (missing keys, invalid config)
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Invalid request data
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Checkout attempted with nothing in the cart
    #[error("Cart is empty")]
    EmptyCart,

    /// Completion called without a session reference
    #[error("Session ID is missing")]
    MissingSessionId,

    /// Coupon code could not be resolved to a usable discount
    #[error("Invalid or expired coupon code: {code}")]
    InvalidCoupon { code: String, reason: String },

    /// Payment provider API error
    #[error("Provider error [{provider}]: {message}")]
    ProviderError { provider: String, message: String },

    /// Network/HTTP error communicating with an external service
    #[error("Network error: {0}")]
    NetworkError(String),

    /// External call exceeded its time bound
    #[error("Timed out after {limit_ms}ms waiting for {operation}")]
    Timeout { operation: String, limit_ms: u64 },

    /// Checkout session creation failed
    #[error("Checkout creation failed: {0}")]
    SessionCreationFailed(String),

    /// License key issuer refused or failed
    #[error("License issuance failed for {product_name}: {message}")]
    LicenseIssuanceFailed {
        product_name: String,
        message: String,
    },

    /// An order already exists for this checkout session
    #[error("Order already exists for session {session_id}")]
    DuplicateOrder { session_id: String },

    /// Webhook signature verification failed
    #[error("Webhook verification failed: {0}")]
    WebhookVerificationFailed(String),

    /// Storage layer error
    #[error("Storage error: {0}")]
    Storage(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Internal error (should not happen)
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ShopError {
    /// Returns true if retrying the whole operation may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ShopError::NetworkError(_)
                | ShopError::Timeout { .. }
                | ShopError::ProviderError { .. }
                | ShopError::SessionCreationFailed(_)
                | ShopError::LicenseIssuanceFailed { .. }
        )
    }

    /// Returns true if the caller supplied bad input
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            ShopError::InvalidRequest(_)
                | ShopError::EmptyCart
                | ShopError::MissingSessionId
                | ShopError::InvalidCoupon { .. }
                | ShopError::WebhookVerificationFailed(_)
        )
    }

    /// Returns the HTTP status code appropriate for this error
    pub fn status_code(&self) -> u16 {
        match self {
            ShopError::Configuration(_) => 500,
            ShopError::InvalidRequest(_) => 400,
            ShopError::EmptyCart => 400,
            ShopError::MissingSessionId => 400,
            ShopError::InvalidCoupon { .. } => 400,
            ShopError::ProviderError { .. } => 502,
            ShopError::NetworkError(_) => 503,
            ShopError::Timeout { .. } => 504,
            ShopError::SessionCreationFailed(_) => 502,
            ShopError::LicenseIssuanceFailed { .. } => 502,
            ShopError::DuplicateOrder { .. } => 409,
            ShopError::WebhookVerificationFailed(_) => 401,
            ShopError::Storage(_) => 500,
            ShopError::Serialization(_) => 500,
            ShopError::Internal(_) => 500,
        }
    }
}

/// Result type alias for shop operations
pub type ShopResult<T> = Result<T, ShopError>;

/// Run an external call under a time bound.
///
/// An elapsed timer is reported as [`ShopError::Timeout`] so callers handle it
/// exactly like any other failure of that step.
pub async fn with_timeout<T, F>(operation: &str, limit: Duration, call: F) -> ShopResult<T>
where
    F: Future<Output = ShopResult<T>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(ShopError::Timeout {
            operation: operation.to_string(),
            limit_ms: limit.as_millis() as u64,
        }),
    }
}
