//! # Request Handlers
//!
//! Axum request handlers for the cart, checkout and order API.
//! Every cart and checkout operation acts on the owner named by the
//! `x-owner-id` header; authentication happens upstream.

use crate::state::AppState;
use axum::{
    body::Bytes,
    extract::{FromRequestParts, Query, State},
    http::{request::Parts, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use shop_core::{
    pricing, Cart, DiscountDescriptor, Order, PricingResult, ReconcileOutcome, ShopError,
};
use tracing::{error, info, instrument, warn};

/// Header carrying the authenticated owner id
pub const OWNER_HEADER: &str = "x-owner-id";

type ApiError = (StatusCode, Json<ErrorResponse>);

// =============================================================================
// Request/Response Types
// =============================================================================

/// Add-to-cart request
#[derive(Debug, Deserialize)]
pub struct AddToCartRequest {
    pub product_name: String,
    pub price_id: String,
    /// Unit price in major currency units
    pub price: Decimal,
}

/// Increase/decrease request
#[derive(Debug, Deserialize)]
pub struct CartLineRequest {
    pub product_name: String,
}

#[derive(Debug, Deserialize)]
pub struct CartQuery {
    #[serde(default)]
    pub coupon: Option<String>,
}

/// Cart plus its pricing under the requested coupon
#[derive(Debug, Serialize)]
pub struct CartView {
    pub owner_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub coupon_id: Option<String>,
    pub pricing: PricingResult,
}

/// Result of a cart mutation
#[derive(Debug, Serialize)]
pub struct CartResponse {
    pub message: &'static str,
    pub cart: Cart,
}

/// Create checkout request
#[derive(Debug, Default, Deserialize)]
pub struct CreateCheckoutRequest {
    #[serde(default)]
    pub coupon_code: Option<String>,
}

/// Create checkout response
#[derive(Debug, Serialize)]
pub struct CreateCheckoutResponse {
    /// Session ID
    pub session_id: String,
    /// Checkout URL (redirect user here)
    pub checkout_url: String,
}

#[derive(Debug, Deserialize)]
pub struct SuccessQuery {
    #[serde(default)]
    pub session_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct OrdersResponse {
    pub orders: Vec<Order>,
    pub count: usize,
}

/// Error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>, code: u16) -> Self {
        Self {
            error: error.into(),
            code,
            details: None,
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }
}

fn shop_error_to_response(err: ShopError) -> ApiError {
    let code = err.status_code();
    let mut response = ErrorResponse::new(err.to_string(), code);
    if err.is_retryable() {
        response = response.with_details("retryable");
    }
    (
        StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
        Json(response),
    )
}

/// Owner id taken from the `x-owner-id` header
#[derive(Debug, Clone)]
pub struct Owner(pub String);

impl<S> FromRequestParts<S> for Owner
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .headers
            .get(OWNER_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(|v| Owner(v.to_string()))
            .ok_or_else(|| {
                (
                    StatusCode::UNAUTHORIZED,
                    Json(ErrorResponse::new("Missing x-owner-id header", 401)),
                )
            })
    }
}

// =============================================================================
// Handlers
// =============================================================================

/// Health check endpoint
pub async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "licensed-cart",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// View the cart, priced under an optional coupon
#[instrument(skip(state, query))]
pub async fn view_cart(
    State(state): State<AppState>,
    Owner(owner_id): Owner,
    Query(query): Query<CartQuery>,
) -> Result<Json<CartView>, ApiError> {
    let cart = state.carts.read(&owner_id).await.map_err(shop_error_to_response)?;

    // nothing to discount, so no processor round-trip
    if cart.is_empty() {
        return Ok(Json(CartView {
            owner_id,
            coupon_id: None,
            pricing: pricing::compute(&[], &DiscountDescriptor::None),
        }));
    }

    let coupon = state
        .discounts
        .resolve_optional(query.coupon.as_deref())
        .await
        .map_err(shop_error_to_response)?;

    let discount = coupon
        .as_ref()
        .map(|c| c.discount.clone())
        .unwrap_or(DiscountDescriptor::None);

    Ok(Json(CartView {
        owner_id,
        coupon_id: coupon.map(|c| c.coupon_id),
        pricing: pricing::compute(&cart.items, &discount),
    }))
}

#[instrument(skip(state, request), fields(product = %request.product_name))]
pub async fn add_to_cart(
    State(state): State<AppState>,
    Owner(owner_id): Owner,
    Json(request): Json<AddToCartRequest>,
) -> Result<Json<CartResponse>, ApiError> {
    let cart = state
        .carts
        .add(&owner_id, &request.product_name, &request.price_id, request.price)
        .await
        .map_err(shop_error_to_response)?;

    Ok(Json(CartResponse {
        message: "Item added to cart.",
        cart,
    }))
}

pub async fn increase_quantity(
    State(state): State<AppState>,
    Owner(owner_id): Owner,
    Json(request): Json<CartLineRequest>,
) -> Result<Json<CartResponse>, ApiError> {
    let cart = state
        .carts
        .increase(&owner_id, &request.product_name)
        .await
        .map_err(shop_error_to_response)?;

    Ok(Json(CartResponse {
        message: "Cart updated.",
        cart,
    }))
}

pub async fn decrease_quantity(
    State(state): State<AppState>,
    Owner(owner_id): Owner,
    Json(request): Json<CartLineRequest>,
) -> Result<Json<CartResponse>, ApiError> {
    let cart = state
        .carts
        .decrease(&owner_id, &request.product_name)
        .await
        .map_err(shop_error_to_response)?;

    Ok(Json(CartResponse {
        message: "Cart updated.",
        cart,
    }))
}

pub async fn clear_cart(
    State(state): State<AppState>,
    Owner(owner_id): Owner,
) -> Result<Json<CartResponse>, ApiError> {
    let cart = state
        .carts
        .clear(&owner_id)
        .await
        .map_err(shop_error_to_response)?;

    Ok(Json(CartResponse {
        message: "Cart cleared.",
        cart,
    }))
}

/// Open a hosted payment session for the owner's cart
#[instrument(skip(state, request))]
pub async fn create_checkout(
    State(state): State<AppState>,
    Owner(owner_id): Owner,
    Json(request): Json<CreateCheckoutRequest>,
) -> Result<Json<CreateCheckoutResponse>, ApiError> {
    let redirect = state
        .initiator
        .initiate(&owner_id, request.coupon_code.as_deref())
        .await
        .map_err(|e| {
            error!("Failed to create checkout: {}", e);
            shop_error_to_response(e)
        })?;

    info!("Created checkout session: {}", redirect.session_id);

    Ok(Json(CreateCheckoutResponse {
        session_id: redirect.session_id,
        checkout_url: redirect.redirect_url,
    }))
}

/// Return from the hosted payment page; creates the order if paid
#[instrument(skip(state, query))]
pub async fn checkout_success(
    State(state): State<AppState>,
    Query(query): Query<SuccessQuery>,
) -> Result<Response, ApiError> {
    let session_id = query.session_id.unwrap_or_default();

    let outcome = state
        .reconciler
        .reconcile(&session_id)
        .await
        .map_err(|e| {
            error!("Failed to reconcile session {}: {}", session_id, e);
            shop_error_to_response(e)
        })?;

    let status = match outcome {
        ReconcileOutcome::Completed { .. } => StatusCode::OK,
        ReconcileOutcome::PaymentNotCompleted { .. } => StatusCode::PAYMENT_REQUIRED,
    };

    Ok((status, Json(outcome)).into_response())
}

/// Checkout cancel acknowledgement
pub async fn checkout_cancel() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "cancelled",
        "message": "Payment cancelled. No charges were made."
    }))
}

/// Orders for the current owner
pub async fn list_orders(
    State(state): State<AppState>,
    Owner(owner_id): Owner,
) -> Result<Json<OrdersResponse>, ApiError> {
    let orders = state
        .orders
        .find_by_user(&owner_id)
        .await
        .map_err(shop_error_to_response)?;

    Ok(Json(OrdersResponse {
        count: orders.len(),
        orders,
    }))
}

/// Handle Stripe webhook
#[instrument(skip(state, headers, body))]
pub async fn stripe_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<StatusCode, ApiError> {
    let signature = headers
        .get("stripe-signature")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| {
            (
                StatusCode::BAD_REQUEST,
                Json(ErrorResponse::new("Missing Stripe-Signature header", 400)),
            )
        })?;

    let verifier = state.webhooks.as_ref().ok_or_else(|| {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorResponse::new("Stripe webhooks not configured", 500)),
        )
    })?;

    let event = verifier.verify(&body, signature).map_err(|e| {
        error!("Webhook verification failed: {}", e);
        shop_error_to_response(e)
    })?;

    info!("Received webhook: type={}, id={}", event.event_type, event.id);

    let Some(session_id) = event.checkout_session_id() else {
        return Ok(StatusCode::OK);
    };

    // retryable failures surface as 5xx so Stripe redelivers
    match state.reconciler.reconcile(session_id).await {
        Ok(ReconcileOutcome::Completed { replayed, .. }) => {
            info!("Webhook reconciled session {} (replayed={})", session_id, replayed);
            Ok(StatusCode::OK)
        }
        Ok(ReconcileOutcome::PaymentNotCompleted { payment_status, .. }) => {
            warn!(
                "Webhook for session {} before payment completed: {}",
                session_id, payment_status
            );
            Ok(StatusCode::OK)
        }
        Err(e) => {
            error!("Webhook reconciliation failed for {}: {}", session_id, e);
            Err(shop_error_to_response(e))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_response() {
        let err = ErrorResponse::new("Test error", 400);
        assert_eq!(err.error, "Test error");
        assert_eq!(err.code, 400);
    }

    #[test]
    fn test_shop_error_conversion() {
        let (status, _json) = shop_error_to_response(ShopError::EmptyCart);
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, json) = shop_error_to_response(ShopError::Timeout {
            operation: "retrieve_session".into(),
            limit_ms: 15_000,
        });
        assert_eq!(status, StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(json.0.details.as_deref(), Some("retryable"));
    }
}
