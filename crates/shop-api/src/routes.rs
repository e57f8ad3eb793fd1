//! # Routes
//!
//! Axum router configuration for the cart and checkout API.

use crate::handlers;
use crate::state::AppState;
use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

/// Create the main application router
///
/// Routes:
/// - Cart (owner from `x-owner-id`):
///   - GET  /api/v1/cart?coupon= - View cart with pricing
///   - POST /api/v1/cart/add - Add one unit of a product
///   - POST /api/v1/cart/increase - Add one unit to a line
///   - POST /api/v1/cart/decrease - Remove one unit from a line
///   - POST /api/v1/cart/clear - Empty the cart
///
/// - Checkout:
///   - POST /api/v1/checkout - Open a payment session
///   - GET  /checkout/success?session_id= - Reconcile a session into an order
///   - GET  /checkout/cancel - Cancel acknowledgement
///   - GET  /api/v1/orders - Orders for the owner
///
/// - Webhooks:
///   - POST /webhook/stripe - Stripe webhook handler
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let checkout_routes = Router::new()
        .route("/success", get(handlers::checkout_success))
        .route("/cancel", get(handlers::checkout_cancel));

    let cart_routes = Router::new()
        .route("/", get(handlers::view_cart))
        .route("/add", post(handlers::add_to_cart))
        .route("/increase", post(handlers::increase_quantity))
        .route("/decrease", post(handlers::decrease_quantity))
        .route("/clear", post(handlers::clear_cart));

    let api_routes = Router::new()
        .nest("/cart", cart_routes)
        .route("/checkout", post(handlers::create_checkout))
        .route("/orders", get(handlers::list_orders));

    // Webhook routes (raw body)
    let webhook_routes = Router::new().route("/stripe", post(handlers::stripe_webhook));

    Router::new()
        .route("/health", get(handlers::health))
        .route("/", get(handlers::health))
        .nest("/checkout", checkout_routes)
        .nest("/api/v1", api_routes)
        .nest("/webhook", webhook_routes)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
