//! # shop-api
//!
//! HTTP API layer for licensed-cart-rs.
//!
//! This crate provides:
//! - Axum-based HTTP server
//! - REST endpoints for the cart, checkout and orders
//! - Stripe webhook handler feeding the same reconciler as the success page
//! - SQLite-backed order and cart storage
//!
//! ## Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | GET | `/health` | Health check |
//! | GET | `/api/v1/cart?coupon=` | View cart with pricing |
//! | POST | `/api/v1/cart/{add,increase,decrease,clear}` | Mutate cart |
//! | POST | `/api/v1/checkout` | Create checkout session |
//! | GET | `/checkout/success?session_id=` | Reconcile paid session |
//! | GET | `/checkout/cancel` | Cancel acknowledgement |
//! | GET | `/api/v1/orders` | Orders for the owner |
//! | POST | `/webhook/stripe` | Stripe webhook |

pub mod handlers;
pub mod notifier;
pub mod routes;
pub mod state;
pub mod storage;

pub use routes::create_router;
pub use state::{AppConfig, AppState};
