//! # shop-keyauth
//!
//! KeyAuth license issuer for licensed-cart-rs.
//!
//! ```rust,ignore
//! use shop_keyauth::KeyAuthIssuer;
//! use std::sync::Arc;
//!
//! let issuer = Arc::new(KeyAuthIssuer::from_env()?);
//! ```

pub mod config;
pub mod issuer;

pub use config::KeyAuthConfig;
pub use issuer::KeyAuthIssuer;
