//! # KeyAuth Configuration
//!
//! The seller key is a secret and is only ever read from the environment.

use shop_core::ShopError;
use std::env;
use std::time::Duration;

/// KeyAuth seller API configuration
#[derive(Debug, Clone)]
pub struct KeyAuthConfig {
    /// Seller key from the KeyAuth dashboard
    pub seller_key: String,

    /// Seller API endpoint (for testing/mocking)
    pub api_base_url: String,

    /// Characters used when generating keys (2 = uppercase)
    pub character_set: u8,

    /// Per-request HTTP timeout
    pub request_timeout: Duration,
}

impl KeyAuthConfig {
    /// Load configuration from environment variables.
    ///
    /// Required env vars:
    /// - `KEYAUTH_SELLER_KEY`
    ///
    /// Optional:
    /// - `KEYAUTH_API_BASE_URL`
    pub fn from_env() -> Result<Self, ShopError> {
        dotenvy::dotenv().ok();

        let seller_key = env::var("KEYAUTH_SELLER_KEY")
            .map_err(|_| ShopError::Configuration("KEYAUTH_SELLER_KEY not set".to_string()))?;

        let mut config = Self::new(seller_key);
        if let Ok(url) = env::var("KEYAUTH_API_BASE_URL") {
            config.api_base_url = url;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn new(seller_key: impl Into<String>) -> Self {
        Self {
            seller_key: seller_key.into(),
            api_base_url: "https://keyauth.win/api/seller/".to_string(),
            character_set: 2,
            request_timeout: Duration::from_secs(30),
        }
    }

    pub fn validate(&self) -> Result<(), ShopError> {
        if self.seller_key.trim().is_empty() {
            return Err(ShopError::Configuration(
                "KEYAUTH_SELLER_KEY is empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Builder: set custom API base URL (for testing)
    pub fn with_api_base_url(mut self, url: impl Into<String>) -> Self {
        self.api_base_url = url.into();
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}
