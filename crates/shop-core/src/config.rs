//! # Checkout Configuration
//!
//! Explicit settings handed to each component at construction.

use crate::license::KeyMaskTable;
use std::time::Duration;

/// Placeholder the processor substitutes with the real session id
pub const SESSION_ID_PLACEHOLDER: &str = "{CHECKOUT_SESSION_ID}";

/// Configuration for URLs used in checkout
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutUrls {
    /// Base URL of the application (e.g., "https://shop.example.com")
    pub base_url: String,
    /// Success page path (e.g., "/checkout/success")
    pub success_path: String,
    /// Cancel page path (e.g., "/checkout/cancel")
    pub cancel_path: String,
}

impl CheckoutUrls {
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url: String = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            success_path: "/checkout/success".to_string(),
            cancel_path: "/checkout/cancel".to_string(),
        }
    }

    pub fn success_url(&self) -> String {
        format!("{}{}", self.base_url, self.success_path)
    }

    pub fn cancel_url(&self) -> String {
        format!("{}{}", self.base_url, self.cancel_path)
    }

    /// Success URL carrying the session id placeholder
    pub fn success_url_with_session(&self) -> String {
        let success = self.success_url();
        if success.contains('?') {
            format!("{}&session_id={}", success, SESSION_ID_PLACEHOLDER)
        } else {
            format!("{}?session_id={}", success, SESSION_ID_PLACEHOLDER)
        }
    }
}

impl Default for CheckoutUrls {
    fn default() -> Self {
        Self::new("http://localhost:3000")
    }
}

/// Settings for checkout initiation and reconciliation
#[derive(Debug, Clone)]
pub struct CheckoutConfig {
    pub urls: CheckoutUrls,

    /// Prefix for download links in receipts
    pub download_base_url: String,

    /// Validity window for issued license keys
    pub license_expiry_days: u32,

    /// Upper bound on every external call
    pub external_timeout: Duration,

    pub key_masks: KeyMaskTable,
}

impl CheckoutConfig {
    pub fn new(urls: CheckoutUrls) -> Self {
        Self {
            download_base_url: urls.base_url.clone(),
            urls,
            license_expiry_days: 10,
            external_timeout: Duration::from_secs(15),
            key_masks: KeyMaskTable::default(),
        }
    }

    /// Builder: set download base URL
    pub fn with_download_base_url(mut self, url: impl Into<String>) -> Self {
        self.download_base_url = url.into();
        self
    }

    /// Builder: set license expiry
    pub fn with_license_expiry_days(mut self, days: u32) -> Self {
        self.license_expiry_days = days;
        self
    }

    /// Builder: set external call timeout
    pub fn with_external_timeout(mut self, timeout: Duration) -> Self {
        self.external_timeout = timeout;
        self
    }

    /// Builder: set key masks
    pub fn with_key_masks(mut self, masks: KeyMaskTable) -> Self {
        self.key_masks = masks;
        self
    }
}

impl Default for CheckoutConfig {
    fn default() -> Self {
        Self::new(CheckoutUrls::default())
    }
}
