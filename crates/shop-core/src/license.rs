//! # License Keys
//!
//! Types and the issuer seam for post-purchase license keys. Each product
//! maps to a key mask (the presentation template handed to the issuer);
//! unrecognised products fall back to a generic mask.

use crate::error::ShopResult;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

pub const BASIC_MASK: &str = "BASIC-****-*****-****-****";
pub const ADVANCED_MASK: &str = "ADVANCED-****-*****-****-****";
pub const FALLBACK_MASK: &str = "UNKNOWN-****-*****-****-****";

/// An issued key; immutable once issued
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LicenseKey {
    pub product_name: String,
    pub key: String,
    pub mask: String,
}

/// What the issuer is asked to produce
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LicenseRequest {
    pub mask: String,
    pub expiry_days: u32,
    pub note: String,
}

/// External license issuance service
#[async_trait]
pub trait LicenseIssuer: Send + Sync {
    /// Issue one key and return it
    async fn issue(&self, request: &LicenseRequest) -> ShopResult<String>;

    /// Get the issuer name (for logging).
    fn issuer_name(&self) -> &'static str;
}

pub type BoxedLicenseIssuer = Arc<dyn LicenseIssuer>;

/// Product name → key mask
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyMaskTable {
    #[serde(default)]
    pub masks: HashMap<String, String>,

    #[serde(default = "default_fallback")]
    pub fallback: String,
}

fn default_fallback() -> String {
    FALLBACK_MASK.to_string()
}

impl Default for KeyMaskTable {
    fn default() -> Self {
        Self::new()
            .with_mask("Basic Utility", BASIC_MASK)
            .with_mask("Premium utility", ADVANCED_MASK)
    }
}

impl KeyMaskTable {
    /// An empty table that maps everything to the fallback
    pub fn new() -> Self {
        Self {
            masks: HashMap::new(),
            fallback: default_fallback(),
        }
    }

    /// Builder: add a mask for a product name
    pub fn with_mask(mut self, product_name: impl Into<String>, mask: impl Into<String>) -> Self {
        self.masks.insert(product_name.into(), mask.into());
        self
    }

    /// Mask for a product; names match exactly
    pub fn mask_for(&self, product_name: &str) -> &str {
        self.masks
            .get(product_name)
            .map(String::as_str)
            .unwrap_or(&self.fallback)
    }

    /// Load from TOML
    ///
    /// ```toml
    /// fallback = "UNKNOWN-****-*****-****-****"
    ///
    /// [masks]
    /// "Basic Utility" = "BASIC-****-*****-****-****"
    /// ```
    pub fn from_toml(toml_str: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(toml_str)
    }
}
