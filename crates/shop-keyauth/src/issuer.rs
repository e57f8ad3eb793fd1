//! # KeyAuth Issuer
//!
//! `LicenseIssuer` over the KeyAuth seller API. One request issues one key.

use crate::config::KeyAuthConfig;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use shop_core::{LicenseIssuer, LicenseRequest, ShopError, ShopResult};
use tracing::{error, info, instrument};

const PROVIDER: &str = "keyauth";

pub struct KeyAuthIssuer {
    config: KeyAuthConfig,
    client: Client,
}

impl KeyAuthIssuer {
    pub fn new(config: KeyAuthConfig) -> ShopResult<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| ShopError::Configuration(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { config, client })
    }

    pub fn from_env() -> ShopResult<Self> {
        Self::new(KeyAuthConfig::from_env()?)
    }

    fn query(&self, request: &LicenseRequest) -> Vec<(&'static str, String)> {
        vec![
            ("sellerkey", self.config.seller_key.clone()),
            ("type", "add".to_string()),
            ("format", "json".to_string()),
            ("expiry", request.expiry_days.to_string()),
            ("mask", request.mask.clone()),
            ("amount", "1".to_string()),
            ("character", self.config.character_set.to_string()),
            ("note", request.note.clone()),
        ]
    }
}

fn provider_error(message: impl Into<String>) -> ShopError {
    ShopError::ProviderError {
        provider: PROVIDER.to_string(),
        message: message.into(),
    }
}

#[async_trait]
impl LicenseIssuer for KeyAuthIssuer {
    #[instrument(skip(self, request), fields(mask = %request.mask))]
    async fn issue(&self, request: &LicenseRequest) -> ShopResult<String> {
        let response = self
            .client
            .get(&self.config.api_base_url)
            .query(&self.query(request))
            .send()
            .await
            .map_err(|e| ShopError::NetworkError(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ShopError::NetworkError(e.to_string()))?;

        if !status.is_success() {
            error!("KeyAuth API error: status={}, body={}", status, body);
            return Err(provider_error(format!("HTTP {}: {}", status, body)));
        }

        let reply: KeyAuthReply = serde_json::from_str(&body).map_err(|e| {
            ShopError::Serialization(format!("Failed to parse KeyAuth response: {}", e))
        })?;

        if !reply.success {
            error!("KeyAuth refused key: {}", reply.message);
            return Err(provider_error(reply.message));
        }

        match reply.key {
            Some(key) if !key.is_empty() => {
                info!("Issued license key for mask {}", request.mask);
                Ok(key)
            }
            _ => Err(provider_error("response carried no key")),
        }
    }

    fn issuer_name(&self) -> &'static str {
        PROVIDER
    }
}

#[derive(Debug, Deserialize)]
struct KeyAuthReply {
    success: bool,
    #[serde(default)]
    message: String,
    #[serde(default)]
    key: Option<String>,
}
