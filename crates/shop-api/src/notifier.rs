//! # Mail Relay Notifier
//!
//! Forwards license emails as JSON to an HTTP mail relay.

use async_trait::async_trait;
use serde::Serialize;
use shop_core::{LicenseKey, Notifier, ShopError, ShopResult};
use std::time::Duration;
use tracing::{error, info};

pub struct MailRelayNotifier {
    client: reqwest::Client,
    url: String,
}

impl MailRelayNotifier {
    pub fn new(url: impl Into<String>, timeout: Duration) -> ShopResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ShopError::Configuration(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[derive(Debug, Serialize)]
struct LicenseEmail<'a> {
    to: &'a str,
    subject: &'static str,
    keys: Vec<EmailKey<'a>>,
}

#[derive(Debug, Serialize)]
struct EmailKey<'a> {
    product_name: &'a str,
    key: &'a str,
}

#[async_trait]
impl Notifier for MailRelayNotifier {
    async fn send_license_email(&self, to_address: &str, keys: &[LicenseKey]) -> ShopResult<()> {
        let payload = LicenseEmail {
            to: to_address,
            subject: "Your license keys",
            keys: keys
                .iter()
                .map(|k| EmailKey {
                    product_name: &k.product_name,
                    key: &k.key,
                })
                .collect(),
        };

        let response = self
            .client
            .post(&self.url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| ShopError::NetworkError(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            info!("Mail relay accepted license email: {}", status);
            Ok(())
        } else {
            let body = response.text().await.unwrap_or_default();
            error!("Mail relay error: {} | {}", status, body);
            Err(ShopError::ProviderError {
                provider: "mail-relay".to_string(),
                message: format!("HTTP {}", status),
            })
        }
    }
}
