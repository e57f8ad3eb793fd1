//! # Application State
//!
//! Shared state for the Axum application.
//! Wires the cart store, checkout initiator and reconciler to their adapters.

use crate::notifier::MailRelayNotifier;
use crate::storage::{self, SqliteCartRepository, SqliteOrderRepository};
use shop_core::{
    BoxedLicenseIssuer, BoxedNotifier, BoxedPaymentStrategy, CartRepository, CartStore,
    CheckoutConfig, CheckoutInitiator, CheckoutReconciler, CheckoutUrls, DiscountResolver,
    KeyMaskTable, LoggingNotifier, OrderRepository,
};
use shop_keyauth::KeyAuthIssuer;
use shop_stripe::{StripeCheckoutStrategy, StripeConfig, WebhookVerifier};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

const DEFAULT_DATABASE_URL: &str = "sqlite://licensed-cart.db";

/// Application configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Host to bind to
    pub host: String,
    /// Port to listen on
    pub port: u16,
    /// Base URL for success/cancel callbacks
    pub base_url: String,
    /// Prefix for download links in receipts
    pub download_base_url: String,
    /// Mail relay endpoint for license emails; logged only when unset
    pub mail_relay_url: Option<String>,
    pub license_expiry_days: u32,
    pub external_timeout: Duration,
    /// SQLite database holding orders and carts
    pub database_url: String,
    /// Environment (development, staging, production)
    pub environment: String,
    /// `json` for structured logs, anything else for plain text
    pub log_format: String,
}

impl AppConfig {
    /// Load from environment variables
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        let base_url =
            std::env::var("BASE_URL").unwrap_or_else(|_| "http://localhost:3000".to_string());

        Self {
            host: std::env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string()),
            port: std::env::var("PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(3000),
            download_base_url: std::env::var("DOWNLOAD_BASE_URL")
                .unwrap_or_else(|_| base_url.clone()),
            base_url,
            mail_relay_url: std::env::var("MAIL_RELAY_URL").ok().filter(|u| !u.is_empty()),
            license_expiry_days: std::env::var("LICENSE_EXPIRY_DAYS")
                .ok()
                .and_then(|d| d.parse().ok())
                .unwrap_or(10),
            external_timeout: Duration::from_secs(
                std::env::var("EXTERNAL_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(15),
            ),
            database_url: std::env::var("DATABASE_URL")
                .unwrap_or_else(|_| DEFAULT_DATABASE_URL.to_string()),
            environment: std::env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string()),
            log_format: std::env::var("LOG_FORMAT").unwrap_or_else(|_| "text".to_string()),
        }
    }

    /// Get the socket address to bind to
    pub fn socket_addr(&self) -> anyhow::Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .map_err(|e| anyhow::anyhow!("Invalid socket address {}:{}: {}", self.host, self.port, e))
    }

    /// Check if running in production
    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }

    pub fn json_logs(&self) -> bool {
        self.log_format.eq_ignore_ascii_case("json")
    }

    /// Core checkout settings derived from this config
    pub fn checkout_config(&self, key_masks: KeyMaskTable) -> CheckoutConfig {
        CheckoutConfig::new(CheckoutUrls::new(&self.base_url))
            .with_download_base_url(&self.download_base_url)
            .with_license_expiry_days(self.license_expiry_days)
            .with_external_timeout(self.external_timeout)
            .with_key_masks(key_masks)
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3000,
            base_url: "http://localhost:3000".to_string(),
            download_base_url: "http://localhost:3000".to_string(),
            mail_relay_url: None,
            license_expiry_days: 10,
            external_timeout: Duration::from_secs(15),
            database_url: DEFAULT_DATABASE_URL.to_string(),
            environment: "development".to_string(),
            log_format: "text".to_string(),
        }
    }
}

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub carts: CartStore,
    pub discounts: DiscountResolver,
    pub initiator: CheckoutInitiator,
    pub reconciler: CheckoutReconciler,
    pub orders: Arc<dyn OrderRepository>,
    /// Present only when a webhook signing secret is configured
    pub webhooks: Option<WebhookVerifier>,
    pub config: AppConfig,
}

impl AppState {
    /// Create the production state: Stripe, KeyAuth and SQLite storage
    pub async fn new(config: AppConfig) -> anyhow::Result<Self> {
        let stripe_config = StripeConfig::from_env()
            .map_err(|e| anyhow::anyhow!("Failed to load Stripe config: {}", e))?;
        let webhooks = stripe_config.webhook_secret.clone().map(WebhookVerifier::new);
        let strategy = StripeCheckoutStrategy::new(stripe_config)
            .map_err(|e| anyhow::anyhow!("Failed to initialize Stripe: {}", e))?;

        let issuer = KeyAuthIssuer::from_env()
            .map_err(|e| anyhow::anyhow!("Failed to initialize KeyAuth: {}", e))?;

        let notifier: BoxedNotifier = match &config.mail_relay_url {
            Some(url) => Arc::new(
                MailRelayNotifier::new(url, config.external_timeout)
                    .map_err(|e| anyhow::anyhow!("Failed to initialize mail relay: {}", e))?,
            ),
            None => {
                tracing::warn!("MAIL_RELAY_URL not set, license emails will only be logged");
                Arc::new(LoggingNotifier)
            }
        };

        let key_masks = load_key_masks()?;

        let pool = storage::connect(&config.database_url)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to open {}: {}", config.database_url, e))?;

        Ok(Self::build(
            config,
            Arc::new(strategy),
            Arc::new(issuer),
            notifier,
            webhooks,
            key_masks,
            Arc::new(SqliteCartRepository::new(pool.clone())),
            Arc::new(SqliteOrderRepository::new(pool)),
        ))
    }

    /// Wire components around the given adapters and repositories
    #[allow(clippy::too_many_arguments)]
    pub fn build(
        config: AppConfig,
        strategy: BoxedPaymentStrategy,
        issuer: BoxedLicenseIssuer,
        notifier: BoxedNotifier,
        webhooks: Option<WebhookVerifier>,
        key_masks: KeyMaskTable,
        carts: Arc<dyn CartRepository>,
        orders: Arc<dyn OrderRepository>,
    ) -> Self {
        let checkout_config = Arc::new(config.checkout_config(key_masks));
        let carts = CartStore::new(carts);
        let discounts = DiscountResolver::new(strategy.clone(), config.external_timeout);

        let initiator = CheckoutInitiator::new(
            carts.clone(),
            discounts.clone(),
            strategy.clone(),
            checkout_config.clone(),
        );
        let reconciler =
            CheckoutReconciler::new(orders.clone(), strategy, issuer, notifier, checkout_config);

        Self {
            carts,
            discounts,
            initiator,
            reconciler,
            orders,
            webhooks,
            config,
        }
    }
}

/// Load the product → key mask table from config file
fn load_key_masks() -> anyhow::Result<KeyMaskTable> {
    let config_paths = [
        "config/license_masks.toml",
        "../config/license_masks.toml",
        "../../config/license_masks.toml",
    ];

    for path in config_paths {
        if let Ok(content) = std::fs::read_to_string(path) {
            let masks = KeyMaskTable::from_toml(&content)
                .map_err(|e| anyhow::anyhow!("Failed to parse {}: {}", path, e))?;
            tracing::info!("Loaded {} license masks from {}", masks.masks.len(), path);
            return Ok(masks);
        }
    }

    tracing::warn!("No license mask table found, using built-in masks");
    Ok(KeyMaskTable::default())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_socket_addr() {
        let config = AppConfig {
            host: "0.0.0.0".to_string(),
            port: 3000,
            ..AppConfig::default()
        };

        let addr = config.socket_addr().unwrap();
        assert_eq!(addr.to_string(), "0.0.0.0:3000");
    }

    #[test]
    fn test_bad_socket_addr_is_error() {
        let config = AppConfig {
            host: "not a host".to_string(),
            ..AppConfig::default()
        };
        assert!(config.socket_addr().is_err());
    }

    #[test]
    fn test_checkout_config_from_app_config() {
        let config = AppConfig {
            base_url: "https://shop.example.com/".to_string(),
            download_base_url: "https://dl.example.com".to_string(),
            license_expiry_days: 30,
            external_timeout: Duration::from_secs(5),
            ..AppConfig::default()
        };

        let checkout = config.checkout_config(KeyMaskTable::default());
        assert_eq!(checkout.download_base_url, "https://dl.example.com");
        assert_eq!(checkout.license_expiry_days, 30);
        assert_eq!(checkout.external_timeout, Duration::from_secs(5));
        assert!(checkout.urls.success_url().starts_with("https://shop.example.com/"));
    }

    #[test]
    fn test_default_storage_is_a_local_sqlite_file() {
        let config = AppConfig::default();
        assert!(config.database_url.starts_with("sqlite://"));
    }

    #[test]
    fn test_json_logs_flag() {
        let config = AppConfig {
            log_format: "JSON".to_string(),
            ..AppConfig::default()
        };
        assert!(config.json_logs());
        assert!(!AppConfig::default().json_logs());
    }
}
