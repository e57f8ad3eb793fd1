//! # Notifications
//!
//! Post-purchase notification seam. Delivery is best-effort; the reconciler
//! logs failures and moves on.

use crate::error::ShopResult;
use crate::license::LicenseKey;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::info;

/// Sends license keys to a customer
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send_license_email(&self, to_address: &str, keys: &[LicenseKey]) -> ShopResult<()>;
}

pub type BoxedNotifier = Arc<dyn Notifier>;

/// Default notifier (just logs)
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingNotifier;

#[async_trait]
impl Notifier for LoggingNotifier {
    async fn send_license_email(&self, to_address: &str, keys: &[LicenseKey]) -> ShopResult<()> {
        info!(
            "License email for {}: {} key(s) [{}]",
            to_address,
            keys.len(),
            keys.iter()
                .map(|k| k.product_name.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        );
        Ok(())
    }
}
