//! # Order Types
//!
//! The durable record of a completed checkout. At most one order exists per
//! checkout session id; the repository enforces that on insert.

use crate::error::{ShopError, ShopResult};
use crate::license::LicenseKey;
use crate::money::Currency;
use crate::strategy::{CustomerDetails, PaymentStatus};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A product bought in an order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchasedProduct {
    /// External price identifier
    pub product_id: String,

    /// Processor's description of the line
    pub product_name: String,
}

/// A completed, paid order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    /// Unique order ID (generated)
    pub id: Uuid,

    /// Owner identity from session metadata
    pub user_id: String,

    /// Unique per order
    pub checkout_session_id: String,

    /// Amount charged, minor units
    pub amount: i64,

    pub currency: Currency,

    pub status: PaymentStatus,

    #[serde(default)]
    pub customer: CustomerDetails,

    #[serde(default)]
    pub payment_method_types: Vec<String>,

    pub purchased_products: Vec<PurchasedProduct>,

    pub license_keys: Vec<LicenseKey>,

    pub purchased_at: DateTime<Utc>,
}

impl Order {
    /// Build the payload handed back to the customer
    pub fn receipt(&self, download_base_url: &str) -> CheckoutReceipt {
        let base = download_base_url.trim_end_matches('/');
        CheckoutReceipt {
            order_id: self.id,
            checkout_session_id: self.checkout_session_id.clone(),
            download_links: self
                .purchased_products
                .iter()
                .map(|p| DownloadLink {
                    product_name: p.product_name.clone(),
                    link: format!("{}/download/{}", base, p.product_id),
                })
                .collect(),
            license_keys: self.license_keys.clone(),
        }
    }

    /// License key for a product, if one was issued
    pub fn license_key_for(&self, product_name: &str) -> Option<&LicenseKey> {
        self.license_keys
            .iter()
            .find(|k| k.product_name == product_name)
    }

    /// Amount in major units
    pub fn amount_decimal(&self) -> rust_decimal::Decimal {
        self.currency.from_minor_units(self.amount)
    }
}

/// Where to download a purchased product
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadLink {
    pub product_name: String,
    pub link: String,
}

/// What a successful checkout completion returns
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutReceipt {
    pub order_id: Uuid,
    pub checkout_session_id: String,
    pub download_links: Vec<DownloadLink>,
    pub license_keys: Vec<LicenseKey>,
}

/// Durable order storage.
///
/// `insert_unique` must reject a second order for the same session id at the
/// storage layer, returning [`ShopError::DuplicateOrder`].
#[async_trait]
pub trait OrderRepository: Send + Sync {
    async fn find_by_session_id(&self, session_id: &str) -> ShopResult<Option<Order>>;

    async fn insert_unique(&self, order: Order) -> ShopResult<Order>;

    /// Orders for an owner, oldest first
    async fn find_by_user(&self, user_id: &str) -> ShopResult<Vec<Order>>;
}

/// In-process order storage, keyed by checkout session id
#[derive(Debug, Default)]
pub struct InMemoryOrderRepository {
    orders: DashMap<String, Order>,
}

impl InMemoryOrderRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.orders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.orders.is_empty()
    }
}

#[async_trait]
impl OrderRepository for InMemoryOrderRepository {
    async fn find_by_session_id(&self, session_id: &str) -> ShopResult<Option<Order>> {
        Ok(self.orders.get(session_id).map(|o| o.value().clone()))
    }

    async fn insert_unique(&self, order: Order) -> ShopResult<Order> {
        match self.orders.entry(order.checkout_session_id.clone()) {
            Entry::Occupied(existing) => Err(ShopError::DuplicateOrder {
                session_id: existing.key().clone(),
            }),
            Entry::Vacant(slot) => {
                slot.insert(order.clone());
                Ok(order)
            }
        }
    }

    async fn find_by_user(&self, user_id: &str) -> ShopResult<Vec<Order>> {
        let mut orders: Vec<Order> = self
            .orders
            .iter()
            .filter(|o| o.user_id == user_id)
            .map(|o| o.value().clone())
            .collect();
        orders.sort_by_key(|o| o.purchased_at);
        Ok(orders)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn order(session_id: &str, user_id: &str) -> Order {
        Order {
            id: Uuid::new_v4(),
            user_id: user_id.to_string(),
            checkout_session_id: session_id.to_string(),
            amount: 2000,
            currency: Currency::USD,
            status: PaymentStatus::Paid,
            customer: CustomerDetails {
                email: Some("buyer@example.com".into()),
                name: Some("Buyer".into()),
            },
            payment_method_types: vec!["card".into()],
            purchased_products: vec![PurchasedProduct {
                product_id: "price_basic".into(),
                product_name: "Basic Utility".into(),
            }],
            license_keys: vec![LicenseKey {
                product_name: "Basic Utility".into(),
                key: "BASIC-AB12-CD345-EF67-GH89".into(),
                mask: crate::license::BASIC_MASK.into(),
            }],
            purchased_at: Utc::now(),
        }
    }

    #[test]
    fn test_receipt_links() {
        let order = order("sess_123", "u1");
        let receipt = order.receipt("http://localhost:3000/");

        assert_eq!(receipt.order_id, order.id);
        assert_eq!(receipt.download_links.len(), 1);
        assert_eq!(
            receipt.download_links[0].link,
            "http://localhost:3000/download/price_basic"
        );
        assert_eq!(receipt.license_keys, order.license_keys);
        assert!(order.license_key_for("Basic Utility").is_some());
    }

    #[test]
    fn test_amount_decimal() {
        assert_eq!(order("s", "u").amount_decimal().to_string(), "20.00");
    }

    #[tokio::test]
    async fn test_insert_unique_rejects_second_order() {
        let repo = InMemoryOrderRepository::new();
        repo.insert_unique(order("sess_123", "u1")).await.unwrap();

        let err = repo.insert_unique(order("sess_123", "u1")).await.unwrap_err();

        assert!(matches!(err, ShopError::DuplicateOrder { ref session_id } if session_id == "sess_123"));
        assert_eq!(repo.len(), 1);
    }

    #[tokio::test]
    async fn test_find_by_user() {
        let repo = InMemoryOrderRepository::new();
        repo.insert_unique(order("s1", "u1")).await.unwrap();
        repo.insert_unique(order("s2", "u2")).await.unwrap();
        repo.insert_unique(order("s3", "u1")).await.unwrap();

        let orders = repo.find_by_user("u1").await.unwrap();
        assert_eq!(orders.len(), 2);
        assert!(orders.iter().all(|o| o.user_id == "u1"));
        assert!(repo.find_by_session_id("s2").await.unwrap().is_some());
        assert!(repo.find_by_session_id("nope").await.unwrap().is_none());
    }
}
