//! # Storage
//!
//! SQLite-backed order and cart repositories. Orders are keyed by checkout
//! session id with a primary-key constraint, so a session maps to one order
//! across restarts and across concurrent reconcilers.
//!
//! Records are stored as JSON bodies next to the columns used for lookup.

use async_trait::async_trait;
use chrono::SecondsFormat;
use shop_core::{Cart, CartMutation, CartRepository, Order, OrderRepository, ShopError, ShopResult};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use std::str::FromStr;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info};

const CREATE_ORDERS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS orders (
    checkout_session_id TEXT PRIMARY KEY NOT NULL,
    order_id TEXT NOT NULL,
    user_id TEXT NOT NULL,
    purchased_at TEXT NOT NULL,
    body TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_orders_user ON orders (user_id, purchased_at);
"#;

const CREATE_CARTS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS carts (
    owner_id TEXT PRIMARY KEY NOT NULL,
    body TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
"#;

fn storage_error(e: sqlx::Error) -> ShopError {
    ShopError::Storage(e.to_string())
}

fn encode<T: serde::Serialize>(value: &T) -> ShopResult<String> {
    serde_json::to_string(value).map_err(|e| ShopError::Storage(e.to_string()))
}

fn decode<T: serde::de::DeserializeOwned>(body: &str) -> ShopResult<T> {
    serde_json::from_str(body).map_err(|e| ShopError::Storage(format!("corrupt record: {}", e)))
}

/// Open (creating if missing) the database at `database_url` and ensure the schema
pub async fn connect(database_url: &str) -> anyhow::Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str(database_url)?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(Duration::from_secs(5));

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;

    init_schema(&pool).await?;
    info!("Opened order and cart storage at {}", database_url);
    Ok(pool)
}

/// Create the orders and carts tables if they do not exist
pub async fn init_schema(pool: &SqlitePool) -> ShopResult<()> {
    sqlx::raw_sql(CREATE_ORDERS_TABLE)
        .execute(pool)
        .await
        .map_err(storage_error)?;
    sqlx::raw_sql(CREATE_CARTS_TABLE)
        .execute(pool)
        .await
        .map_err(storage_error)?;
    Ok(())
}

/// Orders persisted in SQLite
#[derive(Debug, Clone)]
pub struct SqliteOrderRepository {
    pool: SqlitePool,
}

impl SqliteOrderRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl OrderRepository for SqliteOrderRepository {
    async fn find_by_session_id(&self, session_id: &str) -> ShopResult<Option<Order>> {
        let row = sqlx::query("SELECT body FROM orders WHERE checkout_session_id = ?")
            .bind(session_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage_error)?;

        match row {
            Some(row) => {
                let body: String = row.try_get("body").map_err(storage_error)?;
                Ok(Some(decode(&body)?))
            }
            None => Ok(None),
        }
    }

    async fn insert_unique(&self, order: Order) -> ShopResult<Order> {
        let body = encode(&order)?;
        // fixed-width UTC timestamps sort lexically
        let purchased_at = order
            .purchased_at
            .to_rfc3339_opts(SecondsFormat::Micros, true);

        let inserted = sqlx::query(
            "INSERT INTO orders (checkout_session_id, order_id, user_id, purchased_at, body) \
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&order.checkout_session_id)
        .bind(order.id.to_string())
        .bind(&order.user_id)
        .bind(purchased_at)
        .bind(body)
        .execute(&self.pool)
        .await;

        match inserted {
            Ok(_) => {
                debug!("Stored order {} for session {}", order.id, order.checkout_session_id);
                Ok(order)
            }
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                Err(ShopError::DuplicateOrder {
                    session_id: order.checkout_session_id,
                })
            }
            Err(e) => Err(storage_error(e)),
        }
    }

    async fn find_by_user(&self, user_id: &str) -> ShopResult<Vec<Order>> {
        let rows = sqlx::query(
            "SELECT body FROM orders WHERE user_id = ? ORDER BY purchased_at, order_id",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(storage_error)?;

        rows.iter()
            .map(|row| {
                let body: String = row.try_get("body").map_err(storage_error)?;
                decode(&body)
            })
            .collect()
    }
}

/// Carts persisted in SQLite
#[derive(Debug)]
pub struct SqliteCartRepository {
    pool: SqlitePool,
    // SQLite has a single writer; deferred transactions racing to upgrade
    // their lock would otherwise fail with SQLITE_BUSY
    write_lock: Mutex<()>,
}

impl SqliteCartRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            write_lock: Mutex::new(()),
        }
    }
}

#[async_trait]
impl CartRepository for SqliteCartRepository {
    async fn load(&self, owner_id: &str) -> ShopResult<Option<Cart>> {
        let row = sqlx::query("SELECT body FROM carts WHERE owner_id = ?")
            .bind(owner_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage_error)?;

        match row {
            Some(row) => {
                let body: String = row.try_get("body").map_err(storage_error)?;
                Ok(Some(decode(&body)?))
            }
            None => Ok(None),
        }
    }

    async fn apply(&self, owner_id: &str, mutation: CartMutation) -> ShopResult<Option<Cart>> {
        let _guard = self.write_lock.lock().await;
        let mut tx = self.pool.begin().await.map_err(storage_error)?;

        let row = sqlx::query("SELECT body FROM carts WHERE owner_id = ?")
            .bind(owner_id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(storage_error)?;

        let mut cart = match row {
            Some(row) => {
                let body: String = row.try_get("body").map_err(storage_error)?;
                decode::<Cart>(&body)?
            }
            None if mutation.creates_cart() => Cart::new(owner_id),
            None => return Ok(None),
        };

        cart.apply(&mutation);

        sqlx::query(
            "INSERT INTO carts (owner_id, body, updated_at) VALUES (?, ?, ?) \
             ON CONFLICT (owner_id) DO UPDATE SET body = excluded.body, updated_at = excluded.updated_at",
        )
        .bind(owner_id)
        .bind(encode(&cart)?)
        .bind(chrono::Utc::now().to_rfc3339())
        .execute(&mut *tx)
        .await
        .map_err(storage_error)?;

        tx.commit().await.map_err(storage_error)?;
        Ok(Some(cart))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration as ChronoDuration, Utc};
    use rust_decimal_macros::dec;
    use shop_core::{
        CartItem, CartStore, Currency, CustomerDetails, LicenseKey, PaymentStatus, PurchasedProduct,
    };
    use std::sync::Arc;
    use uuid::Uuid;

    async fn memory_pool() -> SqlitePool {
        let options = SqliteConnectOptions::new()
            .filename(":memory:")
            .create_if_missing(true);
        // one connection, or each would see its own empty database
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .expect("failed to create in-memory pool");
        init_schema(&pool).await.expect("failed to init schema");
        pool
    }

    fn order(session_id: &str, user_id: &str) -> Order {
        Order {
            id: Uuid::new_v4(),
            user_id: user_id.to_string(),
            checkout_session_id: session_id.to_string(),
            amount: 49900,
            currency: Currency::new("inr"),
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
                mask: "BASIC-****-*****-****-****".into(),
            }],
            purchased_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_order_round_trip_and_duplicate_rejected() {
        let repo = SqliteOrderRepository::new(memory_pool().await);
        let first = order("sess_1", "google-42");

        repo.insert_unique(first.clone()).await.unwrap();
        let stored = repo.find_by_session_id("sess_1").await.unwrap().unwrap();
        assert_eq!(stored, first);
        assert_eq!(stored.currency.as_str(), "inr");

        let err = repo
            .insert_unique(order("sess_1", "google-42"))
            .await
            .unwrap_err();
        assert!(matches!(err, ShopError::DuplicateOrder { ref session_id } if session_id == "sess_1"));

        // the first order wins
        let stored = repo.find_by_session_id("sess_1").await.unwrap().unwrap();
        assert_eq!(stored.id, first.id);
        assert!(repo.find_by_session_id("sess_none").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_find_by_user_oldest_first() {
        let repo = SqliteOrderRepository::new(memory_pool().await);
        let now = Utc::now();

        let mut newer = order("sess_b", "google-42");
        newer.purchased_at = now;
        let mut older = order("sess_a", "google-42");
        older.purchased_at = now - ChronoDuration::minutes(5);

        repo.insert_unique(newer.clone()).await.unwrap();
        repo.insert_unique(older.clone()).await.unwrap();
        repo.insert_unique(order("sess_c", "github-7")).await.unwrap();

        let orders = repo.find_by_user("google-42").await.unwrap();
        let sessions: Vec<&str> = orders.iter().map(|o| o.checkout_session_id.as_str()).collect();
        assert_eq!(sessions, vec!["sess_a", "sess_b"]);
        assert!(repo.find_by_user("nobody").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_orders_survive_reopening_the_database() {
        let path = std::env::temp_dir().join(format!("licensed-cart-{}.db", Uuid::new_v4()));
        let url = format!("sqlite://{}", path.display());

        let pool = connect(&url).await.unwrap();
        SqliteOrderRepository::new(pool.clone())
            .insert_unique(order("sess_keep", "google-42"))
            .await
            .unwrap();
        SqliteCartRepository::new(pool.clone())
            .apply("google-42", CartMutation::Add(CartItem::new("Basic Utility", "price_basic", dec!(10))))
            .await
            .unwrap();
        pool.close().await;

        let pool = connect(&url).await.unwrap();
        let orders = SqliteOrderRepository::new(pool.clone());
        assert!(orders.find_by_session_id("sess_keep").await.unwrap().is_some());
        let err = orders
            .insert_unique(order("sess_keep", "google-42"))
            .await
            .unwrap_err();
        assert!(matches!(err, ShopError::DuplicateOrder { .. }));

        let cart = SqliteCartRepository::new(pool.clone())
            .load("google-42")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(cart.items.len(), 1);
        pool.close().await;

        for suffix in ["", "-wal", "-shm"] {
            let _ = std::fs::remove_file(format!("{}{}", path.display(), suffix));
        }
    }

    #[tokio::test]
    async fn test_cart_mutations_persist() {
        let store = CartStore::new(Arc::new(SqliteCartRepository::new(memory_pool().await)));

        store.add("google-42", "Basic Utility", "price_basic", dec!(10)).await.unwrap();
        store.add("google-42", "Basic Utility", "price_basic", dec!(99)).await.unwrap();
        store.add("google-42", "Premium utility", "price_premium", dec!(25)).await.unwrap();
        store.decrease("google-42", "Premium utility").await.unwrap();

        let cart = store.read("google-42").await.unwrap();
        assert_eq!(cart.items.len(), 1);
        assert_eq!(cart.items[0].quantity, 2);
        assert_eq!(cart.items[0].unit_price, dec!(10));

        let cleared = store.clear("google-42").await.unwrap();
        assert!(cleared.is_empty());
        assert!(store.read("google-42").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_non_creating_mutation_on_missing_cart_writes_nothing() {
        let repo = SqliteCartRepository::new(memory_pool().await);

        let result = repo
            .apply(
                "ghost",
                CartMutation::Increase {
                    product_name: "Basic Utility".into(),
                },
            )
            .await
            .unwrap();

        assert!(result.is_none());
        assert!(repo.load("ghost").await.unwrap().is_none());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_adds_are_not_lost() {
        let store = CartStore::new(Arc::new(SqliteCartRepository::new(memory_pool().await)));

        let mut handles = Vec::new();
        for _ in 0..20 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store.add("google-42", "Basic Utility", "price_basic", dec!(10)).await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let cart = store.read("google-42").await.unwrap();
        assert_eq!(cart.items[0].quantity, 20);
    }
}
