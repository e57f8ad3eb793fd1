//! # Cart Store
//!
//! Per-owner shopping cart. Mutations are described as [`CartMutation`]
//! values and applied by the [`CartRepository`] atomically per owner, so the
//! one-line-per-product rule holds when requests for the same owner race.

use crate::error::{ShopError, ShopResult};
use async_trait::async_trait;
use dashmap::DashMap;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, instrument};

/// A line in a cart
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartItem {
    /// Display name; unique within a cart
    pub product_name: String,

    /// External price identifier (processor price id)
    pub price_id: String,

    /// Unit price in major units
    pub unit_price: Decimal,

    /// Always >= 1
    pub quantity: u32,
}

impl CartItem {
    /// Create a new line with quantity 1
    pub fn new(
        product_name: impl Into<String>,
        price_id: impl Into<String>,
        unit_price: Decimal,
    ) -> Self {
        Self {
            product_name: product_name.into(),
            price_id: price_id.into(),
            unit_price,
            quantity: 1,
        }
    }

    /// Builder: set quantity
    pub fn with_quantity(mut self, quantity: u32) -> Self {
        self.quantity = quantity;
        self
    }

    /// unit_price × quantity
    pub fn total(&self) -> Decimal {
        self.unit_price * Decimal::from(self.quantity)
    }
}

/// A user's cart
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cart {
    /// Opaque owner identity
    pub owner_id: String,

    /// Lines in insertion order
    pub items: Vec<CartItem>,
}

impl Cart {
    /// Create an empty cart
    pub fn new(owner_id: impl Into<String>) -> Self {
        Self {
            owner_id: owner_id.into(),
            items: Vec::new(),
        }
    }

    /// Check if cart is empty
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Total number of units across all lines
    pub fn item_count(&self) -> u32 {
        self.items.iter().map(|i| i.quantity).sum()
    }

    /// Find a line by product name
    pub fn line(&self, product_name: &str) -> Option<&CartItem> {
        self.items.iter().find(|i| i.product_name == product_name)
    }

    /// Apply a mutation in place
    pub fn apply(&mut self, mutation: &CartMutation) {
        match mutation {
            CartMutation::Add(item) => {
                match self
                    .items
                    .iter_mut()
                    .find(|i| i.product_name == item.product_name)
                {
                    // stored price wins over the one passed in
                    Some(existing) => existing.quantity += 1,
                    None => self.items.push(CartItem {
                        quantity: 1,
                        ..item.clone()
                    }),
                }
            }
            CartMutation::Increase { product_name } => {
                if let Some(existing) = self
                    .items
                    .iter_mut()
                    .find(|i| &i.product_name == product_name)
                {
                    existing.quantity += 1;
                }
            }
            CartMutation::Decrease { product_name } => {
                if let Some(index) = self
                    .items
                    .iter()
                    .position(|i| &i.product_name == product_name)
                {
                    if self.items[index].quantity > 1 {
                        self.items[index].quantity -= 1;
                    } else {
                        self.items.remove(index);
                    }
                }
            }
            CartMutation::Clear => self.items.clear(),
        }
    }
}

/// A change to a cart
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CartMutation {
    /// Add one unit, appending a line if the product is new
    Add(CartItem),
    /// Add one unit to an existing line
    Increase { product_name: String },
    /// Remove one unit, dropping the line at zero
    Decrease { product_name: String },
    /// Empty the cart, keeping the record
    Clear,
}

impl CartMutation {
    /// Only `Add` brings a cart into existence
    pub fn creates_cart(&self) -> bool {
        matches!(self, CartMutation::Add(_))
    }
}

/// Storage for carts, keyed by owner identity.
///
/// `apply` must be atomic with respect to other `apply` calls for the same
/// owner.
#[async_trait]
pub trait CartRepository: Send + Sync {
    /// Load the cart for an owner
    async fn load(&self, owner_id: &str) -> ShopResult<Option<Cart>>;

    /// Atomically apply a mutation and return the persisted result.
    ///
    /// Returns `None` if the cart does not exist and the mutation does not
    /// create one.
    async fn apply(&self, owner_id: &str, mutation: CartMutation) -> ShopResult<Option<Cart>>;
}

/// In-process cart storage
#[derive(Debug, Default)]
pub struct InMemoryCartRepository {
    carts: DashMap<String, Cart>,
}

impl InMemoryCartRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CartRepository for InMemoryCartRepository {
    async fn load(&self, owner_id: &str) -> ShopResult<Option<Cart>> {
        Ok(self.carts.get(owner_id).map(|c| c.value().clone()))
    }

    async fn apply(&self, owner_id: &str, mutation: CartMutation) -> ShopResult<Option<Cart>> {
        // the entry guard holds the shard lock for the whole read-modify-write
        if mutation.creates_cart() {
            let mut cart = self
                .carts
                .entry(owner_id.to_string())
                .or_insert_with(|| Cart::new(owner_id));
            cart.apply(&mutation);
            return Ok(Some(cart.clone()));
        }

        Ok(self.carts.get_mut(owner_id).map(|mut cart| {
            cart.apply(&mutation);
            cart.clone()
        }))
    }
}

/// Cart operations scoped to an owner
#[derive(Clone)]
pub struct CartStore {
    repository: Arc<dyn CartRepository>,
}

impl CartStore {
    pub fn new(repository: Arc<dyn CartRepository>) -> Self {
        Self { repository }
    }

    /// Add one unit of a product
    #[instrument(skip(self, unit_price))]
    pub async fn add(
        &self,
        owner_id: &str,
        product_name: &str,
        price_id: &str,
        unit_price: Decimal,
    ) -> ShopResult<Cart> {
        if product_name.trim().is_empty() {
            return Err(ShopError::InvalidRequest(
                "productName is required".to_string(),
            ));
        }
        if unit_price.is_sign_negative() {
            return Err(ShopError::InvalidRequest(format!(
                "price must not be negative: {}",
                unit_price
            )));
        }

        let item = CartItem::new(product_name, price_id, unit_price);
        let cart = self
            .repository
            .apply(owner_id, CartMutation::Add(item))
            .await?
            .ok_or_else(|| ShopError::Storage("cart was not created on add".to_string()))?;

        debug!("Cart now holds {} units", cart.item_count());
        Ok(cart)
    }

    /// Add one unit to an existing line; no-op if absent
    #[instrument(skip(self))]
    pub async fn increase(&self, owner_id: &str, product_name: &str) -> ShopResult<Cart> {
        self.mutate(
            owner_id,
            CartMutation::Increase {
                product_name: product_name.to_string(),
            },
        )
        .await
    }

    /// Remove one unit, dropping the line at zero; no-op if absent
    #[instrument(skip(self))]
    pub async fn decrease(&self, owner_id: &str, product_name: &str) -> ShopResult<Cart> {
        self.mutate(
            owner_id,
            CartMutation::Decrease {
                product_name: product_name.to_string(),
            },
        )
        .await
    }

    /// Empty the cart
    #[instrument(skip(self))]
    pub async fn clear(&self, owner_id: &str) -> ShopResult<Cart> {
        self.mutate(owner_id, CartMutation::Clear).await
    }

    /// Current snapshot; a missing cart reads as empty
    pub async fn read(&self, owner_id: &str) -> ShopResult<Cart> {
        Ok(self
            .repository
            .load(owner_id)
            .await?
            .unwrap_or_else(|| Cart::new(owner_id)))
    }

    async fn mutate(&self, owner_id: &str, mutation: CartMutation) -> ShopResult<Cart> {
        Ok(self
            .repository
            .apply(owner_id, mutation)
            .await?
            .unwrap_or_else(|| Cart::new(owner_id)))
    }
}
