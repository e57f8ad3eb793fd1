//! # Stripe Checkout Sessions
//!
//! Implementation of the `PaymentStrategy` seam over Stripe's Coupons and
//! Checkout Sessions APIs.

use crate::config::StripeConfig;
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode, Url};
use rust_decimal::Decimal;
use serde::Deserialize;
use shop_core::{
    Coupon, CouponLookup, CreatedSession, CustomerDetails, PaymentStatus, PaymentStrategy,
    SessionDetails, SessionLine, SessionRequest, ShopError, ShopResult,
};
use std::collections::HashMap;
use tracing::{debug, error, info, instrument};

const PROVIDER: &str = "stripe";

/// Stripe Checkout Session strategy
///
/// Uses Stripe's hosted checkout page; amounts come from Stripe prices.
pub struct StripeCheckoutStrategy {
    config: StripeConfig,
    client: Client,
}

impl StripeCheckoutStrategy {
    /// Create a new Stripe checkout strategy
    pub fn new(config: StripeConfig) -> ShopResult<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| ShopError::Configuration(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { config, client })
    }

    /// Create from environment variables
    pub fn from_env() -> ShopResult<Self> {
        Self::new(StripeConfig::from_env()?)
    }

    pub fn config(&self) -> &StripeConfig {
        &self.config
    }

    /// Build an API URL, percent-encoding each path segment
    fn endpoint(&self, segments: &[&str]) -> ShopResult<Url> {
        let mut url = Url::parse(&self.config.api_base_url)
            .map_err(|e| ShopError::Configuration(format!("Invalid Stripe base URL: {}", e)))?;
        url.path_segments_mut()
            .map_err(|_| ShopError::Configuration("Stripe base URL cannot be a base".to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .header("Authorization", self.config.auth_header())
            .header("Stripe-Version", &self.config.api_version)
    }

    /// Send a request and return status plus body text
    async fn send(&self, request: RequestBuilder) -> ShopResult<(StatusCode, String)> {
        let response = self
            .authorized(request)
            .send()
            .await
            .map_err(|e| ShopError::NetworkError(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ShopError::NetworkError(e.to_string()))?;

        Ok((status, body))
    }

    /// Build form params for session creation
    fn session_form(request: &SessionRequest) -> Vec<(String, String)> {
        let mut form_params: Vec<(String, String)> = vec![
            ("mode".to_string(), "payment".to_string()),
            ("payment_method_types[0]".to_string(), "card".to_string()),
            ("success_url".to_string(), request.success_url.clone()),
            ("cancel_url".to_string(), request.cancel_url.clone()),
        ];

        for (i, item) in request.line_items.iter().enumerate() {
            form_params.push((format!("line_items[{}][price]", i), item.price_id.clone()));
            form_params.push((
                format!("line_items[{}][quantity]", i),
                item.quantity.to_string(),
            ));
        }

        if let Some(ref coupon) = request.coupon_id {
            form_params.push(("discounts[0][coupon]".to_string(), coupon.clone()));
        }

        let mut metadata: Vec<_> = request.metadata.iter().collect();
        metadata.sort();
        for (key, value) in metadata {
            form_params.push((format!("metadata[{}]", key), value.clone()));
        }

        form_params
    }
}

fn provider_error(status: StatusCode, body: &str) -> ShopError {
    error!("Stripe API error: status={}, body={}", status, body);

    if let Ok(error_response) = serde_json::from_str::<StripeErrorResponse>(body) {
        return ShopError::ProviderError {
            provider: PROVIDER.to_string(),
            message: error_response.error.message,
        };
    }

    ShopError::ProviderError {
        provider: PROVIDER.to_string(),
        message: format!("HTTP {}: {}", status, body),
    }
}

fn parse<T: for<'de> Deserialize<'de>>(body: &str) -> ShopResult<T> {
    serde_json::from_str(body)
        .map_err(|e| ShopError::Serialization(format!("Failed to parse Stripe response: {}", e)))
}

#[async_trait]
impl PaymentStrategy for StripeCheckoutStrategy {
    #[instrument(skip(self))]
    async fn retrieve_coupon(&self, code: &str) -> ShopResult<CouponLookup> {
        let url = self.endpoint(&["v1", "coupons", code])?;
        let (status, body) = self.send(self.client.get(url)).await?;

        if status == StatusCode::NOT_FOUND {
            debug!("Stripe has no coupon {}", code);
            return Ok(CouponLookup::NotFound);
        }
        if !status.is_success() {
            return Err(provider_error(status, &body));
        }

        let coupon: StripeCoupon = parse(&body)?;
        Ok(CouponLookup::Found(Coupon {
            id: coupon.id,
            percent_off: coupon.percent_off,
            amount_off: coupon.amount_off,
            currency: coupon.currency,
            valid: coupon.valid,
        }))
    }

    #[instrument(skip(self, request), fields(lines = request.line_items.len()))]
    async fn create_session(&self, request: &SessionRequest) -> ShopResult<CreatedSession> {
        if request.line_items.is_empty() {
            return Err(ShopError::InvalidRequest(
                "Session has no line items".to_string(),
            ));
        }

        let form_params = Self::session_form(request);
        let url = self.endpoint(&["v1", "checkout", "sessions"])?;
        let (status, body) = self
            .send(self.client.post(url).form(&form_params))
            .await?;

        if !status.is_success() {
            return Err(provider_error(status, &body));
        }

        let session: StripeCreatedSession = parse(&body)?;
        let redirect_url = session.url.ok_or_else(|| ShopError::ProviderError {
            provider: PROVIDER.to_string(),
            message: format!("session {} has no redirect url", session.id),
        })?;

        info!("Created Stripe checkout session: id={}", session.id);

        Ok(CreatedSession {
            session_id: session.id,
            redirect_url,
        })
    }

    #[instrument(skip(self))]
    async fn retrieve_session(&self, session_id: &str) -> ShopResult<SessionDetails> {
        let url = self.endpoint(&["v1", "checkout", "sessions", session_id])?;
        let (status, body) = self
            .send(self.client.get(url).query(&[("expand[]", "line_items")]))
            .await?;

        if !status.is_success() {
            return Err(provider_error(status, &body));
        }

        let session: StripeSession = parse(&body)?;
        debug!(
            "Retrieved Stripe session {}: payment_status={}",
            session.id, session.payment_status
        );
        session.into_details()
    }

    fn provider_name(&self) -> &'static str {
        PROVIDER
    }
}

// =============================================================================
// Stripe API Types
// =============================================================================

#[derive(Debug, Deserialize)]
struct StripeCoupon {
    id: String,
    #[serde(default)]
    percent_off: Option<Decimal>,
    #[serde(default)]
    amount_off: Option<i64>,
    #[serde(default)]
    currency: Option<String>,
    #[serde(default = "default_true")]
    valid: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize)]
struct StripeCreatedSession {
    id: String,
    #[serde(default)]
    url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StripeSession {
    id: String,
    payment_status: PaymentStatus,
    #[serde(default)]
    amount_total: Option<i64>,
    #[serde(default)]
    currency: Option<String>,
    #[serde(default)]
    customer_details: Option<StripeCustomerDetails>,
    #[serde(default)]
    payment_method_types: Vec<String>,
    #[serde(default)]
    line_items: Option<StripeList<StripeLineItem>>,
    #[serde(default)]
    metadata: HashMap<String, String>,
}

impl StripeSession {
    /// Every line must carry a price; its id is the product identity on the order
    fn into_details(self) -> ShopResult<SessionDetails> {
        let customer = self
            .customer_details
            .map(|c| CustomerDetails {
                email: c.email,
                name: c.name,
            })
            .unwrap_or_default();

        let line_items = self
            .line_items
            .map(|list| list.data)
            .unwrap_or_default()
            .into_iter()
            .enumerate()
            .map(|(index, item)| {
                let price = item.price.ok_or_else(|| ShopError::ProviderError {
                    provider: PROVIDER.to_string(),
                    message: format!("session {} line item {} has no price", self.id, index),
                })?;
                Ok(SessionLine {
                    price_id: price.id,
                    description: item.description.unwrap_or_default(),
                    quantity: item.quantity.unwrap_or(1),
                })
            })
            .collect::<ShopResult<Vec<_>>>()?;

        Ok(SessionDetails {
            id: self.id,
            payment_status: self.payment_status,
            amount_total: self.amount_total.unwrap_or(0),
            currency: self.currency.unwrap_or_else(|| "usd".to_string()),
            customer,
            payment_method_types: self.payment_method_types,
            line_items,
            metadata: self.metadata,
        })
    }
}

#[derive(Debug, Deserialize)]
struct StripeCustomerDetails {
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StripeList<T> {
    data: Vec<T>,
}

#[derive(Debug, Deserialize)]
struct StripeLineItem {
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    quantity: Option<u32>,
    #[serde(default)]
    price: Option<StripePrice>,
}

#[derive(Debug, Deserialize)]
struct StripePrice {
    id: String,
}

#[derive(Debug, Deserialize)]
struct StripeErrorResponse {
    error: StripeError,
}

#[derive(Debug, Deserialize)]
struct StripeError {
    message: String,
}
