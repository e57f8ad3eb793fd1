//! # Checkout Reconciliation
//!
//! Converts a completed payment session into exactly one order, one set of
//! license keys and one notification. Safe to call any number of times for
//! the same session: the order repository's unique session index is the only
//! idempotency guard.
//!
//! ```text
//!  Unseen ──► Reconciling ──┬──► Completed   (order persisted or replayed)
//!                           ├──► Rejected    (session not paid yet)
//!                           └──► Failed      (error, nothing persisted)
//! ```

use crate::config::CheckoutConfig;
use crate::error::{with_timeout, ShopError, ShopResult};
use crate::license::{BoxedLicenseIssuer, LicenseKey, LicenseRequest};
use crate::money::Currency;
use crate::notify::BoxedNotifier;
use crate::order::{CheckoutReceipt, Order, OrderRepository, PurchasedProduct};
use crate::strategy::{BoxedPaymentStrategy, PaymentStatus, SessionDetails};
use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

/// Terminal outcome of a reconciliation that did not fail
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ReconcileOutcome {
    /// An order exists for the session. `replayed` is true when it was
    /// created by an earlier (or concurrent) call.
    Completed {
        receipt: CheckoutReceipt,
        replayed: bool,
    },
    /// The session has not been paid; nothing was persisted
    PaymentNotCompleted {
        session_id: String,
        payment_status: PaymentStatus,
    },
}

impl ReconcileOutcome {
    pub fn receipt(&self) -> Option<&CheckoutReceipt> {
        match self {
            ReconcileOutcome::Completed { receipt, .. } => Some(receipt),
            ReconcileOutcome::PaymentNotCompleted { .. } => None,
        }
    }
}

/// Drives checkout completion
#[derive(Clone)]
pub struct CheckoutReconciler {
    orders: Arc<dyn OrderRepository>,
    strategy: BoxedPaymentStrategy,
    issuer: BoxedLicenseIssuer,
    notifier: BoxedNotifier,
    config: Arc<CheckoutConfig>,
}

impl CheckoutReconciler {
    pub fn new(
        orders: Arc<dyn OrderRepository>,
        strategy: BoxedPaymentStrategy,
        issuer: BoxedLicenseIssuer,
        notifier: BoxedNotifier,
        config: Arc<CheckoutConfig>,
    ) -> Self {
        Self {
            orders,
            strategy,
            issuer,
            notifier,
            config,
        }
    }

    /// Reconcile a session reference into an order
    #[instrument(skip(self), fields(provider = self.strategy.provider_name()))]
    pub async fn reconcile(&self, session_id: &str) -> ShopResult<ReconcileOutcome> {
        let session_id = session_id.trim();
        if session_id.is_empty() {
            return Err(ShopError::MissingSessionId);
        }

        if let Some(existing) = self.orders.find_by_session_id(session_id).await? {
            info!("Order {} already processed for session", existing.id);
            return Ok(self.completed(&existing, true));
        }

        let session = with_timeout(
            "retrieve_session",
            self.config.external_timeout,
            self.strategy.retrieve_session(session_id),
        )
        .await
        .map_err(|e| {
            error!("Failed to retrieve session: {}", e);
            e
        })?;

        if !session.payment_status.is_paid() {
            info!("Payment not completed: status={}", session.payment_status);
            return Ok(ReconcileOutcome::PaymentNotCompleted {
                session_id: session_id.to_string(),
                payment_status: session.payment_status,
            });
        }

        let user_id = session
            .owner_id()
            .ok_or_else(|| ShopError::ProviderError {
                provider: self.strategy.provider_name().to_string(),
                message: "session metadata has no owner id".to_string(),
            })?
            .to_string();

        let currency = Currency::new(&session.currency);

        let purchased_products: Vec<PurchasedProduct> = session
            .line_items
            .iter()
            .map(|line| PurchasedProduct {
                product_id: line.price_id.clone(),
                product_name: line.description.clone(),
            })
            .collect();

        // all keys or no order
        let license_keys = self.issue_keys(&purchased_products).await?;

        let order = Order {
            id: Uuid::new_v4(),
            user_id,
            checkout_session_id: session_id.to_string(),
            amount: session.amount_total,
            currency,
            status: session.payment_status,
            customer: session.customer.clone(),
            payment_method_types: session.payment_method_types.clone(),
            purchased_products,
            license_keys,
            purchased_at: Utc::now(),
        };

        let order = match self.orders.insert_unique(order).await {
            Ok(order) => order,
            Err(ShopError::DuplicateOrder { .. }) => {
                // lost the race to a concurrent reconciliation
                warn!("Concurrent reconciliation won; replaying stored order");
                let existing = self
                    .orders
                    .find_by_session_id(session_id)
                    .await?
                    .ok_or_else(|| {
                        ShopError::Storage(format!(
                            "duplicate reported but no order stored for {}",
                            session_id
                        ))
                    })?;
                return Ok(self.completed(&existing, true));
            }
            Err(e) => return Err(e),
        };

        info!(
            "Created order {}: {} product(s), amount={}",
            order.id,
            order.purchased_products.len(),
            order.currency.display(order.amount_decimal())
        );

        self.notify(&session, &order).await;

        Ok(self.completed(&order, false))
    }

    /// Issue one key per purchased product, in order; stops at the first failure
    async fn issue_keys(&self, products: &[PurchasedProduct]) -> ShopResult<Vec<LicenseKey>> {
        let mut keys = Vec::with_capacity(products.len());

        for product in products {
            let mask = self.config.key_masks.mask_for(&product.product_name);
            let request = LicenseRequest {
                mask: mask.to_string(),
                expiry_days: self.config.license_expiry_days,
                note: format!("Generated for {}", product.product_name),
            };

            let key = with_timeout(
                "issue_license",
                self.config.external_timeout,
                self.issuer.issue(&request),
            )
            .await
            .map_err(|e| {
                error!(
                    "License issuance via {} failed for {}: {}",
                    self.issuer.issuer_name(),
                    product.product_name,
                    e
                );
                match e {
                    ShopError::LicenseIssuanceFailed { .. } => e,
                    other => ShopError::LicenseIssuanceFailed {
                        product_name: product.product_name.clone(),
                        message: other.to_string(),
                    },
                }
            })?;

            debug!("Issued key for {} with mask {}", product.product_name, mask);
            keys.push(LicenseKey {
                product_name: product.product_name.clone(),
                key,
                mask: mask.to_string(),
            });
        }

        Ok(keys)
    }

    /// Best-effort: failures are logged, never returned
    async fn notify(&self, session: &SessionDetails, order: &Order) {
        let Some(email) = session.customer.email.as_deref() else {
            warn!("No customer email on session; skipping license email");
            return;
        };

        let sent = with_timeout(
            "send_license_email",
            self.config.external_timeout,
            self.notifier.send_license_email(email, &order.license_keys),
        )
        .await;

        if let Err(e) = sent {
            warn!("Failed to send license email for order {}: {}", order.id, e);
        }
    }

    fn completed(&self, order: &Order, replayed: bool) -> ReconcileOutcome {
        ReconcileOutcome::Completed {
            receipt: order.receipt(&self.config.download_base_url),
            replayed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::license::{ADVANCED_MASK, BASIC_MASK, FALLBACK_MASK};
    use crate::order::InMemoryOrderRepository;
    use crate::testing::{paid_session, FakeIssuer, FakeProcessor, RecordingNotifier};
    use std::time::Duration;

    struct Harness {
        reconciler: CheckoutReconciler,
        processor: Arc<FakeProcessor>,
        issuer: Arc<FakeIssuer>,
        notifier: Arc<RecordingNotifier>,
        orders: Arc<InMemoryOrderRepository>,
    }

    fn harness() -> Harness {
        let processor = Arc::new(FakeProcessor::new());
        let issuer = Arc::new(FakeIssuer::new());
        let notifier = Arc::new(RecordingNotifier::new());
        let orders = Arc::new(InMemoryOrderRepository::new());
        let config = Arc::new(
            CheckoutConfig::default()
                .with_download_base_url("http://localhost:3000")
                .with_external_timeout(Duration::from_millis(200)),
        );
        let reconciler = CheckoutReconciler::new(
            orders.clone(),
            processor.clone(),
            issuer.clone(),
            notifier.clone(),
            config,
        );
        Harness {
            reconciler,
            processor,
            issuer,
            notifier,
            orders,
        }
    }

    fn expect_completed(outcome: ReconcileOutcome) -> (CheckoutReceipt, bool) {
        match outcome {
            ReconcileOutcome::Completed { receipt, replayed } => (receipt, replayed),
            other => panic!("expected completed, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_paid_session_creates_order_once() {
        let h = harness();
        h.processor
            .put_session(paid_session("sess_123", &[("price_basic", "Basic Utility")]));

        let (first, replayed) = expect_completed(h.reconciler.reconcile("sess_123").await.unwrap());
        assert!(!replayed);
        assert_eq!(first.license_keys.len(), 1);
        assert_eq!(first.license_keys[0].mask, BASIC_MASK);
        assert_eq!(
            first.download_links[0].link,
            "http://localhost:3000/download/price_basic"
        );

        let (second, replayed) = expect_completed(h.reconciler.reconcile("sess_123").await.unwrap());
        assert!(replayed);
        assert_eq!(second, first);
        assert_eq!(h.orders.len(), 1);
        assert_eq!(h.issuer.issued_count(), 1);
        assert_eq!(h.notifier.sent().len(), 1);
        // replay does not go back to the processor
        assert_eq!(h.processor.retrieve_calls(), 1);
    }

    #[tokio::test]
    async fn test_order_contents() {
        let h = harness();
        h.processor.put_session(paid_session(
            "sess_multi",
            &[
                ("price_basic", "Basic Utility"),
                ("price_premium", "Premium utility"),
                ("price_misc", "Mystery Box"),
            ],
        ));

        h.reconciler.reconcile("sess_multi").await.unwrap();

        let order = h.orders.find_by_session_id("sess_multi").await.unwrap().unwrap();
        assert_eq!(order.user_id, "google-42");
        assert_eq!(order.amount, 4500);
        assert_eq!(order.customer.email.as_deref(), Some("buyer@example.com"));
        assert_eq!(order.payment_method_types, vec!["card".to_string()]);
        let masks: Vec<&str> = order.license_keys.iter().map(|k| k.mask.as_str()).collect();
        assert_eq!(masks, vec![BASIC_MASK, ADVANCED_MASK, FALLBACK_MASK]);
        assert_eq!(h.issuer.requests()[0].expiry_days, 10);
        assert_eq!(h.issuer.requests()[0].note, "Generated for Basic Utility");
    }

    #[tokio::test]
    async fn test_unpaid_session_then_paid() {
        let h = harness();
        let mut session = paid_session("sess_wait", &[("price_basic", "Basic Utility")]);
        session.payment_status = PaymentStatus::Unpaid;
        h.processor.put_session(session.clone());

        let outcome = h.reconciler.reconcile("sess_wait").await.unwrap();
        assert_eq!(
            outcome,
            ReconcileOutcome::PaymentNotCompleted {
                session_id: "sess_wait".into(),
                payment_status: PaymentStatus::Unpaid,
            }
        );
        assert!(h.orders.is_empty());
        assert_eq!(h.issuer.issued_count(), 0);

        session.payment_status = PaymentStatus::Paid;
        h.processor.put_session(session);

        let (receipt, replayed) = expect_completed(h.reconciler.reconcile("sess_wait").await.unwrap());
        assert!(!replayed);
        assert_eq!(receipt.license_keys.len(), 1);
        assert_eq!(h.orders.len(), 1);
    }

    #[tokio::test]
    async fn test_missing_session_id() {
        let h = harness();
        let err = h.reconciler.reconcile("  ").await.unwrap_err();
        assert!(matches!(err, ShopError::MissingSessionId));
        assert_eq!(h.processor.retrieve_calls(), 0);
    }

    #[tokio::test]
    async fn test_retrieval_failure_is_retryable_and_persists_nothing() {
        let h = harness();
        h.processor.fail_retrieval(true);

        let err = h.reconciler.reconcile("sess_down").await.unwrap_err();

        assert!(err.is_retryable());
        assert!(h.orders.is_empty());
    }

    #[tokio::test]
    async fn test_partial_issuance_failure_aborts_then_retry_succeeds() {
        let h = harness();
        h.processor.put_session(paid_session(
            "sess_flaky",
            &[
                ("price_basic", "Basic Utility"),
                ("price_premium", "Premium utility"),
            ],
        ));
        h.issuer.fail_for("Premium utility");

        let err = h.reconciler.reconcile("sess_flaky").await.unwrap_err();
        assert!(matches!(
            err,
            ShopError::LicenseIssuanceFailed { ref product_name, .. } if product_name == "Premium utility"
        ));
        assert!(h.orders.is_empty());
        assert!(h.notifier.sent().is_empty());

        h.issuer.clear_failures();
        let (receipt, _) = expect_completed(h.reconciler.reconcile("sess_flaky").await.unwrap());
        assert_eq!(receipt.license_keys.len(), 2);
        assert_eq!(h.orders.len(), 1);
    }

    #[tokio::test]
    async fn test_notification_failure_keeps_order() {
        let h = harness();
        h.notifier.fail(true);
        h.processor
            .put_session(paid_session("sess_mail", &[("price_basic", "Basic Utility")]));

        let (receipt, _) = expect_completed(h.reconciler.reconcile("sess_mail").await.unwrap());

        assert_eq!(receipt.license_keys.len(), 1);
        assert_eq!(h.orders.len(), 1);
    }

    #[tokio::test]
    async fn test_missing_owner_metadata_fails() {
        let h = harness();
        let mut session = paid_session("sess_anon", &[("price_basic", "Basic Utility")]);
        session.metadata.clear();
        h.processor.put_session(session);

        let err = h.reconciler.reconcile("sess_anon").await.unwrap_err();

        assert!(matches!(err, ShopError::ProviderError { .. }));
        assert!(h.orders.is_empty());
        assert_eq!(h.issuer.issued_count(), 0);
    }

    #[tokio::test]
    async fn test_uncommon_currency_reconciles_once() {
        let h = harness();
        let mut session = paid_session("sess_inr", &[("price_basic", "Basic Utility")]);
        session.currency = "inr".to_string();
        session.amount_total = 49900;
        h.processor.put_session(session);

        let (first, replayed) = expect_completed(h.reconciler.reconcile("sess_inr").await.unwrap());
        assert!(!replayed);

        let order = h.orders.find_by_session_id("sess_inr").await.unwrap().unwrap();
        assert_eq!(order.currency.as_str(), "inr");
        assert_eq!(order.amount_decimal(), rust_decimal::Decimal::new(499, 0));

        let (second, replayed) = expect_completed(h.reconciler.reconcile("sess_inr").await.unwrap());
        assert!(replayed);
        assert_eq!(second, first);
        assert_eq!(h.orders.len(), 1);
        assert_eq!(h.issuer.issued_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_issuer_times_out_then_retry_succeeds() {
        let h = harness();
        h.processor
            .put_session(paid_session("sess_slow", &[("price_basic", "Basic Utility")]));
        h.issuer.delay_issuance(Some(Duration::from_secs(5)));

        let err = h.reconciler.reconcile("sess_slow").await.unwrap_err();

        assert!(matches!(
            err,
            ShopError::LicenseIssuanceFailed { ref product_name, ref message }
                if product_name == "Basic Utility" && message.contains("Timed out")
        ));
        assert!(err.is_retryable());
        assert!(h.orders.is_empty());
        assert_eq!(h.issuer.issued_count(), 0);
        assert!(h.notifier.sent().is_empty());

        h.issuer.delay_issuance(None);
        let (receipt, replayed) = expect_completed(h.reconciler.reconcile("sess_slow").await.unwrap());
        assert!(!replayed);
        assert_eq!(receipt.license_keys.len(), 1);
        assert_eq!(h.orders.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_processor_times_out_without_side_effects() {
        let h = harness();
        h.processor
            .put_session(paid_session("sess_lag", &[("price_basic", "Basic Utility")]));
        h.processor.delay_retrieval(Some(Duration::from_secs(5)));

        let err = h.reconciler.reconcile("sess_lag").await.unwrap_err();

        assert!(matches!(err, ShopError::Timeout { ref operation, .. } if operation == "retrieve_session"));
        assert!(err.is_retryable());
        assert!(h.orders.is_empty());
        assert_eq!(h.issuer.issued_count(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_reconciliation_yields_one_order() {
        let h = harness();
        h.processor
            .put_session(paid_session("sess_race", &[("price_basic", "Basic Utility")]));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let reconciler = h.reconciler.clone();
            handles.push(tokio::spawn(async move {
                reconciler.reconcile("sess_race").await
            }));
        }

        let mut order_ids = Vec::new();
        for handle in handles {
            let (receipt, _) = expect_completed(handle.await.unwrap().unwrap());
            order_ids.push((receipt.order_id, receipt.license_keys));
        }

        assert_eq!(h.orders.len(), 1);
        let stored = h.orders.find_by_session_id("sess_race").await.unwrap().unwrap();
        assert!(order_ids
            .iter()
            .all(|(id, keys)| *id == stored.id && *keys == stored.license_keys));
        assert_eq!(h.notifier.sent().len(), 1);
    }
}
