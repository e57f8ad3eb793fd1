//! Hand-written fakes for the external seams, shared by unit tests.

use crate::error::{ShopError, ShopResult};
use crate::license::{LicenseIssuer, LicenseKey, LicenseRequest};
use crate::notify::Notifier;
use crate::strategy::{
    Coupon, CouponLookup, CreatedSession, CustomerDetails, PaymentStatus, PaymentStrategy,
    SessionDetails, SessionLine, SessionRequest, OWNER_ID_METADATA_KEY,
};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// A paid session for owner `google-42` with the given (price id, description) lines
pub fn paid_session(id: &str, lines: &[(&str, &str)]) -> SessionDetails {
    SessionDetails {
        id: id.to_string(),
        payment_status: PaymentStatus::Paid,
        amount_total: 4500,
        currency: "usd".to_string(),
        customer: CustomerDetails {
            email: Some("buyer@example.com".to_string()),
            name: Some("Buyer".to_string()),
        },
        payment_method_types: vec!["card".to_string()],
        line_items: lines
            .iter()
            .map(|(price_id, description)| SessionLine {
                price_id: price_id.to_string(),
                description: description.to_string(),
                quantity: 1,
            })
            .collect(),
        metadata: HashMap::from([(OWNER_ID_METADATA_KEY.to_string(), "google-42".to_string())]),
    }
}

#[derive(Default)]
pub struct FakeProcessor {
    coupons: HashMap<String, Coupon>,
    sessions: Mutex<HashMap<String, SessionDetails>>,
    created: Mutex<Vec<SessionRequest>>,
    retrieve_calls: AtomicUsize,
    fail_coupons: AtomicBool,
    fail_create: AtomicBool,
    fail_retrieve: AtomicBool,
    retrieve_delay: Mutex<Option<Duration>>,
}

impl FakeProcessor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_coupon(mut self, coupon: Coupon) -> Self {
        self.coupons.insert(coupon.id.clone(), coupon);
        self
    }

    pub fn put_session(&self, session: SessionDetails) {
        self.sessions
            .lock()
            .unwrap()
            .insert(session.id.clone(), session);
    }

    pub fn created_sessions(&self) -> Vec<SessionRequest> {
        self.created.lock().unwrap().clone()
    }

    pub fn retrieve_calls(&self) -> usize {
        self.retrieve_calls.load(Ordering::SeqCst)
    }

    pub fn fail_coupons(&self, fail: bool) {
        self.fail_coupons.store(fail, Ordering::SeqCst);
    }

    pub fn fail_session_creation(&self, fail: bool) {
        self.fail_create.store(fail, Ordering::SeqCst);
    }

    pub fn fail_retrieval(&self, fail: bool) {
        self.fail_retrieve.store(fail, Ordering::SeqCst);
    }

    /// Hold every session retrieval for `delay`; `None` answers at once
    pub fn delay_retrieval(&self, delay: Option<Duration>) {
        *self.retrieve_delay.lock().unwrap() = delay;
    }
}

#[async_trait]
impl PaymentStrategy for FakeProcessor {
    async fn retrieve_coupon(&self, code: &str) -> ShopResult<CouponLookup> {
        if self.fail_coupons.load(Ordering::SeqCst) {
            return Err(ShopError::NetworkError("coupon registry unreachable".into()));
        }
        Ok(match self.coupons.get(code) {
            Some(coupon) => CouponLookup::Found(coupon.clone()),
            None => CouponLookup::NotFound,
        })
    }

    async fn create_session(&self, request: &SessionRequest) -> ShopResult<CreatedSession> {
        if self.fail_create.load(Ordering::SeqCst) {
            return Err(ShopError::ProviderError {
                provider: "fake".into(),
                message: "session creation refused".into(),
            });
        }
        let mut created = self.created.lock().unwrap();
        created.push(request.clone());
        let session_id = format!("sess_fake_{}", created.len());
        Ok(CreatedSession {
            redirect_url: format!("https://pay.example.com/c/{}", session_id),
            session_id,
        })
    }

    async fn retrieve_session(&self, session_id: &str) -> ShopResult<SessionDetails> {
        self.retrieve_calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.retrieve_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_retrieve.load(Ordering::SeqCst) {
            return Err(ShopError::NetworkError("processor unreachable".into()));
        }
        self.sessions
            .lock()
            .unwrap()
            .get(session_id)
            .cloned()
            .ok_or_else(|| ShopError::ProviderError {
                provider: "fake".into(),
                message: format!("No such checkout.session: {}", session_id),
            })
    }

    fn provider_name(&self) -> &'static str {
        "fake"
    }
}

#[derive(Default)]
pub struct FakeIssuer {
    requests: Mutex<Vec<LicenseRequest>>,
    failing: Mutex<HashSet<String>>,
    delay: Mutex<Option<Duration>>,
}

impl FakeIssuer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail requests whose note names this product
    pub fn fail_for(&self, product_name: &str) {
        self.failing
            .lock()
            .unwrap()
            .insert(format!("Generated for {}", product_name));
    }

    pub fn clear_failures(&self) {
        self.failing.lock().unwrap().clear();
    }

    /// Hold every issuance for `delay`; `None` answers at once
    pub fn delay_issuance(&self, delay: Option<Duration>) {
        *self.delay.lock().unwrap() = delay;
    }

    pub fn requests(&self) -> Vec<LicenseRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn issued_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl LicenseIssuer for FakeIssuer {
    async fn issue(&self, request: &LicenseRequest) -> ShopResult<String> {
        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.failing.lock().unwrap().contains(&request.note) {
            return Err(ShopError::NetworkError("issuer unreachable".into()));
        }
        let mut requests = self.requests.lock().unwrap();
        requests.push(request.clone());
        let prefix = request.mask.split('-').next().unwrap_or("KEY");
        Ok(format!("{}-{:04}", prefix, requests.len()))
    }

    fn issuer_name(&self) -> &'static str {
        "fake"
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<(String, Vec<LicenseKey>)>>,
    fail: AtomicBool,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn sent(&self) -> Vec<(String, Vec<LicenseKey>)> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send_license_email(&self, to_address: &str, keys: &[LicenseKey]) -> ShopResult<()> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(ShopError::NetworkError("smtp relay down".into()));
        }
        self.sent
            .lock()
            .unwrap()
            .push((to_address.to_string(), keys.to_vec()));
        Ok(())
    }
}
