//! Test doubles for the outbound services.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use jwt_compact::{
    alg::{Hs256, Hs256Key},
    prelude::*,
};
use serde_json::json;

use crate::campay::{
    CollectRequest, CollectResponse, PaymentLinkRequest, PaymentLinkResponse, PaymentProvider,
    ProviderError, ProviderTransaction, WithdrawRequest, WithdrawResponse,
};
use crate::rates::{FxSnapshot, RateSource};

/// A provider that answers from memory and counts every call.
#[derive(Default)]
pub struct MockProvider {
    token_calls: AtomicUsize,
    collect_calls: AtomicUsize,
    status_calls: AtomicUsize,
    withdraw_calls: AtomicUsize,
    fail_token: bool,
    statuses: Mutex<HashMap<String, String>>,
}

impl MockProvider {
    pub fn failing_token() -> Self {
        Self {
            fail_token: true,
            ..Self::default()
        }
    }

    /// Status reported for `reference` by `transaction_status`. Defaults to `PENDING`.
    pub fn set_status(&self, reference: &str, status: &str) {
        if let Ok(mut statuses) = self.statuses.lock() {
            statuses.insert(reference.to_string(), status.to_string());
        }
    }

    pub fn token_calls(&self) -> usize {
        self.token_calls.load(Ordering::SeqCst)
    }

    pub fn collect_calls(&self) -> usize {
        self.collect_calls.load(Ordering::SeqCst)
    }

    pub fn status_calls(&self) -> usize {
        self.status_calls.load(Ordering::SeqCst)
    }

    pub fn withdraw_calls(&self) -> usize {
        self.withdraw_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PaymentProvider for MockProvider {
    async fn request_token(&self) -> Result<String, ProviderError> {
        let n = self.token_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_token {
            return Err(ProviderError::Rejected {
                status: 500,
                body: json!({ "detail": "token service down" }),
            });
        }
        // give concurrent callers a chance to pile up on the miss
        tokio::task::yield_now().await;
        Ok(format!("token-{}", n + 1))
    }

    async fn collect(
        &self,
        _token: &str,
        request: &CollectRequest,
    ) -> Result<CollectResponse, ProviderError> {
        self.collect_calls.fetch_add(1, Ordering::SeqCst);
        Ok(CollectResponse {
            reference: format!("campay-{}", request.external_reference),
            ussd_code: Some("*126#".to_string()),
            operator: Some("MTN".to_string()),
        })
    }

    async fn payment_link(
        &self,
        _token: &str,
        request: &PaymentLinkRequest,
    ) -> Result<PaymentLinkResponse, ProviderError> {
        Ok(PaymentLinkResponse {
            link: format!("https://pay.example/{}", request.external_reference),
        })
    }

    async fn withdraw(
        &self,
        _token: &str,
        request: &WithdrawRequest,
    ) -> Result<WithdrawResponse, ProviderError> {
        self.withdraw_calls.fetch_add(1, Ordering::SeqCst);
        Ok(WithdrawResponse {
            reference: Some(format!("campay-{}", request.external_reference)),
            status: Some("PENDING".to_string()),
        })
    }

    async fn transaction_status(
        &self,
        _token: &str,
        reference: &str,
    ) -> Result<ProviderTransaction, ProviderError> {
        self.status_calls.fetch_add(1, Ordering::SeqCst);
        let status = self
            .statuses
            .lock()
            .ok()
            .and_then(|s| s.get(reference).cloned())
            .unwrap_or_else(|| "PENDING".to_string());
        Ok(ProviderTransaction {
            reference: reference.to_string(),
            status,
            amount: None,
            currency: Some("XAF".to_string()),
            operator: Some("MTN".to_string()),
            code: None,
            operator_reference: None,
            external_reference: None,
        })
    }
}

/// An FX source returning a fixed snapshot, or failing.
pub struct MockRateSource {
    calls: AtomicUsize,
    snapshot: Option<FxSnapshot>,
}

impl MockRateSource {
    pub fn returning(snapshot: FxSnapshot) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            snapshot: Some(snapshot),
        }
    }

    pub fn failing() -> Self {
        Self {
            calls: AtomicUsize::new(0),
            snapshot: None,
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RateSource for MockRateSource {
    async fn latest(&self) -> anyhow::Result<FxSnapshot> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.snapshot
            .clone()
            .ok_or_else(|| anyhow::anyhow!("FX service unreachable"))
    }
}

/// An HS256 token under `secret` that expires `ttl_secs` from now (negative for expired).
pub fn sign_hs256(secret: &str, ttl_secs: i64) -> String {
    let key = Hs256Key::new(secret.as_bytes());
    let claims = Claims::new(json!({ "app": "campay" })).set_duration_and_issuance(
        &TimeOptions::default(),
        chrono::Duration::seconds(ttl_secs),
    );
    Hs256
        .token(&Header::empty(), &claims, &key)
        .expect("HS256 signing cannot fail")
}
