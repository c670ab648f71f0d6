//! Client side of the payment status poll.

use std::future::Future;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use common::payments::PaymentStatus;
use serde::Serialize;

#[async_trait]
pub trait StatusSource: Send + Sync {
    async fn fetch(&self, reference: &str, transaction_id: &str) -> anyhow::Result<PaymentStatus>;
}

#[derive(Debug, PartialEq)]
pub enum PollOutcome {
    Settled(PaymentStatus),
    Cancelled,
}

/// Asks `source` for the status every `interval` until it is terminal or
/// `cancel` resolves. A request in flight when `cancel` fires is dropped.
/// Failed polls are logged and retried on the next tick.
pub async fn poll_until_terminal<S, F>(
    source: &S,
    reference: &str,
    transaction_id: &str,
    interval: Duration,
    cancel: F,
) -> PollOutcome
where
    S: StatusSource + ?Sized,
    F: Future<Output = ()>,
{
    tokio::pin!(cancel);
    let mut ticker = tokio::time::interval(interval);

    loop {
        tokio::select! {
            _ = &mut cancel => break,
            _ = ticker.tick() => {}
        }

        tokio::select! {
            _ = &mut cancel => break,
            result = source.fetch(reference, transaction_id) => match result {
                Ok(status) if status.status.is_terminal() => {
                    log::info!("Payment {} settled as {}", reference, status.status);
                    return PollOutcome::Settled(status);
                }
                Ok(status) => log::debug!("Payment {} still {}", reference, status.status),
                Err(e) => log::warn!("Status poll for {} failed: {:#}", reference, e),
            }
        }
    }

    log::info!("Stopped polling {}", reference);
    PollOutcome::Cancelled
}

#[derive(Serialize)]
struct LoginBody<'a> {
    email: &'a str,
    password: &'a str,
}

/// Polls a running server over HTTP with the session cookies from a login.
pub struct HttpStatusSource {
    client: reqwest::Client,
    base_url: String,
}

impl HttpStatusSource {
    pub async fn login(base_url: &str, email: &str, password: &str) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .cookie_store(true)
            .build()
            .context("Failed to build HTTP client")?;
        let base_url = base_url.trim_end_matches('/').to_string();

        client
            .post(format!("{}/api/auth/login", base_url))
            .json(&LoginBody { email, password })
            .send()
            .await
            .context("Failed to reach server")?
            .error_for_status()
            .context("Login rejected")?;

        Ok(Self { client, base_url })
    }
}

#[async_trait]
impl StatusSource for HttpStatusSource {
    async fn fetch(&self, reference: &str, transaction_id: &str) -> anyhow::Result<PaymentStatus> {
        self.client
            .get(format!("{}/api/payments/status/{}", self.base_url, reference))
            .query(&[("transactionId", transaction_id)])
            .send()
            .await
            .context("Failed to reach server")?
            .error_for_status()
            .context("Status request rejected")?
            .json()
            .await
            .context("Failed to parse status response")
    }
}
