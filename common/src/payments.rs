//! Payment initiation and settlement against the provider.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::campay::{
    CollectRequest, CollectResponse, PaymentLinkRequest, PaymentProvider, ProviderError,
    WithdrawRequest, WithdrawResponse,
};
use crate::db::{Database, Settlement};
use crate::helpers::{format_amount, generate_payment_reference, is_phone_number};
use crate::schema::{Transaction, TransactionKind, TransactionStatus};
use crate::token_cache::TokenCache;

pub const COLLECT_CURRENCY: &str = "XAF";

#[derive(Debug, Error)]
pub enum PaymentError {
    #[error("{0}")]
    Invalid(String),
    #[error("Transaction not found")]
    NotFound,
    #[error("Transaction is no longer pending")]
    AlreadyFinal,
    #[error("Insufficient balance")]
    InsufficientBalance,
    #[error(transparent)]
    Provider(#[from] ProviderError),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl PaymentError {
    pub fn status(&self) -> u16 {
        match self {
            PaymentError::Invalid(_) | PaymentError::InsufficientBalance => 400,
            PaymentError::NotFound => 404,
            PaymentError::AlreadyFinal => 409,
            PaymentError::Provider(e) => e.status(),
            PaymentError::Internal(_) => 500,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CollectInput {
    pub amount: f64,
    pub phone: String,
    pub description: String,
}

#[derive(Debug, Clone, Default)]
pub struct PaymentLinkInput {
    pub amount: Option<f64>,
    pub currency: Option<String>,
    pub description: Option<String>,
    pub redirect_url: Option<String>,
}

#[derive(Debug, Clone)]
pub struct WithdrawInput {
    pub amount: f64,
    pub to: String,
    pub description: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct CollectOutcome {
    pub transaction: Transaction,
    pub provider: CollectResponse,
}

#[derive(Debug, Clone, Serialize)]
pub struct WithdrawOutcome {
    pub transaction: Transaction,
    pub provider: WithdrawResponse,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentStatus {
    pub transaction_id: String,
    pub reference: String,
    pub status: TransactionStatus,
    /// Raw status string from the provider; absent when answered from the database.
    pub provider_status: Option<String>,
}

pub struct PaymentService {
    db: Database,
    provider: Arc<dyn PaymentProvider>,
    tokens: TokenCache,
}

impl PaymentService {
    pub fn new(db: Database, provider: Arc<dyn PaymentProvider>, tokens: TokenCache) -> Self {
        Self {
            db,
            provider,
            tokens,
        }
    }

    pub fn tokens(&self) -> &TokenCache {
        &self.tokens
    }

    /// Starts a mobile-money collection and records it as a pending deposit.
    pub async fn collect(
        &self,
        user_id: &str,
        input: CollectInput,
    ) -> Result<CollectOutcome, PaymentError> {
        require_positive(input.amount)?;
        if !is_phone_number(&input.phone) {
            return Err(PaymentError::Invalid("Invalid phone number.".to_string()));
        }
        let description = require_description(&input.description)?;

        let request = CollectRequest {
            amount: format_amount(input.amount),
            from: input.phone.trim().to_string(),
            description: description.clone(),
            currency: COLLECT_CURRENCY.to_string(),
            external_reference: generate_payment_reference(),
        };

        let token = self.tokens.get_token().await?;
        let response = self
            .guard_token(self.provider.collect(&token, &request).await)
            .await?;
        log::info!(
            "Collection {} started for user {}",
            response.reference,
            user_id
        );

        let transaction = Transaction::new(
            TransactionKind::Deposit,
            input.amount,
            COLLECT_CURRENCY,
            request.external_reference,
            &description,
            user_id,
        )
        .with_provider_reference(Some(response.reference.clone()));
        self.record(&transaction).await?;

        Ok(CollectOutcome {
            transaction,
            provider: response,
        })
    }

    /// Requests a hosted payment link and records a pending deposit.
    pub async fn payment_link(
        &self,
        user_id: &str,
        input: PaymentLinkInput,
    ) -> Result<(String, Transaction), PaymentError> {
        if let Some(amount) = input.amount {
            require_positive(amount)?;
        }

        let request = PaymentLinkRequest {
            amount: input.amount.map(format_amount),
            currency: input
                .currency
                .filter(|c| !c.trim().is_empty())
                .unwrap_or_else(|| COLLECT_CURRENCY.to_string()),
            description: input
                .description
                .filter(|d| !d.trim().is_empty())
                .unwrap_or_else(|| "Test".to_string()),
            external_reference: generate_payment_reference(),
            redirect_url: input
                .redirect_url
                .filter(|u| !u.trim().is_empty())
                .unwrap_or_else(|| "https://example.com".to_string()),
        };

        let token = self.tokens.get_token().await?;
        let response = self
            .guard_token(self.provider.payment_link(&token, &request).await)
            .await?;

        let transaction = Transaction::new(
            TransactionKind::Deposit,
            input.amount.unwrap_or(0.0),
            &request.currency,
            request.external_reference,
            &request.description,
            user_id,
        );
        self.record(&transaction).await?;

        Ok((response.link, transaction))
    }

    /// Sends money to a mobile wallet and records a pending withdrawal.
    /// The balance is debited when the withdrawal settles.
    pub async fn withdraw(
        &self,
        user_id: &str,
        input: WithdrawInput,
    ) -> Result<WithdrawOutcome, PaymentError> {
        require_positive(input.amount)?;
        if !is_phone_number(&input.to) {
            return Err(PaymentError::Invalid("Invalid phone number".to_string()));
        }
        let description = require_description(&input.description)?;
        let amount = input.amount.round();
        if amount < 1.0 {
            return Err(PaymentError::Invalid("Invalid amount".to_string()));
        }

        let balance = self
            .db
            .get_subscription(user_id)
            .await?
            .map(|s| s.balance)
            .unwrap_or(0.0);
        if balance < amount {
            return Err(PaymentError::InsufficientBalance);
        }

        let request = WithdrawRequest {
            amount: amount as u64,
            to: input.to.trim().to_string(),
            description: description.clone(),
            external_reference: generate_payment_reference(),
        };

        let token = self.tokens.get_token().await?;
        let response = self
            .guard_token(self.provider.withdraw(&token, &request).await)
            .await?;

        let transaction = Transaction::new(
            TransactionKind::Withdraw,
            amount,
            COLLECT_CURRENCY,
            request.external_reference,
            &description,
            user_id,
        )
        .with_provider_reference(response.reference.clone());
        self.record(&transaction).await?;

        Ok(WithdrawOutcome {
            transaction,
            provider: response,
        })
    }

    /// Server side of the status poll.
    ///
    /// Terminal rows are answered from the database. Otherwise the provider is
    /// asked and a terminal answer is applied through the guarded settlement,
    /// so the balance moves once no matter how many polls observe it.
    pub async fn check_status(
        &self,
        user_id: &str,
        transaction_id: &str,
        reference: &str,
    ) -> Result<PaymentStatus, PaymentError> {
        let transaction = self
            .db
            .get_user_transaction(transaction_id, user_id)
            .await?
            .ok_or(PaymentError::NotFound)?;

        if transaction.status.is_terminal() {
            return Ok(PaymentStatus {
                transaction_id: transaction.id,
                reference: reference.to_string(),
                status: transaction.status,
                provider_status: None,
            });
        }

        let token = self.tokens.get_token().await?;
        let remote = self
            .guard_token(self.provider.transaction_status(&token, reference).await)
            .await?;

        let matches = transaction.provider_reference.as_deref() == Some(reference)
            || remote.external_reference.as_deref() == Some(transaction.reference.as_str());
        if !matches {
            log::warn!(
                "Reference {} does not belong to transaction {}",
                reference,
                transaction.id
            );
            return Err(PaymentError::Invalid(
                "Reference does not match transaction".to_string(),
            ));
        }

        let observed = TransactionStatus::from_provider(&remote.status);
        log::info!("Payment status for {}: {}", reference, remote.status);

        let status = if observed.is_terminal() {
            match self.db.settle_transaction(&transaction.id, observed).await? {
                Settlement::Applied => observed,
                Settlement::AlreadyFinal => self
                    .db
                    .get_transaction(&transaction.id)
                    .await?
                    .map(|t| t.status)
                    .unwrap_or(observed),
                Settlement::InsufficientBalance => {
                    log::warn!(
                        "Transaction {} succeeded at the provider but the balance cannot cover it",
                        transaction.id
                    );
                    TransactionStatus::Pending
                }
            }
        } else {
            TransactionStatus::Pending
        };

        Ok(PaymentStatus {
            transaction_id: transaction.id,
            reference: reference.to_string(),
            status,
            provider_status: Some(remote.status),
        })
    }

    async fn guard_token<T>(&self, result: Result<T, ProviderError>) -> Result<T, ProviderError> {
        if let Err(e) = &result {
            if e.is_unauthorized() {
                log::warn!("Provider rejected the cached token; dropping it");
                self.tokens.invalidate().await;
            }
        }
        result
    }

    async fn record(&self, transaction: &Transaction) -> Result<(), PaymentError> {
        self.db.save_transaction(transaction).await.map_err(|e| {
            log::error!(
                "Provider accepted {} but the transaction row was not written: {:#}",
                transaction.reference,
                e
            );
            PaymentError::Internal(e)
        })
    }
}

fn require_positive(amount: f64) -> Result<(), PaymentError> {
    if amount.is_finite() && amount > 0.0 {
        Ok(())
    } else {
        Err(PaymentError::Invalid("Invalid amount.".to_string()))
    }
}

fn require_description(description: &str) -> Result<String, PaymentError> {
    let description = description.trim();
    if description.is_empty() {
        return Err(PaymentError::Invalid(
            "Description is required.".to_string(),
        ));
    }
    Ok(description.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;
    use crate::schema::{PendingUser, Role, User};
    use crate::testing::MockProvider;

    struct Fixture {
        db: Database,
        provider: Arc<MockProvider>,
        service: Arc<PaymentService>,
        user: User,
    }

    async fn fixture() -> Fixture {
        let db = Database::in_memory().await.unwrap();
        let pending = PendingUser::new(
            "Paul Payer",
            "paul@example.com",
            "Password1",
            "1990-01-01",
            "male",
            "working",
            "Cameroon",
        )
        .unwrap();
        let user = User::from_pending(pending, Role::Client);
        db.create_user_with_subscription(&user).await.unwrap();

        let provider = Arc::new(MockProvider::default());
        let tokens = TokenCache::new(Arc::new(MemoryCache::new()), provider.clone());
        let service = Arc::new(PaymentService::new(db.clone(), provider.clone(), tokens));
        Fixture {
            db,
            provider,
            service,
            user,
        }
    }

    fn collect_input(amount: f64) -> CollectInput {
        CollectInput {
            amount,
            phone: "237670000000".to_string(),
            description: "Buy XCoin".to_string(),
        }
    }

    async fn balance(f: &Fixture) -> f64 {
        f.db.get_subscription(&f.user.id)
            .await
            .unwrap()
            .unwrap()
            .balance
    }

    #[tokio::test]
    async fn collect_records_a_pending_deposit() {
        let f = fixture().await;
        let outcome = f
            .service
            .collect(&f.user.id, collect_input(1000.0))
            .await
            .unwrap();

        let stored = f
            .db
            .get_transaction(&outcome.transaction.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.kind, TransactionKind::Deposit);
        assert_eq!(stored.status, TransactionStatus::Pending);
        assert_eq!(stored.provider_reference, Some(outcome.provider.reference));
        assert_eq!(f.provider.collect_calls(), 1);
    }

    #[tokio::test]
    async fn collect_validates_before_calling_the_provider() {
        let f = fixture().await;
        let mut bad_phone = collect_input(100.0);
        bad_phone.phone = "67a0".to_string();
        let mut no_description = collect_input(100.0);
        no_description.description = "  ".to_string();

        for input in [collect_input(0.0), collect_input(f64::NAN), bad_phone, no_description] {
            let err = f.service.collect(&f.user.id, input).await.unwrap_err();
            assert_eq!(err.status(), 400);
        }
        assert_eq!(f.provider.collect_calls(), 0);
        assert_eq!(f.provider.token_calls(), 0);
    }

    #[tokio::test]
    async fn success_is_credited_and_then_served_locally() {
        let f = fixture().await;
        let outcome = f
            .service
            .collect(&f.user.id, collect_input(250.0))
            .await
            .unwrap();
        let reference = outcome.provider.reference.clone();

        let status = f
            .service
            .check_status(&f.user.id, &outcome.transaction.id, &reference)
            .await
            .unwrap();
        assert_eq!(status.status, TransactionStatus::Pending);

        f.provider.set_status(&reference, "SUCCESSFUL");
        let status = f
            .service
            .check_status(&f.user.id, &outcome.transaction.id, &reference)
            .await
            .unwrap();
        assert_eq!(status.status, TransactionStatus::Successful);
        assert_eq!(balance(&f).await, 250.0);

        let calls = f.provider.status_calls();
        let status = f
            .service
            .check_status(&f.user.id, &outcome.transaction.id, &reference)
            .await
            .unwrap();
        assert_eq!(status.status, TransactionStatus::Successful);
        assert_eq!(status.provider_status, None);
        assert_eq!(f.provider.status_calls(), calls);
    }

    #[tokio::test]
    async fn concurrent_polls_credit_once() {
        let f = fixture().await;
        let outcome = f
            .service
            .collect(&f.user.id, collect_input(400.0))
            .await
            .unwrap();
        let reference = outcome.provider.reference.clone();
        f.provider.set_status(&reference, "SUCCESSFUL");

        let polls: Vec<_> = (0..2)
            .map(|_| {
                let service = f.service.clone();
                let user_id = f.user.id.clone();
                let id = outcome.transaction.id.clone();
                let reference = reference.clone();
                tokio::spawn(async move { service.check_status(&user_id, &id, &reference).await })
            })
            .collect();
        for poll in polls {
            let status = poll.await.unwrap().unwrap();
            assert_eq!(status.status, TransactionStatus::Successful);
        }

        assert_eq!(balance(&f).await, 400.0);
    }

    #[tokio::test]
    async fn foreign_reference_is_rejected() {
        let f = fixture().await;
        let outcome = f
            .service
            .collect(&f.user.id, collect_input(10.0))
            .await
            .unwrap();
        f.provider.set_status("someone-else", "SUCCESSFUL");

        let err = f
            .service
            .check_status(&f.user.id, &outcome.transaction.id, "someone-else")
            .await
            .unwrap_err();
        assert_eq!(err.status(), 400);
        assert_eq!(balance(&f).await, 0.0);
    }

    #[tokio::test]
    async fn unknown_transaction_is_not_found() {
        let f = fixture().await;
        let err = f
            .service
            .check_status(&f.user.id, "missing", "ref")
            .await
            .unwrap_err();
        assert!(matches!(err, PaymentError::NotFound));
    }

    #[tokio::test]
    async fn withdraw_needs_balance_and_debits_on_success() {
        let f = fixture().await;
        let input = WithdrawInput {
            amount: 100.4,
            to: "237670000000".to_string(),
            description: "Cash out".to_string(),
        };

        let err = f
            .service
            .withdraw(&f.user.id, input.clone())
            .await
            .unwrap_err();
        assert!(matches!(err, PaymentError::InsufficientBalance));
        assert_eq!(f.provider.withdraw_calls(), 0);

        let deposit = f
            .service
            .collect(&f.user.id, collect_input(300.0))
            .await
            .unwrap();
        f.provider
            .set_status(&deposit.provider.reference, "SUCCESSFUL");
        f.service
            .check_status(
                &f.user.id,
                &deposit.transaction.id,
                &deposit.provider.reference,
            )
            .await
            .unwrap();

        let outcome = f.service.withdraw(&f.user.id, input).await.unwrap();
        assert_eq!(outcome.transaction.amount, 100.0);
        let reference = outcome.provider.reference.clone().unwrap();
        f.provider.set_status(&reference, "SUCCESSFUL");
        f.service
            .check_status(&f.user.id, &outcome.transaction.id, &reference)
            .await
            .unwrap();

        assert_eq!(balance(&f).await, 200.0);
    }

    #[tokio::test]
    async fn payment_link_applies_defaults() {
        let f = fixture().await;
        let (link, transaction) = f
            .service
            .payment_link(&f.user.id, PaymentLinkInput::default())
            .await
            .unwrap();

        assert!(link.ends_with(&transaction.reference));
        assert_eq!(transaction.currency, "XAF");
        assert_eq!(transaction.description, "Test");
        assert_eq!(transaction.amount, 0.0);
    }
}
