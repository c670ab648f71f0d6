//! XCoin conversion requests and their admin review.

use crate::db::{Database, Settlement};
use crate::helpers::generate_payment_reference;
use crate::payments::PaymentError;
use crate::rates::XcoinRates;
use crate::schema::{Transaction, TransactionKind, TransactionStatus};

pub const XCOIN_CURRENCY: &str = "XCOIN";

#[derive(Clone)]
pub struct TransferService {
    db: Database,
}

impl TransferService {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Records a pending conversion of `amount` XCoin into `currency`.
    /// The balance is only debited once an admin approves it.
    pub async fn request_conversion(
        &self,
        user_id: &str,
        amount: f64,
        currency: &str,
        rates: &XcoinRates,
    ) -> Result<Transaction, PaymentError> {
        if !amount.is_finite() || amount <= 0.0 {
            return Err(PaymentError::Invalid("Invalid amount".to_string()));
        }
        let currency = currency.trim().to_ascii_uppercase();
        if !matches!(currency.as_str(), "FCFA" | "RMB" | "USD") {
            return Err(PaymentError::Invalid(
                "Currency must be one of FCFA, RMB, USD".to_string(),
            ));
        }
        let value = rates
            .convert(amount, &currency)
            .ok_or_else(|| PaymentError::Invalid("Unsupported currency".to_string()))?;

        let balance = self
            .db
            .get_subscription(user_id)
            .await?
            .map(|s| s.balance)
            .unwrap_or(0.0);
        if amount > balance {
            return Err(PaymentError::InsufficientBalance);
        }

        let transaction = Transaction::new(
            TransactionKind::Convert,
            amount,
            XCOIN_CURRENCY,
            generate_payment_reference(),
            &format!("Convert {} XCOIN to {:.2} {}", amount, value, currency),
            user_id,
        );
        self.db.save_transaction(&transaction).await?;
        log::info!(
            "Conversion {} requested by {}: {} XCOIN to {}",
            transaction.id,
            user_id,
            amount,
            currency
        );
        Ok(transaction)
    }

    pub async fn list(
        &self,
        status: Option<TransactionStatus>,
    ) -> Result<Vec<Transaction>, PaymentError> {
        Ok(self
            .db
            .get_transactions_by_kind(TransactionKind::Convert, status)
            .await?)
    }

    /// Approves or declines a pending transfer request.
    pub async fn review(&self, id: &str, approve: bool) -> Result<Transaction, PaymentError> {
        let transaction = self
            .db
            .get_transaction(id)
            .await?
            .filter(|t| t.kind == TransactionKind::Convert)
            .ok_or(PaymentError::NotFound)?;

        let target = if approve {
            TransactionStatus::Successful
        } else {
            TransactionStatus::Failed
        };

        match self.db.settle_transaction(&transaction.id, target).await? {
            Settlement::Applied => {}
            Settlement::AlreadyFinal => return Err(PaymentError::AlreadyFinal),
            Settlement::InsufficientBalance => return Err(PaymentError::InsufficientBalance),
        }

        self.db
            .get_transaction(&transaction.id)
            .await?
            .ok_or(PaymentError::NotFound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rates::DEFAULT_RATES;
    use crate::schema::{PendingUser, Role, User};

    async fn funded(balance: f64) -> (Database, TransferService, User) {
        let db = Database::in_memory().await.unwrap();
        let pending = PendingUser::new(
            "Tina Transfer",
            "tina@example.com",
            "Password1",
            "1992-03-04",
            "female",
            "working",
            "Cameroon",
        )
        .unwrap();
        let user = User::from_pending(pending, Role::Client);
        db.create_user_with_subscription(&user).await.unwrap();

        if balance > 0.0 {
            let deposit = Transaction::new(
                TransactionKind::Deposit,
                balance,
                "XAF",
                generate_payment_reference(),
                "seed",
                &user.id,
            );
            db.save_transaction(&deposit).await.unwrap();
            db.settle_transaction(&deposit.id, TransactionStatus::Successful)
                .await
                .unwrap();
        }
        (db.clone(), TransferService::new(db), user)
    }

    async fn balance(db: &Database, user: &User) -> f64 {
        db.get_subscription(&user.id).await.unwrap().unwrap().balance
    }

    #[tokio::test]
    async fn conversion_checks_amount_and_currency() {
        let (_, transfers, user) = funded(50.0).await;

        for (amount, currency) in [(0.0, "USD"), (10.0, "EUR"), (60.0, "USD")] {
            let err = transfers
                .request_conversion(&user.id, amount, currency, &DEFAULT_RATES)
                .await
                .unwrap_err();
            assert_eq!(err.status(), 400);
        }

        let tx = transfers
            .request_conversion(&user.id, 10.0, "fcfa", &DEFAULT_RATES)
            .await
            .unwrap();
        assert_eq!(tx.status, TransactionStatus::Pending);
        assert!(tx.description.contains("4675.20 FCFA"));
    }

    #[tokio::test]
    async fn approval_debits_once() {
        let (db, transfers, user) = funded(50.0).await;
        let tx = transfers
            .request_conversion(&user.id, 20.0, "USD", &DEFAULT_RATES)
            .await
            .unwrap();

        let approved = transfers.review(&tx.id, true).await.unwrap();
        assert_eq!(approved.status, TransactionStatus::Successful);
        assert_eq!(balance(&db, &user).await, 30.0);

        let err = transfers.review(&tx.id, true).await.unwrap_err();
        assert_eq!(err.status(), 409);
        assert_eq!(balance(&db, &user).await, 30.0);
    }

    #[tokio::test]
    async fn decline_leaves_balance() {
        let (db, transfers, user) = funded(50.0).await;
        let tx = transfers
            .request_conversion(&user.id, 20.0, "RMB", &DEFAULT_RATES)
            .await
            .unwrap();

        let declined = transfers.review(&tx.id, false).await.unwrap();
        assert_eq!(declined.status, TransactionStatus::Failed);
        assert_eq!(balance(&db, &user).await, 50.0);
        assert_eq!(
            transfers
                .list(Some(TransactionStatus::Failed))
                .await
                .unwrap()
                .len(),
            1
        );
    }

    #[tokio::test]
    async fn approval_fails_when_balance_dropped() {
        let (db, transfers, user) = funded(30.0).await;
        let first = transfers
            .request_conversion(&user.id, 20.0, "USD", &DEFAULT_RATES)
            .await
            .unwrap();
        let second = transfers
            .request_conversion(&user.id, 20.0, "USD", &DEFAULT_RATES)
            .await
            .unwrap();

        transfers.review(&first.id, true).await.unwrap();
        let err = transfers.review(&second.id, true).await.unwrap_err();
        assert!(matches!(err, PaymentError::InsufficientBalance));
        assert_eq!(balance(&db, &user).await, 10.0);

        let still = db.get_transaction(&second.id).await.unwrap().unwrap();
        assert_eq!(still.status, TransactionStatus::Pending);
    }

    #[tokio::test]
    async fn review_of_unknown_or_other_kind_is_not_found() {
        let (_, transfers, _) = funded(0.0).await;
        let err = transfers.review("nope", true).await.unwrap_err();
        assert!(matches!(err, PaymentError::NotFound));
    }
}
