use std::str::FromStr;

use anyhow::Context;
use sqlx::{
    SqlitePool,
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
};

use crate::schema::{
    LoginAttempt, Plan, Subscription, Transaction, TransactionKind, TransactionStatus, User,
};

/// Result of a guarded `pending -> terminal` transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Settlement {
    /// The row moved out of `pending` and the balance change (if any) was applied.
    Applied,
    /// Another caller already moved the row out of `pending`.
    AlreadyFinal,
    /// A debit would have made the balance negative; the row is still pending.
    InsufficientBalance,
}

#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    pub async fn new(database_url: &str) -> anyhow::Result<Self> {
        let options = SqliteConnectOptions::from_str(database_url)
            .context("Failed to create SQLite connect options")?
            .create_if_missing(true)
            .foreign_keys(true);
        let pool = SqlitePool::connect_with(options).await?;
        Self::migrate(pool).await
    }

    /// A private in-memory database. One connection, so every query sees the same data.
    pub async fn in_memory() -> anyhow::Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .context("Failed to create SQLite connect options")?
            .foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;
        Self::migrate(pool).await
    }

    async fn migrate(pool: SqlitePool) -> anyhow::Result<Self> {
        sqlx::migrate!()
            .run(&pool)
            .await
            .context("Database migration error")?;
        Ok(Self { pool })
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    /// Creates the user together with an empty `free` subscription.
    pub async fn create_user_with_subscription(&self, user: &User) -> anyhow::Result<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query(
            r#"
            INSERT INTO users (
                id, role, full_name, email, password_hash, dob, gender, occupation,
                country, phone, is_verified, last_login, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&user.id)
        .bind(user.role)
        .bind(&user.full_name)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(&user.dob)
        .bind(&user.gender)
        .bind(&user.occupation)
        .bind(&user.country)
        .bind(&user.phone)
        .bind(user.is_verified)
        .bind(user.last_login)
        .bind(user.created_at)
        .bind(user.updated_at)
        .execute(&mut *tx)
        .await
        .context("Failed to save user to database")?;

        let subscription = Subscription::new(&user.id);
        sqlx::query(
            r#"
            INSERT INTO subscriptions (user_id, plan, balance, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(&subscription.user_id)
        .bind(subscription.plan)
        .bind(subscription.balance)
        .bind(subscription.created_at)
        .bind(subscription.updated_at)
        .execute(&mut *tx)
        .await
        .context("Failed to create subscription")?;

        tx.commit().await?;
        Ok(())
    }

    pub async fn get_user_by_email(&self, email: &str) -> anyhow::Result<Option<User>> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE email = ?")
            .bind(email)
            .fetch_optional(&self.pool)
            .await
            .context(format!("Failed to get user with email {}", email))?;
        Ok(user)
    }

    pub async fn get_user(&self, user_id: &str) -> anyhow::Result<Option<User>> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = ?")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await
            .context(format!("Failed to get user with id {}", user_id))?;
        Ok(user)
    }

    pub async fn touch_last_login(&self, user_id: &str) -> anyhow::Result<()> {
        let now = chrono::Utc::now().naive_utc();
        sqlx::query("UPDATE users SET last_login = ?, updated_at = ? WHERE id = ?")
            .bind(now)
            .bind(now)
            .bind(user_id)
            .execute(&self.pool)
            .await
            .context("Failed to update last login")?;
        Ok(())
    }

    pub async fn save_login_attempt(&self, attempt: &LoginAttempt) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            INSERT INTO login_attempts (id, email, ip_address, status, created_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(&attempt.id)
        .bind(&attempt.email)
        .bind(&attempt.ip_address)
        .bind(attempt.status)
        .bind(attempt.created_at)
        .execute(&self.pool)
        .await
        .context("Failed to save login attempt")?;
        Ok(())
    }

    pub async fn get_login_attempts(&self, email: &str) -> anyhow::Result<Vec<LoginAttempt>> {
        let rows = sqlx::query_as::<_, LoginAttempt>(
            "SELECT * FROM login_attempts WHERE email = ? ORDER BY created_at DESC",
        )
        .bind(email)
        .fetch_all(&self.pool)
        .await
        .context("Failed to get login attempts")?;
        Ok(rows)
    }

    pub async fn get_subscription(&self, user_id: &str) -> anyhow::Result<Option<Subscription>> {
        let subscription =
            sqlx::query_as::<_, Subscription>("SELECT * FROM subscriptions WHERE user_id = ?")
                .bind(user_id)
                .fetch_optional(&self.pool)
                .await
                .context(format!("Failed to get subscription for user {}", user_id))?;
        Ok(subscription)
    }

    pub async fn update_plan(&self, user_id: &str, plan: Plan) -> anyhow::Result<bool> {
        let result =
            sqlx::query("UPDATE subscriptions SET plan = ?, updated_at = ? WHERE user_id = ?")
                .bind(plan)
                .bind(chrono::Utc::now().naive_utc())
                .bind(user_id)
                .execute(&self.pool)
                .await
                .context("Failed to update subscription plan")?;
        Ok(result.rows_affected() == 1)
    }

    pub async fn save_transaction(&self, transaction: &Transaction) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            INSERT INTO transactions (
                id, kind, amount, currency, fee, reference, provider_reference,
                description, status, user_id, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&transaction.id)
        .bind(transaction.kind)
        .bind(transaction.amount)
        .bind(&transaction.currency)
        .bind(transaction.fee)
        .bind(&transaction.reference)
        .bind(&transaction.provider_reference)
        .bind(&transaction.description)
        .bind(transaction.status)
        .bind(&transaction.user_id)
        .bind(transaction.created_at)
        .bind(transaction.updated_at)
        .execute(&self.pool)
        .await
        .context("Failed to save transaction")?;

        Ok(())
    }

    pub async fn get_transaction(&self, id: &str) -> anyhow::Result<Option<Transaction>> {
        let row = sqlx::query_as::<_, Transaction>("SELECT * FROM transactions WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .context(format!("Failed to get transaction with id {}", id))?;
        Ok(row)
    }

    pub async fn get_user_transaction(
        &self,
        id: &str,
        user_id: &str,
    ) -> anyhow::Result<Option<Transaction>> {
        let row = sqlx::query_as::<_, Transaction>(
            "SELECT * FROM transactions WHERE id = ? AND user_id = ?",
        )
        .bind(id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .context(format!("Failed to get transaction with id {}", id))?;
        Ok(row)
    }

    pub async fn get_user_transactions(
        &self,
        user_id: &str,
        status: Option<TransactionStatus>,
    ) -> anyhow::Result<Vec<Transaction>> {
        let rows = match status {
            Some(status) => {
                sqlx::query_as::<_, Transaction>(
                    r#"
                    SELECT * FROM transactions
                    WHERE user_id = ? AND status = ?
                    ORDER BY created_at DESC
                    "#,
                )
                .bind(user_id)
                .bind(status)
                .fetch_all(&self.pool)
                .await
            }
            None => {
                sqlx::query_as::<_, Transaction>(
                    "SELECT * FROM transactions WHERE user_id = ? ORDER BY created_at DESC",
                )
                .bind(user_id)
                .fetch_all(&self.pool)
                .await
            }
        }
        .context(format!("Failed to get transactions for user {}", user_id))?;

        Ok(rows)
    }

    pub async fn get_transactions_by_kind(
        &self,
        kind: TransactionKind,
        status: Option<TransactionStatus>,
    ) -> anyhow::Result<Vec<Transaction>> {
        let rows = match status {
            Some(status) => {
                sqlx::query_as::<_, Transaction>(
                    r#"
                    SELECT * FROM transactions
                    WHERE kind = ? AND status = ?
                    ORDER BY created_at DESC
                    "#,
                )
                .bind(kind)
                .bind(status)
                .fetch_all(&self.pool)
                .await
            }
            None => {
                sqlx::query_as::<_, Transaction>(
                    "SELECT * FROM transactions WHERE kind = ? ORDER BY created_at DESC",
                )
                .bind(kind)
                .fetch_all(&self.pool)
                .await
            }
        }
        .context("Failed to get transactions by kind")?;

        Ok(rows)
    }

    /// Moves a pending transaction to `status` and applies its balance change,
    /// both inside one database transaction.
    ///
    /// The status update is conditional on the row still being `pending`, so
    /// concurrent callers observing the same terminal state settle it once.
    pub async fn settle_transaction(
        &self,
        id: &str,
        status: TransactionStatus,
    ) -> anyhow::Result<Settlement> {
        if !status.is_terminal() {
            anyhow::bail!("Transaction {} can only be settled to a terminal status", id);
        }

        let now = chrono::Utc::now().naive_utc();
        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query(
            r#"
            UPDATE transactions
            SET status = ?, updated_at = ?
            WHERE id = ? AND status = 'pending'
            "#,
        )
        .bind(status)
        .bind(now)
        .bind(id)
        .execute(&mut *tx)
        .await
        .context(format!("Failed to update status of transaction {}", id))?
        .rows_affected();

        if updated == 0 {
            tx.rollback().await?;
            return Ok(Settlement::AlreadyFinal);
        }

        if status == TransactionStatus::Successful {
            let transaction =
                sqlx::query_as::<_, Transaction>("SELECT * FROM transactions WHERE id = ?")
                    .bind(id)
                    .fetch_one(&mut *tx)
                    .await
                    .context(format!("Failed to reload transaction {}", id))?;
            let delta = transaction.balance_delta();

            let changed = sqlx::query(
                r#"
                UPDATE subscriptions
                SET balance = balance + ?, updated_at = ?
                WHERE user_id = ? AND balance + ? >= 0
                "#,
            )
            .bind(delta)
            .bind(now)
            .bind(&transaction.user_id)
            .bind(delta)
            .execute(&mut *tx)
            .await
            .context("Failed to update subscription balance")?
            .rows_affected();

            if changed == 0 && delta < 0.0 {
                tx.rollback().await?;
                return Ok(Settlement::InsufficientBalance);
            }
            if changed == 0 {
                log::warn!(
                    "No subscription for user {}; transaction {} settled without credit",
                    transaction.user_id,
                    id
                );
            }
        }

        tx.commit().await?;
        log::info!("Transaction {} settled as {}", id, status);
        Ok(Settlement::Applied)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{PendingUser, Role};

    async fn seeded() -> (Database, User) {
        let db = Database::in_memory().await.unwrap();
        let pending = PendingUser::new(
            "Jane Doe",
            "jane@example.com",
            "Password1",
            "1995-05-05",
            "female",
            "student",
            "Cameroon",
        )
        .unwrap();
        let user = User::from_pending(pending, Role::Client);
        db.create_user_with_subscription(&user).await.unwrap();
        (db, user)
    }

    async fn pending(db: &Database, user: &User, kind: TransactionKind, amount: f64) -> Transaction {
        let tx = Transaction::new(
            kind,
            amount,
            "XAF",
            uuid::Uuid::new_v4().to_string(),
            "test",
            &user.id,
        );
        db.save_transaction(&tx).await.unwrap();
        tx
    }

    async fn balance(db: &Database, user: &User) -> f64 {
        db.get_subscription(&user.id).await.unwrap().unwrap().balance
    }

    #[tokio::test]
    async fn user_round_trips_with_free_subscription() {
        let (db, user) = seeded().await;
        let loaded = db.get_user_by_email("jane@example.com").await.unwrap().unwrap();
        assert_eq!(loaded.id, user.id);
        assert_eq!(loaded.role, Role::Client);

        let subscription = db.get_subscription(&user.id).await.unwrap().unwrap();
        assert_eq!(subscription.plan, Plan::Free);
        assert_eq!(subscription.balance, 0.0);
    }

    #[tokio::test]
    async fn duplicate_email_is_rejected() {
        let (db, user) = seeded().await;
        let mut twin = user.clone();
        twin.id = uuid::Uuid::new_v4().to_string();
        assert!(db.create_user_with_subscription(&twin).await.is_err());
        // the user insert failed, so no orphan subscription was committed
        assert!(db.get_subscription(&twin.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn successful_deposit_credits_once() {
        let (db, user) = seeded().await;
        let tx = pending(&db, &user, TransactionKind::Deposit, 500.0).await;

        let first = db
            .settle_transaction(&tx.id, TransactionStatus::Successful)
            .await
            .unwrap();
        let second = db
            .settle_transaction(&tx.id, TransactionStatus::Successful)
            .await
            .unwrap();

        assert_eq!(first, Settlement::Applied);
        assert_eq!(second, Settlement::AlreadyFinal);
        assert_eq!(balance(&db, &user).await, 500.0);
    }

    #[tokio::test]
    async fn terminal_rows_are_immutable() {
        let (db, user) = seeded().await;
        let tx = pending(&db, &user, TransactionKind::Deposit, 100.0).await;

        db.settle_transaction(&tx.id, TransactionStatus::Failed)
            .await
            .unwrap();
        let late = db
            .settle_transaction(&tx.id, TransactionStatus::Successful)
            .await
            .unwrap();

        assert_eq!(late, Settlement::AlreadyFinal);
        let stored = db.get_transaction(&tx.id).await.unwrap().unwrap();
        assert_eq!(stored.status, TransactionStatus::Failed);
        assert_eq!(balance(&db, &user).await, 0.0);
    }

    #[tokio::test]
    async fn debit_never_goes_negative() {
        let (db, user) = seeded().await;
        let deposit = pending(&db, &user, TransactionKind::Deposit, 50.0).await;
        db.settle_transaction(&deposit.id, TransactionStatus::Successful)
            .await
            .unwrap();

        let convert = pending(&db, &user, TransactionKind::Convert, 80.0).await;
        let outcome = db
            .settle_transaction(&convert.id, TransactionStatus::Successful)
            .await
            .unwrap();

        assert_eq!(outcome, Settlement::InsufficientBalance);
        let stored = db.get_transaction(&convert.id).await.unwrap().unwrap();
        assert_eq!(stored.status, TransactionStatus::Pending);
        assert_eq!(balance(&db, &user).await, 50.0);
    }

    #[tokio::test]
    async fn filters_transactions_by_status_and_kind() {
        let (db, user) = seeded().await;
        let a = pending(&db, &user, TransactionKind::Deposit, 10.0).await;
        pending(&db, &user, TransactionKind::Convert, 5.0).await;
        db.settle_transaction(&a.id, TransactionStatus::Successful)
            .await
            .unwrap();

        let all = db.get_user_transactions(&user.id, None).await.unwrap();
        assert_eq!(all.len(), 2);
        let ok = db
            .get_user_transactions(&user.id, Some(TransactionStatus::Successful))
            .await
            .unwrap();
        assert_eq!(ok.len(), 1);
        assert_eq!(ok[0].id, a.id);

        let converts = db
            .get_transactions_by_kind(TransactionKind::Convert, Some(TransactionStatus::Pending))
            .await
            .unwrap();
        assert_eq!(converts.len(), 1);
    }
}
