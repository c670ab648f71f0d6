use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum TransactionKind {
    Deposit,
    Withdraw,
    Convert,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum TransactionStatus {
    Pending,
    Successful,
    Failed,
}

impl TransactionStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, TransactionStatus::Pending)
    }

    /// Maps a Campay status string (`PENDING`, `SUCCESSFUL`, `FAILED`).
    pub fn from_provider(status: &str) -> Self {
        let status = status.to_ascii_uppercase();
        if status.contains("SUCCESS") {
            TransactionStatus::Successful
        } else if status.contains("FAIL") {
            TransactionStatus::Failed
        } else {
            TransactionStatus::Pending
        }
    }

    pub fn parse(status: &str) -> Option<Self> {
        match status {
            "pending" => Some(TransactionStatus::Pending),
            "successful" => Some(TransactionStatus::Successful),
            "failed" => Some(TransactionStatus::Failed),
            _ => None,
        }
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TransactionStatus::Pending => "pending",
            TransactionStatus::Successful => "successful",
            TransactionStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Transaction {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: TransactionKind,
    pub amount: f64,
    pub currency: String,
    pub fee: f64,
    pub reference: String,
    pub provider_reference: Option<String>,
    pub description: String,
    pub status: TransactionStatus,
    pub user_id: String,
    pub created_at: chrono::NaiveDateTime,
    pub updated_at: chrono::NaiveDateTime,
}

impl Transaction {
    pub fn new(
        kind: TransactionKind,
        amount: f64,
        currency: &str,
        reference: String,
        description: &str,
        user_id: &str,
    ) -> Self {
        let now = chrono::Utc::now().naive_utc();
        Transaction {
            id: uuid::Uuid::new_v4().to_string(),
            kind,
            amount,
            currency: currency.to_string(),
            fee: 0.0,
            reference,
            provider_reference: None,
            description: description.to_string(),
            status: TransactionStatus::Pending,
            user_id: user_id.to_string(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_provider_reference(mut self, reference: Option<String>) -> Self {
        self.provider_reference = reference;
        self
    }

    /// Signed change applied to the owner's balance when this transaction succeeds.
    pub fn balance_delta(&self) -> f64 {
        match self.kind {
            TransactionKind::Deposit => self.amount,
            TransactionKind::Withdraw | TransactionKind::Convert => -self.amount,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_statuses() {
        assert_eq!(
            TransactionStatus::from_provider("SUCCESSFUL"),
            TransactionStatus::Successful
        );
        assert_eq!(
            TransactionStatus::from_provider("FAILED"),
            TransactionStatus::Failed
        );
        assert_eq!(
            TransactionStatus::from_provider("PENDING"),
            TransactionStatus::Pending
        );
        assert_eq!(
            TransactionStatus::from_provider("something else"),
            TransactionStatus::Pending
        );
    }

    #[test]
    fn serializes_kind_as_type() {
        let tx = Transaction::new(
            TransactionKind::Convert,
            10.0,
            "XCOIN",
            "ref".to_string(),
            "convert",
            "user",
        );
        let json = serde_json::to_value(&tx).unwrap();
        assert_eq!(json["type"], "convert");
        assert_eq!(json["status"], "pending");
        assert_eq!(tx.balance_delta(), -10.0);
    }
}
