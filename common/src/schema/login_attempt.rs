use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum LoginStatus {
    Success,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct LoginAttempt {
    pub id: String,
    pub email: String,
    pub ip_address: String,
    pub status: LoginStatus,
    pub created_at: NaiveDateTime,
}

impl LoginAttempt {
    pub fn new(email: &str, ip_address: &str, status: LoginStatus) -> Self {
        LoginAttempt {
            id: uuid::Uuid::new_v4().to_string(),
            email: email.to_string(),
            ip_address: ip_address.to_string(),
            status,
            created_at: chrono::Utc::now().naive_utc(),
        }
    }
}
