use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum Plan {
    Free,
    Standard,
    Premium,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Subscription {
    pub user_id: String,
    pub plan: Plan,
    pub balance: f64,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl Subscription {
    pub fn new(user_id: &str) -> Self {
        let now = chrono::Utc::now().naive_utc();
        Subscription {
            user_id: user_id.to_string(),
            plan: Plan::Free,
            balance: 0.0,
            created_at: now,
            updated_at: now,
        }
    }
}
