//! Validation of Campay payment notifications.

use jwt_compact::{
    alg::{Hs256, Hs256Key},
    prelude::*,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Query string of the provider callback, as received.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CallbackQuery {
    pub status: Option<String>,
    pub reference: Option<String>,
    pub amount: Option<String>,
    pub currency: Option<String>,
    pub operator: Option<String>,
    pub code: Option<String>,
    pub operator_reference: Option<String>,
    pub signature: Option<String>,
    pub endpoint: Option<String>,
    pub external_reference: Option<String>,
    pub external_user: Option<String>,
    pub extra_first_name: Option<String>,
    pub extra_last_name: Option<String>,
    pub extra_email: Option<String>,
    pub phone_number: Option<String>,
}

/// A callback whose fields and signature checked out.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct WebhookNotification {
    pub status: String,
    pub reference: Uuid,
    pub amount: f64,
    pub currency: String,
    pub operator: Option<String>,
    pub code: Option<String>,
    pub operator_reference: Option<String>,
    pub endpoint: Option<String>,
    pub external_reference: Option<String>,
    pub external_user: Option<String>,
    pub extra_first_name: Option<String>,
    pub extra_last_name: Option<String>,
    pub extra_email: Option<String>,
    pub phone_number: Option<String>,
}

#[derive(Debug, Error, PartialEq)]
pub enum WebhookError {
    #[error("Missing required parameters: status, reference, amount, currency, or signature")]
    MissingFields,
    #[error("Invalid amount")]
    InvalidAmount,
    #[error("Invalid reference format")]
    InvalidReference,
    #[error("Invalid signature")]
    InvalidSignature,
}

impl WebhookError {
    pub fn status(&self) -> u16 {
        match self {
            WebhookError::InvalidSignature => 401,
            _ => 400,
        }
    }
}

pub struct WebhookVerifier {
    key: Hs256Key,
}

impl WebhookVerifier {
    pub fn new(webhook_key: &str) -> Self {
        Self {
            key: Hs256Key::new(webhook_key.as_bytes()),
        }
    }

    pub fn verify(&self, query: CallbackQuery) -> Result<WebhookNotification, WebhookError> {
        let (Some(status), Some(reference), Some(amount), Some(currency), Some(signature)) = (
            present(query.status),
            present(query.reference),
            present(query.amount),
            present(query.currency),
            present(query.signature),
        ) else {
            return Err(WebhookError::MissingFields);
        };

        let amount: f64 = amount
            .trim()
            .parse()
            .ok()
            .filter(|a: &f64| a.is_finite())
            .ok_or(WebhookError::InvalidAmount)?;

        let reference = parse_reference(&reference).ok_or(WebhookError::InvalidReference)?;

        self.check_signature(&signature)?;

        Ok(WebhookNotification {
            status,
            reference,
            amount,
            currency,
            operator: query.operator,
            code: query.code,
            operator_reference: query.operator_reference,
            endpoint: query.endpoint,
            external_reference: query.external_reference,
            external_user: query.external_user,
            extra_first_name: query.extra_first_name,
            extra_last_name: query.extra_last_name,
            extra_email: query.extra_email,
            phone_number: query.phone_number,
        })
    }

    fn check_signature(&self, signature: &str) -> Result<(), WebhookError> {
        let token = UntrustedToken::new(signature).map_err(|e| {
            log::warn!("Malformed webhook signature: {}", e);
            WebhookError::InvalidSignature
        })?;
        let token: Token<serde_json::Value> =
            Hs256.validator(&self.key).validate(&token).map_err(|e| {
                log::warn!("Webhook signature rejected: {}", e);
                WebhookError::InvalidSignature
            })?;
        // Campay tokens may omit `exp`; only an explicit expiry is enforced.
        if token.claims().expiration.is_some() {
            token
                .claims()
                .validate_expiration(&TimeOptions::default())
                .map_err(|e| {
                    log::warn!("Webhook signature expired: {}", e);
                    WebhookError::InvalidSignature
                })?;
        }
        Ok(())
    }
}

fn present(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// Hyphenated UUID only, e.g. `3fa85f64-5717-4562-b3fc-2c963f66afa6`.
fn parse_reference(reference: &str) -> Option<Uuid> {
    if reference.len() != 36 {
        return None;
    }
    Uuid::parse_str(reference).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::sign_hs256;

    const KEY: &str = "webhook-secret";

    fn valid_query() -> CallbackQuery {
        CallbackQuery {
            status: Some("SUCCESSFUL".to_string()),
            reference: Some("3fa85f64-5717-4562-b3fc-2c963f66afa6".to_string()),
            amount: Some("100".to_string()),
            currency: Some("XAF".to_string()),
            signature: Some(sign_hs256(KEY, 3600)),
            operator: Some("MTN".to_string()),
            ..CallbackQuery::default()
        }
    }

    #[test]
    fn accepts_signed_notification() {
        let notification = WebhookVerifier::new(KEY).verify(valid_query()).unwrap();
        assert_eq!(notification.amount, 100.0);
        assert_eq!(notification.operator.as_deref(), Some("MTN"));
    }

    #[test]
    fn each_required_field_is_enforced() {
        let verifier = WebhookVerifier::new(KEY);
        let strip: [fn(&mut CallbackQuery); 5] = [
            |q| q.status = None,
            |q| q.reference = None,
            |q| q.amount = None,
            |q| q.currency = Some(String::new()),
            |q| q.signature = None,
        ];
        for strip in strip {
            let mut query = valid_query();
            strip(&mut query);
            assert_eq!(verifier.verify(query), Err(WebhookError::MissingFields));
        }
    }

    #[test]
    fn rejects_bad_amount_and_reference() {
        let verifier = WebhookVerifier::new(KEY);

        let mut query = valid_query();
        query.amount = Some("ten".to_string());
        assert_eq!(verifier.verify(query), Err(WebhookError::InvalidAmount));

        for reference in [
            "not-a-uuid",
            "3fa85f6457174562b3fc2c963f66afa6",
            "{3fa85f64-5717-4562-b3fc-2c963f66afa6}",
        ] {
            let mut query = valid_query();
            query.reference = Some(reference.to_string());
            let err = verifier.verify(query).unwrap_err();
            assert_eq!(err, WebhookError::InvalidReference);
            assert_eq!(err.status(), 400);
        }
    }

    #[test]
    fn rejects_foreign_or_expired_signatures() {
        let verifier = WebhookVerifier::new(KEY);

        let mut query = valid_query();
        query.signature = Some(sign_hs256("other-key", 3600));
        let err = verifier.verify(query).unwrap_err();
        assert_eq!(err, WebhookError::InvalidSignature);
        assert_eq!(err.status(), 401);

        let mut query = valid_query();
        query.signature = Some(sign_hs256(KEY, -3600));
        assert_eq!(verifier.verify(query), Err(WebhookError::InvalidSignature));

        let mut query = valid_query();
        query.signature = Some("garbage".to_string());
        assert_eq!(verifier.verify(query), Err(WebhookError::InvalidSignature));
    }

    #[test]
    fn accepts_signature_without_expiry() {
        let claims = Claims::new(serde_json::json!({ "app": "campay" }));
        let unexpiring = Hs256
            .token(&Header::empty(), &claims, &Hs256Key::new(KEY.as_bytes()))
            .unwrap();

        let mut query = valid_query();
        query.signature = Some(unexpiring.clone());
        assert!(WebhookVerifier::new(KEY).verify(query).is_ok());

        let mut query = valid_query();
        query.signature = Some(unexpiring);
        assert_eq!(
            WebhookVerifier::new("other-key").verify(query),
            Err(WebhookError::InvalidSignature)
        );
    }
}
