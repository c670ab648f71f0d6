use anyhow::{Context, anyhow};
use jwt_compact::{
    alg::{Hs256, Hs256Key},
    prelude::*,
};

use crate::schema::PendingUser;

/// Email verification tokens are valid for a day.
pub const SIGNUP_TOKEN_TTL_HOURS: i64 = 24;

/// Signs pending registrations into email verification tokens.
pub struct SignupTokens {
    key: Hs256Key,
}

impl SignupTokens {
    pub fn new(secret: &str) -> Self {
        Self {
            key: Hs256Key::new(secret.as_bytes()),
        }
    }

    pub fn issue(&self, pending: &PendingUser) -> anyhow::Result<String> {
        let claims = Claims::new(pending.clone()).set_duration_and_issuance(
            &TimeOptions::default(),
            chrono::Duration::hours(SIGNUP_TOKEN_TTL_HOURS),
        );
        Hs256
            .token(&Header::empty(), &claims, &self.key)
            .context("Failed to sign verification token")
    }

    pub fn verify(&self, token: &str) -> anyhow::Result<PendingUser> {
        let token = UntrustedToken::new(token).map_err(|e| anyhow!("Malformed token: {e}"))?;
        let token: Token<PendingUser> = Hs256
            .validator(&self.key)
            .validate(&token)
            .map_err(|e| anyhow!("Invalid token: {e}"))?;
        token
            .claims()
            .validate_expiration(&TimeOptions::default())
            .map_err(|e| anyhow!("Expired token: {e}"))?;
        Ok(token.claims().custom.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pending() -> PendingUser {
        PendingUser::new(
            "Sam Smith",
            "sam@example.com",
            "Password9",
            "2000-02-02",
            "male",
            "student",
            "Cameroon",
        )
        .unwrap()
    }

    #[test]
    fn round_trips_pending_registration() {
        let tokens = SignupTokens::new("jwt-secret");
        let pending = pending();
        let token = tokens.issue(&pending).unwrap();
        assert_eq!(tokens.verify(&token).unwrap(), pending);
    }

    #[test]
    fn rejects_token_from_other_secret() {
        let token = SignupTokens::new("a").issue(&pending()).unwrap();
        assert!(SignupTokens::new("b").verify(&token).is_err());
        assert!(SignupTokens::new("a").verify("not.a.token").is_err());
    }
}
