use anyhow::anyhow;
use argon2::password_hash::{SaltString, rand_core::OsRng};
use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier};
use chrono::NaiveDateTime;
use fancy_regex::Regex;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Client,
}

#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub role: Role,
    pub full_name: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub dob: String,
    pub gender: String,
    pub occupation: String,
    pub country: String,
    pub phone: Option<String>,
    pub is_verified: bool,
    pub last_login: Option<NaiveDateTime>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

/// Registration data collected before the email address is confirmed.
/// Travels inside the signed verification token.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PendingUser {
    pub full_name: String,
    pub email: String,
    pub password_hash: String,
    pub dob: String,
    pub gender: String,
    pub occupation: String,
    pub country: String,
}

/// Claims carried by the session cookies.
#[derive(
    Debug, Clone, PartialEq, Serialize, Deserialize, actix_jwt_auth_middleware::FromRequest,
)]
#[serde(rename_all = "camelCase")]
pub struct SessionUser {
    pub id: String,
    pub email: String,
    pub full_name: String,
    pub role: Role,
}

impl PendingUser {
    pub fn new(
        full_name: &str,
        email: &str,
        password: &str,
        dob: &str,
        gender: &str,
        occupation: &str,
        country: &str,
    ) -> anyhow::Result<Self> {
        if !validate_email(email)? {
            return Err(anyhow!("Invalid email address."));
        }

        if !validate_password(password)? {
            return Err(anyhow!(
                "Password must be at least 8 characters long and include at least one lowercase letter, one uppercase letter, and one number."
            ));
        }

        Ok(PendingUser {
            full_name: full_name.trim().to_string(),
            email: normalize_email(email),
            password_hash: hash_password(password)?,
            dob: dob.to_string(),
            gender: gender.to_string(),
            occupation: occupation.to_string(),
            country: country.to_string(),
        })
    }
}

impl User {
    pub fn from_pending(pending: PendingUser, role: Role) -> Self {
        let now = chrono::Utc::now().naive_utc();
        User {
            id: uuid::Uuid::new_v4().to_string(),
            role,
            full_name: pending.full_name,
            email: pending.email,
            password_hash: pending.password_hash,
            dob: pending.dob,
            gender: pending.gender,
            occupation: pending.occupation,
            country: pending.country,
            phone: None,
            is_verified: true,
            last_login: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Admin accounts are created from the command line and skip email verification.
    pub fn new_admin(full_name: &str, email: &str, password: &str) -> anyhow::Result<Self> {
        let pending = PendingUser::new(full_name, email, password, "", "", "", "")?;
        Ok(User::from_pending(pending, Role::Admin))
    }

    pub fn verify_password(&self, password: &str) -> anyhow::Result<()> {
        let hash = PasswordHash::new(&self.password_hash)
            .map_err(|e| anyhow!("Failed to parse password hash: {}", e))?;
        Argon2::default()
            .verify_password(password.as_bytes(), &hash)
            .map_err(|e| anyhow!("Password not match: {}", e))
    }

    pub fn session(&self) -> SessionUser {
        SessionUser {
            id: self.id.clone(),
            email: self.email.clone(),
            full_name: self.full_name.clone(),
            role: self.role,
        }
    }
}

fn hash_password(password: &str) -> anyhow::Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    Ok(Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow!("Failed to hash password: {e}"))?
        .to_string())
}

pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

pub fn validate_email(email: &str) -> anyhow::Result<bool> {
    static RE: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").ok());
    match &*RE {
        Some(re) => re
            .is_match(email.trim())
            .map_err(|e| anyhow!("Regex error for email: {e}")),
        None => Err(anyhow!(
            "Email regex failed to compile. Rejecting all emails."
        )),
    }
}

fn validate_password(password: &str) -> anyhow::Result<bool> {
    static RE: Lazy<Option<Regex>> =
        Lazy::new(|| Regex::new(r"^(?=.*[a-z])(?=.*[A-Z])(?=.*\d).{8,}$").ok());
    match &*RE {
        Some(re) => re
            .is_match(password)
            .map_err(|e| anyhow!("Regex error for password: {e}")),
        None => Err(anyhow!(
            "Password regex failed to compile. Rejecting all passwords."
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pending(password: &str) -> anyhow::Result<PendingUser> {
        PendingUser::new(
            "Ada Lovelace",
            " Ada@Example.com ",
            password,
            "1990-01-01",
            "female",
            "working",
            "Cameroon",
        )
    }

    #[test]
    fn registration_normalizes_email_and_hashes_password() {
        let pending = pending("Secret123").unwrap();
        assert_eq!(pending.email, "ada@example.com");
        assert_ne!(pending.password_hash, "Secret123");

        let user = User::from_pending(pending, Role::Client);
        assert!(user.is_verified);
        assert!(user.verify_password("Secret123").is_ok());
        assert!(user.verify_password("secret123").is_err());
    }

    #[test]
    fn weak_passwords_are_rejected() {
        assert!(pending("short1A").is_err());
        assert!(pending("alllowercase1").is_err());
        assert!(pending("NoDigitsHere").is_err());
    }

    #[test]
    fn user_json_uses_camel_case_keys() {
        let user = User::from_pending(pending("Secret123").unwrap(), Role::Client);

        let session = serde_json::to_value(user.session()).unwrap();
        assert_eq!(session["fullName"], "Ada Lovelace");
        assert!(session.get("full_name").is_none());

        let json = serde_json::to_value(&user).unwrap();
        assert_eq!(json["fullName"], "Ada Lovelace");
        assert_eq!(json["isVerified"], true);
        assert!(json.get("passwordHash").is_none());
    }

    #[test]
    fn email_format() {
        assert!(validate_email("a@b.co").unwrap());
        assert!(!validate_email("not-an-email").unwrap());
        assert!(!validate_email("a@b").unwrap());
    }

    #[test]
    fn session_claims_do_not_carry_the_hash() {
        let user = User::new_admin("Root", "root@xcoin.io", "Admin1234").unwrap();
        let claims = serde_json::to_value(user.session()).unwrap();
        assert_eq!(claims["role"], "admin");
        assert!(claims.get("password_hash").is_none());
    }
}
