use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::validation::{matches, Validator, EMAIL_RX};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct User {
    pub id: i64,
    pub created_at: DateTime<Utc>,
    pub name: String,
    pub email: String,
    #[serde(skip)]
    pub password: Password,
    pub activated: bool,
    #[serde(skip)]
    pub version: i32,
}

/// A bcrypt password hash. The plaintext is never retained.
#[derive(Clone, Default, PartialEq)]
pub struct Password {
    hash: String,
}

impl std::fmt::Debug for Password {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Password(..)")
    }
}

impl Password {
    pub fn set(plaintext: &str, cost: u32) -> Result<Self, bcrypt::BcryptError> {
        Ok(Self {
            hash: bcrypt::hash(plaintext, cost)?,
        })
    }

    pub fn from_hash(hash: impl Into<String>) -> Self {
        Self { hash: hash.into() }
    }

    pub fn matches(&self, plaintext: &str) -> Result<bool, bcrypt::BcryptError> {
        bcrypt::verify(plaintext, &self.hash)
    }

    pub fn hash(&self) -> &str {
        &self.hash
    }
}

impl User {
    pub fn new(name: String, email: String, password: Password) -> Self {
        Self {
            id: 0,
            created_at: Utc::now(),
            name,
            email,
            password,
            activated: false,
            version: 0,
        }
    }

    pub fn validate(&self, v: &mut Validator) {
        v.check(!self.name.is_empty(), "name", "must be provided");
        v.check(self.name.len() <= 500, "name", "must not be more than 500 bytes long");

        validate_email(v, &self.email);
    }
}

pub fn validate_email(v: &mut Validator, email: &str) {
    v.check(!email.is_empty(), "email", "must be provided");
    v.check(matches(email, &EMAIL_RX), "email", "must be a valid email address");
}

pub fn validate_password_plaintext(v: &mut Validator, password: &str) {
    v.check(!password.is_empty(), "password", "must be provided");
    v.check(password.len() >= 8, "password", "must be at least 8 bytes long");
    v.check(password.len() <= 72, "password", "must not be more than 72 bytes long");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_password_round_trip() {
        let password = Password::set("pa55word", 4).unwrap();
        assert!(password.matches("pa55word").unwrap());
        assert!(!password.matches("wrong-password").unwrap());
        assert!(password.hash().starts_with("$2"));
    }

    #[test]
    fn test_hashed_password_drops_plaintext() {
        let password = Password::set("pa55word", 4).unwrap();
        assert_ne!(password.hash(), "pa55word");
        assert_eq!(password, Password::from_hash(password.hash()));
        assert_eq!(format!("{password:?}"), "Password(..)");
    }

    #[test]
    fn test_user_validation() {
        let user = User::new(String::new(), "nope".to_string(), Password::default());
        let mut v = Validator::new();
        user.validate(&mut v);
        validate_password_plaintext(&mut v, "short");

        assert_eq!(v.errors()["name"], "must be provided");
        assert_eq!(v.errors()["email"], "must be a valid email address");
        assert_eq!(v.errors()["password"], "must be at least 8 bytes long");
    }

    #[test]
    fn test_stored_user_is_valid() {
        let user = User::new(
            "Alice".to_string(),
            "alice@example.com".to_string(),
            Password::from_hash("$2b$04$abcdefghijklmnopqrstuv"),
        );
        let mut v = Validator::new();
        user.validate(&mut v);
        assert!(v.valid());
    }

    #[test]
    fn test_serialization_hides_secrets() {
        let user = User::new(
            "Alice".to_string(),
            "alice@example.com".to_string(),
            Password::from_hash("secret-hash"),
        );
        let json = serde_json::to_string(&user).unwrap();
        assert!(!json.contains("secret-hash"));
        assert!(!json.contains("version"));
        assert!(json.contains("\"activated\":false"));
    }
}
