//! Credential service: password hashing and identity tokens.
//!
//! Passwords are hashed with Argon2id. Identity tokens are HS256 JWTs carrying
//! the user id, role and shop assignment; decoding one is all that is needed
//! to authorize a request, with no store access.

use std::collections::BTreeSet;
use std::sync::LazyLock;

use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use chrono::{Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use atelier_core::{Role, ShopId, UserId};

use crate::models::User;

/// Minimum password length.
pub const MIN_PASSWORD_LENGTH: usize = 8;

/// Stand-in hash for logins that name no user. `None` if hashing failed at
/// first use, in which case such logins skip the verification.
static UNKNOWN_USER_HASH: LazyLock<Option<String>> = LazyLock::new(|| {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(b"no account has this password", &salt)
        .map(|hash| hash.to_string())
        .ok()
});

/// The caller of a request, as decoded from their token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user_id: UserId,
    pub role: Role,
    /// Shop assignment at the time the token was issued.
    pub shops: BTreeSet<ShopId>,
}

impl From<&User> for Identity {
    fn from(user: &User) -> Self {
        Self {
            user_id: user.id,
            role: user.role,
            shops: user.shops.clone(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    sub: i32,
    role: Role,
    shops: BTreeSet<ShopId>,
    iat: i64,
    exp: i64,
}

#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("password must be at least {MIN_PASSWORD_LENGTH} characters")]
    WeakPassword,

    #[error("password hashing error")]
    PasswordHash,

    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("invalid token: {0}")]
    InvalidToken(#[from] jsonwebtoken::errors::Error),
}

/// Hashes passwords and issues/decodes identity tokens.
#[derive(Clone)]
pub struct CredentialService {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl: Duration,
}

impl std::fmt::Debug for CredentialService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialService")
            .field("keys", &"[REDACTED]")
            .field("ttl", &self.ttl)
            .finish()
    }
}

impl CredentialService {
    #[must_use]
    pub fn new(secret: &SecretString, ttl: Duration) -> Self {
        let bytes = secret.expose_secret().as_bytes();
        Self {
            encoding: EncodingKey::from_secret(bytes),
            decoding: DecodingKey::from_secret(bytes),
            ttl,
        }
    }

    /// Hash a password using Argon2id.
    ///
    /// # Errors
    ///
    /// Returns `CredentialError::WeakPassword` if the password is too short.
    pub fn hash_password(password: &str) -> Result<String, CredentialError> {
        if password.chars().count() < MIN_PASSWORD_LENGTH {
            return Err(CredentialError::WeakPassword);
        }
        let salt = SaltString::generate(&mut OsRng);

        Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|_| CredentialError::PasswordHash)
    }

    /// Verify a password against a stored hash.
    ///
    /// # Errors
    ///
    /// Returns `CredentialError::InvalidCredentials` on mismatch or an unreadable hash.
    pub fn verify_password(password: &str, hash: &str) -> Result<(), CredentialError> {
        let parsed_hash =
            PasswordHash::new(hash).map_err(|_| CredentialError::InvalidCredentials)?;

        Argon2::default()
            .verify_password(password.as_bytes(), &parsed_hash)
            .map_err(|_| CredentialError::InvalidCredentials)
    }

    /// Run a verification that cannot succeed, so a login for an unknown
    /// username takes as long as one with a wrong password.
    pub fn verify_unknown_user(password: &str) {
        if let Some(hash) = UNKNOWN_USER_HASH.as_deref() {
            let _ = Self::verify_password(password, hash);
        }
    }

    /// Issue a token for `identity`, valid for the configured lifetime.
    ///
    /// # Errors
    ///
    /// Returns `CredentialError::InvalidToken` if encoding fails.
    pub fn issue(&self, identity: &Identity) -> Result<String, CredentialError> {
        let now = Utc::now();
        let claims = Claims {
            sub: identity.user_id.as_i32(),
            role: identity.role,
            shops: identity.shops.clone(),
            iat: now.timestamp(),
            exp: (now + self.ttl).timestamp(),
        };
        Ok(jsonwebtoken::encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &self.encoding,
        )?)
    }

    /// Decode and verify a token.
    ///
    /// # Errors
    ///
    /// Returns `CredentialError::InvalidToken` if the token is malformed,
    /// signed with another key, or expired.
    pub fn decode(&self, token: &str) -> Result<Identity, CredentialError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        let data = jsonwebtoken::decode::<Claims>(token, &self.decoding, &validation)?;

        Ok(Identity {
            user_id: UserId::new(data.claims.sub),
            role: data.claims.role,
            shops: data.claims.shops,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn service(ttl: Duration) -> CredentialService {
        CredentialService::new(&SecretString::from("k7$Qp2!vX9mZ#rT4wB8nL1@cF6hJ3sD0"), ttl)
    }

    fn manager() -> Identity {
        Identity {
            user_id: UserId::new(4),
            role: Role::Manager,
            shops: BTreeSet::from([ShopId::parse("S1").unwrap(), ShopId::parse("S2").unwrap()]),
        }
    }

    #[test]
    fn test_password_roundtrip() {
        let hash = CredentialService::hash_password("correct horse").unwrap();
        assert!(CredentialService::verify_password("correct horse", &hash).is_ok());
        assert!(matches!(
            CredentialService::verify_password("wrong horse", &hash),
            Err(CredentialError::InvalidCredentials)
        ));
    }

    #[test]
    fn test_short_password_rejected() {
        assert!(matches!(
            CredentialService::hash_password("short"),
            Err(CredentialError::WeakPassword)
        ));
    }

    #[test]
    fn test_garbage_hash_is_invalid_credentials() {
        assert!(matches!(
            CredentialService::verify_password("whatever", "not-a-hash"),
            Err(CredentialError::InvalidCredentials)
        ));
    }

    #[test]
    fn test_unknown_user_hash_is_argon2() {
        let hash = UNKNOWN_USER_HASH.as_deref().unwrap();
        assert!(hash.starts_with("$argon2id$"));
        assert!(CredentialService::verify_password("no account has", hash).is_err());
    }

    #[test]
    fn test_token_carries_identity() {
        let creds = service(Duration::hours(1));
        let token = creds.issue(&manager()).unwrap();
        assert_eq!(creds.decode(&token).unwrap(), manager());
    }

    #[test]
    fn test_expired_token_rejected() {
        let creds = service(Duration::hours(-1));
        let token = creds.issue(&manager()).unwrap();
        assert!(creds.decode(&token).is_err());
    }

    #[test]
    fn test_token_from_other_key_rejected() {
        let other = CredentialService::new(
            &SecretString::from("Zr8#tY2@pL5!wQ9$mK3^vB7&nC1*xH4%"),
            Duration::hours(1),
        );
        let token = other.issue(&manager()).unwrap();
        assert!(service(Duration::hours(1)).decode(&token).is_err());
        assert!(service(Duration::hours(1)).decode("not.a.token").is_err());
    }
}
