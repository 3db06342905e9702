//! Session token issuing and verification
//!
//! Tokens are HS256 JWTs signed with a secret loaded once at startup. They are
//! not stored anywhere, so there is no way to revoke one before it expires.
//! Key rotation would need a key id in the header and a verifier that accepts
//! several keys; neither exists yet.

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};

use crate::{
    config::AuthConfig,
    error::{AppError, AppResult},
    models::user::{Role, UserClaims},
};

const MIN_SECRET_LEN: usize = 16;

/// A freshly issued token and its expiry
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct TokenService {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
    lifetime: Duration,
}

impl TokenService {
    /// Build the service from configuration. A missing or short secret is a
    /// startup error, never a per-request one.
    pub fn new(config: &AuthConfig) -> AppResult<Self> {
        if config.jwt_secret.len() < MIN_SECRET_LEN {
            return Err(AppError::Internal(format!(
                "auth.jwt_secret must be at least {} bytes",
                MIN_SECRET_LEN
            )));
        }
        if config.jwt_expiration_hours == 0 {
            return Err(AppError::Internal(
                "auth.jwt_expiration_hours must be positive".to_string(),
            ));
        }

        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;

        Ok(Self {
            encoding: EncodingKey::from_secret(config.jwt_secret.as_bytes()),
            decoding: DecodingKey::from_secret(config.jwt_secret.as_bytes()),
            validation,
            lifetime: Duration::hours(config.jwt_expiration_hours as i64),
        })
    }

    /// Issue a token for an identity
    pub fn issue(&self, user_id: i32, role: Role) -> AppResult<IssuedToken> {
        let now = Utc::now();
        let expires_at = now + self.lifetime;

        let claims = UserClaims {
            sub: user_id.to_string(),
            user_id,
            role,
            iat: now.timestamp(),
            exp: expires_at.timestamp(),
        };

        let token = self.sign(&claims)?;
        Ok(IssuedToken { token, expires_at })
    }

    /// Verify a token. Every failure (malformed, bad signature, expired) maps
    /// to the same `InvalidToken` error.
    pub fn verify(&self, token: &str) -> AppResult<UserClaims> {
        let data = decode::<UserClaims>(token, &self.decoding, &self.validation).map_err(|e| {
            tracing::debug!("Rejected token: {}", e);
            AppError::InvalidToken
        })?;

        if data.claims.sub != data.claims.user_id.to_string() {
            tracing::debug!("Rejected token: subject does not match user id");
            return Err(AppError::InvalidToken);
        }
        Ok(data.claims)
    }

    fn sign(&self, claims: &UserClaims) -> AppResult<String> {
        encode(&Header::new(Algorithm::HS256), claims, &self.encoding)
            .map_err(|e| AppError::Internal(format!("Failed to create token: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(secret: &str) -> AuthConfig {
        AuthConfig {
            jwt_secret: secret.to_string(),
            ..AuthConfig::default()
        }
    }

    fn service() -> TokenService {
        TokenService::new(&config("a-test-secret-of-enough-length")).unwrap()
    }

    #[test]
    fn issued_token_verifies_to_same_identity() {
        let tokens = service();
        let issued = tokens.issue(42, Role::Admin).unwrap();

        let claims = tokens.verify(&issued.token).unwrap();
        assert_eq!(claims.user_id, 42);
        assert_eq!(claims.role, Role::Admin);
        assert!(issued.expires_at > Utc::now());
    }

    #[test]
    fn short_secret_is_rejected_at_startup() {
        assert!(TokenService::new(&config("short")).is_err());
    }

    #[test]
    fn expired_and_forged_tokens_are_indistinguishable() {
        let tokens = service();
        let now = Utc::now().timestamp();
        let expired = tokens
            .sign(&UserClaims {
                sub: "1".into(),
                user_id: 1,
                role: Role::User,
                iat: now - 7200,
                exp: now - 3600,
            })
            .unwrap();

        let other = TokenService::new(&config("another-secret-of-enough-length")).unwrap();
        let forged = other.issue(1, Role::Admin).unwrap().token;

        let expired_err = tokens.verify(&expired).unwrap_err();
        let forged_err = tokens.verify(&forged).unwrap_err();
        let garbage_err = tokens.verify("not.a.token").unwrap_err();

        assert!(matches!(expired_err, AppError::InvalidToken));
        assert!(matches!(forged_err, AppError::InvalidToken));
        assert!(matches!(garbage_err, AppError::InvalidToken));
        assert_eq!(expired_err.to_string(), forged_err.to_string());
    }

    #[test]
    fn token_just_past_expiry_is_rejected_without_leeway() {
        let tokens = service();
        let now = Utc::now().timestamp();
        let token = tokens
            .sign(&UserClaims {
                sub: "1".into(),
                user_id: 1,
                role: Role::User,
                iat: now - 60,
                exp: now - 1,
            })
            .unwrap();
        assert!(tokens.verify(&token).is_err());
    }

    #[test]
    fn mismatched_subject_is_rejected() {
        let tokens = service();
        let now = Utc::now().timestamp();
        let token = tokens
            .sign(&UserClaims {
                sub: "2".into(),
                user_id: 1,
                role: Role::User,
                iat: now,
                exp: now + 60,
            })
            .unwrap();
        assert!(tokens.verify(&token).is_err());
    }
}
