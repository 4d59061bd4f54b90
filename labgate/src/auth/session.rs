//! JWT session token creation and verification.

use chrono::Utc;
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

use crate::{
    api::models::users::{CurrentUser, Role},
    config::Config,
    errors::Error,
    types::UserId,
};

/// Which of the two session cookies a token belongs in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Access,
    Refresh,
}

/// JWT session claims
#[derive(Debug, Serialize, Deserialize)]
pub struct SessionClaims {
    pub sub: UserId,     // Subject (user ID)
    pub email: String,   // User email
    pub name: String,    // Full name
    pub role: Role,      // Portal role
    pub kind: TokenKind, // Access or refresh
    pub jti: Uuid,       // Token ID, unique per issue
    pub exp: i64,        // Expiration time
    pub iat: i64,        // Issued at
}

impl SessionClaims {
    /// Create new session claims for a user
    pub fn new(user: &CurrentUser, kind: TokenKind, config: &Config) -> Self {
        let now = Utc::now();
        let exp = now + lifetime(kind, config);

        Self {
            sub: user.id,
            email: user.email.clone(),
            name: user.full_name.clone(),
            role: user.role,
            kind,
            jti: Uuid::new_v4(),
            exp: exp.timestamp(),
            iat: now.timestamp(),
        }
    }
}

impl From<SessionClaims> for CurrentUser {
    fn from(claims: SessionClaims) -> Self {
        Self {
            id: claims.sub,
            email: claims.email,
            full_name: claims.name,
            role: claims.role,
        }
    }
}

/// How long a token of `kind` stays valid.
pub fn lifetime(kind: TokenKind, config: &Config) -> Duration {
    match kind {
        TokenKind::Access => config.auth.security.jwt_expiry,
        TokenKind::Refresh => config.auth.security.refresh_expiry,
    }
}

fn secret(config: &Config) -> Result<&str, Error> {
    config.secret_key.as_deref().ok_or_else(|| Error::Internal {
        operation: "JWT sessions: secret_key is required".to_string(),
    })
}

fn create_token(user: &CurrentUser, kind: TokenKind, config: &Config) -> Result<String, Error> {
    let claims = SessionClaims::new(user, kind, config);
    let key = EncodingKey::from_secret(secret(config)?.as_bytes());
    encode(&Header::default(), &claims, &key).map_err(|e| Error::Internal {
        operation: format!("create JWT: {e}"),
    })
}

/// Create the short-lived token carried on every request
pub fn create_access_token(user: &CurrentUser, config: &Config) -> Result<String, Error> {
    create_token(user, TokenKind::Access, config)
}

/// Create the long-lived token redeemed at `/authentication/refresh`
pub fn create_refresh_token(user: &CurrentUser, config: &Config) -> Result<String, Error> {
    create_token(user, TokenKind::Refresh, config)
}

/// Verify and decode a JWT session token of the expected kind
pub fn verify_token(token: &str, expected: TokenKind, config: &Config) -> Result<CurrentUser, Error> {
    let key = DecodingKey::from_secret(secret(config)?.as_bytes());
    let validation = Validation::default();

    let token_data = decode::<SessionClaims>(token, &key, &validation).map_err(|e| match e.kind() {
        // Client errors (401) - malformed tokens, invalid claims, expired tokens
        jsonwebtoken::errors::ErrorKind::InvalidToken
        | jsonwebtoken::errors::ErrorKind::InvalidSignature
        | jsonwebtoken::errors::ErrorKind::ExpiredSignature
        | jsonwebtoken::errors::ErrorKind::MissingRequiredClaim(_)
        | jsonwebtoken::errors::ErrorKind::InvalidIssuer
        | jsonwebtoken::errors::ErrorKind::InvalidAudience
        | jsonwebtoken::errors::ErrorKind::InvalidSubject
        | jsonwebtoken::errors::ErrorKind::ImmatureSignature
        | jsonwebtoken::errors::ErrorKind::Base64(_)
        | jsonwebtoken::errors::ErrorKind::Json(_)
        | jsonwebtoken::errors::ErrorKind::Utf8(_)
        | jsonwebtoken::errors::ErrorKind::InvalidAlgorithm => Error::Unauthenticated { message: None },

        // Server errors (500) - key issues, internal failures
        jsonwebtoken::errors::ErrorKind::InvalidEcdsaKey
        | jsonwebtoken::errors::ErrorKind::InvalidRsaKey(_)
        | jsonwebtoken::errors::ErrorKind::RsaFailedSigning
        | jsonwebtoken::errors::ErrorKind::InvalidAlgorithmName
        | jsonwebtoken::errors::ErrorKind::InvalidKeyFormat
        | jsonwebtoken::errors::ErrorKind::MissingAlgorithm
        | jsonwebtoken::errors::ErrorKind::Crypto(_) => Error::Internal {
            operation: format!("JWT verification: {e}"),
        },

        _ => Error::Internal {
            operation: format!("JWT verification (unknown error): {e}"),
        },
    })?;

    // A refresh token must never pass as an access token, or the other way round
    if token_data.claims.kind != expected {
        return Err(Error::Unauthenticated { message: None });
    }

    Ok(CurrentUser::from(token_data.claims))
}
