//! JWT Token Service
//! Mission: Issue and verify the access/refresh token pair

use crate::auth::models::{AccessClaims, RefreshClaims};
use crate::config::AuthConfig;
use anyhow::{Context, Result};
use chrono::Utc;
use jsonwebtoken::{
    decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

/// Expected failures when verifying a token. Callers branch on the kind,
/// never on message strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenError {
    /// Signature check failed, claims undecodable, or issuer/audience mismatch.
    Malformed,
    /// Well-formed and well-signed, but past its expiry.
    Expired,
    /// Well-signed refresh-secret token whose `type` claim is not "refresh".
    WrongType,
}

impl std::fmt::Display for TokenError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TokenError::Malformed => write!(f, "Invalid token"),
            TokenError::Expired => write!(f, "Token expired"),
            TokenError::WrongType => write!(f, "Invalid token type"),
        }
    }
}

impl std::error::Error for TokenError {}

/// Issues and verifies the signed token pair. Pure computation over the
/// injected config and the clock; no shared state.
pub struct TokenService {
    config: Arc<AuthConfig>,
}

impl TokenService {
    pub fn new(config: Arc<AuthConfig>) -> Self {
        Self { config }
    }

    /// Generate a short-lived access token for a user.
    pub fn issue_access_token(&self, user_id: &Uuid) -> Result<String> {
        let now = Utc::now();
        let claims = AccessClaims {
            sub: user_id.to_string(),
            iss: self.config.issuer.clone(),
            aud: self.config.audience.clone(),
            iat: now.timestamp(),
            exp: now.timestamp() + self.config.access_ttl.as_secs() as i64,
        };

        debug!(user_id = %user_id, "Issuing access token");

        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.config.access_secret.as_bytes()),
        )
        .context("Failed to sign access token")
    }

    /// Generate a long-lived refresh token, tagged with `type: "refresh"`.
    pub fn issue_refresh_token(&self, user_id: &Uuid) -> Result<String> {
        let now = Utc::now();
        let claims = RefreshClaims {
            sub: user_id.to_string(),
            token_type: Some("refresh".to_string()),
            iss: self.config.issuer.clone(),
            aud: self.config.audience.clone(),
            iat: now.timestamp(),
            exp: now.timestamp() + self.config.refresh_ttl.as_secs() as i64,
        };

        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.config.refresh_secret.as_bytes()),
        )
        .context("Failed to sign refresh token")
    }

    /// Verify an access token: signature, expiry (zero leeway), issuer and
    /// audience must all hold.
    pub fn verify_access_token(&self, token: &str) -> Result<AccessClaims, TokenError> {
        let decoded = decode::<AccessClaims>(
            token,
            &DecodingKey::from_secret(self.config.access_secret.as_bytes()),
            &self.validation(),
        )
        .map_err(classify)?;

        Ok(decoded.claims)
    }

    /// Verify a refresh token. Fails with `WrongType` when the `type` claim
    /// is absent or not "refresh". Does not consult the credential store;
    /// that is the caller's job.
    pub fn verify_refresh_token(&self, token: &str) -> Result<RefreshClaims, TokenError> {
        let decoded = decode::<RefreshClaims>(
            token,
            &DecodingKey::from_secret(self.config.refresh_secret.as_bytes()),
            &self.validation(),
        )
        .map_err(classify)?;

        if decoded.claims.token_type.as_deref() != Some("refresh") {
            return Err(TokenError::WrongType);
        }

        Ok(decoded.claims)
    }

    fn validation(&self) -> Validation {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(std::slice::from_ref(&self.config.issuer));
        validation.set_audience(std::slice::from_ref(&self.config.audience));
        // No clock-skew tolerance: a token expiring at T is rejected at T+1s.
        validation.leeway = 0;
        validation
    }
}

fn classify(err: jsonwebtoken::errors::Error) -> TokenError {
    match err.kind() {
        ErrorKind::ExpiredSignature => TokenError::Expired,
        _ => TokenError::Malformed,
    }
}
