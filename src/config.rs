//! Application configuration.
//!
//! Everything is read from the process environment exactly once at startup
//! and carried around in plain structs. The token service and the request
//! gate receive their settings by injection; nothing consults the
//! environment after boot.

use anyhow::{Context, Result};
use std::env;
use std::time::Duration;

/// Top-level configuration assembled at startup.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Address the API server binds to.
    pub bind_addr: String,
    /// Path to the SQLite credential store.
    pub database_path: String,
    pub auth: AuthConfig,
    pub rate_limit: RateLimitSettings,
}

/// Settings for the token service and registration gate.
#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// Secret for signing access tokens.
    pub access_secret: String,
    /// Separate secret for refresh tokens.
    pub refresh_secret: String,
    /// Access token lifetime.
    pub access_ttl: Duration,
    /// Refresh token lifetime.
    pub refresh_ttl: Duration,
    /// Fixed issuer claim embedded in every token.
    pub issuer: String,
    /// Fixed audience claim embedded in every token.
    pub audience: String,
    /// Shared out-of-band key that gates account registration.
    pub admin_registration_key: String,
}

/// Request-per-window budgets for the two rate limit profiles.
#[derive(Debug, Clone)]
pub struct RateLimitSettings {
    /// General API budget per IP.
    pub general_max: u32,
    /// Stricter budget for /api/auth routes per IP.
    pub auth_max: u32,
    /// Shared window for both profiles.
    pub window: Duration,
}

impl AppConfig {
    /// Build the configuration from the environment.
    ///
    /// Secrets fall back to development values so the server boots without a
    /// .env file; the admin registration key has no fallback because an empty
    /// key would open registration to anyone.
    pub fn from_env() -> Result<Self> {
        let bind_addr = env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:4000".to_string());
        let database_path =
            env::var("AUTH_DB_PATH").unwrap_or_else(|_| "portfolio_auth.db".to_string());

        let access_secret = env::var("JWT_SECRET")
            .unwrap_or_else(|_| "dev-secret-change-in-production-minimum-32-characters".to_string());
        let refresh_secret = env::var("JWT_REFRESH_SECRET")
            .unwrap_or_else(|_| "dev-refresh-secret-change-in-production-as-well".to_string());

        let access_ttl_hours = parse_env_u64("JWT_EXPIRES_IN_HOURS", 24)?;
        let refresh_ttl_days = parse_env_u64("JWT_REFRESH_EXPIRES_IN_DAYS", 7)?;

        let admin_registration_key = env::var("ADMIN_REGISTRATION_KEY")
            .context("ADMIN_REGISTRATION_KEY must be set (registration gate)")?;

        let general_max = parse_env_u64("RATE_LIMIT_MAX_REQUESTS", 100)? as u32;
        let auth_max = parse_env_u64("RATE_LIMIT_AUTH_MAX_REQUESTS", 5)? as u32;
        let window_secs = parse_env_u64("RATE_LIMIT_WINDOW_SECS", 15 * 60)?;

        Ok(Self {
            bind_addr,
            database_path,
            auth: AuthConfig {
                access_secret,
                refresh_secret,
                access_ttl: Duration::from_secs(access_ttl_hours * 3600),
                refresh_ttl: Duration::from_secs(refresh_ttl_days * 24 * 3600),
                issuer: "portfolio-backend".to_string(),
                audience: "portfolio-frontend".to_string(),
                admin_registration_key,
            },
            rate_limit: RateLimitSettings {
                general_max,
                auth_max,
                window: Duration::from_secs(window_secs),
            },
        })
    }
}

fn parse_env_u64(key: &str, default: u64) -> Result<u64> {
    match env::var(key) {
        Ok(raw) => raw
            .parse::<u64>()
            .with_context(|| format!("Invalid {key}: {raw}")),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
impl AuthConfig {
    /// Fixture config with short, deterministic settings for tests.
    pub fn fixture() -> Self {
        Self {
            access_secret: "test-access-secret-0123456789abcdef".to_string(),
            refresh_secret: "test-refresh-secret-fedcba9876543210".to_string(),
            access_ttl: Duration::from_secs(24 * 3600),
            refresh_ttl: Duration::from_secs(7 * 24 * 3600),
            issuer: "portfolio-backend".to_string(),
            audience: "portfolio-frontend".to_string(),
            admin_registration_key: "fixture-admin-key".to_string(),
        }
    }
}
