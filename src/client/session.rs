//! Client session guard.
//!
//! `SessionStore` persists the token pair on disk; `PortfolioClient` wraps
//! reqwest, attaches the bearer header to authenticated calls, and consults
//! the local lockout before submitting credentials. Failed authentication is
//! never retried automatically.

use crate::auth::models::{LoginResponse, RefreshResponse, UserResponse};
use crate::client::lockout::{LockStatus, LoginLockout};
use anyhow::{Context, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Persisted token pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub token: String,
    #[serde(rename = "refreshToken")]
    pub refresh_token: String,
}

/// On-disk session persistence (the localStorage stand-in).
pub struct SessionStore {
    path: PathBuf,
}

impl SessionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn load(&self) -> Result<Option<Session>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let raw = fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read session file {}", self.path.display()))?;
        let session = serde_json::from_str(&raw).context("Corrupt session file")?;
        Ok(Some(session))
    }

    pub fn save(&self, session: &Session) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.path, serde_json::to_string(session)?)
            .with_context(|| format!("Failed to write session file {}", self.path.display()))?;
        Ok(())
    }

    pub fn clear(&self) -> Result<()> {
        if self.path.exists() {
            fs::remove_file(&self.path)
                .with_context(|| format!("Failed to remove session file {}", self.path.display()))?;
        }
        Ok(())
    }
}

/// Errors surfaced to the caller of the client.
#[derive(Debug)]
pub enum ClientError {
    /// Refused locally by the lockout; no request was sent.
    LockedOut { retry_in_secs: i64 },
    /// No stored session for an authenticated call.
    NotAuthenticated,
    /// The server rejected the request.
    Rejected { status: u16, message: String },
    /// Network or protocol failure.
    Transport(String),
    /// Local storage failure.
    Storage(String),
}

impl std::fmt::Display for ClientError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ClientError::LockedOut { retry_in_secs } => {
                write!(f, "Too many failed attempts; locked for {retry_in_secs}s")
            }
            ClientError::NotAuthenticated => write!(f, "Not logged in"),
            ClientError::Rejected { status, message } => write!(f, "{status}: {message}"),
            ClientError::Transport(msg) => write!(f, "Transport error: {msg}"),
            ClientError::Storage(msg) => write!(f, "Storage error: {msg}"),
        }
    }
}

impl std::error::Error for ClientError {}

impl From<anyhow::Error> for ClientError {
    fn from(err: anyhow::Error) -> Self {
        ClientError::Storage(err.to_string())
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        ClientError::Transport(err.to_string())
    }
}

/// API client for the portfolio backend.
pub struct PortfolioClient {
    http: reqwest::Client,
    base_url: String,
    session: SessionStore,
    lockout: LoginLockout,
}

impl PortfolioClient {
    /// `data_dir` holds the session and lockout files.
    pub fn new(base_url: impl Into<String>, data_dir: &Path) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            session: SessionStore::new(data_dir.join("session.json")),
            lockout: LoginLockout::new(data_dir.join("login-lock.json")),
        })
    }

    /// Log in. Refused locally while the lockout is engaged; a server
    /// rejection counts one failed attempt, a success resets the counter.
    pub async fn login(&self, username: &str, password: &str) -> Result<UserResponse, ClientError> {
        let now = Utc::now();
        if let LockStatus::Locked { remaining_secs } = self.lockout.status(now)? {
            return Err(ClientError::LockedOut {
                retry_in_secs: remaining_secs,
            });
        }

        let response = self
            .http
            .post(format!("{}/api/auth/login", self.base_url))
            .json(&json!({ "username": username, "password": password }))
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            let body: LoginResponse = response.json().await?;
            self.session.save(&Session {
                token: body.token,
                refresh_token: body.refresh_token,
            })?;
            self.lockout.reset()?;
            debug!(username, "Login successful, session stored");
            return Ok(body.user);
        }

        self.lockout.record_failure(now)?;
        Err(ClientError::Rejected {
            status: status.as_u16(),
            message: error_message(response).await,
        })
    }

    /// Exchange the stored refresh token for a fresh pair.
    pub async fn refresh(&self) -> Result<(), ClientError> {
        let session = self.session.load()?.ok_or(ClientError::NotAuthenticated)?;

        let response = self
            .http
            .post(format!("{}/api/auth/refresh", self.base_url))
            .json(&json!({ "refreshToken": session.refresh_token }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            // Stale pair is useless; drop it rather than retrying
            self.session.clear()?;
            return Err(ClientError::Rejected {
                status: status.as_u16(),
                message: error_message(response).await,
            });
        }

        let body: RefreshResponse = response.json().await?;
        self.session.save(&Session {
            token: body.token,
            refresh_token: body.refresh_token,
        })?;
        Ok(())
    }

    /// Fetch the caller's identity using the stored access token.
    pub async fn me(&self) -> Result<UserResponse, ClientError> {
        let session = self.session.load()?.ok_or(ClientError::NotAuthenticated)?;

        let response = self
            .http
            .get(format!("{}/api/auth/me", self.base_url))
            .bearer_auth(&session.token)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ClientError::Rejected {
                status: status.as_u16(),
                message: error_message(response).await,
            });
        }

        #[derive(Deserialize)]
        struct MeResponse {
            user: UserResponse,
        }
        let body: MeResponse = response.json().await?;
        Ok(body.user)
    }

    /// Notify the server and drop the local session either way.
    pub async fn logout(&self) -> Result<(), ClientError> {
        if let Some(session) = self.session.load()? {
            let _ = self
                .http
                .post(format!("{}/api/auth/logout", self.base_url))
                .bearer_auth(&session.token)
                .send()
                .await;
        }
        self.session.clear()?;
        Ok(())
    }

    /// Current lockout state, for UI countdowns.
    pub fn lock_status(&self) -> Result<LockStatus, ClientError> {
        Ok(self.lockout.status(Utc::now())?)
    }
}

/// Pull the message out of an error body; the server reports either
/// {"message": ...} or {"error": ...}.
async fn error_message(response: reqwest::Response) -> String {
    match response.json::<serde_json::Value>().await {
        Ok(body) => body
            .get("message")
            .or_else(|| body.get("error"))
            .and_then(|v| v.as_str())
            .unwrap_or("Request failed")
            .to_string(),
        Err(_) => "Request failed".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_session_store_round_trip() {
        let dir = TempDir::new().unwrap();
        let store = SessionStore::new(dir.path().join("session.json"));

        assert!(store.load().unwrap().is_none());

        let session = Session {
            token: "access-token".to_string(),
            refresh_token: "refresh-token".to_string(),
        };
        store.save(&session).unwrap();

        let loaded = store.load().unwrap().unwrap();
        assert_eq!(loaded.token, "access-token");
        assert_eq!(loaded.refresh_token, "refresh-token");

        store.clear().unwrap();
        assert!(store.load().unwrap().is_none());
    }

    #[tokio::test]
    async fn test_login_refused_locally_while_locked() {
        let dir = TempDir::new().unwrap();
        // Unroutable base URL: if the lockout works, no request is ever sent
        let client = PortfolioClient::new("http://127.0.0.1:1", dir.path()).unwrap();

        let now = Utc::now();
        for _ in 0..3 {
            client.lockout.record_failure(now).unwrap();
        }

        match client.login("suyash", "whatever").await {
            Err(ClientError::LockedOut { retry_in_secs }) => {
                assert!(retry_in_secs > 0 && retry_in_secs <= 300);
            }
            other => panic!("Expected local lockout, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_me_requires_stored_session() {
        let dir = TempDir::new().unwrap();
        let client = PortfolioClient::new("http://127.0.0.1:1", dir.path()).unwrap();

        assert!(matches!(
            client.me().await,
            Err(ClientError::NotAuthenticated)
        ));
        assert!(matches!(
            client.refresh().await,
            Err(ClientError::NotAuthenticated)
        ));
    }
}
