//! Authentication Models
//! Mission: Define user and authentication data structures

use anyhow::{Context, Result};
use bcrypt::verify;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// User account
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String, // bcrypt hash - never serialize
    pub role: UserRole,
    pub is_active: bool,
    pub is_locked: bool,
    pub created_at: String,
}

impl User {
    /// Check a plaintext password against the stored bcrypt hash.
    pub fn verify_password(&self, password: &str) -> Result<bool> {
        verify(password, &self.password_hash).context("Failed to verify password")
    }
}

/// User roles
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum UserRole {
    #[serde(rename = "admin")]
    Admin, // Full access including the admin panel
    #[serde(rename = "viewer")]
    Viewer, // Authenticated, no admin routes
}

impl UserRole {
    pub fn as_str(&self) -> &str {
        match self {
            UserRole::Admin => "admin",
            UserRole::Viewer => "viewer",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "admin" => Some(UserRole::Admin),
            "viewer" => Some(UserRole::Viewer),
            _ => None,
        }
    }
}

/// Access token claims
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessClaims {
    pub sub: String, // subject (user_id)
    pub iss: String,
    pub aud: String,
    pub iat: i64,
    pub exp: i64,
}

/// Refresh token claims. `type` is optional on decode so a well-signed token
/// without it is reported as the wrong kind rather than as malformed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshClaims {
    pub sub: String,
    #[serde(rename = "type", default)]
    pub token_type: Option<String>,
    pub iss: String,
    pub aud: String,
    pub iat: i64,
    pub exp: i64,
}

/// Registration request body
#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub password: String,
    #[serde(rename = "adminKey")]
    pub admin_key: String,
}

/// Login request body: either username or email plus password
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: Option<String>,
    pub email: Option<String>,
    pub password: String,
}

/// Login response
#[derive(Debug, Serialize, Deserialize)]
pub struct LoginResponse {
    pub success: bool,
    pub message: String,
    pub user: UserResponse,
    pub token: String,
    #[serde(rename = "refreshToken")]
    pub refresh_token: String,
}

/// Registration response
#[derive(Debug, Serialize, Deserialize)]
pub struct RegisterResponse {
    pub message: String,
    pub user: UserResponse,
    pub token: String,
    #[serde(rename = "refreshToken")]
    pub refresh_token: String,
}

/// Refresh request body
#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    #[serde(rename = "refreshToken")]
    pub refresh_token: Option<String>,
}

/// Refresh response: a fresh token pair
#[derive(Debug, Serialize, Deserialize)]
pub struct RefreshResponse {
    pub token: String,
    #[serde(rename = "refreshToken")]
    pub refresh_token: String,
}

/// Admin status update body
#[derive(Debug, Deserialize)]
pub struct UpdateUserStatusRequest {
    #[serde(rename = "isActive")]
    pub is_active: Option<bool>,
    #[serde(rename = "isLocked")]
    pub is_locked: Option<bool>,
}

/// User response (sanitized)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserResponse {
    pub id: String,
    pub username: String,
    pub email: String,
    pub role: UserRole,
    #[serde(rename = "isActive")]
    pub is_active: bool,
    #[serde(rename = "isLocked")]
    pub is_locked: bool,
    #[serde(rename = "createdAt")]
    pub created_at: String,
}

impl UserResponse {
    pub fn from_user(user: &User) -> Self {
        Self {
            id: user.id.to_string(),
            username: user.username.clone(),
            email: user.email.clone(),
            role: user.role.clone(),
            is_active: user.is_active,
            is_locked: user.is_locked,
            created_at: user.created_at.clone(),
        }
    }
}
