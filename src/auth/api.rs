//! Authentication API Endpoints
//! Mission: Registration, login, refresh, identity, and the admin panel

use crate::auth::{
    jwt::TokenService,
    middleware::{extract_user, require_admin, require_auth},
    models::{
        LoginRequest, LoginResponse, RefreshRequest, RefreshResponse, RegisterRequest,
        RegisterResponse, UpdateUserStatusRequest, User, UserResponse, UserRole,
    },
    user_store::UserStore,
};
use crate::config::AuthConfig;
use axum::{
    extract::{Path, Request, State},
    http::StatusCode,
    middleware,
    response::{IntoResponse, Response},
    routing::{get, patch, post},
    Extension, Json, Router,
};
use serde_json::json;
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Shared auth state, injected into handlers and the request gate.
#[derive(Clone)]
pub struct AuthState {
    pub user_store: Arc<UserStore>,
    pub tokens: Arc<TokenService>,
    pub config: Arc<AuthConfig>,
}

impl AuthState {
    pub fn new(
        user_store: Arc<UserStore>,
        tokens: Arc<TokenService>,
        config: Arc<AuthConfig>,
    ) -> Self {
        Self {
            user_store,
            tokens,
            config,
        }
    }

    fn issue_pair(&self, user_id: &Uuid) -> Result<(String, String), AuthApiError> {
        let token = self
            .tokens
            .issue_access_token(user_id)
            .map_err(internal_error)?;
        let refresh_token = self
            .tokens
            .issue_refresh_token(user_id)
            .map_err(internal_error)?;
        Ok((token, refresh_token))
    }
}

/// Public auth routes: register, login, refresh.
pub fn auth_router(state: AuthState) -> Router {
    Router::new()
        .route("/api/auth/register", post(register))
        .route("/api/auth/login", post(login))
        .route("/api/auth/refresh", post(refresh))
        .with_state(state)
}

/// Gated auth routes: me, verify, logout.
pub fn session_router(state: AuthState) -> Router {
    Router::new()
        .route("/api/auth/me", get(me))
        .route("/api/auth/verify", get(verify))
        .route("/api/auth/logout", post(logout))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_auth))
        .with_state(state)
}

/// Admin panel routes, behind both the request gate and the admin gate.
pub fn admin_router(state: AuthState) -> Router {
    Router::new()
        .route("/api/admin/users", get(admin_list_users))
        .route("/api/admin/users/:id/status", patch(admin_update_user_status))
        .route_layer(middleware::from_fn(require_admin))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_auth))
        .with_state(state)
}

/// Register a new account - POST /api/auth/register
///
/// Gated by the shared registration key. Every created account is an admin;
/// the key is the sole gate on account creation.
pub async fn register(
    State(state): State<AuthState>,
    Json(payload): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<RegisterResponse>), AuthApiError> {
    validate_registration(&payload)?;

    if payload.admin_key != state.config.admin_registration_key {
        warn!(username = %payload.username, "Registration rejected: bad admin key");
        return Err(AuthApiError::InvalidAdminKey);
    }

    if state
        .user_store
        .user_exists(&payload.username, &payload.email)
        .map_err(internal_error)?
    {
        return Err(AuthApiError::UserAlreadyExists);
    }

    let user = state
        .user_store
        .create_user(&payload.username, &payload.email, &payload.password, UserRole::Admin)
        .map_err(internal_error)?;

    let (token, refresh_token) = state.issue_pair(&user.id)?;

    info!(username = %user.username, "✅ User registered");

    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse {
            message: "User registered successfully".to_string(),
            user: UserResponse::from_user(&user),
            token,
            refresh_token,
        }),
    ))
}

/// Login - POST /api/auth/login
pub async fn login(
    State(state): State<AuthState>,
    Json(payload): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, AuthApiError> {
    let user = find_login_user(&state, &payload)?.ok_or_else(|| {
        warn!("❌ Failed login attempt: unknown user");
        AuthApiError::InvalidCredentials
    })?;

    // Store-reported lock wins over credential checking
    if user.is_locked {
        warn!(username = %user.username, "Login refused: account locked");
        return Err(AuthApiError::AccountLocked);
    }

    let valid = user.verify_password(&payload.password).map_err(internal_error)?;
    if !valid {
        warn!(username = %user.username, "❌ Failed login attempt");
        return Err(AuthApiError::InvalidCredentials);
    }

    let (token, refresh_token) = state.issue_pair(&user.id)?;

    info!(username = %user.username, role = user.role.as_str(), "✅ Login successful");

    Ok(Json(LoginResponse {
        success: true,
        message: "Login successful".to_string(),
        user: UserResponse::from_user(&user),
        token,
        refresh_token,
    }))
}

fn find_login_user(state: &AuthState, payload: &LoginRequest) -> Result<Option<User>, AuthApiError> {
    if let Some(username) = payload.username.as_deref() {
        state.user_store.get_user_by_username(username).map_err(internal_error)
    } else if let Some(email) = payload.email.as_deref() {
        state.user_store.get_user_by_email(email).map_err(internal_error)
    } else {
        Err(AuthApiError::Validation("Either username or email is required"))
    }
}

/// Refresh - POST /api/auth/refresh
///
/// Stateless: a used refresh token is not revoked and remains valid until
/// natural expiry.
pub async fn refresh(
    State(state): State<AuthState>,
    Json(payload): Json<RefreshRequest>,
) -> Result<Json<RefreshResponse>, AuthApiError> {
    let refresh_token = payload
        .refresh_token
        .ok_or(AuthApiError::MissingRefreshToken)?;

    let claims = state
        .tokens
        .verify_refresh_token(&refresh_token)
        .map_err(|_| AuthApiError::InvalidRefreshToken)?;

    let user_id =
        Uuid::parse_str(&claims.sub).map_err(|_| AuthApiError::InvalidRefreshToken)?;

    let user = state
        .user_store
        .get_user_by_id(&user_id)
        .map_err(internal_error)?
        .filter(|u| u.is_active)
        .ok_or(AuthApiError::InvalidRefreshToken)?;

    let (token, refresh_token) = state.issue_pair(&user.id)?;

    Ok(Json(RefreshResponse {
        token,
        refresh_token,
    }))
}

/// Current identity - GET /api/auth/me
pub async fn me(req: Request) -> Result<Json<serde_json::Value>, AuthApiError> {
    let user = extract_user(&req).ok_or(AuthApiError::Unauthorized)?;
    Ok(Json(json!({ "user": UserResponse::from_user(user) })))
}

/// Token check - GET /api/auth/verify
pub async fn verify(req: Request) -> Result<Json<serde_json::Value>, AuthApiError> {
    let user = extract_user(&req).ok_or(AuthApiError::Unauthorized)?;
    Ok(Json(json!({
        "success": true,
        "user": UserResponse::from_user(user),
    })))
}

/// Logout - POST /api/auth/logout (token removal is client-side)
pub async fn logout() -> Json<serde_json::Value> {
    Json(json!({ "message": "Logout successful" }))
}

/// List users - GET /api/admin/users
pub async fn admin_list_users(
    State(state): State<AuthState>,
) -> Result<Json<Vec<UserResponse>>, AuthApiError> {
    let users = state.user_store.list_users().map_err(internal_error)?;
    Ok(Json(users.iter().map(UserResponse::from_user).collect()))
}

/// Update a user's status flags - PATCH /api/admin/users/:id/status
pub async fn admin_update_user_status(
    State(state): State<AuthState>,
    Path(user_id): Path<String>,
    Extension(caller): Extension<crate::auth::middleware::AuthUser>,
    Json(payload): Json<UpdateUserStatusRequest>,
) -> Result<Json<serde_json::Value>, AuthApiError> {
    let id = Uuid::parse_str(&user_id).map_err(|_| AuthApiError::InvalidUserId)?;

    // Admins cannot deactivate their own account
    if id == caller.0.id && payload.is_active == Some(false) {
        return Err(AuthApiError::CannotDeactivateSelf);
    }

    let user = state
        .user_store
        .set_user_status(&id, payload.is_active, payload.is_locked)
        .map_err(internal_error)?
        .ok_or(AuthApiError::UserNotFound)?;

    Ok(Json(json!({
        "message": "User status updated successfully",
        "user": UserResponse::from_user(&user),
    })))
}

fn validate_registration(payload: &RegisterRequest) -> Result<(), AuthApiError> {
    let username = payload.username.trim();
    if username.len() < 3 || username.len() > 30 {
        return Err(AuthApiError::Validation(
            "Username must be between 3 and 30 characters",
        ));
    }
    if !username
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == ' ')
    {
        return Err(AuthApiError::Validation(
            "Username can only contain letters, numbers, underscores, and spaces",
        ));
    }

    let email = payload.email.trim();
    let valid_email = email.split_once('@').is_some_and(|(local, domain)| {
        !local.is_empty() && domain.contains('.') && !domain.starts_with('.') && !domain.ends_with('.')
    });
    if !valid_email {
        return Err(AuthApiError::Validation("Please provide a valid email"));
    }

    let password = &payload.password;
    let strong = password.len() >= 8
        && password.chars().any(|c| c.is_ascii_lowercase())
        && password.chars().any(|c| c.is_ascii_uppercase())
        && password.chars().any(|c| c.is_ascii_digit())
        && password.chars().any(|c| "@$!%*?&".contains(c));
    if !strong {
        return Err(AuthApiError::Validation(
            "Password must be at least 8 characters with upper, lower, number, and special character",
        ));
    }

    Ok(())
}

fn internal_error(err: anyhow::Error) -> AuthApiError {
    error!(error = %err, "Auth API internal error");
    AuthApiError::InternalError
}

/// Auth API errors
#[derive(Debug)]
pub enum AuthApiError {
    Validation(&'static str),
    InvalidAdminKey,
    UserAlreadyExists,
    InvalidCredentials,
    AccountLocked,
    MissingRefreshToken,
    InvalidRefreshToken,
    Unauthorized,
    UserNotFound,
    InvalidUserId,
    CannotDeactivateSelf,
    InternalError,
}

impl IntoResponse for AuthApiError {
    fn into_response(self) -> Response {
        // Login failures keep the original {success, message} wire shape;
        // everything else reports {error}.
        let (status, body) = match self {
            AuthApiError::Validation(msg) => {
                (StatusCode::BAD_REQUEST, json!({ "error": msg }))
            }
            AuthApiError::InvalidAdminKey => (
                StatusCode::FORBIDDEN,
                json!({ "error": "Invalid admin key. Registration not allowed." }),
            ),
            AuthApiError::UserAlreadyExists => (
                StatusCode::CONFLICT,
                json!({ "error": "User with this email or username already exists" }),
            ),
            AuthApiError::InvalidCredentials => (
                StatusCode::UNAUTHORIZED,
                json!({ "success": false, "message": "Invalid credentials" }),
            ),
            AuthApiError::AccountLocked => (
                StatusCode::LOCKED,
                json!({ "success": false, "message": "Account is temporarily locked" }),
            ),
            AuthApiError::MissingRefreshToken => (
                StatusCode::UNAUTHORIZED,
                json!({ "error": "Refresh token required" }),
            ),
            AuthApiError::InvalidRefreshToken => (
                StatusCode::UNAUTHORIZED,
                json!({ "error": "Invalid refresh token" }),
            ),
            AuthApiError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                json!({ "error": "Authentication required" }),
            ),
            AuthApiError::UserNotFound => {
                (StatusCode::NOT_FOUND, json!({ "error": "User not found" }))
            }
            AuthApiError::InvalidUserId => (
                StatusCode::BAD_REQUEST,
                json!({ "error": "Invalid user ID format" }),
            ),
            AuthApiError::CannotDeactivateSelf => (
                StatusCode::BAD_REQUEST,
                json!({ "error": "Cannot deactivate your own account" }),
            ),
            AuthApiError::InternalError => (
                StatusCode::INTERNAL_SERVER_ERROR,
                json!({ "error": "Internal server error" }),
            ),
        };

        (status, Json(body)).into_response()
    }
}
