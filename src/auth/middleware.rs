//! Request Gate
//! Mission: Validate bearer tokens and attach the caller's identity

use crate::auth::{
    api::AuthState,
    jwt::TokenError,
    models::{User, UserRole},
};
use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use tracing::error;
use uuid::Uuid;

/// The authenticated identity attached to the request after the gate passes.
#[derive(Debug, Clone)]
pub struct AuthUser(pub User);

/// Rejections produced by the gate, in evaluation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthError {
    MissingToken,
    MalformedToken,
    ExpiredToken,
    UnknownSubject,
    Deactivated,
    Locked,
    Forbidden,
    Internal,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AuthError::MissingToken => {
                (StatusCode::UNAUTHORIZED, "Access denied. No token provided.")
            }
            AuthError::MalformedToken => (StatusCode::UNAUTHORIZED, "Invalid token."),
            AuthError::ExpiredToken => (StatusCode::UNAUTHORIZED, "Token expired."),
            AuthError::UnknownSubject => {
                (StatusCode::UNAUTHORIZED, "Invalid token. User not found.")
            }
            AuthError::Deactivated => (StatusCode::UNAUTHORIZED, "Account is deactivated."),
            AuthError::Locked => (StatusCode::LOCKED, "Account is temporarily locked."),
            AuthError::Forbidden => (
                StatusCode::FORBIDDEN,
                "Access denied. Admin privileges required.",
            ),
            AuthError::Internal => (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error."),
        };

        (status, Json(json!({ "error": message }))).into_response()
    }
}

/// Gate middleware for protected routes. Extracts the bearer token, verifies
/// it, resolves the subject against the credential store, checks the status
/// flags, and attaches the identity to the request.
pub async fn require_auth(
    State(state): State<AuthState>,
    mut req: Request,
    next: Next,
) -> Result<Response, AuthError> {
    let user = authenticate(&state, &req)?;
    req.extensions_mut().insert(AuthUser(user));
    Ok(next.run(req).await)
}

/// Secondary gate for admin routes. Runs behind `require_auth`.
pub async fn require_admin(req: Request, next: Next) -> Result<Response, AuthError> {
    let user = req
        .extensions()
        .get::<AuthUser>()
        .ok_or(AuthError::MissingToken)?;

    if user.0.role != UserRole::Admin {
        return Err(AuthError::Forbidden);
    }

    Ok(next.run(req).await)
}

/// Optional variant: same checks, but any failure degrades to an anonymous
/// request instead of rejecting.
pub async fn optional_auth(State(state): State<AuthState>, mut req: Request, next: Next) -> Response {
    if let Ok(user) = authenticate(&state, &req) {
        req.extensions_mut().insert(AuthUser(user));
    }
    next.run(req).await
}

fn authenticate(state: &AuthState, req: &Request) -> Result<User, AuthError> {
    let token = bearer_token(req).ok_or(AuthError::MissingToken)?;

    let claims = state.tokens.verify_access_token(token).map_err(|e| match e {
        TokenError::Expired => AuthError::ExpiredToken,
        _ => AuthError::MalformedToken,
    })?;

    // The subject is always a UUID we minted; anything else is a forged claim set
    let user_id = Uuid::parse_str(&claims.sub).map_err(|_| AuthError::MalformedToken)?;

    let user = state
        .user_store
        .get_user_by_id(&user_id)
        .map_err(|e| {
            error!(error = %e, "Credential store lookup failed in request gate");
            AuthError::Internal
        })?
        .ok_or(AuthError::UnknownSubject)?;

    if !user.is_active {
        return Err(AuthError::Deactivated);
    }
    if user.is_locked {
        return Err(AuthError::Locked);
    }

    Ok(user)
}

fn bearer_token(req: &Request) -> Option<&str> {
    req.headers()
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .and_then(|s| s.strip_prefix("Bearer "))
}

/// Extract the authenticated user from a request (after `require_auth`).
pub fn extract_user(req: &Request) -> Option<&User> {
    req.extensions().get::<AuthUser>().map(|u| &u.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::api::AuthState;
    use crate::auth::jwt::TokenService;
    use crate::auth::user_store::UserStore;
    use crate::config::AuthConfig;
    use axum::{body::Body, http::Request as HttpRequest, middleware, routing::get, Router};
    use jsonwebtoken::{encode, EncodingKey, Header};
    use std::sync::Arc;
    use tempfile::NamedTempFile;
    use tower::ServiceExt;

    fn test_state() -> (AuthState, NamedTempFile) {
        let temp_file = NamedTempFile::new().unwrap();
        let store = UserStore::new(temp_file.path().to_str().unwrap()).unwrap();
        let config = Arc::new(AuthConfig::fixture());
        let state = AuthState::new(
            Arc::new(store),
            Arc::new(TokenService::new(config.clone())),
            config,
        );
        (state, temp_file)
    }

    async fn whoami(req: Request) -> String {
        extract_user(&req)
            .map(|u| u.username.clone())
            .unwrap_or_else(|| "anonymous".to_string())
    }

    fn protected_app(state: AuthState) -> Router {
        Router::new()
            .route("/protected", get(whoami))
            .route_layer(middleware::from_fn_with_state(state.clone(), require_auth))
            .with_state(state)
    }

    fn admin_app(state: AuthState) -> Router {
        Router::new()
            .route("/admin", get(whoami))
            .route_layer(middleware::from_fn(require_admin))
            .route_layer(middleware::from_fn_with_state(state.clone(), require_auth))
            .with_state(state)
    }

    fn optional_app(state: AuthState) -> Router {
        Router::new()
            .route("/maybe", get(whoami))
            .route_layer(middleware::from_fn_with_state(state.clone(), optional_auth))
            .with_state(state)
    }

    fn get_with_token(uri: &str, token: Option<&str>) -> HttpRequest<Body> {
        let mut builder = HttpRequest::builder().uri(uri);
        if let Some(t) = token {
            builder = builder.header("Authorization", format!("Bearer {t}"));
        }
        builder.body(Body::empty()).unwrap()
    }

    async fn body_text(response: Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), 64 * 1024)
            .await
            .unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_missing_token_rejected() {
        let (state, _temp) = test_state();
        let response = protected_app(state)
            .oneshot(get_with_token("/protected", None))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert!(body_text(response).await.contains("No token provided"));
    }

    #[tokio::test]
    async fn test_garbage_token_rejected_as_malformed() {
        let (state, _temp) = test_state();
        let response = protected_app(state)
            .oneshot(get_with_token("/protected", Some("garbage.token.here")))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert!(body_text(response).await.contains("Invalid token."));
    }

    #[tokio::test]
    async fn test_expired_token_rejected_with_distinct_message() {
        let (state, _temp) = test_state();
        let config = AuthConfig::fixture();
        let now = chrono::Utc::now().timestamp();

        let claims = crate::auth::models::AccessClaims {
            sub: Uuid::new_v4().to_string(),
            iss: config.issuer.clone(),
            aud: config.audience.clone(),
            iat: now - 100,
            exp: now - 1,
        };
        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(config.access_secret.as_bytes()),
        )
        .unwrap();

        let response = protected_app(state)
            .oneshot(get_with_token("/protected", Some(&token)))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert!(body_text(response).await.contains("Token expired"));
    }

    #[tokio::test]
    async fn test_unknown_subject_rejected() {
        let (state, _temp) = test_state();
        // Valid token for a user that was never created
        let token = state.tokens.issue_access_token(&Uuid::new_v4()).unwrap();

        let response = protected_app(state)
            .oneshot(get_with_token("/protected", Some(&token)))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert!(body_text(response).await.contains("User not found"));
    }

    #[tokio::test]
    async fn test_deactivated_account_rejected() {
        let (state, _temp) = test_state();
        let user = state
            .user_store
            .create_user("dormant", "dormant@example.com", "Str0ng!pass", UserRole::Admin)
            .unwrap();
        state
            .user_store
            .set_user_status(&user.id, Some(false), None)
            .unwrap();

        let token = state.tokens.issue_access_token(&user.id).unwrap();
        let response = protected_app(state)
            .oneshot(get_with_token("/protected", Some(&token)))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert!(body_text(response).await.contains("deactivated"));
    }

    #[tokio::test]
    async fn test_locked_account_gets_423() {
        let (state, _temp) = test_state();
        let user = state
            .user_store
            .create_user("jailed", "jailed@example.com", "Str0ng!pass", UserRole::Admin)
            .unwrap();
        state
            .user_store
            .set_user_status(&user.id, None, Some(true))
            .unwrap();

        let token = state.tokens.issue_access_token(&user.id).unwrap();
        let response = protected_app(state)
            .oneshot(get_with_token("/protected", Some(&token)))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::LOCKED);
    }

    #[tokio::test]
    async fn test_valid_token_attaches_identity() {
        let (state, _temp) = test_state();
        let user = state
            .user_store
            .create_user("alive", "alive@example.com", "Str0ng!pass", UserRole::Viewer)
            .unwrap();

        let token = state.tokens.issue_access_token(&user.id).unwrap();
        let response = protected_app(state)
            .oneshot(get_with_token("/protected", Some(&token)))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_text(response).await, "alive");
    }

    #[tokio::test]
    async fn test_admin_gate_forbids_non_admin() {
        let (state, _temp) = test_state();
        let user = state
            .user_store
            .create_user("plain", "plain@example.com", "Str0ng!pass", UserRole::Viewer)
            .unwrap();

        let token = state.tokens.issue_access_token(&user.id).unwrap();
        let response = admin_app(state)
            .oneshot(get_with_token("/admin", Some(&token)))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_admin_gate_passes_admin() {
        let (state, _temp) = test_state();
        let user = state
            .user_store
            .create_user("boss", "boss@example.com", "Str0ng!pass", UserRole::Admin)
            .unwrap();

        let token = state.tokens.issue_access_token(&user.id).unwrap();
        let response = admin_app(state)
            .oneshot(get_with_token("/admin", Some(&token)))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_text(response).await, "boss");
    }

    #[tokio::test]
    async fn test_optional_auth_degrades_to_anonymous() {
        let (state, _temp) = test_state();

        // No token at all
        let response = optional_app(state.clone())
            .oneshot(get_with_token("/maybe", None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_text(response).await, "anonymous");

        // Invalid token: still 200, still anonymous
        let response = optional_app(state)
            .oneshot(get_with_token("/maybe", Some("bad.token")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_text(response).await, "anonymous");
    }

    #[tokio::test]
    async fn test_optional_auth_attaches_valid_identity() {
        let (state, _temp) = test_state();
        let user = state
            .user_store
            .create_user("casual", "casual@example.com", "Str0ng!pass", UserRole::Viewer)
            .unwrap();

        let token = state.tokens.issue_access_token(&user.id).unwrap();
        let response = optional_app(state)
            .oneshot(get_with_token("/maybe", Some(&token)))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_text(response).await, "casual");
    }
}
