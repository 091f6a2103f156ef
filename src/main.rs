//! Portfolio backend server.
//!
//! Wires the authentication slice together: configuration from the
//! environment, the SQLite credential store, the token service, the request
//! gate, rate limiting, and the HTTP surface.

use anyhow::{Context, Result};
use axum::{middleware, routing::get, Json, Router};
use chrono::Utc;
use dotenv::dotenv;
use serde_json::json;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use portfolio_backend::{
    auth::{api as auth_api, AuthState, TokenService, UserStore},
    config::AppConfig,
    middleware::{rate_limit_middleware, request_logging, RateLimitConfig, RateLimitLayer},
};

#[tokio::main]
async fn main() -> Result<()> {
    load_env();
    init_tracing();

    let config = AppConfig::from_env()?;

    info!("🚀 Portfolio backend starting");

    let user_store = Arc::new(
        UserStore::new(&config.database_path)
            .with_context(|| format!("Failed to open credential store at {}", config.database_path))?,
    );
    let auth_config = Arc::new(config.auth.clone());
    let tokens = Arc::new(TokenService::new(auth_config.clone()));
    let auth_state = AuthState::new(user_store, tokens, auth_config);

    info!(db = %config.database_path, "🔐 Authentication initialized");

    // Two rate limit profiles: general API and a stricter one for auth
    let general_limiter = RateLimitLayer::new(RateLimitConfig::general(
        config.rate_limit.general_max,
        config.rate_limit.window,
    ));
    let auth_limiter = RateLimitLayer::new(RateLimitConfig::auth(
        config.rate_limit.auth_max,
        config.rate_limit.window,
    ));

    tokio::spawn(limiter_cleanup(general_limiter.clone(), auth_limiter.clone()));

    let public_routes = Router::new()
        .route("/health", get(health_check))
        .route("/api/health", get(api_health_check));

    let auth_routes = auth_api::auth_router(auth_state.clone()).layer(
        middleware::from_fn_with_state(auth_limiter, rate_limit_middleware),
    );

    let app = Router::new()
        .merge(public_routes)
        .merge(auth_routes)
        .merge(auth_api::session_router(auth_state.clone()))
        .merge(auth_api::admin_router(auth_state))
        .layer(middleware::from_fn_with_state(
            general_limiter,
            rate_limit_middleware,
        ))
        .layer(middleware::from_fn(request_logging))
        .layer(CorsLayer::permissive());

    let listener = TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.bind_addr))?;
    info!("🎯 API server listening on {}", config.bind_addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .context("Server error")?;

    Ok(())
}

async fn health_check() -> Json<serde_json::Value> {
    Json(json!({
        "status": "OK",
        "service": "portfolio-backend",
        "timestamp": Utc::now().to_rfc3339(),
    }))
}

async fn api_health_check() -> Json<serde_json::Value> {
    Json(json!({
        "status": "OK",
        "timestamp": Utc::now().to_rfc3339(),
        "services": {
            "database": "connected",
        },
    }))
}

/// Evict stale rate limiter windows every few minutes.
async fn limiter_cleanup(general: RateLimitLayer, auth: RateLimitLayer) {
    let mut interval = tokio::time::interval(Duration::from_secs(300));
    loop {
        interval.tick().await;
        general.cleanup();
        auth.cleanup();
    }
}

fn load_env() {
    // Standard dotenv search (cwd + parents)
    let _ = dotenv();

    // Also try the manifest directory when running from elsewhere
    let manifest_dir = Path::new(env!("CARGO_MANIFEST_DIR"));
    let candidate = manifest_dir.join(".env");
    if candidate.exists() {
        let _ = dotenv::from_path(&candidate);
    }
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "portfolio_backend=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}
