//! API layer - HTTP handlers and routing
//!
//! All endpoints live under `/api/v1`:
//! - Auth endpoints (register/login/logout/me/refresh)
//! - Collection and photo endpoints
//! - Comment endpoints
//! - Partnership invitation endpoints
//! - Demo/guest endpoints
//!
//! Everything except login, registration, and guest-session creation sits
//! behind the authentication middleware.

pub mod auth;
pub mod collections;
pub mod comments;
pub mod demo;
pub mod middleware;
pub mod partnership;
pub mod photos;

use axum::{
    extract::DefaultBodyLimit,
    http::{header, HeaderValue, Method},
    middleware as axum_middleware,
    routing::{delete, get, post},
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

pub use middleware::{ApiError, AppState, AuthenticatedAccount, CurrentSession};

/// Build the main API router
pub fn build_api_router(state: AppState) -> Router<AppState> {
    // Everything that needs a live session
    let protected_routes = Router::new()
        .nest("/auth", auth::protected_router())
        .nest("/collections", collections::router())
        .nest("/photos", photos::router())
        .nest("/partnership", partnership::router())
        .route("/comments/{id}", delete(comments::delete_comment))
        // Demo maintenance (handler-gated to the demo account)
        .route("/demo/cleanup", post(demo::cleanup))
        .route("/demo/summary", get(demo::summary))
        .route("/demo/cleanup-expired", post(demo::cleanup_expired_guests))
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::require_auth,
        ));

    // Public routes
    Router::new()
        .nest("/auth", auth::public_router())
        .route("/demo/session", post(demo::create_guest_session))
        .merge(protected_routes)
}

/// Build the complete router with middleware
pub fn build_router(state: AppState, cors_origin: &str) -> Router {
    // CORS with credentials so the session cookie travels
    let cors = CorsLayer::new()
        .allow_origin(cors_origin.parse::<HeaderValue>().unwrap())
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION, header::COOKIE])
        .allow_credentials(true);

    // Leave headroom above the photo size cap for multipart framing
    let body_limit = state.storage_cfg.max_file_size as usize + 64 * 1024;

    Router::new()
        .nest("/api/v1", build_api_router(state.clone()))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
