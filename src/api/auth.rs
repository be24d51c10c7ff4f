//! Authentication API endpoints
//!
//! - POST /api/v1/auth/register - Account registration
//! - POST /api/v1/auth/login - Login
//! - POST /api/v1/auth/logout - Logout (routed session teardown)
//! - GET /api/v1/auth/me - Current account + session expiry
//! - POST /api/v1/auth/refresh - Session renewal (fresh token)
//!
//! Every authenticated response carries `session_expires_at` plus the
//! warning/critical thresholds, which is all the client needs to run its
//! local countdown; it only talks to the server again to renew.

use axum::{
    extract::State,
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::api::middleware::{
    extract_session_token, ApiError, AppState, AuthenticatedAccount, CurrentSession,
};
use crate::models::{Account, Session};
use crate::services::{LoginInput, RegisterInput};

/// Request body for registration
#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub handle: String,
    pub password: String,
    #[serde(default)]
    pub display_name: String,
}

/// Request body for login
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub handle: String,
    pub password: String,
}

/// Account info in responses
#[derive(Debug, Serialize)]
pub struct AccountResponse {
    pub id: i64,
    pub handle: String,
    pub display_name: String,
    pub avatar: Option<String>,
    pub kind: String,
    pub created_at: String,
}

impl From<Account> for AccountResponse {
    fn from(account: Account) -> Self {
        Self {
            id: account.id,
            handle: account.handle,
            display_name: account.display_name,
            avatar: account.avatar,
            kind: account.kind.to_string(),
            created_at: account.created_at.to_rfc3339(),
        }
    }
}

/// Session info for the client countdown
#[derive(Debug, Serialize)]
pub struct SessionInfo {
    pub session_expires_at: String,
    pub warning_secs: u64,
    pub critical_secs: u64,
}

/// Response for authenticated requests.
///
/// The token matches the cookie; clients that prefer header auth send it
/// as a bearer token instead.
#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub account: AccountResponse,
    pub token: String,
    pub session: SessionInfo,
}

/// Build the public auth routes (no auth required)
pub fn public_router() -> Router<AppState> {
    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
}

/// Build the protected auth routes (behind the auth middleware)
pub fn protected_router() -> Router<AppState> {
    Router::new()
        .route("/logout", post(logout))
        .route("/me", get(me))
        .route("/refresh", post(refresh))
}

/// Build a `Set-Cookie` value binding the session token
pub fn session_cookie(token: &str, max_age_secs: u64) -> String {
    format!(
        "session={}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}",
        token, max_age_secs
    )
}

/// `Set-Cookie` value clearing the session
pub fn clear_session_cookie() -> &'static str {
    "session=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0"
}

fn session_info(state: &AppState, session: &Session) -> SessionInfo {
    let cfg = state.session_service.config();
    SessionInfo {
        session_expires_at: session.expires_at.to_rfc3339(),
        warning_secs: cfg.warning_secs,
        critical_secs: cfg.critical_secs,
    }
}

/// POST /api/v1/auth/register - Register a new account and log it in
async fn register(
    State(state): State<AppState>,
    Json(body): Json<RegisterRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let password = body.password.clone();
    let account = state
        .account_service
        .register(RegisterInput::new(
            body.handle.clone(),
            body.password,
            body.display_name,
        ))
        .await?;

    let session = state
        .account_service
        .login(LoginInput::new(body.handle, password))
        .await?;

    let cookie = session_cookie(&session.id, state.session_service.config().duration_secs);
    let mut headers = HeaderMap::new();
    headers.insert(
        header::SET_COOKIE,
        HeaderValue::from_str(&cookie).map_err(|e| ApiError::internal_error(e.to_string()))?,
    );

    Ok((
        StatusCode::CREATED,
        headers,
        Json(AuthResponse {
            account: account.into(),
            token: session.id.clone(),
            session: session_info(&state, &session),
        }),
    ))
}

/// POST /api/v1/auth/login - Login with credentials
async fn login(
    State(state): State<AppState>,
    Json(body): Json<LoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let session = state
        .account_service
        .login(LoginInput::new(body.handle, body.password))
        .await?;

    let (account, session) = state
        .account_service
        .authenticate(&session.id)
        .await
        .ok_or_else(|| ApiError::internal_error("Session validation failed"))?;

    let cookie = session_cookie(&session.id, state.session_service.config().duration_secs);
    let mut headers = HeaderMap::new();
    headers.insert(
        header::SET_COOKIE,
        HeaderValue::from_str(&cookie).map_err(|e| ApiError::internal_error(e.to_string()))?,
    );

    Ok((
        headers,
        Json(AuthResponse {
            account: account.into(),
            token: session.id.clone(),
            session: session_info(&state, &session),
        }),
    ))
}

/// POST /api/v1/auth/logout - Delete the session server-side
///
/// Guest sessions tear the whole account down, demo sessions trigger the
/// scoped demo cleanup; the client clears its state afterwards.
async fn logout(
    State(state): State<AppState>,
    session: CurrentSession,
) -> Result<impl IntoResponse, ApiError> {
    state.account_service.logout(&session.0.id).await;

    let mut headers = HeaderMap::new();
    headers.insert(
        header::SET_COOKIE,
        HeaderValue::from_static(clear_session_cookie()),
    );

    Ok((StatusCode::NO_CONTENT, headers))
}

/// GET /api/v1/auth/me - Current account and session expiry
async fn me(
    State(state): State<AppState>,
    account: AuthenticatedAccount,
    session: CurrentSession,
) -> Json<AuthResponse> {
    Json(AuthResponse {
        account: account.0.into(),
        token: session.0.id.clone(),
        session: session_info(&state, &session.0),
    })
}

/// POST /api/v1/auth/refresh - Renew the session
///
/// A fresh token is issued, the old one deleted, and all temporary content
/// tied to the session extended to the new expiry. The client resets its
/// countdown from the returned timestamp.
async fn refresh(
    State(state): State<AppState>,
    headers: HeaderMap,
    account: AuthenticatedAccount,
) -> Result<impl IntoResponse, ApiError> {
    let token = extract_session_token(&headers)
        .ok_or_else(|| ApiError::unauthorized("Missing authentication token"))?;

    let fresh = state
        .session_service
        .renew(&token)
        .await
        .ok_or_else(|| ApiError::unauthorized("Invalid or expired session"))?;

    let cookie = session_cookie(&fresh.id, state.session_service.config().duration_secs);
    let mut response_headers = HeaderMap::new();
    response_headers.insert(
        header::SET_COOKIE,
        HeaderValue::from_str(&cookie).map_err(|e| ApiError::internal_error(e.to_string()))?,
    );

    Ok((
        response_headers,
        Json(AuthResponse {
            account: account.0.into(),
            token: fresh.id.clone(),
            session: session_info(&state, &fresh),
        }),
    ))
}
