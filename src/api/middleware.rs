//! API middleware
//!
//! Authentication middleware, the shared application state, and the error
//! envelope every handler speaks.
//!
//! Authentication and authorization are distinct failures here: a missing
//! or dead session yields `UNAUTHORIZED`, while a valid session lacking
//! ownership of a resource yields `FORBIDDEN`.

use axum::{
    extract::{FromRequestParts, Request, State},
    http::{header, request::Parts, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::config::StorageConfig;
use crate::models::{Account, Session};
use crate::services::{
    AccountService, AccountServiceError, CollectionService, CommentService, ContentError,
    DemoCleanupService, EphemeralAccountService, PartnershipService, PhotoService, SessionService,
};

/// Application state containing shared services
#[derive(Clone)]
pub struct AppState {
    pub account_service: Arc<AccountService>,
    pub session_service: Arc<SessionService>,
    pub collection_service: Arc<CollectionService>,
    pub photo_service: Arc<PhotoService>,
    pub comment_service: Arc<CommentService>,
    pub partnership_service: Arc<PartnershipService>,
    pub demo_cleanup: Arc<DemoCleanupService>,
    pub ephemeral_service: Arc<EphemeralAccountService>,
    pub storage_cfg: Arc<StorageConfig>,
}

/// Authenticated account extracted from the request
#[derive(Debug, Clone)]
pub struct AuthenticatedAccount(pub Account);

/// The (possibly touch-renewed) session behind the request
#[derive(Debug, Clone)]
pub struct CurrentSession(pub Session);

/// Error response envelope for API errors
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiError {
    pub error: ApiErrorDetail,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiErrorDetail {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ApiError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: ApiErrorDetail {
                code: code.into(),
                message: message.into(),
                details: None,
            },
        }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new("UNAUTHORIZED", message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new("FORBIDDEN", message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new("NOT_FOUND", message)
    }

    pub fn validation_error(message: impl Into<String>) -> Self {
        Self::new("VALIDATION_ERROR", message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new("CONFLICT", message)
    }

    pub fn retryable(message: impl Into<String>) -> Self {
        Self::new("SERVICE_UNAVAILABLE", message)
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::new("INTERNAL_ERROR", message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self.error.code.as_str() {
            "UNAUTHORIZED" => StatusCode::UNAUTHORIZED,
            "FORBIDDEN" => StatusCode::FORBIDDEN,
            "NOT_FOUND" => StatusCode::NOT_FOUND,
            "VALIDATION_ERROR" => StatusCode::BAD_REQUEST,
            "CONFLICT" => StatusCode::CONFLICT,
            "SERVICE_UNAVAILABLE" => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };

        (status, Json(self)).into_response()
    }
}

impl From<ContentError> for ApiError {
    fn from(e: ContentError) -> Self {
        match e {
            ContentError::Validation(msg) => ApiError::validation_error(msg),
            ContentError::NotFound(msg) => ApiError::not_found(msg),
            ContentError::Forbidden(msg) => ApiError::forbidden(msg),
            ContentError::Conflict(msg) => ApiError::conflict(msg),
            ContentError::Retryable(msg) => ApiError::retryable(msg),
            ContentError::Internal(e) => {
                tracing::error!("Internal error: {:#}", e);
                ApiError::internal_error("Internal error")
            }
        }
    }
}

impl From<AccountServiceError> for ApiError {
    fn from(e: AccountServiceError) -> Self {
        match e {
            AccountServiceError::AuthenticationError(msg) => ApiError::unauthorized(msg),
            AccountServiceError::ValidationError(msg) => ApiError::validation_error(msg),
            AccountServiceError::AccountExists(msg) => ApiError::conflict(msg),
            AccountServiceError::InternalError(e) => {
                tracing::error!("Internal error: {:#}", e);
                ApiError::internal_error("Internal error")
            }
        }
    }
}

/// Extract the session token from a request: `Authorization: Bearer` first,
/// then the `session` cookie
pub fn extract_session_token(headers: &axum::http::HeaderMap) -> Option<String> {
    if let Some(auth_header) = headers.get(header::AUTHORIZATION) {
        if let Ok(auth_str) = auth_header.to_str() {
            if let Some(token) = auth_str.strip_prefix("Bearer ") {
                return Some(token.to_string());
            }
        }
    }

    if let Some(cookie_header) = headers.get(header::COOKIE) {
        if let Ok(cookie_str) = cookie_header.to_str() {
            for cookie in cookie_str.split(';') {
                let cookie = cookie.trim();
                if let Some(token) = cookie.strip_prefix("session=") {
                    return Some(token.to_string());
                }
            }
        }
    }

    None
}

/// Authentication middleware.
///
/// Resolves the token through the session store (lazy expiry and
/// touch-to-renew apply) and stashes account and session in the request
/// extensions. Expired, deleted, and never-issued tokens are uniformly
/// rejected.
pub async fn require_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = extract_session_token(request.headers())
        .ok_or_else(|| ApiError::unauthorized("Missing authentication token"))?;

    let (account, session) = state
        .account_service
        .authenticate(&token)
        .await
        .ok_or_else(|| ApiError::unauthorized("Invalid or expired session"))?;

    request.extensions_mut().insert(AuthenticatedAccount(account));
    request.extensions_mut().insert(CurrentSession(session));
    Ok(next.run(request).await)
}

impl<S> FromRequestParts<S> for AuthenticatedAccount
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthenticatedAccount>()
            .cloned()
            .ok_or_else(|| ApiError::unauthorized("Authentication required"))
    }
}

impl<S> FromRequestParts<S> for CurrentSession
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<CurrentSession>()
            .cloned()
            .ok_or_else(|| ApiError::unauthorized("Authentication required"))
    }
}
