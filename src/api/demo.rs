//! Demo and guest API endpoints
//!
//! - POST /api/v1/demo/session - Create a disposable guest account +
//!   session (public)
//! - POST /api/v1/demo/cleanup - Reclaim non-protected demo content
//! - GET /api/v1/demo/summary - Demo content counts
//! - POST /api/v1/demo/cleanup-expired - Tear down stale guest accounts
//!
//! The cleanup and summary endpoints are gated to the permanent demo
//! account; anyone else gets a `FORBIDDEN` even with a valid session.

use axum::{
    extract::State,
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::IntoResponse,
    Json,
};
use serde::Serialize;

use crate::api::auth::{session_cookie, AccountResponse, AuthResponse, SessionInfo};
use crate::api::middleware::{ApiError, AppState, AuthenticatedAccount};
use crate::services::temporal::CleanupReport;
use crate::services::DemoContentSummary;

/// Response for cleanup triggers
#[derive(Debug, Serialize)]
pub struct CleanupResponse {
    pub photos_deleted: u64,
    pub collections_deleted: u64,
    pub failed_blobs: Vec<String>,
    pub clean: bool,
}

impl From<CleanupReport> for CleanupResponse {
    fn from(report: CleanupReport) -> Self {
        Self {
            clean: report.is_clean(),
            photos_deleted: report.photos_deleted,
            collections_deleted: report.collections_deleted,
            failed_blobs: report.failed_blobs,
        }
    }
}

/// Response for the guest sweep trigger
#[derive(Debug, Serialize)]
pub struct GuestSweepResponse {
    pub accounts_removed: u64,
}

/// POST /api/v1/demo/session - Anonymous demo access
///
/// Creates a fresh disposable account with access to the protected
/// showcase collections and hands back its session cookie.
pub async fn create_guest_session(
    State(state): State<AppState>,
) -> Result<impl IntoResponse, ApiError> {
    let (account, session) = state
        .ephemeral_service
        .clone()
        .create_guest_account()
        .await
        .map_err(|e| {
            tracing::error!("Guest account creation failed: {:#}", e);
            ApiError::internal_error("Failed to create guest session")
        })?;

    let cfg = state.session_service.config();
    let cookie = session_cookie(&session.id, cfg.duration_secs);
    let mut headers = HeaderMap::new();
    headers.insert(
        header::SET_COOKIE,
        HeaderValue::from_str(&cookie).map_err(|e| ApiError::internal_error(e.to_string()))?,
    );

    Ok((
        StatusCode::CREATED,
        headers,
        Json(AuthResponse {
            account: AccountResponse::from(account),
            token: session.id.clone(),
            session: SessionInfo {
                session_expires_at: session.expires_at.to_rfc3339(),
                warning_secs: cfg.warning_secs,
                critical_secs: cfg.critical_secs,
            },
        }),
    ))
}

/// POST /api/v1/demo/cleanup - Manual demo content reclamation
pub async fn cleanup(
    State(state): State<AppState>,
    account: AuthenticatedAccount,
) -> Result<Json<CleanupResponse>, ApiError> {
    ensure_demo(&account)?;
    let report = state.demo_cleanup.cleanup_demo_content().await;
    Ok(Json(report.into()))
}

/// GET /api/v1/demo/summary - Demo content counts
pub async fn summary(
    State(state): State<AppState>,
    account: AuthenticatedAccount,
) -> Result<Json<DemoContentSummary>, ApiError> {
    ensure_demo(&account)?;
    let summary = state
        .demo_cleanup
        .demo_content_summary()
        .await
        .map_err(|e| {
            tracing::error!("Demo summary failed: {:#}", e);
            ApiError::internal_error("Failed to compute summary")
        })?;
    Ok(Json(summary))
}

/// POST /api/v1/demo/cleanup-expired - Manual guest safety-net sweep
pub async fn cleanup_expired_guests(
    State(state): State<AppState>,
    account: AuthenticatedAccount,
) -> Result<Json<GuestSweepResponse>, ApiError> {
    ensure_demo(&account)?;
    let accounts_removed = state.ephemeral_service.cleanup_expired_guest_accounts().await;
    Ok(Json(GuestSweepResponse { accounts_removed }))
}

fn ensure_demo(account: &AuthenticatedAccount) -> Result<(), ApiError> {
    if account.0.is_demo() {
        Ok(())
    } else {
        Err(ApiError::forbidden("Demo account required"))
    }
}
