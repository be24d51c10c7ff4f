//! Partnership API endpoints
//!
//! - POST /api/v1/partnership/invitations - Issue an invitation token
//! - GET /api/v1/partnership/invitations/{token} - Peek at an invitation
//! - POST /api/v1/partnership/invitations/{token}/accept
//! - POST /api/v1/partnership/invitations/{token}/reject
//! - GET /api/v1/partnership - Current partnership
//! - DELETE /api/v1/partnership - Dissolve it

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;

use crate::api::middleware::{ApiError, AppState, AuthenticatedAccount};
use crate::models::{Partnership, PartnershipInvitation};

/// Invitation info in responses
#[derive(Debug, Serialize)]
pub struct InvitationResponse {
    pub token: String,
    pub from_account_id: i64,
    pub to_account_id: Option<i64>,
    pub status: String,
    pub expires_at: String,
}

impl From<PartnershipInvitation> for InvitationResponse {
    fn from(invitation: PartnershipInvitation) -> Self {
        Self {
            token: invitation.token,
            from_account_id: invitation.from_account_id,
            to_account_id: invitation.to_account_id,
            status: invitation.status.to_string(),
            expires_at: invitation.expires_at.to_rfc3339(),
        }
    }
}

/// Partnership info in responses
#[derive(Debug, Serialize)]
pub struct PartnershipResponse {
    pub partner_account_id: i64,
    pub since: String,
}

impl PartnershipResponse {
    fn for_account(partnership: Partnership, account_id: i64) -> Option<Self> {
        partnership.partner_of(account_id).map(|partner_account_id| Self {
            partner_account_id,
            since: partnership.created_at.to_rfc3339(),
        })
    }
}

/// Build the partnership router
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(get_partnership).delete(dissolve))
        .route("/invitations", post(invite))
        .route("/invitations/{token}", get(peek))
        .route("/invitations/{token}/accept", post(accept))
        .route("/invitations/{token}/reject", post(reject))
}

/// POST /api/v1/partnership/invitations
async fn invite(
    State(state): State<AppState>,
    account: AuthenticatedAccount,
) -> Result<impl IntoResponse, ApiError> {
    let invitation = state.partnership_service.invite(account.0.id).await?;
    Ok((StatusCode::CREATED, Json(InvitationResponse::from(invitation))))
}

/// GET /api/v1/partnership/invitations/{token}
async fn peek(
    State(state): State<AppState>,
    _account: AuthenticatedAccount,
    Path(token): Path<String>,
) -> Result<Json<InvitationResponse>, ApiError> {
    let invitation = state.partnership_service.peek(&token).await?;
    Ok(Json(invitation.into()))
}

/// POST /api/v1/partnership/invitations/{token}/accept
async fn accept(
    State(state): State<AppState>,
    account: AuthenticatedAccount,
    Path(token): Path<String>,
) -> Result<Json<PartnershipResponse>, ApiError> {
    let partnership = state
        .partnership_service
        .accept(&token, account.0.id)
        .await?;
    let response = PartnershipResponse::for_account(partnership, account.0.id)
        .ok_or_else(|| ApiError::internal_error("Partnership lookup failed"))?;
    Ok(Json(response))
}

/// POST /api/v1/partnership/invitations/{token}/reject
async fn reject(
    State(state): State<AppState>,
    account: AuthenticatedAccount,
    Path(token): Path<String>,
) -> Result<StatusCode, ApiError> {
    state
        .partnership_service
        .reject(&token, account.0.id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/v1/partnership
async fn get_partnership(
    State(state): State<AppState>,
    account: AuthenticatedAccount,
) -> Result<Json<Option<PartnershipResponse>>, ApiError> {
    let partnership = state
        .partnership_service
        .partnership_of(account.0.id)
        .await?;
    Ok(Json(partnership.and_then(|p| {
        PartnershipResponse::for_account(p, account.0.id)
    })))
}

/// DELETE /api/v1/partnership
async fn dissolve(
    State(state): State<AppState>,
    account: AuthenticatedAccount,
) -> Result<StatusCode, ApiError> {
    let existed = state.partnership_service.dissolve(account.0.id).await?;
    if existed {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::not_found("No partnership to dissolve"))
    }
}
