//! Comment API endpoints
//!
//! - GET /api/v1/photos/{id}/comments
//! - POST /api/v1/photos/{id}/comments
//! - DELETE /api/v1/comments/{id}

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Serialize;

use crate::api::middleware::{ApiError, AppState, AuthenticatedAccount};
use crate::models::comment::CreateCommentInput;
use crate::models::Comment;

/// Comment info in responses
#[derive(Debug, Serialize)]
pub struct CommentResponse {
    pub id: i64,
    pub photo_id: i64,
    pub account_id: Option<i64>,
    pub content: String,
    pub created_at: String,
}

impl From<Comment> for CommentResponse {
    fn from(comment: Comment) -> Self {
        Self {
            id: comment.id,
            photo_id: comment.photo_id,
            account_id: comment.account_id,
            content: comment.content,
            created_at: comment.created_at.to_rfc3339(),
        }
    }
}

/// GET /api/v1/photos/{id}/comments
pub async fn list_comments(
    State(state): State<AppState>,
    account: AuthenticatedAccount,
    Path(photo_id): Path<i64>,
) -> Result<Json<Vec<CommentResponse>>, ApiError> {
    let comments = state.comment_service.list(account.0.id, photo_id).await?;
    Ok(Json(comments.into_iter().map(Into::into).collect()))
}

/// POST /api/v1/photos/{id}/comments
pub async fn create_comment(
    State(state): State<AppState>,
    account: AuthenticatedAccount,
    Path(photo_id): Path<i64>,
    Json(body): Json<CreateCommentInput>,
) -> Result<(StatusCode, Json<CommentResponse>), ApiError> {
    let comment = state
        .comment_service
        .create(account.0.id, photo_id, &body.content)
        .await?;
    Ok((StatusCode::CREATED, Json(comment.into())))
}

/// DELETE /api/v1/comments/{id}
pub async fn delete_comment(
    State(state): State<AppState>,
    account: AuthenticatedAccount,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    state.comment_service.delete(account.0.id, id).await?;
    Ok(StatusCode::NO_CONTENT)
}
