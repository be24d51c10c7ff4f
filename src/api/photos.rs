//! Photo API endpoints
//!
//! - GET /api/v1/photos/{id} - Photo metadata
//! - GET /api/v1/photos/{id}/raw - The image itself
//! - PUT /api/v1/photos/{id} - Update metadata
//! - DELETE /api/v1/photos/{id}
//! - POST /api/v1/photos/{id}/like - Toggle the liked flag
//! - POST /api/v1/photos/{id}/permanent - Promote to permanent

use axum::{
    body::Body,
    extract::{Path, State},
    http::{header, StatusCode},
    response::Response,
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;

use crate::api::collections::PromotedResponse;
use crate::api::middleware::{ApiError, AppState, AuthenticatedAccount};
use crate::models::photo::UpdatePhotoInput;
use crate::models::Photo;

/// Photo info in responses
#[derive(Debug, Serialize)]
pub struct PhotoResponse {
    pub id: i64,
    pub collection_id: i64,
    pub title: String,
    pub description: Option<String>,
    pub content_type: String,
    pub liked: bool,
    pub is_temporary: bool,
    pub expires_at: Option<String>,
    pub uploaded_at: String,
    pub url: String,
}

impl From<Photo> for PhotoResponse {
    fn from(photo: Photo) -> Self {
        Self {
            url: format!("/api/v1/photos/{}/raw", photo.id),
            id: photo.id,
            collection_id: photo.collection_id,
            title: photo.title,
            description: photo.description,
            content_type: photo.content_type,
            liked: photo.liked,
            is_temporary: photo.is_temporary,
            expires_at: photo.expires_at.map(|t| t.to_rfc3339()),
            uploaded_at: photo.uploaded_at.to_rfc3339(),
        }
    }
}

/// Response for the like toggle
#[derive(Debug, Serialize)]
pub struct LikeResponse {
    pub liked: bool,
}

/// Build the photo router
pub fn router() -> Router<AppState> {
    use crate::api::comments;

    Router::new()
        .route("/{id}", get(get_photo).put(update_photo).delete(delete_photo))
        .route("/{id}/raw", get(serve_photo))
        .route("/{id}/like", post(toggle_like))
        .route("/{id}/permanent", post(make_permanent))
        .route(
            "/{id}/comments",
            get(comments::list_comments).post(comments::create_comment),
        )
}

/// GET /api/v1/photos/{id}
async fn get_photo(
    State(state): State<AppState>,
    account: AuthenticatedAccount,
    Path(id): Path<i64>,
) -> Result<Json<PhotoResponse>, ApiError> {
    let photo = state.photo_service.get(account.0.id, id).await?;
    Ok(Json(photo.into()))
}

/// GET /api/v1/photos/{id}/raw - Serve the image bytes
async fn serve_photo(
    State(state): State<AppState>,
    account: AuthenticatedAccount,
    Path(id): Path<i64>,
) -> Result<Response, ApiError> {
    let (photo, bytes) = state.photo_service.raw(account.0.id, id).await?;

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, photo.content_type)
        .header(header::CACHE_CONTROL, "private, max-age=3600")
        .body(Body::from(bytes))
        .map_err(|e| ApiError::internal_error(e.to_string()))
}

/// PUT /api/v1/photos/{id}
async fn update_photo(
    State(state): State<AppState>,
    account: AuthenticatedAccount,
    Path(id): Path<i64>,
    Json(body): Json<UpdatePhotoInput>,
) -> Result<Json<PhotoResponse>, ApiError> {
    let photo = state.photo_service.update(account.0.id, id, body).await?;
    Ok(Json(photo.into()))
}

/// DELETE /api/v1/photos/{id} - Blob first, then the row
async fn delete_photo(
    State(state): State<AppState>,
    account: AuthenticatedAccount,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    state.photo_service.delete(account.0.id, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/v1/photos/{id}/like
async fn toggle_like(
    State(state): State<AppState>,
    account: AuthenticatedAccount,
    Path(id): Path<i64>,
) -> Result<Json<LikeResponse>, ApiError> {
    let liked = state.photo_service.toggle_like(account.0.id, id).await?;
    Ok(Json(LikeResponse { liked }))
}

/// POST /api/v1/photos/{id}/permanent
async fn make_permanent(
    State(state): State<AppState>,
    account: AuthenticatedAccount,
    Path(id): Path<i64>,
) -> Result<Json<PromotedResponse>, ApiError> {
    let changed = state.photo_service.make_permanent(account.0.id, id).await?;
    Ok(Json(PromotedResponse { changed }))
}
