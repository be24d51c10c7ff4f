//! Collection API endpoints
//!
//! - GET /api/v1/collections - List accessible collections
//! - POST /api/v1/collections - Create a collection (optionally temporary)
//! - GET/PUT/DELETE /api/v1/collections/{id}
//! - POST /api/v1/collections/{id}/permanent - Promote to permanent
//! - GET /api/v1/collections/{id}/photos - List photos
//! - POST /api/v1/collections/{id}/photos - Upload a photo (multipart)

use axum::{
    extract::{Multipart, Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;

use crate::api::middleware::{ApiError, AppState, AuthenticatedAccount, CurrentSession};
use crate::api::photos::PhotoResponse;
use crate::models::collection::CreateCollectionInput;
use crate::models::Collection;
use crate::services::collection::UpdateCollectionInput;

/// Collection info in responses
#[derive(Debug, Serialize)]
pub struct CollectionResponse {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub kind: String,
    pub is_temporary: bool,
    pub expires_at: Option<String>,
    pub created_at: String,
    /// Photo serving as the collection thumbnail; absent for empty
    /// collections
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumbnail_photo_id: Option<i64>,
}

impl CollectionResponse {
    fn from_collection(collection: Collection, thumbnail_photo_id: Option<i64>) -> Self {
        Self {
            id: collection.id,
            name: collection.name,
            description: collection.description,
            kind: collection.kind.to_string(),
            is_temporary: collection.is_temporary,
            expires_at: collection.expires_at.map(|t| t.to_rfc3339()),
            created_at: collection.created_at.to_rfc3339(),
            thumbnail_photo_id,
        }
    }
}

/// Response for the permanent-promotion endpoint
#[derive(Debug, Serialize)]
pub struct PromotedResponse {
    pub changed: bool,
}

/// Build the collection router
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_collections).post(create_collection))
        .route(
            "/{id}",
            get(get_collection)
                .put(update_collection)
                .delete(delete_collection),
        )
        .route("/{id}/permanent", post(make_permanent))
        .route("/{id}/photos", get(list_photos).post(upload_photo))
}

/// GET /api/v1/collections - Everything the account (or its partner) owns
async fn list_collections(
    State(state): State<AppState>,
    account: AuthenticatedAccount,
) -> Result<Json<Vec<CollectionResponse>>, ApiError> {
    let collections = state.collection_service.list_accessible(account.0.id).await?;

    let mut responses = Vec::with_capacity(collections.len());
    for collection in collections {
        let thumbnail = state.collection_service.thumbnail(collection.id).await?;
        responses.push(CollectionResponse::from_collection(
            collection,
            thumbnail.map(|p| p.id),
        ));
    }

    Ok(Json(responses))
}

/// POST /api/v1/collections - Create a collection
async fn create_collection(
    State(state): State<AppState>,
    account: AuthenticatedAccount,
    session: CurrentSession,
    Json(body): Json<CreateCollectionInput>,
) -> Result<impl IntoResponse, ApiError> {
    let collection = state
        .collection_service
        .create(account.0.id, &session.0, body)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(CollectionResponse::from_collection(collection, None)),
    ))
}

/// GET /api/v1/collections/{id}
async fn get_collection(
    State(state): State<AppState>,
    account: AuthenticatedAccount,
    Path(id): Path<i64>,
) -> Result<Json<CollectionResponse>, ApiError> {
    let collection = state.collection_service.get(account.0.id, id).await?;
    let thumbnail = state.collection_service.thumbnail(id).await?;
    Ok(Json(CollectionResponse::from_collection(
        collection,
        thumbnail.map(|p| p.id),
    )))
}

/// PUT /api/v1/collections/{id}
async fn update_collection(
    State(state): State<AppState>,
    account: AuthenticatedAccount,
    Path(id): Path<i64>,
    Json(body): Json<UpdateCollectionInput>,
) -> Result<Json<CollectionResponse>, ApiError> {
    let collection = state
        .collection_service
        .update(account.0.id, id, body)
        .await?;
    let thumbnail = state.collection_service.thumbnail(id).await?;
    Ok(Json(CollectionResponse::from_collection(
        collection,
        thumbnail.map(|p| p.id),
    )))
}

/// DELETE /api/v1/collections/{id}
async fn delete_collection(
    State(state): State<AppState>,
    account: AuthenticatedAccount,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    state.collection_service.delete(account.0.id, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/v1/collections/{id}/permanent - One-way promotion
async fn make_permanent(
    State(state): State<AppState>,
    account: AuthenticatedAccount,
    Path(id): Path<i64>,
) -> Result<Json<PromotedResponse>, ApiError> {
    let changed = state
        .collection_service
        .make_permanent(account.0.id, id)
        .await?;
    Ok(Json(PromotedResponse { changed }))
}

/// GET /api/v1/collections/{id}/photos
async fn list_photos(
    State(state): State<AppState>,
    account: AuthenticatedAccount,
    Path(id): Path<i64>,
) -> Result<Json<Vec<PhotoResponse>>, ApiError> {
    let photos = state.photo_service.list(account.0.id, id).await?;
    Ok(Json(photos.into_iter().map(Into::into).collect()))
}

/// POST /api/v1/collections/{id}/photos - Multipart photo upload
///
/// Accepts a `file` field plus an optional `title` field.
async fn upload_photo(
    State(state): State<AppState>,
    account: AuthenticatedAccount,
    Path(id): Path<i64>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, ApiError> {
    let mut title = String::new();
    let mut upload: Option<(String, Vec<u8>)> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::validation_error(format!("Failed to read multipart: {}", e)))?
    {
        let name = field.name().unwrap_or("").to_string();
        match name.as_str() {
            "title" => {
                title = field
                    .text()
                    .await
                    .map_err(|e| ApiError::validation_error(e.to_string()))?;
            }
            "file" => {
                let content_type = field
                    .content_type()
                    .map(|s| s.to_string())
                    .unwrap_or_else(|| "application/octet-stream".to_string());
                if title.is_empty() {
                    if let Some(name) = field.file_name() {
                        title = name.rsplit_once('.').map(|(stem, _)| stem).unwrap_or(name).to_string();
                    }
                }
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::validation_error(format!("Failed to read file: {}", e)))?;
                upload = Some((content_type, data.to_vec()));
            }
            _ => {}
        }
    }

    let (content_type, bytes) =
        upload.ok_or_else(|| ApiError::validation_error("No file provided"))?;

    let photo = state
        .photo_service
        .upload(account.0.id, id, &title, &content_type, &bytes)
        .await?;

    Ok((StatusCode::CREATED, Json(PhotoResponse::from(photo))))
}
