//! HTTP handlers for object operations.
//!
//! Uploads accept two byte sources (a multipart form field named
//! `object`, or the raw request body) and adapt both into the one
//! chunked stream the storage core consumes, so nothing is buffered
//! beyond a chunk regardless of how the client sends the bytes.

use crate::errors::AppError;
use crate::handlers::{caller_from_headers, prefix_slash};
use crate::models::metadata::MetadataPatch;
use crate::services::directory::parse_key;
use crate::services::storage_service::StorageService;
use axum::{
    Json,
    extract::{FromRequest, Multipart, Path, Query, Request, State},
    http::{StatusCode, header},
    response::IntoResponse,
};
use futures::StreamExt;
use serde::Deserialize;
use std::io;

/// Query params for `GET /buckets/{bucket}/objects`.
#[derive(Debug, Deserialize)]
pub struct ListObjectsQuery {
    pub skip: Option<i64>,
    pub limit: Option<i64>,
}

/// Query params for `POST /buckets/{bucket}/objects`.
#[derive(Debug, Deserialize)]
pub struct UploadQuery {
    pub name: Option<String>,
    #[serde(rename = "uploaderID")]
    pub uploader_id: Option<String>,
}

/// Request body for `PUT /buckets/{bucket}/objects/{object}/metadata`.
#[derive(Debug, Default, Deserialize)]
pub struct UpdateObjectMetadataReq {
    pub name: Option<String>,
    #[serde(flatten)]
    pub patch: MetadataPatch,
}

/// GET `/buckets/{bucket}/objects` - paginated listing, newest first.
pub async fn list_objects(
    State(service): State<StorageService>,
    Path(bucket): Path<String>,
    Query(q): Query<ListObjectsQuery>,
    headers: axum::http::HeaderMap,
) -> Result<impl IntoResponse, AppError> {
    let caller = caller_from_headers(&headers);
    let skip = q.skip.unwrap_or(0).max(0);
    let limit = q.limit.unwrap_or(100).clamp(1, 1000);
    let objects = service.list_objects(&caller, &bucket, skip, limit).await?;
    Ok(Json(objects))
}

/// GET `/buckets/{bucket}/objects/list/{objects}` - batch lookup by
/// comma-separated ids, restricted to the bucket.
pub async fn list_objects_by_ids(
    State(service): State<StorageService>,
    Path((bucket, objects)): Path<(String, String)>,
    headers: axum::http::HeaderMap,
) -> Result<impl IntoResponse, AppError> {
    let caller = caller_from_headers(&headers);
    let ids: Vec<&str> = objects.split(',').filter(|id| !id.is_empty()).collect();
    let objects = service.list_objects_by_ids(&caller, &bucket, &ids).await?;
    Ok(Json(objects))
}

/// POST `/buckets/{bucket}/objects?name=&uploaderID=` - streaming upload.
///
/// The byte source is either the `object` field of a multipart form or
/// the raw request body (the RESTful way).
pub async fn upload_object(
    State(service): State<StorageService>,
    Path(bucket): Path<String>,
    Query(q): Query<UploadQuery>,
    req: Request,
) -> Result<impl IntoResponse, AppError> {
    let caller = caller_from_headers(req.headers());
    let name = prefix_slash(q.name.as_deref().unwrap_or(""));
    let uploader_id = match q.uploader_id.as_deref() {
        Some(raw) => Some(parse_key(raw)?),
        None => None,
    };

    let request_content_type = req
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string);

    let is_multipart = request_content_type
        .as_deref()
        .is_some_and(|ct| ct.starts_with("multipart/form-data"));

    let object = if is_multipart {
        let mut form = Multipart::from_request(req, &())
            .await
            .map_err(|err| AppError::new(StatusCode::BAD_REQUEST, err.to_string()))?;
        let mut uploaded = None;
        while let Some(field) = form
            .next_field()
            .await
            .map_err(|err| AppError::new(StatusCode::BAD_REQUEST, err.to_string()))?
        {
            if field.name() != Some("object") {
                continue;
            }
            let field_content_type = field.content_type().map(str::to_string);
            let stream = field.map(|chunk| chunk.map_err(io::Error::other));
            uploaded = Some(
                service
                    .upload_object(
                        &caller,
                        &bucket,
                        &name,
                        field_content_type.as_deref(),
                        uploader_id,
                        stream,
                    )
                    .await?,
            );
            break;
        }
        uploaded.ok_or_else(|| {
            AppError::new(StatusCode::BAD_REQUEST, "missing `object` form field")
        })?
    } else {
        let stream = req
            .into_body()
            .into_data_stream()
            .map(|chunk| chunk.map_err(io::Error::other));
        service
            .upload_object(
                &caller,
                &bucket,
                &name,
                request_content_type.as_deref(),
                uploader_id,
                stream,
            )
            .await?
    };

    Ok((StatusCode::CREATED, Json(object)))
}

/// GET `/buckets/{bucket}/objects/{object}` - the catalog record as JSON.
pub async fn get_object(
    State(service): State<StorageService>,
    Path((bucket, object)): Path<(String, String)>,
    headers: axum::http::HeaderMap,
) -> Result<impl IntoResponse, AppError> {
    let caller = caller_from_headers(&headers);
    let object = service.get_object(&caller, &bucket, &object).await?;
    Ok(Json(object))
}

/// DELETE `/buckets/{bucket}/objects/{object}` - remove record and chunks.
pub async fn delete_object(
    State(service): State<StorageService>,
    Path((bucket, object)): Path<(String, String)>,
    headers: axum::http::HeaderMap,
) -> Result<impl IntoResponse, AppError> {
    let caller = caller_from_headers(&headers);
    service.delete_object(&caller, &bucket, &object).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// PUT `/buckets/{bucket}/objects/{object}/metadata` - patch display name
/// and metadata; content stays untouched.
pub async fn update_object_metadata(
    State(service): State<StorageService>,
    Path((bucket, object)): Path<(String, String)>,
    headers: axum::http::HeaderMap,
    Json(payload): Json<UpdateObjectMetadataReq>,
) -> Result<impl IntoResponse, AppError> {
    let caller = caller_from_headers(&headers);
    let object = service
        .update_object_metadata(
            &caller,
            &bucket,
            &object,
            payload.name.as_deref(),
            payload.patch,
        )
        .await?;
    Ok(Json(object))
}
