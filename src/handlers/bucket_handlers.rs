//! HTTP handlers for bucket CRUD.

use crate::errors::AppError;
use crate::handlers::caller_from_headers;
use crate::services::storage_service::{BucketKey, StorageService};
use axum::{
    Json,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
};
use serde::Deserialize;

/// Request body for `POST /buckets`.
#[derive(Debug, Deserialize)]
pub struct CreateBucketReq {
    pub name: String,
}

/// Request body for `PUT /buckets/{bucket}`. Absent fields are untouched.
#[derive(Debug, Default, Deserialize)]
pub struct UpdateBucketReq {
    pub name: Option<String>,
}

/// POST `/buckets` - create a bucket.
pub async fn create_bucket(
    State(service): State<StorageService>,
    Json(payload): Json<CreateBucketReq>,
) -> Result<impl IntoResponse, AppError> {
    let bucket = service.create_bucket(&payload.name).await?;
    Ok((StatusCode::CREATED, Json(bucket)))
}

/// GET `/buckets/{bucket}` - fetch a bucket by id.
pub async fn get_bucket(
    State(service): State<StorageService>,
    Path(bucket): Path<String>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, AppError> {
    let caller = caller_from_headers(&headers);
    let bucket = service.get_bucket(&caller, BucketKey::Id(&bucket)).await?;
    Ok(Json(bucket))
}

/// GET `/buckets/name/{bucket}` - fetch a bucket by name.
pub async fn get_bucket_by_name(
    State(service): State<StorageService>,
    Path(bucket): Path<String>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, AppError> {
    let caller = caller_from_headers(&headers);
    let bucket = service
        .get_bucket(&caller, BucketKey::Name(&bucket))
        .await?;
    Ok(Json(bucket))
}

/// PUT `/buckets/{bucket}` - partial update of a bucket record.
pub async fn update_bucket(
    State(service): State<StorageService>,
    Path(bucket): Path<String>,
    headers: HeaderMap,
    Json(payload): Json<UpdateBucketReq>,
) -> Result<impl IntoResponse, AppError> {
    let caller = caller_from_headers(&headers);
    let patch = crate::models::bucket::BucketPatch { name: payload.name };
    let bucket = service.update_bucket(&caller, &bucket, patch).await?;
    Ok(Json(bucket))
}

/// DELETE `/buckets/{bucket}` - remove the bucket record (no cascade).
pub async fn delete_bucket(
    State(service): State<StorageService>,
    Path(bucket): Path<String>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, AppError> {
    let caller = caller_from_headers(&headers);
    service.delete_bucket(&caller, &bucket).await?;
    Ok(StatusCode::NO_CONTENT)
}
