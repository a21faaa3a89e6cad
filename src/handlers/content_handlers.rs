//! Content-serving surface.
//!
//! API traffic is addressed to an `api.` host; every other host is the
//! content surface, where the subdomain names a bucket and the path names
//! an object. Under the reserved `storage` subdomain the first path
//! segment names the bucket instead. Object bodies are streamed chunk by
//! chunk straight out of the blob store.

use crate::errors::AppError;
use crate::handlers::{caller_from_headers, prefix_slash};
use crate::models::object::Object;
use crate::services::storage_service::StorageService;
use axum::{
    body::Body,
    extract::{Request, State},
    http::{HeaderMap, HeaderValue, header},
    middleware::Next,
    response::{IntoResponse, Response},
};

/// Route a request by host: `api.*` continues into the API router,
/// anything else is served as bucket content.
pub async fn host_dispatch(
    State(service): State<StorageService>,
    req: Request,
    next: Next,
) -> Response {
    let is_api = req
        .headers()
        .get(header::HOST)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|host| host.starts_with("api."));
    if is_api {
        return next.run(req).await;
    }
    match serve_content(service, req).await {
        Ok(response) => response,
        Err(err) => err.into_response(),
    }
}

/// Stream an object body resolved from the host/path of the request.
pub async fn serve_content(service: StorageService, req: Request) -> Result<Response, AppError> {
    let host = req
        .headers()
        .get(header::HOST)
        .and_then(|value| value.to_str().ok())
        .ok_or_else(|| AppError::not_found("invalid bucket in URL"))?;
    let (bucket, object) = bucket_object_names(host, req.uri().path())?;
    let caller = caller_from_headers(req.headers());

    let reader = service.download_object(&caller, &bucket, &object).await?;

    let mut response = Response::new(Body::from_stream(reader.stream));
    set_object_headers(response.headers_mut(), &reader.object);
    Ok(response)
}

/// Resolve `(bucket, object)` names from the request host and path.
///
/// A missing second path segment under the `storage` subdomain is the
/// 404 "invalid bucket in URL" case.
fn bucket_object_names(host: &str, path: &str) -> Result<(String, String), AppError> {
    let subdomain = host
        .split(':')
        .next()
        .unwrap_or(host)
        .split('.')
        .next()
        .unwrap_or("");
    if subdomain == "storage" {
        let mut parts = path.trim_start_matches('/').splitn(2, '/');
        let bucket = parts.next().unwrap_or("");
        match parts.next() {
            Some(rest) if !bucket.is_empty() && !rest.is_empty() => {
                Ok((bucket.to_string(), prefix_slash(rest)))
            }
            _ => Err(AppError::not_found("invalid bucket in URL")),
        }
    } else {
        Ok((subdomain.to_string(), path.to_string()))
    }
}

fn set_object_headers(headers: &mut HeaderMap, object: &Object) {
    let content_type = object
        .content_type
        .clone()
        .unwrap_or_else(|| "application/octet-stream".into());
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_str(&content_type)
            .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream")),
    );
    headers.insert(
        header::CONTENT_LENGTH,
        HeaderValue::from_str(&object.size.max(0).to_string())
            .unwrap_or_else(|_| HeaderValue::from_static("0")),
    );
    if let Ok(value) = HeaderValue::from_str(&format!("\"{}\"", object.content_hash)) {
        headers.insert(header::ETAG, value);
    }
    if let Ok(value) = HeaderValue::from_str(&object.uploaded_at.to_rfc2822()) {
        headers.insert(header::LAST_MODIFIED, value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subdomain_names_the_bucket() {
        let (bucket, object) =
            bucket_object_names("media.example.com", "/photos/cat.png").unwrap();
        assert_eq!(bucket, "media");
        assert_eq!(object, "/photos/cat.png");
    }

    #[test]
    fn storage_subdomain_takes_bucket_from_path() {
        let (bucket, object) =
            bucket_object_names("storage.example.com:8080", "/media/photos/cat.png").unwrap();
        assert_eq!(bucket, "media");
        assert_eq!(object, "/photos/cat.png");
    }

    #[test]
    fn storage_subdomain_without_object_segment_is_rejected() {
        let err = bucket_object_names("storage.example.com", "/media").unwrap_err();
        assert_eq!(err.status, axum::http::StatusCode::NOT_FOUND);
        assert_eq!(err.message, "invalid bucket in URL");

        let err = bucket_object_names("storage.example.com", "/").unwrap_err();
        assert_eq!(err.status, axum::http::StatusCode::NOT_FOUND);
    }
}
