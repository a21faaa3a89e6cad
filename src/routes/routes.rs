//! Route table for the bucket/object API and the content surface.
//!
//! ## Structure
//! - **Bucket endpoints** (API hosts, `api.*`)
//!   - `POST   /buckets` - create bucket
//!   - `GET    /buckets/{bucket}` - fetch by id
//!   - `GET    /buckets/name/{bucket}` - fetch by name
//!   - `PUT    /buckets/{bucket}` - update
//!   - `DELETE /buckets/{bucket}` - delete (no cascade)
//!
//! - **Object endpoints**
//!   - `GET    /buckets/{bucket}/objects` - list (skip/limit)
//!   - `GET    /buckets/{bucket}/objects/list/{objects}` - batch by ids
//!   - `POST   /buckets/{bucket}/objects?name=&uploaderID=` - upload
//!   - `GET    /buckets/{bucket}/objects/{object}` - record as JSON
//!   - `DELETE /buckets/{bucket}/objects/{object}` - delete
//!   - `PUT    /buckets/{bucket}/objects/{object}/metadata` - patch metadata
//!
//! Requests to non-API hosts never reach this table: the host dispatch
//! layer serves them as bucket content (subdomain names the bucket).

use crate::{
    handlers::{
        bucket_handlers::{
            create_bucket, delete_bucket, get_bucket, get_bucket_by_name, update_bucket,
        },
        content_handlers::host_dispatch,
        health_handlers::{healthz, readyz},
        object_handlers::{
            delete_object, get_object, list_objects, list_objects_by_ids, update_object_metadata,
            upload_object,
        },
    },
    services::storage_service::StorageService,
};
use axum::{
    Router,
    http::{HeaderValue, Response, StatusCode, header},
    middleware,
    routing::{get, post, put},
};
use bytes::Bytes;
use http_body_util::Full;
use std::any::Any;
use std::backtrace::Backtrace;
use tower_http::catch_panic::CatchPanicLayer;

/// Build the full application router around a storage façade.
pub fn app(service: StorageService) -> Router {
    Router::new()
        // health endpoints (mounted at root)
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        // Bucket-level routes
        .route("/buckets", post(create_bucket))
        .route("/buckets/name/{bucket}", get(get_bucket_by_name))
        .route(
            "/buckets/{bucket}",
            get(get_bucket).put(update_bucket).delete(delete_bucket),
        )
        // Object-level routes
        .route(
            "/buckets/{bucket}/objects",
            get(list_objects).post(upload_object),
        )
        .route("/buckets/{bucket}/objects/list/{objects}", get(list_objects_by_ids))
        .route(
            "/buckets/{bucket}/objects/{object}",
            get(get_object).delete(delete_object),
        )
        .route(
            "/buckets/{bucket}/objects/{object}/metadata",
            put(update_object_metadata),
        )
        .layer(middleware::from_fn_with_state(
            service.clone(),
            host_dispatch,
        ))
        // outermost: a handler panic must still answer the request
        .layer(CatchPanicLayer::custom(panic_response))
        .with_state(service)
}

/// Turn an escaped handler panic into an opaque 500.
///
/// The payload and a captured backtrace go to the log; the client sees
/// only the generic error body.
fn panic_response(panic: Box<dyn Any + Send + 'static>) -> Response<Full<Bytes>> {
    let detail = panic
        .downcast_ref::<String>()
        .map(String::as_str)
        .or_else(|| panic.downcast_ref::<&str>().copied())
        .unwrap_or("unknown panic");
    tracing::error!(
        "handler panicked: {detail}\n{}",
        Backtrace::force_capture()
    );

    let body = serde_json::json!({
        "error": "internal server error",
        "status": StatusCode::INTERNAL_SERVER_ERROR.as_u16()
    });
    let mut response = Response::new(Full::from(body.to_string()));
    *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/json"),
    );
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::testutil::mem_pool;
    use axum::body::{Body, to_bytes};
    use axum::http::Request;
    use tower::ServiceExt;

    async fn boom() -> &'static str {
        panic!("kaboom")
    }

    #[tokio::test]
    async fn panicking_handler_answers_opaque_500() {
        let app: Router = Router::new()
            .route("/boom", get(boom))
            .layer(CatchPanicLayer::custom(panic_response));

        let response = app
            .oneshot(Request::builder().uri("/boom").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let parsed: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(parsed["error"], "internal server error");
        // the panic payload stays in the log
        assert!(!String::from_utf8_lossy(&body).contains("kaboom"));
    }

    #[tokio::test]
    async fn layered_app_still_routes_api_requests() {
        let app = app(StorageService::new(mem_pool().await));
        let request = Request::builder()
            .uri("/healthz")
            .header(header::HOST, "api.example.com")
            .body(Body::empty())
            .unwrap();

        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
