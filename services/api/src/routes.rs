use crate::infra::{AppState, Portal};
use axum::body::Bytes;
use axum::extract::{DefaultBodyLimit, Query};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Extension, Json, Router};
use portal::error::{PortalError, ValidationError};
use portal::listings::listing_router;
use portal::requests::{request_router, AttachmentKind};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;

#[derive(Debug, Default, Deserialize)]
pub(crate) struct UploadParams {
    #[serde(default)]
    pub(crate) filename: Option<String>,
}

pub(crate) fn with_portal_routes(portal: &Portal, max_upload_bytes: usize) -> Router {
    let uploads = Router::new()
        .route("/api/v1/uploads/payment-proofs", post(upload_proof_endpoint))
        .route("/api/v1/uploads/signatures", post(upload_signature_endpoint))
        .layer(DefaultBodyLimit::max(max_upload_bytes));

    listing_router(Arc::clone(&portal.listings))
        .merge(request_router(Arc::clone(&portal.requests)))
        .merge(uploads)
        .route("/health", get(healthcheck))
        .route("/ready", get(readiness_endpoint))
        .route("/metrics", get(metrics_endpoint))
}

pub(crate) async fn healthcheck() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

pub(crate) async fn readiness_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    let ready = state.readiness.load(std::sync::atomic::Ordering::Relaxed);
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let payload = if ready {
        json!({ "status": "ready" })
    } else {
        json!({ "status": "initializing" })
    };

    (status, Json(payload))
}

pub(crate) async fn metrics_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.render(),
    )
}

pub(crate) async fn upload_proof_endpoint(
    Extension(state): Extension<AppState>,
    Query(params): Query<UploadParams>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, PortalError> {
    store_attachment(&state, AttachmentKind::PaymentProof, &params, &headers, body).await
}

pub(crate) async fn upload_signature_endpoint(
    Extension(state): Extension<AppState>,
    Query(params): Query<UploadParams>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, PortalError> {
    store_attachment(&state, AttachmentKind::Signature, &params, &headers, body).await
}

async fn store_attachment(
    state: &AppState,
    kind: AttachmentKind,
    params: &UploadParams,
    headers: &HeaderMap,
    body: Bytes,
) -> Result<Response, PortalError> {
    let content_type = upload_content_type(headers, params.filename.as_deref()).ok_or_else(|| {
        ValidationError::new(
            "content_type",
            "send a Content-Type header or a filename with an image extension",
        )
    })?;
    let path = state
        .requests
        .transfers
        .upload_attachment(kind, body.to_vec(), &content_type)
        .await?;
    Ok((StatusCode::CREATED, Json(json!({ "path": path }))).into_response())
}

/// Explicit header first; browsers posting raw files often send octet-stream, so fall back to
/// the file name's extension.
pub(crate) fn upload_content_type(headers: &HeaderMap, filename: Option<&str>) -> Option<String> {
    let declared = headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty() && *value != "application/octet-stream")
        .map(str::to_string);

    declared.or_else(|| {
        filename
            .and_then(|name| mime_guess::from_path(name).first())
            .map(|guess| guess.essence_str().to_string())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use metrics_exporter_prometheus::PrometheusBuilder;
    use portal::config::PortalConfig;
    use serde_json::Value;
    use std::sync::atomic::AtomicBool;
    use tower::ServiceExt;

    fn app(ready: bool) -> (Router, Portal) {
        let config = PortalConfig::default();
        let portal = Portal::in_memory(&config);
        let state = AppState {
            readiness: Arc::new(AtomicBool::new(ready)),
            metrics: Arc::new(PrometheusBuilder::new().build_recorder().handle()),
            requests: Arc::clone(&portal.requests),
        };
        let router = with_portal_routes(&portal, config.max_upload_bytes).layer(Extension(state));
        (router, portal)
    }

    async fn json_body(response: Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn readiness_reflects_startup_flag() {
        let (router, _) = app(false);
        let response = router
            .clone()
            .oneshot(Request::get("/ready").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

        let (router, _) = app(true);
        let response = router
            .oneshot(Request::get("/ready").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["status"], "ready");
    }

    #[tokio::test]
    async fn health_and_listing_routes_are_mounted() {
        let (router, _) = app(true);
        let response = router
            .clone()
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = router
            .oneshot(
                Request::get("/api/v1/listings/jobs")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await, json!([]));
    }

    #[tokio::test]
    async fn upload_guesses_type_from_filename() {
        let (router, portal) = app(true);
        let response = router
            .oneshot(
                Request::post("/api/v1/uploads/payment-proofs?filename=receipt.png")
                    .body(Body::from(vec![0x89, b'P', b'N', b'G']))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);

        let path = json_body(response).await["path"]
            .as_str()
            .expect("path returned")
            .to_string();
        assert!(path.ends_with(".png"));
        let stored = portal
            .blobs
            .get("payment-proofs", &path)
            .expect("blob stored");
        assert_eq!(stored.content_type, "image/png");
    }

    #[tokio::test]
    async fn upload_rejects_documents() {
        let (router, portal) = app(true);
        let response = router
            .oneshot(
                Request::post("/api/v1/uploads/signatures")
                    .header(header::CONTENT_TYPE, "application/pdf")
                    .body(Body::from("%PDF-1.7"))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert!(portal.blobs.is_empty());
    }

    #[test]
    fn declared_content_type_wins_over_filename() {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_TYPE, "image/jpeg".parse().unwrap());
        assert_eq!(
            upload_content_type(&headers, Some("scan.png")).as_deref(),
            Some("image/jpeg")
        );

        headers.insert(header::CONTENT_TYPE, "application/octet-stream".parse().unwrap());
        assert_eq!(
            upload_content_type(&headers, Some("scan.png")).as_deref(),
            Some("image/png")
        );
        assert_eq!(upload_content_type(&HeaderMap::new(), None), None);
    }
}
