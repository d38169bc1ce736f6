use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;

use super::domain::{ListingId, ListingKind, ListingStatus, ListingSubmission};
use super::moderation::Decision;
use super::service::ListingService;
use crate::auth::{AuthProvider, SessionContext};
use crate::error::{PortalError, ValidationError};
use crate::store::ListingStore;
use crate::sync::ListingSlice;

#[derive(Debug, Default, Deserialize)]
pub(crate) struct ListParams {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct DecisionRequest {
    decision: Decision,
}

/// Router exposing submission, slice reads and moderation decisions for both listing kinds.
pub fn listing_router<S, A>(service: Arc<ListingService<S, A>>) -> Router
where
    S: ListingStore + 'static,
    A: AuthProvider + 'static,
{
    Router::new()
        .route(
            "/api/v1/listings/:kind",
            post(submit_handler::<S, A>).get(list_handler::<S, A>),
        )
        .route(
            "/api/v1/listings/:kind/:id/decision",
            post(decision_handler::<S, A>),
        )
        .with_state(service)
}

pub(crate) async fn submit_handler<S, A>(
    State(service): State<Arc<ListingService<S, A>>>,
    Path(kind): Path<String>,
    headers: HeaderMap,
    Json(submission): Json<ListingSubmission>,
) -> Result<Response, PortalError>
where
    S: ListingStore + 'static,
    A: AuthProvider + 'static,
{
    let kind: ListingKind = kind.parse()?;
    let described = submission.details.kind();
    if described != kind {
        let message = format!("details describe a {}, not a {}", described.label(), kind.label());
        return Err(ValidationError::new("kind", message).into());
    }

    let session = SessionContext::from_headers(&headers);
    let listing = service.submit_listing(&session, submission).await?;
    Ok((StatusCode::CREATED, Json(listing)).into_response())
}

pub(crate) async fn list_handler<S, A>(
    State(service): State<Arc<ListingService<S, A>>>,
    Path(kind): Path<String>,
    Query(params): Query<ListParams>,
    headers: HeaderMap,
) -> Result<Response, PortalError>
where
    S: ListingStore + 'static,
    A: AuthProvider + 'static,
{
    let kind: ListingKind = kind.parse()?;
    let status = match params.status.as_deref() {
        Some(raw) => raw.parse()?,
        None => ListingStatus::Approved,
    };
    let slice = ListingSlice {
        kind,
        status,
        limit: params.limit,
    };

    let session = SessionContext::from_headers(&headers);
    let listings = service.list(&session, slice).await?;
    Ok(Json(listings).into_response())
}

pub(crate) async fn decision_handler<S, A>(
    State(service): State<Arc<ListingService<S, A>>>,
    Path((kind, id)): Path<(String, String)>,
    headers: HeaderMap,
    Json(request): Json<DecisionRequest>,
) -> Result<Response, PortalError>
where
    S: ListingStore + 'static,
    A: AuthProvider + 'static,
{
    let kind: ListingKind = kind.parse()?;
    let session = SessionContext::from_headers(&headers);
    let listing = service
        .decide(&session, kind, &ListingId(id), request.decision)
        .await?;
    Ok(Json(listing).into_response())
}
