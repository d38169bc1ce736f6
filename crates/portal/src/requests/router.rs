use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;

use super::{
    ContactService, ContactSubmission, ExchangeRateService, ShippingService, ShippingStatus,
    ShippingSubmission, TransferService, TransferSubmission,
};
use crate::auth::{AuthProvider, SessionContext};
use crate::blob::BlobStore;
use crate::error::PortalError;
use crate::pricing::{estimate_shipping_cost, parse_weight, quote, WeightUnit};
use crate::store::RecordStore;

/// Services behind the non-moderated request forms, shared by their routes.
pub struct RequestServices<S, A, B> {
    pub shipping: ShippingService<S, A>,
    pub rates: ExchangeRateService<S, A>,
    pub transfers: TransferService<S, B>,
    pub contact: ContactService<S>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct EstimateParams {
    weight: String,
    #[serde(default)]
    unit: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct ShippingListParams {
    #[serde(default)]
    status: Option<ShippingStatus>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct StatusChange {
    status: ShippingStatus,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct HistoryParams {
    #[serde(default)]
    limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct PublishRate {
    rate: f64,
}

pub fn request_router<S, A, B>(services: Arc<RequestServices<S, A, B>>) -> Router
where
    S: RecordStore + 'static,
    A: AuthProvider + 'static,
    B: BlobStore + 'static,
{
    Router::new()
        .route("/api/v1/shipping/estimate", get(estimate_handler))
        .route(
            "/api/v1/shipping/requests",
            post(submit_shipping_handler::<S, A, B>).get(list_shipping_handler::<S, A, B>),
        )
        .route(
            "/api/v1/shipping/requests/:id/status",
            post(advance_shipping_handler::<S, A, B>),
        )
        .route(
            "/api/v1/exchange-rates/current",
            get(current_rate_handler::<S, A, B>),
        )
        .route(
            "/api/v1/exchange-rates",
            get(rate_history_handler::<S, A, B>).post(publish_rate_handler::<S, A, B>),
        )
        .route("/api/v1/transfers", post(submit_transfer_handler::<S, A, B>))
        .route(
            "/api/v1/transfers/:reference",
            get(transfer_status_handler::<S, A, B>),
        )
        .route("/api/v1/contact", post(contact_handler::<S, A, B>))
        .with_state(services)
}

pub(crate) async fn estimate_handler(
    Query(params): Query<EstimateParams>,
) -> Result<Response, PortalError> {
    let weight = parse_weight(&params.weight)?;
    let unit = match params.unit.as_deref() {
        Some(raw) => raw.parse::<WeightUnit>()?,
        None => WeightUnit::Kg,
    };
    estimate_shipping_cost(weight, unit)?;
    Ok(Json(quote(weight, unit)).into_response())
}

pub(crate) async fn submit_shipping_handler<S, A, B>(
    State(services): State<Arc<RequestServices<S, A, B>>>,
    Json(submission): Json<ShippingSubmission>,
) -> Result<Response, PortalError>
where
    S: RecordStore + 'static,
    A: AuthProvider + 'static,
    B: BlobStore + 'static,
{
    let stored = services.shipping.submit(submission).await?;
    Ok((StatusCode::CREATED, Json(stored)).into_response())
}

pub(crate) async fn list_shipping_handler<S, A, B>(
    State(services): State<Arc<RequestServices<S, A, B>>>,
    Query(params): Query<ShippingListParams>,
    headers: HeaderMap,
) -> Result<Response, PortalError>
where
    S: RecordStore + 'static,
    A: AuthProvider + 'static,
    B: BlobStore + 'static,
{
    let session = SessionContext::from_headers(&headers);
    let requests = services.shipping.list(&session, params.status).await?;
    Ok(Json(requests).into_response())
}

pub(crate) async fn advance_shipping_handler<S, A, B>(
    State(services): State<Arc<RequestServices<S, A, B>>>,
    Path(id): Path<u64>,
    headers: HeaderMap,
    Json(change): Json<StatusChange>,
) -> Result<Response, PortalError>
where
    S: RecordStore + 'static,
    A: AuthProvider + 'static,
    B: BlobStore + 'static,
{
    let session = SessionContext::from_headers(&headers);
    let updated = services
        .shipping
        .advance(&session, id, change.status)
        .await?;
    Ok(Json(updated).into_response())
}

pub(crate) async fn current_rate_handler<S, A, B>(
    State(services): State<Arc<RequestServices<S, A, B>>>,
) -> Result<Response, PortalError>
where
    S: RecordStore + 'static,
    A: AuthProvider + 'static,
    B: BlobStore + 'static,
{
    Ok(Json(services.rates.current().await?).into_response())
}

pub(crate) async fn rate_history_handler<S, A, B>(
    State(services): State<Arc<RequestServices<S, A, B>>>,
    Query(params): Query<HistoryParams>,
) -> Result<Response, PortalError>
where
    S: RecordStore + 'static,
    A: AuthProvider + 'static,
    B: BlobStore + 'static,
{
    Ok(Json(services.rates.history(params.limit).await?).into_response())
}

pub(crate) async fn publish_rate_handler<S, A, B>(
    State(services): State<Arc<RequestServices<S, A, B>>>,
    headers: HeaderMap,
    Json(body): Json<PublishRate>,
) -> Result<Response, PortalError>
where
    S: RecordStore + 'static,
    A: AuthProvider + 'static,
    B: BlobStore + 'static,
{
    let session = SessionContext::from_headers(&headers);
    let stored = services.rates.publish(&session, body.rate).await?;
    Ok((StatusCode::CREATED, Json(stored)).into_response())
}

pub(crate) async fn submit_transfer_handler<S, A, B>(
    State(services): State<Arc<RequestServices<S, A, B>>>,
    Json(submission): Json<TransferSubmission>,
) -> Result<Response, PortalError>
where
    S: RecordStore + 'static,
    A: AuthProvider + 'static,
    B: BlobStore + 'static,
{
    let stored = services.transfers.submit(submission).await?;
    Ok((StatusCode::CREATED, Json(stored)).into_response())
}

pub(crate) async fn transfer_status_handler<S, A, B>(
    State(services): State<Arc<RequestServices<S, A, B>>>,
    Path(reference): Path<String>,
) -> Result<Response, PortalError>
where
    S: RecordStore + 'static,
    A: AuthProvider + 'static,
    B: BlobStore + 'static,
{
    Ok(Json(services.transfers.get(&reference).await?).into_response())
}

pub(crate) async fn contact_handler<S, A, B>(
    State(services): State<Arc<RequestServices<S, A, B>>>,
    Json(submission): Json<ContactSubmission>,
) -> Result<Response, PortalError>
where
    S: RecordStore + 'static,
    A: AuthProvider + 'static,
    B: BlobStore + 'static,
{
    let stored = services.contact.submit(submission).await?;
    Ok((StatusCode::CREATED, Json(stored)).into_response())
}
