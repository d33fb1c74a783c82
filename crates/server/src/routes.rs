//! JSON API for the claim lifecycle.
//!
//! - `POST   /api/v1/claims`                — create a draft claim
//! - `GET    /api/v1/claims`                — list claims (filters via query)
//! - `GET    /api/v1/claims/{id}`           — fetch one claim
//! - `PATCH  /api/v1/claims/{id}`           — edit a draft/submitted claim
//! - `DELETE /api/v1/claims/{id}`           — delete a draft claim
//! - `POST   /api/v1/claims/{id}/submit`    — submit for approval
//! - `POST   /api/v1/claims/{id}/approve`   — manager approval / finance reimbursement
//! - `POST   /api/v1/claims/{id}/reject`    — reject with a reason
//! - `GET    /api/v1/claims/{id}/history`   — append-only status history
//! - `GET    /api/v1/categories`            — active category policies
//!
//! Every request acts as the principal named by the `x-principal-id`
//! header, resolved against the user directory.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderMap, HeaderName, HeaderValue, Method, StatusCode},
    routing::get,
    routing::post,
    Json, Router,
};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;
use uuid::Uuid;

use claimdesk_core::config::CorsConfig;
use claimdesk_core::lifecycle::{ClaimLifecycle, ClaimPatch, ClaimQuery, NewClaim, ReviewInput};
use claimdesk_core::{
    CategoryPolicy, Claim, ClaimId, ClaimStatus, InterfaceError, LifecycleError, Principal,
    ReimbursementMode, StatusChange,
};
use claimdesk_db::{SqlCategoryRepository, UserRepository};

#[derive(Clone)]
pub struct ApiState {
    pub lifecycle: Arc<ClaimLifecycle>,
    pub users: Arc<dyn UserRepository>,
    pub categories: Arc<SqlCategoryRepository>,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
    pub message: String,
    pub correlation_id: String,
}

type ApiError = (StatusCode, Json<ErrorBody>);

#[derive(Debug, Deserialize)]
pub struct CreateClaimRequest {
    pub amount: Decimal,
    pub tax_amount: Option<Decimal>,
    pub currency: Option<String>,
    pub category: String,
    pub description: String,
    pub expense_date: NaiveDate,
    pub receipt_ref: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateClaimRequest {
    pub amount: Option<Decimal>,
    pub tax_amount: Option<Decimal>,
    pub category: Option<String>,
    pub description: Option<String>,
    pub expense_date: Option<NaiveDate>,
    pub receipt_ref: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ApproveRequest {
    pub comments: Option<String>,
    pub reimbursement_mode: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RejectRequest {
    pub reason: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct ListClaimsQuery {
    pub status: Option<String>,
    pub owner_id: Option<String>,
    pub approver_id: Option<String>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

pub fn router(state: ApiState, cors: &CorsConfig) -> Router {
    Router::new()
        .route("/api/v1/claims", post(create_claim).get(list_claims))
        .route(
            "/api/v1/claims/{id}",
            get(get_claim).patch(update_claim).delete(delete_claim),
        )
        .route("/api/v1/claims/{id}/submit", post(submit_claim))
        .route("/api/v1/claims/{id}/approve", post(approve_claim))
        .route("/api/v1/claims/{id}/reject", post(reject_claim))
        .route("/api/v1/claims/{id}/history", get(claim_history))
        .route("/api/v1/categories", get(list_categories))
        .layer(cors_layer(cors))
        .with_state(state)
}

fn cors_layer(config: &CorsConfig) -> CorsLayer {
    let mut layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PATCH, Method::DELETE])
        .allow_headers([header::CONTENT_TYPE, HeaderName::from_static("x-principal-id")])
        .allow_credentials(config.credentials);
    if let Ok(origin) = config.origin.parse::<HeaderValue>() {
        layer = layer.allow_origin(origin);
    }
    layer
}

fn correlation_id() -> String {
    format!("req-{}", Uuid::new_v4())
}

/// The body never repeats internal detail (principal ids, current
/// status, store messages); that goes to the logs, findable by the
/// correlation id the body does carry.
fn error_body(interface: InterfaceError) -> ApiError {
    let (status, class) = match &interface {
        InterfaceError::BadRequest { .. } => (StatusCode::BAD_REQUEST, "bad_request"),
        InterfaceError::Forbidden { .. } => (StatusCode::FORBIDDEN, "forbidden"),
        InterfaceError::NotFound { .. } => (StatusCode::NOT_FOUND, "not_found"),
        InterfaceError::Conflict { .. } => (StatusCode::CONFLICT, "conflict"),
        InterfaceError::ServiceUnavailable { .. } => {
            (StatusCode::SERVICE_UNAVAILABLE, "service_unavailable")
        }
    };
    let correlation_id = match &interface {
        InterfaceError::BadRequest { correlation_id, .. }
        | InterfaceError::Forbidden { correlation_id, .. }
        | InterfaceError::NotFound { correlation_id, .. }
        | InterfaceError::Conflict { correlation_id, .. }
        | InterfaceError::ServiceUnavailable { correlation_id, .. } => correlation_id.clone(),
    };

    tracing::warn!(
        event_name = "api.request_failed",
        correlation_id = %correlation_id,
        detail = %interface,
        "request failed"
    );

    (
        status,
        Json(ErrorBody {
            error: class.to_string(),
            message: interface.user_message().to_string(),
            correlation_id,
        }),
    )
}

fn lifecycle_error(error: LifecycleError, correlation_id: &str) -> ApiError {
    error_body(error.into_interface(correlation_id))
}

fn bad_request(message: impl Into<String>, correlation_id: &str) -> ApiError {
    error_body(LifecycleError::Validation(message.into()).into_interface(correlation_id))
}

async fn resolve_principal(
    state: &ApiState,
    headers: &HeaderMap,
    correlation_id: &str,
) -> Result<Principal, ApiError> {
    let principal_id = headers
        .get("x-principal-id")
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty());

    let Some(principal_id) = principal_id else {
        tracing::warn!(
            event_name = "api.principal_missing",
            correlation_id = %correlation_id,
            "request carried no x-principal-id header"
        );
        return Err(unauthorized(correlation_id));
    };

    let user = state
        .users
        .find_by_id(principal_id)
        .await
        .map_err(|error| {
            error_body(
                LifecycleError::Store(error.to_string()).into_interface(correlation_id),
            )
        })?;

    match user {
        Some(user) => Ok(user.principal()),
        None => {
            tracing::warn!(
                event_name = "api.principal_unknown",
                correlation_id = %correlation_id,
                principal_id = %principal_id,
                "request named a principal the directory does not know"
            );
            Err(unauthorized(correlation_id))
        }
    }
}

fn unauthorized(correlation_id: &str) -> ApiError {
    (
        StatusCode::UNAUTHORIZED,
        Json(ErrorBody {
            error: "unauthorized".to_string(),
            message: "Authentication is required.".to_string(),
            correlation_id: correlation_id.to_string(),
        }),
    )
}

async fn create_claim(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Json(request): Json<CreateClaimRequest>,
) -> Result<(StatusCode, Json<Claim>), ApiError> {
    let correlation_id = correlation_id();
    let principal = resolve_principal(&state, &headers, &correlation_id).await?;

    let claim = state
        .lifecycle
        .create(
            &principal,
            NewClaim {
                amount: request.amount,
                tax_amount: request.tax_amount.unwrap_or(Decimal::ZERO),
                currency: request.currency,
                category: request.category,
                description: request.description,
                expense_date: request.expense_date,
                receipt_ref: request.receipt_ref,
            },
        )
        .await
        .map_err(|error| lifecycle_error(error, &correlation_id))?;

    Ok((StatusCode::CREATED, Json(claim)))
}

async fn list_claims(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Query(query): Query<ListClaimsQuery>,
) -> Result<Json<Vec<Claim>>, ApiError> {
    let correlation_id = correlation_id();
    let principal = resolve_principal(&state, &headers, &correlation_id).await?;

    let status = match query.status.as_deref() {
        Some(raw) => Some(
            ClaimStatus::parse(raw)
                .ok_or_else(|| bad_request(format!("unknown status `{raw}`"), &correlation_id))?,
        ),
        None => None,
    };

    let claims = state
        .lifecycle
        .list(
            &principal,
            ClaimQuery {
                owner_id: query.owner_id,
                status,
                approver_id: query.approver_id,
                limit: query.limit,
                offset: query.offset,
            },
        )
        .await
        .map_err(|error| lifecycle_error(error, &correlation_id))?;
    Ok(Json(claims))
}

async fn get_claim(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<Claim>, ApiError> {
    let correlation_id = correlation_id();
    let principal = resolve_principal(&state, &headers, &correlation_id).await?;

    let claim = state
        .lifecycle
        .get(&principal, &ClaimId(id))
        .await
        .map_err(|error| lifecycle_error(error, &correlation_id))?;
    Ok(Json(claim))
}

async fn update_claim(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(request): Json<UpdateClaimRequest>,
) -> Result<Json<Claim>, ApiError> {
    let correlation_id = correlation_id();
    let principal = resolve_principal(&state, &headers, &correlation_id).await?;

    let claim = state
        .lifecycle
        .update(
            &principal,
            &ClaimId(id),
            ClaimPatch {
                amount: request.amount,
                tax_amount: request.tax_amount,
                category: request.category,
                description: request.description,
                expense_date: request.expense_date,
                receipt_ref: request.receipt_ref,
            },
        )
        .await
        .map_err(|error| lifecycle_error(error, &correlation_id))?;
    Ok(Json(claim))
}

async fn delete_claim(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let correlation_id = correlation_id();
    let principal = resolve_principal(&state, &headers, &correlation_id).await?;

    state
        .lifecycle
        .delete(&principal, &ClaimId(id))
        .await
        .map_err(|error| lifecycle_error(error, &correlation_id))?;
    Ok(StatusCode::NO_CONTENT)
}

async fn submit_claim(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<Claim>, ApiError> {
    let correlation_id = correlation_id();
    let principal = resolve_principal(&state, &headers, &correlation_id).await?;

    let claim = state
        .lifecycle
        .submit(&principal, &ClaimId(id))
        .await
        .map_err(|error| lifecycle_error(error, &correlation_id))?;
    Ok(Json(claim))
}

async fn approve_claim(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(request): Json<ApproveRequest>,
) -> Result<Json<Claim>, ApiError> {
    let correlation_id = correlation_id();
    let principal = resolve_principal(&state, &headers, &correlation_id).await?;

    let reimbursement_mode = match request.reimbursement_mode.as_deref() {
        Some(raw) => Some(ReimbursementMode::parse(raw).ok_or_else(|| {
            bad_request(format!("unknown reimbursement mode `{raw}`"), &correlation_id)
        })?),
        None => None,
    };

    let claim = state
        .lifecycle
        .approve(
            &principal,
            &ClaimId(id),
            ReviewInput { comments: request.comments, reimbursement_mode },
        )
        .await
        .map_err(|error| lifecycle_error(error, &correlation_id))?;
    Ok(Json(claim))
}

async fn reject_claim(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(request): Json<RejectRequest>,
) -> Result<Json<Claim>, ApiError> {
    let correlation_id = correlation_id();
    let principal = resolve_principal(&state, &headers, &correlation_id).await?;

    let claim = state
        .lifecycle
        .reject(&principal, &ClaimId(id), &request.reason)
        .await
        .map_err(|error| lifecycle_error(error, &correlation_id))?;
    Ok(Json(claim))
}

async fn claim_history(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<Vec<StatusChange>>, ApiError> {
    let correlation_id = correlation_id();
    let principal = resolve_principal(&state, &headers, &correlation_id).await?;

    let history = state
        .lifecycle
        .history(&principal, &ClaimId(id))
        .await
        .map_err(|error| lifecycle_error(error, &correlation_id))?;
    Ok(Json(history))
}

async fn list_categories(
    State(state): State<ApiState>,
    headers: HeaderMap,
) -> Result<Json<Vec<CategoryPolicy>>, ApiError> {
    let correlation_id = correlation_id();
    resolve_principal(&state, &headers, &correlation_id).await?;

    let categories = state.categories.list().await.map_err(|error| {
        error_body(LifecycleError::Store(error.to_string()).into_interface(&correlation_id))
    })?;
    Ok(Json(categories.into_iter().filter(|policy| policy.is_active).collect()))
}
