use axum::{
    extract::{Path, Query},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Extension, Json, Router,
};
use std::sync::Arc;
use uuid::Uuid;
use validator::Validate;

use crate::{
    db::marketdb::{JobFilter, MarketStore},
    dtos::marketdtos::*,
    error::HttpError,
    AppState,
};

pub fn jobs_handler() -> Router {
    Router::new()
        .route("/", post(create_job).get(list_jobs))
        .route("/:job_id", get(get_job).delete(delete_job))
        .route("/:job_id/approve", post(approve_completion))
        .route("/:job_id/contract-status", get(contract_status))
        .route("/:job_id/proposals", get(list_job_proposals))
        .route("/:job_id/reviews", get(list_job_reviews))
}

pub async fn create_job(
    Extension(app_state): Extension<Arc<AppState>>,
    Json(body): Json<CreateJobDto>,
) -> Result<impl IntoResponse, HttpError> {
    body.validate()
        .map_err(|e| HttpError::bad_request(e.to_string()))?;

    let job = app_state.settlement_service.create_job(body).await?;

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::success("Job created successfully", job)),
    ))
}

pub async fn list_jobs(
    Extension(app_state): Extension<Arc<AppState>>,
    Query(params): Query<JobFilterQuery>,
) -> Result<impl IntoResponse, HttpError> {
    let filter = JobFilter {
        status: params.status,
        category: params.category,
        client_id: params.client_id,
        provider_id: params.provider_id,
    };
    let jobs = app_state.settlement_service.list_jobs(&filter).await?;

    Ok(Json(ApiResponse::success("Jobs retrieved", jobs)))
}

pub async fn get_job(
    Extension(app_state): Extension<Arc<AppState>>,
    Path(job_id): Path<Uuid>,
) -> Result<impl IntoResponse, HttpError> {
    let detail = app_state.settlement_service.job_detail(job_id).await?;

    Ok(Json(ApiResponse::success("Job retrieved", detail)))
}

pub async fn delete_job(
    Extension(app_state): Extension<Arc<AppState>>,
    Path(job_id): Path<Uuid>,
    Json(body): Json<DeleteJobDto>,
) -> Result<impl IntoResponse, HttpError> {
    app_state
        .settlement_service
        .delete_job(job_id, body.caller_id)
        .await?;

    Ok(Json(ApiResponse::success("Job deleted", serde_json::json!({ "jobId": job_id }))))
}

pub async fn approve_completion(
    Extension(app_state): Extension<Arc<AppState>>,
    Path(job_id): Path<Uuid>,
    Json(body): Json<ApproveCompletionDto>,
) -> Result<impl IntoResponse, HttpError> {
    let outcome = app_state
        .settlement_service
        .approve_completion(job_id, body.caller_id)
        .await?;

    let message = if outcome.both_approved {
        "Both parties approved; job completed"
    } else {
        "Approval recorded; awaiting the other party"
    };

    Ok(Json(ApiResponse::success(message, outcome)))
}

pub async fn contract_status(
    Extension(app_state): Extension<Arc<AppState>>,
    Path(job_id): Path<Uuid>,
    Query(params): Query<CallerQuery>,
) -> Result<impl IntoResponse, HttpError> {
    let status = app_state
        .settlement_service
        .contract_status(job_id, params.caller_id)
        .await?;

    Ok(Json(ApiResponse::success("Contract status retrieved", status)))
}

pub async fn list_job_proposals(
    Extension(app_state): Extension<Arc<AppState>>,
    Path(job_id): Path<Uuid>,
) -> Result<impl IntoResponse, HttpError> {
    let proposals = app_state
        .db_client
        .proposals_for_job(job_id)
        .await
        .map_err(|e| HttpError::server_error(e.to_string()))?;

    Ok(Json(ApiResponse::success("Proposals retrieved", proposals)))
}

pub async fn list_job_reviews(
    Extension(app_state): Extension<Arc<AppState>>,
    Path(job_id): Path<Uuid>,
) -> Result<impl IntoResponse, HttpError> {
    let reviews = app_state
        .db_client
        .reviews_for_job(job_id)
        .await
        .map_err(|e| HttpError::server_error(e.to_string()))?;

    Ok(Json(ApiResponse::success("Reviews retrieved", reviews)))
}
