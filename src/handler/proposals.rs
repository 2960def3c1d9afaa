use axum::{
    extract::Path,
    http::StatusCode,
    response::IntoResponse,
    routing::post,
    Extension, Json, Router,
};
use std::sync::Arc;
use uuid::Uuid;
use validator::Validate;

use crate::{dtos::marketdtos::*, error::HttpError, AppState};

pub fn proposals_handler() -> Router {
    Router::new()
        .route("/", post(submit_proposal))
        .route("/:proposal_id", post(resolve_proposal))
        .route("/:proposal_id/counteroffer", post(respond_to_counter_offer))
}

pub async fn submit_proposal(
    Extension(app_state): Extension<Arc<AppState>>,
    Json(body): Json<SubmitProposalDto>,
) -> Result<impl IntoResponse, HttpError> {
    body.validate()
        .map_err(|e| HttpError::bad_request(e.to_string()))?;

    let proposal = app_state.proposal_service.submit_proposal(body).await?;

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::success("Proposal submitted", proposal)),
    ))
}

/// Client action on a proposal: accept outright or send a counter-offer.
pub async fn resolve_proposal(
    Extension(app_state): Extension<Arc<AppState>>,
    Path(proposal_id): Path<Uuid>,
    Json(body): Json<ProposalActionDto>,
) -> Result<impl IntoResponse, HttpError> {
    body.validate()
        .map_err(|e| HttpError::bad_request(e.to_string()))?;

    let outcome = app_state
        .proposal_service
        .resolve_proposal(proposal_id, body)
        .await?;

    Ok(Json(ApiResponse::success("Proposal resolved", outcome)))
}

/// Provider response to a counter-offer: accept (runs the assignment
/// protocol) or reject (starts the re-application cooldown).
pub async fn respond_to_counter_offer(
    Extension(app_state): Extension<Arc<AppState>>,
    Path(proposal_id): Path<Uuid>,
    Json(body): Json<CounterOfferResponseDto>,
) -> Result<impl IntoResponse, HttpError> {
    body.validate()
        .map_err(|e| HttpError::bad_request(e.to_string()))?;

    let outcome = app_state
        .proposal_service
        .respond_to_counter_offer(proposal_id, body)
        .await?;

    Ok(Json(ApiResponse::success("Counter-offer resolved", outcome)))
}
