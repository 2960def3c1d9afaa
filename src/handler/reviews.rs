use axum::{http::StatusCode, response::IntoResponse, routing::post, Extension, Json, Router};
use std::sync::Arc;
use validator::Validate;

use crate::{dtos::marketdtos::*, error::HttpError, AppState};

pub fn reviews_handler() -> Router {
    Router::new().route("/", post(submit_review))
}

pub async fn submit_review(
    Extension(app_state): Extension<Arc<AppState>>,
    Json(body): Json<SubmitReviewDto>,
) -> Result<impl IntoResponse, HttpError> {
    body.validate()
        .map_err(|e| HttpError::bad_request(e.to_string()))?;

    let review = app_state.reputation_service.submit_review(body).await?;

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::success("Review recorded", review)),
    ))
}
