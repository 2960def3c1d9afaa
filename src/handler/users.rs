use axum::{
    extract::Path,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Extension, Json, Router,
};
use std::sync::Arc;
use uuid::Uuid;
use validator::Validate;

use crate::{
    db::marketdb::MarketStore,
    dtos::marketdtos::*,
    error::HttpError,
    utils::currency::wei_to_eth_string,
    AppState,
};

pub fn users_handler() -> Router {
    Router::new()
        .route("/", post(create_user).get(list_users))
        .route("/:user_id", get(get_user))
        .route("/:user_id/balance", get(get_balance))
}

pub async fn create_user(
    Extension(app_state): Extension<Arc<AppState>>,
    Json(body): Json<CreateUserDto>,
) -> Result<impl IntoResponse, HttpError> {
    body.validate()
        .map_err(|e| HttpError::bad_request(e.to_string()))?;

    let user = app_state
        .db_client
        .create_user(body.email, body.wallet_address, body.wallet_key)
        .await
        .map_err(|e| match &e {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                HttpError::conflict("A user with this email already exists")
            }
            _ => HttpError::server_error(e.to_string()),
        })?;

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::success("User created", user)),
    ))
}

pub async fn list_users(
    Extension(app_state): Extension<Arc<AppState>>,
) -> Result<impl IntoResponse, HttpError> {
    let users = app_state
        .db_client
        .list_users()
        .await
        .map_err(|e| HttpError::server_error(e.to_string()))?;

    Ok(Json(ApiResponse::success("Users retrieved", users)))
}

pub async fn get_user(
    Extension(app_state): Extension<Arc<AppState>>,
    Path(user_id): Path<Uuid>,
) -> Result<impl IntoResponse, HttpError> {
    let user = app_state
        .db_client
        .get_user(user_id)
        .await
        .map_err(|e| HttpError::server_error(e.to_string()))?
        .ok_or_else(|| HttpError::not_found("User not found"))?;

    Ok(Json(ApiResponse::success("User retrieved", user)))
}

/// On-chain wallet balance for a user, in wei and formatted ETH.
pub async fn get_balance(
    Extension(app_state): Extension<Arc<AppState>>,
    Path(user_id): Path<Uuid>,
) -> Result<impl IntoResponse, HttpError> {
    let user = app_state
        .db_client
        .get_user(user_id)
        .await
        .map_err(|e| HttpError::server_error(e.to_string()))?
        .ok_or_else(|| HttpError::not_found("User not found"))?;

    let balance = app_state
        .escrow_gateway
        .wallet_balance(&user.wallet_address)
        .await?;

    Ok(Json(ApiResponse::success(
        "Balance retrieved",
        BalanceResponseDto {
            user_id: user.id,
            wallet_address: user.wallet_address,
            eth: wei_to_eth_string(&balance),
            wei: balance.to_string(),
        },
    )))
}
