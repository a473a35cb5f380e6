use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection},
        Path, State,
    },
    http::StatusCode,
    Json,
};
use tracing::debug;

use persistence::OrderStore;
use types::ids::OrderId;
use types::order::Order;

use crate::auth::AuthenticatedUser;
use crate::error::AppError;
use crate::models::CreateOrderRequest;
use crate::state::AppState;

pub async fn create_order(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    payload: Result<Json<CreateOrderRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Order>), AppError> {
    let Json(request) = payload.map_err(|rejection| AppError::Validation(rejection.body_text()))?;
    debug!(user_id = %user.user_id, pair = %request.pair_code, side = ?request.side, "order submitted");

    let order = state.intake.submit(user.user_id, request).await?;
    Ok((StatusCode::CREATED, Json(order)))
}

/// The caller's order; another user's order is reported as missing
pub async fn get_order(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    id: Result<Path<u64>, PathRejection>,
) -> Result<Json<Order>, AppError> {
    let Path(id) = id.map_err(|rejection| AppError::Validation(rejection.body_text()))?;
    let order_id = OrderId::new(id);

    match state.store.order(order_id).await? {
        Some(order) if order.user_id == user.user_id => Ok(Json(order)),
        _ => Err(AppError::NotFound(format!("order {order_id}"))),
    }
}
