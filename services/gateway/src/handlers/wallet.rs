use axum::{
    extract::{rejection::PathRejection, Path, State},
    Json,
};

use persistence::Ledger;
use types::ids::AssetId;

use crate::auth::AuthenticatedUser;
use crate::error::AppError;
use crate::models::WalletResponse;
use crate::state::AppState;

/// Committed balance of one of the caller's wallets; zero if never funded
pub async fn get_wallet(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    asset_id: Result<Path<u32>, PathRejection>,
) -> Result<Json<WalletResponse>, AppError> {
    let Path(asset_id) = asset_id.map_err(|rejection| AppError::Validation(rejection.body_text()))?;
    let asset_id = AssetId::new(asset_id);
    let balance = state.store.balance(user.user_id, asset_id).await?;

    Ok(Json(WalletResponse {
        user_id: user.user_id,
        asset_id,
        balance,
    }))
}
