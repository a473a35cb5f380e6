use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use types::account::{User, UserStatus};
use types::ids::{AssetId, UserId};

/// Body of `POST /v1/orders`; same shape as the intake request
pub use types::order::OrderRequest as CreateOrderRequest;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WalletResponse {
    pub user_id: UserId,
    pub asset_id: AssetId,
    pub balance: Decimal,
}

/// Body of `POST /v1/users/register`
#[derive(Debug, Clone, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
}

/// Body of `POST /v1/users/login`
#[derive(Debug, Clone, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserResponse {
    pub id: UserId,
    pub email: String,
    pub status: UserStatus,
}

impl From<&User> for UserResponse {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            email: user.email.clone(),
            status: user.status,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoginResponse {
    pub user_id: UserId,
    pub token: String,
    /// Token lifetime in seconds
    pub expires_in: u64,
}

/// Error payload of every non-2xx response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    pub message: String,
}
