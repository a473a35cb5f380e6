use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    Json,
};
use tracing::{debug, info};

use persistence::UserStore;

use crate::auth::{hash_password, verify_password};
use crate::error::AppError;
use crate::models::{LoginRequest, LoginResponse, RegisterRequest, UserResponse};
use crate::state::AppState;

const MIN_PASSWORD_LEN: usize = 8;
// bcrypt ignores input past 72 bytes
const MAX_PASSWORD_LEN: usize = 72;
const MAX_EMAIL_LEN: usize = 254;

pub async fn register(
    State(state): State<AppState>,
    payload: Result<Json<RegisterRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<UserResponse>), AppError> {
    let Json(request) = payload.map_err(|rejection| AppError::Validation(rejection.body_text()))?;
    let email = normalize_email(&request.email)?;
    let len = request.password.len();
    if !(MIN_PASSWORD_LEN..=MAX_PASSWORD_LEN).contains(&len) {
        return Err(AppError::Validation(format!(
            "password must be {MIN_PASSWORD_LEN} to {MAX_PASSWORD_LEN} bytes"
        )));
    }

    let hash = hash_password(request.password, state.login.bcrypt_cost).await?;
    let user = state.store.register_user(&email, hash).await?;
    info!(user_id = %user.id, "user registered");
    Ok((StatusCode::CREATED, Json(UserResponse::from(&user))))
}

/// Exchange email and password for a bearer token
///
/// Unknown emails and wrong passwords get the same answer.
pub async fn login(
    State(state): State<AppState>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<Json<LoginResponse>, AppError> {
    let Json(request) = payload.map_err(|rejection| AppError::Validation(rejection.body_text()))?;
    let email = normalize_email(&request.email)?;

    let Some(user) = state.store.user_by_email(&email).await? else {
        debug!("login for unknown email");
        return Err(invalid_credentials());
    };
    if !verify_password(request.password, user.password_hash.clone()).await? {
        debug!(user_id = %user.id, "login with wrong password");
        return Err(invalid_credentials());
    }

    let token = state.jwt.issue(user.id, state.login.token_ttl)?;
    info!(user_id = %user.id, "user logged in");
    Ok(Json(LoginResponse {
        user_id: user.id,
        token,
        expires_in: state.login.token_ttl.as_secs(),
    }))
}

fn invalid_credentials() -> AppError {
    AppError::Unauthorized("invalid email or password".into())
}

fn normalize_email(raw: &str) -> Result<String, AppError> {
    let email = raw.trim().to_ascii_lowercase();
    let well_formed = email.len() <= MAX_EMAIL_LEN
        && email
            .split_once('@')
            .is_some_and(|(local, domain)| !local.is_empty() && !domain.is_empty() && !domain.contains('@'));
    if well_formed {
        Ok(email)
    } else {
        Err(AppError::Validation(format!("invalid email address: {raw:?}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_email() {
        assert_eq!(normalize_email("  Alice@Example.COM ").unwrap(), "alice@example.com");
        for bad in ["", "alice", "@example.com", "alice@", "a@b@c"] {
            assert!(matches!(normalize_email(bad), Err(AppError::Validation(_))), "{bad}");
        }
    }
}
