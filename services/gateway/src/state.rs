use std::sync::Arc;
use std::time::Duration;

use order_intake::OrderIntake;
use persistence::Store;

use crate::auth::JwtKeys;

/// Token lifetime and password work factor used by the user routes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoginSettings {
    pub token_ttl: Duration,
    pub bcrypt_cost: u32,
}

#[derive(Clone)]
pub struct AppState {
    pub intake: Arc<OrderIntake>,
    pub store: Arc<dyn Store>,
    pub jwt: Arc<JwtKeys>,
    pub login: LoginSettings,
}

impl AppState {
    pub fn new(intake: Arc<OrderIntake>, store: Arc<dyn Store>, jwt: JwtKeys, login: LoginSettings) -> Self {
        Self {
            intake,
            store,
            jwt: Arc::new(jwt),
            login,
        }
    }
}
