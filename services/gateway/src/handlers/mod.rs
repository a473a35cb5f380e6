pub mod order;
pub mod user;
pub mod wallet;

/// Liveness check
pub async fn health() -> &'static str {
    "ok"
}
