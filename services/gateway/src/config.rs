//! Process configuration
//!
//! Every setting comes from an `EXCHANGE_*` environment variable and falls
//! back to its default when unset. A `.env` file in the working directory
//! or any ancestor is loaded first.
//!
//! - `EXCHANGE_HTTP_ADDR`: listen address (default: 0.0.0.0:8080)
//! - `EXCHANGE_JWT_SECRET`: HS256 secret for bearer tokens
//! - `EXCHANGE_TOKEN_TTL_SECS`: lifetime of tokens issued at login (default: 86400)
//! - `EXCHANGE_BCRYPT_COST`: bcrypt work factor for new passwords (default: 12)
//! - `EXCHANGE_LOCK_TIMEOUT_MS`: wait for a lock (default: 5000)
//! - `EXCHANGE_LOCK_TTL_MS`: lease time-to-live (default: 30000)
//! - `EXCHANGE_REQUEST_TIMEOUT_MS`: order submission budget (default: 10000)
//! - `EXCHANGE_HANDLER_TIMEOUT_MS`: settlement budget per delivery (default: 10000)
//! - `EXCHANGE_OUTBOX_INTERVAL_MS`: outbox relay period (default: 200)
//! - `EXCHANGE_ORDER_TOPIC`: order channel topic (default: orders)
//! - `EXCHANGE_TRADE_TOPIC`: trade channel topic (default: trades)
//! - `EXCHANGE_SEED_DEMO`: seed demo pairs, users and balances (default: true)

use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;

use matching_engine::MatchingConfig;
use messaging::{ORDER_TOPIC, TRADE_TOPIC};
use order_intake::{IntakeConfig, OutboxConfig};
use settlement::SettlementConfig;

use crate::state::LoginSettings;

/// Secret used when `EXCHANGE_JWT_SECRET` is unset; only fit for local runs
pub const DEV_JWT_SECRET: &str = "exchange-dev-secret";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value {value:?} for {key}")]
    InvalidValue { key: &'static str, value: String },
}

#[derive(Debug, Clone)]
pub struct Config {
    pub http_addr: SocketAddr,
    pub jwt_secret: String,
    pub token_ttl: Duration,
    pub bcrypt_cost: u32,
    pub lock_timeout: Duration,
    pub lock_ttl: Duration,
    pub request_timeout: Duration,
    pub handler_timeout: Duration,
    pub outbox_interval: Duration,
    pub order_topic: String,
    pub trade_topic: String,
    pub seed_demo: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            http_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            jwt_secret: DEV_JWT_SECRET.to_string(),
            token_ttl: Duration::from_secs(24 * 3600),
            bcrypt_cost: bcrypt::DEFAULT_COST,
            lock_timeout: Duration::from_millis(5000),
            lock_ttl: Duration::from_millis(30_000),
            request_timeout: Duration::from_millis(10_000),
            handler_timeout: Duration::from_millis(10_000),
            outbox_interval: Duration::from_millis(200),
            order_topic: ORDER_TOPIC.to_string(),
            trade_topic: TRADE_TOPIC.to_string(),
            seed_demo: true,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Config::default();

        let http_addr = match std::env::var("EXCHANGE_HTTP_ADDR") {
            Ok(value) => value.parse().map_err(|_| ConfigError::InvalidValue {
                key: "EXCHANGE_HTTP_ADDR",
                value,
            })?,
            Err(_) => defaults.http_addr,
        };

        Ok(Self {
            http_addr,
            jwt_secret: std::env::var("EXCHANGE_JWT_SECRET").unwrap_or(defaults.jwt_secret),
            token_ttl: std::env::var("EXCHANGE_TOKEN_TTL_SECS")
                .ok()
                .and_then(|v| v.parse::<u64>().ok())
                .map_or(defaults.token_ttl, Duration::from_secs),
            bcrypt_cost: std::env::var("EXCHANGE_BCRYPT_COST")
                .ok()
                .and_then(|v| v.parse::<u32>().ok())
                .filter(|cost| (4..=31).contains(cost))
                .unwrap_or(defaults.bcrypt_cost),
            lock_timeout: parse_env_duration_millis("EXCHANGE_LOCK_TIMEOUT_MS", defaults.lock_timeout),
            lock_ttl: parse_env_duration_millis("EXCHANGE_LOCK_TTL_MS", defaults.lock_ttl),
            request_timeout: parse_env_duration_millis("EXCHANGE_REQUEST_TIMEOUT_MS", defaults.request_timeout),
            handler_timeout: parse_env_duration_millis("EXCHANGE_HANDLER_TIMEOUT_MS", defaults.handler_timeout),
            outbox_interval: parse_env_duration_millis("EXCHANGE_OUTBOX_INTERVAL_MS", defaults.outbox_interval),
            order_topic: std::env::var("EXCHANGE_ORDER_TOPIC").unwrap_or(defaults.order_topic),
            trade_topic: std::env::var("EXCHANGE_TRADE_TOPIC").unwrap_or(defaults.trade_topic),
            seed_demo: parse_env_bool("EXCHANGE_SEED_DEMO", defaults.seed_demo),
        })
    }

    pub fn login(&self) -> LoginSettings {
        LoginSettings {
            token_ttl: self.token_ttl,
            bcrypt_cost: self.bcrypt_cost,
        }
    }

    pub fn intake(&self) -> IntakeConfig {
        IntakeConfig {
            order_topic: self.order_topic.clone(),
            lock_timeout: self.lock_timeout,
            request_timeout: self.request_timeout,
        }
    }

    pub fn outbox(&self) -> OutboxConfig {
        OutboxConfig {
            interval: self.outbox_interval,
            ..OutboxConfig::default()
        }
    }

    pub fn matching(&self) -> MatchingConfig {
        MatchingConfig {
            order_topic: self.order_topic.clone(),
            trade_topic: self.trade_topic.clone(),
            ..MatchingConfig::default()
        }
    }

    pub fn settlement(&self) -> SettlementConfig {
        SettlementConfig {
            trade_topic: self.trade_topic.clone(),
            lock_timeout: self.lock_timeout,
            handler_timeout: self.handler_timeout,
            ..SettlementConfig::default()
        }
    }
}

/// Load `.env` from the working directory, or the nearest ancestor that has one
pub fn load_dotenv() {
    if dotenvy::dotenv().is_ok() {
        return;
    }

    if let Ok(cwd) = std::env::current_dir() {
        let mut dir = cwd.as_path();
        while let Some(parent) = dir.parent() {
            let env_path = parent.join(".env");
            if env_path.exists() {
                let _ = dotenvy::from_path(&env_path);
                return;
            }
            dir = parent;
        }
    }
}

fn parse_env_duration_millis(key: &str, default: Duration) -> Duration {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .map_or(default, Duration::from_millis)
}

fn parse_env_bool(key: &str, default: bool) -> bool {
    let value = std::env::var(key).ok().map(|v| v.to_ascii_lowercase());
    match value.as_deref() {
        Some("1" | "true" | "yes" | "on") => true,
        Some("0" | "false" | "no" | "off") => false,
        _ => default,
    }
}
