//! Gateway
//!
//! HTTP edge of the exchange core and the wiring that runs Order Intake,
//! the Matching Engine and Settlement in one process.
//!
//! # Modules
//! - `app`: Component wiring, demo seed data, staged worker shutdown
//! - `auth`: HS256 bearer tokens and bcrypt password hashing
//! - `config`: Environment configuration
//! - `error`: HTTP error mapping with stable codes
//! - `handlers`: User, order, wallet and health routes
//! - `router`: Route table and HTTP layers

pub mod app;
pub mod auth;
pub mod config;
pub mod error;
pub mod handlers;
pub mod models;
pub mod router;
pub mod state;

pub use app::{Exchange, Workers};
pub use config::Config;
pub use router::create_router;
pub use state::AppState;
