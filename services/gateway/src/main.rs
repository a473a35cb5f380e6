//! Exchange gateway binary
//!
//! Serves the HTTP API and runs the intake, matching and settlement workers
//! until SIGINT or SIGTERM. See [`gateway::config`] for the environment
//! variables. `RUST_LOG` controls log filtering (default: info).

use anyhow::Context;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use gateway::app::DEMO_USERS;
use gateway::config::{self, Config, DEV_JWT_SECRET};
use gateway::Exchange;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    config::load_dotenv();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Config::from_env().context("failed to load configuration")?;
    tracing::info!(
        http_addr = %config.http_addr,
        order_topic = %config.order_topic,
        trade_topic = %config.trade_topic,
        seed_demo = config.seed_demo,
        "configuration loaded"
    );
    if config.jwt_secret == DEV_JWT_SECRET {
        tracing::warn!("EXCHANGE_JWT_SECRET not set, using the development secret");
    }

    let exchange = Exchange::new(config.clone());
    if config.seed_demo {
        exchange.seed_demo();
        for user_id in DEMO_USERS {
            let token = exchange.jwt().issue(user_id, Duration::from_secs(24 * 3600))?;
            tracing::info!(user_id = %user_id, token = %token, "demo bearer token");
        }
    }

    let workers = exchange.start();

    let listener = TcpListener::bind(config.http_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.http_addr))?;
    tracing::info!("listening on {}", config.http_addr);

    let shutdown = CancellationToken::new();
    tokio::spawn(await_shutdown(shutdown.clone()));

    axum::serve(listener, exchange.router())
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await
        .context("http server failed")?;

    tracing::info!("http server stopped, draining workers");
    workers.shutdown().await;
    Ok(())
}

async fn await_shutdown(shutdown: CancellationToken) {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            tracing::error!(error = %err, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(err) => {
                tracing::error!(error = %err, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => tracing::info!("received ctrl-c, shutting down"),
        () = terminate => tracing::info!("received SIGTERM, shutting down"),
    }

    shutdown.cancel();
}
