//! HTTP surface: thin axum adapter over the ledger service.

mod error;
mod handlers;

use anyhow::{Context, Result};
use axum::routing::{get, post};
use axum::Router;
use tokio::net::TcpListener;
use tokio::signal;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::application::LedgerService;

/// Build the router. The same router backs `serve` and the black-box tests.
pub fn router(service: LedgerService) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/create-wallet/", post(handlers::create_wallet))
        .route("/wallet/add/", post(handlers::add_money))
        .route("/wallet/spend/", post(handlers::spend_money))
        .route("/wallet/transfer/", post(handlers::transfer_money))
        .route("/wallet/:wallet_id/balance/", get(handlers::wallet_balance))
        .route(
            "/wallet/:wallet_id/transactions/",
            get(handlers::wallet_transactions),
        )
        .route("/wallet/:wallet_id/summary/", get(handlers::wallet_summary))
        .route(
            "/wallet/:wallet_id/monthly-report/:year/",
            get(handlers::monthly_report),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(service)
}

/// Serve on an already bound listener until ctrl-c or SIGTERM.
pub async fn serve(listener: TcpListener, service: LedgerService) -> Result<()> {
    let addr = listener.local_addr().context("Failed to read listener address")?;
    info!("ledger API listening on http://{}", addr);

    axum::serve(listener, router(service))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server failed")?;

    info!("ledger API stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("failed to listen for ctrl-c: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!("failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("shutdown signal received");
}
