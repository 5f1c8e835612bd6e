use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use tokio::task;
use tracing::{error, info};

use gmail_module::{GmailAuth, GmailClient};
use qbo_module::{QboAuth, QboClient};

use crate::batch::process_mailbox;
use crate::config::ServiceConfig;
use crate::BoxError;

#[derive(Clone)]
struct AppState {
    config: Arc<ServiceConfig>,
    gmail: GmailClient,
    qbo: QboClient,
}

pub async fn run_server(
    config: ServiceConfig,
    shutdown: impl std::future::Future<Output = ()> + Send + 'static,
) -> Result<(), BoxError> {
    let gmail = GmailClient::new(GmailAuth::new(config.gmail.clone())?);
    let qbo = QboClient::new(
        QboAuth::new(config.qbo.clone())?,
        config.qbo_realm_id.clone(),
        config.qbo_environment,
    );

    let host: IpAddr = config
        .host
        .parse()
        .map_err(|_| format!("invalid host: {}", config.host))?;
    let addr = SocketAddr::new(host, config.port);

    let state = AppState {
        config: Arc::new(config),
        gmail,
        qbo,
    };

    // Unmatched paths fall through to axum's default 404.
    let app = Router::new()
        .route("/process-email", get(process_email))
        .route("/health", get(health))
        .with_state(state);

    info!("accounting assistant listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}

async fn health() -> impl IntoResponse {
    (StatusCode::OK, "Healthy")
}

/// The poll trigger: process the whole unread batch, synchronously, off the
/// async runtime's worker threads.
async fn process_email(State(state): State<AppState>) -> impl IntoResponse {
    let result =
        task::spawn_blocking(move || process_mailbox(&state.config, &state.gmail, &state.qbo))
            .await;
    match result {
        Ok(Ok(summary)) => (StatusCode::OK, summary.to_string()),
        Ok(Err(err)) => {
            error!("batch processing failed: {}", err);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Error: {}", err),
            )
        }
        Err(err) => {
            error!("batch task failed: {}", err);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Error: batch task failed".to_string(),
            )
        }
    }
}
