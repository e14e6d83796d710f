use std::sync::Arc;

use anyhow::{Error, Result};
use axum::{
    Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::{
    clients::health::HealthChecker,
    config::Config,
    error::ProcessingError,
    models::{
        fulfilment::{ErrorResponse, FulfilmentRequest},
        health::HealthStatus,
    },
    pipeline::FulfilmentPipeline,
};

pub struct AppState {
    pipeline: Arc<FulfilmentPipeline>,
    health_checker: HealthChecker,
}

pub async fn run_api_server(config: Config, pipeline: Arc<FulfilmentPipeline>) -> Result<(), Error> {
    let state = Arc::new(AppState {
        pipeline,
        health_checker: HealthChecker::new(config.clone()),
    });

    let app = Router::new()
        .route("/sms-fulfilment", post(sms_fulfilment))
        .route("/email-fulfilment", post(email_fulfilment))
        .route("/health", get(health_check))
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr = format!("0.0.0.0:{}", config.server_port);
    let listener = TcpListener::bind(&addr).await?;

    info!(address = %addr, "API server started");

    axum::serve(listener, app).await?;

    Ok(())
}

async fn sms_fulfilment(
    State(state): State<Arc<AppState>>,
    Json(request): Json<FulfilmentRequest>,
) -> Response {
    let Some(fulfilment) = request.payload.sms_fulfilment else {
        return error_response(
            StatusCode::BAD_REQUEST,
            "Request payload is missing smsFulfilment",
        );
    };

    match state
        .pipeline
        .handle_sms_fulfilment(&request.header, &fulfilment)
        .await
    {
        Ok(body) => (StatusCode::OK, Json(body)).into_response(),
        Err(e) => processing_error_response(e),
    }
}

async fn email_fulfilment(
    State(state): State<Arc<AppState>>,
    Json(request): Json<FulfilmentRequest>,
) -> Response {
    let Some(fulfilment) = request.payload.email_fulfilment else {
        return error_response(
            StatusCode::BAD_REQUEST,
            "Request payload is missing emailFulfilment",
        );
    };

    match state
        .pipeline
        .handle_email_fulfilment(&request.header, &fulfilment)
        .await
    {
        Ok(body) => (StatusCode::OK, Json(body)).into_response(),
        Err(e) => processing_error_response(e),
    }
}

async fn health_check(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let health = state.health_checker.check_all().await;

    let status_code = match health.status {
        HealthStatus::Healthy => StatusCode::OK,
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    (status_code, Json(health))
}

/// Bad input is the caller's problem; anything past the validation and
/// lookup stages is ours. A provider failure surfaces as a 500 even
/// though the enriched event is already safely published.
fn processing_error_response(error: ProcessingError) -> Response {
    let status = match &error {
        ProcessingError::Validation(_)
        | ProcessingError::NotFound(_)
        | ProcessingError::SchemaVersion { .. } => StatusCode::BAD_REQUEST,
        ProcessingError::RemoteCall { .. }
        | ProcessingError::ProviderSend { .. }
        | ProcessingError::Invariant(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };

    if status.is_server_error() {
        warn!(error = %error.cause_chain(), "Fulfilment request failed");
    }

    error_response(status, &error.to_string())
}

fn error_response(status: StatusCode, reason: &str) -> Response {
    (
        status,
        Json(ErrorResponse {
            error: reason.to_string(),
        }),
    )
        .into_response()
}
