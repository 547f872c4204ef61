use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{error, info, info_span, Instrument};
use uuid::Uuid;
use warp::http::StatusCode;
use warp::hyper::body::Bytes;
use warp::reply::{Json, WithStatus};
use warp::{Filter, Rejection, Reply};

use crate::core::{FeaturePayload, GatewayError, GatewayResult};
use crate::ml::PredictionOrchestrator;

pub const INTERNAL_ERROR_MESSAGE: &str = "An internal server error occurred.";
pub const EMPTY_BODY_MESSAGE: &str = "The request body is empty or not a valid JSON.";

/// Largest accepted request body
pub const MAX_BODY_BYTES: u64 = 16 * 1024;

/// Listener configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// HTTP front of the gateway: a single `POST /` prediction route plus a
/// liveness probe.
pub struct KpiGatewayServer {
    config: ServerConfig,
    orchestrator: Arc<PredictionOrchestrator>,
}

impl KpiGatewayServer {
    pub fn new(config: ServerConfig, orchestrator: PredictionOrchestrator) -> Self {
        Self {
            config,
            orchestrator: Arc::new(orchestrator),
        }
    }

    /// Serve until `shutdown` resolves
    pub async fn start(&self, shutdown: impl Future<Output = ()> + Send + 'static) -> Result<()> {
        let addr: SocketAddr = format!("{}:{}", self.config.host, self.config.port)
            .parse()
            .context("Invalid server address")?;

        let (bound, server) = warp::serve(routes(Arc::clone(&self.orchestrator)))
            .try_bind_with_graceful_shutdown(addr, shutdown)
            .with_context(|| format!("Failed to bind {}", addr))?;

        info!("Kiln KPI gateway listening on {}", bound);
        server.await;
        info!("Kiln KPI gateway stopped");

        Ok(())
    }
}

/// All routes with CORS and error mapping applied
pub fn routes(
    orchestrator: Arc<PredictionOrchestrator>,
) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    let cors = warp::cors()
        .allow_any_origin()
        .allow_methods(vec!["GET", "POST", "OPTIONS"])
        .allow_headers(vec![
            "Accept",
            "Authorization",
            "Content-Type",
            "Origin",
            "X-Requested-With",
        ]);

    predict_route(Arc::clone(&orchestrator))
        .or(health_route(orchestrator))
        .recover(handle_rejection)
        .with(cors)
}

fn with_orchestrator(
    orchestrator: Arc<PredictionOrchestrator>,
) -> impl Filter<Extract = (Arc<PredictionOrchestrator>,), Error = Infallible> + Clone {
    warp::any().map(move || Arc::clone(&orchestrator))
}

/// POST /
fn predict_route(
    orchestrator: Arc<PredictionOrchestrator>,
) -> impl Filter<Extract = (WithStatus<Json>,), Error = Rejection> + Clone {
    warp::path::end()
        .and(warp::post())
        .and(warp::body::content_length_limit(MAX_BODY_BYTES))
        .and(warp::body::bytes())
        .and(with_orchestrator(orchestrator))
        .and_then(handle_predict)
}

/// GET /health
fn health_route(
    orchestrator: Arc<PredictionOrchestrator>,
) -> impl Filter<Extract = (WithStatus<Json>,), Error = Rejection> + Clone {
    warp::path("health")
        .and(warp::path::end())
        .and(warp::get())
        .and(with_orchestrator(orchestrator))
        .map(|orchestrator: Arc<PredictionOrchestrator>| {
            let registry = orchestrator.registry();
            warp::reply::with_status(
                warp::reply::json(&json!({
                    "status": "ok",
                    "kpis": registry.len(),
                    "configured": registry.configured_count(),
                })),
                StatusCode::OK,
            )
        })
}

/// Parse the request body into a feature payload
pub fn parse_payload(body: &[u8]) -> GatewayResult<FeaturePayload> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Err(GatewayError::InvalidRequest(EMPTY_BODY_MESSAGE.to_string()));
    }

    let document: Value = serde_json::from_slice(body).map_err(|e| {
        GatewayError::InvalidRequest(format!("The request body is not valid JSON: {}", e))
    })?;

    match document.as_object() {
        Some(object) => Ok(FeaturePayload::from_json_object(object)),
        None => Err(GatewayError::InvalidRequest(
            "The request body must be a JSON object.".to_string(),
        )),
    }
}

async fn handle_predict(
    body: Bytes,
    orchestrator: Arc<PredictionOrchestrator>,
) -> Result<WithStatus<Json>, Rejection> {
    let request_id = Uuid::new_v4();
    let span = info_span!("predict", %request_id);

    let payload = match parse_payload(&body) {
        Ok(payload) => payload,
        Err(err) => {
            span.in_scope(|| info!("Validation error: {}", err));
            return Ok(error_reply(StatusCode::BAD_REQUEST, &err.to_string()));
        }
    };

    // A panic inside the task surfaces as a JoinError instead of tearing
    // down the connection.
    let task = tokio::spawn(
        async move { orchestrator.predict(&payload).await }.instrument(span.clone()),
    );

    match task.await {
        Ok(result) => Ok(warp::reply::with_status(warp::reply::json(&result), StatusCode::OK)),
        Err(e) => {
            let err = GatewayError::InternalError(e.to_string());
            span.in_scope(|| error!("Error processing request: {}", err));
            Ok(error_reply(StatusCode::INTERNAL_SERVER_ERROR, INTERNAL_ERROR_MESSAGE))
        }
    }
}

fn error_reply(status: StatusCode, message: &str) -> WithStatus<Json> {
    warp::reply::with_status(warp::reply::json(&json!({ "error": message })), status)
}

/// Global Error Handler
async fn handle_rejection(err: Rejection) -> Result<WithStatus<Json>, Infallible> {
    if err.is_not_found() {
        Ok(error_reply(StatusCode::NOT_FOUND, "Not Found"))
    } else if err.find::<warp::reject::MethodNotAllowed>().is_some() {
        Ok(error_reply(StatusCode::METHOD_NOT_ALLOWED, "Method Not Allowed"))
    } else if err.find::<warp::reject::PayloadTooLarge>().is_some() {
        Ok(error_reply(StatusCode::PAYLOAD_TOO_LARGE, "Payload Too Large"))
    } else if err.find::<warp::reject::LengthRequired>().is_some() {
        Ok(error_reply(StatusCode::LENGTH_REQUIRED, "Length Required"))
    } else {
        error!("Unhandled rejection: {:?}", err);
        Ok(error_reply(StatusCode::INTERNAL_SERVER_ERROR, INTERNAL_ERROR_MESSAGE))
    }
}
