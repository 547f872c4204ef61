pub mod server;

pub use server::{KpiGatewayServer, ServerConfig};

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, Secret};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};
use url::Url;

use crate::config::GatewayConfig;
use crate::core::{FailureReason, FeatureVector, GatewayError, GatewayResult, PredictionFailure};

/// A deployed model reachable by a remote inference call.
///
/// Implementations are shared across requests and must not carry
/// per-request state.
#[async_trait]
pub trait PredictionBackend: Send + Sync + fmt::Debug {
    /// Identifier of the deployment, used in logs
    fn endpoint_id(&self) -> &str;

    /// Send one instance and return the scalar prediction
    async fn predict(&self, instance: &FeatureVector) -> Result<f64, PredictionFailure>;
}

/// Shared handle to a backend
pub type BackendHandle = Arc<dyn PredictionBackend>;

/// Run one prediction against `backend`, logging any failure together with
/// the instance that was sent.
pub async fn predict(
    backend: &dyn PredictionBackend,
    instance: &FeatureVector,
) -> Result<f64, PredictionFailure> {
    match backend.predict(instance).await {
        Ok(value) => {
            debug!(endpoint = backend.endpoint_id(), value, "Prediction received");
            Ok(value)
        }
        Err(failure) => {
            warn!(
                endpoint = backend.endpoint_id(),
                instance = ?instance,
                "{}", failure
            );
            Err(failure)
        }
    }
}

/// Request body of the prediction REST API
#[derive(Debug, Serialize)]
struct PredictRequest<'a> {
    instances: [&'a FeatureVector; 1],
}

/// Response body of the prediction REST API
#[derive(Debug, Deserialize)]
struct PredictResponse {
    #[serde(default)]
    predictions: Vec<Value>,
}

/// Pull the scalar `value` out of the first prediction record
pub fn extract_value(predictions: &[Value]) -> Result<f64, FailureReason> {
    let first = predictions.first().ok_or(FailureReason::EmptyPredictions)?;
    let record = first.as_object().ok_or_else(|| {
        FailureReason::MalformedResponse("first prediction is not an object".to_string())
    })?;
    let value = record.get("value").ok_or(FailureReason::MissingValue)?;

    value.as_f64().ok_or_else(|| {
        FailureReason::MalformedResponse(format!("`value` is not a number: {}", value))
    })
}

/// Connection settings shared by every endpoint of one project
#[derive(Debug, Clone)]
pub struct VertexPlatform {
    client: Client,
    api_base: String,
    project_id: String,
    location: String,
    access_token: Option<Arc<Secret<String>>>,
}

impl VertexPlatform {
    /// Build the shared HTTP client from configuration
    pub fn from_config(config: &GatewayConfig) -> GatewayResult<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| GatewayError::Configuration(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            api_base: config.api_base(),
            project_id: config.project_id.clone(),
            location: config.location.clone(),
            access_token: config
                .access_token
                .as_ref()
                .map(|token| Arc::new(Secret::new(token.expose_secret().clone()))),
        })
    }

    /// Bind a handle to one deployed endpoint
    pub fn endpoint(&self, endpoint_id: &str) -> GatewayResult<VertexEndpoint> {
        let raw = format!(
            "{}/v1/projects/{}/locations/{}/endpoints/{}:predict",
            self.api_base, self.project_id, self.location, endpoint_id
        );
        let url = Url::parse(&raw).map_err(|e| {
            GatewayError::Configuration(format!("Invalid prediction URL '{}': {}", raw, e))
        })?;

        Ok(VertexEndpoint {
            endpoint_id: endpoint_id.to_string(),
            url,
            client: self.client.clone(),
            access_token: self.access_token.clone(),
        })
    }
}

/// Prediction backend backed by a Vertex AI endpoint
#[derive(Debug)]
pub struct VertexEndpoint {
    endpoint_id: String,
    url: Url,
    client: Client,
    access_token: Option<Arc<Secret<String>>>,
}

impl VertexEndpoint {
    pub fn url(&self) -> &Url {
        &self.url
    }

    fn failure(&self, reason: FailureReason) -> PredictionFailure {
        PredictionFailure::new(self.endpoint_id.clone(), reason)
    }
}

#[async_trait]
impl PredictionBackend for VertexEndpoint {
    fn endpoint_id(&self) -> &str {
        &self.endpoint_id
    }

    async fn predict(&self, instance: &FeatureVector) -> Result<f64, PredictionFailure> {
        let mut request = self
            .client
            .post(self.url.clone())
            .json(&PredictRequest { instances: [instance] });

        if let Some(token) = &self.access_token {
            request = request.bearer_auth(token.expose_secret());
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                self.failure(FailureReason::Timeout)
            } else {
                self.failure(FailureReason::Transport(e.to_string()))
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(self.failure(FailureReason::Status(status.as_u16())));
        }

        let body: PredictResponse = response.json().await.map_err(|e| {
            if e.is_timeout() {
                self.failure(FailureReason::Timeout)
            } else {
                self.failure(FailureReason::MalformedResponse(e.to_string()))
            }
        })?;

        extract_value(&body.predictions).map_err(|reason| self.failure(reason))
    }
}
