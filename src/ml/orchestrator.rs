use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::api::{self, VertexPlatform};
use crate::config::GatewayConfig;
use crate::core::{FeaturePayload, GatewayError, GatewayResult, KpiValue, PredictionResult};
use crate::ml::registry::{KpiDefinition, KpiRegistry};
use crate::track_performance;

/// Which registered KPIs are evaluated for each request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum EvaluationScope {
    /// Only the named KPI; every other KPI stays `"N/A"`
    Designated { kpi: String },
    /// Every KPI in the registry
    All,
}

/// Per-KPI outcome before it is folded into the response
pub type KpiOutcome = GatewayResult<f64>;

/// Turns one payload into a prediction for every registered KPI.
///
/// Missing endpoints, incomplete input and failed predictions only affect
/// the KPI concerned; the result always has one entry per registered KPI.
#[derive(Debug)]
pub struct PredictionOrchestrator {
    registry: KpiRegistry,
    scope: EvaluationScope,
}

impl PredictionOrchestrator {
    pub fn new(registry: KpiRegistry, scope: EvaluationScope) -> Self {
        if let EvaluationScope::Designated { kpi } = &scope {
            if registry.get(kpi).is_none() {
                warn!(kpi = %kpi, "Designated KPI is not registered; no KPI will be evaluated");
            }
        }

        info!(scope = ?scope, kpis = registry.len(), "Prediction orchestrator ready");
        Self { registry, scope }
    }

    /// Wire the registry and endpoint handles described by `config`
    pub fn from_config(config: &GatewayConfig) -> GatewayResult<Self> {
        let platform = VertexPlatform::from_config(config)?;
        let registry = KpiRegistry::from_config(config, &platform);

        Ok(Self::new(registry, config.evaluation.clone()))
    }

    pub fn registry(&self) -> &KpiRegistry {
        &self.registry
    }

    pub fn scope(&self) -> &EvaluationScope {
        &self.scope
    }

    /// KPIs attempted for every request
    pub fn targets(&self) -> Vec<&KpiDefinition> {
        match &self.scope {
            EvaluationScope::All => self.registry.definitions().iter().collect(),
            EvaluationScope::Designated { kpi } => self.registry.get(kpi).into_iter().collect(),
        }
    }

    pub async fn predict(&self, payload: &FeaturePayload) -> PredictionResult {
        track_performance!("kpi_prediction");
        let mut result = PredictionResult::not_attempted(self.registry.names());

        let targets = self.targets();
        // Each KPI's outcome is independent, so the calls run concurrently.
        let outcomes = join_all(targets.iter().map(|kpi| self.evaluate(kpi, payload))).await;

        for (kpi, outcome) in targets.iter().zip(outcomes) {
            let value = match outcome {
                Ok(value) => KpiValue::Predicted(value),
                Err(GatewayError::PredictionFailure(failure)) => {
                    debug!(kpi = kpi.name(), "Prediction unavailable: {}", failure);
                    KpiValue::Unavailable
                }
                Err(err) => {
                    warn!(kpi = kpi.name(), "{}. Skipping prediction.", err);
                    KpiValue::Unavailable
                }
            };
            result.set(kpi.name(), value);
        }

        result
    }

    /// Evaluate a single KPI against the payload
    pub async fn evaluate(&self, kpi: &KpiDefinition, payload: &FeaturePayload) -> KpiOutcome {
        let backend = kpi
            .backend()
            .ok_or_else(|| GatewayError::UnconfiguredBackend(kpi.name().to_string()))?;

        let instance = payload
            .project(kpi.required_features())
            .map_err(|missing| GatewayError::IncompleteInput {
                kpi: kpi.name().to_string(),
                missing,
            })?;

        info!(kpi = kpi.name(), instance = ?instance, "Sending prediction instance");
        let value = api::predict(backend.as_ref(), &instance).await?;
        Ok(value)
    }
}
