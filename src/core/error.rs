use thiserror::Error;

/// Failure taxonomy of the gateway.
///
/// `UnconfiguredBackend`, `IncompleteInput` and `PredictionFailure` are local
/// to a single KPI and are recovered by the orchestrator. Only
/// `InvalidRequest` and `InternalError` ever reach an HTTP caller.
#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("{0}")]
    InvalidRequest(String),

    #[error("no prediction endpoint is configured for KPI '{0}'")]
    UnconfiguredBackend(String),

    #[error("missing input features for KPI '{kpi}': {}", .missing.join(", "))]
    IncompleteInput { kpi: String, missing: Vec<String> },

    #[error(transparent)]
    PredictionFailure(#[from] PredictionFailure),

    #[error("internal error: {0}")]
    InternalError(String),

    #[error("configuration error: {0}")]
    Configuration(String),
}

/// A remote inference call that did not yield a usable scalar.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("prediction on endpoint '{endpoint}' failed: {reason}")]
pub struct PredictionFailure {
    pub endpoint: String,
    pub reason: FailureReason,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum FailureReason {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("request timed out")]
    Timeout,

    #[error("endpoint answered with HTTP status {0}")]
    Status(u16),

    #[error("malformed response: {0}")]
    MalformedResponse(String),

    #[error("response contained no predictions")]
    EmptyPredictions,

    #[error("first prediction has no `value` field")]
    MissingValue,
}

impl PredictionFailure {
    pub fn new(endpoint: impl Into<String>, reason: FailureReason) -> Self {
        Self {
            endpoint: endpoint.into(),
            reason,
        }
    }
}

pub type GatewayResult<T> = Result<T, GatewayError>;
