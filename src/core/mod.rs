pub mod error;
pub mod types;

pub use error::{FailureReason, GatewayError, GatewayResult, PredictionFailure};
pub use types::{FeaturePayload, FeatureVector, KpiValue, PredictionResult};
