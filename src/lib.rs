//! Kiln KPI gateway.
//!
//! Receives cement-plant process measurements over HTTP, routes the relevant
//! features to hosted prediction endpoints and answers with one value per
//! configured KPI.

pub mod api;
pub mod config;
pub mod core;
pub mod ml;
pub mod monitoring;

pub use crate::api::{KpiGatewayServer, ServerConfig};
pub use crate::config::GatewayConfig;
pub use crate::core::{FeaturePayload, GatewayError, KpiValue, PredictionResult};
pub use crate::ml::{EvaluationScope, KpiRegistry, PredictionOrchestrator};
