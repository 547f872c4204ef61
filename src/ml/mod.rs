// KPI registry and prediction orchestration

pub mod orchestrator;
pub mod registry;

pub use orchestrator::{EvaluationScope, KpiOutcome, PredictionOrchestrator};
pub use registry::{KpiDefinition, KpiRegistry, KpiRegistryBuilder};
