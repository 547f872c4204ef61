pub mod parser;

pub use self::parser::{ConfigFormat, ConfigParser};

use anyhow::{Context, Result};
use secrecy::Secret;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::ml::EvaluationScope;

pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 5;

/// KPI evaluated per request unless configured otherwise
pub const CLINKER_FREE_LIME: &str = "clinker_free_lime_%";

/// Gateway configuration, loaded once at start-up
#[derive(Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Cloud project hosting the prediction endpoints
    pub project_id: String,

    /// Region of the prediction endpoints
    pub location: String,

    /// Override for the prediction API base URL
    pub api_base: Option<String>,

    /// Bearer token sent to the prediction API
    #[serde(skip_serializing)]
    pub access_token: Option<Secret<String>>,

    /// Upper bound for a single prediction call
    pub request_timeout_secs: u64,

    /// Which KPIs are evaluated per request
    pub evaluation: EvaluationScope,

    /// KPI table, in response order
    pub kpis: Vec<KpiConfig>,
}

/// One KPI entry of the static configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KpiConfig {
    pub name: String,

    /// Deployed endpoint id; absent, empty or `your-...` means not deployed yet
    #[serde(default)]
    pub endpoint_id: Option<String>,

    #[serde(default)]
    pub features: Vec<String>,
}

impl KpiConfig {
    fn new(name: &str, endpoint_id: &str, features: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            endpoint_id: Some(endpoint_id.to_string()),
            features: features.iter().map(|f| f.to_string()).collect(),
        }
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            project_id: "astute-cumulus-472318-v4".to_string(),
            location: "us-central1".to_string(),
            api_base: None,
            access_token: None,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            evaluation: EvaluationScope::Designated {
                kpi: CLINKER_FREE_LIME.to_string(),
            },
            kpis: default_kpis(),
        }
    }
}

fn default_kpis() -> Vec<KpiConfig> {
    vec![
        KpiConfig::new(
            CLINKER_FREE_LIME,
            "5608840810238836736",
            &[
                "raw_meal_lsf_ratio",
                "limestone_feed_rate_pct",
                "clay_feed_rate_pct",
                "iron_ore_feed_rate_pct",
                "bauxite_feed_rate_pct",
                "raw_meal_feed_rate_tph",
                "fuel_feed_rate_tph",
                "fuel_alt_substitution_rate_pct",
                "kiln_hood_pressure_mmH2O",
                "kiln_burner_air_flow_m3_hr",
                "kiln_main_drive_current_amp",
            ],
        ),
        KpiConfig::new(
            "raw_meal_lsf_ratio",
            "your-raw-meal-lsf-deployed-model-id",
            &[
                "limestone_feed_rate_pct",
                "clay_feed_rate_pct",
                "iron_ore_feed_rate_pct",
                "bauxite_feed_rate_pct",
                "raw_meal_feed_rate_tph",
            ],
        ),
        KpiConfig::new(
            "kiln_specific_thermal_energy_Kcal/kg_clinker",
            "your-kiln-thermal-energy-deployed-model-id",
            &[
                "raw_meal_feed_rate_tph",
                "fuel_feed_rate_tph",
                "fuel_alt_substitution_rate_pct",
                "kiln_hood_pressure_mmH2O",
                "kiln_burner_air_flow_m3_hr",
                "clinker_feed_rate_tph",
            ],
        ),
        KpiConfig::new(
            "kiln_exit_nox_emissions_mg/Nm3",
            "your-kiln-nox-deployed-model-id",
            &[
                "fuel_feed_rate_tph",
                "fuel_alt_substitution_rate_pct",
                "kiln_burner_air_flow_m3_hr",
            ],
        ),
        KpiConfig::new(
            "mill_motor_power_draw_kW",
            "your-mill-motor-power-deployed-model-id",
            &[
                "clinker_feed_rate_tph",
                "gypsum_feed_rate_tph",
                "mill_recirculation_ratio_%",
            ],
        ),
        KpiConfig::new(
            "mill_specific_electrical_energy_kWh/ton_cement",
            "your-mill-specific-electrical-energy-deployed-model-id",
            &[
                "clinker_feed_rate_tph",
                "gypsum_feed_rate_tph",
                "mill_recirculation_ratio_%",
                "mill_motor_power_draw_kW",
            ],
        ),
        KpiConfig::new(
            "cement_fineness_blaine_cm2/g",
            "your-cement-fineness-deployed-model-id",
            &[
                "mill_recirculation_ratio_%",
                "mill_motor_power_draw_kW",
                "clinker_feed_rate_tph",
                "gypsum_feed_rate_tph",
            ],
        ),
    ]
}

impl GatewayConfig {
    /// Load configuration from `path`, or the built-in plant tables when no
    /// file is given, then apply environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => ConfigParser::parse_file(path)
                .with_context(|| format!("Failed to load gateway configuration from {}", path.display()))?,
            None => Self::default(),
        };

        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Apply `VERTEX_*` overrides using `lookup` to read variables
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        if let Some(project_id) = var("VERTEX_PROJECT_ID") {
            self.project_id = project_id;
        }
        if let Some(location) = var("VERTEX_LOCATION") {
            self.location = location;
        }
        if let Some(api_base) = var("VERTEX_API_BASE") {
            self.api_base = Some(api_base);
        }
        if self.access_token.is_none() {
            self.access_token = var("VERTEX_ACCESS_TOKEN").map(Secret::new);
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }

    /// Base URL of the prediction API
    pub fn api_base(&self) -> String {
        match &self.api_base {
            Some(base) => base.trim_end_matches('/').to_string(),
            None => format!("https://{}-aiplatform.googleapis.com", self.location),
        }
    }
}
