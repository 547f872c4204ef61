use anyhow::Result;
use kiln_kpi_gateway::api::server::routes;
use kiln_kpi_gateway::config::{ConfigFormat, ConfigParser, GatewayConfig};
use kiln_kpi_gateway::PredictionOrchestrator;
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use warp::Filter;

/// Stand-in for the hosted prediction platform
struct FakePlatform {
    addr: SocketAddr,
    calls: Arc<AtomicUsize>,
    last_body: Arc<Mutex<Option<Value>>>,
}

impl FakePlatform {
    /// Answer every predict call on `endpoint` with `reply`
    fn start(endpoint: &'static str, reply: Value) -> Self {
        let calls = Arc::new(AtomicUsize::new(0));
        let last_body = Arc::new(Mutex::new(None));

        let route = {
            let calls = Arc::clone(&calls);
            let last_body = Arc::clone(&last_body);
            warp::path!("v1" / "projects" / String / "locations" / String / "endpoints" / String)
                .and(warp::post())
                .and(warp::body::json())
                .map(move |_project: String, _location: String, target: String, body: Value| {
                    calls.fetch_add(1, Ordering::SeqCst);
                    *last_body.lock().unwrap() = Some(body);
                    if target == format!("{}:predict", endpoint) {
                        warp::reply::with_status(warp::reply::json(&reply), warp::http::StatusCode::OK)
                    } else {
                        warp::reply::with_status(
                            warp::reply::json(&json!({"error": "endpoint not found"})),
                            warp::http::StatusCode::NOT_FOUND,
                        )
                    }
                })
        };

        let (addr, server) = warp::serve(route).bind_ephemeral(([127, 0, 0, 1], 0));
        tokio::spawn(server);

        Self { addr, calls, last_body }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

fn gateway_config(platform: &FakePlatform, evaluation: &str) -> Result<GatewayConfig> {
    let raw = format!(
        r#"
project_id = "plant"
location = "local"
api_base = "http://{addr}"
request_timeout_secs = 2

[evaluation]
{evaluation}

[[kpis]]
name = "clinker_free_lime_%"
endpoint_id = "1001"
features = [
    "raw_meal_lsf_ratio", "limestone_feed_rate_pct", "clay_feed_rate_pct",
    "iron_ore_feed_rate_pct", "bauxite_feed_rate_pct", "raw_meal_feed_rate_tph",
    "fuel_feed_rate_tph", "fuel_alt_substitution_rate_pct",
    "kiln_hood_pressure_mmH2O", "kiln_burner_air_flow_m3_hr",
    "kiln_main_drive_current_amp",
]

[[kpis]]
name = "raw_meal_lsf_ratio"
endpoint_id = "your-raw-meal-lsf-deployed-model-id"
features = ["limestone_feed_rate_pct", "clay_feed_rate_pct"]

[[kpis]]
name = "kiln_exit_nox_emissions_mg/Nm3"
endpoint_id = "2002"
features = ["fuel_feed_rate_tph", "fuel_alt_substitution_rate_pct", "kiln_burner_air_flow_m3_hr"]
"#,
        addr = platform.addr,
        evaluation = evaluation,
    );

    ConfigParser::parse_str(&raw, ConfigFormat::Toml)
}

fn kiln_measurements() -> Value {
    json!({
        "raw_meal_lsf_ratio": 1.02,
        "limestone_feed_rate_pct": 70,
        "clay_feed_rate_pct": 15,
        "iron_ore_feed_rate_pct": 5,
        "bauxite_feed_rate_pct": 2,
        "raw_meal_feed_rate_tph": 120,
        "fuel_feed_rate_tph": 12,
        "fuel_alt_substitution_rate_pct": 10,
        "kiln_hood_pressure_mmH2O": -3.2,
        "kiln_burner_air_flow_m3_hr": 4500,
        "kiln_main_drive_current_amp": 310
    })
}

async fn post<F>(filter: &F, body: &Value) -> (u16, Value)
where
    F: Filter + 'static,
    F::Extract: warp::Reply + Send,
{
    let resp = warp::test::request()
        .method("POST")
        .path("/")
        .json(body)
        .reply(filter)
        .await;

    let status = resp.status().as_u16();
    (status, serde_json::from_slice(resp.body()).expect("response is JSON"))
}

/// End-to-end prediction flow through the HTTP layer
mod prediction_flow {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn free_lime_prediction_reaches_the_caller() -> Result<()> {
        let platform = FakePlatform::start("1001", json!({"predictions": [{"value": 1.35}]}));
        let config = gateway_config(&platform, r#"mode = "designated"
kpi = "clinker_free_lime_%""#)?;
        let filter = routes(Arc::new(PredictionOrchestrator::from_config(&config)?));

        let (status, body) = post(&filter, &kiln_measurements()).await;

        assert_eq!(status, 200);
        assert_eq!(
            body,
            json!({
                "clinker_free_lime_%": 1.35,
                "raw_meal_lsf_ratio": "N/A",
                "kiln_exit_nox_emissions_mg/Nm3": "N/A"
            })
        );
        assert_eq!(platform.calls(), 1);

        let sent = platform.last_body.lock().unwrap().clone().expect("platform was called");
        let instances = sent["instances"].as_array().expect("instances list");
        assert_eq!(instances.len(), 1);
        assert_eq!(instances[0].as_object().map(|o| o.len()), Some(11));
        assert_eq!(instances[0]["kiln_main_drive_current_amp"], 310.0);

        Ok(())
    }

    #[tokio::test]
    async fn missing_measurement_yields_null_without_remote_call() -> Result<()> {
        let platform = FakePlatform::start("1001", json!({"predictions": [{"value": 1.35}]}));
        let config = gateway_config(&platform, r#"mode = "designated"
kpi = "clinker_free_lime_%""#)?;
        let filter = routes(Arc::new(PredictionOrchestrator::from_config(&config)?));

        let mut measurements = kiln_measurements();
        measurements
            .as_object_mut()
            .unwrap()
            .remove("kiln_main_drive_current_amp");

        let (status, body) = post(&filter, &measurements).await;

        assert_eq!(status, 200);
        assert_eq!(body["clinker_free_lime_%"], Value::Null);
        assert_eq!(body["kiln_exit_nox_emissions_mg/Nm3"], "N/A");
        assert_eq!(platform.calls(), 0);

        Ok(())
    }

    #[tokio::test]
    async fn malformed_platform_response_yields_null() -> Result<()> {
        let platform = FakePlatform::start("1001", json!({"predictions": [{"score": 0.4}]}));
        let config = gateway_config(&platform, r#"mode = "designated"
kpi = "clinker_free_lime_%""#)?;
        let filter = routes(Arc::new(PredictionOrchestrator::from_config(&config)?));

        let (status, body) = post(&filter, &kiln_measurements()).await;

        assert_eq!(status, 200);
        assert_eq!(body["clinker_free_lime_%"], Value::Null);
        assert_eq!(platform.calls(), 1);

        Ok(())
    }
}

/// Evaluating every registered KPI per request
mod all_kpis {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn each_kpi_resolves_independently() -> Result<()> {
        // Only endpoint 1001 exists on the platform; 2002 answers 404.
        let platform = FakePlatform::start("1001", json!({"predictions": [{"value": 0.9}]}));
        let config = gateway_config(&platform, r#"mode = "all""#)?;
        let filter = routes(Arc::new(PredictionOrchestrator::from_config(&config)?));

        let (status, body) = post(&filter, &kiln_measurements()).await;

        assert_eq!(status, 200);
        assert_eq!(
            body,
            json!({
                "clinker_free_lime_%": 0.9,
                "raw_meal_lsf_ratio": null,
                "kiln_exit_nox_emissions_mg/Nm3": null
            })
        );
        assert_eq!(platform.calls(), 2);

        Ok(())
    }

    #[tokio::test]
    async fn unrecognised_features_still_cover_every_kpi() -> Result<()> {
        let platform = FakePlatform::start("1001", json!({"predictions": [{"value": 0.9}]}));
        let config = gateway_config(&platform, r#"mode = "all""#)?;
        let filter = routes(Arc::new(PredictionOrchestrator::from_config(&config)?));

        let (status, body) = post(&filter, &json!({"ambient_temperature_c": 31})).await;

        assert_eq!(status, 200);
        let object = body.as_object().expect("object body");
        assert_eq!(object.len(), 3);
        assert!(object.values().all(Value::is_null));
        assert_eq!(platform.calls(), 0);

        Ok(())
    }
}

/// Request validation at the HTTP boundary
mod error_handling_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn non_object_body_is_rejected() -> Result<()> {
        let platform = FakePlatform::start("1001", json!({"predictions": [{"value": 1.0}]}));
        let config = gateway_config(&platform, r#"mode = "all""#)?;
        let filter = routes(Arc::new(PredictionOrchestrator::from_config(&config)?));

        let (status, body) = post(&filter, &json!(["raw_meal_lsf_ratio", 1.02])).await;

        assert_eq!(status, 400);
        assert_eq!(body, json!({"error": "The request body must be a JSON object."}));
        assert_eq!(platform.calls(), 0);

        Ok(())
    }
}
