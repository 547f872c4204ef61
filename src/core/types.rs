use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap};

/// One inference instance: feature name to value, every key present.
pub type FeatureVector = BTreeMap<String, f64>;

/// Inbound process measurements.
///
/// A feature that is absent from the request, `null`, or not a number is
/// stored as `None`. It is never defaulted to zero.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeaturePayload {
    values: HashMap<String, Option<f64>>,
}

impl FeaturePayload {
    pub fn from_json_object(object: &Map<String, Value>) -> Self {
        let values = object
            .iter()
            .map(|(name, value)| (name.clone(), value.as_f64()))
            .collect();

        Self { values }
    }

    pub fn with_feature(mut self, name: impl Into<String>, value: f64) -> Self {
        self.values.insert(name.into(), Some(value));
        self
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        self.values.get(name).copied().flatten()
    }

    /// Project the payload onto `required` features.
    ///
    /// Returns the complete instance, or the names of the features that are
    /// missing in the order they were required.
    pub fn project(&self, required: &[String]) -> Result<FeatureVector, Vec<String>> {
        let mut instance = FeatureVector::new();
        let mut missing = Vec::new();

        for feature in required {
            match self.get(feature) {
                Some(value) => {
                    instance.insert(feature.clone(), value);
                }
                None => missing.push(feature.clone()),
            }
        }

        if missing.is_empty() {
            Ok(instance)
        } else {
            Err(missing)
        }
    }
}

/// Outcome of a single KPI in a response.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum KpiValue {
    /// Scalar returned by the prediction endpoint.
    Predicted(f64),
    /// Attempted but not computed. Serialized as `null`.
    Unavailable,
    /// Never attempted for this request. Serialized as `"N/A"`.
    NotAttempted,
}

pub const NOT_ATTEMPTED_PLACEHOLDER: &str = "N/A";

impl Serialize for KpiValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            KpiValue::Predicted(value) => serializer.serialize_f64(*value),
            KpiValue::Unavailable => serializer.serialize_none(),
            KpiValue::NotAttempted => serializer.serialize_str(NOT_ATTEMPTED_PLACEHOLDER),
        }
    }
}

/// Response body: one entry per registered KPI, kept in registry order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PredictionResult {
    entries: Vec<(String, KpiValue)>,
}

impl PredictionResult {
    /// Start a result where every KPI is `NotAttempted`.
    pub fn not_attempted<'a>(kpis: impl IntoIterator<Item = &'a str>) -> Self {
        let entries = kpis
            .into_iter()
            .map(|name| (name.to_string(), KpiValue::NotAttempted))
            .collect();

        Self { entries }
    }

    /// Overwrite the value of a known KPI. Unknown names are ignored so the
    /// key set never grows past the registry.
    pub fn set(&mut self, kpi: &str, value: KpiValue) -> bool {
        match self.entries.iter_mut().find(|(name, _)| name == kpi) {
            Some(entry) => {
                entry.1 = value;
                true
            }
            None => false,
        }
    }

    pub fn get(&self, kpi: &str) -> Option<KpiValue> {
        self.entries
            .iter()
            .find(|(name, _)| name == kpi)
            .map(|(_, value)| *value)
    }

    pub fn kpis(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(name, _)| name.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, KpiValue)> {
        self.entries.iter().map(|(name, value)| (name.as_str(), *value))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Serialize for PredictionResult {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (name, value) in &self.entries {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}
