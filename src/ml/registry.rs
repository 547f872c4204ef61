use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

use crate::api::{BackendHandle, VertexPlatform};
use crate::config::{GatewayConfig, KpiConfig};

/// Static description of one predictable KPI
#[derive(Debug, Clone)]
pub struct KpiDefinition {
    name: String,
    required_features: Vec<String>,
    backend: Option<BackendHandle>,
}

impl KpiDefinition {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn required_features(&self) -> &[String] {
        &self.required_features
    }

    /// `None` when the KPI has no usable prediction endpoint
    pub fn backend(&self) -> Option<&BackendHandle> {
        self.backend.as_ref()
    }

    pub fn is_configured(&self) -> bool {
        self.backend.is_some()
    }
}

/// Immutable table of KPIs, in response order
#[derive(Debug, Clone, Default)]
pub struct KpiRegistry {
    definitions: Vec<KpiDefinition>,
    index: HashMap<String, usize>,
}

impl KpiRegistry {
    pub fn builder() -> KpiRegistryBuilder {
        KpiRegistryBuilder::default()
    }

    /// Build the registry from configuration, binding one endpoint handle per
    /// deployed KPI. Entries that cannot be bound are kept as unconfigured.
    pub fn from_config(config: &GatewayConfig, platform: &VertexPlatform) -> Self {
        let mut builder = Self::builder();

        for KpiConfig { name, endpoint_id, features } in &config.kpis {
            let backend = match endpoint_id.as_deref().map(str::trim) {
                Some(id) if !is_placeholder(id) => match platform.endpoint(id) {
                    Ok(endpoint) => Some(Arc::new(endpoint) as BackendHandle),
                    Err(e) => {
                        warn!(kpi = %name, "Could not bind prediction endpoint: {}", e);
                        None
                    }
                },
                _ => {
                    warn!(kpi = %name, "Prediction endpoint is not deployed yet");
                    None
                }
            };

            builder = builder.kpi(name.clone(), features.clone(), backend);
        }

        builder.build()
    }

    pub fn get(&self, name: &str) -> Option<&KpiDefinition> {
        self.index.get(name).map(|&i| &self.definitions[i])
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.definitions.iter().map(|d| d.name.as_str())
    }

    pub fn definitions(&self) -> &[KpiDefinition] {
        &self.definitions
    }

    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }

    pub fn configured_count(&self) -> usize {
        self.definitions.iter().filter(|d| d.is_configured()).count()
    }
}

/// Endpoint ids that were never filled in after deployment
pub fn is_placeholder(endpoint_id: &str) -> bool {
    endpoint_id.is_empty() || endpoint_id.starts_with("your-")
}

#[derive(Debug, Default)]
pub struct KpiRegistryBuilder {
    entries: Vec<KpiDefinition>,
}

impl KpiRegistryBuilder {
    pub fn kpi(
        mut self,
        name: impl Into<String>,
        required_features: Vec<String>,
        backend: Option<BackendHandle>,
    ) -> Self {
        self.entries.push(KpiDefinition {
            name: name.into(),
            required_features,
            backend,
        });
        self
    }

    /// Validate entries. Problems are logged and demoted to "unconfigured",
    /// never raised.
    pub fn build(self) -> KpiRegistry {
        let mut registry = KpiRegistry::default();

        for mut definition in self.entries {
            if definition.name.trim().is_empty() {
                warn!("Skipping KPI entry without a name");
                continue;
            }
            if registry.index.contains_key(&definition.name) {
                warn!(kpi = %definition.name, "Duplicate KPI entry ignored");
                continue;
            }
            if definition.required_features.is_empty() && definition.backend.is_some() {
                warn!(kpi = %definition.name, "KPI has no required features; treating it as unconfigured");
                definition.backend = None;
            }

            registry
                .index
                .insert(definition.name.clone(), registry.definitions.len());
            registry.definitions.push(definition);
        }

        info!(
            kpis = registry.len(),
            configured = registry.configured_count(),
            "KPI registry ready"
        );
        registry
    }
}
