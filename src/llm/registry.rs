use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::config::{AppConfig, ProviderEntry};
use crate::errors::{TutanError, TutanResult};
use crate::llm::provider::Planner;
use crate::llm::providers::openai_compatible::OpenAiCompatiblePlanner;
use crate::llm::types::CallConfig;

/// Registry of configured planners, keyed by their config.toml identifier.
pub struct PlannerRegistry {
    planners: HashMap<String, Arc<dyn Planner>>,
    active: String,
}

impl PlannerRegistry {
    pub fn new(active: String) -> Self {
        Self {
            planners: HashMap::new(),
            active,
        }
    }

    pub fn register(&mut self, planner: Arc<dyn Planner>) {
        self.planners.insert(planner.name().to_string(), planner);
    }

    pub fn get_active(&self) -> TutanResult<Arc<dyn Planner>> {
        self.planners
            .get(&self.active)
            .cloned()
            .ok_or_else(|| TutanError::Config(format!("Active provider '{}' not found in registry", self.active)))
    }

    pub fn set_active(&mut self, name: String) -> TutanResult<()> {
        if self.planners.contains_key(&name) {
            self.active = name;
            Ok(())
        } else {
            Err(TutanError::Config(format!("Provider '{name}' not registered")))
        }
    }

    pub fn list_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.planners.keys().cloned().collect();
        names.sort();
        names
    }

    /// Build a registry from the loaded app config. A provider whose HTTP
    /// client cannot be built is skipped with an error log.
    pub fn from_config(config: &AppConfig) -> Self {
        let mut registry = Self::new(config.llm.active_provider.clone());
        for (id, entry) in &config.llm.providers {
            let api_key = resolve_api_key(id, entry, |k| std::env::var(k).ok());
            if api_key.is_empty() {
                tracing::warn!(provider = %id, "no API key configured");
            }
            match OpenAiCompatiblePlanner::new(
                id.clone(),
                entry.api_base.clone(),
                api_key,
                CallConfig {
                    model: entry.model.clone(),
                    temperature: entry.temperature,
                },
                Duration::from_secs(entry.timeout_secs),
            ) {
                Ok(planner) => registry.register(Arc::new(planner)),
                Err(e) => tracing::error!(provider = %id, error = %e, "failed to build planner"),
            }
        }
        registry
    }
}

/// `TUTAN_<ID>_API_KEY`, then `OPENAI_API_KEY`, then the config value.
fn resolve_api_key(
    id: &str,
    entry: &ProviderEntry,
    env: impl Fn(&str) -> Option<String>,
) -> String {
    let provider_var = format!("TUTAN_{}_API_KEY", id.to_uppercase().replace('-', "_"));
    env(&provider_var)
        .or_else(|| env("OPENAI_API_KEY"))
        .filter(|k| !k.is_empty())
        .or_else(|| entry.api_key.clone())
        .unwrap_or_default()
}
