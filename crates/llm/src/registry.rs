//! Model registry.
//!
//! Builds one [`ChatCompletionsAdapter`] per `models.definitions.<alias>`
//! entry at startup, keyed by alias, and resolves the `default_chat` /
//! `default_vision` / `default_reasoning` pointers. Trimmed from the
//! teacher's multi-kind `ProviderRegistry` (this workspace ships a single
//! adapter kind, so there is no `ProviderKind` dispatch and no startup
//! policy — a dangling alias is already rejected by `Config::validate`).

use std::collections::HashMap;
use std::sync::Arc;

use ac_domain::config::ModelsConfig;
use ac_domain::error::{CoreError, Result};

use crate::chat_completions::ChatCompletionsAdapter;
use crate::traits::LlmProvider;

/// Holds all instantiated model adapters, keyed by alias.
pub struct ModelRegistry {
    models: HashMap<String, Arc<dyn LlmProvider>>,
    default_chat: Option<String>,
    default_vision: Option<String>,
    default_reasoning: Option<String>,
}

impl ModelRegistry {
    /// Build the registry from `config.models`, instantiating one adapter
    /// per definition. A definition that fails to build (e.g. a malformed
    /// `base_url`) aborts the whole load — unlike the teacher's
    /// allow-partial-failure registry, there's no "degrade and boot anyway"
    /// mode in scope here.
    pub fn from_config(config: &ModelsConfig) -> Result<Self> {
        let mut models: HashMap<String, Arc<dyn LlmProvider>> = HashMap::new();
        for (alias, def) in &config.definitions {
            let adapter = ChatCompletionsAdapter::from_definition(alias, def)?;
            tracing::info!(alias, provider = %def.provider, model = %def.model_name, "registered model");
            models.insert(alias.clone(), Arc::new(adapter));
        }

        Ok(Self {
            models,
            default_chat: config.default_chat.clone(),
            default_vision: config.default_vision.clone(),
            default_reasoning: config.default_reasoning.clone(),
        })
    }

    /// Look up a model adapter by alias.
    pub fn get(&self, alias: &str) -> Option<Arc<dyn LlmProvider>> {
        self.models.get(alias).cloned()
    }

    /// Resolve the alias to use when the caller didn't name one explicitly.
    pub fn resolve_default(&self, kind: DefaultKind) -> Result<Arc<dyn LlmProvider>> {
        let alias = match kind {
            DefaultKind::Chat => self.default_chat.as_deref(),
            DefaultKind::Vision => self.default_vision.as_deref(),
            DefaultKind::Reasoning => self.default_reasoning.as_deref(),
        };
        let alias = alias.ok_or_else(|| {
            CoreError::ModelNotFound(format!("no default_{kind:?} configured").to_lowercase())
        })?;
        self.get(alias)
            .ok_or_else(|| CoreError::ModelNotFound(alias.to_string()))
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    pub fn list_aliases(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.models.keys().cloned().collect();
        ids.sort();
        ids
    }
}

#[derive(Debug, Clone, Copy)]
pub enum DefaultKind {
    Chat,
    Vision,
    Reasoning,
}

#[cfg(test)]
mod tests {
    use super::*;
    use ac_domain::config::Config;

    #[test]
    fn builds_registry_from_config_and_resolves_default() {
        let yaml = r#"
models:
  default_chat: main
  definitions:
    main:
      provider: openai
      model_name: gpt-4o
      api_key: sk-test
"#;
        let config = Config::from_yaml_str(yaml).unwrap();
        let registry = ModelRegistry::from_config(&config.models).unwrap();
        assert_eq!(registry.len(), 1);
        let resolved = registry.resolve_default(DefaultKind::Chat).unwrap();
        assert_eq!(resolved.provider_id(), "main");
    }

    #[test]
    fn missing_default_vision_is_model_not_found() {
        let yaml = r#"
models:
  definitions:
    main:
      provider: openai
      model_name: gpt-4o
"#;
        let config = Config::from_yaml_str(yaml).unwrap();
        let registry = ModelRegistry::from_config(&config.models).unwrap();
        let err = registry.resolve_default(DefaultKind::Vision).unwrap_err();
        assert!(matches!(err, CoreError::ModelNotFound(_)));
    }
}
