use std::collections::HashMap;
use std::sync::Arc;

use log::info;
use unillm_core::{LLMError, Result};

use crate::provider::{LLMProvider, ProviderConfig, ANTHROPIC, BEDROCK_MISTRAL};
use crate::providers::{AnthropicProvider, BedrockMistralProvider};

/// Build the provider named by `config.provider_id`
pub fn create_provider(config: &ProviderConfig) -> Result<Arc<dyn LLMProvider>> {
    let provider: Arc<dyn LLMProvider> = match config.provider_id.as_str() {
        BEDROCK_MISTRAL => Arc::new(BedrockMistralProvider::from_config(config)?),
        ANTHROPIC => Arc::new(AnthropicProvider::from_config(config)?),
        other => return Err(LLMError::ProviderNotFound(other.to_string())),
    };
    info!("Created provider '{}' at {}", config.provider_id, config.base_url());
    Ok(provider)
}

/// Provider registry for looking up providers by service name
#[derive(Default)]
pub struct ProviderRegistry {
    providers: HashMap<String, Arc<dyn LLMProvider>>,
}

impl ProviderRegistry {
    /// Create a new registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with one provider per config
    pub fn from_configs<'a>(configs: impl IntoIterator<Item = &'a ProviderConfig>) -> Result<Self> {
        let mut registry = Self::new();
        for config in configs {
            registry.register(create_provider(config)?);
        }
        Ok(registry)
    }

    /// Register a provider under its ID, replacing any previous one
    pub fn register(&mut self, provider: Arc<dyn LLMProvider>) {
        self.providers.insert(provider.provider_id().to_string(), provider);
    }

    /// Get a provider by service name
    pub fn get(&self, service: &str) -> Result<Arc<dyn LLMProvider>> {
        self.providers
            .get(service)
            .cloned()
            .ok_or_else(|| LLMError::ProviderNotFound(service.to_string()))
    }

    /// Registered service names, sorted
    pub fn services(&self) -> Vec<&str> {
        let mut services: Vec<&str> = self.providers.keys().map(String::as_str).collect();
        services.sort_unstable();
        services
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_configs() {
        let configs = vec![
            ProviderConfig::bedrock_mistral("us-east-1"),
            ProviderConfig::anthropic().with_api_key("k"),
        ];
        let registry = ProviderRegistry::from_configs(&configs).unwrap();
        assert_eq!(registry.services(), vec!["anthropic", "bedrock-mistral"]);
        assert_eq!(registry.get("anthropic").unwrap().metadata().name, "Anthropic");
    }

    #[test]
    fn test_unknown_service() {
        let registry = ProviderRegistry::new();
        assert!(matches!(registry.get("openai"), Err(LLMError::ProviderNotFound(_))));
        assert!(matches!(
            create_provider(&ProviderConfig::new("openai", "http://localhost")),
            Err(LLMError::ProviderNotFound(_))
        ));
    }
}
