//! Provider registry and per-request provider selection.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use tracing::{info, warn};

use chatgate_types::Provider;

use super::error::{DispatchError, LLMError};
use super::ollama::OllamaProvider;
use super::openai::OpenAIProvider;
use super::provider::LLMProvider;
use crate::config::ProvidersConfig;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Registry of LLM providers, keyed by provider type.
#[derive(Clone)]
pub struct ProviderRegistry {
    providers: HashMap<Provider, Arc<dyn LLMProvider>>,
    default_provider: Provider,
}

impl ProviderRegistry {
    pub fn new(default_provider: Provider) -> Self {
        Self {
            providers: HashMap::new(),
            default_provider,
        }
    }

    /// Create one client per supported provider.
    pub fn from_config(config: &ProvidersConfig) -> Result<Self, LLMError> {
        let client = Client::builder().connect_timeout(CONNECT_TIMEOUT).build()?;
        let mut registry = Self::new(config.default_provider);

        if config.openai.api_key.is_none() {
            warn!("OPENAI_API_KEY is not set; OpenAI requests will be sent without credentials");
        }
        let openai = OpenAIProvider::new(
            client.clone(),
            config.openai.base_url.clone(),
            config.openai.api_key.clone(),
            config.default_model.clone(),
        );
        registry.register(Provider::OpenAI, Arc::new(openai));
        info!(base_url = %config.openai.base_url, "Registered OpenAI provider");

        let ollama = OllamaProvider::new(
            client,
            config.ollama.base_url.clone(),
            config.default_model.clone(),
        );
        registry.register(Provider::Ollama, Arc::new(ollama));
        info!(base_url = %config.ollama.base_url, "Registered Ollama provider");

        Ok(registry)
    }

    /// Register a provider implementation.
    pub fn register(&mut self, provider: Provider, implementation: Arc<dyn LLMProvider>) {
        self.providers.insert(provider, implementation);
    }

    /// Get a provider by type.
    pub fn get(&self, provider: Provider) -> Option<Arc<dyn LLMProvider>> {
        self.providers.get(&provider).cloned()
    }

    pub fn default_provider(&self) -> Provider {
        self.default_provider
    }

    /// Resolve the provider for one request.
    ///
    /// An explicit name must belong to the supported set; without one the
    /// configured default is used.
    pub fn select(
        &self,
        requested: Option<&str>,
    ) -> Result<(Provider, Arc<dyn LLMProvider>), DispatchError> {
        let provider = match requested {
            Some(name) => name.parse::<Provider>()?,
            None => self.default_provider,
        };

        let implementation = self
            .get(provider)
            .ok_or(DispatchError::NotConfigured(provider))?;
        Ok((provider, implementation))
    }

    /// Registered providers in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = (Provider, Arc<dyn LLMProvider>)> + '_ {
        Provider::ALL
            .into_iter()
            .filter_map(|p| self.get(p).map(|implementation| (p, implementation)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::testing::FakeProvider;

    fn registry(default_provider: Provider) -> (ProviderRegistry, Arc<FakeProvider>, Arc<FakeProvider>) {
        let openai = Arc::new(FakeProvider::replying("from openai"));
        let ollama = Arc::new(FakeProvider::replying("from ollama"));

        let mut registry = ProviderRegistry::new(default_provider);
        registry.register(Provider::OpenAI, openai.clone());
        registry.register(Provider::Ollama, ollama.clone());
        (registry, openai, ollama)
    }

    #[test]
    fn explicit_provider_is_selected() {
        let (registry, _, ollama) = registry(Provider::OpenAI);

        let (provider, selected) = registry.select(Some("ollama")).unwrap();
        assert_eq!(provider, Provider::Ollama);
        let expected: Arc<dyn LLMProvider> = ollama;
        assert!(Arc::ptr_eq(&selected, &expected));
    }

    #[tokio::test]
    async fn missing_provider_routes_to_default() {
        let (registry, openai, ollama) = registry(Provider::Ollama);

        let (provider, selected) = registry.select(None).unwrap();
        assert_eq!(provider, Provider::Ollama);

        let request = chatgate_types::ChatRequest::new(vec![chatgate_types::Message::user("hi")]);
        let response = selected.complete(&request).await.unwrap();
        assert_eq!(response.choices[0].message.content, "from ollama");
        assert_eq!(ollama.calls(), 1);
        assert_eq!(openai.calls(), 0);
    }

    #[test]
    fn unknown_provider_is_rejected_by_name() {
        let (registry, openai, ollama) = registry(Provider::OpenAI);

        let err = registry.select(Some("anthropic")).err().unwrap();
        assert!(matches!(err, DispatchError::UnsupportedProvider(ref name) if name == "anthropic"));
        assert_eq!(err.to_string(), "unsupported provider: anthropic");
        assert_eq!(openai.calls() + ollama.calls(), 0);
    }

    #[test]
    fn provider_names_are_case_sensitive() {
        let (registry, _, _) = registry(Provider::OpenAI);
        assert!(matches!(
            registry.select(Some("Ollama")),
            Err(DispatchError::UnsupportedProvider(_))
        ));
    }

    #[test]
    fn supported_but_unregistered_provider() {
        let mut registry = ProviderRegistry::new(Provider::OpenAI);
        registry.register(Provider::Ollama, Arc::new(FakeProvider::replying("x")));

        assert!(matches!(
            registry.select(None),
            Err(DispatchError::NotConfigured(Provider::OpenAI))
        ));
    }

    #[test]
    fn iter_follows_declaration_order() {
        let (registry, _, _) = registry(Provider::Ollama);
        let order: Vec<Provider> = registry.iter().map(|(p, _)| p).collect();
        assert_eq!(order, vec![Provider::OpenAI, Provider::Ollama]);
    }

    #[test]
    fn from_config_registers_both_providers() {
        let registry = ProviderRegistry::from_config(&ProvidersConfig::default()).unwrap();
        assert!(registry.get(Provider::OpenAI).is_some());
        assert!(registry.get(Provider::Ollama).is_some());
        assert_eq!(registry.default_provider(), Provider::OpenAI);
    }
}
