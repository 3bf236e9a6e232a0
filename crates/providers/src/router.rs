//! Provider router: selects the text generation service based on config.

use std::collections::HashMap;
use std::sync::Arc;

use talewright_config::AppConfig;
use talewright_core::{HttpTransport, TextGenerationService};
use tracing::warn;

use crate::huggingface::HuggingFaceTextService;
use crate::openai_compat::OpenAiCompatService;

/// Name → service table with a default.
pub struct ProviderRouter {
    providers: HashMap<String, Arc<dyn TextGenerationService>>,
    default_provider: String,
}

impl ProviderRouter {
    pub fn new(default_provider: impl Into<String>) -> Self {
        Self {
            providers: HashMap::new(),
            default_provider: default_provider.into(),
        }
    }

    pub fn register(&mut self, name: impl Into<String>, service: Arc<dyn TextGenerationService>) {
        self.providers.insert(name.into(), service);
    }

    pub fn default(&self) -> Option<Arc<dyn TextGenerationService>> {
        self.providers.get(&self.default_provider).cloned()
    }

    pub fn default_name(&self) -> &str {
        &self.default_provider
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn TextGenerationService>> {
        self.providers.get(name).cloned()
    }

    /// Registered provider names, sorted.
    pub fn list(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.providers.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

/// Build services from configuration.
///
/// Providers without an explicit `api_url` need a well-known name; unknown
/// ones are skipped with a warning.
pub fn build_from_config(config: &AppConfig, transport: Arc<dyn HttpTransport>) -> ProviderRouter {
    let mut router = ProviderRouter::new(&config.default_provider);

    for (name, provider_config) in &config.providers {
        let api_key = provider_config.api_key.clone().or_else(|| config.api_key.clone());
        let model = provider_config
            .default_model
            .clone()
            .unwrap_or_else(|| config.default_model.clone());
        let Some(base_url) = provider_config
            .api_url
            .clone()
            .or_else(|| default_base_url(name, config))
        else {
            warn!(provider = %name, "No api_url for unknown provider; skipping");
            continue;
        };

        let service = build_service(name, &base_url, api_key, &model, config, transport.clone());
        router.register(name.clone(), service);
    }

    // Ensure the default provider exists (even if not explicitly configured)
    if router.get(&config.default_provider).is_none() {
        match default_base_url(&config.default_provider, config) {
            Some(base_url) => {
                let service = build_service(
                    &config.default_provider,
                    &base_url,
                    config.api_key.clone(),
                    &config.default_model,
                    config,
                    transport,
                );
                router.register(config.default_provider.clone(), service);
            }
            None => warn!(
                provider = %config.default_provider,
                "Default provider is not configured and has no known endpoint"
            ),
        }
    }

    router
}

fn build_service(
    name: &str,
    base_url: &str,
    api_key: Option<String>,
    model: &str,
    config: &AppConfig,
    transport: Arc<dyn HttpTransport>,
) -> Arc<dyn TextGenerationService> {
    if name == "huggingface" {
        let token = api_key.or_else(|| config.inference.hf_token.clone());
        Arc::new(HuggingFaceTextService::new(base_url, token, model, transport))
    } else {
        Arc::new(OpenAiCompatService::new(
            name,
            base_url,
            api_key.unwrap_or_default(),
            model,
            transport,
        ))
    }
}

/// Base URL for well-known providers.
fn default_base_url(provider_name: &str, config: &AppConfig) -> Option<String> {
    let url = match provider_name {
        "openai" => config.inference.openai_url.clone(),
        "ollama" => format!("{}/v1", config.inference.ollama_url.trim_end_matches('/')),
        "huggingface" => config.inference.huggingface_url.clone(),
        "openrouter" => "https://openrouter.ai/api/v1".into(),
        "groq" => "https://api.groq.com/openai/v1".into(),
        "together" => "https://api.together.xyz/v1".into(),
        "vllm" => "http://localhost:8000/v1".into(),
        _ => return None,
    };
    Some(url)
}

#[cfg(test)]
mod tests {
    use talewright_config::ProviderConfig;

    use super::*;
    use crate::test_support::ScriptedTransport;

    fn transport() -> Arc<dyn HttpTransport> {
        Arc::new(ScriptedTransport::new())
    }

    #[test]
    fn router_register_and_lookup() {
        let mut router = ProviderRouter::new("openai");
        router.register(
            "openai",
            Arc::new(OpenAiCompatService::openai("sk-test", "gpt-4o-mini", transport())),
        );

        assert!(router.get("openai").is_some());
        assert!(router.get("nonexistent").is_none());
        assert!(router.default().is_some());
        assert_eq!(router.list(), vec!["openai"]);
    }

    #[test]
    fn default_base_urls() {
        let config = AppConfig::default();
        assert!(default_base_url("openrouter", &config).unwrap().contains("openrouter.ai"));
        assert!(default_base_url("openai", &config).unwrap().contains("api.openai.com"));
        assert_eq!(
            default_base_url("ollama", &config).as_deref(),
            Some("http://localhost:11434/v1")
        );
        assert!(default_base_url("mystery", &config).is_none());
    }

    #[test]
    fn build_from_default_config() {
        let config = AppConfig::default();
        let router = build_from_config(&config, transport());
        assert!(router.default().is_some());
        assert_eq!(router.default_name(), "openai");
    }

    #[test]
    fn huggingface_and_custom_providers() {
        let mut config = AppConfig::default();
        config.providers.insert(
            "huggingface".into(),
            ProviderConfig {
                api_key: None,
                api_url: None,
                default_model: Some("gpt2".into()),
            },
        );
        config.providers.insert(
            "local".into(),
            ProviderConfig {
                api_key: None,
                api_url: Some("http://127.0.0.1:5000/v1".into()),
                default_model: None,
            },
        );
        config.providers.insert(
            "mystery".into(),
            ProviderConfig {
                api_key: None,
                api_url: None,
                default_model: None,
            },
        );

        let router = build_from_config(&config, transport());
        assert_eq!(router.list(), vec!["huggingface", "local", "openai"]);
        assert_eq!(router.get("huggingface").unwrap().name(), "huggingface");
        assert_eq!(router.get("local").unwrap().name(), "local");
    }
}
