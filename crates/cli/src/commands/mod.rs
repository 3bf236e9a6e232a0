pub mod capabilities;
pub mod config_cmd;
pub mod generate;
pub mod run;
pub mod stages;
pub mod stream;

use std::sync::Arc;

use talewright_config::AppConfig;
use talewright_core::{CancellationToken, HttpTransport, ProviderError, TextGenerationService};
use talewright_pipeline::StageRegistry;
use talewright_providers::{ReqwestTransport, build_from_config};

pub type CommandResult = Result<(), Box<dyn std::error::Error>>;

pub fn transport() -> Arc<dyn HttpTransport> {
    Arc::new(ReqwestTransport::new())
}

/// The router's default text service.
pub fn default_service(
    config: &AppConfig,
) -> talewright_core::Result<Arc<dyn TextGenerationService>> {
    let router = build_from_config(config, transport());
    router.default().ok_or_else(|| {
        ProviderError::NotConfigured(format!(
            "default provider '{}' is not available (configure [providers.{}] with an api_url)",
            router.default_name(),
            router.default_name()
        ))
        .into()
    })
}

/// Built-in stages plus the LLM stages bound to `service`.
pub fn registry(service: Arc<dyn TextGenerationService>) -> StageRegistry {
    let mut registry = StageRegistry::builtin();
    talewright_llm::register_stages(&mut registry, service);
    registry
}

/// A token that is cancelled on Ctrl+C.
pub fn cancel_on_ctrl_c() -> CancellationToken {
    let cancel = CancellationToken::new();
    let token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Interrupted, canceling");
            token.cancel();
        }
    });
    cancel
}
