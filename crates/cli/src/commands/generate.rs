//! `talewright generate`: One-shot text generation.

use std::sync::Arc;

use talewright_config::AppConfig;
use talewright_core::{GenerationRequest, GenerationSettings};
use talewright_inference::{
    ClientOptions, InferenceProvider, InferenceSettings, TextRequest, UnifiedInferenceClient,
};
use tracing::info;

use super::{CommandResult, cancel_on_ctrl_c, default_service, transport};

pub struct GenerateArgs {
    pub prompt: String,
    pub provider: Option<String>,
    pub model: Option<String>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
}

pub async fn run(config: &AppConfig, args: GenerateArgs) -> CommandResult {
    let cancel = cancel_on_ctrl_c();
    let temperature = args.temperature.unwrap_or(config.default_temperature);
    let max_tokens = args.max_tokens.unwrap_or(config.default_max_tokens);

    let Some(provider) = args.provider else {
        let service = default_service(config)?;
        let request = GenerationRequest::new(args.prompt).with_settings(GenerationSettings {
            temperature: Some(temperature),
            max_output_tokens: Some(max_tokens),
        });
        let response = service.generate(&request, &cancel).await?;
        info!(
            provider = service.name(),
            model = response.metadata.model.as_deref().unwrap_or("?"),
            output_tokens = response.metadata.output_tokens,
            "Generation finished"
        );
        println!("{}", response.text);
        return Ok(());
    };

    let provider: InferenceProvider = provider.parse()?;
    let model = args
        .model
        .or_else(|| {
            config
                .providers
                .get(provider.as_str())
                .and_then(|p| p.default_model.clone())
        })
        .unwrap_or_else(|| config.default_model.clone());

    let client = Arc::new(UnifiedInferenceClient::new(
        transport(),
        ClientOptions::from_config(config),
    ));
    let settings = InferenceSettings {
        temperature: Some(f64::from(temperature)),
        max_tokens: Some(max_tokens),
        ..Default::default()
    };
    let request = TextRequest::new(provider, &model, args.prompt).with_settings(settings);
    let response = client.generate_text(&request, &cancel).await?;

    info!(provider = %provider, model = %model, tokens_used = response.tokens_used, "Generation finished");
    println!("{}", response.text);
    Ok(())
}
