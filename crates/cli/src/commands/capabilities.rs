//! `talewright capabilities`: Print a model's capability descriptor.

use talewright_config::AppConfig;
use talewright_inference::{ClientOptions, InferenceProvider, UnifiedInferenceClient};

use super::{CommandResult, cancel_on_ctrl_c, transport};

pub async fn run(config: &AppConfig, provider: &str, model: &str) -> CommandResult {
    let provider: InferenceProvider = provider.parse()?;
    let client = UnifiedInferenceClient::new(transport(), ClientOptions::from_config(config));
    let capabilities = client
        .capabilities(provider, model, &cancel_on_ctrl_c())
        .await?;
    println!("{}", serde_json::to_string_pretty(&capabilities)?);
    Ok(())
}
