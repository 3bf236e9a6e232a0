//! `talewright stream`: Stream tokens and report call metrics.

use std::io::Write;
use std::sync::Arc;

use futures::StreamExt;
use talewright_config::AppConfig;
use talewright_providers::{
    ReqwestTransport, StreamContext, StreamPrompt, StreamingPolicy, TokenStreamService,
};
use talewright_telemetry::InMemoryMetrics;

use super::{CommandResult, cancel_on_ctrl_c};

pub async fn run(config: &AppConfig, prompt: String, endpoint: Option<String>) -> CommandResult {
    let endpoint = endpoint
        .or_else(|| config.streaming.endpoint.clone())
        .ok_or("No streaming endpoint configured (set streaming.endpoint or pass --endpoint)")?;

    let metrics = Arc::new(InMemoryMetrics::new());
    let service = TokenStreamService::new(Arc::new(ReqwestTransport::streaming()), metrics.clone());
    let context = StreamContext::new(endpoint)
        .with_api_key(config.streaming.api_key.clone())
        .with_policy(StreamingPolicy::from_config(&config.streaming));

    let mut tokens = service.stream(StreamPrompt::new(prompt), context, cancel_on_ctrl_c());
    let mut stdout = std::io::stdout();
    let mut failure = None;

    while let Some(token) = tokens.next().await {
        match token {
            Ok(token) => {
                write!(stdout, "{}", token.content)?;
                stdout.flush()?;
            }
            Err(e) => {
                failure = Some(e);
                break;
            }
        }
    }
    writeln!(stdout)?;

    eprintln!("{}", serde_json::to_string_pretty(&metrics.snapshot())?);

    match failure {
        Some(e) => Err(e.into()),
        None => Ok(()),
    }
}
