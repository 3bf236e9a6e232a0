//! `talewright stages`: List registered pipeline stages.

use talewright_config::AppConfig;
use talewright_pipeline::StageRegistry;
use tracing::warn;

use super::{CommandResult, default_service, registry};

pub async fn run(config: &AppConfig) -> CommandResult {
    let registry = match default_service(config) {
        Ok(service) => registry(service),
        Err(e) => {
            warn!(error = %e, "LLM stages unavailable");
            StageRegistry::builtin()
        }
    };

    println!("Registered stages:");
    for name in registry.names() {
        println!("  {name}");
    }
    println!();
    println!("  Specs take parameters as name:key=value,key=value");
    println!("  e.g. accumulate:max_chunks=3  summarize:temperature=0.2");
    Ok(())
}
