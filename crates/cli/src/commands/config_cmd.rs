//! `talewright config`: Configuration management commands.

use talewright_config::{AppConfig, ConfigError};

use super::CommandResult;

pub async fn validate(loaded: Result<AppConfig, ConfigError>) -> CommandResult {
    println!("🔍 Validating configuration...");

    let config = match loaded {
        Ok(config) => config,
        Err(e) => {
            println!("   ❌ Config error: {e}");
            return Err(e.into());
        }
    };
    println!("   ✅ Config parsed successfully");

    let mut warnings = Vec::new();
    if config.api_key.is_none() && config.providers.values().all(|p| p.api_key.is_none()) {
        warnings.push("No API key set (set TALEWRIGHT_API_KEY or OPENAI_API_KEY)");
    }
    if config.streaming.endpoint.is_none() {
        warnings.push("streaming.endpoint is not set; `talewright stream` needs --endpoint");
    }
    if config.inference.hf_token.is_none() {
        warnings.push("No Hugging Face token (set HF_TOKEN); gated models will be refused");
    }
    if config.pipeline.stages.is_empty() {
        warnings.push("pipeline.stages is empty; `talewright run` will only annotate");
    }

    if warnings.is_empty() {
        println!("   ✅ All checks passed");
    } else {
        println!();
        for w in &warnings {
            println!("   ⚠️  {w}");
        }
    }

    println!();
    println!("   Provider:   {}", config.default_provider);
    println!("   Model:      {}", config.default_model);
    println!("   Stages:     {}", config.pipeline.stages.join(" → "));
    println!(
        "   Streaming:  {}",
        config.streaming.endpoint.as_deref().unwrap_or("(none)")
    );
    println!("   Retries:    {} attempts", config.inference.max_attempts);
    Ok(())
}

pub async fn show(config: &AppConfig) -> CommandResult {
    let toml_str = toml::to_string_pretty(config)?;
    println!("{toml_str}");
    Ok(())
}

pub async fn path() -> CommandResult {
    println!("{}", config_path().display());
    Ok(())
}

pub async fn init(force: bool) -> CommandResult {
    let path = config_path();
    if path.exists() && !force {
        return Err(format!("{} already exists (use --force to overwrite)", path.display()).into());
    }
    std::fs::create_dir_all(AppConfig::config_dir())?;
    std::fs::write(&path, AppConfig::default_toml())?;
    println!("✅ Wrote {}", path.display());
    Ok(())
}

fn config_path() -> std::path::PathBuf {
    AppConfig::config_dir().join("config.toml")
}
