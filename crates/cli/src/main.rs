//! Talewright CLI: the main entry point.
//!
//! Commands:
//! - `run`: Run a narration pipeline over text or a file
//! - `generate`: One-shot text generation
//! - `stream`: Stream tokens from the configured endpoint
//! - `capabilities`: Show what a model supports
//! - `stages`: List registered pipeline stages
//! - `config`: Show, validate or initialize configuration

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use talewright_config::{AppConfig, LoggingConfig};

mod commands;

#[derive(Parser)]
#[command(
    name = "talewright",
    about = "Talewright: streaming narration pipelines with LLM-maintained story state",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a pipeline over narration text
    Run {
        /// Stage spec, repeatable (e.g. `accumulate:max_chunks=3`). Defaults to `pipeline.stages`
        #[arg(long = "stage", value_name = "SPEC")]
        stages: Vec<String>,

        /// Narration text (reads stdin when neither --text nor --input is given)
        #[arg(long, conflicts_with = "input")]
        text: Option<String>,

        /// Read narration from a file
        #[arg(long)]
        input: Option<PathBuf>,

        /// Treat --input as bytes in this encoding (e.g. utf-16le)
        #[arg(long, requires = "input")]
        encoding: Option<String>,

        /// Session id stamped on every chunk
        #[arg(long)]
        session: Option<String>,

        /// Print the resulting story state as JSON
        #[arg(long)]
        show_state: bool,
    },

    /// Generate text once
    Generate {
        prompt: String,

        /// Use the unified inference client with this provider (huggingface, openai, ollama)
        #[arg(long)]
        provider: Option<String>,

        /// Model id for --provider
        #[arg(long, requires = "provider")]
        model: Option<String>,

        #[arg(long)]
        temperature: Option<f32>,

        #[arg(long)]
        max_tokens: Option<u32>,
    },

    /// Stream tokens from the streaming endpoint
    Stream {
        prompt: String,

        /// Override `streaming.endpoint`
        #[arg(long)]
        endpoint: Option<String>,
    },

    /// Show a model's capability descriptor
    Capabilities {
        #[arg(long)]
        provider: String,

        #[arg(long)]
        model: String,
    },

    /// List registered pipeline stages
    Stages,

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the effective configuration
    Show,
    /// Check the configuration file
    Validate,
    /// Print the configuration file path
    Path,
    /// Write a default configuration file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = AppConfig::load();
    init_tracing(cli.verbose, config.as_ref().ok().map(|c| &c.logging));

    match cli.command {
        Commands::Config { action } => match action {
            ConfigAction::Show => commands::config_cmd::show(&config?).await?,
            ConfigAction::Validate => commands::config_cmd::validate(config).await?,
            ConfigAction::Path => commands::config_cmd::path().await?,
            ConfigAction::Init { force } => commands::config_cmd::init(force).await?,
        },
        Commands::Run {
            stages,
            text,
            input,
            encoding,
            session,
            show_state,
        } => {
            let args = commands::run::RunArgs {
                stages,
                text,
                input,
                encoding,
                session,
                show_state,
            };
            commands::run::run(&config?, args).await?
        }
        Commands::Generate {
            prompt,
            provider,
            model,
            temperature,
            max_tokens,
        } => {
            let args = commands::generate::GenerateArgs {
                prompt,
                provider,
                model,
                temperature,
                max_tokens,
            };
            commands::generate::run(&config?, args).await?
        }
        Commands::Stream { prompt, endpoint } => {
            commands::stream::run(&config?, prompt, endpoint).await?
        }
        Commands::Capabilities { provider, model } => {
            commands::capabilities::run(&config?, &provider, &model).await?
        }
        Commands::Stages => commands::stages::run(&config?).await?,
    }

    Ok(())
}

/// `RUST_LOG` wins, then `--verbose`, then `logging.level`. Logs go to
/// stderr so command output stays pipeable.
fn init_tracing(verbose: bool, logging: Option<&LoggingConfig>) {
    let level = if verbose {
        "debug".to_string()
    } else {
        logging.map_or_else(|| "info".to_string(), |l| l.level.clone())
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);

    if logging.is_some_and(|l| l.format == "json") {
        builder.json().init();
    } else {
        builder.init();
    }
}
