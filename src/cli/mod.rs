//! Command-line interface parsing and handling
//!
//! This module handles parsing command-line arguments and executing the appropriate commands.

pub mod chat;
pub mod model_list;
pub mod say;
pub mod settings;

use std::error::Error;
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing::debug;

use crate::api::models::{fetch_models, select_default_model};
use crate::cli::chat::{run_chat, ChatOptions};
use crate::cli::model_list::list_models;
use crate::cli::say::run_say;
use crate::cli::settings::{set_value, unset_value};
use crate::core::config::{Config, ServerConfig};
use crate::core::error::DirectoryUnavailable;
use crate::utils::logging::init_tracing;

const LONG_VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    "\ncommit: ",
    env!("VERGEN_GIT_SHA"),
    " (",
    env!("VERGEN_GIT_DESCRIBE"),
    ")\nbuilt: ",
    env!("VERGEN_BUILD_TIMESTAMP"),
    "\nrustc: ",
    env!("VERGEN_RUSTC_SEMVER"),
);

#[derive(Parser)]
#[command(name = "breeze")]
#[command(version, long_version = LONG_VERSION)]
#[command(about = "A terminal chat client for a local Ollama server")]
#[command(
    long_about = "Breeze talks to a locally running Ollama server. Replies stream in \
as the model produces them.\n\n\
Configuration:\n\
  Use 'breeze set' to view settings and 'breeze set <key> <value>' to change them.\n\
  Keys: base-url, default-model, show-metrics\n\n\
Environment Variables:\n\
  RUST_LOG          Log filter (defaults to breeze=info,warn)\n\n\
Controls:\n\
  Enter             Send the message\n\
  Ctrl+C            Stop the current reply, or quit when idle\n\n\
Commands:\n\
  /model <name>     Switch models for the next message\n\
  /models           List installed models\n\
  /clear            Start a fresh conversation\n\
  /quit             Leave the chat"
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Model to use for chat, or list available models if no model specified
    #[arg(short = 'm', long, global = true, value_name = "MODEL", num_args = 0..=1, default_missing_value = "")]
    pub model: Option<String>,

    /// API root of the Ollama server (defaults to http://localhost:11434/api)
    #[arg(long, global = true, value_name = "URL")]
    pub base_url: Option<String>,

    /// Write diagnostics to the specified file instead of stderr
    #[arg(short = 'l', long, global = true, value_name = "FILE")]
    pub log: Option<PathBuf>,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum Commands {
    /// Start the chat interface (default)
    Chat,
    /// List models installed on the server
    Models,
    /// Send a single prompt and print the reply
    Say {
        /// Prompt text (can be multiple words)
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        prompt: Vec<String>,
    },
    /// Set configuration values
    Set {
        /// Configuration key to set
        key: Option<String>,
        /// Value to set for the key (can be multiple words)
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        value: Option<Vec<String>>,
    },
    /// Unset configuration values
    Unset {
        /// Configuration key to unset
        key: String,
    },
}

pub fn main() -> Result<(), Box<dyn Error>> {
    tokio::runtime::Runtime::new()?.block_on(async_main())
}

async fn async_main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();
    init_tracing(args.log.as_deref())?;

    match args.command.unwrap_or(Commands::Chat) {
        Commands::Set { key, value } => {
            let mut config = Config::load()?;
            let (Some(key), Some(value)) = (key, value.filter(|value| !value.is_empty())) else {
                config.print_all();
                return Ok(());
            };
            match set_value(&mut config, &key, &value) {
                Ok(message) => {
                    config.save()?;
                    println!("{message}");
                }
                Err(err) => {
                    err.print();
                    std::process::exit(1);
                }
            }
            Ok(())
        }
        Commands::Unset { key } => {
            let mut config = Config::load()?;
            match unset_value(&mut config, &key) {
                Ok(message) => {
                    config.save()?;
                    println!("{message}");
                }
                Err(err) => {
                    err.print();
                    std::process::exit(1);
                }
            }
            Ok(())
        }
        Commands::Models => {
            let config = Config::load()?;
            let server = ServerConfig::resolve(&config, args.base_url.as_deref());
            list_models(&server, &config).await
        }
        Commands::Say { prompt } => {
            let config = Config::load()?;
            let server = ServerConfig::resolve(&config, args.base_url.as_deref());
            let client = reqwest::Client::new();
            let model = match resolve_model(&client, &server, &config, args.model.as_deref()).await {
                Ok(Some(model)) => model,
                Ok(None) => {
                    eprintln!("❌ No models are installed. Pull one with 'ollama pull <model>'.");
                    std::process::exit(1);
                }
                Err(err) => {
                    eprintln!("❌ {}", err.user_notice());
                    debug!(error = %err, "Model resolution failed");
                    std::process::exit(1);
                }
            };
            run_say(client, &server, model, prompt, config.show_metrics()).await
        }
        Commands::Chat => {
            let config = Config::load()?;
            let server = ServerConfig::resolve(&config, args.base_url.as_deref());

            // -m without a value lists models instead of chatting
            if args.model.as_deref() == Some("") {
                return list_models(&server, &config).await;
            }

            let client = reqwest::Client::new();
            let model = match resolve_model(&client, &server, &config, args.model.as_deref()).await {
                Ok(model) => model,
                Err(err) => {
                    eprintln!("⚠️  {}", err.user_notice());
                    debug!(error = %err, "Model resolution failed");
                    None
                }
            };

            run_chat(ChatOptions {
                client,
                server,
                model,
                show_metrics: config.show_metrics(),
            })
            .await
        }
    }
}

/// Model a session starts with.
///
/// A `-m` value or the configured default is used as given, without asking
/// the server. Otherwise the directory is consulted and its first model
/// chosen; `Ok(None)` means the server has no models installed.
pub async fn resolve_model(
    client: &reqwest::Client,
    server: &ServerConfig,
    config: &Config,
    explicit: Option<&str>,
) -> Result<Option<String>, DirectoryUnavailable> {
    let preferred = [explicit, config.default_model.as_deref()]
        .into_iter()
        .flatten()
        .map(str::trim)
        .find(|name| !name.is_empty());
    if let Some(model) = preferred {
        return Ok(Some(model.to_string()));
    }

    let models = fetch_models(client, &server.base_url).await?;
    Ok(select_default_model(&models, None))
}
