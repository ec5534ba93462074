//! Model listing functionality

use std::error::Error;

use crate::api::models::{format_size, sort_models, ModelDirectory};
use crate::api::ModelInfo;
use crate::core::config::{Config, ServerConfig};

pub async fn list_models(server: &ServerConfig, config: &Config) -> Result<(), Box<dyn Error>> {
    let directory = ModelDirectory::new(reqwest::Client::new(), server.base_url.clone());
    let models = match directory.list_models().await {
        Ok(models) => models,
        Err(err) => {
            eprintln!("❌ {}", err.user_notice());
            eprintln!("   {err}");
            std::process::exit(1);
        }
    };

    println!("🤖 Available Models at {}", server.base_url);
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!();

    if let Some(default_model) = &config.default_model {
        println!("🎯 Default model: {default_model} (from config)");
        println!();
    }

    for line in model_listing_lines(models) {
        println!("{line}");
    }
    Ok(())
}

/// Lines shown by `breeze models` and `/models`.
pub fn model_listing_lines(mut models: Vec<ModelInfo>) -> Vec<String> {
    if models.is_empty() {
        return vec!["No models installed. Pull one with 'ollama pull <model>'.".to_string()];
    }

    let mut lines = vec![
        format!("Found {} models (sorted newest first):", models.len()),
        String::new(),
    ];
    sort_models(&mut models);

    for model in models {
        lines.push(format!("  • {}", model.name));

        let details = [
            model.details.parameter_size.as_deref(),
            model.details.quantization_level.as_deref(),
            model.details.family.as_deref(),
        ]
        .into_iter()
        .flatten()
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>();
        if !details.is_empty() {
            lines.push(format!("    Details: {}", details.join(", ")));
        }
        if model.size > 0 {
            lines.push(format!("    Size: {}", format_size(model.size)));
        }
        if let Some(modified) = model
            .modified_at
            .as_deref()
            .and_then(|raw| chrono::DateTime::parse_from_rfc3339(raw).ok())
        {
            lines.push(format!(
                "    Modified: {}",
                modified
                    .with_timezone(&chrono::Utc)
                    .format("%Y-%m-%d %H:%M:%S UTC")
            ));
        }
        lines.push(String::new());
    }
    lines
}
