//! Settings management for CLI set/unset commands.

use std::fmt;
use std::str::FromStr;

use crate::core::config::Config;
use crate::utils::url::normalize_base_url;

/// Errors that can occur when modifying configuration settings.
#[derive(Debug, PartialEq, Eq)]
pub enum SettingError {
    /// The provided setting key is not recognized.
    UnknownKey(String),
    /// The provided value could not be parsed as a boolean.
    InvalidBoolean(String),
    /// The base URL does not start with a scheme.
    InvalidUrl(String),
    /// Required arguments are missing.
    MissingArgs {
        hint: &'static str,
        example: &'static str,
    },
}

impl SettingError {
    /// Print the error message to stderr with appropriate formatting.
    pub fn print(&self) {
        match self {
            SettingError::UnknownKey(key) => {
                eprintln!("❌ Unknown config key: {key}");
                eprintln!("   Known keys: {}", SettingKey::ALL_NAMES.join(", "));
            }
            SettingError::InvalidBoolean(input) => {
                eprintln!("❌ Invalid boolean value: {input}");
                eprintln!("   Use 'on' or 'off' (also accepts true/false, yes/no)");
            }
            SettingError::InvalidUrl(input) => {
                eprintln!("❌ Invalid base URL: {input}");
                eprintln!("   Include the scheme, e.g. http://localhost:11434/api");
            }
            SettingError::MissingArgs { hint, example } => {
                eprintln!("⚠️  {hint}");
                eprintln!("Example: {example}");
            }
        }
    }
}

impl fmt::Display for SettingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SettingError::UnknownKey(key) => write!(f, "Unknown config key: {key}"),
            SettingError::InvalidBoolean(input) => write!(f, "Invalid boolean value: {input}"),
            SettingError::InvalidUrl(input) => write!(f, "Invalid base URL: {input}"),
            SettingError::MissingArgs { hint, .. } => write!(f, "{hint}"),
        }
    }
}

impl std::error::Error for SettingError {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettingKey {
    BaseUrl,
    DefaultModel,
    ShowMetrics,
}

impl SettingKey {
    pub const ALL_NAMES: [&'static str; 3] = ["base-url", "default-model", "show-metrics"];

    pub fn name(self) -> &'static str {
        match self {
            SettingKey::BaseUrl => "base-url",
            SettingKey::DefaultModel => "default-model",
            SettingKey::ShowMetrics => "show-metrics",
        }
    }
}

impl FromStr for SettingKey {
    type Err = SettingError;

    fn from_str(key: &str) -> Result<Self, Self::Err> {
        match key {
            "base-url" => Ok(SettingKey::BaseUrl),
            "default-model" => Ok(SettingKey::DefaultModel),
            "show-metrics" => Ok(SettingKey::ShowMetrics),
            other => Err(SettingError::UnknownKey(other.to_string())),
        }
    }
}

/// Parse a boolean value from user input.
///
/// Accepts: on/off, true/false, yes/no (case-insensitive).
pub fn parse_bool(input: &str) -> Option<bool> {
    match input.to_lowercase().as_str() {
        "on" | "true" | "yes" | "1" => Some(true),
        "off" | "false" | "no" | "0" => Some(false),
        _ => None,
    }
}

/// Apply `set <key> <value...>` to `config`, returning the confirmation line.
pub fn set_value(config: &mut Config, key: &str, args: &[String]) -> Result<String, SettingError> {
    let key = key.parse::<SettingKey>()?;
    let value = args.join(" ");
    let value = value.trim();

    match key {
        SettingKey::BaseUrl => {
            if value.is_empty() {
                return Err(SettingError::MissingArgs {
                    hint: "Specify the server's API root.",
                    example: "breeze set base-url http://localhost:11434/api",
                });
            }
            if !(value.starts_with("http://") || value.starts_with("https://")) {
                return Err(SettingError::InvalidUrl(value.to_string()));
            }
            let url = normalize_base_url(value);
            config.base_url = Some(url.clone());
            Ok(format!("✅ Set base-url to: {url}"))
        }
        SettingKey::DefaultModel => {
            if value.is_empty() {
                return Err(SettingError::MissingArgs {
                    hint: "Specify the model to start chats with.",
                    example: "breeze set default-model llama3:latest",
                });
            }
            config.default_model = Some(value.to_string());
            Ok(format!("✅ Set default-model to: {value}"))
        }
        SettingKey::ShowMetrics => {
            let enabled =
                parse_bool(value).ok_or_else(|| SettingError::InvalidBoolean(value.to_string()))?;
            config.show_metrics = Some(enabled);
            Ok(format!(
                "✅ Set show-metrics to: {}",
                if enabled { "on" } else { "off" }
            ))
        }
    }
}

/// Apply `unset <key>` to `config`, returning the confirmation line.
pub fn unset_value(config: &mut Config, key: &str) -> Result<String, SettingError> {
    let key = key.parse::<SettingKey>()?;
    match key {
        SettingKey::BaseUrl => config.base_url = None,
        SettingKey::DefaultModel => config.default_model = None,
        SettingKey::ShowMetrics => config.show_metrics = None,
    }
    Ok(format!("✅ Unset {}", key.name()))
}
