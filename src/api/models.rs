use tracing::debug;

use crate::api::{ModelInfo, ModelsResponse, TAGS_ENDPOINT};
use crate::core::error::{DirectoryCause, DirectoryUnavailable};
use crate::utils::url::construct_api_url;

/// Client for the server's model directory.
///
/// Every call performs exactly one round trip; nothing is cached.
#[derive(Debug, Clone)]
pub struct ModelDirectory {
    client: reqwest::Client,
    base_url: String,
}

impl ModelDirectory {
    pub fn new(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }

    /// Models in the order the server listed them.
    pub async fn list_models(&self) -> Result<Vec<ModelInfo>, DirectoryUnavailable> {
        fetch_models(&self.client, &self.base_url).await
    }
}

pub async fn fetch_models(
    client: &reqwest::Client,
    base_url: &str,
) -> Result<Vec<ModelInfo>, DirectoryUnavailable> {
    let url = construct_api_url(base_url, TAGS_ENDPOINT);
    let unavailable = |cause: DirectoryCause| DirectoryUnavailable {
        url: url.clone(),
        cause,
    };

    let response = client
        .get(&url)
        .send()
        .await
        .map_err(|err| unavailable(DirectoryCause::Transport(err)))?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        debug!(url = %url, status = status.as_u16(), "Model directory request failed");
        return Err(unavailable(DirectoryCause::Status {
            status: status.as_u16(),
            body,
        }));
    }

    let bytes = response
        .bytes()
        .await
        .map_err(|err| unavailable(DirectoryCause::Transport(err)))?;
    let models = serde_json::from_slice::<ModelsResponse>(&bytes)
        .map_err(|err| unavailable(DirectoryCause::Decode(err)))?
        .into_models();

    debug!(url = %url, count = models.len(), "Fetched model directory");
    Ok(models)
}

/// Sort for display: most recently modified first, then by name.
///
/// Models without a modification time sort after those with one. Timestamps
/// are compared as parsed instants so differing UTC offsets order correctly.
pub fn sort_models(models: &mut [ModelInfo]) {
    models.sort_by(|a, b| {
        let a_time = parse_modified(a);
        let b_time = parse_modified(b);
        match (a_time, b_time) {
            (Some(a_time), Some(b_time)) => b_time.cmp(&a_time).then_with(|| a.name.cmp(&b.name)),
            (Some(_), None) => std::cmp::Ordering::Less,
            (None, Some(_)) => std::cmp::Ordering::Greater,
            (None, None) => a.name.cmp(&b.name),
        }
    });
}

fn parse_modified(model: &ModelInfo) -> Option<chrono::DateTime<chrono::FixedOffset>> {
    model
        .modified_at
        .as_deref()
        .and_then(|raw| chrono::DateTime::parse_from_rfc3339(raw).ok())
}

/// Pick the model a new session starts with.
///
/// An explicit choice wins and is not checked against the listing. Otherwise
/// the first listed model is used; an empty listing selects nothing.
pub fn select_default_model(models: &[ModelInfo], preferred: Option<&str>) -> Option<String> {
    match preferred.map(str::trim).filter(|name| !name.is_empty()) {
        Some(name) => Some(name.to_string()),
        None => models.first().map(|model| model.name.clone()),
    }
}

/// Human-readable size, e.g. `4.7 GB`.
pub fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1000.0 && unit < UNITS.len() - 1 {
        value /= 1000.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{value:.1} {}", UNITS[unit])
    }
}
