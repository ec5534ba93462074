//! Endpoint URL construction.
//!
//! The configured base URL points at the server's API root (for a stock
//! Ollama install, `http://localhost:11434/api`); endpoints are joined onto it.

/// Strip trailing slashes from a base URL.
///
/// ```
/// use breeze::utils::url::normalize_base_url;
///
/// assert_eq!(normalize_base_url("http://localhost:11434/api/"), "http://localhost:11434/api");
/// assert_eq!(normalize_base_url("  http://gpu-box:11434/api// "), "http://gpu-box:11434/api");
/// ```
pub fn normalize_base_url(base_url: &str) -> String {
    base_url.trim().trim_end_matches('/').to_string()
}

/// Join an endpoint path onto a base URL with exactly one slash between them.
///
/// ```
/// use breeze::utils::url::construct_api_url;
///
/// assert_eq!(
///     construct_api_url("http://localhost:11434/api/", "/chat"),
///     "http://localhost:11434/api/chat"
/// );
/// ```
pub fn construct_api_url(base_url: &str, endpoint: &str) -> String {
    let endpoint = endpoint.trim_start_matches('/');
    format!("{}/{}", normalize_base_url(base_url), endpoint)
}
