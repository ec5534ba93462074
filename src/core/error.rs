//! Error types for the model directory and the chat transport.

use std::error::Error as StdError;
use std::fmt;

/// The directory endpoint could not produce a model list.
#[derive(Debug)]
pub struct DirectoryUnavailable {
    /// URL that was queried.
    pub url: String,
    /// What went wrong.
    pub cause: DirectoryCause,
}

#[derive(Debug)]
pub enum DirectoryCause {
    /// The server answered with a non-success status.
    Status { status: u16, body: String },
    /// The request never completed (connection refused, reset, ...).
    Transport(reqwest::Error),
    /// The body was not a directory listing.
    Decode(serde_json::Error),
}

impl DirectoryUnavailable {
    /// Notice shown to the user when the model selector cannot be populated.
    pub fn user_notice(&self) -> String {
        match &self.cause {
            DirectoryCause::Status { status, .. } => {
                format!("Failed to load models (server returned {status}).")
            }
            DirectoryCause::Transport(_) => {
                "Failed to load models. Is the Ollama server running?".to_string()
            }
            DirectoryCause::Decode(_) => {
                "Failed to load models: the server sent an unexpected response.".to_string()
            }
        }
    }
}

impl fmt::Display for DirectoryUnavailable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.cause {
            DirectoryCause::Status { status, body } => {
                write!(f, "model directory at {} returned {status}", self.url)?;
                if !body.trim().is_empty() {
                    write!(f, ": {}", body.trim())?;
                }
                Ok(())
            }
            DirectoryCause::Transport(err) => {
                write!(f, "model directory at {} is unreachable: {err}", self.url)
            }
            DirectoryCause::Decode(err) => {
                write!(f, "model directory at {} sent an invalid body: {err}", self.url)
            }
        }
    }
}

impl StdError for DirectoryUnavailable {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match &self.cause {
            DirectoryCause::Status { .. } => None,
            DirectoryCause::Transport(err) => Some(err),
            DirectoryCause::Decode(err) => Some(err),
        }
    }
}

/// Failure outcome of one chat stream.
///
/// Malformed records and cancellation are not errors: the former are skipped
/// and reported through a [`RecordObserver`](crate::core::ndjson::RecordObserver),
/// the latter completes the stream with
/// [`StreamEnd::Cancelled`](crate::core::chat_stream::StreamEnd::Cancelled).
#[derive(Debug)]
pub enum StreamError {
    /// The request was not sent because a precondition failed.
    InvalidRequest(String),
    /// The server could not be reached before a response arrived.
    Unreachable(reqwest::Error),
    /// The chat endpoint answered with a non-success status. No events were delivered.
    RequestRejected { status: u16, body: String },
    /// The body broke mid-flight. Events already delivered remain valid.
    StreamInterrupted(reqwest::Error),
    /// The server reported an error record mid-stream.
    ServerError(String),
}

impl StreamError {
    /// Notice attached to the pending assistant turn when the stream fails.
    pub fn user_notice(&self) -> String {
        match self {
            StreamError::InvalidRequest(reason) => format!("Request not sent: {reason}"),
            StreamError::Unreachable(_) => {
                "Failed to communicate with Ollama. Is the server running?".to_string()
            }
            StreamError::RequestRejected { status, body } => match extract_error_summary(body) {
                Some(summary) => format!("The server rejected the request ({status}): {summary}"),
                None => format!("The server rejected the request ({status})."),
            },
            StreamError::StreamInterrupted(_) => {
                "The connection dropped before the reply finished.".to_string()
            }
            StreamError::ServerError(message) => format!("The server stopped the reply: {message}"),
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            StreamError::RequestRejected { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl fmt::Display for StreamError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StreamError::InvalidRequest(reason) => write!(f, "invalid chat request: {reason}"),
            StreamError::Unreachable(err) => write!(f, "chat endpoint unreachable: {err}"),
            StreamError::RequestRejected { status, body } => {
                write!(f, "chat request rejected with status {status}")?;
                if !body.trim().is_empty() {
                    write!(f, ": {}", body.trim())?;
                }
                Ok(())
            }
            StreamError::StreamInterrupted(err) => write!(f, "chat stream interrupted: {err}"),
            StreamError::ServerError(message) => write!(f, "server error mid-stream: {message}"),
        }
    }
}

impl StdError for StreamError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            StreamError::Unreachable(err) | StreamError::StreamInterrupted(err) => Some(err),
            _ => None,
        }
    }
}

/// Pull a short message out of an error body like `{"error":"model not found"}`.
fn extract_error_summary(body: &str) -> Option<String> {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return None;
    }

    let summary = match serde_json::from_str::<serde_json::Value>(trimmed) {
        Ok(value) => value
            .pointer("/error/message")
            .and_then(|v| v.as_str())
            .or_else(|| value.get("error").and_then(|v| v.as_str()))
            .map(str::to_owned)?,
        Err(_) => trimmed.to_string(),
    };

    let collapsed = summary.split_whitespace().collect::<Vec<_>>().join(" ");
    (!collapsed.is_empty()).then_some(collapsed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejected_notice_uses_json_error_field() {
        let err = StreamError::RequestRejected {
            status: 404,
            body: r#"{"error":"model \"nope\" not found, try pulling it first"}"#.to_string(),
        };
        assert_eq!(
            err.user_notice(),
            "The server rejected the request (404): model \"nope\" not found, try pulling it first"
        );
        assert_eq!(err.status(), Some(404));
    }

    #[test]
    fn rejected_notice_handles_nested_and_plain_bodies() {
        let nested = StreamError::RequestRejected {
            status: 400,
            body: r#"{"error":{"message":"bad   request"}}"#.to_string(),
        };
        assert_eq!(
            nested.user_notice(),
            "The server rejected the request (400): bad request"
        );

        let plain = StreamError::RequestRejected {
            status: 502,
            body: "upstream down".to_string(),
        };
        assert_eq!(
            plain.user_notice(),
            "The server rejected the request (502): upstream down"
        );

        let empty = StreamError::RequestRejected {
            status: 500,
            body: String::new(),
        };
        assert_eq!(empty.user_notice(), "The server rejected the request (500).");
        assert_eq!(empty.to_string(), "chat request rejected with status 500");
    }

    #[test]
    fn directory_status_display_includes_body() {
        let err = DirectoryUnavailable {
            url: "http://localhost:11434/api/tags".to_string(),
            cause: DirectoryCause::Status {
                status: 503,
                body: "loading\n".to_string(),
            },
        };
        assert_eq!(
            err.to_string(),
            "model directory at http://localhost:11434/api/tags returned 503: loading"
        );
        assert!(err.source().is_none());
        assert_eq!(
            err.user_notice(),
            "Failed to load models (server returned 503)."
        );
    }

    #[test]
    fn directory_decode_error_chains_source() {
        let decode_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err = DirectoryUnavailable {
            url: "http://localhost:11434/api/tags".to_string(),
            cause: DirectoryCause::Decode(decode_err),
        };
        assert!(err.source().is_some());
        assert!(err.to_string().contains("invalid body"));
    }
}
