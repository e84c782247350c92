// src/ai/error.rs
use std::time::Duration;
use thiserror::Error;

/// Every way a remote call can fail. Each adapter call yields at most one of these.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AiError {
    /// Network, auth, quota, or any non-success HTTP answer.
    #[error("Remote call failed: {0}")]
    RemoteCall(String),

    /// The analyzer answered, but not in the shape we asked for.
    #[error("Unexpected response from the model: {0}")]
    Schema(String),

    /// The video job finished without a usable video.
    #[error("Video generation failed: {0}")]
    GenerationFailed(String),

    #[error("Video generation did not finish within {}s", .0.as_secs())]
    TimedOut(Duration),

    /// The run was reset while this call was outstanding.
    #[error("Run was cancelled")]
    Cancelled,
}

impl From<reqwest::Error> for AiError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            AiError::RemoteCall(format!("request timed out: {}", e))
        } else {
            AiError::RemoteCall(e.to_string())
        }
    }
}

/// Turn a non-success HTTP answer into a `RemoteCall` error, preferring the
/// message from a Google-style `{"error": {...}}` body when there is one.
pub(crate) fn remote_error(status: reqwest::StatusCode, body: &str) -> AiError {
    let detail = serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v["error"]["message"].as_str().map(str::to_string))
        .unwrap_or_else(|| body.trim().to_string());

    AiError::RemoteCall(format!("HTTP {}: {}", status, detail))
}
