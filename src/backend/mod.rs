pub mod study;
pub mod video;

pub use study::{Exam, Resource, Stats, StudyClient, StudyQuery, StudyResponse, Style};
pub use video::{VideoClient, VideoSummary};

use thiserror::Error;

/// Message the study backend sends once its own per-user limit is hit
pub const CHAT_LIMIT_MESSAGE: &str = "Chat limit reached. Upgrade to Pro for unlimited chats!";

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Server error: {status} - {body}")]
    Status { status: u16, body: String },
    #[error("Chat limit reached. Upgrade to Pro for unlimited chats!")]
    ChatLimitReached,
    #[error("{0}")]
    Server(String),
    #[error("{0}")]
    InvalidInput(String),
}

/// Turn a non-2xx response into `BackendError::Status`
async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, BackendError> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    Err(BackendError::Status { status, body })
}

fn endpoint(base_url: &str, path: &str) -> String {
    format!("{}/{}", base_url.trim_end_matches('/'), path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_joins_cleanly() {
        assert_eq!(endpoint("http://localhost:5001", "stats"), "http://localhost:5001/stats");
        assert_eq!(endpoint("http://localhost:5001/", "stats"), "http://localhost:5001/stats");
    }

    #[test]
    fn test_error_messages() {
        let err = BackendError::Status { status: 500, body: "boom".to_string() };
        assert_eq!(err.to_string(), "Server error: 500 - boom");
        assert_eq!(BackendError::ChatLimitReached.to_string(), CHAT_LIMIT_MESSAGE);
    }
}
