use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::study::Resource;
use super::{check_status, endpoint, BackendError};

#[derive(Serialize)]
struct SummarizeRequest<'a> {
    #[serde(rename = "videoUrl")]
    video_url: &'a str,
}

#[derive(Deserialize)]
struct SummarizePayload {
    summary: Option<String>,
    video_id: Option<String>,
    resources: Option<Vec<Resource>>,
    error: Option<String>,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    video_id: &'a str,
    query: &'a str,
}

#[derive(Deserialize)]
struct ChatPayload {
    response: Option<String>,
    error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoSummary {
    pub summary: String,
    /// Needed for follow-up chat
    pub video_id: String,
    pub resources: Vec<Resource>,
}

/// Client for the video summarization service
#[derive(Clone)]
pub struct VideoClient {
    client: Client,
    base_url: String,
}

impl VideoClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.to_string(),
        }
    }

    pub async fn summarize(&self, video_url: &str) -> Result<VideoSummary, BackendError> {
        let video_url = video_url.trim();
        if video_url.is_empty() {
            return Err(BackendError::InvalidInput("Please enter a YouTube URL".to_string()));
        }
        debug!(%video_url, "summarizing video");

        let response = self
            .client
            .post(endpoint(&self.base_url, "summarize-youtube"))
            .json(&SummarizeRequest { video_url })
            .send()
            .await?;
        let response = check_status(response).await?;
        classify_summary(response.json().await?)
    }

    pub async fn chat(&self, video_id: &str, query: &str) -> Result<String, BackendError> {
        if video_id.is_empty() || query.trim().is_empty() {
            return Err(BackendError::InvalidInput(
                "Please enter a question and ensure a video is summarized".to_string(),
            ));
        }

        let response = self
            .client
            .post(endpoint(&self.base_url, "chat-youtube"))
            .json(&ChatRequest { video_id, query })
            .send()
            .await?;
        let response = check_status(response).await?;
        classify_chat(response.json().await?)
    }
}

fn classify_summary(payload: SummarizePayload) -> Result<VideoSummary, BackendError> {
    match payload.summary {
        Some(summary) if !summary.is_empty() => Ok(VideoSummary {
            summary,
            video_id: payload.video_id.unwrap_or_default(),
            resources: payload.resources.unwrap_or_default(),
        }),
        _ => Err(BackendError::Server(
            payload.error.unwrap_or_else(|| "No summary returned".to_string()),
        )),
    }
}

fn classify_chat(payload: ChatPayload) -> Result<String, BackendError> {
    match payload.response {
        Some(response) if !response.is_empty() => Ok(response),
        _ => Err(BackendError::Server(
            payload.error.unwrap_or_else(|| "No chat response".to_string()),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_payload() {
        let payload: SummarizePayload = serde_json::from_str(
            r#"{"summary":"A talk on graphs","video_id":"abc123","resources":[{"title":"Slides","url":"https://example.com/s"}]}"#,
        )
        .unwrap();
        let summary = classify_summary(payload).unwrap();
        assert_eq!(summary.video_id, "abc123");
        assert_eq!(summary.resources.len(), 1);
    }

    #[test]
    fn test_summary_missing() {
        let payload: SummarizePayload = serde_json::from_str(r#"{"error":"Invalid URL"}"#).unwrap();
        match classify_summary(payload) {
            Err(BackendError::Server(msg)) => assert_eq!(msg, "Invalid URL"),
            other => panic!("unexpected: {:?}", other),
        }

        let payload: SummarizePayload = serde_json::from_str("{}").unwrap();
        match classify_summary(payload) {
            Err(BackendError::Server(msg)) => assert_eq!(msg, "No summary returned"),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_chat_payload() {
        let payload: ChatPayload = serde_json::from_str(r#"{"response":"At 3:10 they define BFS"}"#).unwrap();
        assert_eq!(classify_chat(payload).unwrap(), "At 3:10 they define BFS");

        let payload: ChatPayload = serde_json::from_str("{}").unwrap();
        assert!(matches!(classify_chat(payload), Err(BackendError::Server(_))));
    }

    #[test]
    fn test_request_shapes() {
        let body = serde_json::to_value(SummarizeRequest { video_url: "https://youtu.be/x" }).unwrap();
        assert_eq!(body["videoUrl"], "https://youtu.be/x");

        let body = serde_json::to_value(ChatRequest { video_id: "x", query: "q" }).unwrap();
        assert_eq!(body["video_id"], "x");
        assert_eq!(body["query"], "q");
    }

    #[tokio::test]
    async fn test_chat_requires_summarized_video() {
        let client = VideoClient::new("http://127.0.0.1:9");
        assert!(matches!(
            client.chat("", "what is this about?").await,
            Err(BackendError::InvalidInput(_))
        ));
        assert!(matches!(client.chat("abc", "  ").await, Err(BackendError::InvalidInput(_))));
        assert!(matches!(client.summarize(" ").await, Err(BackendError::InvalidInput(_))));
    }
}
