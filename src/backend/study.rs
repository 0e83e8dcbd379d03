use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, info};

use super::{check_status, endpoint, BackendError, CHAT_LIMIT_MESSAGE};
use crate::session::Mode;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exam {
    Upsc,
    Gate,
    Rrb,
}

impl Exam {
    pub fn as_str(&self) -> &'static str {
        match self {
            Exam::Upsc => "upsc",
            Exam::Gate => "gate",
            Exam::Rrb => "rrb",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "upsc" => Some(Exam::Upsc),
            "gate" => Some(Exam::Gate),
            "rrb" => Some(Exam::Rrb),
            _ => None,
        }
    }

    pub fn all() -> Vec<Exam> {
        vec![Exam::Upsc, Exam::Gate, Exam::Rrb]
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Exam::Upsc => "UPSC",
            Exam::Gate => "GATE",
            Exam::Rrb => "RRB",
        }
    }
}

/// Explanation style for solve mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Style {
    SmartQuick,
    StepByStep,
    TeacherMode,
    ResearchStyle,
}

impl Style {
    pub fn from_str(s: &str) -> Option<Self> {
        Self::all()
            .into_iter()
            .find(|style| style.display_name().eq_ignore_ascii_case(s.trim()))
    }

    pub fn all() -> Vec<Style> {
        vec![
            Style::SmartQuick,
            Style::StepByStep,
            Style::TeacherMode,
            Style::ResearchStyle,
        ]
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Style::SmartQuick => "Smart & Quick",
            Style::StepByStep => "Step-by-Step",
            Style::TeacherMode => "Teacher Mode",
            Style::ResearchStyle => "Research Style",
        }
    }
}

/// What the user typed plus the knobs that shape the answer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StudyQuery {
    pub text: String,
    pub solve: bool,
    pub exam: Option<Exam>,
    pub style: Option<Style>,
}

impl StudyQuery {
    pub fn explain(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            solve: false,
            exam: None,
            style: None,
        }
    }

    pub fn solve(text: impl Into<String>, exam: Option<Exam>, style: Option<Style>) -> Self {
        Self {
            text: text.into(),
            solve: true,
            exam,
            style,
        }
    }

    /// Mode as it is recorded in the trial history
    pub fn mode(&self) -> Mode {
        if self.solve {
            Mode::Solve {
                style: self.style.map(|s| s.display_name().to_string()),
            }
        } else {
            Mode::Explain
        }
    }

    /// Endpoint path and JSON body. Exam and style only travel in solve mode.
    pub fn request(&self, user_id: &str) -> (&'static str, Value) {
        if self.solve {
            (
                "solve",
                json!({
                    "user_id": user_id,
                    "problem": self.text,
                    "exam": self.exam.map(|e| e.as_str()),
                    "explanation_style": self.style.map(|s| s.display_name().to_lowercase()),
                }),
            )
        } else {
            (
                "explain",
                json!({
                    "user_id": user_id,
                    "topic": self.text,
                    "exam": Value::Null,
                    "explanation_style": Value::Null,
                }),
            )
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resource {
    pub title: String,
    pub url: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StudyResponse {
    pub notes: String,
    pub flashcards: Vec<String>,
    pub resources: Vec<Resource>,
}

impl StudyResponse {
    /// Flashcards arrive as "question - answer"
    pub fn flashcard_pairs(&self) -> Vec<(String, String)> {
        self.flashcards.iter().map(|card| split_flashcard(card)).collect()
    }
}

#[derive(Deserialize)]
struct StudyPayload {
    notes: Option<String>,
    flashcards: Option<Vec<String>>,
    resources: Option<Vec<Resource>>,
    error: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Stats {
    pub active_users: u64,
    pub questions_solved: u64,
    pub explanations_given: u64,
}

#[derive(Serialize)]
struct FeedbackRequest<'a> {
    user_id: &'a str,
    feedback: &'a str,
}

#[derive(Clone)]
pub struct StudyClient {
    client: Client,
    base_url: String,
}

impl StudyClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.to_string(),
        }
    }

    pub async fn submit(&self, user_id: &str, query: &StudyQuery) -> Result<StudyResponse, BackendError> {
        let (path, body) = query.request(user_id);
        let url = endpoint(&self.base_url, path);
        debug!(%url, solve = query.solve, "submitting study query");

        let response = self.client.post(&url).json(&body).send().await?;
        let response = check_status(response).await?;

        let payload: StudyPayload = response.json().await?;
        let result = classify(payload);
        if let Ok(ref answer) = result {
            info!(
                flashcards = answer.flashcards.len(),
                resources = answer.resources.len(),
                "study answer received"
            );
        }
        result
    }

    pub async fn feedback(&self, user_id: &str, feedback: &str) -> Result<(), BackendError> {
        if feedback.trim().is_empty() {
            return Err(BackendError::InvalidInput("Please enter feedback".to_string()));
        }

        let response = self
            .client
            .post(endpoint(&self.base_url, "feedback"))
            .json(&FeedbackRequest { user_id, feedback })
            .send()
            .await?;
        check_status(response).await?;
        Ok(())
    }

    pub async fn stats(&self) -> Result<Stats, BackendError> {
        let response = self.client.get(endpoint(&self.base_url, "stats")).send().await?;
        let response = check_status(response).await?;
        Ok(response.json().await?)
    }
}

fn classify(payload: StudyPayload) -> Result<StudyResponse, BackendError> {
    match payload.notes {
        Some(notes) if !notes.is_empty() => Ok(StudyResponse {
            notes,
            flashcards: payload.flashcards.unwrap_or_default(),
            resources: payload.resources.unwrap_or_default(),
        }),
        _ => match payload.error {
            Some(error) if error == CHAT_LIMIT_MESSAGE => Err(BackendError::ChatLimitReached),
            Some(error) if !error.is_empty() => Err(BackendError::Server(error)),
            _ => Err(BackendError::Server("No response from server".to_string())),
        },
    }
}

fn split_flashcard(card: &str) -> (String, String) {
    match card.split_once(" - ") {
        Some((question, answer)) => (question.trim().to_string(), answer.trim().to_string()),
        None => (card.trim().to_string(), "No answer provided".to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload(raw: &str) -> StudyPayload {
        serde_json::from_str(raw).unwrap()
    }

    #[test]
    fn test_explain_request_body() {
        let (path, body) = StudyQuery::explain("How does the internet work?").request("uid-1");
        assert_eq!(path, "explain");
        assert_eq!(body["user_id"], "uid-1");
        assert_eq!(body["topic"], "How does the internet work?");
        assert!(body["exam"].is_null());
        assert!(body["explanation_style"].is_null());
        assert!(body.get("problem").is_none());
    }

    #[test]
    fn test_solve_request_body() {
        let query = StudyQuery::solve("Solve 2x + 3 = 7", Some(Exam::Gate), Some(Style::StepByStep));
        let (path, body) = query.request("anonymous");
        assert_eq!(path, "solve");
        assert_eq!(body["problem"], "Solve 2x + 3 = 7");
        assert_eq!(body["exam"], "gate");
        assert_eq!(body["explanation_style"], "step-by-step");
    }

    #[test]
    fn test_solve_without_selection_sends_nulls() {
        let (_, body) = StudyQuery::solve("x", None, None).request("anonymous");
        assert!(body["exam"].is_null());
        assert!(body["explanation_style"].is_null());
    }

    #[test]
    fn test_query_mode() {
        assert_eq!(StudyQuery::explain("t").mode(), Mode::Explain);
        assert_eq!(
            StudyQuery::solve("p", None, Some(Style::TeacherMode)).mode(),
            Mode::Solve { style: Some("Teacher Mode".to_string()) }
        );
    }

    #[test]
    fn test_classify_success() {
        let answer = classify(payload(
            r#"{"notes":"**Key idea**","flashcards":["Q1 - A1"],"resources":[{"title":"Docs","url":"https://example.com"}]}"#,
        ))
        .unwrap();
        assert_eq!(answer.notes, "**Key idea**");
        assert_eq!(answer.flashcard_pairs(), vec![("Q1".to_string(), "A1".to_string())]);
        assert_eq!(answer.resources[0].title, "Docs");
    }

    #[test]
    fn test_classify_missing_optional_fields() {
        let answer = classify(payload(r#"{"notes":"n"}"#)).unwrap();
        assert!(answer.flashcards.is_empty());
        assert!(answer.resources.is_empty());
    }

    #[test]
    fn test_classify_chat_limit() {
        let raw = format!(r#"{{"error":"{}"}}"#, CHAT_LIMIT_MESSAGE);
        assert!(matches!(classify(payload(&raw)), Err(BackendError::ChatLimitReached)));
    }

    #[test]
    fn test_classify_server_error() {
        match classify(payload(r#"{"error":"model offline"}"#)) {
            Err(BackendError::Server(msg)) => assert_eq!(msg, "model offline"),
            other => panic!("unexpected: {:?}", other),
        }
        match classify(payload(r#"{"notes":""}"#)) {
            Err(BackendError::Server(msg)) => assert_eq!(msg, "No response from server"),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_split_flashcard_without_separator() {
        assert_eq!(
            split_flashcard("Just a fact"),
            ("Just a fact".to_string(), "No answer provided".to_string())
        );
    }

    #[test]
    fn test_stats_defaults_missing_fields() {
        let stats: Stats = serde_json::from_str(r#"{"active_users":12}"#).unwrap();
        assert_eq!(stats.active_users, 12);
        assert_eq!(stats.questions_solved, 0);
    }

    #[test]
    fn test_exam_and_style_lookup() {
        assert_eq!(Exam::from_str("UPSC"), Some(Exam::Upsc));
        assert_eq!(Exam::from_str("neet"), None);
        assert_eq!(Style::from_str("step-by-step"), Some(Style::StepByStep));
        assert_eq!(Style::from_str("Smart & Quick"), Some(Style::SmartQuick));
    }

    #[tokio::test]
    async fn test_empty_feedback_rejected_locally() {
        let client = StudyClient::new("http://127.0.0.1:9");
        let err = client.feedback("anonymous", "   ").await.unwrap_err();
        assert!(matches!(err, BackendError::InvalidInput(_)));
    }
}
