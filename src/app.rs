use std::time::{Duration, Instant};

use ratatui::widgets::ListState;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use vikal::backend::{
    BackendError, Exam, Stats, StudyClient, StudyQuery, StudyResponse, Style, VideoClient, VideoSummary,
};
use vikal::session::{Persistence, TermsGate, TrialSessionStore};
use vikal::Config;

/// How often live stats are refreshed
const STATS_INTERVAL: Duration = Duration::from_secs(10);
/// Notifications live for this many ticks (~3s)
const NOTIFICATION_TICKS: u8 = 10;

type Task<T> = Option<JoinHandle<Result<T, BackendError>>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Screen {
    SignIn,
    Dashboard,
    Video,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputMode {
    Normal,
    Editing,
}

/// Which text box keystrokes go to while editing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    SignIn,
    Query,
    Feedback,
    VideoUrl,
    VideoChat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Picker {
    Exam,
    Style,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Info,
    Success,
    Warning,
    Error,
}

#[derive(Debug, Clone)]
pub struct Notification {
    pub level: Level,
    pub message: String,
    ticks_left: u8,
}

/// Single-line text input with a char-based cursor
#[derive(Debug, Clone, Default)]
pub struct TextInput {
    pub value: String,
    pub cursor: usize,
}

/// Convert a character index to a byte index for UTF-8 safe string operations
fn char_to_byte_index(s: &str, char_idx: usize) -> usize {
    s.char_indices()
        .nth(char_idx)
        .map(|(i, _)| i)
        .unwrap_or(s.len())
}

impl TextInput {
    pub fn insert(&mut self, c: char) {
        let byte_pos = char_to_byte_index(&self.value, self.cursor);
        self.value.insert(byte_pos, c);
        self.cursor += 1;
    }

    pub fn backspace(&mut self) {
        if self.cursor > 0 {
            self.cursor -= 1;
            let byte_pos = char_to_byte_index(&self.value, self.cursor);
            self.value.remove(byte_pos);
        }
    }

    pub fn delete(&mut self) {
        if self.cursor < self.value.chars().count() {
            let byte_pos = char_to_byte_index(&self.value, self.cursor);
            self.value.remove(byte_pos);
        }
    }

    pub fn left(&mut self) {
        self.cursor = self.cursor.saturating_sub(1);
    }

    pub fn right(&mut self) {
        self.cursor = (self.cursor + 1).min(self.value.chars().count());
    }

    pub fn home(&mut self) {
        self.cursor = 0;
    }

    pub fn end(&mut self) {
        self.cursor = self.value.chars().count();
    }

    /// Trimmed contents, leaving the input empty
    pub fn take(&mut self) -> String {
        self.cursor = 0;
        std::mem::take(&mut self.value).trim().to_string()
    }

    pub fn is_blank(&self) -> bool {
        self.value.trim().is_empty()
    }
}

pub struct App {
    // Core state
    pub should_quit: bool,
    pub screen: Screen,
    pub input_mode: InputMode,
    pub field: Field,

    // Collaborators
    pub config: Config,
    pub session: TrialSessionStore,
    pub study: StudyClient,
    pub video: VideoClient,
    pub user_id: Option<String>,

    // Dashboard
    pub sign_in_input: TextInput,
    pub query_input: TextInput,
    pub feedback_input: TextInput,
    pub solve_mode: bool,
    pub selected_exam: Option<Exam>,
    pub selected_style: Option<Style>,
    pub answer: Option<StudyResponse>,
    pub answer_scroll: u16,
    pub pending_query: Option<StudyQuery>,
    pub query_task: Task<StudyResponse>,
    pub feedback_task: Task<()>,
    pub stats: Stats,
    pub stats_task: Task<Stats>,
    pub last_stats_refresh: Option<Instant>,

    // Popups
    pub show_trial_end: bool,
    pub show_pro_modal: bool,
    pub picker: Option<Picker>,
    pub picker_state: ListState,

    // Video summarization
    pub video_url_input: TextInput,
    pub video_chat_input: TextInput,
    pub video_summary: Option<VideoSummary>,
    pub video_chat_response: Option<String>,
    pub summarize_task: Task<VideoSummary>,
    pub video_chat_task: Task<String>,

    pub notifications: Vec<Notification>,
    pub animation_frame: u8,
}

impl App {
    pub fn new(config: Config, session: TrialSessionStore) -> Self {
        let study = StudyClient::new(&config.api_url);
        let video = VideoClient::new(&config.video_api_url);
        let user_id = config.user_id.clone();

        let mut app = Self {
            should_quit: false,
            screen: Screen::SignIn,
            input_mode: InputMode::Editing,
            field: Field::SignIn,
            config,
            session,
            study,
            video,
            user_id: None,
            sign_in_input: TextInput::default(),
            query_input: TextInput::default(),
            feedback_input: TextInput::default(),
            solve_mode: false,
            selected_exam: None,
            selected_style: None,
            answer: None,
            answer_scroll: 0,
            pending_query: None,
            query_task: None,
            feedback_task: None,
            stats: Stats::default(),
            stats_task: None,
            last_stats_refresh: None,
            show_trial_end: false,
            show_pro_modal: false,
            picker: None,
            picker_state: ListState::default(),
            video_url_input: TextInput::default(),
            video_chat_input: TextInput::default(),
            video_summary: None,
            video_chat_response: None,
            summarize_task: None,
            video_chat_task: None,
            notifications: Vec::new(),
            animation_frame: 0,
        };

        if let Persistence::MemoryOnly { reason } = app.session.persistence().clone() {
            app.notify(Level::Warning, format!("Chats will not be saved: {}", reason));
        }
        if let Some(user_id) = user_id {
            app.enter_dashboard(user_id);
        }
        app
    }

    pub fn is_signed_in(&self) -> bool {
        self.user_id.is_some()
    }

    pub fn user_id(&self) -> &str {
        self.user_id.as_deref().unwrap_or(vikal::config::ANONYMOUS_USER)
    }

    /// Terms modal is up: nothing but accept and quit gets through
    pub fn terms_blocking(&self) -> bool {
        self.is_signed_in() && self.session.state().terms_gate() == TermsGate::Unaccepted
    }

    pub fn query_loading(&self) -> bool {
        self.query_task.is_some()
    }

    pub fn notify(&mut self, level: Level, message: impl Into<String>) {
        self.notifications.push(Notification {
            level,
            message: message.into(),
            ticks_left: NOTIFICATION_TICKS,
        });
    }

    pub fn tick(&mut self) {
        self.animation_frame = (self.animation_frame + 1) % 3;
        for n in &mut self.notifications {
            n.ticks_left = n.ticks_left.saturating_sub(1);
        }
        self.notifications.retain(|n| n.ticks_left > 0);

        let due = self
            .last_stats_refresh
            .map_or(true, |at| at.elapsed() >= STATS_INTERVAL);
        if self.is_signed_in() && due {
            self.refresh_stats();
        }
    }

    fn enter_dashboard(&mut self, user_id: String) {
        info!(%user_id, "signed in");
        self.user_id = Some(user_id);
        self.screen = Screen::Dashboard;
        self.input_mode = InputMode::Normal;
        self.show_trial_end = self.session.take_trial_notice();
        self.refresh_stats();
    }

    // ---------------------------------------------------------------
    // Identity
    // ---------------------------------------------------------------

    pub fn sign_in(&mut self) {
        let user_id = self.sign_in_input.take();
        if user_id.is_empty() {
            self.notify(Level::Warning, "Please enter a user id");
            return;
        }
        if let Err(e) = Config::save_user_id(Some(&user_id)) {
            warn!(error = %e, "could not remember user");
        }
        self.enter_dashboard(user_id);
        self.notify(Level::Success, "Signed in!");
    }

    pub fn sign_out(&mut self) {
        self.session.clear();
        if let Err(e) = Config::save_user_id(None) {
            warn!(error = %e, "could not forget user");
        }
        info!("signed out");

        // Dropping the handles abandons in-flight work; late results are discarded
        self.query_task = None;
        self.feedback_task = None;
        self.stats_task = None;
        self.summarize_task = None;
        self.video_chat_task = None;

        self.user_id = None;
        self.pending_query = None;
        self.answer = None;
        self.answer_scroll = 0;
        self.query_input = TextInput::default();
        self.feedback_input = TextInput::default();
        self.video_summary = None;
        self.video_chat_response = None;
        self.show_trial_end = false;
        self.show_pro_modal = false;
        self.picker = None;
        self.last_stats_refresh = None;

        self.screen = Screen::SignIn;
        self.input_mode = InputMode::Editing;
        self.field = Field::SignIn;
        self.notify(Level::Success, "Signed out!");
    }

    pub fn accept_terms(&mut self) {
        self.session.accept_terms();
    }

    pub fn upgrade(&mut self) {
        // No payment confirmation ever comes back; the flag is set optimistically
        self.session.upgrade_to_pro();
        info!(link = %self.config.payment_link, "upgrade requested");
        let link = self.config.payment_link.clone();
        self.notify(Level::Info, format!("Complete payment at {}", link));
        self.show_pro_modal = false;
        self.show_trial_end = false;
    }

    // ---------------------------------------------------------------
    // Study queries
    // ---------------------------------------------------------------

    pub fn toggle_mode(&mut self) {
        self.solve_mode = !self.solve_mode;
    }

    pub fn build_query(&self, text: String) -> StudyQuery {
        if self.solve_mode {
            StudyQuery::solve(text, self.selected_exam, self.selected_style)
        } else {
            StudyQuery::explain(text)
        }
    }

    pub fn submit_query(&mut self) {
        if self.query_task.is_some() || self.query_input.is_blank() {
            return;
        }
        if !self.session.can_submit() {
            self.show_pro_modal = true;
            return;
        }

        let text = self.query_input.take();
        let query = self.build_query(text);
        self.answer = None;
        self.answer_scroll = 0;

        let client = self.study.clone();
        let user_id = self.user_id().to_string();
        let task_query = query.clone();
        self.query_task = Some(tokio::spawn(async move {
            client.submit(&user_id, &task_query).await
        }));
        self.pending_query = Some(query);
    }

    fn finish_query(&mut self, result: Result<StudyResponse, BackendError>) {
        let query = self.pending_query.take();
        match result {
            Ok(answer) => {
                if let Some(query) = query {
                    self.session
                        .record_interaction(query.text.clone(), answer.notes.clone(), query.mode());
                }
                self.answer = Some(answer);
                self.refresh_stats();
            }
            Err(BackendError::ChatLimitReached) => {
                self.show_pro_modal = true;
            }
            Err(e) => {
                warn!(error = %e, "study query failed");
                self.notify(Level::Error, e.to_string());
            }
        }
    }

    pub fn submit_feedback(&mut self) {
        if self.feedback_task.is_some() {
            return;
        }
        if self.feedback_input.is_blank() {
            self.notify(Level::Warning, "Please enter feedback");
            return;
        }
        let feedback = self.feedback_input.take();
        let client = self.study.clone();
        let user_id = self.user_id().to_string();
        self.feedback_task = Some(tokio::spawn(async move {
            client.feedback(&user_id, &feedback).await
        }));
    }

    pub fn refresh_stats(&mut self) {
        self.last_stats_refresh = Some(Instant::now());
        if self.stats_task.is_some() {
            return;
        }
        let client = self.study.clone();
        self.stats_task = Some(tokio::spawn(async move { client.stats().await }));
    }

    pub fn scroll_down(&mut self) {
        self.answer_scroll = self.answer_scroll.saturating_add(1);
    }

    pub fn scroll_up(&mut self) {
        self.answer_scroll = self.answer_scroll.saturating_sub(1);
    }

    // ---------------------------------------------------------------
    // Pickers
    // ---------------------------------------------------------------

    pub fn open_picker(&mut self, picker: Picker) {
        let selected = match picker {
            Picker::Exam => self
                .selected_exam
                .and_then(|e| Exam::all().iter().position(|x| *x == e)),
            Picker::Style => self
                .selected_style
                .and_then(|s| Style::all().iter().position(|x| *x == s)),
        };
        self.picker_state.select(Some(selected.unwrap_or(0)));
        self.picker = Some(picker);
    }

    pub fn picker_len(&self) -> usize {
        match self.picker {
            Some(Picker::Exam) => Exam::all().len(),
            Some(Picker::Style) => Style::all().len(),
            None => 0,
        }
    }

    pub fn picker_nav_down(&mut self) {
        let len = self.picker_len();
        if len > 0 {
            let i = self.picker_state.selected().map_or(0, |i| (i + 1) % len);
            self.picker_state.select(Some(i));
        }
    }

    pub fn picker_nav_up(&mut self) {
        let len = self.picker_len();
        if len > 0 {
            let i = self
                .picker_state
                .selected()
                .map_or(0, |i| if i == 0 { len - 1 } else { i - 1 });
            self.picker_state.select(Some(i));
        }
    }

    pub fn picker_select(&mut self) {
        let idx = self.picker_state.selected().unwrap_or(0);
        match self.picker {
            Some(Picker::Exam) => self.selected_exam = Exam::all().get(idx).copied(),
            Some(Picker::Style) => self.selected_style = Style::all().get(idx).copied(),
            None => {}
        }
        self.picker = None;
    }

    // ---------------------------------------------------------------
    // Video summarization
    // ---------------------------------------------------------------

    pub fn summarize_video(&mut self) {
        if self.summarize_task.is_some() {
            return;
        }
        let url = self.video_url_input.value.trim().to_string();
        let client = self.video.clone();
        self.video_summary = None;
        self.video_chat_response = None;
        self.summarize_task = Some(tokio::spawn(async move { client.summarize(&url).await }));
    }

    pub fn chat_with_video(&mut self) {
        if self.video_chat_task.is_some() {
            return;
        }
        let video_id = self
            .video_summary
            .as_ref()
            .map(|s| s.video_id.clone())
            .unwrap_or_default();
        let query = self.video_chat_input.value.trim().to_string();
        let client = self.video.clone();
        self.video_chat_task = Some(tokio::spawn(async move { client.chat(&video_id, &query).await }));
    }

    // ---------------------------------------------------------------
    // Background task completion
    // ---------------------------------------------------------------

    /// Collect results of any finished background tasks
    pub async fn poll_tasks(&mut self) {
        if let Some(result) = take_finished(&mut self.query_task).await {
            self.finish_query(result);
        }

        if let Some(result) = take_finished(&mut self.stats_task).await {
            match result {
                Ok(stats) => self.stats = stats,
                Err(e) => warn!(error = %e, "failed to fetch stats"),
            }
        }

        if let Some(result) = take_finished(&mut self.feedback_task).await {
            match result {
                Ok(()) => self.notify(Level::Success, "Thanks for your feedback!"),
                Err(e) => {
                    warn!(error = %e, "feedback failed");
                    self.notify(Level::Error, "Failed to submit feedback");
                }
            }
        }

        if let Some(result) = take_finished(&mut self.summarize_task).await {
            match result {
                Ok(summary) => self.video_summary = Some(summary),
                Err(e) => self.notify(Level::Error, e.to_string()),
            }
        }

        if let Some(result) = take_finished(&mut self.video_chat_task).await {
            match result {
                Ok(response) => {
                    self.video_chat_input = TextInput::default();
                    self.video_chat_response = Some(response);
                }
                Err(e) => self.notify(Level::Error, format!("Chat Error: {}", e)),
            }
        }
    }
}

/// Await a task only once it has finished, leaving running tasks in place
async fn take_finished<T>(slot: &mut Task<T>) -> Option<Result<T, BackendError>> {
    if !slot.as_ref().is_some_and(|handle| handle.is_finished()) {
        return None;
    }
    let handle = slot.take()?;
    match handle.await {
        Ok(result) => Some(result),
        Err(e) => Some(Err(BackendError::Server(format!("background task failed: {}", e)))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vikal::storage::MemoryStore;

    fn test_app() -> App {
        let mut config = Config::new();
        config.api_url = "http://127.0.0.1:9".to_string();
        config.video_api_url = "http://127.0.0.1:9".to_string();
        App::new(config, TrialSessionStore::load(Box::new(MemoryStore::new())))
    }

    #[test]
    fn test_text_input_utf8_editing() {
        let mut input = TextInput::default();
        for c in "héllo".chars() {
            input.insert(c);
        }
        input.left();
        input.backspace();
        assert_eq!(input.value, "hélo");
        assert_eq!(input.cursor, 3);

        input.end();
        input.insert('!');
        input.home();
        input.delete();
        assert_eq!(input.value, "élo!");
        assert_eq!(input.cursor, 0);

        assert_eq!(input.take(), "élo!");
        assert!(input.is_blank());
    }

    #[test]
    fn test_starts_signed_out_without_user() {
        let app = test_app();
        assert_eq!(app.screen, Screen::SignIn);
        assert!(!app.terms_blocking());
    }

    #[tokio::test]
    async fn test_terms_block_after_sign_in() {
        let mut app = test_app();
        app.enter_dashboard("uid".to_string());
        assert!(app.terms_blocking());
        app.accept_terms();
        assert!(!app.terms_blocking());
    }

    #[tokio::test]
    async fn test_exhausted_trial_opens_pro_modal_instead_of_submitting() {
        let mut app = test_app();
        app.enter_dashboard("uid".to_string());
        for _ in 0..3 {
            app.session.record_interaction("q", "a", vikal::Mode::Explain);
        }
        app.query_input.value = "What is entropy?".to_string();
        app.submit_query();
        assert!(app.show_pro_modal);
        assert!(app.query_task.is_none());
        assert_eq!(app.query_input.value, "What is entropy?");
    }

    #[tokio::test]
    async fn test_failed_query_does_not_consume_quota() {
        let mut app = test_app();
        app.pending_query = Some(StudyQuery::explain("q"));
        app.finish_query(Err(BackendError::Status { status: 500, body: String::new() }));
        assert!(app.session.state().history.is_empty());
        assert_eq!(app.notifications.last().map(|n| n.level), Some(Level::Error));

        app.pending_query = Some(StudyQuery::explain("q"));
        app.finish_query(Err(BackendError::ChatLimitReached));
        assert!(app.show_pro_modal);
        assert!(app.session.state().history.is_empty());
    }

    #[tokio::test]
    async fn test_successful_query_is_recorded() {
        let mut app = test_app();
        app.pending_query = Some(StudyQuery::solve("2x = 4", Some(Exam::Gate), Some(Style::StepByStep)));
        app.finish_query(Ok(StudyResponse {
            notes: "x = 2".to_string(),
            ..Default::default()
        }));
        let history = &app.session.state().history;
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].question, "2x = 4");
        assert_eq!(history[0].mode.label(), "Step-by-Step");
        assert!(app.answer.is_some());
    }

    #[tokio::test]
    async fn test_upgrade_sets_pro_optimistically() {
        let mut app = test_app();
        app.show_pro_modal = true;
        app.upgrade();
        assert!(app.session.state().is_pro_user);
        assert!(!app.show_pro_modal);
    }

    #[test]
    fn test_picker_wraps_and_selects() {
        let mut app = test_app();
        app.open_picker(Picker::Style);
        app.picker_nav_up();
        app.picker_select();
        assert_eq!(app.selected_style, Some(Style::ResearchStyle));
        assert!(app.picker.is_none());
    }

    #[test]
    fn test_notifications_expire() {
        let mut app = test_app();
        app.notify(Level::Info, "hello");
        for _ in 0..NOTIFICATION_TICKS {
            app.tick();
        }
        assert!(app.notifications.is_empty());
    }
}
