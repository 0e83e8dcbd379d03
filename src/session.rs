//! Trial session bookkeeping
//!
//! `TrialSessionStore` is the single owner of the free-trial history, the pro
//! flag and the terms flag. It reads them once in [`TrialSessionStore::load`]
//! and writes through on every mutation. Storage trouble never reaches the
//! caller: the store drops to memory-only mode and reports it through
//! [`TrialSessionStore::persistence`].

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::storage::{KeyValueStore, MemoryStore};

/// Free interactions allowed before the upgrade prompt
pub const TRIAL_QUOTA: usize = 3;

pub const HISTORY_KEY: &str = "vikalChats";
pub const PRO_KEY: &str = "vikalPro";
pub const TERMS_KEY: &str = "termsAccepted";

/// Which query style produced an interaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum Mode {
    Explain,
    Solve {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        style: Option<String>,
    },
}

impl Mode {
    pub fn label(&self) -> &str {
        match self {
            Mode::Explain => "generic",
            Mode::Solve { style: Some(style) } => style,
            Mode::Solve { style: None } => "solve",
        }
    }
}

/// One completed question/response cycle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InteractionRecord {
    pub id: String,
    pub question: String,
    pub response: String,
    #[serde(flatten)]
    pub mode: Mode,
    /// Epoch milliseconds
    pub created_at: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TermsGate {
    Unaccepted,
    Accepted,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionState {
    /// Newest first, at most `TRIAL_QUOTA` entries
    pub history: Vec<InteractionRecord>,
    pub is_pro_user: bool,
    pub terms_accepted: bool,
}

impl SessionState {
    pub fn can_submit(&self) -> bool {
        self.is_pro_user || self.history.len() < TRIAL_QUOTA
    }

    /// Derived on every call, never persisted
    pub fn trial_exhausted(&self) -> bool {
        !self.can_submit()
    }

    /// `None` for pro users
    pub fn chats_left(&self) -> Option<usize> {
        if self.is_pro_user {
            None
        } else {
            Some(TRIAL_QUOTA.saturating_sub(self.history.len()))
        }
    }

    pub fn terms_gate(&self) -> TermsGate {
        if self.terms_accepted {
            TermsGate::Accepted
        } else {
            TermsGate::Unaccepted
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Persistence {
    Durable,
    MemoryOnly { reason: String },
}

pub struct TrialSessionStore {
    storage: Box<dyn KeyValueStore>,
    state: SessionState,
    persistence: Persistence,
    trial_notice: bool,
}

impl TrialSessionStore {
    /// Rehydrate from storage. Missing, unreadable or malformed values all
    /// fall back to the empty default.
    pub fn load(storage: Box<dyn KeyValueStore>) -> Self {
        let mut store = Self {
            storage,
            state: SessionState::default(),
            persistence: Persistence::Durable,
            trial_notice: false,
        };

        let history = store.read(HISTORY_KEY).map(|raw| parse_history(&raw)).unwrap_or_default();
        let is_pro_user = store.read(PRO_KEY).map(|v| is_truthy(&v)).unwrap_or(false);
        let terms_accepted = store.read(TERMS_KEY).map(|v| v == "true").unwrap_or(false);

        store.state = SessionState {
            history,
            is_pro_user,
            terms_accepted,
        };
        store.trial_notice = store.state.trial_exhausted();

        debug!(
            history = store.state.history.len(),
            pro = store.state.is_pro_user,
            terms = store.state.terms_accepted,
            "loaded trial session"
        );
        store
    }

    /// Store for when no storage could be opened at all
    pub fn unavailable(reason: String) -> Self {
        Self {
            storage: Box::new(MemoryStore::new()),
            state: SessionState::default(),
            persistence: Persistence::MemoryOnly { reason },
            trial_notice: false,
        }
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn persistence(&self) -> &Persistence {
        &self.persistence
    }

    pub fn can_submit(&self) -> bool {
        self.state.can_submit()
    }

    /// The "trial ended" notice fires at most once per load
    pub fn take_trial_notice(&mut self) -> bool {
        std::mem::take(&mut self.trial_notice)
    }

    /// Log a successful backend answer. Callers must not invoke this for
    /// failed or abandoned requests.
    pub fn record_interaction(
        &mut self,
        question: impl Into<String>,
        response: impl Into<String>,
        mode: Mode,
    ) -> &SessionState {
        let now = Utc::now().timestamp_millis();
        let record = InteractionRecord {
            id: next_id(&self.state.history, now),
            question: question.into(),
            response: response.into(),
            mode,
            created_at: now,
        };

        self.state.history.insert(0, record);
        self.state.history.truncate(TRIAL_QUOTA);

        match serde_json::to_string(&self.state.history) {
            Ok(json) => self.write(HISTORY_KEY, &json),
            Err(e) => self.degrade(format!("could not serialize history: {}", e)),
        }
        &self.state
    }

    pub fn accept_terms(&mut self) -> &SessionState {
        self.state.terms_accepted = true;
        self.write(TERMS_KEY, "true");
        &self.state
    }

    /// Sets the pro flag without any payment verification. The payment
    /// provider never calls back into the client.
    pub fn upgrade_to_pro(&mut self) -> &SessionState {
        self.state.is_pro_user = true;
        self.write(PRO_KEY, "true");
        &self.state
    }

    /// Sign-out: drop everything so nothing leaks to the next user. Removal
    /// is attempted even in memory-only mode; a store that rejects writes may
    /// still hold the previous user's values.
    pub fn clear(&mut self) -> &SessionState {
        for key in [HISTORY_KEY, PRO_KEY, TERMS_KEY] {
            if let Err(e) = self.storage.remove(key) {
                warn!(key, error = %e, "could not remove session key");
                if !self.is_memory_only() {
                    self.degrade(format!("removing {}: {}", key, e));
                }
            }
        }
        self.state = SessionState::default();
        self.trial_notice = false;
        &self.state
    }

    fn read(&mut self, key: &str) -> Option<String> {
        if self.is_memory_only() {
            return None;
        }
        match self.storage.get(key) {
            Ok(value) => value,
            Err(e) => {
                self.degrade(format!("reading {}: {}", key, e));
                None
            }
        }
    }

    fn write(&mut self, key: &str, value: &str) {
        if self.is_memory_only() {
            return;
        }
        if let Err(e) = self.storage.set(key, value) {
            self.degrade(format!("writing {}: {}", key, e));
        }
    }

    fn is_memory_only(&self) -> bool {
        matches!(self.persistence, Persistence::MemoryOnly { .. })
    }

    fn degrade(&mut self, reason: String) {
        warn!(%reason, "session storage failed, continuing in memory only");
        self.persistence = Persistence::MemoryOnly { reason };
    }
}

fn parse_history(raw: &str) -> Vec<InteractionRecord> {
    match serde_json::from_str::<Vec<InteractionRecord>>(raw) {
        Ok(mut history) => {
            history.truncate(TRIAL_QUOTA);
            history
        }
        Err(e) => {
            warn!(error = %e, "discarding unreadable chat history");
            Vec::new()
        }
    }
}

// Any non-empty value other than "false" counts as set
fn is_truthy(value: &str) -> bool {
    let value = value.trim();
    !value.is_empty() && value != "false"
}

/// Millisecond ids, bumped so they stay strictly increasing
fn next_id(history: &[InteractionRecord], now: i64) -> String {
    let latest = history
        .first()
        .and_then(|r| r.id.parse::<i64>().ok())
        .unwrap_or(i64::MIN);
    now.max(latest.saturating_add(1)).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{FileStore, Result as StorageResult, StorageError};

    struct BrokenStore {
        fail_reads: bool,
    }

    impl KeyValueStore for BrokenStore {
        fn get(&self, _key: &str) -> StorageResult<Option<String>> {
            if self.fail_reads {
                Err(StorageError::Unavailable("storage disabled".to_string()))
            } else {
                Ok(None)
            }
        }

        fn set(&mut self, _key: &str, _value: &str) -> StorageResult<()> {
            Err(StorageError::Unavailable("quota exceeded".to_string()))
        }

        fn remove(&mut self, _key: &str) -> StorageResult<()> {
            Err(StorageError::Unavailable("quota exceeded".to_string()))
        }
    }

    /// Rejects writes but still reads and deletes, like a full disk
    struct WriteRejectingStore(FileStore);

    impl KeyValueStore for WriteRejectingStore {
        fn get(&self, key: &str) -> StorageResult<Option<String>> {
            self.0.get(key)
        }

        fn set(&mut self, _key: &str, _value: &str) -> StorageResult<()> {
            Err(StorageError::Unavailable("disk full".to_string()))
        }

        fn remove(&mut self, key: &str) -> StorageResult<()> {
            self.0.remove(key)
        }
    }

    fn fresh() -> TrialSessionStore {
        TrialSessionStore::load(Box::new(MemoryStore::new()))
    }

    fn questions(state: &SessionState) -> Vec<&str> {
        state.history.iter().map(|r| r.question.as_str()).collect()
    }

    #[test]
    fn test_first_run_is_empty() {
        let mut store = fresh();
        assert_eq!(store.state(), &SessionState::default());
        assert_eq!(store.persistence(), &Persistence::Durable);
        assert_eq!(store.state().terms_gate(), TermsGate::Unaccepted);
        assert!(store.can_submit());
        assert!(!store.take_trial_notice());
    }

    #[test]
    fn test_fourth_record_evicts_oldest() {
        let mut store = fresh();
        for q in ["A", "B", "C", "D"] {
            store.record_interaction(q, format!("answer {}", q), Mode::Explain);
        }
        assert_eq!(questions(store.state()), vec!["D", "C", "B"]);
    }

    #[test]
    fn test_history_never_exceeds_quota() {
        let mut store = fresh();
        for i in 0..20 {
            let state = store.record_interaction(format!("q{}", i), "a", Mode::Explain);
            assert!(state.history.len() <= TRIAL_QUOTA);
            assert_eq!(state.history[0].question, format!("q{}", i));
        }
    }

    #[test]
    fn test_ids_strictly_increase() {
        let mut store = fresh();
        for q in ["A", "B", "C"] {
            store.record_interaction(q, "a", Mode::Explain);
        }
        let ids: Vec<i64> = store.state().history.iter().map(|r| r.id.parse().unwrap()).collect();
        assert!(ids[0] > ids[1] && ids[1] > ids[2]);
    }

    #[test]
    fn test_can_submit_matches_exhaustion() {
        let mut store = fresh();
        for _ in 0..TRIAL_QUOTA {
            assert!(store.can_submit());
            store.record_interaction("q", "a", Mode::Explain);
        }
        assert!(!store.can_submit());
        assert!(store.state().trial_exhausted());
        assert_eq!(store.state().chats_left(), Some(0));
    }

    #[test]
    fn test_pro_user_can_always_submit() {
        let mut store = fresh();
        store.upgrade_to_pro();
        for _ in 0..5 {
            store.record_interaction("q", "a", Mode::Explain);
            assert!(store.can_submit());
        }
        assert_eq!(store.state().history.len(), TRIAL_QUOTA);
        assert_eq!(store.state().chats_left(), None);
    }

    #[test]
    fn test_accept_terms_is_idempotent() {
        let mut store = fresh();
        let once = store.accept_terms().clone();
        let twice = store.accept_terms().clone();
        assert_eq!(once, twice);
        assert_eq!(twice.terms_gate(), TermsGate::Accepted);
    }

    #[test]
    fn test_state_survives_reload() {
        let dir = tempfile::tempdir().unwrap();
        {
            let mut store = TrialSessionStore::load(Box::new(FileStore::new(dir.path())));
            store.accept_terms();
            store.record_interaction("Solve 2x + 3 = 7", "x = 2", Mode::Solve {
                style: Some("Step-by-Step".to_string()),
            });
        }

        let store = TrialSessionStore::load(Box::new(FileStore::new(dir.path())));
        assert!(store.state().terms_accepted);
        assert!(!store.state().is_pro_user);
        let record = &store.state().history[0];
        assert_eq!(record.response, "x = 2");
        assert_eq!(record.mode.label(), "Step-by-Step");
    }

    #[test]
    fn test_clear_then_load_is_initial_state() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = TrialSessionStore::load(Box::new(FileStore::new(dir.path())));
        store.accept_terms();
        store.upgrade_to_pro();
        store.record_interaction("q", "a", Mode::Explain);
        assert_eq!(store.clear(), &SessionState::default());

        let reloaded = TrialSessionStore::load(Box::new(FileStore::new(dir.path())));
        assert_eq!(reloaded.state(), &SessionState::default());
    }

    #[test]
    fn test_trial_notice_fires_once_per_load() {
        let dir = tempfile::tempdir().unwrap();
        {
            let mut store = TrialSessionStore::load(Box::new(FileStore::new(dir.path())));
            for _ in 0..TRIAL_QUOTA {
                store.record_interaction("q", "a", Mode::Explain);
            }
            // Exhausted mid-session, not on load
            assert!(!store.take_trial_notice());
        }

        let mut store = TrialSessionStore::load(Box::new(FileStore::new(dir.path())));
        assert!(store.take_trial_notice());
        assert!(!store.take_trial_notice());
    }

    #[test]
    fn test_no_trial_notice_for_pro() {
        let mut storage = MemoryStore::new();
        let history: Vec<InteractionRecord> = (0..3)
            .map(|i| InteractionRecord {
                id: i.to_string(),
                question: "q".to_string(),
                response: "a".to_string(),
                mode: Mode::Explain,
                created_at: i,
            })
            .collect();
        storage.set(HISTORY_KEY, &serde_json::to_string(&history).unwrap()).unwrap();
        storage.set(PRO_KEY, "true").unwrap();

        let mut store = TrialSessionStore::load(Box::new(storage));
        assert!(!store.take_trial_notice());
        assert!(store.can_submit());
    }

    #[test]
    fn test_malformed_history_loads_empty() {
        let mut storage = MemoryStore::new();
        storage.set(HISTORY_KEY, "{not json").unwrap();
        storage.set(TERMS_KEY, "true").unwrap();

        let store = TrialSessionStore::load(Box::new(storage));
        assert!(store.state().history.is_empty());
        assert!(store.state().terms_accepted);
        assert_eq!(store.persistence(), &Persistence::Durable);
    }

    #[test]
    fn test_oversized_history_is_truncated_on_load() {
        let mut storage = MemoryStore::new();
        let raw = r#"[
            {"id":"5","question":"e","response":"r","mode":"explain","createdAt":5},
            {"id":"4","question":"d","response":"r","mode":"solve","style":"Teacher Mode","createdAt":4},
            {"id":"3","question":"c","response":"r","mode":"explain","createdAt":3},
            {"id":"2","question":"b","response":"r","mode":"explain","createdAt":2}
        ]"#;
        storage.set(HISTORY_KEY, raw).unwrap();

        let store = TrialSessionStore::load(Box::new(storage));
        assert_eq!(questions(store.state()), vec!["e", "d", "c"]);
        assert_eq!(store.state().history[1].mode.label(), "Teacher Mode");
    }

    #[test]
    fn test_pro_flag_truthiness() {
        assert!(is_truthy("true"));
        assert!(is_truthy("1"));
        assert!(!is_truthy(""));
        assert!(!is_truthy("false"));
    }

    #[test]
    fn test_write_failure_degrades_to_memory() {
        let mut store = TrialSessionStore::load(Box::new(BrokenStore { fail_reads: false }));
        assert_eq!(store.persistence(), &Persistence::Durable);

        store.accept_terms();
        assert!(matches!(store.persistence(), Persistence::MemoryOnly { .. }));

        // Still fully functional in memory
        store.record_interaction("q", "a", Mode::Explain);
        assert!(store.state().terms_accepted);
        assert_eq!(store.state().history.len(), 1);

        store.clear();
        assert_eq!(store.state(), &SessionState::default());
    }

    #[test]
    fn test_clear_after_degrading_still_wipes_storage() {
        let dir = tempfile::tempdir().unwrap();
        {
            let mut seed = FileStore::new(dir.path());
            seed.set(HISTORY_KEY, r#"[{"id":"1","question":"previous user","response":"r","mode":"explain","createdAt":1}]"#)
                .unwrap();
            seed.set(PRO_KEY, "true").unwrap();
        }

        let mut store = TrialSessionStore::load(Box::new(WriteRejectingStore(FileStore::new(dir.path()))));
        assert_eq!(questions(store.state()), vec!["previous user"]);
        store.accept_terms();
        assert!(matches!(store.persistence(), Persistence::MemoryOnly { .. }));

        assert_eq!(store.clear(), &SessionState::default());

        let reloaded = TrialSessionStore::load(Box::new(FileStore::new(dir.path())));
        assert_eq!(reloaded.state(), &SessionState::default());
    }

    #[test]
    fn test_read_failure_loads_default() {
        let store = TrialSessionStore::load(Box::new(BrokenStore { fail_reads: true }));
        assert_eq!(store.state(), &SessionState::default());
        match store.persistence() {
            Persistence::MemoryOnly { reason } => assert!(reason.contains("storage disabled")),
            other => panic!("expected memory-only, got {:?}", other),
        }
    }

    #[test]
    fn test_unavailable_store_works_in_memory() {
        let mut store = TrialSessionStore::unavailable("no data directory".to_string());
        assert!(matches!(store.persistence(), Persistence::MemoryOnly { .. }));
        store.accept_terms();
        store.record_interaction("q", "a", Mode::Explain);
        assert_eq!(store.state().history.len(), 1);
    }

    #[test]
    fn test_record_serialization_shape() {
        let record = InteractionRecord {
            id: "1700000000000".to_string(),
            question: "q".to_string(),
            response: "a".to_string(),
            mode: Mode::Solve { style: None },
            created_at: 1_700_000_000_000,
        };
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["mode"], "solve");
        assert_eq!(value["createdAt"], 1_700_000_000_000i64);
        assert!(value.get("style").is_none());
    }
}
