pub mod backend;
pub mod config;
pub mod logging;
pub mod session;
pub mod storage;

// Re-export main types for convenience
pub use backend::{BackendError, StudyClient, VideoClient};
pub use config::{Config, StorageBackend};
pub use session::{InteractionRecord, Mode, Persistence, SessionState, TermsGate, TrialSessionStore};
pub use storage::{FileStore, KeyValueStore, MemoryStore, SqliteStore, StorageError};
