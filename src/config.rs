use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;

use crate::session::TrialSessionStore;
use crate::storage::{FileStore, KeyValueStore, MemoryStore, SqliteStore};

pub const DEFAULT_API_URL: &str = "https://vikal-backend3030-production.up.railway.app";
pub const DEFAULT_VIDEO_API_URL: &str = "http://localhost:5001";
pub const DEFAULT_PAYMENT_LINK: &str = "https://razorpay.com/payment-link/plink_Q0hzTfIX0l2sHx/test";
pub const ANONYMOUS_USER: &str = "anonymous";

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    File,
    Sqlite,
    Memory,
}

impl StorageBackend {
    pub fn as_str(&self) -> &'static str {
        match self {
            StorageBackend::File => "file",
            StorageBackend::Sqlite => "sqlite",
            StorageBackend::Memory => "memory",
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    pub api_url: String,
    pub video_api_url: String,
    pub payment_link: String,
    /// Signed-in user, `None` when signed out
    pub user_id: Option<String>,
    pub storage_backend: StorageBackend,
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

impl Config {
    pub fn new() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            video_api_url: DEFAULT_VIDEO_API_URL.to_string(),
            payment_link: DEFAULT_PAYMENT_LINK.to_string(),
            user_id: None,
            storage_backend: StorageBackend::File,
        }
    }

    pub fn load() -> Result<Self> {
        Self::load_from(&Self::get_config_path()?)
    }

    pub fn load_from(config_path: &Path) -> Result<Self> {
        if !config_path.exists() {
            return Ok(Self::new());
        }

        let config_content = fs::read_to_string(config_path)?;
        let config: Config = serde_json::from_str(&config_content)?;
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::get_config_path()?)
    }

    pub fn save_to(&self, config_path: &Path) -> Result<()> {
        // Create config directory if it doesn't exist
        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let config_content = serde_json::to_string_pretty(self)?;
        fs::write(config_path, config_content)?;
        Ok(())
    }

    /// Remember (or forget, with `None`) the signed-in user
    pub fn save_user_id(user_id: Option<&str>) -> Result<()> {
        Self::save_user_id_to(&Self::get_config_path()?, user_id)
    }

    /// An unreadable config file is left alone rather than replaced by defaults
    pub fn save_user_id_to(config_path: &Path, user_id: Option<&str>) -> Result<()> {
        let mut config = Self::load_from(config_path)?;
        config.user_id = user_id.map(str::to_string);
        config.save_to(config_path)
    }

    /// Environment variables win over the config file
    pub fn with_env_overrides(mut self) -> Self {
        self.apply_overrides(|name| std::env::var(name).ok());
        self
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup("VIKAL_API_URL") {
            self.api_url = url;
        }
        if let Some(url) = lookup("VIKAL_VIDEO_API_URL") {
            self.video_api_url = url;
        }
        if let Some(user) = lookup("VIKAL_USER_ID") {
            self.user_id = Some(user);
        }
    }

    pub fn user_id_or_anonymous(&self) -> &str {
        self.user_id.as_deref().unwrap_or(ANONYMOUS_USER)
    }

    /// Open the configured backend. A backend that cannot be opened still
    /// yields a working store, just without persistence.
    pub fn open_session_store(&self) -> TrialSessionStore {
        let opened: Result<Box<dyn KeyValueStore>> = match self.storage_backend {
            StorageBackend::File => FileStore::open_default()
                .map(|s| Box::new(s) as Box<dyn KeyValueStore>)
                .map_err(Into::into),
            StorageBackend::Sqlite => SqliteStore::open_default()
                .map(|s| Box::new(s) as Box<dyn KeyValueStore>)
                .map_err(Into::into),
            StorageBackend::Memory => Ok(Box::new(MemoryStore::new())),
        };

        match opened {
            Ok(storage) => TrialSessionStore::load(storage),
            Err(e) => {
                warn!(backend = self.storage_backend.as_str(), error = %e, "could not open session storage");
                TrialSessionStore::unavailable(e.to_string())
            }
        }
    }

    fn get_config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow!("Could not determine config directory"))?;

        Ok(config_dir.join("vikal").join("config.json"))
    }
}
