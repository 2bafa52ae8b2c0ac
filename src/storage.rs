/// Storage serialization utilities for chrome.storage.local

use crate::error::{Error, StorageError};
use crate::history::History;
use crate::settings::Settings;
use async_trait::async_trait;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cell::RefCell;
use std::collections::{HashMap, HashSet};

pub const SETTINGS_KEY: &str = "settings";
pub const HISTORY_KEY: &str = "closedTabs";
pub const THEME_KEY: &str = "theme";

/// Asynchronous key-value store, no atomicity across keys
#[async_trait(?Send)]
pub trait Storage {
    /// `None` when the key has never been written
    async fn get(&self, key: &str) -> Result<Option<Value>, StorageError>;

    async fn set(&self, key: &str, value: Value) -> Result<(), StorageError>;
}

/// In-process store used by tests and non-browser hosts
#[derive(Debug, Default)]
pub struct MemoryStorage {
    values: RefCell<HashMap<String, Value>>,
    failing: RefCell<HashSet<String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every read and write of `key` fail until cleared
    pub fn fail_key(&self, key: &str) {
        self.failing.borrow_mut().insert(key.to_string());
    }

    pub fn clear_failures(&self) {
        self.failing.borrow_mut().clear();
    }

    pub fn raw(&self, key: &str) -> Option<Value> {
        self.values.borrow().get(key).cloned()
    }

    fn check(&self, key: &str) -> Result<(), String> {
        if self.failing.borrow().contains(key) {
            Err("storage unavailable".to_string())
        } else {
            Ok(())
        }
    }
}

#[async_trait(?Send)]
impl Storage for MemoryStorage {
    async fn get(&self, key: &str) -> Result<Option<Value>, StorageError> {
        self.check(key).map_err(|message| StorageError::Read {
            key: key.to_string(),
            message,
        })?;
        Ok(self.raw(key))
    }

    async fn set(&self, key: &str, value: Value) -> Result<(), StorageError> {
        self.check(key).map_err(|message| StorageError::Write {
            key: key.to_string(),
            message,
        })?;
        self.values.borrow_mut().insert(key.to_string(), value);
        Ok(())
    }
}

/// Popup colour scheme, stored outside the settings object
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    #[default]
    Light,
    Dark,
}

/// Typed view over the persisted state
///
/// Every load reads storage afresh; nothing is cached between calls.
pub struct StateStore<'a> {
    storage: &'a dyn Storage,
}

impl<'a> StateStore<'a> {
    pub fn new(storage: &'a dyn Storage) -> Self {
        StateStore { storage }
    }

    /// Current settings with every field populated
    pub async fn load_settings(&self) -> Result<Settings, StorageError> {
        let stored = self.storage.get(SETTINGS_KEY).await?;
        Ok(stored
            .map(|value| Settings::merge_over_defaults(&value))
            .unwrap_or_default())
    }

    pub async fn save_settings(&self, settings: &Settings) -> Result<(), StorageError> {
        let value = encode(SETTINGS_KEY, settings)?;
        self.storage.set(SETTINGS_KEY, value).await
    }

    /// Closed-tab history, newest first
    ///
    /// Entries that cannot be decoded are dropped rather than failing the load.
    pub async fn load_history(&self) -> Result<History, StorageError> {
        let items = match self.storage.get(HISTORY_KEY).await? {
            Some(Value::Array(entries)) => entries
                .into_iter()
                .filter_map(|entry| match serde_json::from_value(entry) {
                    Ok(item) => Some(item),
                    Err(e) => {
                        warn!("Dropping unreadable history entry: {}", e);
                        None
                    }
                })
                .collect(),
            Some(Value::Null) | None => Vec::new(),
            Some(other) => {
                warn!("Stored history is not a list, ignoring: {}", other);
                Vec::new()
            }
        };
        Ok(History::from_items(items))
    }

    pub async fn save_history(&self, history: &History) -> Result<(), StorageError> {
        let value = encode(HISTORY_KEY, &history.items)?;
        self.storage.set(HISTORY_KEY, value).await
    }

    /// Validate and store settings edited by the user
    ///
    /// The pause state is owned by the pause toggle, so the stored values are
    /// kept regardless of what the form submitted.
    pub async fn save_user_settings(&self, mut settings: Settings) -> Result<Settings, Error> {
        settings.validate()?;

        let current = self.load_settings().await?;
        settings.is_paused = current.is_paused;
        settings.resume_time = current.resume_time;

        self.save_settings(&settings).await?;
        Ok(settings)
    }

    /// Pause or resume auto-closing, returning whether it is now paused
    pub async fn toggle_pause(&self, now: f64) -> Result<bool, StorageError> {
        let mut settings = self.load_settings().await?;
        let paused = settings.toggle_pause(now);
        self.save_settings(&settings).await?;
        info!("Auto-close {}", if paused { "paused" } else { "resumed" });
        Ok(paused)
    }

    /// Write default settings and an empty history where absent
    pub async fn ensure_defaults(&self) -> Result<(), StorageError> {
        if self.storage.get(SETTINGS_KEY).await?.is_none() {
            self.save_settings(&Settings::default()).await?;
        }
        if self.storage.get(HISTORY_KEY).await?.is_none() {
            self.save_history(&History::new()).await?;
        }
        Ok(())
    }

    pub async fn load_theme(&self) -> Result<Theme, StorageError> {
        let stored = self.storage.get(THEME_KEY).await?;
        Ok(stored
            .and_then(|value| serde_json::from_value(value).ok())
            .unwrap_or_default())
    }

    /// Switch between light and dark, returning the new theme
    pub async fn toggle_theme(&self) -> Result<Theme, StorageError> {
        let theme = match self.load_theme().await? {
            Theme::Light => Theme::Dark,
            Theme::Dark => Theme::Light,
        };
        self.storage.set(THEME_KEY, encode(THEME_KEY, &theme)?).await?;
        Ok(theme)
    }
}

fn encode<T: Serialize + ?Sized>(key: &str, value: &T) -> Result<Value, StorageError> {
    serde_json::to_value(value).map_err(|e| StorageError::Write {
        key: key.to_string(),
        message: format!("Failed to serialize: {}", e),
    })
}
