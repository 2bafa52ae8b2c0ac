/// User settings with defaults and field-by-field merge
use crate::error::SettingsError;
use crate::pattern::invalid_patterns;
use log::warn;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

const MINUTE_MS: f64 = 60_000.0;
const DEFAULT_IDLE_MINUTES: u32 = 30;
const DEFAULT_HISTORY_LIMIT: usize = 100;

/// How closed tabs are assigned a category
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum GroupingMethod {
    #[default]
    Local,
    #[serde(rename = "ai", alias = "remote")]
    Remote,
}

/// Remote text-classification service
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    #[default]
    Gemini,
    #[serde(rename = "openai")]
    OpenAi,
    Grok,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct ClassifierConfig {
    pub enabled: bool,
    pub provider: Provider,
    pub api_key: String,
    /// Empty means the provider's default model
    pub model: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    /// Minutes
    pub idle_time: u32,
    pub min_tab_count: usize,
    pub close_duplicate_domains: bool,
    pub auto_close_native_tabs: bool,
    /// Minutes
    pub native_tab_idle_time: u32,
    pub ignore_pinned_tabs: bool,
    pub history_limit: usize,
    pub grouping_method: GroupingMethod,
    #[serde(rename = "aiSettings")]
    pub classifier: ClassifierConfig,
    pub whitelist: Vec<String>,
    pub blacklist: Vec<String>,
    pub is_paused: bool,
    /// Milliseconds since the epoch of the last resume, 0 if never paused
    pub resume_time: f64,
    pub language: String,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            idle_time: DEFAULT_IDLE_MINUTES,
            min_tab_count: 10,
            close_duplicate_domains: true,
            auto_close_native_tabs: true,
            native_tab_idle_time: DEFAULT_IDLE_MINUTES,
            ignore_pinned_tabs: true,
            history_limit: DEFAULT_HISTORY_LIMIT,
            grouping_method: GroupingMethod::Local,
            classifier: ClassifierConfig::default(),
            whitelist: Vec::new(),
            blacklist: Vec::new(),
            is_paused: false,
            resume_time: 0.0,
            language: "zh_CN".to_string(),
        }
    }
}

impl Settings {
    /// Overlay a stored settings object onto the defaults
    ///
    /// Missing fields keep their default. A stored field whose value does not
    /// fit its type is dropped and the default kept, so one bad entry never
    /// discards the rest of the user's configuration.
    pub fn merge_over_defaults(stored: &Value) -> Settings {
        let Value::Object(stored) = stored else {
            if !stored.is_null() {
                warn!("Stored settings are not an object, using defaults");
            }
            return Settings::default();
        };

        let Ok(mut merged) = serde_json::to_value(Settings::default()) else {
            return Settings::default();
        };

        merge_object(&mut merged, "", stored);
        serde_json::from_value(merged).unwrap_or_default()
    }

    pub fn idle_threshold_ms(&self) -> f64 {
        f64::from(self.idle_time.max(1)) * MINUTE_MS
    }

    pub fn native_idle_threshold_ms(&self) -> f64 {
        let minutes = match self.native_tab_idle_time {
            0 => DEFAULT_IDLE_MINUTES,
            minutes => minutes,
        };
        f64::from(minutes) * MINUTE_MS
    }

    pub fn effective_history_limit(&self) -> usize {
        match self.history_limit {
            0 => DEFAULT_HISTORY_LIMIT,
            limit => limit,
        }
    }

    /// Whether closed tabs go to the remote classifier
    pub fn uses_remote_classifier(&self) -> bool {
        self.grouping_method == GroupingMethod::Remote
            && self.classifier.enabled
            && !self.classifier.api_key.trim().is_empty()
    }

    /// Check values entered by the user before they are saved
    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.grouping_method == GroupingMethod::Remote
            && self.classifier.enabled
            && self.classifier.api_key.trim().is_empty()
        {
            return Err(SettingsError::MissingApiKey);
        }
        if self.idle_time < 1 {
            return Err(SettingsError::IdleTime);
        }
        if self.min_tab_count < 1 {
            return Err(SettingsError::MinTabCount);
        }
        if self.native_tab_idle_time < 1 {
            return Err(SettingsError::NativeTabIdleTime);
        }
        if self.history_limit < 1 {
            return Err(SettingsError::HistoryLimit);
        }

        let invalid = invalid_patterns(self.whitelist.iter().chain(&self.blacklist));
        if !invalid.is_empty() {
            return Err(SettingsError::InvalidPatterns(invalid));
        }

        Ok(())
    }

    /// Flip the paused flag, returning the new state
    ///
    /// Resuming moves `resume_time` forward to `now` so tabs that sat idle
    /// while paused are measured from the resume.
    pub fn toggle_pause(&mut self, now: f64) -> bool {
        self.is_paused = !self.is_paused;
        if !self.is_paused {
            self.resume_time = self.resume_time.max(now);
        }
        self.is_paused
    }
}

fn merge_object(root: &mut Value, path: &str, stored: &Map<String, Value>) {
    for (key, value) in stored {
        let field_path = format!("{}/{}", path, key.replace('~', "~0").replace('/', "~1"));

        let nested = match (root.pointer(&field_path), value) {
            (Some(Value::Object(_)), Value::Object(inner)) => Some(inner),
            _ => None,
        };
        if let Some(inner) = nested {
            merge_object(root, &field_path, inner);
            continue;
        }

        let mut candidate = root.clone();
        let parent = if path.is_empty() {
            Some(&mut candidate)
        } else {
            candidate.pointer_mut(path)
        };
        if let Some(Value::Object(parent)) = parent {
            parent.insert(key.clone(), value.clone());
        }

        if serde_json::from_value::<Settings>(candidate.clone()).is_ok() {
            *root = candidate;
        } else {
            warn!("Ignoring stored setting '{}': unexpected value {}", field_path, value);
        }
    }
}
