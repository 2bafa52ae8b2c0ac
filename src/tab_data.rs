/// Data structures for Tab Clear
use serde::{Deserialize, Serialize};

/// Snapshot of a browser tab as reported by `chrome.tabs.query`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Tab {
    pub id: i32,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub title: String,
    pub window_id: i32,
    #[serde(default)]
    pub pinned: bool,
    #[serde(default)]
    pub active: bool,
    #[serde(default)]
    pub audible: bool,
    /// Milliseconds since the epoch; absent for tabs the browser never focused
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_accessed: Option<f64>,
}

impl Tab {
    pub fn new(id: i32, window_id: i32, url: &str, title: &str) -> Tab {
        Tab {
            id,
            url: url.to_string(),
            title: title.to_string(),
            window_id,
            pinned: false,
            active: false,
            audible: false,
            last_accessed: None,
        }
    }
}

/// A closed tab kept in the searchable history
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HistoryItem {
    pub id: f64,
    pub title: String,
    pub url: String,
    pub closed_at: f64,
    #[serde(default = "default_category")]
    pub category: String,
}

pub const UNCATEGORIZED: &str = "Uncategorized";
pub const UNTITLED: &str = "Untitled";

fn default_category() -> String {
    UNCATEGORIZED.to_string()
}

impl HistoryItem {
    /// Build the history record for a tab closed at `now`
    pub fn from_tab(tab: &Tab, category: String, now: f64) -> HistoryItem {
        let title = if tab.title.is_empty() {
            UNTITLED.to_string()
        } else {
            tab.title.clone()
        };

        HistoryItem {
            id: now,
            title,
            url: tab.url.clone(),
            closed_at: now,
            category,
        }
    }
}
