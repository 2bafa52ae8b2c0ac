/// Closed-tab history: a bounded, URL-unique log, newest first

use crate::classifier::Classifier;
use crate::error::StorageError;
use crate::storage::StateStore;
use crate::tab_data::{HistoryItem, Tab, UNCATEGORIZED};
use log::{debug, info};
use serde::Serialize;
use std::collections::BTreeMap;

/// History items sharing a category
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryGroup<'h> {
    pub category: String,
    pub items: Vec<&'h HistoryItem>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct History {
    pub items: Vec<HistoryItem>,
}

impl History {
    pub fn new() -> Self {
        History { items: Vec::new() }
    }

    pub fn from_items(items: Vec<HistoryItem>) -> Self {
        History { items }
    }

    /// Replace the entry with the same URL in place, or insert at the front
    pub fn upsert(&mut self, item: HistoryItem) {
        match self.items.iter_mut().find(|existing| existing.url == item.url) {
            Some(existing) => *existing = item,
            None => self.items.insert(0, item),
        }
    }

    /// Keep only the first `limit` items
    pub fn truncate(&mut self, limit: usize) {
        self.items.truncate(limit);
    }

    pub fn get(&self, url: &str) -> Option<&HistoryItem> {
        self.items.iter().find(|item| item.url == url)
    }

    /// Items whose title or URL contains `query`, ignoring case
    pub fn search(&self, query: &str) -> Vec<&HistoryItem> {
        let query = query.trim().to_lowercase();
        if query.is_empty() {
            return self.items.iter().collect();
        }

        self.items
            .iter()
            .filter(|item| {
                item.title.to_lowercase().contains(&query) || item.url.to_lowercase().contains(&query)
            })
            .collect()
    }

    /// Matching items grouped by category
    ///
    /// Categories are sorted by name with `Uncategorized` last; items keep
    /// their history order within a group.
    pub fn grouped(&self, query: &str) -> Vec<HistoryGroup<'_>> {
        let mut groups: BTreeMap<String, Vec<&HistoryItem>> = BTreeMap::new();
        for item in self.search(query) {
            let category = if item.category.is_empty() {
                UNCATEGORIZED
            } else {
                item.category.as_str()
            };
            groups.entry(category.to_string()).or_default().push(item);
        }

        let uncategorized = groups.remove(UNCATEGORIZED);
        let mut grouped: Vec<HistoryGroup<'_>> = groups
            .into_iter()
            .map(|(category, items)| HistoryGroup { category, items })
            .collect();
        if let Some(items) = uncategorized {
            grouped.push(HistoryGroup {
                category: UNCATEGORIZED.to_string(),
                items,
            });
        }
        grouped
    }
}

/// Records closed tabs into persisted history
pub struct HistoryStore<'a> {
    state: &'a StateStore<'a>,
    classifier: &'a Classifier<'a>,
}

impl<'a> HistoryStore<'a> {
    pub fn new(state: &'a StateStore<'a>, classifier: &'a Classifier<'a>) -> Self {
        HistoryStore { state, classifier }
    }

    /// Classify `tab` and store it as closed at `now`
    pub async fn record(&self, tab: &Tab, now: f64) -> Result<(), StorageError> {
        let settings = self.state.load_settings().await?;
        let category = self.classifier.classify(&tab.title, &tab.url, &settings).await;

        let mut history = self.state.load_history().await?;
        history.upsert(HistoryItem::from_tab(tab, category, now));
        history.truncate(settings.effective_history_limit());

        debug!("Recorded closed tab in history: {}", tab.url);
        self.state.save_history(&history).await
    }

    /// Re-run classification over every stored item, keeping order and count
    pub async fn reclassify_all(&self) -> Result<usize, StorageError> {
        let settings = self.state.load_settings().await?;
        let mut history = self.state.load_history().await?;

        for item in history.items.iter_mut() {
            item.category = self.classifier.classify(&item.title, &item.url, &settings).await;
        }

        info!("Reclassified {} history items", history.items.len());
        self.state.save_history(&history).await?;
        Ok(history.items.len())
    }
}
