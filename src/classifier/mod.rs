/// Category assignment for closed tabs

pub mod local;
pub mod oracle;

use crate::settings::Settings;
use crate::tab_data::UNCATEGORIZED;
use log::warn;
use oracle::{HttpTransport, oracle_for};

pub use local::classify_local;

/// Instruction sent to the remote classifier
pub fn build_prompt(title: &str, url: &str) -> String {
    format!(
        "Classify this browser tab into one single category (e.g., Work, Entertainment, Development, \
         Reading, Shopping, Social, Other). Return ONLY the category name.\nTitle: {}\nURL: {}",
        title, url
    )
}

/// Strip punctuation and surrounding whitespace from an oracle reply
pub fn clean_label(text: &str) -> String {
    let cleaned: String = text
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_' || c.is_whitespace())
        .collect();

    match cleaned.trim() {
        "" => UNCATEGORIZED.to_string(),
        label => label.to_string(),
    }
}

/// Maps a tab to a category; never fails
pub struct Classifier<'a> {
    transport: &'a dyn HttpTransport,
}

impl<'a> Classifier<'a> {
    pub fn new(transport: &'a dyn HttpTransport) -> Self {
        Classifier { transport }
    }

    /// Remote oracle when configured, local rules otherwise or on any failure
    pub async fn classify(&self, title: &str, url: &str, settings: &Settings) -> String {
        if !settings.uses_remote_classifier() {
            return classify_local(title, url);
        }

        let oracle = oracle_for(settings.classifier.provider, self.transport);
        match oracle.submit(&build_prompt(title, url), &settings.classifier).await {
            Ok(text) => clean_label(&text),
            Err(e) => {
                warn!("Remote classification failed, using local rules: {}", e);
                classify_local(title, url)
            }
        }
    }
}
