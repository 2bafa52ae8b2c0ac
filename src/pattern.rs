/// Whitelist / blacklist matching

use regex::Regex;

/// True if the URL contains any of the patterns, ignoring case
///
/// Patterns are plain substrings, not regular expressions. An empty list never
/// matches.
pub fn matches_pattern(url: &str, patterns: &[String]) -> bool {
    if patterns.is_empty() {
        return false;
    }

    let url = url.to_lowercase();
    patterns
        .iter()
        .filter(|pattern| !pattern.is_empty())
        .any(|pattern| url.contains(&pattern.to_lowercase()))
}

/// Split textarea input into one pattern per non-blank line
pub fn parse_pattern_lines(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

/// Patterns that do not compile as regular expressions
pub fn invalid_patterns<'a>(patterns: impl IntoIterator<Item = &'a String>) -> Vec<String> {
    patterns
        .into_iter()
        .filter(|pattern| Regex::new(pattern).is_err())
        .cloned()
        .collect()
}
