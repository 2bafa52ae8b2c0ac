/// Keyword rules for offline classification

use crate::domain::host_category;

pub const OTHER: &str = "Other";

/// Category rules, first match wins
const RULES: &[(&str, &[&str])] = &[
    (
        "Development",
        &["github", "gitlab", "stackoverflow", "dev", "code", "api", "docs", "localhost", "127.0.0.1"],
    ),
    (
        "Work",
        &[
            "mail", "calendar", "drive", "docs.google", "sheet", "slide", "zoom", "meet", "slack", "teams",
            "office", "notion", "jira", "confluence",
        ],
    ),
    (
        "Social",
        &[
            "twitter", "x.com", "facebook", "instagram", "linkedin", "reddit", "weibo", "zhihu", "discord",
            "telegram", "whatsapp",
        ],
    ),
    (
        "Entertainment",
        &[
            "youtube", "bilibili", "netflix", "spotify", "twitch", "tiktok", "douyin", "iqiyi", "youku", "music",
            "video", "game", "steam",
        ],
    ),
    (
        "Shopping",
        &["amazon", "taobao", "jd.com", "tmall", "ebay", "shop", "store", "buy", "price"],
    ),
    (
        "News & Reading",
        &["news", "blog", "article", "medium", "wikipedia", "wiki", "read", "book"],
    ),
    ("Search", &["google", "bing", "baidu", "search", "query"]),
];

/// Category for a tab using the keyword table, then the hostname
pub fn classify_local(title: &str, url: &str) -> String {
    let url_lower = url.to_lowercase();
    let title_lower = title.to_lowercase();

    RULES
        .iter()
        .find(|(_, keywords)| {
            keywords
                .iter()
                .any(|keyword| url_lower.contains(keyword) || title_lower.contains(keyword))
        })
        .map(|(category, _)| category.to_string())
        .or_else(|| host_category(url))
        .unwrap_or_else(|| OTHER.to_string())
}
