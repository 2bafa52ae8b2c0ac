/// URL classification helpers for Tab Clear
use url::Url;

/// Schemes the browser uses for its own pages
const NATIVE_SCHEMES: [&str; 2] = ["chrome://", "edge://"];
const EXTENSION_SCHEME: &str = "chrome-extension://";
const EMPTY_URLS: [&str; 4] = ["about:blank", "chrome://newtab/", "chrome://newtab", "edge://newtab/"];

/// New-tab page, `about:blank`, or no URL at all
pub fn is_empty_tab_url(url: &str) -> bool {
    let url = url.trim();
    url.is_empty() || EMPTY_URLS.contains(&url)
}

/// Browser-internal page such as `chrome://settings`
pub fn is_native_url(url: &str) -> bool {
    NATIVE_SCHEMES.iter().any(|scheme| url.starts_with(scheme))
}

pub fn is_extension_url(url: &str) -> bool {
    url.starts_with(EXTENSION_SCHEME)
}

/// Hostname used for duplicate-domain grouping
///
/// Returns `None` for native and extension pages, for URLs that do not parse,
/// and for URLs without a host (`about:blank`, `data:` ...).
pub fn hostname(url: &str) -> Option<String> {
    if is_native_url(url) || is_extension_url(url) {
        return None;
    }

    let parsed = Url::parse(url).ok()?;
    match parsed.host_str() {
        Some(host) if !host.is_empty() => Some(host.to_string()),
        _ => None,
    }
}

/// Category derived from a URL's hostname
///
/// `https://www.example.com/a` → `Example.com`. `None` when the URL does not
/// parse or carries no host.
pub fn host_category(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let host = parsed.host_str()?;
    let host = host.strip_prefix("www.").unwrap_or(host);

    let mut chars = host.chars();
    let first = chars.next()?;
    Some(first.to_uppercase().chain(chars).collect())
}
