//! Link extraction and rewriting for message content

use regex::{Captures, Regex};
use std::collections::HashMap;
use std::sync::LazyLock;

static URL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"https?://[^\s]+").expect("url pattern is valid"));

/// Every URL in `content` in order of appearance, duplicates included.
///
/// A URL runs to the next whitespace, so punctuation written directly after
/// it (`https://example.com/sale.`) is part of the URL.
pub fn extract_links(content: &str) -> Vec<String> {
    URL.find_iter(content)
        .map(|m| m.as_str().to_string())
        .collect()
}

/// Distinct URLs in `content`, in first-occurrence order
pub fn distinct_links(content: &str) -> Vec<String> {
    let mut links = extract_links(content);
    let mut seen = std::collections::HashSet::new();
    links.retain(|link| seen.insert(link.clone()));
    links
}

/// Replace each URL that has a mapping with its short URL.
/// Unmapped URLs are left unchanged.
pub fn rewrite(content: &str, short_urls: &HashMap<String, String>) -> String {
    if short_urls.is_empty() {
        return content.to_string();
    }

    URL.replace_all(content, |caps: &Captures| {
        let url = &caps[0];
        short_urls
            .get(url)
            .cloned()
            .unwrap_or_else(|| url.to_string())
    })
    .into_owned()
}
