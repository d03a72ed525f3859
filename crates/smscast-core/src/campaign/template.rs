//! Merge-tag rendering for message content

use regex::{Captures, Regex};
use smscast_storage::models::Contact;
use std::collections::HashMap;
use std::sync::LazyLock;

static MERGE_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{\{(\w+)\}\}").expect("merge tag pattern is valid"));

/// Tag names found in `content`, de-duplicated, in first-occurrence order
pub fn extract_tags(content: &str) -> Vec<String> {
    let mut tags: Vec<String> = Vec::new();
    for caps in MERGE_TAG.captures_iter(content) {
        let tag = &caps[1];
        if !tags.iter().any(|t| t == tag) {
            tags.push(tag.to_string());
        }
    }
    tags
}

/// Substitute every `{{tag}}` that has an entry in `values`.
/// Tags without a value are left as literal text.
pub fn render(content: &str, values: &HashMap<String, String>) -> String {
    MERGE_TAG
        .replace_all(content, |caps: &Captures| match values.get(&caps[1]) {
            Some(value) => value.clone(),
            None => caps[0].to_string(),
        })
        .into_owned()
}

/// The per-recipient values campaigns substitute
pub fn contact_values(contact: &Contact) -> HashMap<String, String> {
    HashMap::from([
        (
            "first_name".to_string(),
            contact.first_name.clone().unwrap_or_default(),
        ),
        (
            "last_name".to_string(),
            contact.last_name.clone().unwrap_or_default(),
        ),
        ("phone_number".to_string(), contact.phone_number.clone()),
    ])
}

/// Placeholder values for test sends: `{{tag}}` becomes `[tag]`
pub fn sample_values(content: &str) -> HashMap<String, String> {
    extract_tags(content)
        .into_iter()
        .map(|tag| {
            let sample = format!("[{}]", tag);
            (tag, sample)
        })
        .collect()
}
