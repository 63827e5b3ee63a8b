//! `[[target]]` / `[[target|display]]` links.

use regex::Regex;
use std::sync::LazyLock;

static WIKILINK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[\[([^\]\[|]+)(?:\|([^\]]+))?\]\]").unwrap());

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Wikilink {
    /// Trimmed target, including any `#fragment`.
    pub target: String,
    pub display: Option<String>,
    /// Byte offsets of the whole `[[...]]` token within the scanned text.
    pub start: usize,
    pub end: usize,
}

/// All links in `text`, in order. In `[[[a]], [[b]]]` (a list of links)
/// the innermost `[[a]]` is the link.
pub fn extract(text: &str) -> Vec<Wikilink> {
    WIKILINK_RE
        .captures_iter(text)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            let target = caps.get(1)?.as_str().trim();
            if target.is_empty() {
                return None;
            }
            let display = caps
                .get(2)
                .map(|m| m.as_str().trim().to_string())
                .filter(|d| !d.is_empty());
            Some(Wikilink {
                target: target.to_string(),
                display,
                start: whole.start(),
                end: whole.end(),
            })
        })
        .collect()
}

/// Parses a string that is exactly one link, ignoring surrounding space.
pub fn parse_exact(text: &str) -> Option<Wikilink> {
    let trimmed = text.trim();
    if !trimmed.starts_with("[[") || !trimmed.ends_with("]]") {
        return None;
    }
    let mut links = extract(trimmed);
    match links.pop() {
        Some(link) if links.is_empty() && link.start == 0 && link.end == trimmed.len() => {
            Some(link)
        }
        _ => None,
    }
}
