//! Inline trait tokens: `@todo`, `@due(2025-03-01)`, `@priority(high)`.

use regex::Regex;
use std::sync::LazyLock;

// `@` must open the line or follow whitespace or a list marker, which keeps
// e-mail addresses out.
static TRAIT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:^|[\s\-\*])@(\w+)(?:\s*\(([^)]*)\))?").unwrap());

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraitToken {
    pub name: String,
    pub value: Option<String>,
    pub start: usize,
    pub end: usize,
}

pub fn extract(line: &str) -> Vec<TraitToken> {
    TRAIT_RE
        .captures_iter(line)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            let name = caps.get(1)?;
            let value = caps
                .get(2)
                .map(|m| m.as_str().trim())
                .filter(|v| !v.is_empty())
                .map(unquote);
            Some(TraitToken {
                name: name.as_str().to_string(),
                value,
                // The match may include the preceding separator; start at `@`.
                start: name.start() - 1,
                end: whole.end(),
            })
        })
        .collect()
}

/// Line text with trait tokens and a leading list marker removed.
pub fn content_without_traits(line: &str) -> String {
    let stripped = TRAIT_RE.replace_all(line, |caps: &regex::Captures<'_>| {
        let whole = &caps[0];
        if whole.starts_with('@') {
            String::new()
        } else {
            whole[..1].to_string()
        }
    });
    let mut text = stripped.trim();
    for marker in ["- [ ] ", "- [x] ", "- ", "* ", "+ "] {
        if let Some(rest) = text.strip_prefix(marker) {
            text = rest;
            break;
        }
    }
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn unquote(v: &str) -> String {
    let quoted = v.len() >= 2
        && ((v.starts_with('"') && v.ends_with('"')) || (v.starts_with('\'') && v.ends_with('\'')));
    if quoted {
        v[1..v.len() - 1].to_string()
    } else {
        v.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_bare_and_valued() {
        let tokens = extract("- @todo Call [[people/freya]] @due(2025-03-01) @priority( \"high\" )");
        let names: Vec<&str> = tokens.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["todo", "due", "priority"]);
        assert_eq!(tokens[0].value, None);
        assert_eq!(tokens[1].value.as_deref(), Some("2025-03-01"));
        assert_eq!(tokens[2].value.as_deref(), Some("high"));
    }

    #[test]
    fn test_extract_offsets_start_at_at_sign() {
        let line = "x @todo";
        let tokens = extract(line);
        assert_eq!(&line[tokens[0].start..tokens[0].end], "@todo");
        let line = "@highlight first";
        assert_eq!(extract(line)[0].start, 0);
    }

    #[test]
    fn test_email_is_not_a_trait() {
        assert!(extract("mail freya@example.com").is_empty());
    }

    #[test]
    fn test_content_without_traits() {
        assert_eq!(
            content_without_traits("- @todo Call [[people/freya]] @due(2025-03-01)"),
            "Call [[people/freya]]"
        );
        assert_eq!(content_without_traits("@highlight Key insight"), "Key insight");
    }
}
