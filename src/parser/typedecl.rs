//! Inline object declarations: `::meeting(id=standup, time=09:00, attendees=[[[people/freya]]])`.

use regex::Regex;
use std::collections::BTreeMap;
use std::sync::LazyLock;

use super::wikilink;
use crate::dates;
use crate::schema::FieldValue;

static DECL_WITH_ARGS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^::([\w-]+)\s*\((.*)\)\s*$").unwrap());
static DECL_BARE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^::([\w-]+)\s*$").unwrap());

#[derive(Debug, Clone, PartialEq)]
pub struct TypeDecl {
    pub type_name: String,
    /// Explicit `id=` argument, used instead of the heading slug.
    pub id: Option<String>,
    pub fields: BTreeMap<String, FieldValue>,
}

/// `true` when the trimmed line starts a declaration.
pub fn is_decl_line(line: &str) -> bool {
    line.trim_start().starts_with("::")
}

/// Parses one declaration line. Lines that are not well-formed
/// declarations yield `None` and stay ordinary text.
pub fn parse(line: &str) -> Option<TypeDecl> {
    let trimmed = line.trim();
    if !trimmed.starts_with("::") {
        return None;
    }

    let (type_name, args) = if let Some(caps) = DECL_WITH_ARGS_RE.captures(trimmed) {
        (caps[1].to_string(), caps[2].to_string())
    } else if let Some(caps) = DECL_BARE_RE.captures(trimmed) {
        (caps[1].to_string(), String::new())
    } else {
        return None;
    };

    let mut decl = TypeDecl {
        type_name,
        id: None,
        fields: BTreeMap::new(),
    };
    for part in split_top_level(&args) {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }
        let (key, raw) = part.split_once('=')?;
        let key = key.trim();
        if key.is_empty() {
            return None;
        }
        let value = parse_value(raw.trim());
        if key == "id" {
            decl.id = value.as_str().map(str::to_string);
        } else {
            decl.fields.insert(key.to_string(), value);
        }
    }
    Some(decl)
}

/// Splits on commas that are outside quotes and brackets.
pub(crate) fn split_top_level(s: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut start = 0;
    for (i, c) in s.char_indices() {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '"' | '\'') => quote = Some(c),
            (None, '[') => depth += 1,
            (None, ']') => depth = depth.saturating_sub(1),
            (None, ',') if depth == 0 => {
                parts.push(&s[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    if start < s.len() || !parts.is_empty() {
        parts.push(&s[start..]);
    }
    parts
}

/// Value syntax inside a declaration argument list.
pub fn parse_value(raw: &str) -> FieldValue {
    let raw = raw.trim();
    if let Some(link) = wikilink::parse_exact(raw) {
        return FieldValue::Ref(link.target);
    }
    if raw.len() >= 2 && raw.starts_with('[') && raw.ends_with(']') {
        let inner = &raw[1..raw.len() - 1];
        let items = split_top_level(inner)
            .into_iter()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(parse_value)
            .collect();
        return FieldValue::Array(items);
    }
    if raw.len() >= 2
        && ((raw.starts_with('"') && raw.ends_with('"'))
            || (raw.starts_with('\'') && raw.ends_with('\'')))
    {
        return FieldValue::String(raw[1..raw.len() - 1].to_string());
    }
    match raw {
        "true" => return FieldValue::Bool(true),
        "false" => return FieldValue::Bool(false),
        _ => {}
    }
    if looks_numeric(raw) {
        if let Ok(n) = raw.parse::<f64>() {
            return FieldValue::Number(n);
        }
    }
    if dates::is_valid_date(raw) {
        return FieldValue::Date(raw.to_string());
    }
    FieldValue::String(raw.to_string())
}

fn looks_numeric(s: &str) -> bool {
    !s.is_empty()
        && s.chars().any(|c| c.is_ascii_digit())
        && s
            .chars()
            .all(|c| c.is_ascii_digit() || matches!(c, '.' | '-' | '+' | 'e' | 'E'))
        && !dates::looks_like_date_literal(s)
}
