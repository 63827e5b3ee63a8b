//! Leading `---` YAML block.

use std::collections::BTreeMap;

use crate::error::ParseError;
use crate::schema::FieldValue;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Frontmatter {
    pub object_type: Option<String>,
    pub alias: Option<String>,
    pub tags: Vec<String>,
    pub fields: BTreeMap<String, FieldValue>,
    /// YAML text between the fences.
    pub raw: String,
    /// 1-based line of the closing `---`.
    pub end_line: usize,
}

/// Locates the frontmatter block: `Some((raw_yaml, closing_line))`.
///
/// Returns `Ok(None)` when the file does not open with `---`.
pub fn split(content: &str, path: &str) -> Result<Option<(String, usize)>, ParseError> {
    let mut lines = content.lines();
    match lines.next() {
        Some(first) if first.trim() == "---" => {}
        _ => return Ok(None),
    }
    let mut raw = Vec::new();
    for (i, line) in lines.enumerate() {
        if line.trim() == "---" {
            return Ok(Some((raw.join("\n"), i + 2)));
        }
        raw.push(line);
    }
    Err(ParseError::UnclosedFrontmatter {
        path: path.to_string(),
    })
}

pub fn parse(content: &str, path: &str) -> Result<Option<Frontmatter>, ParseError> {
    let Some((raw, end_line)) = split(content, path)? else {
        return Ok(None);
    };

    let mut fm = Frontmatter {
        raw,
        end_line,
        ..Frontmatter::default()
    };
    if fm.raw.trim().is_empty() {
        return Ok(Some(fm));
    }

    let value: serde_yaml::Value =
        serde_yaml::from_str(&fm.raw).map_err(|e| ParseError::InvalidYaml {
            path: path.to_string(),
            message: e.to_string(),
        })?;
    let mapping = match value {
        serde_yaml::Value::Mapping(m) => m,
        serde_yaml::Value::Null => return Ok(Some(fm)),
        _ => {
            return Err(ParseError::NotAMapping {
                path: path.to_string(),
            })
        }
    };

    for (key, value) in &mapping {
        let key = match key {
            serde_yaml::Value::String(s) => s.clone(),
            other => FieldValue::from_yaml(other).to_string(),
        };
        match key.as_str() {
            "type" => fm.object_type = scalar_string(value),
            "alias" => fm.alias = scalar_string(value),
            "tags" => fm.tags = tags(value),
            "id" => {}
            _ => {
                fm.fields.insert(key, FieldValue::from_yaml(value));
            }
        }
    }
    Ok(Some(fm))
}

fn scalar_string(value: &serde_yaml::Value) -> Option<String> {
    let s = match value {
        serde_yaml::Value::String(s) => s.trim().to_string(),
        serde_yaml::Value::Number(n) => n.to_string(),
        serde_yaml::Value::Bool(b) => b.to_string(),
        _ => return None,
    };
    (!s.is_empty()).then_some(s)
}

fn tags(value: &serde_yaml::Value) -> Vec<String> {
    match value {
        serde_yaml::Value::Sequence(items) => items.iter().filter_map(scalar_string).collect(),
        serde_yaml::Value::String(s) => s
            .split(|c: char| c == ',' || c.is_whitespace())
            .map(|t| t.trim_start_matches('#').to_string())
            .filter(|t| !t.is_empty())
            .collect(),
        _ => Vec::new(),
    }
}

/// Sets the top-level `key` of the frontmatter to the already rendered
/// YAML `value`, leaving every other line untouched.
///
/// An existing entry is replaced along with its indented or `- item`
/// continuation lines; a missing one is appended before the closing fence.
/// Content without frontmatter gets a new block.
pub fn set_key(content: &str, key: &str, value: &str) -> String {
    let entry = format!("{key}: {value}\n");
    let lines: Vec<&str> = content.split_inclusive('\n').collect();
    let close = match lines.first() {
        Some(first) if first.trim() == "---" => lines
            .iter()
            .skip(1)
            .position(|l| l.trim() == "---")
            .map(|i| i + 1),
        _ => None,
    };
    let Some(close) = close else {
        return format!("---\n{entry}---\n{content}");
    };

    let mut out = String::with_capacity(content.len() + entry.len());
    out.push_str(lines[0]);
    let mut replaced = false;
    let mut i = 1;
    while i < close {
        if !replaced && is_key_line(lines[i], key) {
            out.push_str(&entry);
            replaced = true;
            i += 1;
            while i < close && is_continuation(lines[i]) {
                i += 1;
            }
            continue;
        }
        out.push_str(lines[i]);
        i += 1;
    }
    if !replaced {
        out.push_str(&entry);
    }
    for line in &lines[close..] {
        out.push_str(line);
    }
    out
}

fn is_key_line(line: &str, key: &str) -> bool {
    line.strip_prefix(key)
        .is_some_and(|rest| rest.trim_start_matches([' ', '\t']).starts_with(':'))
}

fn is_continuation(line: &str) -> bool {
    let trimmed = line.trim_end();
    !trimmed.is_empty() && (trimmed.starts_with([' ', '\t']) || trimmed.starts_with("- "))
}
