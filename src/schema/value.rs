//! Tagged field values and their total coercion from YAML, JSON and
//! inline-declaration text.

use std::fmt;

use crate::dates;
use crate::parser::wikilink;

#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Null,
    String(String),
    Number(f64),
    Bool(bool),
    Date(String),
    Ref(String),
    Array(Vec<FieldValue>),
}

impl FieldValue {
    /// Classifies a bare string: exactly one wikilink is a ref, a valid ISO
    /// date is a date, everything else stays a string.
    pub fn from_text(s: &str) -> FieldValue {
        if let Some(link) = wikilink::parse_exact(s) {
            return FieldValue::Ref(link.target);
        }
        if dates::is_valid_date(s) {
            return FieldValue::Date(s.to_string());
        }
        FieldValue::String(s.to_string())
    }

    pub fn from_yaml(value: &serde_yaml::Value) -> FieldValue {
        use serde_yaml::Value;
        match value {
            Value::Null => FieldValue::Null,
            Value::Bool(b) => FieldValue::Bool(*b),
            Value::Number(n) => n.as_f64().map_or(FieldValue::Null, FieldValue::Number),
            Value::String(s) => FieldValue::from_text(s),
            Value::Sequence(items) => {
                // An unquoted `[[target]]` reads as a sequence nested in a sequence.
                if let [Value::Sequence(inner)] = items.as_slice() {
                    if let [Value::String(target)] = inner.as_slice() {
                        return FieldValue::Ref(target.trim().to_string());
                    }
                }
                FieldValue::Array(items.iter().map(FieldValue::from_yaml).collect())
            }
            Value::Mapping(_) => serde_yaml::to_string(value)
                .map(|s| FieldValue::String(s.trim_end().to_string()))
                .unwrap_or(FieldValue::Null),
            Value::Tagged(tagged) => FieldValue::from_yaml(&tagged.value),
        }
    }

    pub fn from_json(value: &serde_json::Value) -> FieldValue {
        use serde_json::Value;
        match value {
            Value::Null => FieldValue::Null,
            Value::Bool(b) => FieldValue::Bool(*b),
            Value::Number(n) => n.as_f64().map_or(FieldValue::Null, FieldValue::Number),
            Value::String(s) => FieldValue::from_text(s),
            Value::Array(items) => {
                FieldValue::Array(items.iter().map(FieldValue::from_json).collect())
            }
            Value::Object(_) => FieldValue::String(value.to_string()),
        }
    }

    /// Storage form used by the index. Refs keep their bracket syntax so
    /// [`FieldValue::from_json`] restores the same variant.
    pub fn to_json(&self) -> serde_json::Value {
        use serde_json::Value;
        match self {
            FieldValue::Null => Value::Null,
            FieldValue::Bool(b) => Value::Bool(*b),
            FieldValue::Number(n) => number_to_json(*n),
            FieldValue::String(s) | FieldValue::Date(s) => Value::String(s.clone()),
            FieldValue::Ref(target) => Value::String(format!("[[{target}]]")),
            FieldValue::Array(items) => Value::Array(items.iter().map(|v| v.to_json()).collect()),
        }
    }

    /// Flow-style YAML for a frontmatter `key: value` line.
    pub fn to_yaml_inline(&self) -> String {
        match self {
            FieldValue::Null => "null".to_string(),
            FieldValue::Bool(b) => b.to_string(),
            FieldValue::Number(n) => format_number(*n),
            FieldValue::Date(s) => s.clone(),
            FieldValue::Ref(target) => format!("\"[[{target}]]\""),
            FieldValue::String(s) => {
                if needs_quotes(s) {
                    quote(s)
                } else {
                    s.clone()
                }
            }
            FieldValue::Array(items) => {
                let parts: Vec<String> = items.iter().map(|v| v.to_yaml_inline()).collect();
                format!("[{}]", parts.join(", "))
            }
        }
    }

    /// Text of string-like variants (strings, dates, ref targets).
    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::String(s) | FieldValue::Date(s) | FieldValue::Ref(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FieldValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[FieldValue]> {
        match self {
            FieldValue::Array(items) => Some(items),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Null)
    }

    pub fn kind(&self) -> &'static str {
        match self {
            FieldValue::Null => "null",
            FieldValue::String(_) => "string",
            FieldValue::Number(_) => "number",
            FieldValue::Bool(_) => "bool",
            FieldValue::Date(_) => "date",
            FieldValue::Ref(_) => "ref",
            FieldValue::Array(_) => "array",
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Null => Ok(()),
            FieldValue::Bool(b) => write!(f, "{b}"),
            FieldValue::Number(n) => f.write_str(&format_number(*n)),
            FieldValue::String(s) | FieldValue::Date(s) => f.write_str(s),
            FieldValue::Ref(target) => write!(f, "[[{target}]]"),
            FieldValue::Array(items) => {
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                Ok(())
            }
        }
    }
}

impl serde::Serialize for FieldValue {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

fn number_to_json(n: f64) -> serde_json::Value {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        serde_json::Value::from(n as i64)
    } else {
        serde_json::Number::from_f64(n).map_or(serde_json::Value::Null, serde_json::Value::Number)
    }
}

fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{n}")
    }
}

fn needs_quotes(s: &str) -> bool {
    if s.is_empty() || s.trim() != s || s.contains('\n') {
        return true;
    }
    if s.starts_with(|c: char| "[]{}#&*!|>'\"%@`,?:-".contains(c)) {
        return true;
    }
    if s.contains(": ") || s.contains(" #") || s.ends_with(':') {
        return true;
    }
    let lower = s.to_ascii_lowercase();
    if matches!(
        lower.as_str(),
        "true" | "false" | "yes" | "no" | "on" | "off" | "null" | "~"
    ) {
        return true;
    }
    s.parse::<f64>().is_ok() || dates::looks_like_date_literal(s)
}

fn quote(s: &str) -> String {
    serde_json::to_string(s).unwrap_or_else(|_| format!("\"{s}\""))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn yaml(s: &str) -> serde_yaml::Value {
        serde_yaml::from_str(s).unwrap()
    }

    #[test]
    fn test_from_yaml_scalars() {
        assert_eq!(FieldValue::from_yaml(&yaml("hello")), FieldValue::String("hello".into()));
        assert_eq!(FieldValue::from_yaml(&yaml("42")), FieldValue::Number(42.0));
        assert_eq!(FieldValue::from_yaml(&yaml("2.5")), FieldValue::Number(2.5));
        assert_eq!(FieldValue::from_yaml(&yaml("true")), FieldValue::Bool(true));
        assert_eq!(FieldValue::from_yaml(&yaml("~")), FieldValue::Null);
        assert_eq!(
            FieldValue::from_yaml(&yaml("2025-02-01")),
            FieldValue::Date("2025-02-01".into())
        );
    }

    #[test]
    fn test_from_yaml_refs() {
        assert_eq!(
            FieldValue::from_yaml(&yaml("\"[[people/freya]]\"")),
            FieldValue::Ref("people/freya".into())
        );
        // Unquoted brackets parse as nested sequences.
        assert_eq!(
            FieldValue::from_yaml(&yaml("[[people/freya]]")),
            FieldValue::Ref("people/freya".into())
        );
        assert_eq!(
            FieldValue::from_yaml(&yaml("[a, 1]")),
            FieldValue::Array(vec![FieldValue::String("a".into()), FieldValue::Number(1.0)])
        );
    }

    #[test]
    fn test_json_storage_restores_variant() {
        let values = vec![
            FieldValue::Ref("people/freya".into()),
            FieldValue::Date("2025-02-01".into()),
            FieldValue::Number(3.0),
            FieldValue::Array(vec![FieldValue::String("x".into()), FieldValue::Bool(false)]),
        ];
        for value in values {
            assert_eq!(FieldValue::from_json(&value.to_json()), value);
        }
        assert_eq!(FieldValue::Number(3.0).to_json(), serde_json::json!(3));
    }

    #[test]
    fn test_yaml_inline_quoting() {
        assert_eq!(FieldValue::String("plain text".into()).to_yaml_inline(), "plain text");
        assert_eq!(FieldValue::String("a: b".into()).to_yaml_inline(), "\"a: b\"");
        assert_eq!(FieldValue::String("true".into()).to_yaml_inline(), "\"true\"");
        assert_eq!(FieldValue::String("12".into()).to_yaml_inline(), "\"12\"");
        assert_eq!(FieldValue::Ref("x/y".into()).to_yaml_inline(), "\"[[x/y]]\"");
        assert_eq!(
            FieldValue::Array(vec![FieldValue::Number(1.0), FieldValue::String("b".into())])
                .to_yaml_inline(),
            "[1, b]"
        );
    }
}
