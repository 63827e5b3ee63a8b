//! Records read back out of the vault index.
//!
//! These are the query-side shapes; the write side works directly from
//! [`crate::parser::Document`].

use serde::Serialize;
use std::collections::BTreeMap;

use crate::schema::FieldValue;

/// One indexed object: a file or a section / declared object inside one.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ObjectRecord {
    pub id: String,
    #[serde(rename = "type")]
    pub type_name: String,
    pub file_path: String,
    pub heading: Option<String>,
    pub heading_level: Option<i64>,
    pub fields: BTreeMap<String, FieldValue>,
    pub tags: Vec<String>,
    pub line_start: i64,
    pub line_end: Option<i64>,
    pub parent_id: Option<String>,
    pub alias: Option<String>,
}

/// One trait occurrence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TraitRecord {
    pub id: String,
    pub trait_type: String,
    pub value: Option<String>,
    pub content: String,
    pub file_path: String,
    pub line: i64,
    pub parent_object_id: String,
}

/// One `date_index` row: an object field or trait that carries a date.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DateEntry {
    pub date: String,
    /// `object` or `trait`.
    pub source_type: String,
    pub source_id: String,
    pub field_name: String,
    pub file_path: String,
}

/// A reference pointing at some object, seen from the referencing side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Backlink {
    pub source_id: String,
    pub source_type: Option<String>,
    pub target_raw: String,
    pub target_id: Option<String>,
    pub display_text: Option<String>,
    pub file_path: String,
    pub line: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchHit {
    pub object_id: String,
    pub title: String,
    pub file_path: String,
    /// Matched text, with hits wrapped in `»…«`.
    pub snippet: String,
    /// bm25 rank; lower is better.
    pub rank: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IndexStats {
    pub files: i64,
    pub objects: i64,
    pub traits: i64,
    pub refs: i64,
    pub unresolved_refs: i64,
}

/// Outcome of one resolution pass over the `refs` table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ResolutionStats {
    pub resolved: usize,
    pub unresolved: usize,
    pub ambiguous: usize,
}
