//! Error kinds raised at the component seams.
//!
//! Each component owns one enum so callers can tell a per-file problem
//! (skip and report) from a vault-wide one (stop):
//!
//! | Type | Scope | Typical handling |
//! |------|-------|------------------|
//! | [`ParseError`] | one file | record, continue with the next file |
//! | [`SchemaError`] | whole schema | abort the operation |
//! | [`IndexError`] | one object, or the whole index for `Storage` | `ObjectNotFound` is a warning |
//! | [`RewriteError`] | one backlink | collected into a batch report |
//!
//! Orchestration code (`reindex`, `mover`, the CLI) wraps these in
//! `anyhow::Error` with context.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("{path}: frontmatter opened on line 1 is never closed")]
    UnclosedFrontmatter { path: String },

    #[error("{path}: invalid frontmatter YAML: {message}")]
    InvalidYaml { path: String, message: String },

    #[error("{path}: frontmatter must be a mapping of keys to values")]
    NotAMapping { path: String },
}

#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("schema file not found: {}", path.display())]
    NotFound { path: PathBuf },

    #[error("failed to read schema file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid schema: {0}")]
    Invalid(String),

    #[error("unknown type '{0}'")]
    UnknownType(String),

    #[error("type '{type_name}' has no field '{field}'")]
    UnknownField { type_name: String, field: String },

    #[error(
        "cannot remove required field '{field}' from type '{type_name}': \
         {count} object(s) still carry it"
    )]
    DataIntegrityBlock {
        type_name: String,
        field: String,
        count: i64,
    },
}

#[derive(Debug, Error)]
pub enum IndexError {
    #[error("object not found: {0}")]
    ObjectNotFound(String),

    #[error("alias '{alias}' is claimed by both '{first}' and '{second}'")]
    AliasConflict {
        alias: String,
        first: String,
        second: String,
    },

    #[error("object '{id}' is defined by both {first_path} and {second_path}")]
    DuplicateId {
        id: String,
        first_path: String,
        second_path: String,
    },

    #[error("invalid value filter '{0}'")]
    InvalidFilter(String),

    #[error("'{0}' is not a date (expected YYYY-MM-DD, today, yesterday or tomorrow)")]
    InvalidDate(String),

    #[error("invalid search query '{query}': {message}")]
    InvalidQuery { query: String, message: String },

    #[error("stored fields for '{id}' are not valid JSON: {source}")]
    CorruptFields {
        id: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("index storage failure: {0}")]
    Storage(#[from] sqlx::Error),

    #[error("index I/O failure: {0}")]
    Io(#[from] std::io::Error),
}

impl IndexError {
    /// `true` for the conditions a batch may log and move past.
    pub fn is_not_found(&self) -> bool {
        matches!(self, IndexError::ObjectNotFound(_))
    }
}

#[derive(Debug, Error)]
pub enum RewriteError {
    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
