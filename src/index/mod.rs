//! # Vault index
//!
//! The SQLite system of record for everything parsed out of the vault:
//! objects, traits, references, dated fields and a full-text table. Every
//! row carries the vault-relative `file_path` it came from, which makes a
//! file the unit of replacement.
//!
//! | Table | Key | Filled by |
//! |-------|-----|-----------|
//! | `objects` | object ID | [`VaultIndex::index_document`] |
//! | `traits` | `path:trait:N` | [`VaultIndex::index_document`] |
//! | `refs` | rowid | [`VaultIndex::index_document`], `target_id` by [`VaultIndex::resolve_references`] |
//! | `date_index` | (date, kind, source, field) | [`VaultIndex::index_document`] |
//! | `fts_content` | object ID | [`VaultIndex::index_document`] |
//! | `files` | file path | [`VaultIndex::index_document`] |
//!
//! Writes for one file run in one transaction: the file's old rows are
//! deleted and the new ones inserted, or nothing changes.

pub mod filter;
pub mod fts;
mod query;

use sha2::{Digest, Sha256};
use sqlx::{SqliteConnection, SqlitePool};
use std::path::Path;

use crate::dates;
use crate::db;
use crate::error::IndexError;
use crate::migrate;
use crate::parser::{Document, ParsedObject, ParsedRef};
use crate::schema::{FieldValue, Schema};

/// Tables holding per-file rows.
const FILE_TABLES: [&str; 5] = ["objects", "traits", "refs", "date_index", "fts_content"];

pub struct VaultIndex {
    pool: SqlitePool,
}

impl VaultIndex {
    /// Opens (creating and migrating if needed) the index at `db_path`.
    pub async fn open(db_path: &Path) -> Result<Self, IndexError> {
        let pool = db::connect(db_path).await?;
        migrate::run_migrations(&pool).await?;
        Ok(Self { pool })
    }

    /// Closes the pool, waiting for connections to be released.
    pub async fn close(self) {
        self.pool.close().await;
    }

    /// Replaces everything indexed for `doc.file_path` with the contents of
    /// `doc`. Traits not defined by the schema are skipped.
    pub async fn index_document(&self, doc: &Document, schema: &Schema) -> Result<(), IndexError> {
        let now = chrono::Utc::now().timestamp();
        let mut tx = self.pool.begin().await?;
        delete_file_rows(&mut tx, &doc.file_path).await?;

        for object in &doc.objects {
            let existing: Option<String> =
                sqlx::query_scalar("SELECT file_path FROM objects WHERE id = ?")
                    .bind(&object.id)
                    .fetch_optional(&mut *tx)
                    .await?;
            if let Some(first_path) = existing {
                return Err(IndexError::DuplicateId {
                    id: object.id.clone(),
                    first_path,
                    second_path: doc.file_path.clone(),
                });
            }

            if let Some(alias) = &object.alias {
                let holder: Option<String> =
                    sqlx::query_scalar("SELECT id FROM objects WHERE alias = ? LIMIT 1")
                        .bind(alias)
                        .fetch_optional(&mut *tx)
                        .await?;
                if let Some(first) = holder {
                    return Err(IndexError::AliasConflict {
                        alias: alias.clone(),
                        first,
                        second: object.id.clone(),
                    });
                }
            }

            insert_object(&mut tx, doc, object, now).await?;
        }

        for (n, parsed) in doc.traits.iter().enumerate() {
            let Some(def) = schema.trait_def(&parsed.trait_type) else {
                continue;
            };
            let id = format!("{}:trait:{}", doc.file_path, n);
            let value = def.effective_value(parsed.value.as_deref());

            sqlx::query(
                r#"
                INSERT INTO traits (id, file_path, parent_object_id, trait_type, value, content, line_number, indexed_at)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&id)
            .bind(&doc.file_path)
            .bind(&parsed.parent_object_id)
            .bind(&parsed.trait_type)
            .bind(&value)
            .bind(&parsed.content)
            .bind(parsed.line as i64)
            .bind(now)
            .execute(&mut *tx)
            .await?;

            if let Some(date) = value.as_deref().and_then(dates::date_prefix) {
                insert_date(&mut tx, date, "trait", &id, &parsed.trait_type, &doc.file_path).await?;
            }
        }

        let field_refs = field_refs(doc, schema);
        for reference in doc.refs.iter().chain(field_refs.iter()) {
            sqlx::query(
                r#"
                INSERT INTO refs (source_id, target_raw, display_text, file_path, line_number, position_start, position_end)
                VALUES (?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&reference.source_id)
            .bind(&reference.target_raw)
            .bind(&reference.display_text)
            .bind(&doc.file_path)
            .bind(reference.line as i64)
            .bind(reference.start as i64)
            .bind(reference.end as i64)
            .execute(&mut *tx)
            .await?;
        }

        sqlx::query(
            "INSERT INTO files (file_path, content_hash, indexed_at) VALUES (?, ?, ?) \
             ON CONFLICT(file_path) DO UPDATE SET content_hash = excluded.content_hash, \
             indexed_at = excluded.indexed_at",
        )
        .bind(&doc.file_path)
        .bind(content_hash(&doc.content))
        .bind(now)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    /// Removes every row of the file defining `id` (its base ID when `id`
    /// names a section). Returns that file's path.
    pub async fn remove_document(&self, id: &str) -> Result<String, IndexError> {
        let base = crate::paths::base_id(id);
        let file_path: Option<String> = sqlx::query_scalar(
            "SELECT file_path FROM objects WHERE id = ? OR id LIKE ? ESCAPE '\\' LIMIT 1",
        )
        .bind(base)
        .bind(format!("{}#%", escape_like(base)))
        .fetch_optional(&self.pool)
        .await?;
        let Some(file_path) = file_path else {
            return Err(IndexError::ObjectNotFound(id.to_string()));
        };

        self.remove_file(&file_path).await?;
        Ok(file_path)
    }

    /// Removes every row for `file_path`. Removing an unknown path is a no-op.
    pub async fn remove_file(&self, file_path: &str) -> Result<(), IndexError> {
        let mut tx = self.pool.begin().await?;
        delete_file_rows(&mut tx, file_path).await?;
        sqlx::query("DELETE FROM files WHERE file_path = ?")
            .bind(file_path)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }

    /// Stored content hash for `file_path`, if indexed.
    pub async fn file_hash(&self, file_path: &str) -> Result<Option<String>, IndexError> {
        let hash = sqlx::query_scalar("SELECT content_hash FROM files WHERE file_path = ?")
            .bind(file_path)
            .fetch_optional(&self.pool)
            .await?;
        Ok(hash)
    }

    /// Every indexed file path, sorted.
    pub async fn indexed_files(&self) -> Result<Vec<String>, IndexError> {
        let paths = sqlx::query_scalar("SELECT file_path FROM files ORDER BY file_path")
            .fetch_all(&self.pool)
            .await?;
        Ok(paths)
    }
}

/// SHA-256 of a file's text, hex encoded.
pub fn content_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())
}

async fn delete_file_rows(conn: &mut SqliteConnection, file_path: &str) -> Result<(), sqlx::Error> {
    for table in FILE_TABLES {
        let sql = format!("DELETE FROM {table} WHERE file_path = ?");
        sqlx::query(&sql).bind(file_path).execute(&mut *conn).await?;
    }
    Ok(())
}

async fn insert_object(
    conn: &mut SqliteConnection,
    doc: &Document,
    object: &ParsedObject,
    now: i64,
) -> Result<(), IndexError> {
    let fields: serde_json::Map<String, serde_json::Value> = object
        .fields
        .iter()
        .map(|(k, v)| (k.clone(), v.to_json()))
        .collect();
    let fields = serde_json::Value::Object(fields).to_string();
    let tags = serde_json::Value::from(object.tags.clone()).to_string();

    sqlx::query(
        r#"
        INSERT INTO objects (id, file_path, type, heading, heading_level, fields, tags,
                             line_start, line_end, parent_id, alias, indexed_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&object.id)
    .bind(&doc.file_path)
    .bind(&object.type_name)
    .bind(&object.heading)
    .bind(object.heading_level.map(i64::from))
    .bind(&fields)
    .bind(&tags)
    .bind(object.line_start as i64)
    .bind(object.line_end.map(|l| l as i64))
    .bind(&object.parent_id)
    .bind(&object.alias)
    .bind(now)
    .execute(&mut *conn)
    .await?;

    for (name, value) in &object.fields {
        for date in field_dates(value) {
            insert_date(conn, date, "object", &object.id, name, &doc.file_path).await?;
        }
    }

    let title = match object.fields.get("title") {
        Some(FieldValue::String(t)) if !t.trim().is_empty() => t.clone(),
        _ => object.heading.clone().unwrap_or_else(|| object.id.clone()),
    };
    sqlx::query(
        "INSERT INTO fts_content (object_id, title, content, file_path) VALUES (?, ?, ?, ?)",
    )
    .bind(&object.id)
    .bind(&title)
    .bind(doc.object_text(object))
    .bind(&doc.file_path)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

async fn insert_date(
    conn: &mut SqliteConnection,
    date: &str,
    source_type: &str,
    source_id: &str,
    field_name: &str,
    file_path: &str,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT OR REPLACE INTO date_index (date, source_type, source_id, field_name, file_path) \
         VALUES (?, ?, ?, ?, ?)",
    )
    .bind(date)
    .bind(source_type)
    .bind(source_id)
    .bind(field_name)
    .bind(file_path)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

fn field_dates(value: &FieldValue) -> Vec<&str> {
    match value {
        FieldValue::Date(s) | FieldValue::String(s) => dates::date_prefix(s).into_iter().collect(),
        FieldValue::Array(items) => items.iter().flat_map(field_dates).collect(),
        _ => Vec::new(),
    }
}

/// References held by `ref` / `ref[]` fields that were written without
/// brackets, which the parser cannot tell apart from plain strings.
fn field_refs(doc: &Document, schema: &Schema) -> Vec<ParsedRef> {
    let mut out: Vec<ParsedRef> = Vec::new();
    for object in &doc.objects {
        for field in schema.ref_fields(&object.type_name) {
            let Some(value) = object.fields.get(field) else {
                continue;
            };
            let targets: Vec<&str> = match value {
                FieldValue::Array(items) => items.iter().filter_map(ref_target).collect(),
                other => ref_target(other).into_iter().collect(),
            };
            let line = if object.parent_id.is_none() {
                frontmatter_key_line(doc, field).unwrap_or(1)
            } else {
                object.decl_line.unwrap_or(object.line_start)
            };
            for target in targets {
                let seen = doc
                    .refs
                    .iter()
                    .chain(out.iter())
                    .any(|r| {
                        // frontmatter keys are told apart by line so each one gets rewritten
                        r.source_id == object.id
                            && r.target_raw == target
                            && (object.parent_id.is_some() || r.line == line)
                    });
                if seen {
                    continue;
                }
                out.push(ParsedRef {
                    source_id: object.id.clone(),
                    target_raw: target.to_string(),
                    display_text: None,
                    line,
                    start: 0,
                    end: 0,
                });
            }
        }
    }
    out
}

fn ref_target(value: &FieldValue) -> Option<&str> {
    match value {
        FieldValue::Ref(t) | FieldValue::String(t) => Some(t.trim()).filter(|t| !t.is_empty()),
        _ => None,
    }
}

fn frontmatter_key_line(doc: &Document, key: &str) -> Option<usize> {
    let prefix = format!("{key}:");
    doc.content
        .lines()
        .enumerate()
        .take(doc.frontmatter_end)
        .skip(1)
        .find(|(_, line)| line.starts_with(&prefix))
        .map(|(idx, _)| idx + 1)
}

/// Escapes `%`, `_` and `\` for a `LIKE ... ESCAPE '\'` pattern.
fn escape_like(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}
