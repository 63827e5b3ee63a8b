use chrono::NaiveDate;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use std::collections::{BTreeMap, HashMap};

use super::{escape_like, filter, fts, VaultIndex};
use crate::dates;
use crate::error::IndexError;
use crate::models::{Backlink, DateEntry, IndexStats, ObjectRecord, ResolutionStats, SearchHit, TraitRecord};
use crate::paths::Roots;
use crate::resolver::{Resolver, ResolverOptions};
use crate::schema::{FieldValue, Schema};

const OBJECT_COLUMNS: &str =
    "id, file_path, type, heading, heading_level, fields, tags, line_start, line_end, parent_id, alias";

const DEFAULT_SEARCH_LIMIT: i64 = 20;

impl VaultIndex {
    pub async fn get_object(&self, id: &str) -> Result<Option<ObjectRecord>, IndexError> {
        let sql = format!("SELECT {OBJECT_COLUMNS} FROM objects WHERE id = ?");
        let row = sqlx::query(&sql).bind(id).fetch_optional(&self.pool).await?;
        row.as_ref().map(object_from_row).transpose()
    }

    /// Objects of one type, ordered by ID.
    pub async fn query_objects(&self, type_name: &str) -> Result<Vec<ObjectRecord>, IndexError> {
        let sql = format!("SELECT {OBJECT_COLUMNS} FROM objects WHERE type = ? ORDER BY id");
        let rows = sqlx::query(&sql).bind(type_name).fetch_all(&self.pool).await?;
        rows.iter().map(object_from_row).collect()
    }

    /// Traits of one type, optionally filtered by value (see
    /// [`filter::value_condition`]), ordered by file, line, then ID.
    pub async fn query_traits(
        &self,
        trait_type: &str,
        value_filter: Option<&str>,
    ) -> Result<Vec<TraitRecord>, IndexError> {
        self.query_traits_as_of(trait_type, value_filter, dates::today())
            .await
    }

    /// [`VaultIndex::query_traits`] with date words resolved against `today`.
    pub async fn query_traits_as_of(
        &self,
        trait_type: &str,
        value_filter: Option<&str>,
        today: NaiveDate,
    ) -> Result<Vec<TraitRecord>, IndexError> {
        let mut sql = String::from(
            "SELECT id, trait_type, value, content, file_path, line_number, parent_object_id \
             FROM traits WHERE trait_type = ?",
        );
        let mut args = Vec::new();
        if let Some(f) = value_filter.filter(|f| !f.trim().is_empty()) {
            let condition = filter::value_condition(f, "value", today)?;
            sql.push_str(" AND ");
            sql.push_str(&condition.sql);
            args = condition.args;
        }
        sql.push_str(" ORDER BY file_path, line_number, id");

        let mut query = sqlx::query(&sql).bind(trait_type);
        for arg in &args {
            query = query.bind(arg);
        }
        let rows = query.fetch_all(&self.pool).await?;

        Ok(rows
            .iter()
            .map(|row| TraitRecord {
                id: row.get("id"),
                trait_type: row.get("trait_type"),
                value: row.get("value"),
                content: row.get("content"),
                file_path: row.get("file_path"),
                line: row.get("line_number"),
                parent_object_id: row.get("parent_object_id"),
            })
            .collect())
    }

    /// Everything dated `date`: object fields first, then traits, each in
    /// file order. Accepts the relative date words.
    pub async fn query_date_index(&self, date: &str) -> Result<Vec<DateEntry>, IndexError> {
        self.query_date_index_as_of(date, dates::today()).await
    }

    pub async fn query_date_index_as_of(
        &self,
        date: &str,
        today: NaiveDate,
    ) -> Result<Vec<DateEntry>, IndexError> {
        let date = dates::normalize_date(date, today)
            .ok_or_else(|| IndexError::InvalidDate(date.to_string()))?;
        let rows = sqlx::query(
            "SELECT date, source_type, source_id, field_name, file_path FROM date_index \
             WHERE date = ? ORDER BY source_type, file_path, source_id, field_name",
        )
        .bind(&date)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| DateEntry {
                date: row.get("date"),
                source_type: row.get("source_type"),
                source_id: row.get("source_id"),
                field_name: row.get("field_name"),
                file_path: row.get("file_path"),
            })
            .collect())
    }

    /// Full-text search over object text, best match first.
    pub async fn search(&self, query: &str, limit: i64) -> Result<Vec<SearchHit>, IndexError> {
        if query.trim().is_empty() {
            return Ok(Vec::new());
        }
        let rows = sqlx::query(
            r#"
            SELECT object_id, title, file_path,
                   snippet(fts_content, 2, '»', '«', '...', 32) AS snippet,
                   bm25(fts_content) AS rank
            FROM fts_content
            WHERE fts_content MATCH ?
            ORDER BY rank
            LIMIT ?
            "#,
        )
        .bind(fts::content_query(query))
        .bind(effective_limit(limit))
        .fetch_all(&self.pool)
        .await
        .map_err(|err| search_error(query, err))?;
        Ok(rows.iter().map(hit_from_row).collect())
    }

    pub async fn search_with_type(
        &self,
        query: &str,
        type_name: &str,
        limit: i64,
    ) -> Result<Vec<SearchHit>, IndexError> {
        if query.trim().is_empty() {
            return Ok(Vec::new());
        }
        let rows = sqlx::query(
            r#"
            SELECT f.object_id, f.title, f.file_path,
                   snippet(fts_content, 2, '»', '«', '...', 32) AS snippet,
                   bm25(fts_content) AS rank
            FROM fts_content f
            JOIN objects o ON f.object_id = o.id
            WHERE fts_content MATCH ? AND o.type = ?
            ORDER BY rank
            LIMIT ?
            "#,
        )
        .bind(fts::content_query(query))
        .bind(type_name)
        .bind(effective_limit(limit))
        .fetch_all(&self.pool)
        .await
        .map_err(|err| search_error(query, err))?;
        Ok(rows.iter().map(hit_from_row).collect())
    }

    /// References pointing at `target_id` or one of its sections.
    pub async fn backlinks(&self, target_id: &str) -> Result<Vec<Backlink>, IndexError> {
        self.backlinks_with_roots(target_id, "", "").await
    }

    /// [`VaultIndex::backlinks`], also matching references written with the
    /// object or page root in front (`objects/people/freya`).
    pub async fn backlinks_with_roots(
        &self,
        target_id: &str,
        object_root: &str,
        page_root: &str,
    ) -> Result<Vec<Backlink>, IndexError> {
        let spellings = Roots::new(object_root, page_root).spellings(target_id);
        let condition = vec![
            "(r.target_raw = ? OR r.target_raw LIKE ? ESCAPE '\\' \
             OR r.target_id = ? OR r.target_id LIKE ? ESCAPE '\\')";
            spellings.len()
        ]
        .join(" OR ");
        let sql = format!(
            "SELECT r.source_id, o.type AS source_type, r.target_raw, r.target_id, \
                    r.display_text, r.file_path, r.line_number \
             FROM refs r LEFT JOIN objects o ON r.source_id = o.id \
             WHERE {condition} \
             ORDER BY r.file_path, r.line_number, r.id"
        );

        let mut query = sqlx::query(&sql);
        for spelling in &spellings {
            let fragments = format!("{}#%", escape_like(spelling));
            query = query
                .bind(spelling)
                .bind(fragments.clone())
                .bind(spelling)
                .bind(fragments);
        }
        let rows = query.fetch_all(&self.pool).await?;

        Ok(rows
            .iter()
            .map(|row| Backlink {
                source_id: row.get("source_id"),
                source_type: row.get("source_type"),
                target_raw: row.get("target_raw"),
                target_id: row.get("target_id"),
                display_text: row.get("display_text"),
                file_path: row.get("file_path"),
                line: row.get("line_number"),
            })
            .collect())
    }

    pub async fn all_object_ids(&self) -> Result<Vec<String>, IndexError> {
        let ids = sqlx::query_scalar("SELECT id FROM objects ORDER BY id")
            .fetch_all(&self.pool)
            .await?;
        Ok(ids)
    }

    /// Object ID → type, for ref target type checks.
    pub async fn object_types(&self) -> Result<HashMap<String, String>, IndexError> {
        let rows: Vec<(String, String)> = sqlx::query_as("SELECT id, type FROM objects")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().collect())
    }

    /// Frontmatter `alias:` values merged with `config_aliases`.
    ///
    /// The same alias claimed for two different objects, from either
    /// source, is an [`IndexError::AliasConflict`].
    pub async fn all_aliases(
        &self,
        config_aliases: &HashMap<String, String>,
    ) -> Result<HashMap<String, String>, IndexError> {
        let rows: Vec<(String, String)> = sqlx::query_as(
            "SELECT alias, id FROM objects WHERE alias IS NOT NULL AND alias != '' ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await?;

        let config: BTreeMap<&String, &String> = config_aliases.iter().collect();
        let mut aliases: HashMap<String, String> = HashMap::new();
        let claims = rows
            .into_iter()
            .chain(config.into_iter().map(|(a, id)| (a.clone(), id.clone())));
        for (alias, id) in claims {
            match aliases.get(&alias) {
                Some(first) if *first != id => {
                    return Err(IndexError::AliasConflict {
                        alias,
                        first: first.clone(),
                        second: id,
                    });
                }
                Some(_) => {}
                None => {
                    aliases.insert(alias, id);
                }
            }
        }
        Ok(aliases)
    }

    /// Display names for resolution: each object's `name_field` value
    /// (per `name_fields`, type → field) mapped to the IDs carrying it.
    /// Non-string values are skipped.
    pub async fn name_field_values(
        &self,
        name_fields: &BTreeMap<&str, &str>,
    ) -> Result<HashMap<String, Vec<String>>, IndexError> {
        let mut names: HashMap<String, Vec<String>> = HashMap::new();
        for (&type_name, &field) in name_fields {
            let rows: Vec<(String, String)> = sqlx::query_as(
                "SELECT id, json_extract(fields, ?1) FROM objects \
                 WHERE type = ?2 AND json_type(fields, ?1) = 'text' ORDER BY id",
            )
            .bind(json_path(field))
            .bind(type_name)
            .fetch_all(&self.pool)
            .await?;
            for (id, name) in rows {
                if !name.trim().is_empty() {
                    names.entry(name).or_default().push(id);
                }
            }
        }
        Ok(names)
    }

    /// Builds a resolver over the current IDs, aliases and display names.
    /// `options.aliases` carries the config aliases and is merged with
    /// frontmatter ones.
    pub async fn resolver(
        &self,
        schema: &Schema,
        options: ResolverOptions,
    ) -> Result<Resolver, IndexError> {
        let ids = self.all_object_ids().await?;
        let aliases = self.all_aliases(&options.aliases).await?;
        let name_fields = self.name_field_values(&schema.name_fields()).await?;
        Ok(Resolver::new(
            ids,
            ResolverOptions {
                aliases,
                name_fields,
                ..options
            },
        ))
    }

    /// Sets `refs.target_id` for every reference from one snapshot.
    /// Ambiguous and dangling references get `NULL`.
    pub async fn resolve_references(
        &self,
        resolver: &Resolver,
    ) -> Result<ResolutionStats, IndexError> {
        let refs: Vec<(i64, String)> = sqlx::query_as("SELECT id, target_raw FROM refs ORDER BY id")
            .fetch_all(&self.pool)
            .await?;

        let mut stats = ResolutionStats::default();
        let mut tx = self.pool.begin().await?;
        for (id, raw) in refs {
            let resolution = resolver.resolve(&raw);
            if resolution.ambiguous {
                stats.ambiguous += 1;
            } else if resolution.target_id.is_some() {
                stats.resolved += 1;
            } else {
                stats.unresolved += 1;
            }
            sqlx::query("UPDATE refs SET target_id = ? WHERE id = ?")
                .bind(&resolution.target_id)
                .bind(id)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(stats)
    }

    /// Number of `type_name` objects whose stored fields carry `field`.
    pub async fn count_objects_with_field(
        &self,
        type_name: &str,
        field: &str,
    ) -> Result<i64, IndexError> {
        let count = sqlx::query_scalar(
            "SELECT COUNT(*) FROM objects WHERE type = ? AND json_extract(fields, ?) IS NOT NULL",
        )
        .bind(type_name)
        .bind(json_path(field))
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    pub async fn stats(&self) -> Result<IndexStats, IndexError> {
        let count = |sql: &'static str| sqlx::query_scalar::<_, i64>(sql).fetch_one(&self.pool);
        Ok(IndexStats {
            files: count("SELECT COUNT(*) FROM files").await?,
            objects: count("SELECT COUNT(*) FROM objects").await?,
            traits: count("SELECT COUNT(*) FROM traits").await?,
            refs: count("SELECT COUNT(*) FROM refs").await?,
            unresolved_refs: count("SELECT COUNT(*) FROM refs WHERE target_id IS NULL").await?,
        })
    }
}

/// FTS5 rejects some input at query time; that is the caller's query, not
/// a broken index.
fn search_error(query: &str, err: sqlx::Error) -> IndexError {
    match &err {
        sqlx::Error::Database(db) if db.message().starts_with("fts5:") => {
            IndexError::InvalidQuery {
                query: query.to_string(),
                message: db.message().to_string(),
            }
        }
        _ => IndexError::Storage(err),
    }
}

fn json_path(field: &str) -> String {
    format!("$.\"{}\"", field.replace('"', "\\\""))
}

fn effective_limit(limit: i64) -> i64 {
    if limit <= 0 {
        DEFAULT_SEARCH_LIMIT
    } else {
        limit
    }
}

fn hit_from_row(row: &SqliteRow) -> SearchHit {
    SearchHit {
        object_id: row.get("object_id"),
        title: row.get("title"),
        file_path: row.get("file_path"),
        snippet: row.get("snippet"),
        rank: row.get("rank"),
    }
}

fn object_from_row(row: &SqliteRow) -> Result<ObjectRecord, IndexError> {
    let id: String = row.get("id");
    let fields_json: String = row.get("fields");
    let fields: serde_json::Map<String, serde_json::Value> = serde_json::from_str(&fields_json)
        .map_err(|source| IndexError::CorruptFields {
            id: id.clone(),
            source,
        })?;
    let tags_json: String = row.get("tags");
    let tags: Vec<String> =
        serde_json::from_str(&tags_json).map_err(|source| IndexError::CorruptFields {
            id: id.clone(),
            source,
        })?;

    Ok(ObjectRecord {
        type_name: row.get("type"),
        file_path: row.get("file_path"),
        heading: row.get("heading"),
        heading_level: row.get("heading_level"),
        fields: fields
            .iter()
            .map(|(k, v)| (k.clone(), FieldValue::from_json(v)))
            .collect(),
        tags,
        line_start: row.get("line_start"),
        line_end: row.get("line_end"),
        parent_id: row.get("parent_id"),
        alias: row.get("alias"),
        id,
    })
}
