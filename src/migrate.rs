use sqlx::SqlitePool;

use crate::error::IndexError;

pub const SCHEMA_VERSION: i64 = 1;

/// Creates every index table. Safe to run on an existing database.
pub async fn run_migrations(pool: &SqlitePool) -> Result<(), IndexError> {
    // Objects: file objects and embedded (section / declared) objects
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS objects (
            id TEXT PRIMARY KEY,
            file_path TEXT NOT NULL,
            type TEXT NOT NULL,
            heading TEXT,
            heading_level INTEGER,
            fields TEXT NOT NULL DEFAULT '{}',
            tags TEXT NOT NULL DEFAULT '[]',
            line_start INTEGER NOT NULL,
            line_end INTEGER,
            parent_id TEXT,
            alias TEXT,
            indexed_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS traits (
            id TEXT PRIMARY KEY,
            file_path TEXT NOT NULL,
            parent_object_id TEXT NOT NULL,
            trait_type TEXT NOT NULL,
            value TEXT,
            content TEXT NOT NULL,
            line_number INTEGER NOT NULL,
            indexed_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // References: adjacency list, target_id filled by the resolution pass
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS refs (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            source_id TEXT NOT NULL,
            target_id TEXT,
            target_raw TEXT NOT NULL,
            display_text TEXT,
            file_path TEXT NOT NULL,
            line_number INTEGER,
            position_start INTEGER,
            position_end INTEGER
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS date_index (
            date TEXT NOT NULL,
            source_type TEXT NOT NULL,
            source_id TEXT NOT NULL,
            field_name TEXT NOT NULL,
            file_path TEXT NOT NULL,
            PRIMARY KEY (date, source_type, source_id, field_name)
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Per-file content hashes for incremental reindex
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS files (
            file_path TEXT PRIMARY KEY,
            content_hash TEXT NOT NULL,
            indexed_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS meta (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // FTS5 CREATE is not idempotent natively, so we check first
    let fts_exists: bool = sqlx::query_scalar(
        "SELECT COUNT(*) > 0 FROM sqlite_master WHERE type='table' AND name='fts_content'",
    )
    .fetch_one(pool)
    .await?;

    if !fts_exists {
        sqlx::query(
            r#"
            CREATE VIRTUAL TABLE fts_content USING fts5(
                object_id UNINDEXED,
                title,
                content,
                file_path UNINDEXED,
                tokenize='porter unicode61'
            )
            "#,
        )
        .execute(pool)
        .await?;
    }

    let indexes = [
        "CREATE INDEX IF NOT EXISTS idx_objects_file_path ON objects(file_path)",
        "CREATE INDEX IF NOT EXISTS idx_objects_type ON objects(type)",
        "CREATE INDEX IF NOT EXISTS idx_objects_parent ON objects(parent_id)",
        "CREATE INDEX IF NOT EXISTS idx_traits_file_path ON traits(file_path)",
        "CREATE INDEX IF NOT EXISTS idx_traits_type ON traits(trait_type)",
        "CREATE INDEX IF NOT EXISTS idx_traits_type_value ON traits(trait_type, value)",
        "CREATE INDEX IF NOT EXISTS idx_refs_source ON refs(source_id)",
        "CREATE INDEX IF NOT EXISTS idx_refs_target ON refs(target_id)",
        "CREATE INDEX IF NOT EXISTS idx_refs_target_raw ON refs(target_raw)",
        "CREATE INDEX IF NOT EXISTS idx_refs_file_path ON refs(file_path)",
        "CREATE INDEX IF NOT EXISTS idx_date_index_file_path ON date_index(file_path)",
    ];
    for statement in indexes {
        sqlx::query(statement).execute(pool).await?;
    }

    sqlx::query(
        "INSERT INTO meta (key, value) VALUES ('schema_version', ?) \
         ON CONFLICT(key) DO UPDATE SET value = excluded.value",
    )
    .bind(SCHEMA_VERSION.to_string())
    .execute(pool)
    .await?;

    Ok(())
}
