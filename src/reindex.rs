//! Vault reindexing: scan → parse → index → resolve.
//!
//! Incremental runs compare each file's SHA-256 with the hash stored in the
//! `files` table and skip files that have not changed; `full` runs reindex
//! everything. Files that disappeared from disk are dropped from the index.
//! A reference-resolution pass over the whole `refs` table always runs
//! last, from a single resolver snapshot.
//!
//! Per-file problems (unreadable, unparsable, duplicate IDs, alias
//! conflicts) become report items; storage failures abort the run.

use anyhow::{Context, Result};
use std::collections::HashSet;
use tracing::{debug, info, warn};

use crate::config::VaultConfig;
use crate::error::IndexError;
use crate::index::{content_hash, VaultIndex};
use crate::models::ResolutionStats;
use crate::parser;
use crate::report::{BatchReport, Reason};
use crate::schema::Schema;
use crate::vault;

#[derive(Debug)]
pub struct ReindexOutcome {
    pub report: BatchReport,
    pub resolution: ResolutionStats,
}

pub async fn reindex_vault(
    config: &VaultConfig,
    schema: &Schema,
    index: &VaultIndex,
    full: bool,
) -> Result<ReindexOutcome> {
    let files = vault::scan_vault(config)?;
    let roots = config.roots();
    let mut report = BatchReport::new();

    let on_disk: HashSet<&str> = files.iter().map(|f| f.rel_path.as_str()).collect();
    for path in index.indexed_files().await? {
        if !on_disk.contains(path.as_str()) {
            index
                .remove_file(&path)
                .await
                .with_context(|| format!("Failed to drop {path} from the index"))?;
            debug!(file = %path, "removed deleted file");
            report.applied(path, Reason::Removed);
        }
    }

    for file in &files {
        let rel = file.rel_path.as_str();
        let content = match std::fs::read_to_string(&file.abs_path) {
            Ok(content) => content,
            Err(err) => {
                warn!(file = %rel, error = %err, "skipping unreadable file");
                report.error(rel, Reason::ReadFailed, err.to_string());
                continue;
            }
        };

        let hash = content_hash(&content);
        if !full && index.file_hash(rel).await?.as_deref() == Some(hash.as_str()) {
            report.skipped(rel, Reason::Unchanged, None);
            continue;
        }

        let doc = match parser::parse_document(&content, rel, &roots) {
            Ok(doc) => doc,
            Err(err) => {
                warn!(file = %rel, error = %err, "skipping unparsable file");
                // stale rows would outlive the broken edit otherwise
                index.remove_file(rel).await?;
                report.error(rel, Reason::ParseError, err.to_string());
                continue;
            }
        };

        match index.index_document(&doc, schema).await {
            Ok(()) => {
                debug!(file = %rel, objects = doc.objects.len(), "indexed");
                report.applied(rel, Reason::Indexed);
            }
            Err(err @ IndexError::Storage(_)) => {
                return Err(err).with_context(|| format!("Failed to index {rel}"));
            }
            Err(err) => {
                warn!(file = %rel, error = %err, "file not indexed");
                report.error(rel, Reason::IndexFailed, err.to_string());
            }
        }
    }

    let resolution = resolve_all(config, schema, index).await?;
    info!(
        files = files.len(),
        summary = %report.summary,
        resolved = resolution.resolved,
        unresolved = resolution.unresolved,
        ambiguous = resolution.ambiguous,
        "reindex complete"
    );
    Ok(ReindexOutcome { report, resolution })
}

/// Reindexes one vault-relative file, or drops it from the index when it no
/// longer exists.
pub async fn reindex_file(
    config: &VaultConfig,
    schema: &Schema,
    index: &VaultIndex,
    rel_path: &str,
) -> Result<()> {
    let abs = config.root.join(rel_path);
    if !abs.is_file() {
        index.remove_file(rel_path).await?;
        return Ok(());
    }
    let content = std::fs::read_to_string(&abs)
        .with_context(|| format!("Failed to read {}", abs.display()))?;
    let doc = parser::parse_document(&content, rel_path, &config.roots())?;
    index
        .index_document(&doc, schema)
        .await
        .with_context(|| format!("Failed to index {rel_path}"))?;
    debug!(file = %rel_path, "reindexed");
    Ok(())
}

/// Resolves every stored reference against the current index.
pub async fn resolve_all(
    config: &VaultConfig,
    schema: &Schema,
    index: &VaultIndex,
) -> Result<ResolutionStats> {
    let resolver = index
        .resolver(schema, config.resolver_options())
        .await
        .context("Failed to build resolver snapshot")?;
    Ok(index.resolve_references(&resolver).await?)
}
