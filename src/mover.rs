//! # Moving objects
//!
//! A move renames an object's file and rewrites every reference to it so
//! the vault keeps resolving the same way afterwards.
//!
//! 1. **Plan**: resolve each source, derive the destination ID and path,
//!    reject clashes. Every decision in a batch comes from one resolver
//!    snapshot taken before anything is touched, with all destinations
//!    injected and all sources excluded.
//! 2. **Rewrite**: for each backlink, in file then line order, rewrite the
//!    recorded line (falling back to the whole file).
//! 3. **Rename** the file, creating parent directories.
//! 4. **Reindex**: drop the source, index the destination and every
//!    rewritten file, then re-resolve all references.
//!
//! Failures are per item: a backlink that cannot be rewritten becomes an
//! error entry and the move still completes.

use anyhow::{Context, Result};
use std::collections::{BTreeSet, HashMap};
use tracing::{debug, info, warn};

use crate::config::{VaultConfig, CONFIG_FILE};
use crate::error::RewriteError;
use crate::index::VaultIndex;
use crate::models::Backlink;
use crate::paths::{self, Roots};
use crate::reindex;
use crate::report::{BatchReport, ItemStatus, Reason};
use crate::resolver::{Resolver, ResolverOptions};
use crate::rewrite;
use crate::schema::Schema;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MoveRequest {
    /// Reference to the object being moved, in any resolvable form.
    pub source: String,
    /// New object ID or vault-relative path, with or without `.md`.
    pub destination: String,
}

impl MoveRequest {
    pub fn new(source: impl Into<String>, destination: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            destination: destination.into(),
        }
    }
}

/// Parses a batch file: one `source destination` pair per line, blank
/// lines and `#` comments ignored.
pub fn parse_batch(content: &str) -> Result<Vec<MoveRequest>> {
    let mut out = Vec::new();
    for (idx, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let mut parts = line.split_whitespace();
        match (parts.next(), parts.next(), parts.next()) {
            (Some(source), Some(destination), None) => {
                out.push(MoveRequest::new(source, destination))
            }
            _ => anyhow::bail!(
                "Line {}: expected '<source> <destination>', got '{line}'",
                idx + 1
            ),
        }
    }
    Ok(out)
}

#[derive(Debug, Clone)]
struct PlannedMove {
    request: MoveRequest,
    source_id: String,
    source_path: String,
    dest_id: String,
    dest_path: String,
    /// Collected before the batch mutates anything.
    backlinks: Vec<Backlink>,
}

pub async fn move_object(
    config: &VaultConfig,
    schema: &Schema,
    index: &VaultIndex,
    source: &str,
    destination: &str,
) -> Result<BatchReport> {
    move_many(config, schema, index, &[MoveRequest::new(source, destination)]).await
}

/// Runs `moves` in order against one pre-batch snapshot.
pub async fn move_many(
    config: &VaultConfig,
    schema: &Schema,
    index: &VaultIndex,
    moves: &[MoveRequest],
) -> Result<BatchReport> {
    let roots = config.roots();
    let ids = index.all_object_ids().await?;
    let aliases = index
        .all_aliases(&config.alias_map())
        .await
        .context("Failed to load aliases")?;
    let name_fields = index
        .name_field_values(&schema.name_fields())
        .await
        .context("Failed to load display names")?;
    let lookup = Resolver::new(
        ids.iter().cloned(),
        ResolverOptions {
            aliases: aliases.clone(),
            name_fields: name_fields.clone(),
            ..config.resolver_options()
        },
    );

    let mut report = BatchReport::new();
    let mut planned: Vec<PlannedMove> = Vec::new();
    for request in moves {
        match plan(config, index, &roots, &lookup, &planned, request).await? {
            Ok(planned_move) => planned.push(planned_move),
            Err((reason, detail)) => {
                warn!(source = %request.source, %reason, %detail, "move rejected");
                report.error(request.source.clone(), reason, detail);
            }
        }
    }

    let snapshot = Resolver::new(
        ids,
        ResolverOptions {
            aliases,
            name_fields,
            extra_ids: planned.iter().map(|m| m.dest_id.clone()).collect(),
            exclude_ids: planned.iter().map(|m| m.source_id.clone()).collect(),
            ..config.resolver_options()
        },
    );

    for planned_move in planned.iter_mut() {
        planned_move.backlinks = index
            .backlinks_with_roots(&planned_move.source_id, &roots.objects, &roots.pages)
            .await
            .with_context(|| {
                format!("Failed to collect backlinks of {}", planned_move.source_id)
            })?;
    }

    // files moved by earlier pairs, old path -> new path
    let mut moved: HashMap<String, String> = HashMap::new();
    let mut config = config.clone();
    for planned_move in &planned {
        let renamed = execute(
            &config,
            schema,
            index,
            &roots,
            &snapshot,
            &moved,
            planned_move,
            &mut report,
        )
        .await?;
        if renamed {
            moved.insert(planned_move.source_path.clone(), planned_move.dest_path.clone());
            retarget_aliases(&mut config, planned_move, &mut report);
        }
    }

    if !planned.is_empty() {
        let stats = reindex::resolve_all(&config, schema, index).await?;
        info!(
            moves = planned.len(),
            summary = %report.summary,
            unresolved = stats.unresolved,
            "move batch complete"
        );
    }
    Ok(report)
}

type Rejection = (Reason, String);

async fn plan(
    config: &VaultConfig,
    index: &VaultIndex,
    roots: &Roots,
    lookup: &Resolver,
    planned: &[PlannedMove],
    request: &MoveRequest,
) -> Result<Result<PlannedMove, Rejection>> {
    let resolution = lookup.resolve(&request.source);
    if resolution.ambiguous {
        return Ok(Err((
            Reason::Ambiguous,
            format!("matches {}", resolution.candidates.join(", ")),
        )));
    }
    let Some(source_id) = resolution.target_id else {
        return Ok(Err((Reason::NotFound, format!("'{}' does not resolve", request.source))));
    };
    if paths::is_embedded(&source_id) {
        return Ok(Err((
            Reason::InvalidDestination,
            format!("'{source_id}' is an embedded object and has no file of its own"),
        )));
    }
    let Some(record) = index.get_object(&source_id).await? else {
        return Ok(Err((Reason::NotFound, format!("'{source_id}' is not indexed"))));
    };
    if !config.root.join(&record.file_path).is_file() {
        return Ok(Err((Reason::NotFound, format!("{} is missing on disk", record.file_path))));
    }

    let Some(dest_id) = destination_id(roots, &request.destination) else {
        return Ok(Err((
            Reason::InvalidDestination,
            format!("'{}' is not a valid object ID", request.destination),
        )));
    };
    if dest_id == source_id {
        return Ok(Err((
            Reason::InvalidDestination,
            "destination is the source".to_string(),
        )));
    }
    let dest_path = roots.path_for_id(&dest_id, &record.type_name);
    let claimed = planned
        .iter()
        .any(|m| m.dest_id == dest_id || m.dest_path == dest_path);
    if claimed || lookup.contains(&dest_id) || config.root.join(&dest_path).exists() {
        return Ok(Err((
            Reason::DestinationExists,
            format!("'{dest_id}' already exists"),
        )));
    }
    if planned.iter().any(|m| m.source_id == source_id) {
        return Ok(Err((
            Reason::InvalidDestination,
            format!("'{source_id}' is already moved earlier in this batch"),
        )));
    }

    Ok(Ok(PlannedMove {
        request: request.clone(),
        source_id,
        source_path: record.file_path,
        dest_id,
        dest_path,
        backlinks: Vec::new(),
    }))
}

/// Canonical ID for a user-supplied destination, or `None` when it cannot
/// name a file object.
fn destination_id(roots: &Roots, raw: &str) -> Option<String> {
    let raw = raw.trim().replace('\\', "/");
    let raw = raw.trim_matches('/');
    let raw = raw.strip_suffix(".md").unwrap_or(raw);
    if raw.is_empty() || raw.contains('#') || raw.split('/').any(|s| s.is_empty() || s == "..") {
        return None;
    }
    Some(roots.id_for_path(&format!("{raw}.md")))
}

/// Carries out one planned move; `false` when the file was not renamed.
#[allow(clippy::too_many_arguments)]
async fn execute(
    config: &VaultConfig,
    schema: &Schema,
    index: &VaultIndex,
    roots: &Roots,
    snapshot: &Resolver,
    moved: &HashMap<String, String>,
    planned: &PlannedMove,
    report: &mut BatchReport,
) -> Result<bool> {
    let PlannedMove {
        source_id,
        source_path,
        dest_id,
        dest_path,
        backlinks,
        ..
    } = planned;
    let replacements = rewrite::plan_replacements(
        source_id,
        dest_id,
        backlinks.iter().map(|b| b.target_raw.as_str()),
        roots,
        snapshot,
    );
    let kept_aliases = snapshot.aliases_for(source_id);
    debug!(
        source = %source_id,
        dest = %dest_id,
        backlinks = backlinks.len(),
        replacements = replacements.len(),
        "rewriting references"
    );

    let mut touched: BTreeSet<String> = BTreeSet::new();
    let mut rewritable: Vec<&Backlink> = Vec::new();
    for backlink in backlinks {
        let written = paths::base_id(&backlink.target_raw);
        if kept_aliases.contains(&written) {
            report.skipped(backlink_item_id(backlink), Reason::AliasKept, None);
        } else if snapshot.is_name_of(written, source_id) {
            // the name field moves with the file
            report.skipped(backlink_item_id(backlink), Reason::NameKept, None);
        } else {
            rewritable.push(backlink);
        }
    }

    // one rewrite per line: it covers every reference written there
    for group in rewritable.chunk_by(|a, b| a.file_path == b.file_path && a.line == b.line) {
        let first = group[0];
        let file_path = moved.get(&first.file_path).unwrap_or(&first.file_path);
        let abs = config.root.join(file_path);
        let line = first.line.and_then(|l| usize::try_from(l).ok());
        match rewrite::rewrite_file(&abs, line, &replacements) {
            Ok(Some(done)) => {
                touched.insert(file_path.clone());
                let spellings: Vec<String> = done
                    .spellings
                    .iter()
                    .map(|s| format!("{s:?}"))
                    .collect();
                for backlink in group {
                    report.push(
                        backlink_item_id(backlink),
                        ItemStatus::Applied,
                        Reason::Applied,
                        Some(spellings.join(", ")),
                    );
                }
            }
            Ok(None) => {
                for backlink in group {
                    report.skipped(backlink_item_id(backlink), Reason::Unchanged, None);
                }
            }
            Err(err) => {
                warn!(file = %file_path, error = %err, "backlink not rewritten");
                let reason = match err {
                    RewriteError::Read { .. } => Reason::ReadFailed,
                    RewriteError::Write { .. } => Reason::WriteFailed,
                };
                for backlink in group {
                    report.error(backlink_item_id(backlink), reason, err.to_string());
                }
            }
        }
    }

    let from = config.root.join(source_path);
    let to = config.root.join(dest_path);
    if let Err(err) = rename(&from, &to) {
        warn!(source = %source_id, error = %err, "rename failed");
        report.error(source_id.clone(), Reason::WriteFailed, format!("{err:#}"));
        reindex_touched(config, schema, index, &touched, report).await?;
        return Ok(false);
    }

    if let Err(err) = index.remove_document(source_id).await {
        if err.is_not_found() {
            warn!(source = %source_id, "source was already gone from the index");
        } else {
            return Err(err).context("Failed to drop the moved object from the index");
        }
    }
    touched.remove(source_path);
    touched.insert(dest_path.clone());
    reindex_touched(config, schema, index, &touched, report).await?;

    info!(source = %source_id, dest = %dest_id, "moved");
    report.push(
        planned.request.source.clone(),
        ItemStatus::Applied,
        Reason::Applied,
        Some(format!("moved to {dest_id}")),
    );
    Ok(true)
}

/// Keeps `raven.toml` aliases of a moved object pointing at it, so
/// references written as the alias still resolve.
fn retarget_aliases(config: &mut VaultConfig, planned: &PlannedMove, report: &mut BatchReport) {
    match config.retarget_aliases(&planned.source_id, &planned.dest_id) {
        Ok(aliases) => {
            for alias in aliases {
                debug!(%alias, dest = %planned.dest_id, "alias retargeted");
                report.push(
                    format!("{CONFIG_FILE}:{alias}"),
                    ItemStatus::Applied,
                    Reason::Applied,
                    Some(format!("alias now targets {}", planned.dest_id)),
                );
            }
        }
        Err(err) => {
            warn!(
                source = %planned.source_id,
                error = %format!("{err:#}"),
                "alias not retargeted"
            );
            report.error(CONFIG_FILE, Reason::WriteFailed, format!("{err:#}"));
        }
    }
}

fn rename(from: &std::path::Path, to: &std::path::Path) -> Result<()> {
    if let Some(parent) = to.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    std::fs::rename(from, to)
        .with_context(|| format!("Failed to rename {} to {}", from.display(), to.display()))
}

async fn reindex_touched(
    config: &VaultConfig,
    schema: &Schema,
    index: &VaultIndex,
    touched: &BTreeSet<String>,
    report: &mut BatchReport,
) -> Result<()> {
    for path in touched {
        if let Err(err) = reindex::reindex_file(config, schema, index, path).await {
            warn!(file = %path, error = %format!("{err:#}"), "reindex after move failed");
            report.error(path.clone(), Reason::IndexFailed, format!("{err:#}"));
        }
    }
    Ok(())
}

fn backlink_item_id(backlink: &Backlink) -> String {
    match backlink.line {
        Some(line) => format!("{}:{line}", backlink.file_path),
        None => backlink.file_path.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reindex::tests::{test_vault, test_vault_with_config, TestVault};

    fn sources(backlinks: &[Backlink]) -> BTreeSet<String> {
        backlinks.iter().map(|b| b.source_id.clone()).collect()
    }

    async fn mv(v: &TestVault, source: &str, dest: &str) -> BatchReport {
        move_object(&v.config, &v.schema, &v.index, source, dest)
            .await
            .unwrap()
    }

    #[test]
    fn test_parse_batch() {
        let batch = parse_batch("# moves\npeople/tido person/tido\n\n  a b  \n").unwrap();
        assert_eq!(
            batch,
            vec![
                MoveRequest::new("people/tido", "person/tido"),
                MoveRequest::new("a", "b")
            ]
        );
        assert!(parse_batch("only-one\n").is_err());
        assert!(parse_batch("a b c\n").is_err());
    }

    #[test]
    fn test_destination_id() {
        let roots = Roots::new("objects", "");
        assert_eq!(destination_id(&roots, "people/x.md").as_deref(), Some("people/x"));
        assert_eq!(destination_id(&roots, "objects/people/x").as_deref(), Some("people/x"));
        assert_eq!(destination_id(&roots, "/x/").as_deref(), Some("x"));
        assert!(destination_id(&roots, "").is_none());
        assert!(destination_id(&roots, "a#b").is_none());
        assert!(destination_id(&roots, "../x").is_none());
    }

    #[tokio::test]
    async fn test_move_keeps_backlink_sources() {
        let v = test_vault(&[
            ("x/old.md", "# Old\n\n## Notes\n"),
            ("a.md", "See [[x/old]] and [[x/old#notes|the notes]].\n"),
            ("b.md", "Also [[old]].\n"),
            ("c.md", "```\n[[x/old]]\n```\n"),
        ])
        .await;
        let before = sources(&v.index.backlinks("x/old").await.unwrap());
        assert_eq!(before, BTreeSet::from(["a".to_string(), "b".to_string()]));

        let report = mv(&v, "x/old", "x/new").await;
        assert!(!report.has_errors(), "{report:?}");

        assert!(!v.path("x/old.md").exists());
        assert!(v.path("x/new.md").exists());
        assert_eq!(
            v.read("a.md"),
            "See [[x/new]] and [[x/new#notes|the notes]].\n"
        );
        assert_eq!(v.read("b.md"), "Also [[new]].\n");
        assert_eq!(v.read("c.md"), "```\n[[x/old]]\n```\n");

        assert_eq!(sources(&v.index.backlinks("x/new").await.unwrap()), before);
        assert!(v.index.backlinks("x/old").await.unwrap().is_empty());
        assert!(v.index.get_object("x/old").await.unwrap().is_none());
        assert!(v.index.get_object("x/new#notes").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_references_sharing_a_line_are_all_applied() {
        let v = test_vault(&[
            ("x/old.md", "# Old\n"),
            ("a.md", "See [[x/old]] and [[x/old|again]].\n"),
        ])
        .await;
        let report = mv(&v, "x/old", "x/new").await;

        assert_eq!(v.read("a.md"), "See [[x/new]] and [[x/new|again]].\n");
        let items: Vec<(&str, ItemStatus, Reason)> = report
            .items
            .iter()
            .map(|i| (i.id.as_str(), i.status, i.reason))
            .collect();
        assert_eq!(
            items,
            vec![
                ("a.md:1", ItemStatus::Applied, Reason::Applied),
                ("a.md:1", ItemStatus::Applied, Reason::Applied),
                ("x/old", ItemStatus::Applied, Reason::Applied),
            ]
        );
        assert_eq!(report.summary.skipped, 0);
    }

    #[tokio::test]
    async fn test_move_rewrites_frontmatter_refs() {
        let v = test_vault(&[
            ("people/tido.md", "---\ntype: person\n---\n"),
            ("people/thor.md", "---\ntype: person\n---\n"),
            (
                "projects/p.md",
                "---\ntype: project\nowner: people/tido\nmembers: [people/tido, \"people/thor\"]\n---\n",
            ),
        ])
        .await;

        let report = mv(&v, "people/tido", "person/tido").await;
        assert!(!report.has_errors(), "{report:?}");
        assert_eq!(
            v.read("projects/p.md"),
            "---\ntype: project\nowner: person/tido\nmembers: [person/tido, \"people/thor\"]\n---\n"
        );
        let backlinks = v.index.backlinks("person/tido").await.unwrap();
        assert_eq!(backlinks.len(), 2);
        assert!(backlinks
            .iter()
            .all(|b| b.target_id.as_deref() == Some("person/tido")));
    }

    #[tokio::test]
    async fn test_short_form_becomes_full_when_ambiguous() {
        let v = test_vault(&[
            ("people/tido.md", "---\ntype: person\n---\n"),
            ("notes/odin.md", "odin notes\n"),
            ("a.md", "[[tido]]\n"),
        ])
        .await;
        mv(&v, "tido", "archive/odin").await;
        assert_eq!(v.read("a.md"), "[[archive/odin]]\n");
    }

    #[tokio::test]
    async fn test_alias_references_are_kept() {
        let v = test_vault(&[
            ("people/tido.md", "---\ntype: person\nalias: Boss\n---\n"),
            ("a.md", "[[Boss]] and [[people/tido]]\n"),
        ])
        .await;
        let report = mv(&v, "people/tido", "person/tido").await;

        assert_eq!(v.read("a.md"), "[[Boss]] and [[person/tido]]\n");
        assert!(report
            .items
            .iter()
            .any(|i| i.reason == Reason::AliasKept));
        let boss = v.index.backlinks("person/tido").await.unwrap();
        assert_eq!(boss.len(), 2);
    }

    #[tokio::test]
    async fn test_display_name_references_are_kept() {
        let v = test_vault(&[
            ("people/tido.md", "---\ntype: person\nname: Tido Smith\n---\n"),
            ("a.md", "[[Tido Smith]] and [[people/tido]]\n"),
        ])
        .await;
        let report = mv(&v, "people/tido", "person/tido").await;

        assert_eq!(v.read("a.md"), "[[Tido Smith]] and [[person/tido]]\n");
        assert!(report
            .items
            .iter()
            .any(|i| i.id == "a.md:1" && i.reason == Reason::NameKept));
        let links = v.index.backlinks("person/tido").await.unwrap();
        assert_eq!(links.len(), 2);
        assert!(links
            .iter()
            .all(|b| b.target_id.as_deref() == Some("person/tido")));
    }

    #[tokio::test]
    async fn test_config_alias_follows_the_move() {
        let v = test_vault_with_config(
            &[
                ("people/tido.md", "---\ntype: person\n---\n"),
                ("a.md", "[[Boss]]\n"),
            ],
            Some("[aliases]\nBoss = \"people/tido\"\n"),
        )
        .await;
        let before = sources(&v.index.backlinks("people/tido").await.unwrap());
        assert_eq!(before, BTreeSet::from(["a".to_string()]));

        let report = mv(&v, "people/tido", "person/tido").await;
        assert!(!report.has_errors(), "{report:?}");

        assert_eq!(v.read("a.md"), "[[Boss]]\n");
        assert_eq!(v.read("raven.toml"), "[aliases]\n\"Boss\" = \"person/tido\"\n");
        assert!(report
            .items
            .iter()
            .any(|i| i.id == "raven.toml:Boss" && i.status == ItemStatus::Applied));
        assert_eq!(sources(&v.index.backlinks("person/tido").await.unwrap()), before);

        let reloaded = crate::config::load_vault_config(v.tmp.path()).unwrap();
        let resolver = v
            .index
            .resolver(&v.schema, reloaded.resolver_options())
            .await
            .unwrap();
        assert_eq!(resolver.resolve("Boss").target_id.as_deref(), Some("person/tido"));
    }

    #[tokio::test]
    async fn test_invalid_moves_are_reported() {
        let v = test_vault(&[
            ("people/tido.md", "---\ntype: person\n---\n"),
            ("people/thor.md", "---\ntype: person\n---\n"),
            ("a/dup.md", "a\n"),
            ("b/dup.md", "b\n"),
        ])
        .await;
        let report = move_many(
            &v.config,
            &v.schema,
            &v.index,
            &[
                MoveRequest::new("people/tido", "people/thor"),
                MoveRequest::new("nobody", "x"),
                MoveRequest::new("dup", "x"),
                MoveRequest::new("people/tido", "people/tido"),
            ],
        )
        .await
        .unwrap();
        let reasons: Vec<Reason> = report.items.iter().map(|i| i.reason).collect();
        assert_eq!(
            reasons,
            vec![
                Reason::DestinationExists,
                Reason::NotFound,
                Reason::Ambiguous,
                Reason::InvalidDestination
            ]
        );
        assert_eq!(report.summary.errors, 4);
        assert!(v.path("people/tido.md").exists());
    }

    #[tokio::test]
    async fn test_batch_moves_share_one_snapshot() {
        let v = test_vault(&[
            ("people/tido.md", "---\ntype: person\n---\n"),
            ("people/thor.md", "---\ntype: person\n---\n"),
            ("a.md", "[[tido]] [[thor]]\n"),
        ])
        .await;
        let report = move_many(
            &v.config,
            &v.schema,
            &v.index,
            &[
                MoveRequest::new("tido", "team/tido"),
                MoveRequest::new("thor", "team/thor"),
            ],
        )
        .await
        .unwrap();
        assert!(!report.has_errors(), "{report:?}");
        assert_eq!(v.read("a.md"), "[[tido]] [[thor]]\n");
        let stats = v.index.stats().await.unwrap();
        assert_eq!(stats.unresolved_refs, 0);
        assert_eq!(
            v.index.backlinks("team/thor").await.unwrap()[0].target_id.as_deref(),
            Some("team/thor")
        );
    }
}
