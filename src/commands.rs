//! Handlers behind the `rvn` subcommands.
//!
//! Each `run_*` function loads what it needs, opens the index, prints
//! either human-readable text or JSON (`--json`) to stdout and closes the
//! index again. Logging goes to stderr through `tracing`.

use anyhow::{bail, Context, Result};
use serde::Serialize;
use std::path::Path;

use crate::check;
use crate::config::{self, VaultConfig};
use crate::fields::{self, SetOutcome};
use crate::index::VaultIndex;
use crate::mover::{self, MoveRequest};
use crate::paths;
use crate::reindex;
use crate::report::BatchReport;
use crate::schema::{Schema, SCHEMA_FILE, STARTER_SCHEMA};

/// Everything a command needs: config, schema and an open index.
pub struct Session {
    pub config: VaultConfig,
    pub schema: Schema,
    pub index: VaultIndex,
}

impl Session {
    pub async fn open(vault_root: &Path) -> Result<Self> {
        let config = config::load_vault_config(vault_root)?;
        let schema = Schema::load(&config.root).context("Failed to load schema")?;
        let index = VaultIndex::open(&config.db_path())
            .await
            .with_context(|| format!("Failed to open index at {}", config.db_path().display()))?;
        Ok(Self {
            config,
            schema,
            index,
        })
    }

    pub async fn close(self) {
        self.index.close().await;
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn print_report(report: &BatchReport) {
    for item in &report.items {
        match &item.detail {
            Some(detail) => println!(
                "  {:<8} {} ({}: {})",
                item.status, item.id, item.reason, detail
            ),
            None => println!("  {:<8} {} ({})", item.status, item.id, item.reason),
        }
    }
    println!("{}", report.summary);
}

pub async fn run_init(vault_root: &Path) -> Result<()> {
    std::fs::create_dir_all(vault_root)
        .with_context(|| format!("Failed to create {}", vault_root.display()))?;
    for (name, content) in [
        (SCHEMA_FILE, STARTER_SCHEMA),
        (config::CONFIG_FILE, config::STARTER_CONFIG),
    ] {
        let path = vault_root.join(name);
        if path.exists() {
            println!("  kept {name}");
            continue;
        }
        std::fs::write(&path, content)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        println!("  wrote {name}");
    }

    let config = config::load_vault_config(vault_root)?;
    let index = VaultIndex::open(&config.db_path()).await?;
    index.close().await;
    println!("Vault initialized at {}", vault_root.display());
    Ok(())
}

pub async fn run_reindex(vault_root: &Path, full: bool, json: bool) -> Result<()> {
    let session = Session::open(vault_root).await?;
    let outcome =
        reindex::reindex_vault(&session.config, &session.schema, &session.index, full).await?;
    session.close().await;

    if json {
        #[derive(Serialize)]
        struct Output<'a> {
            report: &'a BatchReport,
            resolution: &'a crate::models::ResolutionStats,
        }
        return print_json(&Output {
            report: &outcome.report,
            resolution: &outcome.resolution,
        });
    }

    println!("reindex{}", if full { " (full)" } else { "" });
    for item in outcome.report.errors() {
        println!(
            "  error {} ({}: {})",
            item.id,
            item.reason,
            item.detail.as_deref().unwrap_or("")
        );
    }
    println!("  {}", outcome.report.summary);
    println!(
        "  references: {} resolved, {} unresolved, {} ambiguous",
        outcome.resolution.resolved, outcome.resolution.unresolved, outcome.resolution.ambiguous
    );
    println!("ok");
    Ok(())
}

pub async fn run_search(
    vault_root: &Path,
    query: &str,
    type_name: Option<&str>,
    limit: Option<i64>,
    json: bool,
) -> Result<()> {
    let session = Session::open(vault_root).await?;
    let limit = limit.unwrap_or(session.config.search.default_limit);
    let hits = match type_name {
        Some(t) => session.index.search_with_type(query, t, limit).await?,
        None => session.index.search(query, limit).await?,
    };
    session.close().await;

    if json {
        return print_json(&hits);
    }
    if hits.is_empty() {
        println!("No results.");
        return Ok(());
    }
    for (i, hit) in hits.iter().enumerate() {
        println!("{}. [{:.2}] {} ({})", i + 1, -hit.rank, hit.title, hit.object_id);
        println!("    {}", hit.snippet.replace('\n', " "));
    }
    Ok(())
}

pub async fn run_resolve(vault_root: &Path, reference: &str, json: bool) -> Result<()> {
    let session = Session::open(vault_root).await?;
    let resolver = session
        .index
        .resolver(&session.schema, session.config.resolver_options())
        .await?;
    session.close().await;
    let resolution = resolver.resolve(reference);

    if json {
        return print_json(&resolution);
    }
    match (&resolution.target_id, resolution.ambiguous) {
        (Some(id), _) => println!("{id}"),
        (None, true) => {
            println!("'{reference}' is ambiguous:");
            for candidate in &resolution.candidates {
                println!("  {candidate}");
            }
        }
        (None, false) => bail!("'{reference}' does not resolve to any object"),
    }
    Ok(())
}

pub async fn run_backlinks(vault_root: &Path, reference: &str, json: bool) -> Result<()> {
    let session = Session::open(vault_root).await?;
    let resolution = session
        .index
        .resolver(&session.schema, session.config.resolver_options())
        .await?
        .resolve(reference);
    if resolution.ambiguous {
        session.close().await;
        bail!(
            "'{reference}' is ambiguous: {}",
            resolution.candidates.join(", ")
        );
    }
    // dangling targets still have backlinks by their written name
    let target = resolution.target_id.unwrap_or_else(|| reference.to_string());
    let roots = session.config.roots();
    let mut backlinks = session
        .index
        .backlinks_with_roots(&target, &roots.objects, &roots.pages)
        .await?;
    if !session.config.backlinks.include_self {
        let base = paths::base_id(&target);
        backlinks.retain(|b| paths::base_id(&b.source_id) != base);
    }
    session.close().await;

    if json {
        return print_json(&backlinks);
    }
    if backlinks.is_empty() {
        println!("No backlinks to {target}.");
        return Ok(());
    }
    for b in &backlinks {
        let line = b.line.map(|l| format!(":{l}")).unwrap_or_default();
        println!("{}{}  {}  [[{}]]", b.file_path, line, b.source_id, b.target_raw);
    }
    Ok(())
}

pub async fn run_objects(vault_root: &Path, type_name: &str, json: bool) -> Result<()> {
    let session = Session::open(vault_root).await?;
    if !session.schema.has_type(type_name) {
        session.close().await;
        bail!("Unknown type '{type_name}'");
    }
    let objects = session.index.query_objects(type_name).await?;
    session.close().await;

    if json {
        return print_json(&objects);
    }
    for object in &objects {
        println!("{}  {}", object.id, object.file_path);
    }
    println!("{} {type_name} object(s)", objects.len());
    Ok(())
}

pub async fn run_traits(
    vault_root: &Path,
    name: &str,
    value: Option<&str>,
    json: bool,
) -> Result<()> {
    let session = Session::open(vault_root).await?;
    let traits = session.index.query_traits(name, value).await;
    session.close().await;
    let traits = traits?;

    if json {
        return print_json(&traits);
    }
    for t in &traits {
        let value = t.value.as_deref().map(|v| format!("({v})")).unwrap_or_default();
        println!("{}:{}  @{}{}  {}", t.file_path, t.line, t.trait_type, value, t.content);
    }
    println!("{} match(es)", traits.len());
    Ok(())
}

pub async fn run_dates(vault_root: &Path, date: &str, json: bool) -> Result<()> {
    let session = Session::open(vault_root).await?;
    let entries = session.index.query_date_index(date).await;
    session.close().await;
    let entries = entries?;

    if json {
        return print_json(&entries);
    }
    for e in &entries {
        println!("{}  {} {}.{}", e.file_path, e.source_type, e.source_id, e.field_name);
    }
    println!("{} dated item(s)", entries.len());
    Ok(())
}

pub async fn run_check(vault_root: &Path, json: bool) -> Result<()> {
    let session = Session::open(vault_root).await?;
    let issues = check::check_vault(&session.config, &session.schema, &session.index).await?;
    session.close().await;

    if json {
        print_json(&issues)?;
    } else {
        for issue in &issues {
            let subject = match (&issue.object_id, &issue.field) {
                (Some(id), Some(field)) => format!("{id}: {field}: "),
                (Some(id), None) => format!("{id}: "),
                _ => String::new(),
            };
            println!("{}:{}: {}{}", issue.file_path, issue.line, subject, issue.message);
        }
    }
    if !issues.is_empty() {
        bail!("{} problem(s) found", issues.len());
    }
    if !json {
        println!("ok");
    }
    Ok(())
}

pub async fn run_set(
    vault_root: &Path,
    reference: &str,
    assignments: &[String],
    json: bool,
) -> Result<()> {
    let updates = fields::parse_assignments(assignments)?;
    let session = Session::open(vault_root).await?;
    let outcome = fields::set_field(
        &session.config,
        &session.schema,
        &session.index,
        reference,
        &updates,
    )
    .await;
    session.close().await;
    let outcome = outcome?;

    if json {
        print_json(&outcome)?;
    }
    match outcome {
        SetOutcome::Applied { id, changed, .. } => {
            if !json {
                println!("{id}: {}", if changed { "updated" } else { "unchanged" });
            }
            Ok(())
        }
        SetOutcome::Rejected { id, errors } => {
            if !json {
                for error in &errors {
                    println!("  {error}");
                }
            }
            bail!("{id}: {} invalid field(s), nothing written", errors.len())
        }
    }
}

pub async fn run_move(
    vault_root: &Path,
    source: Option<&str>,
    destination: Option<&str>,
    batch: Option<&Path>,
    json: bool,
) -> Result<()> {
    let moves = match (batch, source, destination) {
        (Some(path), None, None) => {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read batch file {}", path.display()))?;
            mover::parse_batch(&content)?
        }
        (None, Some(source), Some(destination)) => vec![MoveRequest::new(source, destination)],
        _ => bail!("Give either <source> <destination> or --batch <file>"),
    };

    let session = Session::open(vault_root).await?;
    let report = mover::move_many(&session.config, &session.schema, &session.index, &moves).await;
    session.close().await;
    let report = report?;

    if json {
        print_json(&report)?;
    } else {
        print_report(&report);
    }
    if report.has_errors() {
        bail!("move finished with {} error(s)", report.summary.errors);
    }
    Ok(())
}

pub async fn run_stats(vault_root: &Path, json: bool) -> Result<()> {
    let session = Session::open(vault_root).await?;
    let stats = session.index.stats().await?;
    session.close().await;

    if json {
        return print_json(&stats);
    }
    println!("files:      {}", stats.files);
    println!("objects:    {}", stats.objects);
    println!("traits:     {}", stats.traits);
    println!("references: {} ({} unresolved)", stats.refs, stats.unresolved_refs);
    Ok(())
}
