//! # Raven CLI (`rvn`)
//!
//! ## Usage
//!
//! ```bash
//! rvn --vault ~/notes <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `rvn init` | Write a starter schema and config, create the index |
//! | `rvn reindex [--full]` | Index changed files and resolve references |
//! | `rvn search "<query>"` | Full-text search over objects |
//! | `rvn backlinks <ref>` | References pointing at an object |
//! | `rvn resolve <ref>` | Show what a reference resolves to |
//! | `rvn objects <type>` | List objects of a type |
//! | `rvn traits <name>` | List trait occurrences, optionally filtered by value |
//! | `rvn dates <date>` | Object fields and traits dated on a day |
//! | `rvn check` | Validate every file against the schema |
//! | `rvn set <ref> key=value...` | Edit frontmatter fields with validation |
//! | `rvn move <src> <dest>` | Move an object and rewrite references to it |
//! | `rvn stats` | Index counts |
//!
//! Every command accepts `--json` for machine-readable output on stdout.
//! Logs go to stderr; set `RUST_LOG` or pass `-v` for more.

use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use raven::commands;

/// Raven: typed Markdown notes with an SQLite index.
#[derive(Parser)]
#[command(
    name = "rvn",
    about = "Raven: typed Markdown notes with an SQLite index",
    version
)]
struct Cli {
    /// Vault root directory.
    #[arg(long, global = true, default_value = ".")]
    vault: PathBuf,

    /// Print machine-readable JSON instead of text.
    #[arg(long, global = true)]
    json: bool,

    /// More log output on stderr (`-v` info, `-vv` debug).
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create `schema.yaml` and `raven.toml` if absent, and the index.
    ///
    /// Existing files are left alone, so this is safe to re-run.
    Init,

    /// Reindex the vault.
    ///
    /// Only files whose content changed since the last run are parsed
    /// again; files removed from disk are dropped. References are resolved
    /// afterwards.
    Reindex {
        /// Reindex every file regardless of its stored hash.
        #[arg(long)]
        full: bool,
    },

    /// Full-text search.
    Search {
        /// Search terms; quoted phrases and trailing `*` prefixes work.
        query: String,

        /// Only objects of this type.
        #[arg(long = "type")]
        type_name: Option<String>,

        /// Maximum number of hits (default from `search.default_limit`).
        #[arg(long)]
        limit: Option<i64>,
    },

    /// List references to an object.
    Backlinks {
        /// Object reference: ID, short name, alias or date.
        reference: String,
    },

    /// Show what a reference resolves to.
    Resolve { reference: String },

    /// List objects of a type.
    Objects {
        #[arg(value_name = "TYPE")]
        type_name: String,
    },

    /// List trait occurrences.
    Traits {
        /// Trait name, without `@`.
        name: String,

        /// Value filter: `high`, `!low`, `a|b`, `<2025-03-01`, `<=today`.
        #[arg(long)]
        value: Option<String>,
    },

    /// List object fields and traits that carry a date.
    Dates {
        /// `YYYY-MM-DD`, `today`, `yesterday` or `tomorrow`.
        date: String,
    },

    /// Validate every file against the schema.
    Check,

    /// Set frontmatter fields on an object.
    ///
    /// Values use the inline declaration syntax: `42`, `true`,
    /// `[a, b]`, `[[people/freya]]`, `"quoted text"`. An empty value
    /// clears the field.
    Set {
        reference: String,

        /// `key=value` pairs.
        #[arg(required = true)]
        assignments: Vec<String>,
    },

    /// Move or rename an object, rewriting references to it.
    Move {
        source: Option<String>,
        destination: Option<String>,

        /// File with one `<source> <destination>` pair per line.
        #[arg(long, conflicts_with_all = ["source", "destination"])]
        batch: Option<PathBuf>,
    },

    /// Show index counts.
    Stats,
}

fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let vault = cli.vault.as_path();
    let json = cli.json;

    match cli.command {
        Commands::Init => commands::run_init(vault).await?,
        Commands::Reindex { full } => commands::run_reindex(vault, full, json).await?,
        Commands::Search {
            query,
            type_name,
            limit,
        } => commands::run_search(vault, &query, type_name.as_deref(), limit, json).await?,
        Commands::Backlinks { reference } => {
            commands::run_backlinks(vault, &reference, json).await?
        }
        Commands::Resolve { reference } => commands::run_resolve(vault, &reference, json).await?,
        Commands::Objects { type_name } => commands::run_objects(vault, &type_name, json).await?,
        Commands::Traits { name, value } => {
            commands::run_traits(vault, &name, value.as_deref(), json).await?
        }
        Commands::Dates { date } => commands::run_dates(vault, &date, json).await?,
        Commands::Check => commands::run_check(vault, json).await?,
        Commands::Set {
            reference,
            assignments,
        } => commands::run_set(vault, &reference, &assignments, json).await?,
        Commands::Move {
            source,
            destination,
            batch,
        } => {
            commands::run_move(
                vault,
                source.as_deref(),
                destination.as_deref(),
                batch.as_deref(),
                json,
            )
            .await?
        }
        Commands::Stats => commands::run_stats(vault, json).await?,
    }

    Ok(())
}
