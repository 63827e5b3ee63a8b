//! # Raven
//!
//! A plain-text knowledge base: a directory of Markdown files (the vault)
//! carrying typed objects, inline traits and `[[wiki-style]]` references,
//! validated against a YAML schema and indexed in SQLite for search,
//! backlinks and structured queries.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────┐   ┌──────────┐   ┌──────────────┐
//! │ Markdown   │──▶│  Parser  │──▶│ Vault index  │
//! │ vault      │   │ + Schema │   │ SQLite+FTS5  │
//! └─────▲──────┘   └──────────┘   └──────┬───────┘
//!       │                                │
//!       │        ┌──────────┐   ┌────────▼───────┐
//!       └────────│ Rewrite  │◀──│   Resolver     │
//!                │ (move)   │   │  (snapshot)    │
//!                └──────────┘   └────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! rvn init                       # schema.yaml, raven.toml, .raven/index.db
//! rvn reindex                    # index changed files, resolve references
//! rvn search "launch plan"
//! rvn backlinks freya
//! rvn traits due --value "<today"
//! rvn set website status=done
//! rvn move people/tido person/tido
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`parser`] | Markdown file → objects, traits, references |
//! | [`schema`] | Schema loading and field validation |
//! | [`index`] | SQLite index: objects, traits, refs, dates, FTS |
//! | [`resolver`] | Reference → canonical object ID |
//! | [`rewrite`] | Reference rewriting for moves |
//! | [`mover`] | Move / rename orchestration |
//! | [`reindex`] | Vault scan and incremental reindex |
//! | [`fields`] | Validated frontmatter edits |
//! | [`check`] | Vault-wide validation |
//! | [`commands`] | `rvn` subcommand handlers |
//! | [`config`] | `raven.toml` parsing |
//! | [`db`] | Database connection |
//! | [`migrate`] | Index tables |

pub mod atomic;
pub mod check;
pub mod commands;
pub mod config;
pub mod dates;
pub mod db;
pub mod error;
pub mod fields;
pub mod index;
pub mod migrate;
pub mod models;
pub mod mover;
pub mod parser;
pub mod paths;
pub mod reindex;
pub mod report;
pub mod resolver;
pub mod rewrite;
pub mod schema;
pub mod vault;
