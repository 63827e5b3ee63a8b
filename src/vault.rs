//! Markdown discovery under the vault root.

use anyhow::{bail, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::path::PathBuf;
use walkdir::WalkDir;

use crate::config::VaultConfig;

/// Directories never indexed, on top of `index.exclude_globs`.
const DEFAULT_EXCLUDES: [&str; 4] = [
    "**/.git/**",
    "**/.raven/**",
    "**/.trash/**",
    "**/node_modules/**",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VaultFile {
    /// Vault-relative, forward slashes.
    pub rel_path: String,
    pub abs_path: PathBuf,
}

/// Every `.md` file in the vault, sorted by relative path.
pub fn scan_vault(config: &VaultConfig) -> Result<Vec<VaultFile>> {
    let root = &config.root;
    if !root.is_dir() {
        bail!("Vault root does not exist: {}", root.display());
    }

    let include_set = build_globset(&["**/*.md".to_string()])?;
    let mut excludes: Vec<String> = DEFAULT_EXCLUDES.iter().map(|s| s.to_string()).collect();
    excludes.extend(config.index.exclude_globs.clone());
    let exclude_set = build_globset(&excludes)?;

    let mut files = Vec::new();
    for entry in WalkDir::new(root).follow_links(false) {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let relative = path.strip_prefix(root).unwrap_or(path);
        let rel_str = relative.to_string_lossy().replace('\\', "/");

        if exclude_set.is_match(&rel_str) || !include_set.is_match(&rel_str) {
            continue;
        }

        files.push(VaultFile {
            rel_path: rel_str,
            abs_path: path.to_path_buf(),
        });
    }

    files.sort_by(|a, b| a.rel_path.cmp(&b.rel_path));
    Ok(files)
}

/// First existing file a reference could name, literal path first.
pub fn find_file(config: &VaultConfig, reference: &str) -> Option<String> {
    config
        .roots()
        .candidate_paths(reference)
        .into_iter()
        .find(|candidate| config.root.join(candidate).is_file())
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}
