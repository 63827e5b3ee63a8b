//! Vault configuration, read from `raven.toml` at the vault root.
//!
//! Every key is optional; a vault without the file gets the defaults below.
//!
//! ```toml
//! daily_directory = "daily"
//!
//! [directories]
//! object = "objects"
//! page = "pages"
//!
//! [aliases]
//! "The Queen" = "people/freya"
//!
//! [index]
//! path = ".raven/index.db"
//! exclude_globs = ["archive/**"]
//!
//! [search]
//! default_limit = 20
//!
//! [backlinks]
//! include_self = true
//! ```

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::{Path, PathBuf};

use crate::atomic;
use crate::paths::{self, Roots};
use crate::resolver::ResolverOptions;

pub const CONFIG_FILE: &str = "raven.toml";

pub const STARTER_CONFIG: &str = r#"daily_directory = "daily"

[directories]
# object = "objects"
# page = "pages"

[aliases]
"#;

#[derive(Debug, Deserialize, Clone)]
pub struct VaultConfig {
    #[serde(default = "default_daily_directory")]
    pub daily_directory: String,
    #[serde(default)]
    pub directories: DirectoriesConfig,
    #[serde(default)]
    pub aliases: BTreeMap<String, String>,
    #[serde(default)]
    pub index: IndexConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub backlinks: BacklinksConfig,
    /// Vault root the config was loaded for; not read from the file.
    #[serde(skip)]
    pub root: PathBuf,
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            daily_directory: default_daily_directory(),
            directories: DirectoriesConfig::default(),
            aliases: BTreeMap::new(),
            index: IndexConfig::default(),
            search: SearchConfig::default(),
            backlinks: BacklinksConfig::default(),
            root: PathBuf::from("."),
        }
    }
}

fn default_daily_directory() -> String {
    "daily".to_string()
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct DirectoriesConfig {
    #[serde(default)]
    pub object: String,
    #[serde(default)]
    pub page: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct IndexConfig {
    #[serde(default = "default_index_path")]
    pub path: PathBuf,
    #[serde(default)]
    pub exclude_globs: Vec<String>,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            path: default_index_path(),
            exclude_globs: Vec::new(),
        }
    }
}

fn default_index_path() -> PathBuf {
    PathBuf::from(".raven/index.db")
}

#[derive(Debug, Deserialize, Clone)]
pub struct SearchConfig {
    #[serde(default = "default_search_limit")]
    pub default_limit: i64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            default_limit: default_search_limit(),
        }
    }
}

fn default_search_limit() -> i64 {
    20
}

#[derive(Debug, Deserialize, Clone)]
pub struct BacklinksConfig {
    /// Whether an object's links to itself (or its own sections) are listed.
    #[serde(default = "default_true")]
    pub include_self: bool,
}

impl Default for BacklinksConfig {
    fn default() -> Self {
        Self { include_self: true }
    }
}

fn default_true() -> bool {
    true
}

impl VaultConfig {
    pub fn roots(&self) -> Roots {
        Roots::new(&self.directories.object, &self.directories.page)
    }

    /// Absolute (or vault-joined) path of the SQLite index.
    pub fn db_path(&self) -> PathBuf {
        if self.index.path.is_absolute() {
            self.index.path.clone()
        } else {
            self.root.join(&self.index.path)
        }
    }

    /// Aliases with trimmed keys and targets.
    pub fn alias_map(&self) -> HashMap<String, String> {
        self.aliases
            .iter()
            .map(|(alias, target)| (alias.trim().to_string(), target.trim().to_string()))
            .collect()
    }

    /// Resolver settings for this vault; aliases are the config ones only.
    pub fn resolver_options(&self) -> ResolverOptions {
        ResolverOptions {
            daily_directory: self.daily_directory.clone(),
            roots: self.roots(),
            aliases: self.alias_map(),
            ..Default::default()
        }
    }
}

impl VaultConfig {
    /// Points every config alias that targets `from` (or one of its
    /// sections) at `to`, here and in `raven.toml`. Returns the aliases
    /// that changed.
    pub fn retarget_aliases(&mut self, from: &str, to: &str) -> Result<Vec<String>> {
        let roots = self.roots();
        let mut changes: BTreeMap<String, String> = BTreeMap::new();
        for (alias, target) in &self.aliases {
            let (base, fragment) = paths::split_fragment(roots.strip(target.trim()));
            if base == from {
                let target = match fragment {
                    Some(fragment) => format!("{to}#{fragment}"),
                    None => to.to_string(),
                };
                changes.insert(alias.clone(), target);
            }
        }
        if changes.is_empty() {
            return Ok(Vec::new());
        }

        let path = self.root.join(CONFIG_FILE);
        if path.exists() {
            let content = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            let (updated, missed) = retarget_alias_lines(&content, &changes);
            if let Some(alias) = missed.first() {
                bail!(
                    "alias '{}' in {} is not a line of the [aliases] table; update it by hand",
                    alias,
                    path.display()
                );
            }
            atomic::write_file(&path, updated.as_bytes())
                .with_context(|| format!("Failed to write config file: {}", path.display()))?;
        }

        for (alias, target) in &changes {
            self.aliases.insert(alias.clone(), target.clone());
        }
        Ok(changes.into_keys().collect())
    }
}

/// Rewrites `alias = "target"` lines under `[aliases]`, keeping every
/// other line as is. Also returns the aliases no line was found for.
fn retarget_alias_lines(
    content: &str,
    changes: &BTreeMap<String, String>,
) -> (String, Vec<String>) {
    let mut out = String::with_capacity(content.len());
    let mut pending: BTreeSet<&str> = changes.keys().map(String::as_str).collect();
    let mut in_aliases = false;

    for line in content.split_inclusive('\n') {
        let body = line.trim_end_matches(['\r', '\n']);
        let ending = &line[body.len()..];
        let trimmed = body.trim();
        if trimmed.starts_with('[') {
            in_aliases = trimmed == "[aliases]";
            out.push_str(line);
            continue;
        }
        if in_aliases {
            let entry = toml::from_str::<toml::Table>(trimmed).ok();
            let retarget = entry.as_ref().and_then(|entry| match entry.iter().next() {
                Some((alias, toml::Value::String(_))) if entry.len() == 1 => {
                    changes.get(alias).map(|target| (alias, target))
                }
                _ => None,
            });
            if let Some((alias, target)) = retarget {
                let indent = &body[..body.len() - body.trim_start().len()];
                out.push_str(&format!(
                    "{indent}{} = {}{ending}",
                    toml::Value::String(alias.clone()),
                    toml::Value::String(target.clone())
                ));
                pending.remove(alias.as_str());
                continue;
            }
        }
        out.push_str(line);
    }
    (out, pending.into_iter().map(str::to_string).collect())
}

/// Loads `<vault_root>/raven.toml`, falling back to defaults when absent.
pub fn load_vault_config(vault_root: &Path) -> Result<VaultConfig> {
    let path = vault_root.join(CONFIG_FILE);
    let mut config: VaultConfig = if path.exists() {
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?
    } else {
        VaultConfig::default()
    };
    config.root = vault_root.to_path_buf();

    validate(&config)?;
    Ok(config)
}

fn validate(config: &VaultConfig) -> Result<()> {
    if config.daily_directory.trim_matches('/').is_empty() {
        anyhow::bail!("daily_directory must not be empty");
    }

    if config.search.default_limit < 1 {
        anyhow::bail!("search.default_limit must be >= 1");
    }

    // Two keys that normalize to the same spelling would make lookups depend
    // on map order.
    let mut seen: HashMap<String, &str> = HashMap::new();
    for (alias, target) in &config.aliases {
        let normalized = alias.trim();
        if normalized.is_empty() {
            anyhow::bail!("aliases: alias for '{}' is empty", target);
        }
        if target.trim().is_empty() {
            anyhow::bail!("aliases: alias '{}' has an empty target", alias);
        }
        if let Some(previous) = seen.insert(normalized.to_string(), alias.as_str()) {
            anyhow::bail!(
                "aliases: '{}' and '{}' are the same alias once trimmed",
                previous,
                alias
            );
        }
    }

    for pattern in &config.index.exclude_globs {
        globset::Glob::new(pattern)
            .with_context(|| format!("index.exclude_globs: invalid pattern '{}'", pattern))?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_uses_defaults() {
        let tmp = TempDir::new().unwrap();
        let config = load_vault_config(tmp.path()).unwrap();
        assert_eq!(config.daily_directory, "daily");
        assert_eq!(config.search.default_limit, 20);
        assert!(config.backlinks.include_self);
        assert_eq!(config.db_path(), tmp.path().join(".raven/index.db"));
        assert_eq!(config.roots(), Roots::default());
    }

    #[test]
    fn test_full_config() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(
            tmp.path().join(CONFIG_FILE),
            r#"
daily_directory = "journal"

[directories]
object = "objects/"
page = "/pages"

[aliases]
"The Queen" = "people/freya"

[index]
exclude_globs = ["archive/**"]

[backlinks]
include_self = false
"#,
        )
        .unwrap();
        let config = load_vault_config(tmp.path()).unwrap();
        assert_eq!(config.daily_directory, "journal");
        assert_eq!(config.roots(), Roots::new("objects", "pages"));
        assert_eq!(config.alias_map()["The Queen"], "people/freya");
        assert_eq!(config.index.exclude_globs, vec!["archive/**"]);
        assert!(!config.backlinks.include_self);
    }

    #[test]
    fn test_alias_collision_rejected() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(
            tmp.path().join(CONFIG_FILE),
            "[aliases]\n\"queen\" = \"people/freya\"\n\"queen \" = \"people/frigg\"\n",
        )
        .unwrap();
        let err = load_vault_config(tmp.path()).unwrap_err();
        assert!(err.to_string().contains("same alias"), "{err}");
    }

    #[test]
    fn test_invalid_values_rejected() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join(CONFIG_FILE), "[search]\ndefault_limit = 0\n").unwrap();
        assert!(load_vault_config(tmp.path()).is_err());

        std::fs::write(tmp.path().join(CONFIG_FILE), "[aliases]\nqueen = \"\"\n").unwrap();
        assert!(load_vault_config(tmp.path()).is_err());

        std::fs::write(tmp.path().join(CONFIG_FILE), "daily_directory = 3\n").unwrap();
        assert!(load_vault_config(tmp.path()).is_err());
    }

    #[test]
    fn test_retarget_aliases_rewrites_only_matching_lines() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(
            tmp.path().join(CONFIG_FILE),
            "daily_directory = \"daily\"\n\n[aliases]\n# people\nBoss = \"people/tido\"\n\"The Plan\" = \"people/tido#plan\"\nQueen = \"people/freya\"\n",
        )
        .unwrap();
        let mut config = load_vault_config(tmp.path()).unwrap();

        let changed = config.retarget_aliases("people/tido", "person/tido").unwrap();
        assert_eq!(changed, vec!["Boss", "The Plan"]);
        assert_eq!(config.aliases["Boss"], "person/tido");
        assert_eq!(config.aliases["The Plan"], "person/tido#plan");

        let written = std::fs::read_to_string(tmp.path().join(CONFIG_FILE)).unwrap();
        assert_eq!(
            written,
            "daily_directory = \"daily\"\n\n[aliases]\n# people\n\"Boss\" = \"person/tido\"\n\"The Plan\" = \"person/tido#plan\"\nQueen = \"people/freya\"\n"
        );
        let reloaded = load_vault_config(tmp.path()).unwrap();
        assert_eq!(reloaded.aliases["Boss"], "person/tido");

        assert!(config.retarget_aliases("people/odin", "person/odin").unwrap().is_empty());
    }

    #[test]
    fn test_retarget_aliases_refuses_inline_tables() {
        let tmp = TempDir::new().unwrap();
        let content = "aliases = { Boss = \"people/tido\" }\n";
        std::fs::write(tmp.path().join(CONFIG_FILE), content).unwrap();
        let mut config = load_vault_config(tmp.path()).unwrap();

        assert!(config.retarget_aliases("people/tido", "person/tido").is_err());
        assert_eq!(config.aliases["Boss"], "people/tido");
        assert_eq!(
            std::fs::read_to_string(tmp.path().join(CONFIG_FILE)).unwrap(),
            content
        );
    }
}
