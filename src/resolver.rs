//! # Reference resolution
//!
//! Maps a reference string as a user wrote it (`freya`, `people/freya`,
//! `objects/people/freya`, `The Queen`, `today`, `website#tasks`) to the
//! canonical object ID it denotes.
//!
//! A [`Resolver`] owns a snapshot of the vault's IDs and aliases and never
//! touches the index after construction, so every call made against one
//! snapshot answers consistently. Batches build one snapshot up front.
//!
//! | Input | Rule |
//! |-------|------|
//! | exact alias | the alias target |
//! | a type's `name_field` value | that object, case-insensitively |
//! | `today` / `yesterday` / `tomorrow` / `YYYY-MM-DD` | `<daily_dir>/<date>` |
//! | contains `/` | exact ID, then root-stripped, then `/`-suffix match |
//! | anything else | short name: final path segment, or section fragment |
//!
//! A trailing `#fragment` is split off before these rules and reattached
//! to the result. Name matches are candidates alongside the date, path
//! and short-name rules: one name and one other object make the reference
//! ambiguous.

use chrono::NaiveDate;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::dates;
use crate::paths::{self, Roots};
use crate::schema::RefTypes;

#[derive(Debug, Clone, Default)]
pub struct ResolverOptions {
    pub daily_directory: String,
    pub roots: Roots,
    /// Alias → canonical ID.
    pub aliases: HashMap<String, String>,
    /// `name_field` value → IDs of the objects carrying it.
    pub name_fields: HashMap<String, Vec<String>>,
    /// IDs that take part in resolution without being indexed yet, such as
    /// the destination of an in-flight move.
    pub extra_ids: Vec<String>,
    /// IDs left out of the snapshot, with their sections.
    pub exclude_ids: Vec<String>,
    /// Date the relative keywords resolve against; defaults to today.
    pub today: Option<NaiveDate>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Resolution {
    pub target_id: Option<String>,
    pub ambiguous: bool,
    pub candidates: Vec<String>,
}

impl Resolution {
    fn found(id: String) -> Self {
        Self {
            candidates: vec![id.clone()],
            target_id: Some(id),
            ambiguous: false,
        }
    }

    fn ambiguous(candidates: Vec<String>) -> Self {
        Self {
            target_id: None,
            ambiguous: true,
            candidates,
        }
    }

    pub fn is_resolved(&self) -> bool {
        self.target_id.is_some()
    }
}

/// Short names claimed by more than one object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Collision {
    pub short_name: String,
    pub ids: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct Resolver {
    ids: BTreeSet<String>,
    short_names: HashMap<String, Vec<String>>,
    aliases: HashMap<String, String>,
    /// Lowercased and slugified names → IDs.
    names: HashMap<String, BTreeSet<String>>,
    daily_directory: String,
    roots: Roots,
    today: NaiveDate,
}

impl Resolver {
    pub fn new(ids: impl IntoIterator<Item = String>, options: ResolverOptions) -> Self {
        let excluded = |id: &str| {
            options
                .exclude_ids
                .iter()
                .any(|ex| ex == id || paths::base_id(id) == ex)
        };
        let ids: BTreeSet<String> = ids
            .into_iter()
            .filter(|id| !excluded(id.as_str()))
            .chain(options.extra_ids.iter().cloned())
            .collect();

        let mut short_names: HashMap<String, Vec<String>> = HashMap::new();
        for id in &ids {
            short_names
                .entry(paths::short_name(id).to_string())
                .or_default()
                .push(id.clone());
        }

        let mut names: HashMap<String, BTreeSet<String>> = HashMap::new();
        for (name, targets) in &options.name_fields {
            let name = name.trim();
            if name.is_empty() {
                continue;
            }
            for key in [name.to_lowercase(), paths::slugify(name)] {
                if !key.is_empty() {
                    names.entry(key).or_default().extend(targets.iter().cloned());
                }
            }
        }

        Self {
            ids,
            short_names,
            aliases: options.aliases,
            names,
            daily_directory: match options.daily_directory.trim_matches('/') {
                "" => "daily".to_string(),
                dir => dir.to_string(),
            },
            roots: options.roots,
            today: options.today.unwrap_or_else(dates::today),
        }
    }

    pub fn contains(&self, id: &str) -> bool {
        self.ids.contains(id)
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.ids.iter().map(String::as_str)
    }

    /// Aliases whose target is `id`, sorted.
    pub fn aliases_for(&self, id: &str) -> Vec<&str> {
        let mut out: Vec<&str> = self
            .aliases
            .iter()
            .filter(|(_, target)| target.as_str() == id)
            .map(|(alias, _)| alias.as_str())
            .collect();
        out.sort_unstable();
        out
    }

    pub fn resolve(&self, reference: &str) -> Resolution {
        let reference = reference.trim();
        if reference.is_empty() {
            return Resolution::default();
        }
        if let Some(target) = self.aliases.get(reference) {
            return Resolution::found(target.clone());
        }

        let (base, fragment) = paths::split_fragment(reference);
        let base = base.trim();
        let base = base.strip_suffix(".md").unwrap_or(base);
        if base.is_empty() {
            return Resolution::default();
        }
        let attach = |id: &str| match fragment {
            Some(frag) => format!("{id}#{frag}"),
            None => id.to_string(),
        };

        if fragment.is_some() {
            if let Some(target) = self.aliases.get(base) {
                return Resolution::found(attach(target));
            }
        }

        let mut candidates = self.match_name(base);
        if let Some(date) = self.date_for(base) {
            let id = format!("{}/{}", self.daily_directory, date);
            if candidates.is_empty() {
                return Resolution::found(attach(&id));
            }
            candidates.push(id);
        } else if base.contains('/') {
            candidates.extend(self.match_path(base));
        } else {
            candidates.extend(self.match_short_name(base));
        }
        let mut candidates = files_over_own_sections(candidates);
        match candidates.len() {
            0 => Resolution::default(),
            1 => Resolution::found(attach(&candidates.remove(0))),
            _ => Resolution::ambiguous(candidates.iter().map(|c| attach(c)).collect()),
        }
    }

    /// Every short name more than one file-level object answers to.
    pub fn collisions(&self) -> Vec<Collision> {
        let mut by_name: BTreeMap<&str, Vec<String>> = BTreeMap::new();
        for (name, ids) in &self.short_names {
            let files: Vec<String> = ids
                .iter()
                .filter(|id| !paths::is_embedded(id))
                .cloned()
                .collect();
            if files.len() > 1 {
                by_name.insert(name, files);
            }
        }
        by_name
            .into_iter()
            .map(|(name, mut ids)| {
                ids.sort();
                Collision {
                    short_name: name.to_string(),
                    ids,
                }
            })
            .collect()
    }

    fn date_for(&self, base: &str) -> Option<String> {
        if dates::is_valid_date(base) {
            return Some(base.to_string());
        }
        dates::resolve_keyword(base, self.today).map(|d| d.format(dates::DATE_FORMAT).to_string())
    }

    fn match_path(&self, base: &str) -> Vec<String> {
        let base = base.trim_start_matches('/');
        if self.ids.contains(base) {
            return vec![base.to_string()];
        }
        let stripped = self.roots.strip(base);
        if stripped != base && self.ids.contains(stripped) {
            return vec![stripped.to_string()];
        }
        let suffix = format!("/{stripped}");
        self.ids
            .iter()
            .filter(|id| id.ends_with(&suffix))
            .cloned()
            .collect()
    }

    fn match_short_name(&self, name: &str) -> Vec<String> {
        self.short_names.get(name).cloned().unwrap_or_default()
    }

    /// Snapshot objects whose `name_field` value is `name`, ignoring case
    /// and then punctuation.
    fn match_name(&self, name: &str) -> Vec<String> {
        let hits = self
            .names
            .get(&name.to_lowercase())
            .or_else(|| self.names.get(&paths::slugify(name)));
        hits.into_iter()
            .flatten()
            .filter(|id| self.ids.contains(*id))
            .cloned()
            .collect()
    }

    /// Whether `written` reaches `id` only through its display name, so
    /// it stays valid wherever the object lives.
    pub fn is_name_of(&self, written: &str, id: &str) -> bool {
        let written = written.trim();
        if written.contains('/') || written == paths::short_name(id) {
            return false;
        }
        self.names
            .get(&written.to_lowercase())
            .or_else(|| self.names.get(&paths::slugify(written)))
            .is_some_and(|ids| ids.contains(id))
    }
}

/// Sorted, deduplicated, and with any section dropped whose file is also
/// a candidate.
fn files_over_own_sections(mut candidates: Vec<String>) -> Vec<String> {
    candidates.sort();
    candidates.dedup();
    let files: BTreeSet<String> = candidates
        .iter()
        .filter(|id| !paths::is_embedded(id))
        .cloned()
        .collect();
    candidates.retain(|id| !paths::is_embedded(id) || !files.contains(paths::base_id(id)));
    candidates
}

/// Answers "what type does this reference point at" for field validation.
pub struct TypedResolver<'a> {
    pub resolver: &'a Resolver,
    /// Object ID → type name.
    pub types: &'a HashMap<String, String>,
}

impl RefTypes for TypedResolver<'_> {
    fn type_of(&self, reference: &str) -> Option<String> {
        let id = self.resolver.resolve(reference).target_id?;
        self.types.get(&id).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, dates::DATE_FORMAT).unwrap()
    }

    fn resolver(ids: &[&str]) -> Resolver {
        resolver_with(ids, ResolverOptions::default())
    }

    fn resolver_with(ids: &[&str], mut options: ResolverOptions) -> Resolver {
        if options.daily_directory.is_empty() {
            options.daily_directory = "daily".to_string();
        }
        options.today.get_or_insert(day("2025-02-01"));
        Resolver::new(ids.iter().map(|s| s.to_string()), options)
    }

    #[test]
    fn test_short_name_and_ambiguity() {
        let r = resolver(&["projects/website", "projects/new-site", "people/freya"]);
        let res = r.resolve("website");
        assert_eq!(res.target_id.as_deref(), Some("projects/website"));
        assert!(!res.ambiguous);

        let r = resolver(&[
            "projects/website",
            "projects/new-site",
            "people/freya",
            "notes/new-site",
        ]);
        let res = r.resolve("new-site");
        assert!(res.ambiguous);
        assert_eq!(res.target_id, None);
        assert_eq!(res.candidates, vec!["notes/new-site", "projects/new-site"]);
    }

    #[test]
    fn test_short_names_are_case_sensitive() {
        let r = resolver(&["people/freya"]);
        assert!(!r.resolve("Freya").is_resolved());
    }

    #[test]
    fn test_alias_beats_ambiguity() {
        let mut aliases = HashMap::new();
        aliases.insert("new-site".to_string(), "projects/new-site".to_string());
        aliases.insert("The Queen".to_string(), "people/freya".to_string());
        let r = resolver_with(
            &["projects/new-site", "notes/new-site", "people/freya"],
            ResolverOptions {
                aliases,
                ..Default::default()
            },
        );
        assert_eq!(r.resolve("new-site").target_id.as_deref(), Some("projects/new-site"));
        assert_eq!(r.resolve("The Queen").target_id.as_deref(), Some("people/freya"));
        assert_eq!(
            r.resolve("The Queen#notes").target_id.as_deref(),
            Some("people/freya#notes")
        );
        assert_eq!(r.aliases_for("people/freya"), vec!["The Queen"]);
    }

    fn names(pairs: &[(&str, &str)]) -> HashMap<String, Vec<String>> {
        let mut out: HashMap<String, Vec<String>> = HashMap::new();
        for (name, id) in pairs {
            out.entry(name.to_string()).or_default().push(id.to_string());
        }
        out
    }

    #[test]
    fn test_name_field_values_resolve() {
        let r = resolver_with(
            &["books/the-prose-edda", "people/freya", "people/freya#notes"],
            ResolverOptions {
                name_fields: names(&[
                    ("The Prose Edda", "books/the-prose-edda"),
                    ("Freya", "people/freya"),
                    ("Gone", "people/odin"),
                ]),
                ..Default::default()
            },
        );
        assert_eq!(
            r.resolve("The Prose Edda").target_id.as_deref(),
            Some("books/the-prose-edda")
        );
        assert_eq!(
            r.resolve("the prose edda").target_id.as_deref(),
            Some("books/the-prose-edda")
        );
        assert_eq!(
            r.resolve("Freya#notes").target_id.as_deref(),
            Some("people/freya#notes")
        );
        // the name and the short name agree
        assert_eq!(r.resolve("freya").target_id.as_deref(), Some("people/freya"));
        // names of objects outside the snapshot are ignored
        assert!(!r.resolve("Gone").is_resolved());

        assert!(r.is_name_of("The Prose Edda", "books/the-prose-edda"));
        assert!(!r.is_name_of("freya", "people/freya"));
        assert!(!r.is_name_of("people/freya", "people/freya"));
    }

    #[test]
    fn test_name_field_matches_take_part_in_ambiguity() {
        let r = resolver_with(
            &["people/thor", "gods/thunder", "notes/2025-03-01", "projects/odin", "people/odin"],
            ResolverOptions {
                name_fields: names(&[
                    ("thunder", "people/thor"),
                    ("Odin", "projects/odin"),
                    ("Odin", "people/odin"),
                    ("2025-03-01", "notes/2025-03-01"),
                ]),
                ..Default::default()
            },
        );
        let res = r.resolve("thunder");
        assert!(res.ambiguous);
        assert_eq!(res.candidates, vec!["gods/thunder", "people/thor"]);

        let res = r.resolve("Odin");
        assert!(res.ambiguous);
        assert_eq!(res.candidates, vec!["people/odin", "projects/odin"]);

        let res = r.resolve("2025-03-01");
        assert!(res.ambiguous);
        assert_eq!(res.candidates, vec!["daily/2025-03-01", "notes/2025-03-01"]);
    }

    #[test]
    fn test_path_forms() {
        let r = resolver_with(
            &["people/freya", "projects/website"],
            ResolverOptions {
                roots: Roots::new("objects", "pages"),
                ..Default::default()
            },
        );
        assert_eq!(r.resolve("people/freya").target_id.as_deref(), Some("people/freya"));
        assert_eq!(
            r.resolve("objects/people/freya").target_id.as_deref(),
            Some("people/freya")
        );
        assert_eq!(r.resolve("people/freya.md").target_id.as_deref(), Some("people/freya"));
        assert!(!r.resolve("people/odin").is_resolved());
    }

    #[test]
    fn test_path_suffix_match() {
        let r = resolver(&["work/projects/website", "home/projects/website", "work/people/freya"]);
        assert_eq!(
            r.resolve("people/freya").target_id.as_deref(),
            Some("work/people/freya")
        );
        let res = r.resolve("projects/website");
        assert!(res.ambiguous);
        assert_eq!(res.candidates.len(), 2);
    }

    #[test]
    fn test_fragment_is_reattached() {
        let r = resolver(&["projects/website", "projects/website#tasks"]);
        assert_eq!(
            r.resolve("website#tasks").target_id.as_deref(),
            Some("projects/website#tasks")
        );
        assert_eq!(
            r.resolve("projects/website#later").target_id.as_deref(),
            Some("projects/website#later")
        );
        assert!(!r.resolve("#tasks").is_resolved());
    }

    #[test]
    fn test_section_short_names() {
        let r = resolver(&["daily/2025-02-01", "daily/2025-02-01#standup", "notes/ideas"]);
        assert_eq!(
            r.resolve("standup").target_id.as_deref(),
            Some("daily/2025-02-01#standup")
        );

        // A file and its own section with the same name: the file wins.
        let r = resolver(&["notes/ideas", "notes/ideas#ideas"]);
        assert_eq!(r.resolve("ideas").target_id.as_deref(), Some("notes/ideas"));
    }

    #[test]
    fn test_date_keywords() {
        let r = resolver_with(
            &[],
            ResolverOptions {
                daily_directory: "/journal/".to_string(),
                ..Default::default()
            },
        );
        assert_eq!(r.resolve("today").target_id.as_deref(), Some("journal/2025-02-01"));
        assert_eq!(r.resolve("yesterday").target_id.as_deref(), Some("journal/2025-01-31"));
        assert_eq!(r.resolve("tomorrow").target_id.as_deref(), Some("journal/2025-02-02"));
        assert_eq!(
            r.resolve("2024-12-25#gifts").target_id.as_deref(),
            Some("journal/2024-12-25#gifts")
        );
    }

    #[test]
    fn test_extra_and_excluded_ids() {
        let r = resolver_with(
            &["people/tido", "people/tido#notes", "people/thor"],
            ResolverOptions {
                extra_ids: vec!["person/tido".to_string()],
                exclude_ids: vec!["people/tido".to_string()],
                ..Default::default()
            },
        );
        assert!(!r.contains("people/tido"));
        assert!(!r.contains("people/tido#notes"));
        assert_eq!(r.resolve("tido").target_id.as_deref(), Some("person/tido"));
    }

    #[test]
    fn test_collisions() {
        let r = resolver(&["a/x", "b/x", "c/y", "c/y#x"]);
        assert_eq!(
            r.collisions(),
            vec![Collision {
                short_name: "x".to_string(),
                ids: vec!["a/x".to_string(), "b/x".to_string()],
            }]
        );
    }

    #[test]
    fn test_typed_resolver() {
        let r = resolver(&["people/freya"]);
        let mut types = HashMap::new();
        types.insert("people/freya".to_string(), "person".to_string());
        let typed = TypedResolver {
            resolver: &r,
            types: &types,
        };
        assert_eq!(typed.type_of("freya").as_deref(), Some("person"));
        assert_eq!(typed.type_of("odin"), None);
    }
}
