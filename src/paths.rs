//! Conversions between vault-relative file paths and object IDs.
//!
//! An object ID is a vault-relative path without the `.md` extension and
//! without the configured directory roots. With `directories.object =
//! "objects"` the file `objects/people/freya.md` has the ID `people/freya`.
//!
//! Embedded objects (sections, `::type()` declarations) use the composite
//! form `file-id#fragment`.

/// Normalized object/page directory roots.
///
/// Both roots are stored as `"dir/"` or `""` so prefix checks never need to
/// care about slashes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Roots {
    pub objects: String,
    pub pages: String,
}

impl Roots {
    pub fn new(objects: &str, pages: &str) -> Self {
        Self {
            objects: normalize_dir_root(objects),
            pages: normalize_dir_root(pages),
        }
    }

    /// Object ID for a vault-relative markdown path.
    ///
    /// The objects root is stripped before the pages root, since typed
    /// objects tend to live in the more specific directory.
    pub fn id_for_path(&self, file_path: &str) -> String {
        let rel = normalize_rel_path(file_path);
        let id = rel.strip_suffix(".md").unwrap_or(&rel);
        self.strip(id).to_string()
    }

    /// Vault-relative markdown path for an object ID of the given type.
    ///
    /// Pages (or untyped IDs) go under the pages root, falling back to the
    /// objects root; everything else goes under the objects root. An ID that
    /// already carries a root is not prefixed again.
    pub fn path_for_id(&self, id: &str, type_name: &str) -> String {
        let rel = normalize_rel_path(base_id(id));
        let id = rel.strip_suffix(".md").unwrap_or(&rel);

        if self.has_root_prefix(id) {
            return format!("{id}.md");
        }

        let root = if type_name.is_empty() || type_name == "page" {
            if self.pages.is_empty() {
                &self.objects
            } else {
                &self.pages
            }
        } else {
            &self.objects
        };
        format!("{root}{id}.md")
    }

    /// Every markdown path a reference might point at, literal first.
    pub fn candidate_paths(&self, reference: &str) -> Vec<String> {
        let rel = normalize_rel_path(base_id(reference));
        let reference = rel.strip_suffix(".md").unwrap_or(&rel);

        let mut out: Vec<String> = vec![format!("{reference}.md")];
        for root in [&self.objects, &self.pages] {
            if root.is_empty() || reference.starts_with(root.as_str()) {
                continue;
            }
            let candidate = format!("{root}{reference}.md");
            if !out.contains(&candidate) {
                out.push(candidate);
            }
        }
        out
    }

    /// Strips one configured root from a path-like ID, objects root first.
    pub fn strip<'a>(&self, id: &'a str) -> &'a str {
        if !self.objects.is_empty() {
            if let Some(rest) = id.strip_prefix(self.objects.as_str()) {
                return rest;
            }
        }
        if !self.pages.is_empty() {
            if let Some(rest) = id.strip_prefix(self.pages.as_str()) {
                return rest;
            }
        }
        id
    }

    /// The ID followed by its root-prefixed spellings, deduplicated.
    pub fn spellings(&self, id: &str) -> Vec<String> {
        let mut out = vec![id.to_string()];
        for root in [&self.objects, &self.pages] {
            if root.is_empty() {
                continue;
            }
            let rooted = format!("{root}{id}");
            if !out.contains(&rooted) {
                out.push(rooted);
            }
        }
        out
    }

    fn has_root_prefix(&self, id: &str) -> bool {
        (!self.objects.is_empty() && id.starts_with(self.objects.as_str()))
            || (!self.pages.is_empty() && id.starts_with(self.pages.as_str()))
    }
}

/// `"/objects/"` → `"objects/"`, `"objects"` → `"objects/"`, `""` → `""`.
pub fn normalize_dir_root(root: &str) -> String {
    let root = root.replace('\\', "/");
    let trimmed = root.trim_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("{trimmed}/")
    }
}

fn normalize_rel_path(p: &str) -> String {
    let mut p = p.replace('\\', "/");
    if let Some(rest) = p.strip_prefix("./") {
        p = rest.to_string();
    }
    let mut p = p.trim_start_matches('/').to_string();
    while p.contains("//") {
        p = p.replace("//", "/");
    }
    p
}

/// Splits `file#fragment` into its parts.
pub fn split_fragment(id: &str) -> (&str, Option<&str>) {
    match id.split_once('#') {
        Some((base, fragment)) => (base, Some(fragment)),
        None => (id, None),
    }
}

/// The file-level part of an ID.
pub fn base_id(id: &str) -> &str {
    split_fragment(id).0
}

pub fn is_embedded(id: &str) -> bool {
    id.contains('#')
}

/// Final path segment of an ID; for embedded IDs, the fragment.
pub fn short_name(id: &str) -> &str {
    if let (_, Some(fragment)) = split_fragment(id) {
        return fragment;
    }
    id.rsplit('/').next().unwrap_or(id)
}

/// Lowercased slug used for heading-derived IDs.
///
/// Letters and digits are kept, runs of separators (space, `-`, `_`, `:`)
/// collapse into one `-`, everything else is dropped.
pub fn slugify(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut pending_dash = false;
    for c in text.chars().flat_map(char::to_lowercase) {
        if c.is_alphanumeric() {
            if pending_dash && !out.is_empty() {
                out.push('-');
            }
            pending_dash = false;
            out.push(c);
        } else if matches!(c, ' ' | '-' | '_' | ':' | '\t') {
            pending_dash = true;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_dir_root() {
        assert_eq!(normalize_dir_root("/objects/"), "objects/");
        assert_eq!(normalize_dir_root("objects"), "objects/");
        assert_eq!(normalize_dir_root(""), "");
        assert_eq!(normalize_dir_root("/"), "");
    }

    #[test]
    fn test_id_for_path_strips_roots() {
        let roots = Roots::new("objects", "pages");
        assert_eq!(roots.id_for_path("objects/people/freya.md"), "people/freya");
        assert_eq!(roots.id_for_path("pages/ideas.md"), "ideas");
        assert_eq!(roots.id_for_path("./daily/2025-02-01.md"), "daily/2025-02-01");

        let bare = Roots::default();
        assert_eq!(bare.id_for_path("people/freya.md"), "people/freya");
    }

    #[test]
    fn test_path_for_id_uses_type_root() {
        let roots = Roots::new("objects", "pages");
        assert_eq!(roots.path_for_id("people/freya", "person"), "objects/people/freya.md");
        assert_eq!(roots.path_for_id("ideas", "page"), "pages/ideas.md");
        assert_eq!(roots.path_for_id("ideas", ""), "pages/ideas.md");
        assert_eq!(
            roots.path_for_id("objects/people/freya", "person"),
            "objects/people/freya.md"
        );

        let only_objects = Roots::new("objects", "");
        assert_eq!(only_objects.path_for_id("ideas", "page"), "objects/ideas.md");
    }

    #[test]
    fn test_candidate_paths() {
        let roots = Roots::new("objects", "pages");
        assert_eq!(
            roots.candidate_paths("people/freya"),
            vec![
                "people/freya.md".to_string(),
                "objects/people/freya.md".to_string(),
                "pages/people/freya.md".to_string(),
            ]
        );
        assert_eq!(
            roots.candidate_paths("objects/people/freya.md"),
            vec![
                "objects/people/freya.md".to_string(),
                "pages/objects/people/freya.md".to_string(),
            ]
        );
    }

    #[test]
    fn test_short_name_and_fragments() {
        assert_eq!(short_name("projects/website"), "website");
        assert_eq!(short_name("website"), "website");
        assert_eq!(short_name("daily/2025-02-01#standup"), "standup");
        assert_eq!(split_fragment("a/b#c"), ("a/b", Some("c")));
        assert_eq!(base_id("a/b#c"), "a/b");
    }

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("Weekly Sync: Q3"), "weekly-sync-q3");
        assert_eq!(slugify("Hello,  World!"), "hello-world");
        assert_eq!(slugify("snake_case--name "), "snake-case-name");
        assert_eq!(slugify("Ünïcode Title"), "ünïcode-title");
    }
}
