//! Validated frontmatter edits.
//!
//! `set_field` resolves a reference to a file object, coerces each
//! `key=value` update with the inline declaration value syntax, rewrites
//! relative date keywords in date fields, and validates the merged field
//! set against the object's type. Nothing is written when validation
//! fails. Accepted updates are written atomically, one frontmatter line per
//! key, and the file is reindexed.

use anyhow::{bail, Context, Result};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

use crate::atomic;
use crate::config::VaultConfig;
use crate::dates;
use crate::error::{IndexError, SchemaError};
use crate::index::VaultIndex;
use crate::parser::{self, typedecl};
use crate::paths;
use crate::reindex;
use crate::resolver::TypedResolver;
use crate::schema::{self, FieldError, FieldValue, Schema, ValidateOptions};

/// Keys `set_field` refuses to touch.
const FIXED_KEYS: &[&str] = &["id", "type"];

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SetOutcome {
    /// Written and reindexed. `changed` is false when the file already
    /// carried these values.
    Applied {
        id: String,
        file_path: String,
        changed: bool,
    },
    /// Nothing was written.
    Rejected { id: String, errors: Vec<FieldError> },
}

/// Parses `key=value` arguments.
pub fn parse_assignments<S: AsRef<str>>(
    args: impl IntoIterator<Item = S>,
) -> Result<Vec<(String, String)>> {
    args.into_iter()
        .map(|arg| {
            let arg = arg.as_ref();
            match arg.split_once('=') {
                Some((key, value)) if !key.trim().is_empty() => {
                    Ok((key.trim().to_string(), value.trim().to_string()))
                }
                _ => bail!("Expected key=value, got '{arg}'"),
            }
        })
        .collect()
}

pub async fn set_field(
    config: &VaultConfig,
    schema: &Schema,
    index: &VaultIndex,
    reference: &str,
    updates: &[(String, String)],
) -> Result<SetOutcome> {
    if updates.is_empty() {
        bail!("No fields to set");
    }
    if let Some((key, _)) = updates.iter().find(|(k, _)| FIXED_KEYS.contains(&k.as_str())) {
        bail!("Field '{key}' cannot be changed with set");
    }

    let resolver = index.resolver(schema, config.resolver_options()).await?;
    let resolution = resolver.resolve(reference);
    if resolution.ambiguous {
        bail!(
            "'{reference}' is ambiguous: {}",
            resolution.candidates.join(", ")
        );
    }
    let id = resolution
        .target_id
        .ok_or_else(|| IndexError::ObjectNotFound(reference.to_string()))?;
    if paths::is_embedded(&id) {
        bail!("'{id}' is an embedded object; edit its declaration in the file instead");
    }
    let record = index
        .get_object(&id)
        .await?
        .ok_or_else(|| IndexError::ObjectNotFound(id.clone()))?;

    let abs = config.root.join(&record.file_path);
    let content = std::fs::read_to_string(&abs)
        .with_context(|| format!("Failed to read {}", abs.display()))?;
    let doc = parser::parse_document(&content, &record.file_path, &config.roots())?;
    let object = doc.file_object();
    let type_def = schema
        .type_def(&object.type_name)
        .ok_or_else(|| SchemaError::UnknownType(object.type_name.clone()))?;

    let mut parsed: BTreeMap<String, FieldValue> = updates
        .iter()
        .map(|(key, raw)| (key.clone(), parse_update(raw)))
        .collect();
    schema::normalize_date_fields(&mut parsed, &type_def.fields, dates::today());

    let mut merged = object.fields.clone();
    merged.extend(parsed.clone());
    let types = index.object_types().await?;
    let typed = TypedResolver {
        resolver: &resolver,
        types: &types,
    };
    let mut options = ValidateOptions {
        refs: Some(&typed),
        ..Default::default()
    };
    if type_def.fields.is_empty() {
        // untyped pages carry free-form frontmatter
        options.allow_unknown = merged.keys().cloned().collect::<BTreeSet<_>>();
    }
    // existing problems in untouched fields do not block an edit
    let errors: Vec<FieldError> =
        schema::validate_fields(&merged, &type_def.fields, schema, &options)
            .into_iter()
            .filter(|e| parsed.contains_key(&e.field))
            .collect();
    if !errors.is_empty() {
        return Ok(SetOutcome::Rejected { id, errors });
    }

    let mut updated = content.clone();
    for (key, value) in &parsed {
        updated = parser::frontmatter::set_key(&updated, key, &value.to_yaml_inline());
    }
    let changed = updated != content;
    if changed {
        atomic::write_file(&abs, updated.as_bytes())
            .with_context(|| format!("Failed to write {}", abs.display()))?;
        reindex::reindex_file(config, schema, index, &record.file_path).await?;
        reindex::resolve_all(config, schema, index).await?;
        tracing::info!(id = %id, fields = parsed.len(), "fields updated");
    }

    Ok(SetOutcome::Applied {
        id,
        file_path: record.file_path,
        changed,
    })
}

/// Empty input clears the field.
fn parse_update(raw: &str) -> FieldValue {
    if raw.trim().is_empty() {
        FieldValue::Null
    } else {
        typedecl::parse_value(raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reindex::tests::test_vault;
    use crate::schema::FieldErrorKind;

    fn set(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_parse_assignments() {
        let parsed = parse_assignments(["status=done", "owner = [[people/freya]]"]).unwrap();
        assert_eq!(
            parsed,
            set(&[("status", "done"), ("owner", "[[people/freya]]")])
        );
        assert!(parse_assignments(["novalue"]).is_err());
        assert!(parse_assignments(["=x"]).is_err());
    }

    #[tokio::test]
    async fn test_noop_set_keeps_file_and_fields() {
        let content = "---\ntype: project\nstatus: active\nowner: \"[[people/freya]]\"\n---\n# Website\n";
        let v = test_vault(&[
            ("people/freya.md", "---\ntype: person\nname: Freya\n---\n"),
            ("projects/website.md", content),
        ])
        .await;
        let before = parser::parse_document(content, "projects/website.md", &v.config.roots())
            .unwrap()
            .file_object()
            .fields
            .clone();

        let out = set_field(
            &v.config,
            &v.schema,
            &v.index,
            "website",
            &set(&[("status", "active"), ("owner", "[[people/freya]]")]),
        )
        .await
        .unwrap();
        assert!(matches!(out, SetOutcome::Applied { changed: false, .. }));

        let after_content = v.read("projects/website.md");
        assert_eq!(after_content, content);
        let after = parser::parse_document(&after_content, "projects/website.md", &v.config.roots())
            .unwrap()
            .file_object()
            .fields
            .clone();
        assert_eq!(before, after);
    }

    #[tokio::test]
    async fn test_set_writes_and_reindexes() {
        let v = test_vault(&[
            ("people/freya.md", "---\ntype: person\nname: Freya\n---\n"),
            (
                "projects/website.md",
                "---\ntype: project\nstatus: active # current\n---\n# Website\n",
            ),
        ])
        .await;

        let out = set_field(
            &v.config,
            &v.schema,
            &v.index,
            "projects/website",
            &set(&[("status", "done"), ("owner", "freya"), ("due", "2025-03-01")]),
        )
        .await
        .unwrap();
        assert!(matches!(out, SetOutcome::Applied { changed: true, .. }));
        assert_eq!(
            v.read("projects/website.md"),
            "---\ntype: project\nstatus: done\ndue: 2025-03-01\nowner: freya\n---\n# Website\n"
        );

        let record = v.index.get_object("projects/website").await.unwrap().unwrap();
        assert_eq!(record.fields["status"], FieldValue::String("done".into()));
        let backlinks = v.index.backlinks("people/freya").await.unwrap();
        assert_eq!(backlinks.len(), 1);
        assert_eq!(backlinks[0].target_id.as_deref(), Some("people/freya"));
    }

    #[tokio::test]
    async fn test_invalid_values_are_rejected_without_writing() {
        let content = "---\ntype: project\nstatus: active\n---\n";
        let v = test_vault(&[
            ("projects/website.md", content),
            ("projects/other.md", "---\ntype: project\n---\n"),
        ])
        .await;

        let out = set_field(
            &v.config,
            &v.schema,
            &v.index,
            "website",
            &set(&[("status", "someday"), ("owner", "projects/other"), ("colour", "red")]),
        )
        .await
        .unwrap();
        let SetOutcome::Rejected { errors, .. } = out else {
            panic!("expected rejection, got {out:?}");
        };
        let kinds: Vec<(&str, FieldErrorKind)> =
            errors.iter().map(|e| (e.field.as_str(), e.kind)).collect();
        assert_eq!(
            kinds,
            vec![
                ("colour", FieldErrorKind::UnknownField),
                ("owner", FieldErrorKind::RefTargetMismatch),
                ("status", FieldErrorKind::InvalidEnum),
            ]
        );
        assert_eq!(v.read("projects/website.md"), content);
    }

    #[tokio::test]
    async fn test_pages_accept_free_form_fields() {
        let v = test_vault(&[("notes/idea.md", "Just an idea.\n")]).await;
        let out = set_field(&v.config, &v.schema, &v.index, "idea", &set(&[("mood", "curious")]))
            .await
            .unwrap();
        assert!(matches!(out, SetOutcome::Applied { changed: true, .. }));
        assert_eq!(
            v.read("notes/idea.md"),
            "---\nmood: curious\n---\nJust an idea.\n"
        );
    }

    #[tokio::test]
    async fn test_embedded_and_unknown_targets_fail() {
        let v = test_vault(&[("notes/a.md", "# Top\n\n## Tasks\n")]).await;
        let err = set_field(&v.config, &v.schema, &v.index, "a#tasks", &set(&[("x", "1")]))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("embedded"));

        let err = set_field(&v.config, &v.schema, &v.index, "missing", &set(&[("x", "1")]))
            .await
            .unwrap_err();
        assert!(err.downcast_ref::<IndexError>().is_some_and(IndexError::is_not_found));
    }
}
