//! Vault-wide validation: every file parsed, every object's fields checked
//! against its type, every schema trait value checked against its
//! definition. Nothing is written.

use anyhow::Result;
use serde::Serialize;
use std::collections::BTreeSet;

use crate::config::VaultConfig;
use crate::dates;
use crate::index::VaultIndex;
use crate::parser::{self, Document};
use crate::resolver::TypedResolver;
use crate::schema::{self, RefTypes, Schema, ValidateOptions};
use crate::vault;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Issue {
    pub file_path: String,
    pub line: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub object_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    pub message: String,
}

pub async fn check_vault(
    config: &VaultConfig,
    schema: &Schema,
    index: &VaultIndex,
) -> Result<Vec<Issue>> {
    let resolver = index.resolver(schema, config.resolver_options()).await?;
    let types = index.object_types().await?;
    let typed = TypedResolver {
        resolver: &resolver,
        types: &types,
    };
    let roots = config.roots();

    let mut issues = Vec::new();
    for file in vault::scan_vault(config)? {
        let content = match std::fs::read_to_string(&file.abs_path) {
            Ok(content) => content,
            Err(err) => {
                issues.push(file_issue(&file.rel_path, format!("unreadable: {err}")));
                continue;
            }
        };
        match parser::parse_document(&content, &file.rel_path, &roots) {
            Ok(doc) => issues.extend(check_document(&doc, schema, Some(&typed))),
            Err(err) => issues.push(file_issue(&file.rel_path, err.to_string())),
        }
    }
    tracing::debug!(issues = issues.len(), "check complete");
    Ok(issues)
}

/// Problems in one parsed document, in object then trait order.
pub fn check_document(
    doc: &Document,
    schema: &Schema,
    refs: Option<&dyn RefTypes>,
) -> Vec<Issue> {
    let mut issues = Vec::new();
    for object in &doc.objects {
        let Some(type_def) = schema.type_def(&object.type_name) else {
            issues.push(Issue {
                file_path: doc.file_path.clone(),
                line: object.line_start,
                object_id: Some(object.id.clone()),
                field: None,
                message: format!("unknown type '{}'", object.type_name),
            });
            continue;
        };
        let mut options = ValidateOptions {
            refs,
            ..Default::default()
        };
        if type_def.fields.is_empty() {
            options.allow_unknown = object.fields.keys().cloned().collect::<BTreeSet<_>>();
        }
        for error in schema::validate_fields(&object.fields, &type_def.fields, schema, &options) {
            issues.push(Issue {
                file_path: doc.file_path.clone(),
                line: object.line_start,
                object_id: Some(object.id.clone()),
                field: Some(error.field.clone()),
                message: error.message,
            });
        }
    }

    let today = dates::today();
    for parsed in &doc.traits {
        let Some(def) = schema.trait_def(&parsed.trait_type) else {
            continue;
        };
        if let Err(error) =
            schema::validate_trait_value(&parsed.trait_type, def, parsed.value.as_deref(), today)
        {
            issues.push(Issue {
                file_path: doc.file_path.clone(),
                line: parsed.line,
                object_id: Some(parsed.parent_object_id.clone()),
                field: Some(format!("@{}", parsed.trait_type)),
                message: error.message,
            });
        }
    }
    issues
}

fn file_issue(file_path: &str, message: String) -> Issue {
    Issue {
        file_path: file_path.to_string(),
        line: 1,
        object_id: None,
        field: None,
        message,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::tests::TEST_SCHEMA;
    use crate::paths::Roots;
    use crate::reindex::tests::test_vault;

    fn doc(path: &str, content: &str) -> Document {
        parser::parse_document(content, path, &Roots::default()).unwrap()
    }

    #[test]
    fn test_check_document_reports_fields_and_traits() {
        let schema = Schema::from_yaml_str(TEST_SCHEMA).unwrap();
        let d = doc(
            "projects/p.md",
            "---\ntype: project\nstatus: someday\n---\n- @priority(urgent) fix\n- @due(soon)\n",
        );
        let issues = check_document(&d, &schema, None);
        let found: Vec<(usize, Option<&str>)> = issues
            .iter()
            .map(|i| (i.line, i.field.as_deref()))
            .collect();
        assert_eq!(
            found,
            vec![
                (1, Some("status")),
                (5, Some("@priority")),
                (6, Some("@due"))
            ]
        );
    }

    #[test]
    fn test_check_document_unknown_type_and_free_pages() {
        let schema = Schema::from_yaml_str(TEST_SCHEMA).unwrap();
        let issues = check_document(&doc("a.md", "---\ntype: robot\n---\n"), &schema, None);
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].message, "unknown type 'robot'");

        let page = doc("b.md", "---\nmood: calm\n---\n");
        assert!(check_document(&page, &schema, None).is_empty());
    }

    #[tokio::test]
    async fn test_check_vault_includes_parse_errors() {
        let v = test_vault(&[
            ("people/freya.md", "---\ntype: person\nname: Freya\n---\n"),
            ("broken.md", "---\ntype: person\n"),
        ])
        .await;
        let issues = check_vault(&v.config, &v.schema, &v.index).await.unwrap();
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].file_path, "broken.md");
        assert!(issues[0].object_id.is_none());
    }
}
