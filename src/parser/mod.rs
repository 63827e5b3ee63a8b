//! # Document parser
//!
//! Turns one Markdown file into the objects, traits and references it
//! declares. Parsing is pure: it needs the file's text, its vault-relative
//! path and the directory roots, nothing from the index or schema.
//!
//! | Source text | Produces |
//! |-------------|----------|
//! | `---` frontmatter | the file object (type, fields, tags, alias) |
//! | `## Heading` | a `section` object `file#slug` |
//! | `## Heading` + `::type(...)` | a typed object `file#id` |
//! | `@name` / `@name(value)` | a trait owned by the enclosing object |
//! | `[[target]]`, `[[target\|text]]` | a reference from the enclosing object |
//!
//! Fenced code blocks and inline code spans are ignored.

pub mod frontmatter;
pub mod markdown;
pub mod traits;
pub mod typedecl;
pub mod wikilink;

use std::collections::{BTreeMap, HashSet};

use crate::error::ParseError;
use crate::paths::{self, Roots};
use crate::schema::FieldValue;

#[derive(Debug, Clone, PartialEq)]
pub struct ParsedObject {
    pub id: String,
    pub type_name: String,
    pub fields: BTreeMap<String, FieldValue>,
    pub tags: Vec<String>,
    pub alias: Option<String>,
    pub heading: Option<String>,
    pub heading_level: Option<u8>,
    pub parent_id: Option<String>,
    pub line_start: usize,
    /// Line of the `::type(...)` declaration under the heading, if any.
    pub decl_line: Option<usize>,
    /// `None` for the file object, which spans the whole file.
    pub line_end: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedTrait {
    pub trait_type: String,
    pub value: Option<String>,
    pub content: String,
    pub line: usize,
    pub parent_object_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedRef {
    pub source_id: String,
    pub target_raw: String,
    pub display_text: Option<String>,
    pub line: usize,
    pub start: usize,
    pub end: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    /// Vault-relative path with forward slashes.
    pub file_path: String,
    /// ID of the file object, `objects[0]`.
    pub id: String,
    pub content: String,
    /// Line of the closing frontmatter fence, `0` without frontmatter.
    pub frontmatter_end: usize,
    /// Everything after the frontmatter.
    pub body: String,
    pub objects: Vec<ParsedObject>,
    /// In file order; a trait's position here is its `:trait:N` suffix.
    pub traits: Vec<ParsedTrait>,
    pub refs: Vec<ParsedRef>,
}

impl Document {
    pub fn file_object(&self) -> &ParsedObject {
        &self.objects[0]
    }

    /// Text an object covers: the body for the file object, its line range
    /// for embedded ones.
    pub fn object_text(&self, object: &ParsedObject) -> String {
        if object.parent_id.is_none() {
            return self.body.clone();
        }
        let lines: Vec<&str> = self.content.lines().collect();
        let start = object.line_start.saturating_sub(1).min(lines.len());
        let end = object.line_end.unwrap_or(lines.len()).min(lines.len());
        if start >= end {
            return String::new();
        }
        lines[start..end].join("\n")
    }
}

/// Parses `content` as the file at `file_path` (vault-relative).
pub fn parse_document(
    content: &str,
    file_path: &str,
    roots: &Roots,
) -> Result<Document, ParseError> {
    let file_path = file_path.replace('\\', "/");
    let file_id = roots.id_for_path(&file_path);
    let fm = frontmatter::parse(content, &file_path)?;
    let lines: Vec<&str> = content.lines().collect();
    let body_start = fm.as_ref().map_or(0, |f| f.end_line);

    let mut doc = Document {
        body: lines.get(body_start..).map(|l| l.join("\n")).unwrap_or_default(),
        file_path,
        id: file_id.clone(),
        content: content.to_string(),
        frontmatter_end: body_start,
        objects: Vec::new(),
        traits: Vec::new(),
        refs: Vec::new(),
    };

    let (type_name, fields, tags, alias) = match &fm {
        Some(f) => (
            f.object_type.clone().unwrap_or_else(|| "page".to_string()),
            f.fields.clone(),
            f.tags.clone(),
            f.alias.clone(),
        ),
        None => ("page".to_string(), BTreeMap::new(), Vec::new(), None),
    };
    doc.objects.push(ParsedObject {
        id: file_id.clone(),
        type_name,
        fields,
        tags,
        alias,
        heading: None,
        heading_level: None,
        parent_id: None,
        line_start: 1,
        decl_line: None,
        line_end: None,
    });

    // Links written in the frontmatter belong to the file object.
    for (idx, line) in lines.iter().enumerate().take(body_start).skip(1) {
        collect_refs(&mut doc.refs, &file_id, line, idx + 1);
    }

    let mut fence = markdown::FenceState::default();
    let mut used_fragments: HashSet<String> = HashSet::new();
    let mut stack: Vec<(u8, String)> = Vec::new();

    for idx in body_start..lines.len() {
        let line = lines[idx];
        let line_no = idx + 1;
        if fence.in_code(line) {
            continue;
        }

        if let Some((level, text)) = markdown::heading(line) {
            let decl_at = next_content_line(&lines, idx + 1);
            let decl = decl_at.and_then(|(_, l)| typedecl::parse(l));
            let decl_line = decl.as_ref().and(decl_at).map(|(n, _)| n);
            let masked = markdown::mask_inline_code(&text);
            let title = strip_link_syntax(&masked);

            let wanted = decl
                .as_ref()
                .and_then(|d| d.id.clone())
                .unwrap_or_else(|| paths::slugify(&title));
            let wanted = if wanted.is_empty() {
                "section".to_string()
            } else {
                wanted
            };
            let fragment = unique_fragment(&mut used_fragments, wanted);

            while stack.last().is_some_and(|(l, _)| *l >= level) {
                stack.pop();
            }
            let parent_id = stack
                .last()
                .map(|(_, id)| id.clone())
                .unwrap_or_else(|| file_id.clone());
            let id = format!("{file_id}#{fragment}");
            stack.push((level, id.clone()));

            let (type_name, fields) = match decl {
                Some(d) => (d.type_name, d.fields),
                None => {
                    let mut fields = BTreeMap::new();
                    fields.insert("title".to_string(), FieldValue::String(title.clone()));
                    fields.insert("level".to_string(), FieldValue::Number(f64::from(level)));
                    ("section".to_string(), fields)
                }
            };
            doc.objects.push(ParsedObject {
                id,
                type_name,
                fields,
                tags: Vec::new(),
                alias: None,
                heading: Some(title),
                heading_level: Some(level),
                parent_id: Some(parent_id),
                line_start: line_no,
                decl_line,
                line_end: None,
            });
        }

        let owner = doc
            .objects
            .last()
            .map(|o| o.id.clone())
            .unwrap_or_else(|| file_id.clone());
        let masked = markdown::mask_inline_code(line);
        for token in traits::extract(&masked) {
            doc.traits.push(ParsedTrait {
                trait_type: token.name,
                value: token.value,
                content: traits::content_without_traits(&masked),
                line: line_no,
                parent_object_id: owner.clone(),
            });
        }
        collect_refs(&mut doc.refs, &owner, &masked, line_no);
    }

    let total = lines.len().max(1);
    let starts: Vec<usize> = doc.objects.iter().map(|o| o.line_start).collect();
    for (i, object) in doc.objects.iter_mut().enumerate().skip(1) {
        object.line_end = Some(
            starts
                .get(i + 1)
                .map_or(total, |next| next.saturating_sub(1).max(object.line_start)),
        );
    }

    Ok(doc)
}

fn collect_refs(refs: &mut Vec<ParsedRef>, source_id: &str, line: &str, line_no: usize) {
    for link in wikilink::extract(line) {
        refs.push(ParsedRef {
            source_id: source_id.to_string(),
            target_raw: link.target,
            display_text: link.display,
            line: line_no,
            start: link.start,
            end: link.end,
        });
    }
}

/// First non-blank line at or after `from` when it is a declaration, with
/// its 1-based line number.
fn next_content_line<'a>(lines: &[&'a str], from: usize) -> Option<(usize, &'a str)> {
    lines
        .iter()
        .enumerate()
        .skip(from)
        .find(|(_, l)| !l.trim().is_empty())
        .filter(|(_, l)| typedecl::is_decl_line(l))
        .map(|(i, l)| (i + 1, *l))
}

fn unique_fragment(used: &mut HashSet<String>, wanted: String) -> String {
    let mut fragment = wanted.clone();
    let mut n = 1;
    // a suffixed slug can itself be a later heading's slug
    while used.contains(&fragment) {
        n += 1;
        fragment = format!("{wanted}-{n}");
    }
    used.insert(fragment.clone());
    fragment
}

/// Heading text with `[[target|display]]` shown as its display text.
fn strip_link_syntax(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut last = 0;
    for link in wikilink::extract(text) {
        out.push_str(&text[last..link.start]);
        out.push_str(link.display.as_deref().unwrap_or(&link.target));
        last = link.end;
    }
    out.push_str(&text[last..]);
    out.trim().to_string()
}
