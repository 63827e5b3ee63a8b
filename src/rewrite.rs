//! # Reference rewriting
//!
//! When an object moves from `source_id` to `dest_id`, every place that
//! names it has to change with it, in whatever spelling the author used.
//! Each spelling is a [`Spelling`] rule that knows which lines it applies
//! to and how to swap one old reference for a new one on such a line:
//!
//! | Spelling | Applies to | Example |
//! |----------|-----------|---------|
//! | `Bracketed` | any line outside code | `[[old]]`, `[[old\|text]]`, `[[old#frag]]` |
//! | `FrontmatterScalar` | frontmatter | `owner: old`, `owner: "old" # lead` |
//! | `FrontmatterListItem` | frontmatter | `  - old` |
//! | `InlineArrayElement` | frontmatter, `::type()` lines | `[a, old, "b"]` |
//! | `TypeDeclField` | `::type()` lines | `::meeting(owner=old, at=2)` |
//!
//! Display text, fragments, quoting and trailing comments are kept.
//!
//! [`rewrite_file`] tries the line a reference was recorded on first and
//! only scans the whole file when that line no longer matches.

use regex::{Captures, Regex};
use serde::Serialize;
use std::path::Path;
use std::sync::LazyLock;

use crate::atomic;
use crate::error::RewriteError;
use crate::parser::markdown::FenceState;
use crate::parser::typedecl;
use crate::paths::{self, Roots};
use crate::resolver::Resolver;

/// Upper bound on repeated passes for adjacent array elements.
const MAX_PASSES: usize = 8;

static FRONTMATTER_SCALAR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"^(?P<prefix>[ \t]*[^\s#:\-][^:]*:[ \t]+)(?P<value>"[^"]*"|'[^']*'|.*?)(?P<suffix>(?:[ \t]+#.*)?[ \t]*)$"#,
    )
    .unwrap()
});

static FRONTMATTER_LIST_ITEM_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"^(?P<prefix>[ \t]*-[ \t]+)(?P<value>"[^"]*"|'[^']*'|.*?)(?P<suffix>(?:[ \t]+#.*)?[ \t]*)$"#,
    )
    .unwrap()
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Spelling {
    Bracketed,
    FrontmatterScalar,
    FrontmatterListItem,
    InlineArrayElement,
    TypeDeclField,
}

/// One old reference text and what replaces it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Replacement {
    pub old: String,
    pub new: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LineContext {
    Frontmatter,
    TypeDecl,
    Body,
    Code,
}

struct Rule {
    spelling: Spelling,
    contexts: &'static [LineContext],
    apply: fn(&str, &Replacement) -> Option<String>,
}

const RULES: &[Rule] = &[
    Rule {
        spelling: Spelling::Bracketed,
        contexts: &[LineContext::Frontmatter, LineContext::TypeDecl, LineContext::Body],
        apply: bracketed,
    },
    Rule {
        spelling: Spelling::FrontmatterScalar,
        contexts: &[LineContext::Frontmatter],
        apply: frontmatter_scalar,
    },
    Rule {
        spelling: Spelling::FrontmatterListItem,
        contexts: &[LineContext::Frontmatter],
        apply: frontmatter_list_item,
    },
    Rule {
        spelling: Spelling::InlineArrayElement,
        contexts: &[LineContext::Frontmatter, LineContext::TypeDecl],
        apply: inline_array_element,
    },
    Rule {
        spelling: Spelling::TypeDeclField,
        contexts: &[LineContext::TypeDecl],
        apply: type_decl_field,
    },
];

/// Content after a successful rewrite.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rewritten {
    pub content: String,
    /// Spellings that matched, in rule order.
    pub spellings: Vec<Spelling>,
    /// 1-based lines that changed.
    pub lines: Vec<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RewriteScope {
    Line,
    WholeFile,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRewrite {
    pub scope: RewriteScope,
    pub spellings: Vec<Spelling>,
    pub lines: Vec<usize>,
}

/// The text that should replace a reference written as `written` when
/// `source_id` becomes `dest_id`.
///
/// Path-like references become the full `dest_id`; aliases and display
/// names of the source stay as written; short names stay short when the destination's short
/// name resolves to exactly `dest_id` in `resolver`, and become `dest_id`
/// otherwise. `resolver` should already contain `dest_id` and not the
/// source.
pub fn replacement_for(
    written: &str,
    source_id: &str,
    dest_id: &str,
    resolver: &Resolver,
) -> String {
    if written.contains('/') {
        return dest_id.to_string();
    }
    if resolver.aliases_for(source_id).contains(&written)
        || resolver.is_name_of(written, source_id)
    {
        return written.to_string();
    }
    let short = paths::short_name(dest_id);
    let resolution = resolver.resolve(short);
    if !resolution.ambiguous && resolution.target_id.as_deref() == Some(dest_id) {
        short.to_string()
    } else {
        dest_id.to_string()
    }
}

/// Replacements for every spelling of `source_id`: its ID, its
/// root-prefixed forms and each as-written form (fragments dropped).
/// Spellings that would not change are left out.
pub fn plan_replacements<'a>(
    source_id: &str,
    dest_id: &str,
    written: impl IntoIterator<Item = &'a str>,
    roots: &Roots,
    resolver: &Resolver,
) -> Vec<Replacement> {
    let mut olds = roots.spellings(source_id);
    for form in written {
        let base = paths::base_id(form).trim();
        if !base.is_empty() && !olds.iter().any(|o| o == base) {
            olds.push(base.to_string());
        }
    }
    olds.into_iter()
        .filter(|old| !old.is_empty())
        .map(|old| Replacement {
            new: replacement_for(&old, source_id, dest_id, resolver),
            old,
        })
        .filter(|r| r.old != r.new)
        .collect()
}

/// Rewrites only line `line_no` (1-based). `None` when nothing there matched.
pub fn rewrite_line(
    content: &str,
    line_no: usize,
    replacements: &[Replacement],
) -> Option<Rewritten> {
    rewrite_lines(content, replacements, Some(line_no))
}

/// Rewrites every line of `content`. `None` when nothing matched.
pub fn rewrite_content(content: &str, replacements: &[Replacement]) -> Option<Rewritten> {
    rewrite_lines(content, replacements, None)
}

/// Rewrites the file at `path`, preferring `line` and falling back to the
/// whole file. Returns `None`, leaving the file untouched, when no spelling
/// matched anywhere.
pub fn rewrite_file(
    path: &Path,
    line: Option<usize>,
    replacements: &[Replacement],
) -> Result<Option<FileRewrite>, RewriteError> {
    let content = std::fs::read_to_string(path).map_err(|source| RewriteError::Read {
        path: path.to_path_buf(),
        source,
    })?;

    let targeted = line
        .filter(|l| *l > 0)
        .and_then(|l| rewrite_line(&content, l, replacements))
        .map(|r| (RewriteScope::Line, r));
    let Some((scope, rewritten)) = targeted
        .or_else(|| rewrite_content(&content, replacements).map(|r| (RewriteScope::WholeFile, r)))
    else {
        return Ok(None);
    };

    atomic::write_file(path, rewritten.content.as_bytes()).map_err(|source| RewriteError::Write {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(Some(FileRewrite {
        scope,
        spellings: rewritten.spellings,
        lines: rewritten.lines,
    }))
}

fn rewrite_lines(
    content: &str,
    replacements: &[Replacement],
    only: Option<usize>,
) -> Option<Rewritten> {
    let lines: Vec<&str> = content.split_inclusive('\n').collect();
    let contexts = line_contexts(&lines);

    let mut out = String::with_capacity(content.len());
    let mut spellings: Vec<Spelling> = Vec::new();
    let mut changed: Vec<usize> = Vec::new();

    for (idx, (line, context)) in lines.iter().zip(contexts).enumerate() {
        let line_no = idx + 1;
        if only.is_some_and(|l| l != line_no) {
            out.push_str(line);
            continue;
        }
        let (text, ending) = split_ending(line);
        match rewrite_text(text, context, replacements) {
            Some((new_text, used)) => {
                out.push_str(&new_text);
                out.push_str(ending);
                changed.push(line_no);
                for s in used {
                    if !spellings.contains(&s) {
                        spellings.push(s);
                    }
                }
            }
            None => out.push_str(line),
        }
    }

    if changed.is_empty() {
        return None;
    }
    spellings.sort_by_key(|s| RULES.iter().position(|r| r.spelling == *s));
    Some(Rewritten {
        content: out,
        spellings,
        lines: changed,
    })
}

fn rewrite_text(
    text: &str,
    context: LineContext,
    replacements: &[Replacement],
) -> Option<(String, Vec<Spelling>)> {
    let mut current = text.to_string();
    let mut used = Vec::new();
    for replacement in replacements {
        if replacement.old.is_empty() || replacement.old == replacement.new {
            continue;
        }
        for rule in RULES.iter().filter(|r| r.contexts.contains(&context)) {
            if let Some(next) = (rule.apply)(&current, replacement) {
                current = next;
                if !used.contains(&rule.spelling) {
                    used.push(rule.spelling);
                }
            }
        }
    }
    (!used.is_empty()).then_some((current, used))
}

fn line_contexts(lines: &[&str]) -> Vec<LineContext> {
    let close = match lines.first() {
        Some(first) if first.trim() == "---" => lines
            .iter()
            .skip(1)
            .position(|l| l.trim() == "---")
            .map(|i| i + 1),
        _ => None,
    };

    let mut fence = FenceState::default();
    lines
        .iter()
        .enumerate()
        .map(|(idx, line)| match close {
            Some(close) if idx <= close => LineContext::Frontmatter,
            _ if fence.in_code(line) => LineContext::Code,
            _ if typedecl::is_decl_line(line) => LineContext::TypeDecl,
            _ => LineContext::Body,
        })
        .collect()
}

fn split_ending(line: &str) -> (&str, &str) {
    if let Some(text) = line.strip_suffix("\r\n") {
        (text, "\r\n")
    } else if let Some(text) = line.strip_suffix('\n') {
        (text, "\n")
    } else {
        (line, "")
    }
}

fn changed(before: &str, after: String) -> Option<String> {
    (after != before).then_some(after)
}

fn bracketed(line: &str, r: &Replacement) -> Option<String> {
    let mut out = line.to_string();
    for (open, close) in [("[[", "]]"), ("[[", "|"), ("[[", "#")] {
        out = out.replace(
            &format!("{open}{}{close}", r.old),
            &format!("{open}{}{close}", r.new),
        );
    }
    changed(line, out)
}

fn frontmatter_scalar(line: &str, r: &Replacement) -> Option<String> {
    replace_whole_value(&FRONTMATTER_SCALAR_RE, line, r)
}

fn frontmatter_list_item(line: &str, r: &Replacement) -> Option<String> {
    replace_whole_value(&FRONTMATTER_LIST_ITEM_RE, line, r)
}

/// Replaces a `prefix value suffix` line whose unquoted value is `r.old`.
fn replace_whole_value(re: &Regex, line: &str, r: &Replacement) -> Option<String> {
    let caps = re.captures(line)?;
    let value = caps.name("value")?.as_str();
    let (quote, inner) = unquote(value);
    if inner != r.old {
        return None;
    }
    Some(format!(
        "{}{quote}{}{quote}{}",
        &caps["prefix"], r.new, &caps["suffix"]
    ))
}

fn unquote(value: &str) -> (&str, &str) {
    for q in ["\"", "'"] {
        if value.len() >= 2 && value.starts_with(q) && value.ends_with(q) {
            return (q, &value[1..value.len() - 1]);
        }
    }
    ("", value)
}

fn inline_array_element(line: &str, r: &Replacement) -> Option<String> {
    if !line.contains('[') {
        return None;
    }
    let pattern = format!(
        r#"(?P<pre>[\[,][ \t]*)(?P<open>["']?){}(?P<close>["']?)(?P<post>[ \t]*[,\]])"#,
        regex::escape(&r.old)
    );
    replace_delimited(&pattern, line, r)
}

fn type_decl_field(line: &str, r: &Replacement) -> Option<String> {
    let pattern = format!(
        r#"(?P<pre>=[ \t]*)(?P<open>["']?){}(?P<close>["']?)(?P<post>[ \t]*[,)])"#,
        regex::escape(&r.old)
    );
    replace_delimited(&pattern, line, r)
}

/// Replaces `pre open old close post` occurrences where the quotes pair up.
/// Runs until stable so `[old, old]` is fully rewritten even though the
/// shared `,` can only be consumed by one match per pass.
fn replace_delimited(pattern: &str, line: &str, r: &Replacement) -> Option<String> {
    let re = Regex::new(pattern).ok()?;
    let mut current = line.to_string();
    for _ in 0..MAX_PASSES {
        let next = re
            .replace_all(&current, |caps: &Captures| {
                if caps["open"] != caps["close"] {
                    return caps[0].to_string();
                }
                format!(
                    "{}{}{}{}{}",
                    &caps["pre"], &caps["open"], r.new, &caps["close"], &caps["post"]
                )
            })
            .into_owned();
        if next == current {
            break;
        }
        current = next;
    }
    changed(line, current)
}
