//! FTS5 `MATCH` expressions built from free-text user input.

/// Scopes `user_query` to the `content` column.
///
/// An empty query becomes the empty phrase, which matches nothing.
pub fn content_query(user_query: &str) -> String {
    let q = user_query.trim();
    if q.is_empty() {
        return "content:\"\"".to_string();
    }
    // Parenthesized so the column filter covers every boolean operand.
    format!("content: ({})", sanitize(q))
}

/// Quotes every bare token FTS5 would not read as a plain term, such as
/// `new-site`, `don't`, `v1.2` or `what?`. Quoted phrases, parentheses,
/// boolean operators, `prefix*` terms and `col:term` tokens pass through,
/// and an unclosed phrase is closed.
fn sanitize(q: &str) -> String {
    let mut out = String::with_capacity(q.len() + 8);
    let mut in_quotes = false;
    let mut chars = q.char_indices().peekable();

    while let Some((start, c)) = chars.next() {
        if c == '"' {
            in_quotes = !in_quotes;
            out.push(c);
            continue;
        }
        if in_quotes || c.is_whitespace() || c == '(' || c == ')' {
            out.push(c);
            continue;
        }

        let mut end = start + c.len_utf8();
        while let Some(&(i, next)) = chars.peek() {
            if next == '"' || next == '(' || next == ')' || next.is_whitespace() {
                break;
            }
            end = i + next.len_utf8();
            chars.next();
        }
        let token = &q[start..end];

        if is_operator(token) || is_term(token) || is_column_term(token) {
            out.push_str(token);
        } else {
            out.push('"');
            out.push_str(&token.replace('"', "\"\""));
            out.push('"');
        }
    }
    if in_quotes {
        out.push('"');
    }
    out
}

fn is_operator(token: &str) -> bool {
    matches!(
        token.to_ascii_uppercase().as_str(),
        "AND" | "OR" | "NOT" | "NEAR"
    )
}

/// FTS5 bareword characters: ASCII alphanumerics, `_` and anything
/// non-ASCII.
fn is_bareword(token: &str) -> bool {
    !token.is_empty()
        && token
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || !c.is_ascii())
}

fn is_term(token: &str) -> bool {
    is_bareword(token.strip_suffix('*').unwrap_or(token))
}

fn is_column_term(token: &str) -> bool {
    token
        .split_once(':')
        .is_some_and(|(column, term)| is_bareword(column) && is_term(term))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_matches_nothing() {
        assert_eq!(content_query("   "), "content:\"\"");
    }

    #[test]
    fn test_hyphenated_tokens_quoted() {
        assert_eq!(content_query("new-site launch"), "content: (\"new-site\" launch)");
        assert_eq!(content_query("-draft notes"), "content: (\"-draft\" notes)");
    }

    #[test]
    fn test_punctuated_tokens_quoted() {
        assert_eq!(content_query("don't"), "content: (\"don't\")");
        assert_eq!(content_query("v1.2 what?"), "content: (\"v1.2\" \"what?\")");
        assert_eq!(content_query("a+b c.d*"), "content: (\"a+b\" \"c.d*\")");
    }

    #[test]
    fn test_phrases_operators_prefixes_and_columns_kept() {
        assert_eq!(
            content_query("\"road-map draft\" OR (a-b AND c)"),
            "content: (\"road-map draft\" OR (\"a-b\" AND c))"
        );
        assert_eq!(content_query("launch* title:plan"), "content: (launch* title:plan)");
        assert_eq!(content_query("title:x-y"), "content: (\"title:x-y\")");
        assert_eq!(content_query("übung"), "content: (übung)");
    }

    #[test]
    fn test_unclosed_phrase_is_closed() {
        assert_eq!(content_query("say \"hello there"), "content: (say \"hello there\")");
    }
}
