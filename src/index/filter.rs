//! Trait value filters: `a`, `a|b`, `!a`, `!a|!b`.
//!
//! `|` joins alternatives with OR, except when every alternative is negated:
//! `!done|!cancelled` means neither (NOT IN). Date words and ISO dates are
//! resolved before comparison, so `due` traits can be filtered by `today`.

use chrono::NaiveDate;

use crate::dates;
use crate::error::IndexError;

/// SQL condition over `column` plus its bind values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Condition {
    pub sql: String,
    pub args: Vec<String>,
}

pub fn value_condition(
    filter: &str,
    column: &str,
    today: NaiveDate,
) -> Result<Condition, IndexError> {
    let mut parts: Vec<(String, String, bool)> = Vec::new();
    for part in filter.split('|') {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }
        let (negated, value) = match part.strip_prefix('!') {
            Some(rest) => (true, rest.trim()),
            None => (false, part),
        };
        let value = resolve_value(value, today)?;
        // a valueless trait is not equal to anything
        let sql = if negated {
            format!("({column} IS NULL OR {column} != ?)")
        } else {
            format!("{column} = ?")
        };
        parts.push((sql, value, negated));
    }

    match parts.len() {
        0 => Ok(Condition {
            sql: "1=1".to_string(),
            args: Vec::new(),
        }),
        1 => {
            let (sql, arg, _) = parts.remove(0);
            Ok(Condition {
                sql,
                args: vec![arg],
            })
        }
        _ => {
            let joiner = if parts.iter().all(|(_, _, negated)| *negated) {
                " AND "
            } else {
                " OR "
            };
            let (conds, args): (Vec<String>, Vec<String>) =
                parts.into_iter().map(|(sql, arg, _)| (sql, arg)).unzip();
            Ok(Condition {
                sql: format!("({})", conds.join(joiner)),
                args,
            })
        }
    }
}

fn resolve_value(value: &str, today: NaiveDate) -> Result<String, IndexError> {
    if let Some(date) = dates::normalize_date(value, today) {
        return Ok(date);
    }
    if dates::looks_like_date_literal(value) {
        return Err(IndexError::InvalidFilter(value.to_string()));
    }
    Ok(value.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 2, 1).unwrap()
    }

    #[test]
    fn test_single_and_or() {
        let c = value_condition("done", "value", today()).unwrap();
        assert_eq!(c.sql, "value = ?");
        assert_eq!(c.args, vec!["done"]);

        let c = value_condition("high|medium", "value", today()).unwrap();
        assert_eq!(c.sql, "(value = ? OR value = ?)");
        assert_eq!(c.args, vec!["high", "medium"]);
    }

    #[test]
    fn test_negation() {
        let c = value_condition("!done", "value", today()).unwrap();
        assert_eq!(c.sql, "(value IS NULL OR value != ?)");

        let c = value_condition("!done|!cancelled", "value", today()).unwrap();
        assert_eq!(
            c.sql,
            "((value IS NULL OR value != ?) AND (value IS NULL OR value != ?))"
        );

        let c = value_condition("open|!done", "value", today()).unwrap();
        assert_eq!(c.sql, "(value = ? OR (value IS NULL OR value != ?))");
    }

    #[test]
    fn test_dates_resolved() {
        let c = value_condition("today|tomorrow", "value", today()).unwrap();
        assert_eq!(c.args, vec!["2025-02-01", "2025-02-02"]);
        assert!(matches!(
            value_condition("2025-13-45", "value", today()),
            Err(IndexError::InvalidFilter(_))
        ));
    }

    #[test]
    fn test_empty_filter_matches_all() {
        assert_eq!(value_condition(" | ", "value", today()).unwrap().sql, "1=1");
    }
}
