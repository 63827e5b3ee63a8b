//! ISO dates and the relative keywords `today`, `yesterday`, `tomorrow`.

use chrono::{Duration, Local, NaiveDate, NaiveDateTime};

pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Current local date.
pub fn today() -> NaiveDate {
    Local::now().date_naive()
}

/// `true` for a well-formed calendar date in `YYYY-MM-DD` form.
pub fn is_valid_date(s: &str) -> bool {
    looks_like_date_literal(s) && NaiveDate::parse_from_str(s, DATE_FORMAT).is_ok()
}

/// Shape check only: ten characters, digits with dashes at 4 and 7.
pub fn looks_like_date_literal(s: &str) -> bool {
    let b = s.as_bytes();
    b.len() == 10
        && b.iter().enumerate().all(|(i, c)| match i {
            4 | 7 => *c == b'-',
            _ => c.is_ascii_digit(),
        })
}

pub fn is_valid_datetime(s: &str) -> bool {
    if chrono::DateTime::parse_from_rfc3339(s).is_ok() {
        return true;
    }
    ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M"]
        .iter()
        .any(|fmt| NaiveDateTime::parse_from_str(s, fmt).is_ok())
}

/// Resolves a relative keyword against `today`.
pub fn resolve_keyword(s: &str, today: NaiveDate) -> Option<NaiveDate> {
    match s.trim().to_ascii_lowercase().as_str() {
        "today" => Some(today),
        "yesterday" => Some(today - Duration::days(1)),
        "tomorrow" => Some(today + Duration::days(1)),
        _ => None,
    }
}

/// An ISO date or relative keyword as an ISO string; `None` otherwise.
pub fn normalize_date(s: &str, today: NaiveDate) -> Option<String> {
    let s = s.trim();
    if is_valid_date(s) {
        return Some(s.to_string());
    }
    resolve_keyword(s, today).map(|d| d.format(DATE_FORMAT).to_string())
}

/// Leading `YYYY-MM-DD` of a date or datetime string.
pub fn date_prefix(s: &str) -> Option<&str> {
    let candidate = s.get(..10)?;
    is_valid_date(candidate).then_some(candidate)
}
