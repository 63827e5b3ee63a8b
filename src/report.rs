//! Per-item outcome reporting for multi-file operations.
//!
//! A batch never collapses to one success flag: every item gets a status
//! and a machine-readable reason, and the summary counts each status.

use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
    Applied,
    Skipped,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Reason {
    Applied,
    Indexed,
    Removed,
    Unchanged,
    AliasKept,
    NameKept,
    NotFound,
    ParseError,
    ReadFailed,
    WriteFailed,
    IndexFailed,
    Ambiguous,
    DestinationExists,
    InvalidDestination,
}

impl fmt::Display for ItemStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(match self {
            ItemStatus::Applied => "applied",
            ItemStatus::Skipped => "skipped",
            ItemStatus::Error => "error",
        })
    }
}

impl fmt::Display for Reason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Reason::Applied => "applied",
            Reason::Indexed => "indexed",
            Reason::Removed => "removed",
            Reason::Unchanged => "unchanged",
            Reason::AliasKept => "alias_kept",
            Reason::NameKept => "name_kept",
            Reason::NotFound => "not_found",
            Reason::ParseError => "parse_error",
            Reason::ReadFailed => "read_failed",
            Reason::WriteFailed => "write_failed",
            Reason::IndexFailed => "index_failed",
            Reason::Ambiguous => "ambiguous",
            Reason::DestinationExists => "destination_exists",
            Reason::InvalidDestination => "invalid_destination",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchItem {
    pub id: String,
    pub status: ItemStatus,
    pub reason: Reason,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BatchSummary {
    pub applied: usize,
    pub skipped: usize,
    pub errors: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchReport {
    pub items: Vec<BatchItem>,
    pub summary: BatchSummary,
}

impl BatchReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(
        &mut self,
        id: impl Into<String>,
        status: ItemStatus,
        reason: Reason,
        detail: Option<String>,
    ) {
        match status {
            ItemStatus::Applied => self.summary.applied += 1,
            ItemStatus::Skipped => self.summary.skipped += 1,
            ItemStatus::Error => self.summary.errors += 1,
        }
        self.items.push(BatchItem {
            id: id.into(),
            status,
            reason,
            detail,
        });
    }

    pub fn applied(&mut self, id: impl Into<String>, reason: Reason) {
        self.push(id, ItemStatus::Applied, reason, None);
    }

    pub fn skipped(&mut self, id: impl Into<String>, reason: Reason, detail: Option<String>) {
        self.push(id, ItemStatus::Skipped, reason, detail);
    }

    pub fn error(&mut self, id: impl Into<String>, reason: Reason, detail: impl Into<String>) {
        self.push(id, ItemStatus::Error, reason, Some(detail.into()));
    }

    /// Appends another report's items, keeping the counts in step.
    pub fn extend(&mut self, other: BatchReport) {
        for item in other.items {
            self.push(item.id, item.status, item.reason, item.detail);
        }
    }

    pub fn has_errors(&self) -> bool {
        self.summary.errors > 0
    }

    pub fn errors(&self) -> impl Iterator<Item = &BatchItem> {
        self.items.iter().filter(|i| i.status == ItemStatus::Error)
    }
}

impl fmt::Display for BatchSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} applied, {} skipped, {} errors",
            self.applied, self.skipped, self.errors
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_tracks_items() {
        let mut report = BatchReport::new();
        report.applied("a.md", Reason::Indexed);
        report.skipped("b.md", Reason::Unchanged, None);
        report.error("c.md", Reason::ParseError, "bad yaml");

        let mut other = BatchReport::new();
        other.error("d.md", Reason::WriteFailed, "disk full");
        report.extend(other);

        assert_eq!(
            report.summary,
            BatchSummary {
                applied: 1,
                skipped: 1,
                errors: 2
            }
        );
        assert!(report.has_errors());
        assert_eq!(report.errors().count(), 2);
        assert_eq!(report.summary.to_string(), "1 applied, 1 skipped, 2 errors");
    }

    #[test]
    fn test_serializes_machine_readable_reasons() {
        let mut report = BatchReport::new();
        report.skipped("people/freya", Reason::DestinationExists, None);
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["items"][0]["status"], "skipped");
        assert_eq!(json["items"][0]["reason"], "destination_exists");
        assert!(json["items"][0].get("detail").is_none());
        assert_eq!(json["summary"]["skipped"], 1);
    }
}
