//! Per-operation outcome counters
//!
//! Engines return these so the caller can tell what was retained, what
//! moved over the wire and what failed. All of them serialize to JSON for
//! machine consumption and implement `Display` for a terse summary.

use crate::indexer::IndexReport;
use serde::Serialize;
use std::fmt;

/// Outcome of a backup run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BackupReport {
    pub canonical: IndexReport,
    pub folders: Vec<IndexReport>,
    /// Folders whose pass failed; their previous snapshot was kept.
    pub failed_folders: Vec<String>,
    /// Message records in the saved index.
    pub messages: usize,
}

impl BackupReport {
    fn all(&self) -> impl Iterator<Item = &IndexReport> {
        std::iter::once(&self.canonical).chain(&self.folders)
    }

    #[must_use]
    pub fn retained(&self) -> usize {
        self.all().map(|r| r.retained).sum()
    }

    #[must_use]
    pub fn resolved(&self) -> usize {
        self.all().map(|r| r.resolved).sum()
    }

    #[must_use]
    pub fn downloaded(&self) -> usize {
        self.all().map(|r| r.downloaded).sum()
    }

    #[must_use]
    pub fn skipped(&self) -> usize {
        self.all().map(|r| r.skipped).sum()
    }
}

impl fmt::Display for BackupReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{} messages, {} folders ({} failed)",
            self.messages,
            self.folders.len() + 1,
            self.failed_folders.len()
        )?;
        writeln!(
            f,
            "retained {}, resolved {}, downloaded {}, duplicates {}, skipped {}",
            self.retained(),
            self.resolved(),
            self.downloaded(),
            self.canonical.duplicates,
            self.skipped()
        )?;
        for folder in &self.failed_folders {
            writeln!(f, "  failed: {folder}")?;
        }
        Ok(())
    }
}

/// Outcome of a restore run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RestoreReport {
    pub uploaded: usize,
    pub upload_failed: usize,
    pub copied: usize,
    pub copy_failed: usize,
    pub folders_created: Vec<String>,
    /// Folders that could not be reconciled this run.
    pub failed_folders: Vec<String>,
}

impl RestoreReport {
    /// Whether every upload and copy went through.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.upload_failed == 0 && self.copy_failed == 0 && self.failed_folders.is_empty()
    }
}

impl fmt::Display for RestoreReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "uploaded {} ({} failed), copied {} ({} failed)",
            self.uploaded, self.upload_failed, self.copied, self.copy_failed
        )?;
        for folder in &self.folders_created {
            writeln!(f, "  created: {folder}")?;
        }
        for folder in &self.failed_folders {
            writeln!(f, "  failed: {folder}")?;
        }
        Ok(())
    }
}

/// Outcome of a maintenance pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MaintenanceReport {
    pub dry_run: bool,
    pub scanned: usize,
    /// Unreferenced payloads deleted (or that would be, on a dry run).
    pub purged: usize,
    /// Payloads moved to a recomputed key.
    pub rekeyed: usize,
    /// Payloads whose recomputed key already held different bytes.
    pub conflicts: usize,
}

impl fmt::Display for MaintenanceReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let prefix = if self.dry_run { "dry run: " } else { "" };
        writeln!(
            f,
            "{prefix}scanned {}, purged {}, rekeyed {}, conflicts {}",
            self.scanned, self.purged, self.rekeyed, self.conflicts
        )
    }
}
