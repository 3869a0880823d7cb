//! Offline store maintenance
//!
//! Two passes over the content store, neither of which talks to the
//! server:
//!
//! - **purge** deletes payloads the message records no longer reference.
//! - **re-identify** recomputes each referenced payload's hash from its
//!   stored headers and moves it, and every index reference, to the new
//!   key when the hash changed.
//!
//! Both honour [`SyncConfig::dry_run`], which turns them into reports.

use crate::config::SyncConfig;
use crate::error::{Error, Result};
use crate::identity::{ContentHash, HeaderFields, identify};
use crate::index::{IndexFiles, SyncIndex};
use crate::report::MaintenanceReport;
use crate::store::{ContentStore, StoreEntry};
use tracing::{debug, info, warn};

pub struct MaintenanceEngine {
    config: SyncConfig,
}

impl MaintenanceEngine {
    #[must_use]
    pub const fn new(config: SyncConfig) -> Self {
        Self { config }
    }

    #[must_use]
    pub fn store(&self) -> ContentStore {
        ContentStore::new(self.config.store_dir())
    }

    #[must_use]
    pub fn index_files(&self) -> IndexFiles {
        IndexFiles::in_dir(self.config.store_dir(), self.config.backlog_depth)
    }

    fn report(&self) -> MaintenanceReport {
        MaintenanceReport {
            dry_run: self.config.dry_run,
            ..MaintenanceReport::default()
        }
    }

    /// Delete every payload whose key no record references.
    ///
    /// Disambiguated `<hash>.<uid>` payloads have no record of their own.
    /// They survive as long as `<hash>` is indexed, and go with it.
    ///
    /// # Errors
    ///
    /// Fails if the store cannot be listed or a payload cannot be removed.
    pub fn purge(&self, store: &ContentStore, index: &SyncIndex) -> Result<MaintenanceReport> {
        let mut report = self.report();
        let entries: Vec<StoreEntry> = store.entries()?.collect::<Result<_>>()?;

        for entry in entries {
            report.scanned += 1;
            if is_referenced(&entry.key, index) {
                continue;
            }

            report.purged += 1;
            if self.config.dry_run {
                info!("Would purge {}", entry.key);
            } else {
                store.remove(&entry.key)?;
                info!("Purged {}", entry.key);
            }
        }

        Ok(report)
    }

    /// Recompute the hash of every referenced payload and re-key the
    /// ones whose hash changed. Never deletes unreferenced payloads.
    ///
    /// # Errors
    ///
    /// Fails on store I/O errors. A destination holding different bytes
    /// is counted as a conflict and left alone.
    pub fn reidentify(&self, store: &ContentStore, index: &mut SyncIndex) -> Result<MaintenanceReport> {
        let mut report = self.report();
        let entries: Vec<StoreEntry> = store.entries()?.collect::<Result<_>>()?;

        for entry in entries {
            report.scanned += 1;
            let Some(old) = ContentHash::parse(&entry.key) else {
                continue;
            };
            let Some(record) = index.messages.get(&old) else {
                continue;
            };
            let Some(bytes) = store.get(&entry.key)? else {
                continue;
            };

            let new = identify(&record.internal_date, &HeaderFields::parse(&bytes)).hash;
            if new == old {
                continue;
            }

            if self.config.dry_run {
                info!("Would re-key {old} as {new}");
                report.rekeyed += 1;
                continue;
            }

            match store.rekey(old.as_str(), new.as_str()) {
                Ok(()) => {
                    index.rekey(&old, &new);
                    info!("Re-keyed {old} as {new}");
                    report.rekeyed += 1;
                }
                Err(Error::StoreConflict { from, to }) => {
                    warn!("Cannot re-key {from}: {to} holds different content");
                    report.conflicts += 1;
                }
                Err(e) => return Err(e),
            }
        }

        debug!("Re-identify scanned {} payloads", report.scanned);
        Ok(report)
    }

    /// Purge then re-identify, saving the index unless this is a dry run.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MissingState`] if the index files are missing, so
    /// an absent index never purges the whole store.
    pub fn compact(&self) -> Result<(SyncIndex, MaintenanceReport)> {
        let store = self.store();
        let files = self.index_files();
        if !files.exist() {
            return Err(Error::MissingState(format!(
                "index files not found in {}",
                store.root().display()
            )));
        }

        let mut index = SyncIndex::load(&files);
        let purged = self.purge(&store, &index)?;
        let rekeyed = self.reidentify(&store, &mut index)?;

        if !self.config.dry_run {
            files.rotate()?;
            index.save(&files)?;
        }

        let report = MaintenanceReport {
            dry_run: self.config.dry_run,
            scanned: purged.scanned,
            purged: purged.purged,
            rekeyed: rekeyed.rekeyed,
            conflicts: rekeyed.conflicts,
        };
        Ok((index, report))
    }
}

fn is_referenced(key: &str, index: &SyncIndex) -> bool {
    let hash = ContentHash::parse(key).or_else(|| ContentHash::base_of_disambiguated(key));
    hash.is_some_and(|h| index.messages.contains_key(&h))
}
