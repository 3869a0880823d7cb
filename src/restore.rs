//! Restore from the content store
//!
//! Restoring runs in two steps. First the canonical folder is brought up
//! to date by appending every message it lacks from local bytes. Then
//! each labelled folder is recreated and filled by copying messages out
//! of the canonical folder one at a time, so each failure is attributable
//! to one message.
//!
//! Missing messages are found by UID while a folder's UIDVALIDITY is
//! unchanged, and by content hash after the server renumbered it. UIDs
//! assigned by the server are written back into the index, which is
//! persisted even when some operations failed.

use crate::config::SyncConfig;
use crate::error::{Error, Result};
use crate::folder::{FolderInfo, FolderRole, canonical_name};
use crate::identity::ContentHash;
use crate::index::{IndexFiles, SyncIndex};
use crate::indexer::Indexer;
use crate::mailbox::MailboxAccess;
use crate::report::RestoreReport;
use crate::snapshot::FolderSnapshot;
use crate::store::ContentStore;
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

/// Rebuilds a remote mailbox from the store configured by a [`SyncConfig`].
pub struct RestoreEngine {
    config: SyncConfig,
}

impl RestoreEngine {
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

    /// Load the index, restore, and persist the updated index.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MissingState`] without touching anything if the
    /// store directory or either index file is missing. Otherwise fails
    /// only on errors that stop the whole run; the index is saved first.
    pub async fn run<M: MailboxAccess>(&self, mailbox: &mut M) -> Result<(SyncIndex, RestoreReport)> {
        let store = self.store();
        let files = self.index_files();

        if !store.is_present() {
            return Err(Error::MissingState(format!(
                "store directory {} not found",
                store.root().display()
            )));
        }
        if !files.exist() {
            return Err(Error::MissingState(format!(
                "index files not found in {}",
                store.root().display()
            )));
        }

        let mut index = SyncIndex::load(&files);
        let outcome = self.restore(mailbox, &store, &mut index).await;

        files.rotate()?;
        index.save(&files)?;
        outcome.map(|report| (index, report))
    }

    /// Reconcile the remote mailbox with `index`, updating its UIDs in
    /// place.
    ///
    /// # Errors
    ///
    /// Fails if folders cannot be listed, the canonical folder cannot be
    /// reconciled, or local storage fails. Individual appends and copies
    /// are counted, not propagated.
    pub async fn restore<M: MailboxAccess>(
        &self,
        mailbox: &mut M,
        store: &ContentStore,
        index: &mut SyncIndex,
    ) -> Result<RestoreReport> {
        let mut report = RestoreReport::default();

        let folders = mailbox.list_folders().await?;
        let local = local_canonical(index, &self.config.canonical_folder);
        let remote = canonical_name(&folders, &local).to_string();
        info!("Restoring into {remote}");

        self.restore_canonical(mailbox, store, index, &local, &remote, &mut report)
            .await?;

        // Copies address messages by their UID in the canonical folder.
        let canonical_uids: BTreeMap<ContentHash, u32> = index
            .folders
            .get(&local)
            .map(|s| {
                s.hash_to_uid()
                    .into_iter()
                    .map(|(hash, uid)| (hash.clone(), uid))
                    .collect()
            })
            .unwrap_or_default();

        let labelled: Vec<String> = index
            .folders
            .iter()
            .filter(|(name, snapshot)| {
                **name != local
                    && **name != remote
                    && !snapshot.roles.iter().any(|r| r.is_ignored())
                    && !self.config.is_ignored_name(name)
            })
            .map(|(name, _)| name.clone())
            .collect();

        for name in labelled {
            let listed = folders.iter().find(|f| f.name == name);
            if listed.is_some_and(|f| !f.selectable || f.has_ignored_role()) {
                debug!("Skipping {name}");
                continue;
            }

            let result = self
                .restore_folder(
                    mailbox,
                    index,
                    (&remote, &canonical_uids),
                    &name,
                    listed,
                    &mut report,
                )
                .await;
            match result {
                Ok(()) => {}
                Err(e) if e.is_transient() => {
                    warn!("Could not restore {name}: {e}");
                    report.failed_folders.push(name);
                }
                Err(e) => return Err(e),
            }
        }

        info!(
            "Restore finished: {} uploaded, {} copied, {} failed",
            report.uploaded,
            report.copied,
            report.upload_failed + report.copy_failed
        );
        Ok(report)
    }

    async fn restore_canonical<M: MailboxAccess>(
        &self,
        mailbox: &mut M,
        store: &ContentStore,
        index: &mut SyncIndex,
        local: &str,
        remote: &str,
        report: &mut RestoreReport,
    ) -> Result<()> {
        let prior = index.folders.get(local).cloned();
        let roles = prior
            .as_ref()
            .map(|p| p.roles.clone())
            .unwrap_or_else(|| vec![FolderRole::AllMail]);

        let fresh = FolderSnapshot::observe(mailbox, remote, roles.clone(), self.batch()).await?;
        if !fresh.usable {
            return Err(Error::FolderUnavailable(format!(
                "{remote}: UID retrieval incomplete"
            )));
        }

        let mut needs_reindex = false;
        let (mut snapshot, missing) = match prior {
            Some(prior) if fresh.same_epoch(Some(&prior)) => {
                let mut missing: Vec<(Option<u32>, ContentHash)> = prior
                    .missing_from(&fresh)
                    .into_iter()
                    .filter_map(|uid| prior.messages.get(&uid).map(|h| (Some(uid), h.clone())))
                    .collect();
                // Records left unmapped by an earlier failed upload.
                {
                    let mapped = prior.hashes();
                    missing.extend(
                        index
                            .messages
                            .keys()
                            .filter(|h| !mapped.contains(h))
                            .map(|h| (None, h.clone())),
                    );
                }
                (prior, missing)
            }
            _ => {
                info!("{remote}: UIDVALIDITY changed, comparing by content");
                let (reindexed, _) = Indexer::new(&mut *mailbox, self.batch())
                    .index_folder(remote, roles.clone(), None, None)
                    .await?;
                let missing: Vec<(Option<u32>, ContentHash)> = {
                    let present = reindexed.hashes();
                    index
                        .messages
                        .keys()
                        .filter(|h| !present.contains(h))
                        .map(|h| (None, h.clone()))
                        .collect()
                };
                needs_reindex = true;
                (reindexed, missing)
            }
        };

        if !missing.is_empty() {
            info!("{remote}: uploading {} messages", missing.len());
            mailbox.select(remote, false).await?;
        }

        for (old_uid, hash) in missing {
            let Some(record) = index.messages.get(&hash) else {
                warn!(hash = %hash, "Mapped message has no record; cannot upload");
                report.upload_failed += 1;
                continue;
            };
            let Some(bytes) = store.get(hash.as_str())? else {
                warn!(hash = %hash, "No stored content; cannot upload");
                report.upload_failed += 1;
                continue;
            };

            let appended = mailbox
                .append(remote, &record.flags, &record.internal_date, &bytes)
                .await;
            match appended {
                Ok(new_uid) => {
                    report.uploaded += 1;
                    if let Some(old_uid) = old_uid {
                        snapshot.messages.remove(&old_uid);
                    }
                    match new_uid {
                        Some(uid) => {
                            snapshot.messages.insert(uid, hash.clone());
                            if let Some(record) = index.messages.get_mut(&hash) {
                                record.uid = uid;
                            }
                        }
                        None => {
                            warn!(hash = %hash, "Server did not reveal the new UID");
                            needs_reindex = true;
                        }
                    }
                }
                Err(e) if e.is_transient() => {
                    warn!(hash = %hash, "Upload failed: {e}");
                    report.upload_failed += 1;
                }
                Err(e) => return Err(e),
            }
        }
        snapshot.sync_uids();

        if needs_reindex {
            let (reindexed, _) = Indexer::new(&mut *mailbox, self.batch())
                .index_folder(remote, roles, Some(&snapshot), None)
                .await?;
            {
                let uids = reindexed.hash_to_uid();
                for record in index.messages.values_mut() {
                    if let Some(uid) = uids.get(&record.hash) {
                        record.uid = *uid;
                    }
                }
            }
            snapshot = reindexed;
        }

        snapshot.name = local.to_string();
        index.folders.insert(local.to_string(), snapshot);
        Ok(())
    }

    async fn restore_folder<M: MailboxAccess>(
        &self,
        mailbox: &mut M,
        index: &mut SyncIndex,
        (canonical, canonical_uids): (&str, &BTreeMap<ContentHash, u32>),
        name: &str,
        listed: Option<&FolderInfo>,
        report: &mut RestoreReport,
    ) -> Result<()> {
        let Some(old) = index.folders.get(name).cloned() else {
            return Ok(());
        };

        if listed.is_none() {
            mailbox.create(name).await?;
            info!("Created folder {name}");
            report.folders_created.push(name.to_string());
        }

        let fresh =
            FolderSnapshot::observe(mailbox, name, old.roles.clone(), self.batch()).await?;
        if !fresh.usable {
            return Err(Error::FolderUnavailable(format!(
                "{name}: UID retrieval incomplete"
            )));
        }

        let (missing, basis): (Vec<ContentHash>, FolderSnapshot) = if fresh.same_epoch(Some(&old))
        {
            let missing = old
                .missing_from(&fresh)
                .into_iter()
                .filter_map(|uid| old.messages.get(&uid).cloned())
                .collect();
            (missing, old.clone())
        } else {
            let (reindexed, _) = Indexer::new(&mut *mailbox, self.batch())
                .index_folder(name, old.roles.clone(), None, None)
                .await?;
            let missing = old.hashes_missing_from(&reindexed);
            if missing.is_empty() {
                let mut adopted = old;
                if adopted.adopt(&reindexed) {
                    index.folders.insert(name.to_string(), adopted);
                }
                return Ok(());
            }
            (missing, reindexed)
        };

        if missing.is_empty() {
            return Ok(());
        }

        info!("{name}: copying {} messages", missing.len());
        mailbox.select(canonical, true).await?;

        let mut all_copied = true;
        for hash in &missing {
            let Some(&uid) = canonical_uids.get(hash) else {
                warn!(folder = name, hash = %hash, "Message not in {canonical}; cannot copy");
                report.copy_failed += 1;
                all_copied = false;
                continue;
            };
            match mailbox.copy(uid, name).await {
                Ok(()) => report.copied += 1,
                Err(e) if e.is_transient() => {
                    warn!(folder = name, hash = %hash, "Copy failed: {e}");
                    report.copy_failed += 1;
                    all_copied = false;
                }
                Err(e) => return Err(e),
            }
        }

        let (after, _) = Indexer::new(&mut *mailbox, self.batch())
            .index_folder(name, old.roles.clone(), Some(&basis), None)
            .await?;

        let mut snapshot = old;
        if all_copied && snapshot.adopt(&after) {
            debug!("{name}: took UIDs from the re-index");
        } else if after.same_epoch(Some(&snapshot)) {
            snapshot.patch(&after);
        } else {
            debug!("{name}: UIDs unresolved; leaving them for the next run");
        }
        index.folders.insert(name.to_string(), snapshot);
        Ok(())
    }

    const fn batch(&self) -> u32 {
        self.config.search_batch
    }
}

/// The index's canonical folder: the snapshot carrying the all-messages
/// role, else the configured fallback name.
fn local_canonical(index: &SyncIndex, fallback: &str) -> String {
    index
        .folders
        .values()
        .find(|s| s.roles.contains(&FolderRole::AllMail))
        .map_or_else(|| fallback.to_string(), |s| s.name.clone())
}
