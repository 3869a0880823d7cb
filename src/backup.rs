//! Incremental backup
//!
//! A backup indexes the canonical folder first, minting records and
//! downloading payloads that are not on disk yet, checkpoints the message
//! records, then walks every other folder to collect memberships.

use crate::config::SyncConfig;
use crate::error::Result;
use crate::folder::{FolderInfo, FolderRole, canonical_name};
use crate::index::{IndexFiles, SyncIndex};
use crate::indexer::Indexer;
use crate::mailbox::MailboxAccess;
use crate::report::BackupReport;
use crate::store::ContentStore;
use tracing::{info, warn};

/// Runs backups into the store configured by a [`SyncConfig`].
pub struct BackupEngine {
    config: SyncConfig,
}

impl BackupEngine {
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

    /// Load the previous index from disk and back up on top of it.
    ///
    /// # Errors
    ///
    /// See [`BackupEngine::backup`].
    pub async fn run<M: MailboxAccess>(&self, mailbox: &mut M) -> Result<(SyncIndex, BackupReport)> {
        let store = self.store();
        store.ensure()?;
        let prior = SyncIndex::load(&self.index_files());
        self.backup(mailbox, &store, &prior).await
    }

    /// Back up the mailbox against `prior`, persisting the new index.
    ///
    /// # Errors
    ///
    /// Fails if folders cannot be listed, the canonical folder cannot be
    /// indexed, or the store or index cannot be written. A failing
    /// non-canonical folder keeps its previous snapshot instead.
    pub async fn backup<M: MailboxAccess>(
        &self,
        mailbox: &mut M,
        store: &ContentStore,
        prior: &SyncIndex,
    ) -> Result<(SyncIndex, BackupReport)> {
        let files = self.index_files();
        files.rotate()?;

        let folders = mailbox.list_folders().await?;
        let canonical = canonical_name(&folders, &self.config.canonical_folder).to_string();
        info!("Backing up {} folders; canonical folder is {canonical}", folders.len());

        let mut index = SyncIndex::default();
        let mut report = BackupReport::default();
        let mut indexer = Indexer::new(mailbox, self.config.search_batch);

        let (snapshot, canonical_report) = indexer
            .index_canonical(
                &canonical,
                roles_of(&folders, &canonical),
                prior.folders.get(&canonical),
                &prior.messages,
                &mut index.messages,
                store,
            )
            .await?;
        info!(
            "{canonical}: {} retained, {} new, {} downloaded",
            canonical_report.retained, canonical_report.resolved, canonical_report.downloaded
        );
        index.folders.insert(canonical.clone(), snapshot);
        report.canonical = canonical_report;

        index.save_messages(&files)?;

        for folder in folders.iter().filter(|f| self.is_labelled(f, &canonical)) {
            let name = folder.name.as_str();
            let result = indexer
                .index_folder(
                    name,
                    folder.roles.clone(),
                    prior.folders.get(name),
                    Some(&mut index.messages),
                )
                .await;

            match result {
                Ok((snapshot, folder_report)) => {
                    info!(
                        "{name}: {} retained, {} new",
                        folder_report.retained, folder_report.resolved
                    );
                    index.folders.insert(name.to_string(), snapshot);
                    report.folders.push(folder_report);
                }
                Err(e) if e.is_transient() => {
                    warn!("Keeping previous state of {name}: {e}");
                    report.failed_folders.push(name.to_string());
                    if let Some(old) = prior.folders.get(name) {
                        for hash in old.messages.values() {
                            if let Some(record) = index.messages.get_mut(hash) {
                                record.add_folder(name);
                            }
                        }
                        index.folders.insert(name.to_string(), old.clone());
                    }
                }
                Err(e) => return Err(e),
            }
        }

        index.save(&files)?;
        report.messages = index.messages.len();
        Ok((index, report))
    }

    /// Folders indexed for membership: selectable, not canonical, not
    /// spam or trash by role or by name.
    fn is_labelled(&self, folder: &FolderInfo, canonical: &str) -> bool {
        folder.selectable
            && folder.name != canonical
            && !folder.has_ignored_role()
            && !self.config.is_ignored_name(&folder.name)
    }
}

fn roles_of(folders: &[FolderInfo], name: &str) -> Vec<FolderRole> {
    folders
        .iter()
        .find(|f| f.name == name)
        .map(|f| f.roles.clone())
        .unwrap_or_default()
}
