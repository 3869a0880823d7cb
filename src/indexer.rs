//! Folder indexing
//!
//! Builds a fresh [`FolderSnapshot`] of one folder, carries over what the
//! previous snapshot already resolved, and fetches identity headers only
//! for the remaining UIDs.
//!
//! The canonical folder is indexed in record mode: each new hash gets a
//! [`MessageRecord`] and its raw bytes go to the content store. Every
//! other folder is indexed in membership mode, which only appends the
//! folder name to existing records.

use crate::error::{Error, Result};
use crate::folder::FolderRole;
use crate::identity::{ContentHash, HeaderFields, Identity, identify};
use crate::index::{MessageRecord, Records};
use crate::mailbox::{HeaderFetch, MailboxAccess};
use crate::snapshot::{Carry, FolderSnapshot};
use crate::store::{ContentStore, Put};
use serde::Serialize;
use tracing::{debug, warn};

/// Counters for one indexed folder.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IndexReport {
    pub folder: String,
    /// UIDs carried over from the previous snapshot.
    pub retained: usize,
    /// UIDs resolved by fetching headers.
    pub resolved: usize,
    /// Payloads written to the content store.
    pub downloaded: usize,
    /// UIDs whose hash collided with another message's.
    pub duplicates: usize,
    /// UIDs left unresolved after a remote failure.
    pub skipped: usize,
    /// Hashes absent from the message records (membership mode).
    pub unindexed: usize,
}

/// Resolves folder UIDs to content hashes over one mailbox session.
pub struct Indexer<'a, M> {
    mailbox: &'a mut M,
    search_batch: u32,
}

impl<'a, M: MailboxAccess> Indexer<'a, M> {
    pub const fn new(mailbox: &'a mut M, search_batch: u32) -> Self {
        Self {
            mailbox,
            search_batch,
        }
    }

    async fn observe(&mut self, folder: &str, roles: Vec<FolderRole>) -> Result<FolderSnapshot> {
        let snapshot =
            FolderSnapshot::observe(&mut *self.mailbox, folder, roles, self.search_batch).await?;
        if !snapshot.usable {
            return Err(Error::FolderUnavailable(format!(
                "{folder}: UID retrieval incomplete"
            )));
        }
        Ok(snapshot)
    }

    async fn identify_uid(&mut self, uid: u32) -> Result<(HeaderFetch, Identity)> {
        let fetched = self.mailbox.fetch_header(uid).await?;
        let identity = identify(&fetched.internal_date, &HeaderFields::parse(&fetched.header));
        if identity.is_low_confidence() {
            warn!(
                uid,
                hash = %identity.hash,
                "Only {} identity fields populated; collisions are likely",
                identity.populated
            );
        }
        Ok((fetched, identity))
    }

    /// Index a non-canonical folder.
    ///
    /// With `records`, each resolved hash gains this folder as a
    /// membership; without, only the UID mapping is built.
    ///
    /// # Errors
    ///
    /// Fails if the folder cannot be selected or its UIDs cannot all be
    /// retrieved. Individual header fetch failures are skipped.
    pub async fn index_folder(
        &mut self,
        folder: &str,
        roles: Vec<FolderRole>,
        prior: Option<&FolderSnapshot>,
        mut records: Option<&mut Records>,
    ) -> Result<(FolderSnapshot, IndexReport)> {
        let mut snapshot = self.observe(folder, roles).await?;
        let carry = match records.as_deref_mut() {
            Some(records) => Carry::Append { records },
            None => Carry::MappingOnly,
        };
        let unresolved = snapshot.carry_over(prior, carry);

        let mut report = IndexReport {
            folder: folder.to_string(),
            retained: snapshot.messages.len(),
            ..IndexReport::default()
        };

        let total = unresolved.len();
        for (i, uid) in unresolved.into_iter().enumerate() {
            debug!(folder, "{}/{}", i + 1, total);

            let identity = match self.identify_uid(uid).await {
                Ok((_, identity)) => identity,
                Err(e) if e.is_transient() => {
                    warn!(folder, uid, "Skipping message: {e}");
                    report.skipped += 1;
                    continue;
                }
                Err(e) => return Err(e),
            };

            if let Some(records) = records.as_deref_mut() {
                match records.get_mut(&identity.hash) {
                    Some(record) => {
                        record.add_folder(folder);
                    }
                    None => {
                        warn!(
                            folder,
                            uid,
                            hash = %identity.hash,
                            "Message not in the index; it probably arrived during this run"
                        );
                        report.unindexed += 1;
                    }
                }
            }

            snapshot.messages.insert(uid, identity.hash);
            report.resolved += 1;
        }

        Ok((snapshot, report))
    }

    /// Index the canonical folder, minting a record per message and
    /// storing payloads that are not on disk yet.
    ///
    /// Records are carried over from `prior_records` wholesale. A second
    /// UID hashing to an already-seen value is stored under a
    /// disambiguated key and gets no record. It also stays unmapped in the
    /// snapshot, so every run fetches its header again and logs the
    /// collision once more; its payload is only downloaded the first time.
    ///
    /// # Errors
    ///
    /// Fails if the folder cannot be observed or the content store cannot
    /// be written.
    pub async fn index_canonical(
        &mut self,
        folder: &str,
        roles: Vec<FolderRole>,
        prior: Option<&FolderSnapshot>,
        prior_records: &Records,
        records: &mut Records,
        store: &ContentStore,
    ) -> Result<(FolderSnapshot, IndexReport)> {
        let mut snapshot = self.observe(folder, roles).await?;
        let unresolved = snapshot.carry_over(
            prior,
            Carry::Replace {
                records: &mut *records,
                prior: prior_records,
            },
        );

        let mut report = IndexReport {
            folder: folder.to_string(),
            retained: snapshot.messages.len(),
            ..IndexReport::default()
        };

        let total = unresolved.len();
        for (i, uid) in unresolved.into_iter().enumerate() {
            debug!(folder, "{}/{}", i + 1, total);

            match self.resolve_canonical(folder, uid, records, store).await {
                Ok(Resolved::Record { hash, downloaded }) => {
                    snapshot.messages.insert(uid, hash);
                    report.resolved += 1;
                    report.downloaded += usize::from(downloaded);
                }
                Ok(Resolved::Duplicate { downloaded }) => {
                    report.duplicates += 1;
                    report.downloaded += usize::from(downloaded);
                }
                Err(e) if e.is_transient() => {
                    warn!(folder, uid, "Skipping message: {e}");
                    report.skipped += 1;
                }
                Err(e) => return Err(e),
            }
        }

        Ok((snapshot, report))
    }

    async fn resolve_canonical(
        &mut self,
        folder: &str,
        uid: u32,
        records: &mut Records,
        store: &ContentStore,
    ) -> Result<Resolved> {
        let (fetched, identity) = self.identify_uid(uid).await?;
        let hash = identity.hash;

        if records.contains_key(&hash) {
            let key = hash.disambiguated(uid);
            warn!(
                folder,
                uid,
                hash = %hash,
                "Another message has the same identity; storing as {key}"
            );
            let downloaded = self.download(uid, &key, store).await?;
            return Ok(Resolved::Duplicate { downloaded });
        }

        let downloaded = self.download(uid, hash.as_str(), store).await?;
        records.insert(
            hash.clone(),
            MessageRecord {
                hash: hash.clone(),
                flags: fetched.flags,
                internal_date: fetched.internal_date,
                uid,
                folders: vec![folder.to_string()],
            },
        );
        Ok(Resolved::Record { hash, downloaded })
    }

    /// Fetch and store the payload for `key` unless it is already on disk.
    async fn download(&mut self, uid: u32, key: &str, store: &ContentStore) -> Result<bool> {
        if store.exists(key) {
            return Ok(false);
        }
        let bytes = self.mailbox.fetch_raw(uid).await?;
        Ok(store.put(key, &bytes)? == Put::Inserted)
    }
}

enum Resolved {
    Record { hash: ContentHash, downloaded: bool },
    Duplicate { downloaded: bool },
}
