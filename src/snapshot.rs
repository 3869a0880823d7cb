//! Folder snapshots and UID diffing
//!
//! A snapshot records what one folder looked like at one point in time:
//! its UIDVALIDITY, the UIDs it held, and which content hash each UID
//! resolved to. Comparing a fresh snapshot with the previous run's
//! snapshot of the same folder tells the indexer which UIDs it can carry
//! over without touching the server. That comparison is only meaningful
//! while UIDVALIDITY is unchanged; after the server bumps it, every UID
//! has to be resolved again.

use crate::error::{Error, Result};
use crate::folder::FolderRole;
use crate::identity::ContentHash;
use crate::index::Records;
use crate::mailbox::MailboxAccess;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use tracing::{info, warn};

/// Folders above this size get a heads-up log before UID retrieval.
const LARGE_FOLDER: u32 = 5000;

/// One folder's observed state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FolderSnapshot {
    pub name: String,
    #[serde(default)]
    pub roles: Vec<FolderRole>,
    pub uid_validity: u32,
    /// Message count reported by SELECT.
    #[serde(default)]
    pub exists: u32,
    /// UIDs reported by the server, in retrieval order.
    pub uids: Vec<u32>,
    /// Resolved UIDs. Once fully indexed, its keys equal `uids`.
    pub messages: BTreeMap<u32, ContentHash>,
    /// False when UID retrieval was cut short.
    #[serde(skip, default = "usable_default")]
    pub usable: bool,
}

const fn usable_default() -> bool {
    true
}

/// How carry-over treats the global message records.
pub enum Carry<'a> {
    /// Only the UID mapping is carried.
    MappingOnly,
    /// Canonical-folder pass: copy each prior record into `records`
    /// wholesale, resetting its folder list to this folder.
    Replace {
        records: &'a mut Records,
        prior: &'a Records,
    },
    /// Per-folder pass: append this folder to each record's memberships.
    Append { records: &'a mut Records },
}

impl FolderSnapshot {
    #[must_use]
    pub fn new(name: impl Into<String>, roles: Vec<FolderRole>, uid_validity: u32) -> Self {
        Self {
            name: name.into(),
            roles,
            uid_validity,
            exists: 0,
            uids: Vec::new(),
            messages: BTreeMap::new(),
            usable: true,
        }
    }

    /// Select `folder` read-only and collect its UIDs in batches of
    /// `batch` sequence numbers.
    ///
    /// A failed SELECT is an error. A failed batch leaves the snapshot
    /// marked not usable.
    pub async fn observe<M: MailboxAccess>(
        mailbox: &mut M,
        folder: &str,
        roles: Vec<FolderRole>,
        batch: u32,
    ) -> Result<Self> {
        let selected = mailbox
            .select(folder, true)
            .await
            .map_err(|e| Error::FolderUnavailable(format!("{folder}: {e}")))?;

        let mut snapshot = Self::new(folder, roles, selected.uid_validity);
        snapshot.exists = selected.exists;

        if selected.exists > LARGE_FOLDER {
            info!(
                "Retrieving {} message UIDs from {}. This might take a while.",
                selected.exists, folder
            );
        }

        let batch = batch.max(1);
        let mut first = 1u32;
        while first <= selected.exists {
            let last = first.saturating_add(batch - 1).min(selected.exists);
            match mailbox.search_range(first, last).await {
                Ok(uids) => snapshot.uids.extend(uids),
                Err(e) => {
                    warn!("Could not retrieve all UIDs from {folder}: {e}");
                    snapshot.usable = false;
                    break;
                }
            }
            let Some(next) = last.checked_add(1) else {
                break;
            };
            first = next;
        }

        Ok(snapshot)
    }

    /// Both snapshots are usable and share a UIDVALIDITY.
    #[must_use]
    pub fn same_epoch(&self, other: Option<&Self>) -> bool {
        other.is_some_and(|o| self.usable && o.usable && self.uid_validity == o.uid_validity)
    }

    /// Split this snapshot's UIDs into those absent from `other` and
    /// those present in both, preserving order.
    ///
    /// `None` when the epochs differ: every UID is then unresolved.
    #[must_use]
    pub fn diff_and_intersect(&self, other: Option<&Self>) -> Option<(Vec<u32>, Vec<u32>)> {
        if !self.same_epoch(other) {
            return None;
        }
        let theirs: HashSet<u32> = other?.uids.iter().copied().collect();
        let (in_both, only_here) = self
            .uids
            .iter()
            .copied()
            .partition(|uid| theirs.contains(uid));
        Some((only_here, in_both))
    }

    /// Reuse `prior`'s resolved mappings for unchanged UIDs and return
    /// the UIDs that still need resolving.
    ///
    /// UIDs that `prior` listed but never resolved (an interrupted run)
    /// are returned as unresolved.
    pub fn carry_over(&mut self, prior: Option<&Self>, mut carry: Carry<'_>) -> Vec<u32> {
        let Some((mut unresolved, in_both)) = self.diff_and_intersect(prior) else {
            return self.uids.clone();
        };
        let Some(prior) = prior else {
            return self.uids.clone();
        };

        for uid in in_both {
            let Some(hash) = prior.messages.get(&uid) else {
                unresolved.push(uid);
                continue;
            };

            match &mut carry {
                Carry::MappingOnly => {}
                Carry::Replace {
                    records,
                    prior: prior_records,
                } => {
                    let Some(old) = prior_records.get(hash) else {
                        unresolved.push(uid);
                        continue;
                    };
                    let mut record = old.clone();
                    record.uid = uid;
                    record.folders = vec![self.name.clone()];
                    records.insert(hash.clone(), record);
                }
                Carry::Append { records } => match records.get_mut(hash) {
                    Some(record) => {
                        record.add_folder(&self.name);
                    }
                    None => warn!(
                        "{} UID {uid} maps to {hash}, which is not in the message index",
                        self.name
                    ),
                },
            }

            self.messages.insert(uid, hash.clone());
        }

        unresolved
    }

    /// Content hash to UID, for mapping restored messages back to UIDs.
    #[must_use]
    pub fn hash_to_uid(&self) -> BTreeMap<&ContentHash, u32> {
        self.messages.iter().map(|(uid, hash)| (hash, *uid)).collect()
    }

    #[must_use]
    pub fn hashes(&self) -> BTreeSet<&ContentHash> {
        self.messages.values().collect()
    }

    /// Resolved UIDs of this snapshot that `fresh` no longer lists.
    #[must_use]
    pub fn missing_from(&self, fresh: &Self) -> Vec<u32> {
        let present: HashSet<u32> = fresh.uids.iter().copied().collect();
        self.messages
            .keys()
            .copied()
            .filter(|uid| !present.contains(uid))
            .collect()
    }

    /// Hashes of this snapshot that `fresh` has not resolved.
    #[must_use]
    pub fn hashes_missing_from(&self, fresh: &Self) -> Vec<ContentHash> {
        let present = fresh.hashes();
        self.hashes()
            .into_iter()
            .filter(|h| !present.contains(h))
            .cloned()
            .collect()
    }

    /// Take UIDs and UIDVALIDITY from a re-index of the same folder.
    ///
    /// Only applies when the re-index found every hash this snapshot
    /// holds; otherwise returns `false` and leaves the snapshot as it was,
    /// so an unresolved hash can never shadow another's UID.
    pub fn adopt(&mut self, reindexed: &Self) -> bool {
        let fresh = reindexed.hash_to_uid();
        let Some(messages) = self
            .messages
            .values()
            .map(|hash| fresh.get(hash).map(|uid| (*uid, hash.clone())))
            .collect::<Option<BTreeMap<u32, ContentHash>>>()
        else {
            return false;
        };
        self.messages = messages;
        self.uid_validity = reindexed.uid_validity;
        self.exists = reindexed.exists;
        self.sync_uids();
        true
    }

    /// Within one epoch, move each hash whose UID changed in `reindexed`
    /// to its new UID. Hashes `reindexed` lacks stay as they are.
    pub fn patch(&mut self, reindexed: &Self) {
        let fresh = reindexed.hash_to_uid();
        let moved: Vec<(u32, u32)> = self
            .messages
            .iter()
            .filter_map(|(uid, hash)| {
                fresh
                    .get(hash)
                    .filter(|new_uid| *new_uid != uid)
                    .map(|new_uid| (*uid, *new_uid))
            })
            .collect();

        for (old_uid, new_uid) in moved {
            if let Some(hash) = self.messages.remove(&old_uid) {
                self.messages.insert(new_uid, hash);
            }
        }
        self.sync_uids();
    }

    /// Make `uids` mirror the resolved mapping.
    pub fn sync_uids(&mut self) {
        self.uids = self.messages.keys().copied().collect();
    }
}
