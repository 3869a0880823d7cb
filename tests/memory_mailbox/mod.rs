//! In-memory `MailboxAccess` for engine tests
//!
//! Folders hold messages in sequence order, UIDs come from a per-folder
//! counter, and every folder has a UIDVALIDITY that `renumber` and `permute` bump.
//! Faults are injected per UID or per folder name, and every remote
//! operation is counted so tests can assert on what was fetched.

#![allow(dead_code)]

use imap_vault::{Error, Flag, FolderInfo, HeaderFetch, MailboxAccess, Result, SelectInfo};
use std::collections::HashSet;

#[derive(Debug, Clone)]
pub struct MemMessage {
    pub uid: u32,
    pub flags: Vec<Flag>,
    pub internal_date: String,
    pub raw: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct MemFolder {
    pub name: String,
    pub attributes: Vec<String>,
    pub uid_validity: u32,
    pub uid_next: u32,
    pub messages: Vec<MemMessage>,
}

impl MemFolder {
    pub fn uids(&self) -> Vec<u32> {
        self.messages.iter().map(|m| m.uid).collect()
    }

    pub fn raws(&self) -> Vec<&[u8]> {
        self.messages.iter().map(|m| m.raw.as_slice()).collect()
    }
}

/// Operation counters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Calls {
    pub header_fetches: usize,
    pub raw_fetches: usize,
    pub appends: usize,
    pub copies: usize,
    pub creates: usize,
}

#[derive(Debug, Default)]
pub struct MemoryMailbox {
    pub folders: Vec<MemFolder>,
    pub calls: Calls,
    /// UIDs whose raw fetch fails.
    pub fail_raw: HashSet<u32>,
    /// UIDs whose header fetch fails.
    pub fail_header: HashSet<u32>,
    /// Source UIDs whose copy fails.
    pub fail_copy: HashSet<u32>,
    /// Raw messages whose append fails.
    pub fail_append: HashSet<Vec<u8>>,
    /// Folders that cannot be selected.
    pub unavailable: HashSet<String>,
    /// Make `append` report no UID, like a server without UIDPLUS.
    pub hide_append_uid: bool,
    selected: Option<String>,
    next_validity: u32,
}

impl MemoryMailbox {
    pub fn new() -> Self {
        Self::with_validity_base(1)
    }

    /// Start UIDVALIDITY numbering above `base`, so two accounts never
    /// share a value by accident.
    pub fn with_validity_base(base: u32) -> Self {
        Self {
            next_validity: base,
            ..Self::default()
        }
    }

    /// Add an empty folder with LIST attributes.
    pub fn folder(&mut self, name: &str, attributes: &[&str]) -> &mut Self {
        let uid_validity = self.fresh_validity();
        self.folders.push(MemFolder {
            name: name.to_string(),
            attributes: attributes.iter().map(ToString::to_string).collect(),
            uid_validity,
            uid_next: 1,
            messages: Vec::new(),
        });
        self
    }

    /// Store a message in `folder`, returning its UID.
    pub fn add(&mut self, folder: &str, flags: &[Flag], internal_date: &str, raw: &[u8]) -> u32 {
        let folder = self.get_mut(folder).expect("folder exists");
        let uid = folder.uid_next;
        folder.uid_next += 1;
        folder.messages.push(MemMessage {
            uid,
            flags: flags.to_vec(),
            internal_date: internal_date.to_string(),
            raw: raw.to_vec(),
        });
        uid
    }

    pub fn get(&self, name: &str) -> Option<&MemFolder> {
        self.folders.iter().find(|f| f.name == name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut MemFolder> {
        self.folders.iter_mut().find(|f| f.name == name)
    }

    /// Drop a message, as if it was deleted on the server.
    pub fn remove(&mut self, folder: &str, uid: u32) {
        if let Some(folder) = self.get_mut(folder) {
            folder.messages.retain(|m| m.uid != uid);
        }
    }

    /// Reset a folder's UIDs: new UIDVALIDITY, new UIDs in reverse order.
    pub fn renumber(&mut self, name: &str) {
        let uid_validity = self.fresh_validity();
        let folder = self.get_mut(name).expect("folder exists");
        folder.uid_validity = uid_validity;
        folder.messages.reverse();
        let mut next = 1000;
        for message in &mut folder.messages {
            message.uid = next;
            next += 1;
        }
        folder.uid_next = next;
    }

    /// Reset a folder's UIDVALIDITY but reuse its UIDs, handing them
    /// to the messages in reverse order.
    pub fn permute(&mut self, name: &str) {
        let uid_validity = self.fresh_validity();
        let folder = self.get_mut(name).expect("folder exists");
        folder.uid_validity = uid_validity;
        let uids = folder.uids();
        folder.messages.reverse();
        for (message, uid) in folder.messages.iter_mut().zip(uids) {
            message.uid = uid;
        }
    }

    const fn fresh_validity(&mut self) -> u32 {
        self.next_validity += 1;
        self.next_validity
    }

    fn selected(&self) -> Result<&MemFolder> {
        self.selected
            .as_deref()
            .and_then(|name| self.get(name))
            .ok_or_else(|| Error::Imap("No folder selected".into()))
    }

    fn message(&self, uid: u32) -> Result<&MemMessage> {
        self.selected()?
            .messages
            .iter()
            .find(|m| m.uid == uid)
            .ok_or_else(|| Error::Imap(format!("No such message: UID {uid}")))
    }
}

fn header_block(raw: &[u8]) -> Vec<u8> {
    raw.windows(4)
        .position(|w| w == b"\r\n\r\n")
        .map_or_else(|| raw.to_vec(), |end| raw[..end + 4].to_vec())
}

impl MailboxAccess for MemoryMailbox {
    async fn list_folders(&mut self) -> Result<Vec<FolderInfo>> {
        Ok(self
            .folders
            .iter()
            .map(|f| FolderInfo::from_attributes(f.name.clone(), &f.attributes))
            .collect())
    }

    async fn select(&mut self, folder: &str, _read_only: bool) -> Result<SelectInfo> {
        if self.unavailable.contains(folder) {
            return Err(Error::Imap(format!("{folder} is unavailable")));
        }
        let found = self
            .get(folder)
            .ok_or_else(|| Error::Imap(format!("No such folder: {folder}")))?;
        let info = SelectInfo {
            uid_validity: found.uid_validity,
            exists: u32::try_from(found.messages.len()).unwrap(),
            flags: vec![Flag::Seen, Flag::Flagged],
        };
        self.selected = Some(folder.to_string());
        Ok(info)
    }

    async fn search_range(&mut self, first: u32, last: u32) -> Result<Vec<u32>> {
        let folder = self.selected()?;
        let mut uids: Vec<u32> = folder
            .messages
            .iter()
            .enumerate()
            .filter(|(i, _)| (first..=last).contains(&(u32::try_from(*i).unwrap() + 1)))
            .map(|(_, m)| m.uid)
            .collect();
        uids.sort_unstable();
        Ok(uids)
    }

    async fn fetch_header(&mut self, uid: u32) -> Result<HeaderFetch> {
        self.calls.header_fetches += 1;
        if self.fail_header.contains(&uid) {
            return Err(Error::Imap(format!("Header fetch of UID {uid} failed")));
        }
        let message = self.message(uid)?;
        Ok(HeaderFetch {
            uid,
            flags: message.flags.clone(),
            internal_date: message.internal_date.clone(),
            header: header_block(&message.raw),
        })
    }

    async fn fetch_raw(&mut self, uid: u32) -> Result<Vec<u8>> {
        self.calls.raw_fetches += 1;
        if self.fail_raw.contains(&uid) {
            return Err(Error::Imap(format!("Fetch of UID {uid} failed")));
        }
        Ok(self.message(uid)?.raw.clone())
    }

    async fn append(
        &mut self,
        folder: &str,
        flags: &[Flag],
        internal_date: &str,
        content: &[u8],
    ) -> Result<Option<u32>> {
        self.calls.appends += 1;
        if self.fail_append.contains(content) {
            return Err(Error::Imap(format!("Append to {folder} failed")));
        }
        if self.get(folder).is_none() {
            return Err(Error::Imap(format!("No such folder: {folder}")));
        }
        let appendable: Vec<Flag> = flags.iter().filter(|f| f.is_appendable()).cloned().collect();
        let uid = self.add(folder, &appendable, internal_date, content);
        Ok((!self.hide_append_uid).then_some(uid))
    }

    async fn copy(&mut self, uid: u32, folder: &str) -> Result<()> {
        self.calls.copies += 1;
        if self.fail_copy.contains(&uid) {
            return Err(Error::Imap(format!("Copy of UID {uid} failed")));
        }
        let message = self.message(uid)?.clone();
        if self.get(folder).is_none() {
            return Err(Error::Imap(format!("[TRYCREATE] No such folder: {folder}")));
        }
        self.add(folder, &message.flags, &message.internal_date, &message.raw);
        Ok(())
    }

    async fn create(&mut self, folder: &str) -> Result<()> {
        self.calls.creates += 1;
        if self.get(folder).is_some() {
            return Err(Error::Imap(format!("{folder} already exists")));
        }
        self.folder(folder, &[]);
        Ok(())
    }

    async fn logout(&mut self) -> Result<()> {
        self.selected = None;
        Ok(())
    }
}
