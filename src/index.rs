//! Persisted sync index
//!
//! Two maps make up the local view of the mailbox: message records keyed
//! by content hash, and folder snapshots keyed by folder name. They are
//! stored as two JSON files next to the content store. Before a run
//! overwrites them, the previous generations are rotated into a numbered
//! backlog (`messages.json.1`, `.2`, ...).

use crate::error::Result;
use crate::flag::Flag;
use crate::identity::ContentHash;
use crate::snapshot::FolderSnapshot;
use serde::{Deserialize, Serialize};
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, warn};

/// What the index knows about one message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageRecord {
    pub hash: ContentHash,
    pub flags: Vec<Flag>,
    /// Server-assigned INTERNALDATE, kept verbatim.
    pub internal_date: String,
    /// UID in the canonical folder; refreshed whenever the server
    /// renumbers.
    pub uid: u32,
    /// Folders the message belongs to, canonical folder first.
    pub folders: Vec<String>,
}

impl MessageRecord {
    /// Record `folder` as a membership, once.
    pub fn add_folder(&mut self, folder: &str) -> bool {
        if self.folders.iter().any(|f| f == folder) {
            return false;
        }
        self.folders.push(folder.to_string());
        true
    }
}

/// Message records keyed by content hash.
pub type Records = BTreeMap<ContentHash, MessageRecord>;

/// The two index maps.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncIndex {
    pub messages: Records,
    pub folders: BTreeMap<String, FolderSnapshot>,
}

impl SyncIndex {
    /// Load both maps. Missing or unreadable files yield empty maps.
    #[must_use]
    pub fn load(files: &IndexFiles) -> Self {
        Self {
            messages: load_or_default(&files.messages),
            folders: load_or_default(&files.folders),
        }
    }

    /// Write the message map only (the backup checkpoint).
    pub fn save_messages(&self, files: &IndexFiles) -> Result<()> {
        write_json(&files.messages, &self.messages)
    }

    /// Write both maps.
    pub fn save(&self, files: &IndexFiles) -> Result<()> {
        self.save_messages(files)?;
        write_json(&files.folders, &self.folders)
    }

    /// Replace every reference to `old` with `new`: the record key and
    /// each folder mapping. Returns `false` if `old` is not indexed.
    pub fn rekey(&mut self, old: &ContentHash, new: &ContentHash) -> bool {
        let Some(mut record) = self.messages.remove(old) else {
            return false;
        };
        record.hash = new.clone();
        self.messages.insert(new.clone(), record);

        for snapshot in self.folders.values_mut() {
            for hash in snapshot.messages.values_mut() {
                if hash == old {
                    *hash = new.clone();
                }
            }
        }
        true
    }
}

/// Locations of the index files.
#[derive(Debug, Clone)]
pub struct IndexFiles {
    pub messages: PathBuf,
    pub folders: PathBuf,
    /// Previous generations kept per file.
    pub backlog_depth: usize,
}

impl IndexFiles {
    pub const MESSAGES_FILE: &'static str = "messages.json";
    pub const FOLDERS_FILE: &'static str = "folders.json";

    #[must_use]
    pub fn in_dir(dir: &Path, backlog_depth: usize) -> Self {
        Self {
            messages: dir.join(Self::MESSAGES_FILE),
            folders: dir.join(Self::FOLDERS_FILE),
            backlog_depth,
        }
    }

    /// Whether both index files exist.
    #[must_use]
    pub fn exist(&self) -> bool {
        self.messages.is_file() && self.folders.is_file()
    }

    /// Shift current generations into the backlog, dropping the oldest.
    pub fn rotate(&self) -> Result<()> {
        rotate_file(&self.messages, self.backlog_depth)?;
        rotate_file(&self.folders, self.backlog_depth)
    }
}

fn generation(path: &Path, n: usize) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(format!(".{n}"));
    PathBuf::from(name)
}

fn rotate_file(path: &Path, depth: usize) -> Result<()> {
    if depth == 0 || !path.is_file() {
        return Ok(());
    }
    for n in (1..depth).rev() {
        let older = generation(path, n);
        if older.is_file() {
            fs::rename(&older, generation(path, n + 1))?;
        }
    }
    fs::copy(path, generation(path, 1))?;
    debug!("Rotated {}", path.display());
    Ok(())
}

fn load_or_default<T: DeserializeOwned + Default>(path: &Path) -> T {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return T::default(),
        Err(e) => {
            warn!("Could not read {}: {e}; starting empty", path.display());
            return T::default();
        }
    };
    serde_json::from_slice(&bytes).unwrap_or_else(|e| {
        warn!("Corrupt index {}: {e}; starting empty", path.display());
        T::default()
    })
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(dir)?;
    let mut tmp = NamedTempFile::new_in(dir)?;
    serde_json::to_writer(&mut tmp, value)?;
    tmp.flush()?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}
