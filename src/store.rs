//! Content-addressed message store
//!
//! Raw RFC 2822 messages are kept one file per key under a two-level
//! fan-out: the first two characters of the key name a bucket directory.
//!
//! ```text
//! <root>/3f/3f786850e387550fdab836ed7e6dc881de23001b
//! <root>/3f/3f786850e387550fdab836ed7e6dc881de23001b.1842   (disambiguated)
//! ```
//!
//! Writes go through a temporary file renamed into place, so a payload
//! is either absent or complete. Files at the root (the index) are not
//! store entries.

use crate::error::{Error, Result};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// Outcome of [`ContentStore::put`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Put {
    Inserted,
    AlreadyPresent,
}

/// On-disk content store rooted at a directory.
#[derive(Debug, Clone)]
pub struct ContentStore {
    root: PathBuf,
}

impl ContentStore {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Whether the store directory exists.
    #[must_use]
    pub fn is_present(&self) -> bool {
        self.root.is_dir()
    }

    /// Create the store directory if needed.
    pub fn ensure(&self) -> Result<()> {
        fs::create_dir_all(&self.root)?;
        Ok(())
    }

    fn path_for(&self, key: &str) -> PathBuf {
        let bucket = key.get(..2).unwrap_or(key);
        self.root.join(bucket).join(key)
    }

    #[must_use]
    pub fn exists(&self, key: &str) -> bool {
        self.path_for(key).is_file()
    }

    /// Store `bytes` under `key` unless the key is already present.
    pub fn put(&self, key: &str, bytes: &[u8]) -> Result<Put> {
        let path = self.path_for(key);
        if path.is_file() {
            return Ok(Put::AlreadyPresent);
        }
        let bucket = path
            .parent()
            .ok_or_else(|| Error::Io(io::Error::other(format!("no bucket for key {key}"))))?;
        fs::create_dir_all(bucket)?;

        let mut tmp = NamedTempFile::new_in(bucket)?;
        tmp.write_all(bytes)?;
        tmp.as_file().sync_all()?;
        tmp.persist(&path).map_err(|e| Error::Io(e.error))?;
        Ok(Put::Inserted)
    }

    /// Read the payload stored under `key`, `None` if absent.
    pub fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        match fs::read(self.path_for(key)) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Delete the payload under `key`. Returns whether it existed.
    pub fn remove(&self, key: &str) -> Result<bool> {
        match fs::remove_file(self.path_for(key)) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Move a payload from `from` to `to`.
    ///
    /// If `to` already holds identical bytes the source is dropped;
    /// different bytes are a [`Error::StoreConflict`].
    pub fn rekey(&self, from: &str, to: &str) -> Result<()> {
        let src = self.path_for(from);
        let dst = self.path_for(to);

        if dst.is_file() {
            if fs::read(&src)? == fs::read(&dst)? {
                fs::remove_file(&src)?;
                return Ok(());
            }
            return Err(Error::StoreConflict {
                from: from.to_string(),
                to: to.to_string(),
            });
        }

        if let Some(bucket) = dst.parent() {
            fs::create_dir_all(bucket)?;
        }
        fs::rename(&src, &dst)?;
        Ok(())
    }

    /// Iterate over every stored payload.
    pub fn entries(&self) -> Result<StoreEntries> {
        let mut buckets: Vec<PathBuf> = Vec::new();
        if self.root.is_dir() {
            for entry in fs::read_dir(&self.root)? {
                let entry = entry?;
                if entry.file_type()?.is_dir() {
                    buckets.push(entry.path());
                }
            }
        }
        buckets.sort();
        Ok(StoreEntries {
            buckets: buckets.into_iter(),
            current: None,
        })
    }
}

/// A payload file found in the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreEntry {
    pub key: String,
    pub path: PathBuf,
}

/// Iterator over store entries, bucket by bucket.
#[derive(Debug)]
pub struct StoreEntries {
    buckets: std::vec::IntoIter<PathBuf>,
    current: Option<fs::ReadDir>,
}

impl Iterator for StoreEntries {
    type Item = Result<StoreEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(dir) = self.current.as_mut() {
                match dir.next() {
                    Some(Ok(entry)) => {
                        let path = entry.path();
                        if !path.is_file() {
                            continue;
                        }
                        let key = entry.file_name().to_string_lossy().into_owned();
                        return Some(Ok(StoreEntry { key, path }));
                    }
                    Some(Err(e)) => return Some(Err(e.into())),
                    None => self.current = None,
                }
            }

            let bucket = self.buckets.next()?;
            match fs::read_dir(&bucket) {
                Ok(dir) => self.current = Some(dir),
                Err(e) => return Some(Err(e.into())),
            }
        }
    }
}
