//! Error types for imap-vault

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IMAP error: {0}")]
    Imap(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TLS error: {0}")]
    Tls(String),

    #[error("Index serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Missing backup state: {0}")]
    MissingState(String),

    #[error("Folder unavailable: {0}")]
    FolderUnavailable(String),

    #[error("Cannot move {from} to {to}: destination holds different content")]
    StoreConflict { from: String, to: String },
}

impl Error {
    /// Whether a per-item failure should be skipped and retried on a
    /// later run rather than aborting the surrounding loop.
    ///
    /// Remote failures are transient; local storage failures are not.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Imap(_) | Self::FolderUnavailable(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
