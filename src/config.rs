//! IMAP connection and sync configuration

use crate::error::{Error, Result};
use std::env;
use std::path::{Path, PathBuf};

/// How the TLS layer is negotiated with the IMAP server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TlsMode {
    /// TLS from the first byte (port 993).
    #[default]
    Implicit,
    /// Plain TCP upgraded with `STARTTLS` (port 143, local bridges).
    StartTls,
}

impl TlsMode {
    fn parse(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "implicit" | "tls" => Ok(Self::Implicit),
            "starttls" => Ok(Self::StartTls),
            other => Err(Error::Config(format!("Invalid IMAP_TLS: {other}"))),
        }
    }
}

/// IMAP connection configuration
#[derive(Debug, Clone)]
pub struct ImapConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub tls: TlsMode,
    /// Skip certificate verification (self-signed bridges, test servers).
    pub accept_invalid_certs: bool,
}

impl ImapConfig {
    /// Load IMAP configuration from environment variables
    ///
    /// Reads from `.env` file if present. Required variables:
    /// - `IMAP_USERNAME`
    /// - `IMAP_PASSWORD`
    ///
    /// Optional (with defaults):
    /// - `IMAP_HOST` (default: `imap.gmail.com`)
    /// - `IMAP_PORT` (default: `993`)
    /// - `IMAP_TLS` (`implicit` or `starttls`, default: `implicit`)
    /// - `IMAP_ACCEPT_INVALID_CERTS` (default: `false`)
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        Ok(Self {
            host: env::var("IMAP_HOST").unwrap_or_else(|_| "imap.gmail.com".to_string()),
            port: env::var("IMAP_PORT")
                .unwrap_or_else(|_| "993".to_string())
                .parse()
                .map_err(|e| Error::Config(format!("Invalid IMAP_PORT: {e}")))?,
            username: env::var("IMAP_USERNAME")
                .map_err(|_| Error::Config("IMAP_USERNAME not set".into()))?,
            password: env::var("IMAP_PASSWORD")
                .map_err(|_| Error::Config("IMAP_PASSWORD not set".into()))?,
            tls: env::var("IMAP_TLS").map_or(Ok(TlsMode::default()), |v| TlsMode::parse(&v))?,
            accept_invalid_certs: env::var("IMAP_ACCEPT_INVALID_CERTS")
                .map(|v| parse_bool(&v))
                .unwrap_or(false),
        })
    }
}

/// Settings shared by the backup, restore and maintenance engines.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Root of the content store; the index files live here too.
    pub store_dir: PathBuf,
    /// Number of previous index generations kept on disk.
    pub backlog_depth: usize,
    /// Sequence numbers covered by one `UID SEARCH` round-trip.
    pub search_batch: u32,
    /// Used only when no listed folder carries the all-messages role.
    pub canonical_folder: String,
    /// Folder names never indexed or restored, in addition to the
    /// provider's spam and trash folders.
    pub ignored_folders: Vec<String>,
    /// Detect and log, but do not mutate (maintenance only).
    pub dry_run: bool,
}

impl SyncConfig {
    pub const DEFAULT_CANONICAL_FOLDER: &'static str = "[Gmail]/All Mail";

    #[must_use]
    pub fn new(store_dir: impl Into<PathBuf>) -> Self {
        Self {
            store_dir: store_dir.into(),
            backlog_depth: 3,
            search_batch: 250,
            canonical_folder: Self::DEFAULT_CANONICAL_FOLDER.to_string(),
            ignored_folders: vec!["Spam".to_string(), "Trash".to_string()],
            dry_run: false,
        }
    }

    /// Load sync settings from environment variables
    ///
    /// - `BACKUP_DIR` (required)
    /// - `BACKUP_BACKLOG` (default: `3`)
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let dir = env::var("BACKUP_DIR").map_err(|_| Error::Config("BACKUP_DIR not set".into()))?;
        let mut config = Self::new(dir);
        if let Ok(depth) = env::var("BACKUP_BACKLOG") {
            config.backlog_depth = depth
                .parse()
                .map_err(|e| Error::Config(format!("Invalid BACKUP_BACKLOG: {e}")))?;
        }
        Ok(config)
    }

    #[must_use]
    pub fn store_dir(&self) -> &Path {
        &self.store_dir
    }

    /// Whether a folder is excluded by name.
    #[must_use]
    pub fn is_ignored_name(&self, name: &str) -> bool {
        self.ignored_folders.iter().any(|n| n == name)
    }
}

fn parse_bool(s: &str) -> bool {
    matches!(s.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on")
}
