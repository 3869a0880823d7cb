//! Mailbox access seam
//!
//! The engines drive a remote mailbox only through [`MailboxAccess`].
//! [`crate::ImapMailbox`] implements it over a live IMAP session; tests
//! substitute in-memory implementations.

use crate::error::Result;
use crate::flag::Flag;
use crate::folder::FolderInfo;

/// What SELECT/EXAMINE reports about a folder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectInfo {
    pub uid_validity: u32,
    pub exists: u32,
    /// Flags the folder supports.
    pub flags: Vec<Flag>,
}

/// The identity-relevant part of one message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderFetch {
    pub uid: u32,
    pub flags: Vec<Flag>,
    /// IMAP `date-time` text, e.g. `01-Jan-2024 12:00:00 +0000`.
    pub internal_date: String,
    /// Raw header block holding the identity header fields.
    pub header: Vec<u8>,
}

/// Remote mailbox operations used by the engines.
///
/// One session, one command in flight. Every method that addresses a
/// message by UID acts on the currently selected folder.
#[allow(async_fn_in_trait)]
pub trait MailboxAccess {
    /// Every folder with its LIST attributes.
    async fn list_folders(&mut self) -> Result<Vec<FolderInfo>>;

    /// Select `folder`, read-only (EXAMINE) or read-write (SELECT).
    async fn select(&mut self, folder: &str, read_only: bool) -> Result<SelectInfo>;

    /// UIDs of the messages with sequence numbers `first..=last`, ascending.
    async fn search_range(&mut self, first: u32, last: u32) -> Result<Vec<u32>>;

    /// Flags, internal date and identity headers of one message.
    async fn fetch_header(&mut self, uid: u32) -> Result<HeaderFetch>;

    /// Full RFC 2822 bytes of one message.
    async fn fetch_raw(&mut self, uid: u32) -> Result<Vec<u8>>;

    /// Append a message to `folder`, returning its new UID when the
    /// server lets it be discovered.
    async fn append(
        &mut self,
        folder: &str,
        flags: &[Flag],
        internal_date: &str,
        content: &[u8],
    ) -> Result<Option<u32>>;

    /// Copy one message of the selected folder into `folder`.
    async fn copy(&mut self, uid: u32, folder: &str) -> Result<()>;

    async fn create(&mut self, folder: &str) -> Result<()>;

    async fn logout(&mut self) -> Result<()>;
}
