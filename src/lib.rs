//! Incremental IMAP mailbox backup and restore
//!
//! Messages are stored once each in a content-addressed directory, keyed
//! by a hash of their internal date and identity headers rather than by
//! server UIDs. A JSON index records every message's flags and folder
//! memberships plus a UID snapshot of each folder, so later runs only
//! fetch what changed and a restore can rebuild folders by copying.
//!
//! - [`BackupEngine`] pulls new content and memberships.
//! - [`RestoreEngine`] pushes missing content and memberships back,
//!   coping with servers that renumbered their UIDs.
//! - [`MaintenanceEngine`] purges orphaned payloads and re-keys payloads
//!   whose hash changed.
//!
//! The engines talk to the server through [`MailboxAccess`];
//! [`ImapMailbox`] implements it over `async-imap` with rustls.

mod backup;
mod config;
mod error;
mod flag;
mod folder;
mod identity;
mod imap;
mod index;
mod indexer;
mod mailbox;
mod maintenance;
mod report;
mod restore;
mod snapshot;
mod store;

pub use backup::BackupEngine;
pub use config::{ImapConfig, SyncConfig, TlsMode};
pub use error::{Error, Result};
pub use flag::Flag;
pub use folder::{FolderInfo, FolderRole, canonical_name};
pub use identity::{ContentHash, HEADER_FIELDS, HeaderFields, Identity, identify};
pub use imap::{ImapMailbox, ImapSession};
pub use index::{IndexFiles, MessageRecord, Records, SyncIndex};
pub use indexer::{IndexReport, Indexer};
pub use mailbox::{HeaderFetch, MailboxAccess, SelectInfo};
pub use maintenance::MaintenanceEngine;
pub use report::{BackupReport, MaintenanceReport, RestoreReport};
pub use restore::RestoreEngine;
pub use snapshot::{Carry, FolderSnapshot};
pub use store::{ContentStore, Put, StoreEntries, StoreEntry};
