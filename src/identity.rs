//! Content identity for messages
//!
//! IMAP UIDs are only meaningful within one UIDVALIDITY epoch of one
//! folder, so they cannot identify a message across runs. Instead every
//! message is keyed by a SHA-1 over its internal date and a fixed set of
//! normalized header values. Two messages agreeing on all eight values
//! collide by construction; the backup engine stores the second one under
//! a disambiguated key.

use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};
use std::fmt;

/// Header fields fetched for, and hashed into, the content identity.
///
/// The order is part of the identity and must not change without
/// re-keying the store.
pub const HEADER_FIELDS: [&str; 7] = [
    "From",
    "To",
    "Cc",
    "Date",
    "Subject",
    "X-Gmail-Received",
    "Message-Id",
];

/// Below this many non-empty inputs (out of eight) a hash is flagged as
/// low-confidence.
const MIN_CONFIDENT_FIELDS: usize = 4;

/// Lower-case hex SHA-1 identifying a message's content.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentHash(String);

impl ContentHash {
    /// Accept a 40-character lower-case hex string.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        let valid = s.len() == 40 && s.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'));
        valid.then(|| Self(s.to_string()))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Store key for a second message that hashes identically to this
    /// one, made unique by its canonical-folder UID.
    #[must_use]
    pub fn disambiguated(&self, uid: u32) -> String {
        format!("{}.{uid}", self.0)
    }

    /// If `key` is a disambiguated key, the hash it derives from.
    #[must_use]
    pub fn base_of_disambiguated(key: &str) -> Option<Self> {
        let (base, uid) = key.split_once('.')?;
        if uid.is_empty() || !uid.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        Self::parse(base)
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ContentHash {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// The header values that feed the identity, each possibly absent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderFields {
    pub from: Option<String>,
    pub to: Option<String>,
    pub cc: Option<String>,
    pub date: Option<String>,
    pub subject: Option<String>,
    pub gmail_received: Option<String>,
    pub message_id: Option<String>,
}

impl HeaderFields {
    /// Extract the identity headers from a raw header block (or a whole
    /// message). The first occurrence of each header wins and values are
    /// taken undecoded, folding included.
    #[must_use]
    pub fn parse(raw: &[u8]) -> Self {
        let headers = match mailparse::parse_headers(raw) {
            Ok((headers, _)) => headers,
            Err(e) => {
                tracing::debug!("Unparseable header block: {e}");
                return Self::default();
            }
        };

        let lookup = |name: &str| {
            headers
                .iter()
                .find(|h| h.get_key().eq_ignore_ascii_case(name))
                .map(|h| String::from_utf8_lossy(h.get_value_raw()).into_owned())
        };

        Self {
            from: lookup(HEADER_FIELDS[0]),
            to: lookup(HEADER_FIELDS[1]),
            cc: lookup(HEADER_FIELDS[2]),
            date: lookup(HEADER_FIELDS[3]),
            subject: lookup(HEADER_FIELDS[4]),
            gmail_received: lookup(HEADER_FIELDS[5]),
            message_id: lookup(HEADER_FIELDS[6]),
        }
    }

    fn values(&self) -> [Option<&str>; 7] {
        [
            self.from.as_deref(),
            self.to.as_deref(),
            self.cc.as_deref(),
            self.date.as_deref(),
            self.subject.as_deref(),
            self.gmail_received.as_deref(),
            self.message_id.as_deref(),
        ]
    }
}

/// A computed content hash plus how much input went into it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub hash: ContentHash,
    /// Non-empty inputs out of eight (internal date included).
    pub populated: usize,
}

impl Identity {
    #[must_use]
    pub const fn is_low_confidence(&self) -> bool {
        self.populated < MIN_CONFIDENT_FIELDS
    }
}

/// Derive the content hash of a message.
///
/// The internal date is used verbatim; each header value has its
/// whitespace runs collapsed to one space and is trimmed. The eight
/// values are joined with `\n` and hashed with SHA-1.
#[must_use]
pub fn identify(internal_date: &str, fields: &HeaderFields) -> Identity {
    let normalized: Vec<String> = fields
        .values()
        .iter()
        .map(|v| v.map(collapse_whitespace).unwrap_or_default())
        .collect();

    let populated = usize::from(!internal_date.is_empty())
        + normalized.iter().filter(|v| !v.is_empty()).count();

    let mut hasher = Sha1::new();
    hasher.update(internal_date.as_bytes());
    for value in &normalized {
        hasher.update(b"\n");
        hasher.update(value.as_bytes());
    }

    Identity {
        hash: ContentHash(hex::encode(hasher.finalize())),
        populated,
    }
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}
