//! IMAP message flags
//!
//! Provides a strongly-typed enum for IMAP flags instead of raw
//! strings. Standard system flags have dedicated variants; arbitrary
//! keyword flags use the `Keyword` variant. Flags are persisted in the
//! index as their wire tokens.

use serde::{Deserialize, Serialize};
use std::fmt;

/// An IMAP message flag.
///
/// # Examples
///
/// ```
/// use imap_vault::Flag;
///
/// let seen = Flag::from("\\Seen");
/// assert_eq!(seen, Flag::Seen);
/// assert_eq!(seen.as_imap_str(), "\\Seen");
///
/// let kw = Flag::from("$Important");
/// assert_eq!(kw.as_imap_str(), "$Important");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Flag {
    /// Message has been read (`\Seen`).
    Seen,
    /// Message has been answered (`\Answered`).
    Answered,
    /// Message is flagged for attention (`\Flagged`).
    Flagged,
    /// Message is marked for deletion (`\Deleted`).
    Deleted,
    /// Message is a draft (`\Draft`).
    Draft,
    /// Session-only flag (`\Recent`); servers reject it on APPEND.
    Recent,
    /// A user-defined keyword flag, or an unknown system flag.
    Keyword(String),
}

impl Flag {
    /// The IMAP wire representation of this flag.
    #[must_use]
    pub fn as_imap_str(&self) -> &str {
        match self {
            Self::Seen => "\\Seen",
            Self::Answered => "\\Answered",
            Self::Flagged => "\\Flagged",
            Self::Deleted => "\\Deleted",
            Self::Draft => "\\Draft",
            Self::Recent => "\\Recent",
            Self::Keyword(kw) => kw,
        }
    }

    /// Whether the flag may be set by a client on APPEND.
    #[must_use]
    pub const fn is_appendable(&self) -> bool {
        !matches!(self, Self::Recent)
    }

    /// Render a flag list as the space-separated body of an IMAP
    /// parenthesized list, dropping flags a client cannot set.
    #[must_use]
    pub fn join_appendable(flags: &[Self]) -> String {
        flags
            .iter()
            .filter(|f| f.is_appendable())
            .map(Self::as_imap_str)
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl fmt::Display for Flag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_imap_str())
    }
}

impl From<&str> for Flag {
    fn from(s: &str) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "\\seen" => Self::Seen,
            "\\answered" => Self::Answered,
            "\\flagged" => Self::Flagged,
            "\\deleted" => Self::Deleted,
            "\\draft" => Self::Draft,
            "\\recent" => Self::Recent,
            _ => Self::Keyword(s.to_string()),
        }
    }
}

impl From<String> for Flag {
    fn from(s: String) -> Self {
        Self::from(s.as_str())
    }
}

impl From<Flag> for String {
    fn from(flag: Flag) -> Self {
        match flag {
            Flag::Keyword(kw) => kw,
            other => other.as_imap_str().to_string(),
        }
    }
}
