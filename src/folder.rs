//! IMAP folder roles
//!
//! Providers mark their special folders with LIST attributes (RFC 6154
//! special-use plus Gmail's XLIST extensions). The names of these folders
//! change with the account's locale, so the engines find the canonical
//! all-messages folder and the spam/trash folders by role, not by name.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A well-known role a folder can play.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FolderRole {
    Inbox,
    /// Holds every message exactly once (Gmail's "All Mail").
    AllMail,
    Trash,
    Spam,
    Drafts,
    Sent,
    Important,
    Starred,
}

impl FolderRole {
    /// Map a LIST attribute (e.g. `\All`, `\Junk`) to a role.
    #[must_use]
    pub fn from_attribute(attr: &str) -> Option<Self> {
        let attr = attr.trim_start_matches('\\');
        match attr.to_ascii_lowercase().as_str() {
            "all" | "allmail" => Some(Self::AllMail),
            "trash" => Some(Self::Trash),
            "junk" | "spam" => Some(Self::Spam),
            "drafts" => Some(Self::Drafts),
            "sent" => Some(Self::Sent),
            "important" => Some(Self::Important),
            "flagged" | "starred" => Some(Self::Starred),
            "inbox" => Some(Self::Inbox),
            _ => None,
        }
    }

    /// Roles whose content is never backed up or restored.
    #[must_use]
    pub const fn is_ignored(self) -> bool {
        matches!(self, Self::Spam | Self::Trash)
    }
}

impl fmt::Display for FolderRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Inbox => "inbox",
            Self::AllMail => "all",
            Self::Trash => "trash",
            Self::Spam => "spam",
            Self::Drafts => "drafts",
            Self::Sent => "sent",
            Self::Important => "important",
            Self::Starred => "starred",
        };
        f.write_str(s)
    }
}

/// A folder as reported by LIST.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FolderInfo {
    pub name: String,
    pub roles: Vec<FolderRole>,
    pub selectable: bool,
}

impl FolderInfo {
    /// Build from a folder name and its raw LIST attributes.
    #[must_use]
    pub fn from_attributes<S: AsRef<str>>(name: impl Into<String>, attributes: &[S]) -> Self {
        let name = name.into();
        let mut roles: Vec<FolderRole> = attributes
            .iter()
            .filter_map(|a| FolderRole::from_attribute(a.as_ref()))
            .collect();
        if name.eq_ignore_ascii_case("INBOX") && !roles.contains(&FolderRole::Inbox) {
            roles.push(FolderRole::Inbox);
        }
        let selectable = !attributes
            .iter()
            .any(|a| a.as_ref().eq_ignore_ascii_case("\\Noselect"));

        Self {
            name,
            roles,
            selectable,
        }
    }

    #[must_use]
    pub fn has_role(&self, role: FolderRole) -> bool {
        self.roles.contains(&role)
    }

    /// Whether the provider marks this folder as spam or trash.
    #[must_use]
    pub fn has_ignored_role(&self) -> bool {
        self.roles.iter().any(|r| r.is_ignored())
    }
}

/// Pick the canonical folder: the one carrying the all-messages role,
/// else `fallback`.
#[must_use]
pub fn canonical_name<'a>(folders: &'a [FolderInfo], fallback: &'a str) -> &'a str {
    folders
        .iter()
        .find(|f| f.selectable && f.has_role(FolderRole::AllMail))
        .map_or(fallback, |f| f.name.as_str())
}
