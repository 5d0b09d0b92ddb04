//! Shared types for the drive browser
//!
//! Entry and permission representations, the listing continuation cursor,
//! the windowed-render contract types and the error type used across the
//! gateway, browser engine and permission sweep.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::http_retry::HttpRetryConfig;

/// Sentinel folder id for the drive root.
pub const ROOT_FOLDER_ID: &str = "root";

/// One file or folder item returned by the remote listing.
///
/// Entries are immutable once created; navigation discards the whole
/// accumulated list rather than mutating individual entries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    /// Remote item id, unique within its parent
    pub id: String,
    /// Display name
    pub name: String,
    /// Whether this entry can be navigated into
    pub is_folder: bool,
    /// Pre-authenticated content URL, when the service supplied one
    pub download_url: Option<String>,
}

/// One page of a folder listing: the entries in service order plus the
/// continuation token for the next page, if any.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingPage {
    pub entries: Vec<Entry>,
    /// Opaque continuation URL; `None` means the listing is exhausted
    pub next: Option<String>,
}

/// A single sharing grant known for an entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum PermissionGrant {
    /// Anyone holding the link can access the item
    AnonymousLink { web_url: String },
    /// A named person or invitation
    Named {
        display_name: Option<String>,
        email: Option<String>,
    },
}

impl PermissionGrant {
    /// Short human label, used by the CLI listing output.
    pub fn label(&self) -> String {
        match self {
            PermissionGrant::AnonymousLink { .. } => "anyone with link".to_string(),
            PermissionGrant::Named {
                display_name: Some(name),
                email: Some(email),
            } => format!("{name} <{email}>"),
            PermissionGrant::Named {
                display_name: Some(name),
                email: None,
            } => name.clone(),
            PermissionGrant::Named {
                display_name: None,
                email: Some(email),
            } => email.clone(),
            PermissionGrant::Named {
                display_name: None,
                email: None,
            } => "unknown grantee".to_string(),
        }
    }
}

/// Continuation state of the current folder listing.
///
/// `Unset` means the folder was never loaded; `Exhausted` means the service
/// reported no further pages. The two must stay distinct: an unset cursor
/// triggers the initial load, an exhausted one suppresses all further
/// listing requests.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum PageCursor {
    #[default]
    Unset,
    /// Opaque continuation URL returned by the previous page
    Next(String),
    Exhausted,
}

impl PageCursor {
    pub fn is_exhausted(&self) -> bool {
        matches!(self, PageCursor::Exhausted)
    }
}

/// One breadcrumb element: folder id plus display name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathSegment {
    pub id: String,
    pub name: String,
}

impl PathSegment {
    /// The root marker every folder path starts with.
    pub fn root() -> Self {
        Self {
            id: ROOT_FOLDER_ID.to_string(),
            name: "Root".to_string(),
        }
    }
}

/// Inclusive row-index range currently rendered, as reported by the
/// virtualization boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VisibleWindow {
    pub start: usize,
    pub stop: usize,
}

/// Row count reported to a virtualization layer.
///
/// The true count is unknown until the cursor is exhausted, so until then
/// only a lower bound exists; a render adapter converts `AtLeast` into
/// whatever over-estimate its widget needs to keep requesting pages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowCount {
    Exact(usize),
    AtLeast(usize),
}

impl RowCount {
    /// The number of rows known to be loaded right now.
    pub fn loaded(&self) -> usize {
        match *self {
            RowCount::Exact(n) | RowCount::AtLeast(n) => n,
        }
    }
}

/// Gateway configuration.
#[derive(Debug, Clone)]
pub struct GraphConfig {
    /// Service base URL; overridable so tests can point at a local server
    pub api_base: String,
    /// `$top` page-size hint sent with the first page of a listing
    pub page_size: usize,
    /// Period of the recurring visible-window permission sweep
    pub sweep_interval: Duration,
    pub retry: HttpRetryConfig,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            api_base: "https://graph.microsoft.com/v1.0".to_string(),
            page_size: 20,
            sweep_interval: Duration::from_secs(5),
            retry: HttpRetryConfig::default(),
        }
    }
}

/// Drive error type
#[derive(Error, Debug)]
pub enum DriveError {
    #[error("no credential available")]
    NoCredential,

    #[error("access token rejected by the service")]
    AuthRejected,

    #[error("item not found: {0}")]
    NotFound(String),

    #[error("not a downloadable file: {0}")]
    NotAFile(String),

    #[error("service returned HTTP {status}: {message}")]
    Api { status: u16, message: String },

    #[error("network error: {0}")]
    Network(String),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl DriveError {
    /// Check if this error is recoverable (the next trigger can retry)
    pub fn is_recoverable(&self) -> bool {
        match self {
            DriveError::Network(_) => true,
            DriveError::Api { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cursor_states_distinct() {
        assert_ne!(PageCursor::Unset, PageCursor::Exhausted);
        assert!(!PageCursor::Unset.is_exhausted());
        assert!(PageCursor::Exhausted.is_exhausted());
        assert!(!PageCursor::Next("https://example/next".into()).is_exhausted());
    }

    #[test]
    fn test_root_path_segment() {
        let root = PathSegment::root();
        assert_eq!(root.id, ROOT_FOLDER_ID);
        assert_eq!(root.name, "Root");
    }

    #[test]
    fn test_grant_label() {
        let link = PermissionGrant::AnonymousLink {
            web_url: "https://1drv.ms/x".into(),
        };
        assert_eq!(link.label(), "anyone with link");

        let named = PermissionGrant::Named {
            display_name: Some("Ada Lovelace".into()),
            email: Some("ada@example.com".into()),
        };
        assert_eq!(named.label(), "Ada Lovelace <ada@example.com>");

        let email_only = PermissionGrant::Named {
            display_name: None,
            email: Some("ada@example.com".into()),
        };
        assert_eq!(email_only.label(), "ada@example.com");
    }

    #[test]
    fn test_error_recoverability() {
        assert!(DriveError::Network("reset".into()).is_recoverable());
        assert!(DriveError::Api {
            status: 503,
            message: "unavailable".into()
        }
        .is_recoverable());
        assert!(DriveError::Api {
            status: 429,
            message: "throttled".into()
        }
        .is_recoverable());
        assert!(!DriveError::AuthRejected.is_recoverable());
        assert!(!DriveError::NotFound("x".into()).is_recoverable());
    }

    #[test]
    fn test_row_count_loaded() {
        assert_eq!(RowCount::Exact(25).loaded(), 25);
        assert_eq!(RowCount::AtLeast(20).loaded(), 20);
    }
}
