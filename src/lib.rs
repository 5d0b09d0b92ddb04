//! Drivedeck - incremental cloud drive browser core
//!
//! Authenticated browsing of a remote cloud-storage tree with paged listing,
//! breadcrumb navigation, a virtualization-friendly windowed render contract,
//! and background enrichment of per-entry sharing permissions.
//!
//! The crate is split along the same seams as the service it talks to:
//! - [`graph`] wraps the Microsoft Graph drive endpoints behind the
//!   [`graph::ListingGateway`] trait,
//! - [`session`] carries the bearer credential supplied by an external
//!   identity flow,
//! - [`browser`] owns the accumulated entry list, continuation cursor and
//!   folder path,
//! - [`sweep`] periodically fills in sharing permissions for the rows a
//!   render layer reports as visible.

pub mod browser;
pub mod graph;
pub mod session;
pub mod sweep;

pub use browser::{FolderBrowser, NavTarget};
pub use graph::{
    DriveError, Entry, GraphConfig, GraphGateway, ListingGateway, ListingPage, PageCursor,
    PathSegment, PermissionGrant, RowCount, VisibleWindow, ROOT_FOLDER_ID,
};
pub use session::{Session, SessionHandle, StoredTokens};
pub use sweep::PermissionSweeper;
