//! Remote listing gateway
//!
//! Thin request/response layer over the Microsoft Graph drive endpoints.
//! The rest of the crate talks to the [`ListingGateway`] trait so the
//! browser engine and permission sweep can be exercised against an
//! in-memory gateway in tests.

pub mod gateway;
pub mod http_retry;
pub mod types;

pub use gateway::{GraphGateway, ListingGateway};
pub use http_retry::HttpRetryConfig;
pub use types::{
    DriveError, Entry, GraphConfig, ListingPage, PageCursor, PathSegment, PermissionGrant,
    RowCount, VisibleWindow, ROOT_FOLDER_ID,
};
