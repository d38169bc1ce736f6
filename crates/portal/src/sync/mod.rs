//! View synchronizers: per-screen caches of a status-filtered listing slice.
//!
//! A synchronizer subscribes to its slice on the [`ChangeFeed`], performs an initial fetch and
//! re-fetches the whole slice whenever a notification (or a resync) arrives. Pushed events are
//! treated as invalidations only; the cache is always replaced wholesale by the latest fetch.

mod view;

#[cfg(test)]
mod tests;

pub use view::{FetchOutcome, ViewHandle, ViewSynchronizer};

use crate::error::PortalError;
use crate::feed::Topic;
use crate::listings::domain::{Listing, ListingKind, ListingStatus};
use crate::store::{ListingQuery, StoreError};

/// What a view shows: one listing kind in one status, optionally the newest `limit` rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListingSlice {
    pub kind: ListingKind,
    pub status: ListingStatus,
    pub limit: Option<usize>,
}

impl ListingSlice {
    /// Public listing page: everything approved.
    pub fn published(kind: ListingKind) -> Self {
        Self {
            kind,
            status: ListingStatus::Approved,
            limit: None,
        }
    }

    /// Embedded "recent listings" widget.
    pub fn recent(kind: ListingKind, limit: usize) -> Self {
        Self {
            kind,
            status: ListingStatus::Approved,
            limit: Some(limit),
        }
    }

    /// Admin dashboard tab.
    pub fn admin_tab(kind: ListingKind, status: ListingStatus) -> Self {
        Self {
            kind,
            status,
            limit: None,
        }
    }

    pub fn topic(&self) -> Topic {
        Topic::slice(self.kind.table(), self.status.label())
    }

    pub fn query(&self) -> ListingQuery {
        ListingQuery {
            kind: self.kind,
            status: self.status,
            limit: self.limit,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ViewSnapshot {
    pub items: Vec<Listing>,
    pub is_loading: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("view is no longer mounted")]
    Unmounted,
    #[error("refetch failed: {0}")]
    Store(#[from] StoreError),
}

impl From<SyncError> for PortalError {
    fn from(value: SyncError) -> Self {
        match value {
            SyncError::Unmounted => PortalError::Conflict(value.to_string()),
            SyncError::Store(err) => err.into(),
        }
    }
}
