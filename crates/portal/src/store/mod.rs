//! Entity-store collaborator contracts.
//!
//! The core only consumes these traits. [`InMemoryEntityStore`] is the bundled implementation
//! used by the service binary and tests; it publishes every committed mutation to a
//! [`ChangeFeed`](crate::feed::ChangeFeed).

mod memory;

pub use memory::InMemoryEntityStore;

use async_trait::async_trait;
use serde::Serialize;

use crate::error::PortalError;
use crate::listings::domain::{Listing, ListingDraft, ListingId, ListingKind, ListingStatus};
use crate::listings::moderation::DecisionUpdate;
use crate::requests::{
    ContactDraft, ContactMessage, ExchangeRate, MoneyTransferRequest, NewExchangeRate,
    ShippingDraft, ShippingRequest, ShippingStatus, TransferDraft,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Table {
    Jobs,
    Rentals,
    ExchangeRates,
    MoneyTransfers,
    ShippingRequests,
    ContactMessages,
}

impl Table {
    pub fn label(&self) -> &'static str {
        match self {
            Table::Jobs => "jobs",
            Table::Rentals => "rentals",
            Table::ExchangeRates => "exchange_rates",
            Table::MoneyTransfers => "money_transfers",
            Table::ShippingRequests => "shipping_requests",
            Table::ContactMessages => "contact_messages",
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("record already exists")]
    Duplicate,
    #[error("record not found")]
    NotFound,
    #[error("record status is {found}")]
    StatusMismatch { found: &'static str },
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl From<StoreError> for PortalError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::Duplicate => PortalError::Conflict("record already exists".to_string()),
            StoreError::NotFound => PortalError::NotFound {
                entity: "record",
                id: "unknown".to_string(),
            },
            mismatch @ StoreError::StatusMismatch { .. } => {
                PortalError::Conflict(mismatch.to_string())
            }
            StoreError::Unavailable(reason) => PortalError::Transport(reason),
        }
    }
}

/// Status-equality read of one listing table, newest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListingQuery {
    pub kind: ListingKind,
    pub status: ListingStatus,
    pub limit: Option<usize>,
}

#[async_trait]
pub trait ListingStore: Send + Sync {
    /// Insert in `Pending`; the store assigns id and creation time.
    async fn insert_listing(&self, draft: ListingDraft) -> Result<Listing, StoreError>;

    async fn query_listings(&self, query: &ListingQuery) -> Result<Vec<Listing>, StoreError>;

    async fn fetch_listing(
        &self,
        kind: ListingKind,
        id: &ListingId,
    ) -> Result<Option<Listing>, StoreError>;

    /// Single atomic conditional update: applies `update` only while the row is in `expected`,
    /// otherwise reports [`StoreError::StatusMismatch`] without touching the row.
    async fn decide_listing(
        &self,
        kind: ListingKind,
        id: &ListingId,
        expected: ListingStatus,
        update: DecisionUpdate,
    ) -> Result<Listing, StoreError>;
}

#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn insert_exchange_rate(&self, row: NewExchangeRate) -> Result<ExchangeRate, StoreError>;

    async fn latest_exchange_rate(&self) -> Result<Option<ExchangeRate>, StoreError>;

    /// Most recent first.
    async fn exchange_rate_history(
        &self,
        limit: Option<usize>,
    ) -> Result<Vec<ExchangeRate>, StoreError>;

    /// Insert in the default status; the store assigns the reference number.
    async fn insert_transfer(&self, draft: TransferDraft)
        -> Result<MoneyTransferRequest, StoreError>;

    async fn fetch_transfer(
        &self,
        reference: &str,
    ) -> Result<Option<MoneyTransferRequest>, StoreError>;

    async fn insert_shipping(&self, draft: ShippingDraft) -> Result<ShippingRequest, StoreError>;

    async fn query_shipping(
        &self,
        status: Option<ShippingStatus>,
    ) -> Result<Vec<ShippingRequest>, StoreError>;

    /// Atomic status change, refused unless the current status may advance to `next`.
    async fn advance_shipping(
        &self,
        id: u64,
        next: ShippingStatus,
    ) -> Result<ShippingRequest, StoreError>;

    async fn insert_contact(&self, draft: ContactDraft) -> Result<ContactMessage, StoreError>;
}
