use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::Utc;

use super::{ListingQuery, ListingStore, RecordStore, StoreError, Table};
use crate::feed::{ChangeEvent, ChangeFeed};
use crate::listings::domain::{Listing, ListingDraft, ListingId, ListingKind, ListingStatus};
use crate::listings::moderation::{self, DecisionUpdate};
use crate::requests::transfers::reference_number;
use crate::requests::{
    ContactDraft, ContactMessage, ExchangeRate, MoneyTransferRequest, NewExchangeRate,
    ShippingDraft, ShippingRequest, ShippingStatus, TransferDraft, TransferStatus,
};

#[derive(Debug, Default)]
struct Tables {
    jobs: BTreeMap<ListingId, Listing>,
    rentals: BTreeMap<ListingId, Listing>,
    job_sequence: u64,
    rental_sequence: u64,
    exchange_rates: Vec<ExchangeRate>,
    transfers: Vec<MoneyTransferRequest>,
    shipping: BTreeMap<u64, ShippingRequest>,
    contact: Vec<ContactMessage>,
    record_sequence: u64,
}

impl Tables {
    fn listings(&mut self, kind: ListingKind) -> &mut BTreeMap<ListingId, Listing> {
        match kind {
            ListingKind::Job => &mut self.jobs,
            ListingKind::Rental => &mut self.rentals,
        }
    }

    fn next_listing_id(&mut self, kind: ListingKind) -> ListingId {
        let sequence = match kind {
            ListingKind::Job => &mut self.job_sequence,
            ListingKind::Rental => &mut self.rental_sequence,
        };
        *sequence += 1;
        ListingId(format!("{}-{:06}", kind.label(), sequence))
    }

    fn next_record_id(&mut self) -> u64 {
        self.record_sequence += 1;
        self.record_sequence
    }
}

/// Process-local entity store. Every committed write is announced on the change feed after
/// the table lock is released.
#[derive(Debug, Clone)]
pub struct InMemoryEntityStore {
    tables: Arc<Mutex<Tables>>,
    feed: ChangeFeed,
}

impl InMemoryEntityStore {
    pub fn new(feed: ChangeFeed) -> Self {
        Self {
            tables: Arc::new(Mutex::new(Tables::default())),
            feed,
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, Tables>, StoreError> {
        self.tables
            .lock()
            .map_err(|_| StoreError::Unavailable("entity table lock poisoned".to_string()))
    }
}

#[async_trait]
impl ListingStore for InMemoryEntityStore {
    async fn insert_listing(&self, draft: ListingDraft) -> Result<Listing, StoreError> {
        let kind = draft.kind();
        let listing = {
            let mut tables = self.lock()?;
            let id = tables.next_listing_id(kind);
            let listing = Listing {
                id: id.clone(),
                status: ListingStatus::Pending,
                submitted_by: draft.submitted_by,
                approved_by: None,
                title: draft.title,
                description: draft.description,
                contact: draft.contact,
                created_at: Utc::now(),
                details: draft.details,
            };
            let rows = tables.listings(kind);
            if rows.contains_key(&id) {
                return Err(StoreError::Duplicate);
            }
            rows.insert(id, listing.clone());
            listing
        };

        self.feed.publish(ChangeEvent::inserted(
            kind.table(),
            Some(listing.status.label()),
        ));
        Ok(listing)
    }

    async fn query_listings(&self, query: &ListingQuery) -> Result<Vec<Listing>, StoreError> {
        let mut tables = self.lock()?;
        let mut rows: Vec<Listing> = tables
            .listings(query.kind)
            .values()
            .filter(|listing| listing.status == query.status)
            .cloned()
            .collect();
        drop(tables);

        rows.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| b.id.cmp(&a.id))
        });
        if let Some(limit) = query.limit {
            rows.truncate(limit);
        }
        Ok(rows)
    }

    async fn fetch_listing(
        &self,
        kind: ListingKind,
        id: &ListingId,
    ) -> Result<Option<Listing>, StoreError> {
        let mut tables = self.lock()?;
        Ok(tables.listings(kind).get(id).cloned())
    }

    async fn decide_listing(
        &self,
        kind: ListingKind,
        id: &ListingId,
        expected: ListingStatus,
        update: DecisionUpdate,
    ) -> Result<Listing, StoreError> {
        let (previous, decided) = {
            let mut tables = self.lock()?;
            let listing = tables
                .listings(kind)
                .get_mut(id)
                .ok_or(StoreError::NotFound)?;
            if listing.status != expected {
                return Err(StoreError::StatusMismatch {
                    found: listing.status.label(),
                });
            }
            let previous = listing.status;
            moderation::transition(previous, update.decision()).map_err(|found| {
                StoreError::StatusMismatch {
                    found: found.label(),
                }
            })?;
            update.apply_to(listing);
            (previous, listing.clone())
        };

        self.feed.publish(ChangeEvent::updated(
            kind.table(),
            previous.label(),
            decided.status.label(),
        ));
        Ok(decided)
    }
}

#[async_trait]
impl RecordStore for InMemoryEntityStore {
    async fn insert_exchange_rate(&self, row: NewExchangeRate) -> Result<ExchangeRate, StoreError> {
        let stored = {
            let mut tables = self.lock()?;
            let stored = ExchangeRate {
                id: tables.next_record_id(),
                rate: row.rate,
                created_at: row.created_at.unwrap_or_else(Utc::now),
            };
            tables.exchange_rates.push(stored.clone());
            stored
        };
        self.feed
            .publish(ChangeEvent::inserted(Table::ExchangeRates, None));
        Ok(stored)
    }

    async fn latest_exchange_rate(&self) -> Result<Option<ExchangeRate>, StoreError> {
        let tables = self.lock()?;
        Ok(tables
            .exchange_rates
            .iter()
            .max_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)))
            .cloned())
    }

    async fn exchange_rate_history(
        &self,
        limit: Option<usize>,
    ) -> Result<Vec<ExchangeRate>, StoreError> {
        let tables = self.lock()?;
        let mut rows = tables.exchange_rates.clone();
        drop(tables);

        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        if let Some(limit) = limit {
            rows.truncate(limit);
        }
        Ok(rows)
    }

    async fn insert_transfer(
        &self,
        draft: TransferDraft,
    ) -> Result<MoneyTransferRequest, StoreError> {
        let stored = {
            let mut tables = self.lock()?;
            let sequence = tables.next_record_id();
            let created_at = Utc::now();
            let stored = MoneyTransferRequest {
                reference_number: reference_number(created_at, sequence),
                sender: draft.sender,
                recipient: draft.recipient,
                usd_amount: draft.usd_amount,
                rate_snapshot: draft.rate_snapshot,
                local_amount: draft.local_amount,
                proof_path: draft.proof_path,
                signature_path: draft.signature_path,
                status: TransferStatus::default(),
                created_at,
            };
            if tables
                .transfers
                .iter()
                .any(|row| row.reference_number == stored.reference_number)
            {
                return Err(StoreError::Duplicate);
            }
            tables.transfers.push(stored.clone());
            stored
        };
        self.feed
            .publish(ChangeEvent::inserted(Table::MoneyTransfers, Some("pending")));
        Ok(stored)
    }

    async fn fetch_transfer(
        &self,
        reference: &str,
    ) -> Result<Option<MoneyTransferRequest>, StoreError> {
        let tables = self.lock()?;
        Ok(tables
            .transfers
            .iter()
            .find(|row| row.reference_number == reference)
            .cloned())
    }

    async fn insert_shipping(&self, draft: ShippingDraft) -> Result<ShippingRequest, StoreError> {
        let stored = {
            let mut tables = self.lock()?;
            let id = tables.next_record_id();
            let stored = ShippingRequest {
                id,
                sender: draft.sender,
                receiver: draft.receiver,
                weight: draft.weight,
                unit: draft.unit,
                cost: draft.cost,
                shipping_date: draft.shipping_date,
                status: ShippingStatus::default(),
                notes: draft.notes,
                created_at: Utc::now(),
            };
            tables.shipping.insert(id, stored.clone());
            stored
        };
        self.feed.publish(ChangeEvent::inserted(
            Table::ShippingRequests,
            Some(stored.status.label()),
        ));
        Ok(stored)
    }

    async fn query_shipping(
        &self,
        status: Option<ShippingStatus>,
    ) -> Result<Vec<ShippingRequest>, StoreError> {
        let tables = self.lock()?;
        Ok(tables
            .shipping
            .values()
            .rev()
            .filter(|row| status.map_or(true, |status| row.status == status))
            .cloned()
            .collect())
    }

    async fn advance_shipping(
        &self,
        id: u64,
        next: ShippingStatus,
    ) -> Result<ShippingRequest, StoreError> {
        let (previous, updated) = {
            let mut tables = self.lock()?;
            let row = tables.shipping.get_mut(&id).ok_or(StoreError::NotFound)?;
            if !row.status.can_advance_to(next) {
                return Err(StoreError::StatusMismatch {
                    found: row.status.label(),
                });
            }
            let previous = row.status;
            row.status = next;
            (previous, row.clone())
        };
        self.feed.publish(ChangeEvent::updated(
            Table::ShippingRequests,
            previous.label(),
            updated.status.label(),
        ));
        Ok(updated)
    }

    async fn insert_contact(&self, draft: ContactDraft) -> Result<ContactMessage, StoreError> {
        let stored = {
            let mut tables = self.lock()?;
            let stored = ContactMessage {
                id: tables.next_record_id(),
                name: draft.name,
                email: draft.email,
                subject: draft.subject,
                message: draft.message,
                created_at: Utc::now(),
            };
            tables.contact.push(stored.clone());
            stored
        };
        self.feed
            .publish(ChangeEvent::inserted(Table::ContactMessages, None));
        Ok(stored)
    }
}
