use std::sync::Arc;

use tracing::info;

use super::domain::{Listing, ListingId, ListingKind, ListingStatus, ListingSubmission};
use super::moderation::{self, Decision, ModerationError};
use crate::auth::{AuthProvider, Capability, SessionContext};
use crate::error::PortalError;
use crate::store::ListingStore;
use crate::sync::ListingSlice;

/// Service composing the listing store with the auth collaborator.
pub struct ListingService<S, A> {
    store: Arc<S>,
    auth: Arc<A>,
    recent_limit: usize,
}

impl<S, A> ListingService<S, A>
where
    S: ListingStore + 'static,
    A: AuthProvider + 'static,
{
    pub fn new(store: Arc<S>, auth: Arc<A>, recent_limit: usize) -> Self {
        Self {
            store,
            auth,
            recent_limit,
        }
    }

    pub fn store(&self) -> Arc<S> {
        Arc::clone(&self.store)
    }

    /// Anyone may submit; a signed-in submitter is recorded. New listings always start pending.
    pub async fn submit_listing(
        &self,
        session: &SessionContext,
        submission: ListingSubmission,
    ) -> Result<Listing, PortalError> {
        let principal = self.auth.current_principal(session).await?;
        let draft = submission.into_draft(principal.id().cloned())?;
        let listing = self.store.insert_listing(draft).await?;
        info!(
            listing = %listing.id,
            kind = listing.kind().label(),
            signed_in = listing.submitted_by.is_some(),
            "listing submitted"
        );
        Ok(listing)
    }

    pub async fn decide(
        &self,
        session: &SessionContext,
        kind: ListingKind,
        id: &ListingId,
        decision: Decision,
    ) -> Result<Listing, ModerationError> {
        moderation::decide(
            self.store.as_ref(),
            self.auth.as_ref(),
            session,
            kind,
            id,
            decision,
        )
        .await
    }

    /// Approved slices are public; pending and rejected queues need the admin capability.
    pub async fn list(
        &self,
        session: &SessionContext,
        slice: ListingSlice,
    ) -> Result<Vec<Listing>, PortalError> {
        if slice.status != ListingStatus::Approved {
            self.auth
                .current_principal(session)
                .await?
                .require(Capability::Admin)?;
        }
        Ok(self.store.query_listings(&slice.query()).await?)
    }

    /// Newest approved listings for the embedded widget.
    pub async fn recent(&self, kind: ListingKind) -> Result<Vec<Listing>, PortalError> {
        let slice = ListingSlice::recent(kind, self.recent_limit);
        Ok(self.store.query_listings(&slice.query()).await?)
    }
}
