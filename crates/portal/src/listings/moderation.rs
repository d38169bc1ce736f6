//! Moderation state machine: `pending -> approved | rejected`, decided once by an admin.

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::domain::{Listing, ListingId, ListingKind, ListingStatus};
use crate::auth::{AuthProvider, Capability, Principal, PrincipalId, SessionContext};
use crate::error::{AuthError, PortalError};
use crate::store::{ListingStore, StoreError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Approve,
    Reject,
}

impl Decision {
    pub fn target_status(&self) -> ListingStatus {
        match self {
            Decision::Approve => ListingStatus::Approved,
            Decision::Reject => ListingStatus::Rejected,
        }
    }
}

/// Legal transition for `decision` out of `current`. Only `Pending` may be decided.
pub fn transition(current: ListingStatus, decision: Decision) -> Result<ListingStatus, ListingStatus> {
    match current {
        ListingStatus::Pending => Ok(decision.target_status()),
        decided => Err(decided),
    }
}

/// Field set written by a decision. The constructor keeps the approver tied to approval.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecisionUpdate {
    decision: Decision,
    approved_by: Option<PrincipalId>,
}

impl DecisionUpdate {
    pub fn for_decision(decision: Decision, admin: &Principal) -> Self {
        let approved_by = match decision {
            Decision::Approve => Some(admin.id.clone()),
            Decision::Reject => None,
        };
        Self {
            decision,
            approved_by,
        }
    }

    pub fn decision(&self) -> Decision {
        self.decision
    }

    pub fn status(&self) -> ListingStatus {
        self.decision.target_status()
    }

    pub fn approved_by(&self) -> Option<&PrincipalId> {
        self.approved_by.as_ref()
    }

    /// Apply to a row already known to be in the expected status.
    pub fn apply_to(&self, listing: &mut Listing) {
        listing.status = self.status();
        listing.approved_by = self.approved_by.clone();
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ModerationError {
    #[error(transparent)]
    Unauthorized(#[from] AuthError),
    #[error("listing {id} was already {status}")]
    AlreadyDecided { id: ListingId, status: &'static str },
    #[error("listing {id} not found")]
    NotFound { id: ListingId },
    #[error("moderation collaborator unavailable: {0}")]
    Transport(String),
}

impl From<ModerationError> for PortalError {
    fn from(value: ModerationError) -> Self {
        match value {
            ModerationError::Unauthorized(err) => PortalError::Auth(err),
            conflict @ ModerationError::AlreadyDecided { .. } => {
                PortalError::Conflict(conflict.to_string())
            }
            ModerationError::NotFound { id } => PortalError::NotFound {
                entity: "listing",
                id: id.0,
            },
            ModerationError::Transport(reason) => PortalError::Transport(reason),
        }
    }
}

/// Resolve the acting admin and apply one atomic conditional update on the store.
///
/// The store compares the current status with `Pending` inside its own critical section, so
/// two admins racing on one listing produce exactly one winner; the loser gets
/// [`ModerationError::AlreadyDecided`] and the row is left untouched.
pub async fn decide<S, A>(
    store: &S,
    auth: &A,
    session: &SessionContext,
    kind: ListingKind,
    id: &ListingId,
    decision: Decision,
) -> Result<Listing, ModerationError>
where
    S: ListingStore + ?Sized,
    A: AuthProvider + ?Sized,
{
    let principal = match auth.current_principal(session).await {
        Ok(current) => current.require(Capability::Admin)?,
        Err(PortalError::Auth(err)) => return Err(ModerationError::Unauthorized(err)),
        Err(other) => return Err(ModerationError::Transport(other.to_string())),
    };

    let update = DecisionUpdate::for_decision(decision, &principal);
    match store
        .decide_listing(kind, id, ListingStatus::Pending, update)
        .await
    {
        Ok(listing) => {
            info!(
                listing = %listing.id,
                kind = kind.label(),
                status = listing.status.label(),
                admin = %principal.id,
                "listing decided"
            );
            Ok(listing)
        }
        Err(StoreError::StatusMismatch { found }) => {
            warn!(listing = %id, found, admin = %principal.id, "decision lost to an earlier one");
            Err(ModerationError::AlreadyDecided {
                id: id.clone(),
                status: found,
            })
        }
        Err(StoreError::NotFound) => Err(ModerationError::NotFound { id: id.clone() }),
        Err(other) => Err(ModerationError::Transport(other.to_string())),
    }
}
