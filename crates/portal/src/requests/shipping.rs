use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::{phone, required};
use crate::auth::{AuthProvider, Capability, SessionContext};
use crate::error::{PortalError, ValidationError};
use crate::pricing::{shipping_cost, validate_weight, WeightUnit};
use crate::store::{RecordStore, StoreError};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShippingParty {
    pub name: String,
    pub phone: String,
    pub address: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShippingStatus {
    #[default]
    Pending,
    InProgress,
    Completed,
    Cancelled,
}

impl ShippingStatus {
    pub fn label(&self) -> &'static str {
        match self {
            ShippingStatus::Pending => "pending",
            ShippingStatus::InProgress => "in_progress",
            ShippingStatus::Completed => "completed",
            ShippingStatus::Cancelled => "cancelled",
        }
    }

    /// `pending -> in_progress -> completed`, cancellable until completed.
    pub fn can_advance_to(&self, next: ShippingStatus) -> bool {
        matches!(
            (self, next),
            (ShippingStatus::Pending, ShippingStatus::InProgress)
                | (ShippingStatus::Pending, ShippingStatus::Cancelled)
                | (ShippingStatus::InProgress, ShippingStatus::Completed)
                | (ShippingStatus::InProgress, ShippingStatus::Cancelled)
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShippingSubmission {
    pub sender: ShippingParty,
    pub receiver: ShippingParty,
    pub weight: f64,
    pub unit: WeightUnit,
    pub shipping_date: NaiveDate,
    #[serde(default)]
    pub notes: String,
}

/// Validated row carrying the cost frozen at submission time.
#[derive(Debug, Clone, PartialEq)]
pub struct ShippingDraft {
    pub sender: ShippingParty,
    pub receiver: ShippingParty,
    pub weight: f64,
    pub unit: WeightUnit,
    pub cost: f64,
    pub shipping_date: NaiveDate,
    pub notes: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShippingRequest {
    pub id: u64,
    pub sender: ShippingParty,
    pub receiver: ShippingParty,
    pub weight: f64,
    pub unit: WeightUnit,
    pub cost: f64,
    pub shipping_date: NaiveDate,
    pub status: ShippingStatus,
    pub notes: String,
    pub created_at: DateTime<Utc>,
}

fn party(prefix: &'static str, party: ShippingParty) -> Result<ShippingParty, ValidationError> {
    let (name, phone_field, address) = match prefix {
        "sender" => ("sender.name", "sender.phone", "sender.address"),
        _ => ("receiver.name", "receiver.phone", "receiver.address"),
    };
    Ok(ShippingParty {
        name: required(name, &party.name)?,
        phone: phone(phone_field, &party.phone)?,
        address: required(address, &party.address)?,
    })
}

impl ShippingSubmission {
    pub fn into_draft(self, today: NaiveDate) -> Result<ShippingDraft, ValidationError> {
        validate_weight(self.weight)?;
        if self.weight == 0.0 {
            return Err(ValidationError::new("weight", "weight must be greater than zero"));
        }
        if self.shipping_date < today {
            return Err(ValidationError::new(
                "shipping_date",
                "shipping date cannot be in the past",
            ));
        }

        Ok(ShippingDraft {
            sender: party("sender", self.sender)?,
            receiver: party("receiver", self.receiver)?,
            cost: shipping_cost(self.weight, self.unit),
            weight: self.weight,
            unit: self.unit,
            shipping_date: self.shipping_date,
            notes: self.notes.trim().to_string(),
        })
    }
}

pub struct ShippingService<S, A> {
    store: Arc<S>,
    auth: Arc<A>,
}

impl<S, A> ShippingService<S, A>
where
    S: RecordStore + 'static,
    A: AuthProvider + 'static,
{
    pub fn new(store: Arc<S>, auth: Arc<A>) -> Self {
        Self { store, auth }
    }

    pub async fn submit(
        &self,
        submission: ShippingSubmission,
    ) -> Result<ShippingRequest, PortalError> {
        let draft = submission.into_draft(Utc::now().date_naive())?;
        let stored = self.store.insert_shipping(draft).await?;
        info!(
            id = stored.id,
            weight = stored.weight,
            unit = stored.unit.label(),
            cost = stored.cost,
            "shipping request created"
        );
        Ok(stored)
    }

    pub async fn list(
        &self,
        session: &SessionContext,
        status: Option<ShippingStatus>,
    ) -> Result<Vec<ShippingRequest>, PortalError> {
        self.auth
            .current_principal(session)
            .await?
            .require(Capability::Admin)?;
        Ok(self.store.query_shipping(status).await?)
    }

    /// Admin status change, applied atomically against the status the store holds.
    pub async fn advance(
        &self,
        session: &SessionContext,
        id: u64,
        next: ShippingStatus,
    ) -> Result<ShippingRequest, PortalError> {
        let admin = self
            .auth
            .current_principal(session)
            .await?
            .require(Capability::Admin)?;

        match self.store.advance_shipping(id, next).await {
            Ok(updated) => {
                info!(id, status = next.label(), admin = %admin.id, "shipping status changed");
                Ok(updated)
            }
            Err(StoreError::StatusMismatch { found }) => Err(PortalError::Conflict(format!(
                "shipping request {id} cannot move from {found} to {}",
                next.label()
            ))),
            Err(StoreError::NotFound) => Err(PortalError::NotFound {
                entity: "shipping request",
                id: id.to_string(),
            }),
            Err(other) => Err(other.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn submission(weight: f64, unit: WeightUnit, date: NaiveDate) -> ShippingSubmission {
        ShippingSubmission {
            sender: ShippingParty {
                name: "Luis Peña".to_string(),
                phone: "305-555-0100".to_string(),
                address: "100 Biscayne Blvd, Miami".to_string(),
            },
            receiver: ShippingParty {
                name: "Ana Peña".to_string(),
                phone: "809-555-0111".to_string(),
                address: "Calle 5, Santo Domingo".to_string(),
            },
            weight,
            unit,
            shipping_date: date,
            notes: " fragile ".to_string(),
        }
    }

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 6, d).expect("valid date")
    }

    #[test]
    fn draft_freezes_tiered_cost() {
        let draft = submission(8.0, WeightUnit::Kg, day(10))
            .into_draft(day(1))
            .expect("valid");
        assert_eq!(draft.cost, 144.0);
        assert_eq!(draft.notes, "fragile");

        let draft = submission(20.0, WeightUnit::Lbs, day(10))
            .into_draft(day(1))
            .expect("valid");
        assert_eq!(draft.cost, 163.2);
    }

    #[test]
    fn draft_rejects_invalid_weight_and_past_dates() {
        let err = submission(-2.0, WeightUnit::Kg, day(10))
            .into_draft(day(1))
            .unwrap_err();
        assert_eq!(err.field, "weight");
        let err = submission(0.0, WeightUnit::Kg, day(10))
            .into_draft(day(1))
            .unwrap_err();
        assert_eq!(err.field, "weight");
        let err = submission(2.0, WeightUnit::Kg, day(1))
            .into_draft(day(2))
            .unwrap_err();
        assert_eq!(err.field, "shipping_date");
    }

    #[test]
    fn status_transitions_follow_fulfilment_order() {
        use ShippingStatus::*;
        assert!(Pending.can_advance_to(InProgress));
        assert!(InProgress.can_advance_to(Completed));
        assert!(Pending.can_advance_to(Cancelled));
        assert!(!Pending.can_advance_to(Completed));
        assert!(!Completed.can_advance_to(Cancelled));
        assert!(!Cancelled.can_advance_to(Pending));
    }
}
