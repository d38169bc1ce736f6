use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::auth::PrincipalId;
use crate::error::ValidationError;
use crate::store::Table;

/// Identifier wrapper for listings, assigned by the entity store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ListingId(pub String);

impl fmt::Display for ListingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ListingKind {
    Job,
    Rental,
}

impl ListingKind {
    pub fn label(&self) -> &'static str {
        match self {
            ListingKind::Job => "job",
            ListingKind::Rental => "rental",
        }
    }

    pub fn table(&self) -> Table {
        match self {
            ListingKind::Job => Table::Jobs,
            ListingKind::Rental => Table::Rentals,
        }
    }
}

impl FromStr for ListingKind {
    type Err = ValidationError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "job" | "jobs" => Ok(ListingKind::Job),
            "rental" | "rentals" => Ok(ListingKind::Rental),
            _ => Err(ValidationError::new(
                "kind",
                format!("'{raw}' is not a listing kind (jobs or rentals)"),
            )),
        }
    }
}

/// Moderation status. `Approved` and `Rejected` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ListingStatus {
    Pending,
    Approved,
    Rejected,
}

impl ListingStatus {
    pub const ALL: [ListingStatus; 3] = [
        ListingStatus::Pending,
        ListingStatus::Approved,
        ListingStatus::Rejected,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            ListingStatus::Pending => "pending",
            ListingStatus::Approved => "approved",
            ListingStatus::Rejected => "rejected",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, ListingStatus::Pending)
    }
}

impl fmt::Display for ListingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for ListingStatus {
    type Err = ValidationError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        ListingStatus::ALL
            .into_iter()
            .find(|status| status.label().eq_ignore_ascii_case(raw.trim()))
            .ok_or_else(|| {
                ValidationError::new("status", format!("'{raw}' is not a listing status"))
            })
    }
}

/// Fields specific to each listing variant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ListingDetails {
    Job { company: String, location: String },
    Rental { address: String, price: f64 },
}

impl ListingDetails {
    pub fn kind(&self) -> ListingKind {
        match self {
            ListingDetails::Job { .. } => ListingKind::Job,
            ListingDetails::Rental { .. } => ListingKind::Rental,
        }
    }
}

/// Public submission payload; no sign-in required.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListingSubmission {
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub contact: String,
    pub details: ListingDetails,
}

const MAX_TITLE_CHARS: usize = 200;
const MAX_DESCRIPTION_CHARS: usize = 5_000;

impl ListingSubmission {
    /// Trim and check the submission, producing the row handed to the store.
    pub fn into_draft(
        self,
        submitted_by: Option<PrincipalId>,
    ) -> Result<ListingDraft, ValidationError> {
        let title = required("title", &self.title)?;
        if title.chars().count() > MAX_TITLE_CHARS {
            return Err(ValidationError::new(
                "title",
                format!("title must be at most {MAX_TITLE_CHARS} characters"),
            ));
        }
        let description = self.description.trim().to_string();
        if description.chars().count() > MAX_DESCRIPTION_CHARS {
            return Err(ValidationError::new(
                "description",
                format!("description must be at most {MAX_DESCRIPTION_CHARS} characters"),
            ));
        }
        let contact = required("contact", &self.contact)?;

        let details = match self.details {
            ListingDetails::Job { company, location } => ListingDetails::Job {
                company: required("company", &company)?,
                location: required("location", &location)?,
            },
            ListingDetails::Rental { address, price } => {
                if !price.is_finite() || price < 0.0 {
                    return Err(ValidationError::new(
                        "price",
                        "price must be a non-negative amount",
                    ));
                }
                ListingDetails::Rental {
                    address: required("address", &address)?,
                    price,
                }
            }
        };

        Ok(ListingDraft {
            submitted_by,
            title,
            description,
            contact,
            details,
        })
    }
}

fn required(field: &'static str, value: &str) -> Result<String, ValidationError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::new(field, format!("{field} is required")));
    }
    Ok(trimmed.to_string())
}

/// Validated row ready for insertion; the store assigns id, status and timestamp.
#[derive(Debug, Clone, PartialEq)]
pub struct ListingDraft {
    pub submitted_by: Option<PrincipalId>,
    pub title: String,
    pub description: String,
    pub contact: String,
    pub details: ListingDetails,
}

impl ListingDraft {
    pub fn kind(&self) -> ListingKind {
        self.details.kind()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Listing {
    pub id: ListingId,
    pub status: ListingStatus,
    pub submitted_by: Option<PrincipalId>,
    pub approved_by: Option<PrincipalId>,
    pub title: String,
    pub description: String,
    pub contact: String,
    pub created_at: DateTime<Utc>,
    pub details: ListingDetails,
}

impl Listing {
    pub fn kind(&self) -> ListingKind {
        self.details.kind()
    }

    /// An approver is recorded exactly when the listing is approved.
    pub fn approver_consistent(&self) -> bool {
        self.approved_by.is_some() == (self.status == ListingStatus::Approved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rental(price: f64) -> ListingSubmission {
        ListingSubmission {
            title: "  Two bedroom near the market ".to_string(),
            description: "Water included".to_string(),
            contact: "555-0101".to_string(),
            details: ListingDetails::Rental {
                address: "12 Palm Street".to_string(),
                price,
            },
        }
    }

    #[test]
    fn draft_trims_text_fields() {
        let draft = rental(350.0).into_draft(None).expect("valid rental");
        assert_eq!(draft.title, "Two bedroom near the market");
        assert_eq!(draft.kind(), ListingKind::Rental);
        assert!(draft.submitted_by.is_none());
    }

    #[test]
    fn draft_rejects_missing_and_invalid_fields() {
        let mut blank_title = rental(350.0);
        blank_title.title = "   ".to_string();
        assert_eq!(blank_title.into_draft(None).unwrap_err().field, "title");

        assert_eq!(rental(-1.0).into_draft(None).unwrap_err().field, "price");
        assert_eq!(rental(f64::NAN).into_draft(None).unwrap_err().field, "price");

        let job = ListingSubmission {
            title: "Cashier".to_string(),
            description: String::new(),
            contact: "hr@example.com".to_string(),
            details: ListingDetails::Job {
                company: "Corner Shop".to_string(),
                location: "".to_string(),
            },
        };
        assert_eq!(job.into_draft(None).unwrap_err().field, "location");
    }

    #[test]
    fn kinds_and_statuses_parse_from_path_segments() {
        assert_eq!("jobs".parse::<ListingKind>().expect("jobs"), ListingKind::Job);
        assert_eq!(
            "Rentals".parse::<ListingKind>().expect("rentals"),
            ListingKind::Rental
        );
        assert_eq!(
            "APPROVED".parse::<ListingStatus>().expect("approved"),
            ListingStatus::Approved
        );
        assert!("archived".parse::<ListingStatus>().is_err());
    }
}
