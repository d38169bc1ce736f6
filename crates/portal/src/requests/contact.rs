use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::{email, required};
use crate::error::{PortalError, ValidationError};
use crate::store::RecordStore;

const MAX_MESSAGE_CHARS: usize = 4_000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactSubmission {
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub subject: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContactDraft {
    pub name: String,
    pub email: String,
    pub subject: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactMessage {
    pub id: u64,
    pub name: String,
    pub email: String,
    pub subject: String,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

impl ContactSubmission {
    pub fn into_draft(self) -> Result<ContactDraft, ValidationError> {
        let message = required("message", &self.message)?;
        if message.chars().count() > MAX_MESSAGE_CHARS {
            return Err(ValidationError::new(
                "message",
                format!("message must be at most {MAX_MESSAGE_CHARS} characters"),
            ));
        }
        Ok(ContactDraft {
            name: required("name", &self.name)?,
            email: email("email", &self.email)?,
            subject: self.subject.trim().to_string(),
            message,
        })
    }
}

pub struct ContactService<S> {
    store: Arc<S>,
}

impl<S> ContactService<S>
where
    S: RecordStore + 'static,
{
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    pub async fn submit(&self, submission: ContactSubmission) -> Result<ContactMessage, PortalError> {
        let draft = submission.into_draft()?;
        let stored = self.store.insert_contact(draft).await?;
        info!(id = stored.id, "contact message received");
        Ok(stored)
    }
}
