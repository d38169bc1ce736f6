use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::{email, phone, required};
use crate::blob::BlobStore;
use crate::config::PortalConfig;
use crate::error::{PortalError, ValidationError};
use crate::pricing::convert_usd_to_local;
use crate::store::RecordStore;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SenderInfo {
    pub name: String,
    pub phone: String,
    #[serde(default)]
    pub email: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecipientInfo {
    pub name: String,
    pub phone: String,
    pub bank_name: String,
    pub account_number: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferStatus {
    #[default]
    Pending,
    Processing,
    Completed,
    Cancelled,
}

/// Form payload. Blob references come from a prior [`TransferService::upload_attachment`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransferSubmission {
    pub sender: SenderInfo,
    pub recipient: RecipientInfo,
    pub usd_amount: f64,
    #[serde(default)]
    pub proof_path: Option<String>,
    #[serde(default)]
    pub signature_path: Option<String>,
}

/// Validated row with the frozen conversion; the store assigns reference, status and time.
#[derive(Debug, Clone, PartialEq)]
pub struct TransferDraft {
    pub sender: SenderInfo,
    pub recipient: RecipientInfo,
    pub usd_amount: f64,
    pub rate_snapshot: f64,
    pub local_amount: f64,
    pub proof_path: Option<String>,
    pub signature_path: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MoneyTransferRequest {
    pub reference_number: String,
    pub sender: SenderInfo,
    pub recipient: RecipientInfo,
    pub usd_amount: f64,
    /// Rate captured at submission; later rate updates never touch this row.
    pub rate_snapshot: f64,
    pub local_amount: f64,
    pub proof_path: Option<String>,
    pub signature_path: Option<String>,
    pub status: TransferStatus,
    pub created_at: DateTime<Utc>,
}

/// `TRF-YYYYMMDD-NNNNNN`, assigned by the store when the row is created.
pub fn reference_number(created_at: DateTime<Utc>, sequence: u64) -> String {
    format!("TRF-{}-{sequence:06}", created_at.format("%Y%m%d"))
}

impl TransferSubmission {
    fn validate(self) -> Result<TransferSubmission, ValidationError> {
        if !self.usd_amount.is_finite() || self.usd_amount <= 0.0 {
            return Err(ValidationError::new(
                "usd_amount",
                "amount must be greater than zero",
            ));
        }

        let sender = SenderInfo {
            name: required("sender.name", &self.sender.name)?,
            phone: phone("sender.phone", &self.sender.phone)?,
            email: match self.sender.email.as_deref().map(str::trim) {
                Some(raw) if !raw.is_empty() => Some(email("sender.email", raw)?),
                _ => None,
            },
        };

        let account_number = required("recipient.account_number", &self.recipient.account_number)?;
        let account_ok = (4..=34).contains(&account_number.len())
            && account_number
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == ' ');
        if !account_ok {
            return Err(ValidationError::new(
                "recipient.account_number",
                "account number must be 4-34 letters, digits or dashes",
            ));
        }

        let recipient = RecipientInfo {
            name: required("recipient.name", &self.recipient.name)?,
            phone: phone("recipient.phone", &self.recipient.phone)?,
            bank_name: required("recipient.bank_name", &self.recipient.bank_name)?,
            account_number,
        };

        Ok(TransferSubmission {
            sender,
            recipient,
            usd_amount: self.usd_amount,
            proof_path: non_empty(self.proof_path),
            signature_path: non_empty(self.signature_path),
        })
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|raw| raw.trim().to_string())
        .filter(|raw| !raw.is_empty())
}

/// Blob attachments a transfer request may reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttachmentKind {
    PaymentProof,
    Signature,
}

impl AttachmentKind {
    fn prefix(&self) -> &'static str {
        match self {
            AttachmentKind::PaymentProof => "proof",
            AttachmentKind::Signature => "signature",
        }
    }
}

pub const SIGNATURE_BUCKET: &str = "signatures";

static ATTACHMENT_SEQUENCE: AtomicU64 = AtomicU64::new(1);

pub struct TransferService<S, B> {
    store: Arc<S>,
    blobs: Arc<B>,
    proof_bucket: String,
    max_upload_bytes: usize,
}

impl<S, B> TransferService<S, B>
where
    S: RecordStore + 'static,
    B: BlobStore + 'static,
{
    pub fn new(store: Arc<S>, blobs: Arc<B>, config: &PortalConfig) -> Self {
        Self {
            store,
            blobs,
            proof_bucket: config.proof_bucket.clone(),
            max_upload_bytes: config.max_upload_bytes,
        }
    }

    /// Store an image in the blob collaborator and return the path to reference it by.
    pub async fn upload_attachment(
        &self,
        kind: AttachmentKind,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<String, PortalError> {
        if bytes.is_empty() {
            return Err(ValidationError::new("file", "upload is empty").into());
        }
        if bytes.len() > self.max_upload_bytes {
            return Err(ValidationError::new(
                "file",
                format!("upload exceeds {} bytes", self.max_upload_bytes),
            )
            .into());
        }
        let mime: mime::Mime = content_type.parse().map_err(|_| {
            ValidationError::new("content_type", format!("'{content_type}' is not a MIME type"))
        })?;
        if mime.type_() != mime::IMAGE {
            return Err(ValidationError::new("content_type", "only images are accepted").into());
        }
        let extension = match mime.subtype().as_str() {
            "jpeg" => "jpg",
            other => other,
        };

        let bucket = match kind {
            AttachmentKind::PaymentProof => self.proof_bucket.as_str(),
            AttachmentKind::Signature => SIGNATURE_BUCKET,
        };
        let sequence = ATTACHMENT_SEQUENCE.fetch_add(1, Ordering::Relaxed);
        let path = format!(
            "{}/{}-{sequence:06}.{extension}",
            Utc::now().format("%Y/%m/%d"),
            kind.prefix()
        );
        let size = bytes.len();
        let stored = self
            .blobs
            .upload(bucket, &path, bytes, mime.essence_str())
            .await?;
        info!(bucket, path = %stored, size, "attachment uploaded");
        Ok(stored)
    }

    /// Convert with the latest published rate and persist the request.
    ///
    /// Reading the rate and inserting the row are two separate store calls; a rate published
    /// in between is not seen by this request.
    pub async fn submit(
        &self,
        submission: TransferSubmission,
    ) -> Result<MoneyTransferRequest, PortalError> {
        let submission = submission.validate()?;
        let rate = self
            .store
            .latest_exchange_rate()
            .await?
            .ok_or_else(|| PortalError::NotFound {
                entity: "exchange rate",
                id: "current".to_string(),
            })?;

        let draft = TransferDraft {
            local_amount: convert_usd_to_local(submission.usd_amount, rate.rate),
            rate_snapshot: rate.rate,
            usd_amount: submission.usd_amount,
            sender: submission.sender,
            recipient: submission.recipient,
            proof_path: submission.proof_path,
            signature_path: submission.signature_path,
        };
        let stored = self.store.insert_transfer(draft).await?;
        info!(
            reference = %stored.reference_number,
            usd = stored.usd_amount,
            rate = stored.rate_snapshot,
            "money transfer requested"
        );
        Ok(stored)
    }

    pub async fn get(&self, reference: &str) -> Result<MoneyTransferRequest, PortalError> {
        self.store
            .fetch_transfer(reference)
            .await?
            .ok_or_else(|| PortalError::NotFound {
                entity: "transfer",
                id: reference.to_string(),
            })
    }
}
