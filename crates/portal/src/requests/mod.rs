//! Non-moderated submissions: money-transfer requests, shipping requests, contact messages,
//! and the exchange-rate log the transfer form converts with.

pub mod contact;
pub mod rates;
pub mod router;
pub mod shipping;
pub mod transfers;

pub use contact::{ContactDraft, ContactMessage, ContactService, ContactSubmission};
pub use rates::{
    ExchangeRate, ExchangeRateImporter, ExchangeRateService, NewExchangeRate, RateImportError,
};
pub use router::{request_router, RequestServices};
pub use shipping::{
    ShippingDraft, ShippingParty, ShippingRequest, ShippingService, ShippingStatus,
    ShippingSubmission,
};
pub use transfers::{
    AttachmentKind, MoneyTransferRequest, RecipientInfo, SenderInfo, TransferDraft,
    TransferService, TransferStatus, TransferSubmission,
};

use crate::error::ValidationError;

pub(crate) fn required(field: &'static str, value: &str) -> Result<String, ValidationError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::new(field, format!("{field} is required")));
    }
    Ok(trimmed.to_string())
}

pub(crate) fn phone(field: &'static str, value: &str) -> Result<String, ValidationError> {
    let trimmed = required(field, value)?;
    let digits = trimmed.chars().filter(char::is_ascii_digit).count();
    let allowed = trimmed
        .chars()
        .all(|c| c.is_ascii_digit() || matches!(c, '+' | '-' | ' ' | '(' | ')'));
    if !allowed || digits < 7 {
        return Err(ValidationError::new(
            field,
            format!("'{trimmed}' is not a phone number"),
        ));
    }
    Ok(trimmed)
}

pub(crate) fn email(field: &'static str, value: &str) -> Result<String, ValidationError> {
    let trimmed = required(field, value)?;
    match trimmed.split_once('@') {
        Some((local, domain)) if !local.is_empty() && domain.contains('.') => Ok(trimmed),
        _ => Err(ValidationError::new(
            field,
            format!("'{trimmed}' is not an email address"),
        )),
    }
}
