//! Community job and rental listings: submission, moderation, and public reads.

pub mod domain;
pub mod moderation;
pub mod router;
pub mod service;

pub use domain::{
    Listing, ListingDetails, ListingDraft, ListingId, ListingKind, ListingStatus,
    ListingSubmission,
};
pub use moderation::{decide, transition, Decision, DecisionUpdate, ModerationError};
pub use router::listing_router;
pub use service::ListingService;
