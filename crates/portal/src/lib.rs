//! Core of the community portal: listing moderation, change propagation, synchronized views,
//! and the pricing rules behind the shipping and money-transfer forms.

pub mod auth;
pub mod blob;
pub mod config;
pub mod error;
pub mod feed;
pub mod listings;
pub mod pricing;
pub mod requests;
pub mod store;
pub mod sync;
pub mod telemetry;
