//! Pure pricing rules: tiered shipping cost and USD to local currency conversion.
//!
//! Nothing here performs I/O; callers validate raw input (see [`parse_weight`]) before asking
//! for a price.

mod currency;
mod shipping;

pub use currency::{convert_usd_to_local, round_to_cents};
pub use shipping::{
    estimate_shipping_cost, parse_weight, quote, shipping_cost, ShippingQuote, ShippingTier,
    WeightUnit,
};

pub(crate) use shipping::validate_weight;
