use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Unit the sender used when entering the parcel weight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WeightUnit {
    Kg,
    Lbs,
}

impl WeightUnit {
    pub fn label(&self) -> &'static str {
        match self {
            WeightUnit::Kg => "kg",
            WeightUnit::Lbs => "lbs",
        }
    }

    fn tiers(&self) -> TierTable {
        match self {
            WeightUnit::Kg => TierTable {
                flat_ceiling: 3.0,
                standard_ceiling: 10.0,
                standard_rate: 18.0,
                bulk_rate: 15.0,
            },
            WeightUnit::Lbs => TierTable {
                flat_ceiling: 6.0,
                standard_ceiling: 22.0,
                standard_rate: 8.16,
                bulk_rate: 6.80,
            },
        }
    }
}

impl fmt::Display for WeightUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for WeightUnit {
    type Err = ValidationError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "kg" | "kgs" => Ok(WeightUnit::Kg),
            "lb" | "lbs" => Ok(WeightUnit::Lbs),
            _ => Err(ValidationError::new(
                "unit",
                format!("'{raw}' is not a supported unit (kg or lbs)"),
            )),
        }
    }
}

pub const FLAT_RATE: f64 = 45.0;

struct TierTable {
    flat_ceiling: f64,
    standard_ceiling: f64,
    standard_rate: f64,
    bulk_rate: f64,
}

/// Pricing band a weight falls into. Boundary weights belong to the lower band.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ShippingTier {
    Flat,
    Standard,
    Bulk,
}

impl ShippingTier {
    pub fn label(&self) -> &'static str {
        match self {
            ShippingTier::Flat => "Flat rate",
            ShippingTier::Standard => "Standard",
            ShippingTier::Bulk => "Bulk",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ShippingQuote {
    pub weight: f64,
    pub unit: WeightUnit,
    pub tier: ShippingTier,
    /// Per-unit rate for weighted tiers, `None` for the flat band.
    pub rate_per_unit: Option<f64>,
    pub cost: f64,
}

/// Price a parcel and report which tier produced the amount.
///
/// `weight` must already be validated as finite and non-negative.
pub fn quote(weight: f64, unit: WeightUnit) -> ShippingQuote {
    let table = unit.tiers();
    let (tier, rate_per_unit, raw) = if weight <= table.flat_ceiling {
        (ShippingTier::Flat, None, FLAT_RATE)
    } else if weight <= table.standard_ceiling {
        (
            ShippingTier::Standard,
            Some(table.standard_rate),
            weight * table.standard_rate,
        )
    } else {
        (
            ShippingTier::Bulk,
            Some(table.bulk_rate),
            weight * table.bulk_rate,
        )
    };

    ShippingQuote {
        weight,
        unit,
        tier,
        rate_per_unit,
        cost: round_half_up_cents(raw),
    }
}

pub fn shipping_cost(weight: f64, unit: WeightUnit) -> f64 {
    quote(weight, unit).cost
}

/// Caller-facing estimator: validates the weight and then prices it.
pub fn estimate_shipping_cost(weight: f64, unit: WeightUnit) -> Result<f64, ValidationError> {
    validate_weight(weight)?;
    Ok(shipping_cost(weight, unit))
}

/// Parse a weight typed into a form field.
pub fn parse_weight(raw: &str) -> Result<f64, ValidationError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::new("weight", "weight is required"));
    }
    let weight = trimmed
        .parse::<f64>()
        .map_err(|_| ValidationError::new("weight", format!("'{trimmed}' is not a number")))?;
    validate_weight(weight)?;
    Ok(weight)
}

pub(crate) fn validate_weight(weight: f64) -> Result<(), ValidationError> {
    if !weight.is_finite() {
        return Err(ValidationError::new("weight", "weight must be a finite number"));
    }
    if weight < 0.0 {
        return Err(ValidationError::new("weight", "weight cannot be negative"));
    }
    Ok(())
}

fn round_half_up_cents(amount: f64) -> f64 {
    (amount * 100.0).round() / 100.0
}
