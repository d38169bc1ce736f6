/// Convert a USD amount with the rate captured when the request was created.
///
/// No rounding is applied; the full-precision amount is what gets stored. Presentation code
/// rounds separately with [`round_to_cents`].
pub fn convert_usd_to_local(usd_amount: f64, rate_snapshot: f64) -> f64 {
    usd_amount * rate_snapshot
}

/// Display helper for monetary amounts.
pub fn round_to_cents(amount: f64) -> f64 {
    (amount * 100.0).round() / 100.0
}
