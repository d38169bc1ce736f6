use crate::infra::Portal;
use clap::Args;
use portal::auth::SessionContext;
use portal::config::PortalConfig;
use portal::error::{AppError, PortalError, ValidationError};
use portal::pricing::{
    convert_usd_to_local, estimate_shipping_cost, parse_weight, quote, round_to_cents, WeightUnit,
};
use portal::requests::rates::validate_rate;
use portal::requests::ExchangeRateImporter;
use std::path::PathBuf;

const IMPORT_TOKEN: &str = "rates-import";

#[derive(Args, Debug)]
pub(crate) struct EstimateArgs {
    /// Parcel weight
    #[arg(long)]
    pub(crate) weight: String,
    /// Weight unit: kg or lbs
    #[arg(long, default_value = "kg")]
    pub(crate) unit: String,
}

#[derive(Args, Debug)]
pub(crate) struct ConvertArgs {
    /// Amount in USD
    #[arg(long)]
    pub(crate) usd: f64,
    /// Local currency units per USD
    #[arg(long)]
    pub(crate) rate: f64,
}

#[derive(Args, Debug)]
pub(crate) struct ImportArgs {
    /// CSV export with `rate[,created_at]` columns
    #[arg(long)]
    pub(crate) csv: PathBuf,
}

pub(crate) fn run_shipping_estimate(args: EstimateArgs) -> Result<(), AppError> {
    let weight = parse_weight(&args.weight).map_err(PortalError::from)?;
    let unit: WeightUnit = args.unit.parse().map_err(PortalError::from)?;
    let cost = estimate_shipping_cost(weight, unit).map_err(PortalError::from)?;
    let quote = quote(weight, unit);

    println!("Shipping estimate");
    println!("  Weight: {weight} {}", unit.label());
    match quote.rate_per_unit {
        Some(rate) => println!("  Tier: {} ({rate:.2} per {})", quote.tier.label(), unit.label()),
        None => println!("  Tier: {}", quote.tier.label()),
    }
    println!("  Cost: ${cost:.2}");
    Ok(())
}

pub(crate) fn run_currency_convert(args: ConvertArgs) -> Result<(), AppError> {
    let rate = validate_rate(args.rate).map_err(PortalError::from)?;
    if !args.usd.is_finite() || args.usd <= 0.0 {
        return Err(
            PortalError::from(ValidationError::new("usd", "amount must be greater than zero"))
                .into(),
        );
    }

    let local = convert_usd_to_local(args.usd, rate);
    println!("USD {:.2} at {rate} = {:.2}", args.usd, round_to_cents(local));
    Ok(())
}

pub(crate) async fn run_rates_import(args: ImportArgs) -> Result<(), AppError> {
    let rows = ExchangeRateImporter::from_path(&args.csv)?;

    let mut config = PortalConfig::default();
    config
        .admin_tokens
        .insert(IMPORT_TOKEN.to_string(), "rates-import".to_string());
    let portal = Portal::in_memory(&config);
    let session = SessionContext::bearer(IMPORT_TOKEN);

    let stored = portal.requests.rates.import(&session, rows).await?;
    let current = portal.requests.rates.current().await?;

    println!("Imported {} exchange rate(s) from {}", stored.len(), args.csv.display());
    for rate in &stored {
        println!("  {} {}", rate.created_at.format("%Y-%m-%d %H:%M"), rate.rate);
    }
    println!(
        "Current rate: {} (published {})",
        current.rate,
        current.created_at.format("%Y-%m-%d %H:%M")
    );
    Ok(())
}
