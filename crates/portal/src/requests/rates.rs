use std::io::Read;
use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use tracing::info;

use crate::auth::{AuthProvider, Capability, SessionContext};
use crate::error::{PortalError, ValidationError};
use crate::store::RecordStore;

/// One entry of the append-only rate log: local currency units per 1 USD.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExchangeRate {
    pub id: u64,
    pub rate: f64,
    pub created_at: DateTime<Utc>,
}

/// Row handed to the store. `created_at` is only set when importing historic rates.
#[derive(Debug, Clone, PartialEq)]
pub struct NewExchangeRate {
    pub rate: f64,
    pub created_at: Option<DateTime<Utc>>,
}

impl NewExchangeRate {
    pub fn now(rate: f64) -> Result<Self, ValidationError> {
        Ok(Self {
            rate: validate_rate(rate)?,
            created_at: None,
        })
    }
}

pub fn validate_rate(rate: f64) -> Result<f64, ValidationError> {
    if !rate.is_finite() || rate <= 0.0 {
        return Err(ValidationError::new(
            "rate",
            "exchange rate must be a positive number",
        ));
    }
    Ok(rate)
}

pub struct ExchangeRateService<S, A> {
    store: Arc<S>,
    auth: Arc<A>,
}

impl<S, A> ExchangeRateService<S, A>
where
    S: RecordStore + 'static,
    A: AuthProvider + 'static,
{
    pub fn new(store: Arc<S>, auth: Arc<A>) -> Self {
        Self { store, auth }
    }

    /// Append a new current rate. Admin only; earlier rows are never touched.
    pub async fn publish(
        &self,
        session: &SessionContext,
        rate: f64,
    ) -> Result<ExchangeRate, PortalError> {
        let admin = self
            .auth
            .current_principal(session)
            .await?
            .require(Capability::Admin)?;
        let row = NewExchangeRate::now(rate)?;
        let stored = self.store.insert_exchange_rate(row).await?;
        info!(rate = stored.rate, admin = %admin.id, "exchange rate published");
        Ok(stored)
    }

    pub async fn current(&self) -> Result<ExchangeRate, PortalError> {
        self.store
            .latest_exchange_rate()
            .await?
            .ok_or_else(|| PortalError::NotFound {
                entity: "exchange rate",
                id: "current".to_string(),
            })
    }

    /// Most recent first.
    pub async fn history(&self, limit: Option<usize>) -> Result<Vec<ExchangeRate>, PortalError> {
        Ok(self.store.exchange_rate_history(limit).await?)
    }

    /// Append imported rows. Rows without a timestamp are stamped at insertion time and so
    /// become the current rate.
    pub async fn import(
        &self,
        session: &SessionContext,
        mut rows: Vec<NewExchangeRate>,
    ) -> Result<Vec<ExchangeRate>, PortalError> {
        let admin = self
            .auth
            .current_principal(session)
            .await?
            .require(Capability::Admin)?;
        rows.sort_by_key(|row| row.created_at);
        let mut stored = Vec::with_capacity(rows.len());
        for row in rows {
            stored.push(self.store.insert_exchange_rate(row).await?);
        }
        info!(count = stored.len(), admin = %admin.id, "exchange rates imported");
        Ok(stored)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RateImportError {
    #[error("failed to read rate file: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid rate CSV: {0}")]
    Csv(#[from] csv::Error),
    #[error("line {line}: '{value}' is not a positive rate")]
    InvalidRate { line: usize, value: String },
    #[error("line {line}: '{value}' is not an RFC 3339 timestamp or YYYY-MM-DD date")]
    InvalidTimestamp { line: usize, value: String },
    #[error("rate file contains no rows")]
    Empty,
}

/// Reads `rate[,created_at]` CSV exports used to seed the rate log.
pub struct ExchangeRateImporter;

impl ExchangeRateImporter {
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Vec<NewExchangeRate>, RateImportError> {
        let file = std::fs::File::open(path)?;
        Self::from_reader(file)
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<Vec<NewExchangeRate>, RateImportError> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(reader);
        let mut rows = Vec::new();

        for (index, record) in csv_reader.deserialize::<RateRow>().enumerate() {
            let row = record?;
            // header is line 1
            let line = index + 2;
            let rate = row
                .rate
                .parse::<f64>()
                .ok()
                .and_then(|rate| validate_rate(rate).ok())
                .ok_or_else(|| RateImportError::InvalidRate {
                    line,
                    value: row.rate.clone(),
                })?;
            let created_at = match row.created_at.as_deref() {
                Some(raw) => Some(parse_timestamp(raw).ok_or_else(|| {
                    RateImportError::InvalidTimestamp {
                        line,
                        value: raw.to_string(),
                    }
                })?),
                None => None,
            };
            rows.push(NewExchangeRate { rate, created_at });
        }

        if rows.is_empty() {
            return Err(RateImportError::Empty);
        }
        Ok(rows)
    }
}

#[derive(Debug, Deserialize)]
struct RateRow {
    rate: String,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    created_at: Option<String>,
}

fn empty_string_as_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<String>::deserialize(deserializer)?;
    Ok(value.filter(|raw| !raw.trim().is_empty()))
}

fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}
