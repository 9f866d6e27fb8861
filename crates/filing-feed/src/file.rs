use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use signal_core::{FilingFeed, InsiderRole, SignalError, TransactionEvent, TransactionType};

/// One raw filing record as it appears in a feed file. Free-text role
/// and transaction type are normalized during mapping.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawFiling {
    pub ticker: String,
    #[serde(rename = "insiderName")]
    pub insider_name: String,
    #[serde(default)]
    pub role: String,
    #[serde(rename = "transactionType")]
    pub transaction_type: String,
    pub value: f64,
    /// YYYY-MM-DD
    pub date: String,
}

/// JSON file feed: the simulation-data seam made explicit. Points at a
/// file holding an array of RawFiling records.
pub struct FileFeed {
    path: PathBuf,
}

impl FileFeed {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

fn map_filing(raw: &RawFiling) -> Option<TransactionEvent> {
    let transaction_type = match raw.transaction_type.to_uppercase().as_str() {
        "BUY" | "P" => TransactionType::Buy,
        "SELL" | "S" => TransactionType::Sell,
        other => {
            tracing::warn!(ticker = %raw.ticker, transaction_type = other, "Skipping unknown transaction type");
            return None;
        }
    };

    let Ok(date) = NaiveDate::parse_from_str(&raw.date, "%Y-%m-%d") else {
        tracing::warn!(ticker = %raw.ticker, date = %raw.date, "Skipping filing with unparseable date");
        return None;
    };
    let timestamp = date.and_hms_opt(0, 0, 0)?.and_utc();

    Some(TransactionEvent::new(
        &raw.ticker,
        &raw.insider_name,
        InsiderRole::from_title(&raw.role),
        transaction_type,
        raw.value,
        timestamp,
    ))
}

#[async_trait]
impl FilingFeed for FileFeed {
    async fn fetch(
        &self,
        universe: &[String],
        since: DateTime<Utc>,
    ) -> Result<Vec<TransactionEvent>, SignalError> {
        let contents = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|e| SignalError::FeedUnavailable(format!("{}: {e}", self.path.display())))?;

        let raw: Vec<RawFiling> = serde_json::from_str(&contents)
            .map_err(|e| SignalError::FeedUnavailable(format!("Malformed feed file: {e}")))?;

        let events: Vec<TransactionEvent> = raw
            .iter()
            .filter_map(map_filing)
            .filter(|e| universe.contains(&e.ticker) && e.timestamp >= since)
            .collect();

        tracing::debug!(path = %self.path.display(), count = events.len(), "Loaded file feed");
        Ok(events)
    }

    fn name(&self) -> &str {
        "file"
    }
}
