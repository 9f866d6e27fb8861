use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;

use signal_core::{FilingFeed, InsiderRole, SignalError, TransactionEvent, TransactionType};

const BASE_URL: &str = "https://finnhub.io/api/v1";

/// One transaction from the Finnhub insider-transactions endpoint
#[derive(Debug, Deserialize)]
struct FinnhubTransaction {
    name: String,
    #[serde(default)]
    change: f64,
    #[serde(rename = "transactionDate")]
    transaction_date: String,
    #[serde(rename = "transactionCode", default)]
    transaction_code: String,
    #[serde(rename = "transactionPrice", default)]
    transaction_price: f64,
}

#[derive(Debug, Deserialize)]
struct FinnhubResponse {
    #[serde(default)]
    data: Vec<FinnhubTransaction>,
}

/// Finnhub insider-transactions feed.
/// The payload carries no insider title, so roles map to `Other`.
pub struct FinnhubFeed {
    api_key: String,
    client: Client,
    base_url: String,
    /// Pause before the single retry after a 429
    backoff: Duration,
}

impl FinnhubFeed {
    pub fn new(api_key: String) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_else(|_| Client::new());
        Self {
            api_key,
            client,
            base_url: BASE_URL.to_string(),
            backoff: Duration::from_secs(5),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    async fn fetch_symbol(
        &self,
        symbol: &str,
        since: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<Vec<TransactionEvent>, SignalError> {
        let url = format!("{}/stock/insider-transactions", self.base_url);
        let params = [
            ("symbol", symbol.to_string()),
            ("from", since.format("%Y-%m-%d").to_string()),
            ("to", until.format("%Y-%m-%d").to_string()),
            ("token", self.api_key.clone()),
        ];

        let mut response = self
            .client
            .get(&url)
            .query(&params)
            .send()
            .await
            .map_err(|e| SignalError::FeedUnavailable(e.to_string()))?;

        // Free tier is 60 calls/min; back off once on 429
        if response.status().as_u16() == 429 {
            tracing::warn!(symbol, "Finnhub rate limited, backing off");
            tokio::time::sleep(self.backoff).await;
            response = self
                .client
                .get(&url)
                .query(&params)
                .send()
                .await
                .map_err(|e| SignalError::FeedUnavailable(e.to_string()))?;
        }

        if !response.status().is_success() {
            return Err(SignalError::FeedUnavailable(format!(
                "Finnhub returned {} for {symbol}",
                response.status()
            )));
        }

        let body: FinnhubResponse = response
            .json()
            .await
            .map_err(|e| SignalError::FeedUnavailable(e.to_string()))?;

        Ok(body
            .data
            .iter()
            .filter_map(|t| map_transaction(symbol, t))
            .collect())
    }
}

/// Map one Finnhub record to a TransactionEvent. Codes other than
/// P (purchase) and S (sale) are skipped, as are unparseable dates.
fn map_transaction(symbol: &str, t: &FinnhubTransaction) -> Option<TransactionEvent> {
    let transaction_type = match t.transaction_code.as_str() {
        "P" => TransactionType::Buy,
        "S" => TransactionType::Sell,
        _ => return None,
    };

    let date = NaiveDate::parse_from_str(&t.transaction_date, "%Y-%m-%d").ok()?;
    let timestamp = date.and_hms_opt(0, 0, 0)?.and_utc();
    let value = t.change.abs() * t.transaction_price;

    Some(TransactionEvent::new(
        symbol,
        &t.name,
        InsiderRole::Other,
        transaction_type,
        value,
        timestamp,
    ))
}

#[async_trait]
impl FilingFeed for FinnhubFeed {
    async fn fetch(
        &self,
        universe: &[String],
        since: DateTime<Utc>,
    ) -> Result<Vec<TransactionEvent>, SignalError> {
        let until = Utc::now();
        let mut events = Vec::new();
        for symbol in universe {
            let batch = self.fetch_symbol(symbol, since, until).await?;
            tracing::debug!(symbol = %symbol, count = batch.len(), "Fetched Finnhub transactions");
            events.extend(batch);
            // Stay under the free-tier 60 calls/min
            tokio::time::sleep(Duration::from_millis(1100)).await;
        }
        Ok(events)
    }

    fn name(&self) -> &str {
        "finnhub"
    }
}
