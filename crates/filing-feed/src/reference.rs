use async_trait::async_trait;
use std::collections::HashMap;
use std::path::Path;

use signal_core::{ReferenceDataSource, SignalError, TickerReference};

/// In-memory reference-data source, optionally loaded from a JSON file
/// holding an array of TickerReference records.
pub struct StaticReferenceSource {
    references: HashMap<String, TickerReference>,
}

impl StaticReferenceSource {
    pub fn new(references: Vec<TickerReference>) -> Self {
        let references = references
            .into_iter()
            .map(|r| (r.ticker.to_uppercase(), r))
            .collect();
        Self { references }
    }

    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self, SignalError> {
        let path = path.as_ref();
        let contents = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| SignalError::Configuration(format!("{}: {e}", path.display())))?;
        let references: Vec<TickerReference> = serde_json::from_str(&contents)
            .map_err(|e| SignalError::Configuration(format!("Malformed reference file: {e}")))?;
        Ok(Self::new(references))
    }
}

#[async_trait]
impl ReferenceDataSource for StaticReferenceSource {
    async fn snapshot(
        &self,
        universe: &[String],
    ) -> Result<HashMap<String, TickerReference>, SignalError> {
        let mut snapshot = HashMap::with_capacity(universe.len());
        for ticker in universe {
            let reference = self.references.get(ticker).ok_or_else(|| {
                SignalError::Configuration(format!("Missing reference data for {ticker}"))
            })?;
            if reference.shares_outstanding == 0 {
                return Err(SignalError::Configuration(format!(
                    "Shares outstanding for {ticker} must be positive"
                )));
            }
            if reference.share_price <= 0.0 {
                return Err(SignalError::Configuration(format!(
                    "Share price for {ticker} must be positive"
                )));
            }
            snapshot.insert(ticker.clone(), reference.clone());
        }
        Ok(snapshot)
    }
}
