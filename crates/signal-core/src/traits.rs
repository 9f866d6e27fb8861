use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;

use crate::{AlertRecord, SignalError, TickerReference, TransactionEvent};

/// External filing feed supplying raw transaction records.
/// Implementations map feed-specific payloads into TransactionEvents;
/// the event store still validates everything on ingestion.
#[async_trait]
pub trait FilingFeed: Send + Sync {
    async fn fetch(
        &self,
        universe: &[String],
        since: DateTime<Utc>,
    ) -> Result<Vec<TransactionEvent>, SignalError>;

    fn name(&self) -> &str;
}

/// Read-only reference data collaborator. One snapshot is taken per run
/// so every ticker is scored against consistent data.
#[async_trait]
pub trait ReferenceDataSource: Send + Sync {
    async fn snapshot(
        &self,
        universe: &[String],
    ) -> Result<HashMap<String, TickerReference>, SignalError>;
}

/// Sink receiving raised alerts after a run commits. Delivery and
/// display are out of scope for the engine.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn notify(&self, alerts: &[AlertRecord]) -> Result<(), SignalError>;
}
