//! Durable, deduplicated storage for insider transaction events.
//!
//! The store exclusively owns event identity: re-ingesting an event whose
//! id already exists is a counted no-op, never an error. Write paths take
//! a `&mut SqliteConnection` so the run coordinator can wrap a whole run
//! in a single transaction.

use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteConnection;
use sqlx::{FromRow, SqlitePool};

use signal_core::{
    IngestReport, InsiderRole, RejectedEvent, SignalError, TransactionEvent, TransactionType,
};

#[derive(Debug, FromRow)]
struct EventRow {
    id: String,
    ticker: String,
    insider_name: String,
    insider_role: String,
    transaction_type: String,
    value: f64,
    ts: i64,
}

impl EventRow {
    fn into_event(self) -> TransactionEvent {
        TransactionEvent {
            id: self.id,
            ticker: self.ticker,
            insider_name: self.insider_name,
            insider_role: InsiderRole::from_str_stored(&self.insider_role),
            transaction_type: TransactionType::from_str_stored(&self.transaction_type),
            value: self.value,
            timestamp: DateTime::from_timestamp(self.ts, 0).unwrap_or(DateTime::UNIX_EPOCH),
        }
    }
}

/// SQLite-backed event store
pub struct EventStore {
    pool: SqlitePool,
}

impl EventStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Initialize the events table (idempotent).
    pub async fn init_tables(&self) -> Result<(), SignalError> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS insider_events (
                id TEXT PRIMARY KEY,
                ticker TEXT NOT NULL,
                insider_name TEXT NOT NULL,
                insider_role TEXT NOT NULL,
                transaction_type TEXT NOT NULL,
                value REAL NOT NULL,
                ts INTEGER NOT NULL
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_events_ticker_ts ON insider_events(ticker, ts)",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Ingest a batch of events with partial-success semantics: malformed
    /// events are skipped and reported, known ids count as duplicates.
    pub async fn ingest(
        &self,
        conn: &mut SqliteConnection,
        events: &[TransactionEvent],
    ) -> Result<IngestReport, SignalError> {
        let mut report = IngestReport::default();

        for event in events {
            if let Err(SignalError::Validation { field, reason }) = validate(event) {
                tracing::warn!(
                    ticker = %event.ticker,
                    field = %field,
                    "Rejecting malformed event: {reason}"
                );
                report.rejected.push(RejectedEvent {
                    ticker: event.ticker.clone(),
                    insider_name: event.insider_name.clone(),
                    field,
                    reason,
                });
                continue;
            }

            // Constructors normalize, but events can be built field-by-field;
            // the store is the last line of defense for ticker shape
            let ticker = event.ticker.trim().to_uppercase();
            let result = sqlx::query(
                "INSERT OR IGNORE INTO insider_events
                 (id, ticker, insider_name, insider_role, transaction_type, value, ts)
                 VALUES (?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(&event.id)
            .bind(&ticker)
            .bind(&event.insider_name)
            .bind(event.insider_role.as_str())
            .bind(event.transaction_type.as_str())
            .bind(event.value)
            .bind(event.timestamp.timestamp())
            .execute(&mut *conn)
            .await?;

            if result.rows_affected() == 0 {
                report.duplicates += 1;
            } else {
                report.inserted += 1;
            }
        }

        tracing::debug!(
            inserted = report.inserted,
            duplicates = report.duplicates,
            rejected = report.rejected.len(),
            "Ingest batch complete"
        );
        Ok(report)
    }

    /// Events for one ticker since `since`, ascending by timestamp with
    /// insertion order as the tie-break.
    pub async fn query(
        &self,
        conn: &mut SqliteConnection,
        ticker: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<TransactionEvent>, SignalError> {
        let rows: Vec<EventRow> = sqlx::query_as(
            "SELECT id, ticker, insider_name, insider_role, transaction_type, value, ts
             FROM insider_events
             WHERE ticker = ? AND ts >= ?
             ORDER BY ts ASC, rowid ASC",
        )
        .bind(ticker)
        .bind(since.timestamp())
        .fetch_all(conn)
        .await?;

        Ok(rows.into_iter().map(EventRow::into_event).collect())
    }

    /// Per-ticker event counts since `since`, for every ticker with any
    /// stored activity in the window.
    pub async fn ticker_activity(
        &self,
        conn: &mut SqliteConnection,
        since: DateTime<Utc>,
    ) -> Result<Vec<(String, u32)>, SignalError> {
        let rows: Vec<(String, i64)> = sqlx::query_as(
            "SELECT ticker, COUNT(*) FROM insider_events
             WHERE ts >= ?
             GROUP BY ticker
             ORDER BY ticker ASC",
        )
        .bind(since.timestamp())
        .fetch_all(conn)
        .await?;

        Ok(rows.into_iter().map(|(t, c)| (t, c as u32)).collect())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn validate(event: &TransactionEvent) -> Result<(), SignalError> {
    if event.ticker.trim().is_empty() {
        return Err(SignalError::validation("ticker", "must be non-empty"));
    }
    if event.insider_name.trim().is_empty() {
        return Err(SignalError::validation("insiderName", "must be non-empty"));
    }
    if !event.value.is_finite() {
        return Err(SignalError::validation("value", "must be a finite amount"));
    }
    if event.value < 0.0 {
        return Err(SignalError::validation("value", "must be non-negative"));
    }
    Ok(())
}
