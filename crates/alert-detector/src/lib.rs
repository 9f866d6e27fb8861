//! Rolling-window alert detection.
//!
//! Per ticker, a two-state machine: QUIET until the trailing-window event
//! count reaches the threshold, ALERTED while it holds. The active alert
//! row is the ALERTED state; clearing it (window decay or external
//! acknowledgment) returns the ticker to QUIET. A later qualifying window
//! supersedes the previous record rather than stacking a second one.

use chrono::{DateTime, Duration, Utc};
use sqlx::sqlite::SqliteConnection;
use sqlx::{FromRow, SqlitePool};

use event_store::EventStore;
use signal_core::{AlertRecord, SignalError};

#[derive(Debug, FromRow)]
struct AlertRow {
    ticker: String,
    window_start: i64,
    window_end: i64,
    event_count: i64,
    triggered_at: i64,
}

impl AlertRow {
    fn into_record(self) -> AlertRecord {
        AlertRecord {
            ticker: self.ticker,
            window_start: ts(self.window_start),
            window_end: ts(self.window_end),
            event_count: self.event_count as u32,
            triggered_at: ts(self.triggered_at),
        }
    }
}

fn ts(secs: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(secs, 0).unwrap_or(DateTime::UNIX_EPOCH)
}

/// Outcome of one detector pass
#[derive(Debug, Default)]
pub struct AlertOutcome {
    /// Newly raised or superseded alerts from this pass
    pub raised: Vec<AlertRecord>,
    /// Tickers whose window count dropped back below the threshold
    pub cleared: Vec<String>,
    /// All currently active alerts after the pass
    pub active: Vec<AlertRecord>,
}

pub struct AlertDetector {
    pool: SqlitePool,
    threshold: u32,
    window: Duration,
}

impl AlertDetector {
    pub fn new(pool: SqlitePool, threshold: u32, window_days: i64) -> Self {
        Self {
            pool,
            threshold,
            window: Duration::days(window_days),
        }
    }

    pub async fn init_tables(&self) -> Result<(), SignalError> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS active_alerts (
                ticker TEXT PRIMARY KEY,
                window_start INTEGER NOT NULL,
                window_end INTEGER NOT NULL,
                event_count INTEGER NOT NULL,
                triggered_at INTEGER NOT NULL
            )",
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Evaluate every ticker with stored activity against the trailing
    /// window ending at `as_of`. Reads events, never mutates them.
    pub async fn evaluate(
        &self,
        store: &EventStore,
        conn: &mut SqliteConnection,
        as_of: DateTime<Utc>,
    ) -> Result<AlertOutcome, SignalError> {
        let window_start = as_of - self.window;
        let activity = store.ticker_activity(conn, window_start).await?;

        let mut outcome = AlertOutcome::default();
        let mut qualifying: Vec<&str> = Vec::new();

        for (ticker, count) in &activity {
            if *count < self.threshold {
                continue;
            }
            qualifying.push(ticker.as_str());

            let existing = self.load_alert(conn, ticker).await?;
            // Re-entrant trigger: same window already alerted, no new record
            let same_window = existing
                .as_ref()
                .is_some_and(|prior| prior.window_end == as_of.timestamp());
            if same_window {
                continue;
            }

            let superseded = existing.is_some();
            let record = AlertRecord {
                ticker: ticker.clone(),
                window_start,
                window_end: as_of,
                event_count: *count,
                triggered_at: as_of,
            };
            self.upsert_alert(conn, &record).await?;
            tracing::info!(
                ticker = %ticker,
                event_count = count,
                superseded,
                "Alert raised for trailing window"
            );
            outcome.raised.push(record);
        }

        // ALERTED -> QUIET for anything no longer qualifying
        let active = self.load_all(conn).await?;
        for alert in active {
            if !qualifying.iter().any(|t| *t == alert.ticker) {
                self.delete_alert(conn, &alert.ticker).await?;
                tracing::info!(ticker = %alert.ticker, "Alert cleared, window decayed");
                outcome.cleared.push(alert.ticker);
            }
        }

        outcome.active = self.load_all(conn).await?.into_iter().map(AlertRow::into_record).collect();
        Ok(outcome)
    }

    /// External acknowledgment: clear the active alert for a ticker.
    pub async fn acknowledge(&self, ticker: &str) -> Result<bool, SignalError> {
        let result = sqlx::query("DELETE FROM active_alerts WHERE ticker = ?")
            .bind(ticker)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// All currently active alerts.
    pub async fn active_alerts(&self) -> Result<Vec<AlertRecord>, SignalError> {
        let mut conn = self.pool.acquire().await?;
        let rows = self.load_all(&mut conn).await?;
        Ok(rows.into_iter().map(AlertRow::into_record).collect())
    }

    async fn load_alert(
        &self,
        conn: &mut SqliteConnection,
        ticker: &str,
    ) -> Result<Option<AlertRow>, SignalError> {
        let row = sqlx::query_as(
            "SELECT ticker, window_start, window_end, event_count, triggered_at
             FROM active_alerts WHERE ticker = ?",
        )
        .bind(ticker)
        .fetch_optional(conn)
        .await?;
        Ok(row)
    }

    async fn load_all(&self, conn: &mut SqliteConnection) -> Result<Vec<AlertRow>, SignalError> {
        let rows = sqlx::query_as(
            "SELECT ticker, window_start, window_end, event_count, triggered_at
             FROM active_alerts ORDER BY ticker ASC",
        )
        .fetch_all(conn)
        .await?;
        Ok(rows)
    }

    async fn upsert_alert(
        &self,
        conn: &mut SqliteConnection,
        record: &AlertRecord,
    ) -> Result<(), SignalError> {
        sqlx::query(
            "INSERT INTO active_alerts (ticker, window_start, window_end, event_count, triggered_at)
             VALUES (?, ?, ?, ?, ?)
             ON CONFLICT(ticker) DO UPDATE SET
                window_start = excluded.window_start,
                window_end = excluded.window_end,
                event_count = excluded.event_count,
                triggered_at = excluded.triggered_at",
        )
        .bind(&record.ticker)
        .bind(record.window_start.timestamp())
        .bind(record.window_end.timestamp())
        .bind(record.event_count as i64)
        .bind(record.triggered_at.timestamp())
        .execute(conn)
        .await?;
        Ok(())
    }

    async fn delete_alert(
        &self,
        conn: &mut SqliteConnection,
        ticker: &str,
    ) -> Result<(), SignalError> {
        sqlx::query("DELETE FROM active_alerts WHERE ticker = ?")
            .bind(ticker)
            .execute(conn)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use signal_core::{InsiderRole, TransactionEvent, TransactionType};

    async fn setup() -> (EventStore, AlertDetector) {
        // Single connection so the in-memory database is shared
        let pool = sqlx::sqlite::SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        let store = EventStore::new(pool.clone());
        store.init_tables().await.unwrap();
        let detector = AlertDetector::new(pool, 3, 90);
        detector.init_tables().await.unwrap();
        (store, detector)
    }

    fn day(d: u32) -> DateTime<Utc> {
        // "day N" of a 90-day scenario starting 2025-03-01
        Utc.with_ymd_and_hms(2025, 3, 1, 0, 0, 0).unwrap() + Duration::days(d as i64 - 1)
    }

    fn event(insider: &str, tt: TransactionType, role: InsiderRole, value: f64, d: u32) -> TransactionEvent {
        TransactionEvent::new("TSLA", insider, role, tt, value, day(d))
    }

    async fn ingest(store: &EventStore, events: &[TransactionEvent]) {
        let mut conn = store.pool().acquire().await.unwrap();
        store.ingest(&mut conn, events).await.unwrap();
    }

    #[tokio::test]
    async fn three_events_in_window_fire_alert() {
        let (store, detector) = setup().await;
        // CEO buy day 1, CFO buy day 40, Director sell day 70, checked at day 90
        let events = vec![
            event("CEO A", TransactionType::Buy, InsiderRole::Ceo, 2_000_000.0, 1),
            event("CFO B", TransactionType::Buy, InsiderRole::Cfo, 1_500_000.0, 40),
            event("Dir C", TransactionType::Sell, InsiderRole::Director, 3_000_000.0, 70),
        ];
        ingest(&store, &events).await;

        let as_of = day(90);
        let mut conn = store.pool().acquire().await.unwrap();
        let outcome = detector.evaluate(&store, &mut conn, as_of).await.unwrap();

        assert_eq!(outcome.raised.len(), 1);
        let alert = &outcome.raised[0];
        assert_eq!(alert.ticker, "TSLA");
        assert_eq!(alert.event_count, 3);
        assert_eq!(alert.window_end, as_of);
        assert_eq!(alert.window_start, as_of - Duration::days(90));
    }

    #[tokio::test]
    async fn two_events_never_alert() {
        let (store, detector) = setup().await;
        let events = vec![
            event("CEO A", TransactionType::Buy, InsiderRole::Ceo, 2_000_000.0, 1),
            event("CFO B", TransactionType::Buy, InsiderRole::Cfo, 1_500_000.0, 40),
        ];
        ingest(&store, &events).await;

        let mut conn = store.pool().acquire().await.unwrap();
        let outcome = detector.evaluate(&store, &mut conn, day(90)).await.unwrap();
        assert!(outcome.raised.is_empty());
        assert!(outcome.active.is_empty());
    }

    #[tokio::test]
    async fn consecutive_runs_keep_one_active_record() {
        let (store, detector) = setup().await;
        let events = vec![
            event("A", TransactionType::Buy, InsiderRole::Ceo, 1e6, 10),
            event("B", TransactionType::Buy, InsiderRole::Cfo, 1e6, 20),
            event("C", TransactionType::Sell, InsiderRole::Director, 1e6, 30),
        ];
        ingest(&store, &events).await;

        let mut conn = store.pool().acquire().await.unwrap();
        let first = detector.evaluate(&store, &mut conn, day(60)).await.unwrap();
        assert_eq!(first.raised.len(), 1);

        // Next day, still qualifying: superseded, still exactly one active record
        let second = detector.evaluate(&store, &mut conn, day(61)).await.unwrap();
        assert_eq!(second.raised.len(), 1);
        assert_eq!(second.active.len(), 1);
        assert_eq!(second.active[0].window_end, day(61));
    }

    #[tokio::test]
    async fn same_window_does_not_duplicate() {
        let (store, detector) = setup().await;
        let events = vec![
            event("A", TransactionType::Buy, InsiderRole::Ceo, 1e6, 10),
            event("B", TransactionType::Buy, InsiderRole::Cfo, 1e6, 20),
            event("C", TransactionType::Sell, InsiderRole::Director, 1e6, 30),
        ];
        ingest(&store, &events).await;

        let as_of = day(60);
        let mut conn = store.pool().acquire().await.unwrap();
        let first = detector.evaluate(&store, &mut conn, as_of).await.unwrap();
        assert_eq!(first.raised.len(), 1);

        // Re-running the same as-of window raises nothing new
        let rerun = detector.evaluate(&store, &mut conn, as_of).await.unwrap();
        assert!(rerun.raised.is_empty());
        assert_eq!(rerun.active.len(), 1);
    }

    #[tokio::test]
    async fn alert_clears_when_window_decays() {
        let (store, detector) = setup().await;
        let events = vec![
            event("A", TransactionType::Buy, InsiderRole::Ceo, 1e6, 1),
            event("B", TransactionType::Buy, InsiderRole::Cfo, 1e6, 5),
            event("C", TransactionType::Sell, InsiderRole::Director, 1e6, 10),
        ];
        ingest(&store, &events).await;

        let mut conn = store.pool().acquire().await.unwrap();
        let armed = detector.evaluate(&store, &mut conn, day(30)).await.unwrap();
        assert_eq!(armed.active.len(), 1);

        // 120 days later the events have left the trailing window
        let decayed = detector.evaluate(&store, &mut conn, day(150)).await.unwrap();
        assert_eq!(decayed.cleared, vec!["TSLA".to_string()]);
        assert!(decayed.active.is_empty());
    }

    #[tokio::test]
    async fn acknowledge_clears_active_alert() {
        let (store, detector) = setup().await;
        let events = vec![
            event("A", TransactionType::Buy, InsiderRole::Ceo, 1e6, 1),
            event("B", TransactionType::Buy, InsiderRole::Cfo, 1e6, 5),
            event("C", TransactionType::Sell, InsiderRole::Director, 1e6, 10),
        ];
        ingest(&store, &events).await;

        let mut conn = store.pool().acquire().await.unwrap();
        detector.evaluate(&store, &mut conn, day(30)).await.unwrap();
        drop(conn);

        assert!(detector.acknowledge("TSLA").await.unwrap());
        assert!(detector.active_alerts().await.unwrap().is_empty());
        // Acknowledging again is a no-op
        assert!(!detector.acknowledge("TSLA").await.unwrap());
    }
}
