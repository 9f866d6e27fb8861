//! Ranks the watch universe by insider-activity score.
//!
//! Calls the scoring engine once per ticker against a single reference
//! snapshot, sorts descending by score with ticker order as the
//! deterministic tie-break, and persists the result set wholesale.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use sqlx::sqlite::SqliteConnection;
use sqlx::SqlitePool;

use event_store::EventStore;
use scoring_engine::ScoringEngine;
use signal_core::{ScoreResult, SignalError, TickerReference};

pub struct RecommendationRanker {
    pool: SqlitePool,
    engine: ScoringEngine,
    /// Evaluation window for scoring, same trailing lookback as alerting
    window: Duration,
}

impl RecommendationRanker {
    pub fn new(pool: SqlitePool, engine: ScoringEngine, window_days: i64) -> Self {
        Self {
            pool,
            engine,
            window: Duration::days(window_days),
        }
    }

    pub async fn init_tables(&self) -> Result<(), SignalError> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS score_results (
                ticker TEXT PRIMARY KEY,
                score REAL NOT NULL,
                breakdown TEXT NOT NULL,
                as_of INTEGER NOT NULL
            )",
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Score every ticker in the universe with a consistent reference
    /// snapshot. A ticker missing reference data is a configuration
    /// error and fails the whole run.
    pub async fn rank(
        &self,
        store: &EventStore,
        conn: &mut SqliteConnection,
        universe: &[String],
        references: &HashMap<String, TickerReference>,
        as_of: DateTime<Utc>,
    ) -> Result<Vec<ScoreResult>, SignalError> {
        let since = as_of - self.window;
        let mut results = Vec::with_capacity(universe.len());

        for ticker in universe {
            let reference = references.get(ticker).ok_or_else(|| {
                SignalError::Configuration(format!("Missing reference data for {ticker}"))
            })?;
            let events = store.query(conn, ticker, since).await?;
            results.push(self.engine.score(ticker, &events, reference));
        }

        // Descending by score, ticker lexical order on ties
        results.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.ticker.cmp(&b.ticker))
        });

        tracing::debug!(universe = universe.len(), "Ranking pass complete");
        Ok(results)
    }

    /// Replace the published result set wholesale. Runs on the caller's
    /// connection so it commits (or rolls back) with the rest of the run.
    pub async fn persist(
        &self,
        conn: &mut SqliteConnection,
        results: &[ScoreResult],
        as_of: DateTime<Utc>,
    ) -> Result<(), SignalError> {
        sqlx::query("DELETE FROM score_results")
            .execute(&mut *conn)
            .await?;

        for result in results {
            let breakdown = serde_json::to_string(&result.breakdown)
                .map_err(|e| SignalError::Configuration(format!("Breakdown encoding: {e}")))?;
            sqlx::query(
                "INSERT INTO score_results (ticker, score, breakdown, as_of) VALUES (?, ?, ?, ?)",
            )
            .bind(&result.ticker)
            .bind(result.score)
            .bind(breakdown)
            .bind(as_of.timestamp())
            .execute(&mut *conn)
            .await?;
        }
        Ok(())
    }

    /// Last published ranking, descending.
    pub async fn published(&self) -> Result<Vec<ScoreResult>, SignalError> {
        let rows: Vec<(String, f64, String)> = sqlx::query_as(
            "SELECT ticker, score, breakdown FROM score_results ORDER BY score DESC, ticker ASC",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut results = Vec::with_capacity(rows.len());
        for (ticker, score, breakdown) in rows {
            // A breakdown that no longer decodes means the audit trail is
            // gone; that must not pass silently as an empty one
            let breakdown = serde_json::from_str(&breakdown).map_err(|e| {
                SignalError::Configuration(format!("Corrupt score breakdown for {ticker}: {e}"))
            })?;
            results.push(ScoreResult {
                ticker,
                score,
                breakdown,
            });
        }
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use signal_core::{
        FactorWeights, InsiderRole, RoleWeightTable, TransactionEvent, TransactionType,
    };

    async fn setup() -> (EventStore, RecommendationRanker) {
        // Single connection so the in-memory database is shared
        let pool = sqlx::sqlite::SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        let store = EventStore::new(pool.clone());
        store.init_tables().await.unwrap();
        let engine =
            ScoringEngine::new(FactorWeights::default(), RoleWeightTable::default(), 1e7).unwrap();
        let ranker = RecommendationRanker::new(pool, engine, 90);
        ranker.init_tables().await.unwrap();
        (store, ranker)
    }

    fn reference(ticker: &str) -> TickerReference {
        TickerReference {
            ticker: ticker.to_string(),
            shares_outstanding: 1_000_000_000,
            share_price: 100.0,
            sector: None,
        }
    }

    fn references(tickers: &[&str]) -> HashMap<String, TickerReference> {
        tickers
            .iter()
            .map(|t| (t.to_string(), reference(t)))
            .collect()
    }

    fn event(ticker: &str, insider: &str, value: f64, day: u32) -> TransactionEvent {
        TransactionEvent::new(
            ticker,
            insider,
            InsiderRole::Ceo,
            TransactionType::Buy,
            value,
            Utc.with_ymd_and_hms(2025, 6, day, 0, 0, 0).unwrap(),
        )
    }

    fn universe(tickers: &[&str]) -> Vec<String> {
        tickers.iter().map(|t| t.to_string()).collect()
    }

    #[tokio::test]
    async fn ranks_active_tickers_above_quiet_ones() {
        let (store, ranker) = setup().await;
        let mut conn = store.pool().acquire().await.unwrap();
        store
            .ingest(
                &mut conn,
                &[
                    event("TSLA", "A", 5_000_000.0, 1),
                    event("TSLA", "B", 2_000_000.0, 5),
                    event("PLTR", "C", 50_000.0, 3),
                ],
            )
            .await
            .unwrap();

        let as_of = Utc.with_ymd_and_hms(2025, 6, 30, 0, 0, 0).unwrap();
        let results = ranker
            .rank(
                &store,
                &mut conn,
                &universe(&["PLTR", "TSLA", "IONQ"]),
                &references(&["PLTR", "TSLA", "IONQ"]),
                as_of,
            )
            .await
            .unwrap();

        assert_eq!(results.len(), 3);
        assert_eq!(results[0].ticker, "TSLA");
        assert_eq!(results[1].ticker, "PLTR");
        // Quiet ticker still appears, scored exactly zero
        assert_eq!(results[2].ticker, "IONQ");
        assert_eq!(results[2].score, 0.0);
    }

    #[tokio::test]
    async fn ties_break_by_ticker_order() {
        let (store, ranker) = setup().await;
        let mut conn = store.pool().acquire().await.unwrap();
        // No events at all: every ticker scores 0.0
        let as_of = Utc.with_ymd_and_hms(2025, 6, 30, 0, 0, 0).unwrap();
        let results = ranker
            .rank(
                &store,
                &mut conn,
                &universe(&["MSTR", "LLY", "RGTI"]),
                &references(&["MSTR", "LLY", "RGTI"]),
                as_of,
            )
            .await
            .unwrap();
        let tickers: Vec<&str> = results.iter().map(|r| r.ticker.as_str()).collect();
        assert_eq!(tickers, vec!["LLY", "MSTR", "RGTI"]);
    }

    #[tokio::test]
    async fn rank_is_deterministic() {
        let (store, ranker) = setup().await;
        let mut conn = store.pool().acquire().await.unwrap();
        store
            .ingest(
                &mut conn,
                &[
                    event("TSLA", "A", 2_000_000.0, 1),
                    event("PLTR", "B", 1_500_000.0, 2),
                ],
            )
            .await
            .unwrap();

        let as_of = Utc.with_ymd_and_hms(2025, 6, 30, 0, 0, 0).unwrap();
        let refs = references(&["PLTR", "TSLA"]);
        let uni = universe(&["PLTR", "TSLA"]);
        let first = ranker.rank(&store, &mut conn, &uni, &refs, as_of).await.unwrap();
        let second = ranker.rank(&store, &mut conn, &uni, &refs, as_of).await.unwrap();

        assert_eq!(first.len(), second.len());
        for (a, b) in first.iter().zip(second.iter()) {
            assert_eq!(a.ticker, b.ticker);
            assert_eq!(a.score.to_bits(), b.score.to_bits());
        }
    }

    #[tokio::test]
    async fn missing_reference_is_fatal() {
        let (store, ranker) = setup().await;
        let mut conn = store.pool().acquire().await.unwrap();
        let as_of = Utc.with_ymd_and_hms(2025, 6, 30, 0, 0, 0).unwrap();
        let result = ranker
            .rank(
                &store,
                &mut conn,
                &universe(&["TSLA"]),
                &HashMap::new(),
                as_of,
            )
            .await;
        assert!(matches!(result, Err(SignalError::Configuration(_))));
    }

    #[tokio::test]
    async fn persist_replaces_wholesale() {
        let (store, ranker) = setup().await;
        let mut conn = store.pool().acquire().await.unwrap();
        store
            .ingest(&mut conn, &[event("TSLA", "A", 2_000_000.0, 1)])
            .await
            .unwrap();

        let as_of = Utc.with_ymd_and_hms(2025, 6, 30, 0, 0, 0).unwrap();
        let refs = references(&["PLTR", "TSLA"]);
        let first = ranker
            .rank(&store, &mut conn, &universe(&["PLTR", "TSLA"]), &refs, as_of)
            .await
            .unwrap();
        ranker.persist(&mut conn, &first, as_of).await.unwrap();

        // Second run over a smaller universe fully replaces the set
        let second = ranker
            .rank(&store, &mut conn, &universe(&["TSLA"]), &refs, as_of)
            .await
            .unwrap();
        ranker.persist(&mut conn, &second, as_of).await.unwrap();
        drop(conn);

        let published = ranker.published().await.unwrap();
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].ticker, "TSLA");
        assert!(!published[0].breakdown.is_empty());
    }

    #[tokio::test]
    async fn published_surfaces_corrupt_breakdown() {
        let (store, ranker) = setup().await;
        sqlx::query("INSERT INTO score_results (ticker, score, breakdown, as_of) VALUES (?, ?, ?, ?)")
            .bind("TSLA")
            .bind(42.0)
            .bind("not json")
            .bind(0i64)
            .execute(store.pool())
            .await
            .unwrap();

        let result = ranker.published().await;
        assert!(matches!(result, Err(SignalError::Configuration(_))));
    }
}
