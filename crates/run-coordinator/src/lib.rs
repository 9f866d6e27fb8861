//! Run orchestration.
//!
//! One run is a single atomic cycle: pull the feed, ingest, evaluate
//! alerts, rank the universe, publish. Everything after the feed pull
//! happens inside one SQLite transaction, so observers only ever see a
//! fully published run or the previous one. Runs never interleave; a
//! second run requested mid-flight is rejected immediately.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use sqlx::SqlitePool;
use tokio::sync::Mutex;

use alert_detector::AlertDetector;
use event_store::EventStore;
use recommendation_ranker::RecommendationRanker;
use scoring_engine::ScoringEngine;
use signal_core::{
    AlertRecord, EngineConfig, FilingFeed, NotificationSink, ReferenceDataSource, RunSummary,
    SignalError,
};

/// Notification sink that just logs raised alerts. Delivery mechanics
/// live outside the engine.
pub struct LogSink;

#[async_trait::async_trait]
impl NotificationSink for LogSink {
    async fn notify(&self, alerts: &[AlertRecord]) -> Result<(), SignalError> {
        for alert in alerts {
            tracing::info!(
                ticker = %alert.ticker,
                event_count = alert.event_count,
                window_end = %alert.window_end,
                "ALERT: unusual insider activity"
            );
        }
        Ok(())
    }
}

pub struct RunCoordinator {
    pool: SqlitePool,
    config: EngineConfig,
    store: EventStore,
    detector: AlertDetector,
    ranker: RecommendationRanker,
    feed: Arc<dyn FilingFeed>,
    references: Arc<dyn ReferenceDataSource>,
    sink: Arc<dyn NotificationSink>,
    run_lock: Mutex<()>,
}

impl RunCoordinator {
    pub fn new(
        pool: SqlitePool,
        config: EngineConfig,
        feed: Arc<dyn FilingFeed>,
        references: Arc<dyn ReferenceDataSource>,
        sink: Arc<dyn NotificationSink>,
    ) -> Result<Self, SignalError> {
        config.validate()?;
        let engine = ScoringEngine::new(
            config.factor_weights,
            config.role_weights.clone(),
            config.value_ceiling,
        )?;

        Ok(Self {
            store: EventStore::new(pool.clone()),
            detector: AlertDetector::new(
                pool.clone(),
                config.alert_threshold,
                config.alert_window_days,
            ),
            ranker: RecommendationRanker::new(pool.clone(), engine, config.alert_window_days),
            pool,
            config,
            feed,
            references,
            sink,
            run_lock: Mutex::new(()),
        })
    }

    /// Create all tables owned by the engine components (idempotent).
    pub async fn init_tables(&self) -> Result<(), SignalError> {
        self.store.init_tables().await?;
        self.detector.init_tables().await?;
        self.ranker.init_tables().await?;
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS runs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                as_of INTEGER NOT NULL,
                inserted INTEGER NOT NULL,
                duplicates INTEGER NOT NULL,
                rejected INTEGER NOT NULL,
                alerts_raised INTEGER NOT NULL,
                alerts_cleared INTEGER NOT NULL,
                ranked INTEGER NOT NULL,
                created_at TEXT NOT NULL DEFAULT (datetime('now'))
            )",
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Execute one full check cycle as of `as_of`.
    pub async fn run(&self, as_of: DateTime<Utc>) -> Result<RunSummary, SignalError> {
        let _guard = self.run_lock.try_lock().map_err(|_| SignalError::ConcurrentRun)?;

        tracing::info!(as_of = %as_of, feed = self.feed.name(), "Starting signal run");
        let since = as_of - Duration::days(self.config.alert_window_days);

        // Feed pull and reference snapshot happen before anything is
        // written; a failure here leaves prior published state untouched.
        let events = self.feed.fetch(&self.config.watch_universe, since).await?;
        let references = self.references.snapshot(&self.config.watch_universe).await?;

        let mut tx = self.pool.begin().await?;

        let report = self.store.ingest(&mut tx, &events).await?;
        let alerts = self.detector.evaluate(&self.store, &mut tx, as_of).await?;
        let ranking = self
            .ranker
            .rank(&self.store, &mut tx, &self.config.watch_universe, &references, as_of)
            .await?;
        self.ranker.persist(&mut tx, &ranking, as_of).await?;

        sqlx::query(
            "INSERT INTO runs (as_of, inserted, duplicates, rejected, alerts_raised, alerts_cleared, ranked)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(as_of.timestamp())
        .bind(report.inserted as i64)
        .bind(report.duplicates as i64)
        .bind(report.rejected.len() as i64)
        .bind(alerts.raised.len() as i64)
        .bind(alerts.cleared.len() as i64)
        .bind(ranking.len() as i64)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        // Results are published; a sink failure must not fail the run
        if let Err(e) = self.sink.notify(&alerts.raised).await {
            tracing::error!("Notification sink failed: {e}");
        }

        let summary = RunSummary {
            as_of,
            ingested: report.inserted,
            duplicates: report.duplicates,
            rejected: report.rejected.len() as u32,
            alerts_raised: alerts.raised,
            alerts_cleared: alerts.cleared,
            top_ranked: ranking.into_iter().take(self.config.top_n).collect(),
        };
        tracing::info!(
            ingested = summary.ingested,
            duplicates = summary.duplicates,
            rejected = summary.rejected,
            alerts = summary.alerts_raised.len(),
            "Signal run complete"
        );
        Ok(summary)
    }

    /// Forward an external acknowledgment to the detector.
    pub async fn acknowledge(&self, ticker: &str) -> Result<bool, SignalError> {
        self.detector.acknowledge(ticker).await
    }

    /// Last published ranking, for the presentation collaborator.
    pub async fn published_ranking(&self) -> Result<Vec<signal_core::ScoreResult>, SignalError> {
        self.ranker.published().await
    }

    /// Currently active alerts, for the presentation collaborator.
    pub async fn active_alerts(&self) -> Result<Vec<AlertRecord>, SignalError> {
        self.detector.active_alerts().await
    }
}
