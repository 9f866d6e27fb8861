use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Role of the insider who made the transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InsiderRole {
    Ceo,
    Cfo,
    ExecutiveOfficer,
    Director,
    TenPercentOwner,
    Other,
}

impl InsiderRole {
    /// Normalize a free-text insider title to a standard category.
    /// Filing feeds report titles like "Chief Executive Officer" or
    /// "Director, 10% Owner"; CEO/CFO win over the broader matches.
    pub fn from_title(title: &str) -> Self {
        let upper = title.to_uppercase();
        if upper.contains("CEO") || upper.contains("CHIEF EXECUTIVE") {
            InsiderRole::Ceo
        } else if upper.contains("CFO") || upper.contains("CHIEF FINANCIAL") {
            InsiderRole::Cfo
        } else if upper.contains("DIRECTOR") {
            InsiderRole::Director
        } else if upper.contains("10%") || upper.contains("OWNER") {
            InsiderRole::TenPercentOwner
        } else if upper.contains("OFFICER") {
            InsiderRole::ExecutiveOfficer
        } else {
            InsiderRole::Other
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            InsiderRole::Ceo => "CEO",
            InsiderRole::Cfo => "CFO",
            InsiderRole::ExecutiveOfficer => "OFFICER",
            InsiderRole::Director => "DIRECTOR",
            InsiderRole::TenPercentOwner => "OWNER_10PCT",
            InsiderRole::Other => "OTHER",
        }
    }

    pub fn from_str_stored(s: &str) -> Self {
        match s {
            "CEO" => InsiderRole::Ceo,
            "CFO" => InsiderRole::Cfo,
            "OFFICER" => InsiderRole::ExecutiveOfficer,
            "DIRECTOR" => InsiderRole::Director,
            "OWNER_10PCT" => InsiderRole::TenPercentOwner,
            _ => InsiderRole::Other,
        }
    }
}

/// Direction of an insider transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransactionType {
    Buy,
    Sell,
}

impl TransactionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionType::Buy => "BUY",
            TransactionType::Sell => "SELL",
        }
    }

    pub fn from_str_stored(s: &str) -> Self {
        match s {
            "BUY" => TransactionType::Buy,
            _ => TransactionType::Sell,
        }
    }
}

/// A single disclosed insider transaction.
/// `id` is derived from the filing fields, so re-ingesting the same
/// filing always maps to the same row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionEvent {
    pub id: String,
    pub ticker: String,
    pub insider_name: String,
    pub insider_role: InsiderRole,
    pub transaction_type: TransactionType,
    pub value: f64,
    pub timestamp: DateTime<Utc>,
}

impl TransactionEvent {
    /// Build an event with its deterministic identity.
    /// Ticker is normalized to uppercase, the insider name is trimmed.
    pub fn new(
        ticker: &str,
        insider_name: &str,
        insider_role: InsiderRole,
        transaction_type: TransactionType,
        value: f64,
        timestamp: DateTime<Utc>,
    ) -> Self {
        let ticker = ticker.trim().to_uppercase();
        let insider_name = insider_name.trim().to_string();
        let id = event_id(&ticker, &insider_name, transaction_type, value, timestamp);
        Self {
            id,
            ticker,
            insider_name,
            insider_role,
            transaction_type,
            value,
            timestamp,
        }
    }
}

/// Deterministic event identity: sha256 over the identifying filing fields.
/// Value is fixed to whole cents so float formatting can never split one
/// filing into two ids.
pub fn event_id(
    ticker: &str,
    insider_name: &str,
    transaction_type: TransactionType,
    value: f64,
    timestamp: DateTime<Utc>,
) -> String {
    let cents = (value * 100.0).round() as i64;
    let mut hasher = Sha256::new();
    hasher.update(ticker.as_bytes());
    hasher.update(b"|");
    hasher.update(insider_name.as_bytes());
    hasher.update(b"|");
    hasher.update(timestamp.date_naive().to_string().as_bytes());
    hasher.update(b"|");
    hasher.update(transaction_type.as_str().as_bytes());
    hasher.update(b"|");
    hasher.update(cents.to_le_bytes());
    hex::encode(hasher.finalize())
}

/// Static per-ticker reference data, supplied externally per run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TickerReference {
    pub ticker: String,
    pub shares_outstanding: u64,
    /// Used to imply share counts from dollar transaction values
    pub share_price: f64,
    #[serde(default)]
    pub sector: Option<String>,
}

/// Per-factor contribution recorded alongside a score for auditability
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FactorContribution {
    pub factor: String,
    /// Normalized factor value in [0, 1]
    pub raw: f64,
    pub weight: f64,
    /// weight * raw * 100, the points this factor adds to the score
    pub contribution: f64,
}

/// Scoring output for one ticker. Recomputed fresh every run and
/// replaced wholesale, never mutated in place.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoreResult {
    pub ticker: String,
    /// 0-100
    pub score: f64,
    pub breakdown: Vec<FactorContribution>,
}

/// An active alert for a ticker whose trailing-window activity crossed
/// the threshold. At most one active record per ticker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertRecord {
    pub ticker: String,
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
    pub event_count: u32,
    pub triggered_at: DateTime<Utc>,
}

/// An event rejected at ingestion, reported back in the batch summary
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RejectedEvent {
    pub ticker: String,
    pub insider_name: String,
    pub field: String,
    pub reason: String,
}

/// Outcome of one ingestion batch (partial-success semantics)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IngestReport {
    pub inserted: u32,
    pub duplicates: u32,
    pub rejected: Vec<RejectedEvent>,
}

/// Run-level summary surfaced by the coordinator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub as_of: DateTime<Utc>,
    pub ingested: u32,
    pub duplicates: u32,
    pub rejected: u32,
    pub alerts_raised: Vec<AlertRecord>,
    pub alerts_cleared: Vec<String>,
    pub top_ranked: Vec<ScoreResult>,
}
