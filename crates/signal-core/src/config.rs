use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::env;

use crate::error::SignalError;
use crate::types::InsiderRole;

/// Weights for the four scoring factors (must sum to 1.0)
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct FactorWeights {
    pub trade_value: f64,
    pub float_ratio: f64,
    pub role: f64,
    pub concentration: f64,
}

impl Default for FactorWeights {
    fn default() -> Self {
        Self {
            trade_value: 0.40,
            float_ratio: 0.30,
            role: 0.20,
            concentration: 0.10,
        }
    }
}

impl FactorWeights {
    pub fn sum(&self) -> f64 {
        self.trade_value + self.float_ratio + self.role + self.concentration
    }

    pub fn validate(&self) -> Result<(), SignalError> {
        if (self.sum() - 1.0).abs() > 1e-9 {
            return Err(SignalError::Configuration(format!(
                "Factor weights must sum to 1.0, got {}",
                self.sum()
            )));
        }
        for (name, w) in [
            ("trade_value", self.trade_value),
            ("float_ratio", self.float_ratio),
            ("role", self.role),
            ("concentration", self.concentration),
        ] {
            if !(0.0..=1.0).contains(&w) {
                return Err(SignalError::Configuration(format!(
                    "Factor weight '{name}' must be in [0,1], got {w}"
                )));
            }
        }
        Ok(())
    }
}

/// Per-role weight table used by the role factor. Configuration input,
/// not hardcoded in the scoring logic.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoleWeightTable {
    weights: HashMap<InsiderRole, f64>,
}

impl Default for RoleWeightTable {
    fn default() -> Self {
        // Scaled from the original model's executive scores (CEO 100 .. Other 30)
        let mut weights = HashMap::new();
        weights.insert(InsiderRole::Ceo, 1.0);
        weights.insert(InsiderRole::Cfo, 0.9);
        weights.insert(InsiderRole::TenPercentOwner, 0.85);
        weights.insert(InsiderRole::Director, 0.7);
        weights.insert(InsiderRole::ExecutiveOfficer, 0.5);
        weights.insert(InsiderRole::Other, 0.3);
        Self { weights }
    }
}

impl RoleWeightTable {
    pub fn weight(&self, role: InsiderRole) -> f64 {
        self.weights.get(&role).copied().unwrap_or(0.3)
    }

    pub fn set(&mut self, role: InsiderRole, weight: f64) {
        self.weights.insert(role, weight);
    }

    pub fn validate(&self) -> Result<(), SignalError> {
        for (role, w) in &self.weights {
            if !(0.0..=1.0).contains(w) {
                return Err(SignalError::Configuration(format!(
                    "Role weight for {} must be in [0,1], got {w}",
                    role.as_str()
                )));
            }
        }
        Ok(())
    }
}

/// Engine configuration, loaded from the environment and validated
/// before any run starts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Tickers under evaluation
    pub watch_universe: Vec<String>,
    /// Trailing-window event count that flips a ticker to ALERTED
    pub alert_threshold: u32,
    /// Trailing window length in days (3 months)
    pub alert_window_days: i64,
    pub factor_weights: FactorWeights,
    /// Dollar ceiling for trade-value normalization
    pub value_ceiling: f64,
    pub role_weights: RoleWeightTable,
    /// Ranking entries surfaced in the run summary
    pub top_n: usize,

    // External collaborators
    pub database_url: String,
    pub finnhub_api_key: Option<String>,
    pub feed_file: Option<String>,
    pub reference_file: Option<String>,
}

impl EngineConfig {
    pub fn from_env() -> Result<Self, SignalError> {
        let watch_universe: Vec<String> = env::var("WATCH_UNIVERSE")
            .unwrap_or_else(|_| "TSLA,PLTR,RGTI,IONQ,MSTR,LLY".to_string())
            .split(',')
            .map(|s| s.trim().to_uppercase())
            .filter(|s| !s.is_empty())
            .collect();

        let mut role_weights = RoleWeightTable::default();
        for (var, role) in [
            ("ROLE_WEIGHT_CEO", InsiderRole::Ceo),
            ("ROLE_WEIGHT_CFO", InsiderRole::Cfo),
            ("ROLE_WEIGHT_OFFICER", InsiderRole::ExecutiveOfficer),
            ("ROLE_WEIGHT_DIRECTOR", InsiderRole::Director),
            ("ROLE_WEIGHT_OWNER", InsiderRole::TenPercentOwner),
            ("ROLE_WEIGHT_OTHER", InsiderRole::Other),
        ] {
            if let Ok(v) = env::var(var) {
                role_weights.set(role, parse_var(var, &v)?);
            }
        }

        let config = Self {
            watch_universe,
            alert_threshold: parse_env("ALERT_THRESHOLD", "3")?,
            alert_window_days: parse_env("ALERT_WINDOW_DAYS", "90")?,
            factor_weights: FactorWeights {
                trade_value: parse_env("FACTOR_WEIGHT_VALUE", "0.40")?,
                float_ratio: parse_env("FACTOR_WEIGHT_FLOAT", "0.30")?,
                role: parse_env("FACTOR_WEIGHT_ROLE", "0.20")?,
                concentration: parse_env("FACTOR_WEIGHT_CONCENTRATION", "0.10")?,
            },
            value_ceiling: parse_env("VALUE_CEILING", "10000000")?,
            role_weights,
            top_n: parse_env("TOP_N", "10")?,
            database_url: env::var("DATABASE_URL")
                .unwrap_or_else(|_| "sqlite://insider_signal.db".to_string()),
            finnhub_api_key: env::var("FINNHUB_API_KEY").ok(),
            feed_file: env::var("FEED_FILE").ok(),
            reference_file: env::var("REFERENCE_FILE").ok(),
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), SignalError> {
        if self.watch_universe.is_empty() {
            return Err(SignalError::Configuration(
                "Watch universe must contain at least one ticker".to_string(),
            ));
        }
        if self.alert_threshold == 0 {
            return Err(SignalError::Configuration(
                "Alert threshold must be at least 1".to_string(),
            ));
        }
        if self.alert_window_days <= 0 {
            return Err(SignalError::Configuration(
                "Alert window must be positive".to_string(),
            ));
        }
        if self.value_ceiling <= 0.0 {
            return Err(SignalError::Configuration(
                "Value ceiling must be positive".to_string(),
            ));
        }
        self.factor_weights.validate()?;
        self.role_weights.validate()?;
        Ok(())
    }
}

fn parse_env<T: std::str::FromStr>(var: &str, default: &str) -> Result<T, SignalError> {
    let raw = env::var(var).unwrap_or_else(|_| default.to_string());
    parse_var(var, &raw)
}

fn parse_var<T: std::str::FromStr>(var: &str, raw: &str) -> Result<T, SignalError> {
    raw.parse()
        .map_err(|_| SignalError::Configuration(format!("Invalid value for {var}: '{raw}'")))
}
