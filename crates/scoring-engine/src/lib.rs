//! 4-factor weighted scoring model for insider activity.
//!
//! Pure and deterministic: identical events and reference data always
//! produce a bit-identical ScoreResult. The only time input is the
//! caller-supplied event window; nothing here reads the clock.

use std::collections::BTreeMap;

use signal_core::{
    FactorContribution, FactorWeights, RoleWeightTable, ScoreResult, SignalError, TickerReference,
    TransactionEvent,
};

pub struct ScoringEngine {
    weights: FactorWeights,
    role_table: RoleWeightTable,
    /// Dollar ceiling for trade-value normalization
    value_ceiling: f64,
}

impl ScoringEngine {
    pub fn new(
        weights: FactorWeights,
        role_table: RoleWeightTable,
        value_ceiling: f64,
    ) -> Result<Self, SignalError> {
        weights.validate()?;
        role_table.validate()?;
        if value_ceiling <= 0.0 {
            return Err(SignalError::Configuration(
                "Value ceiling must be positive".to_string(),
            ));
        }
        Ok(Self {
            weights,
            role_table,
            value_ceiling,
        })
    }

    /// Score one ticker from its window of events and reference data.
    /// A ticker with zero events scores 0 on all factors, not an error.
    pub fn score(
        &self,
        ticker: &str,
        events: &[TransactionEvent],
        reference: &TickerReference,
    ) -> ScoreResult {
        let (trade_value, float_ratio, role, concentration) = if events.is_empty() {
            (0.0, 0.0, 0.0, 0.0)
        } else {
            (
                self.trade_value_factor(events),
                self.float_ratio_factor(events, reference),
                self.role_factor(events),
                self.concentration_factor(events),
            )
        };

        let w = &self.weights;
        let breakdown = vec![
            contribution("tradeValue", trade_value, w.trade_value),
            contribution("floatRatio", float_ratio, w.float_ratio),
            contribution("role", role, w.role),
            contribution("concentration", concentration, w.concentration),
        ];
        let score = breakdown.iter().map(|c| c.contribution).sum::<f64>().clamp(0.0, 100.0);

        ScoreResult {
            ticker: ticker.to_string(),
            score,
            breakdown,
        }
    }

    /// Log-scaled total transaction value against the configured ceiling.
    fn trade_value_factor(&self, events: &[TransactionEvent]) -> f64 {
        let total: f64 = events.iter().map(|e| e.value).sum();
        (total.max(0.0).ln_1p() / self.value_ceiling.ln_1p()).clamp(0.0, 1.0)
    }

    /// Shares implied by the total transaction value relative to the float.
    fn float_ratio_factor(&self, events: &[TransactionEvent], reference: &TickerReference) -> f64 {
        if reference.share_price <= 0.0 || reference.shares_outstanding == 0 {
            return 0.0;
        }
        let total: f64 = events.iter().map(|e| e.value).sum();
        let implied_shares = total / reference.share_price;
        (implied_shares / reference.shares_outstanding as f64).clamp(0.0, 1.0)
    }

    /// Value-weighted average of the configured role weights.
    fn role_factor(&self, events: &[TransactionEvent]) -> f64 {
        let total: f64 = events.iter().map(|e| e.value).sum();
        let factor = if total > 0.0 {
            events
                .iter()
                .map(|e| self.role_table.weight(e.insider_role) * e.value)
                .sum::<f64>()
                / total
        } else {
            // All-zero values: fall back to a plain average
            events
                .iter()
                .map(|e| self.role_table.weight(e.insider_role))
                .sum::<f64>()
                / events.len() as f64
        };
        factor.clamp(0.0, 1.0)
    }

    /// 1 − normalized Shannon entropy of per-insider value shares.
    /// One insider holding all the value scores 1.0; value spread evenly
    /// across many insiders tends to 0.
    fn concentration_factor(&self, events: &[TransactionEvent]) -> f64 {
        // BTreeMap keeps the entropy accumulation in insider-name order;
        // float addition is not associative, so iteration order must be
        // fixed for scores to be bit-for-bit reproducible.
        let mut per_insider: BTreeMap<&str, f64> = BTreeMap::new();
        for event in events {
            *per_insider.entry(event.insider_name.as_str()).or_insert(0.0) += event.value;
        }

        let n = per_insider.len();
        if n <= 1 {
            return 1.0;
        }
        let total: f64 = per_insider.values().sum();
        if total <= 0.0 {
            return 0.0;
        }

        let entropy: f64 = per_insider
            .values()
            .filter(|&&v| v > 0.0)
            .map(|&v| {
                let p = v / total;
                -p * p.ln()
            })
            .sum();

        (1.0 - entropy / (n as f64).ln()).clamp(0.0, 1.0)
    }
}

fn contribution(factor: &str, raw: f64, weight: f64) -> FactorContribution {
    FactorContribution {
        factor: factor.to_string(),
        raw,
        weight,
        contribution: 100.0 * weight * raw,
    }
}
