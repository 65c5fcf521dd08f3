//! Undervaluation scorer.
//!
//! Scores how far a price sits below the moving average of its recent
//! history, in units of the population standard deviation. Two standard
//! deviations below the mean maps to 100; at or above the mean maps to 0.

use tracing::debug;

/// Default moving-average window.
pub const DEFAULT_PERIOD: usize = 50;

/// Score points per standard deviation below the mean.
const POINTS_PER_SIGMA: f64 = 50.0;

/// Standard deviations at or below this (relative to the mean) count as flat.
const FLAT_SERIES_TOLERANCE: f64 = 1e-12;

/// Why a score could not be computed. All of these resolve to a score of 0.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ScoreError {
    #[error("Insufficient data: need {needed} prices, have {available}")]
    InsufficientData { needed: usize, available: usize },

    #[error("Degenerate series: zero variance over the last {period} prices")]
    DegenerateSeries { period: usize },

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

/// Intermediate statistics behind a score.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoreBreakdown {
    pub moving_average: f64,
    pub std_dev: f64,
    pub z_score: f64,
    /// Clamped to `[0, 100]`.
    pub score: f64,
}

/// Compute the full breakdown, or the reason no score exists.
pub fn try_score(
    current_price: f64,
    historical_prices: &[f64],
    period: usize,
) -> Result<ScoreBreakdown, ScoreError> {
    if period == 0 {
        return Err(ScoreError::InvalidInput("period must be at least 1".into()));
    }
    if !current_price.is_finite() {
        return Err(ScoreError::InvalidInput(format!(
            "current price {current_price} is not finite"
        )));
    }
    if historical_prices.len() < period {
        return Err(ScoreError::InsufficientData {
            needed: period,
            available: historical_prices.len(),
        });
    }

    let recent = &historical_prices[historical_prices.len() - period..];
    if recent.iter().any(|p| !p.is_finite()) {
        return Err(ScoreError::InvalidInput("history contains non-finite prices".into()));
    }

    let n = period as f64;
    let moving_average = recent.iter().sum::<f64>() / n;
    let variance = recent
        .iter()
        .map(|p| (p - moving_average).powi(2))
        .sum::<f64>()
        / n;
    let std_dev = variance.sqrt();

    if std_dev <= FLAT_SERIES_TOLERANCE * moving_average.abs().max(1.0) {
        return Err(ScoreError::DegenerateSeries { period });
    }

    let z_score = (current_price - moving_average) / std_dev;
    let score = (-z_score * POINTS_PER_SIGMA).clamp(0.0, 100.0);

    Ok(ScoreBreakdown {
        moving_average,
        std_dev,
        z_score,
        score,
    })
}

/// Undervaluation score in `[0, 100]`; 0 whenever no score can be computed.
pub fn score(current_price: f64, historical_prices: &[f64], period: usize) -> f64 {
    match try_score(current_price, historical_prices, period) {
        Ok(breakdown) => breakdown.score,
        Err(e) => {
            debug!(reason = %e, "Undervaluation score floored at 0");
            0.0
        }
    }
}

/// Scorer bound to a fixed moving-average window.
#[derive(Debug, Clone, Copy)]
pub struct StatisticalScorer {
    period: usize,
}

impl Default for StatisticalScorer {
    fn default() -> Self {
        Self::new(DEFAULT_PERIOD)
    }
}

impl StatisticalScorer {
    pub fn new(period: usize) -> Self {
        Self { period }
    }

    pub fn period(&self) -> usize {
        self.period
    }

    pub fn score(&self, current_price: f64, historical_prices: &[f64]) -> f64 {
        score(current_price, historical_prices, self.period)
    }

    pub fn breakdown(
        &self,
        current_price: f64,
        historical_prices: &[f64],
    ) -> Result<ScoreBreakdown, ScoreError> {
        try_score(current_price, historical_prices, self.period)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
