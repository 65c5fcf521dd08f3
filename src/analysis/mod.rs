//! Market analysis — undervaluation scoring, synthetic price history and
//! the human-readable rationale attached to each opportunity.

pub mod rationale;
pub mod scorer;
pub mod simulator;

pub use rationale::Rationale;
pub use scorer::{ScoreBreakdown, ScoreError, StatisticalScorer};
pub use simulator::PriceSeriesSimulator;
