//! Configuration loading from TOML.
//!
//! Reads `config.toml` and deserializes into strongly-typed structs. Every
//! section and field has a default, so a partial file (or none at all)
//! still yields a working session.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::PathBuf;

use crate::ledger::HistoryConfig;
use crate::types::InvestmentSettings;

/// Top-level application configuration.
#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct AppConfig {
    pub session: SessionConfig,
    pub market: MarketConfig,
    pub portfolio: PortfolioConfig,
    pub limits: LimitsConfig,
    /// Investment settings used when none are persisted.
    pub settings: InvestmentSettings,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SessionConfig {
    pub name: String,
    /// Opening cash for a fresh wallet.
    pub initial_balance: f64,
    /// Seconds between auto-invest cycles in the binary.
    pub cycle_interval_secs: u64,
    /// Directory for the file-backed state store.
    pub state_dir: PathBuf,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            name: "DIPBUYER".to_string(),
            initial_balance: 10_000.0,
            cycle_interval_secs: 60,
            state_dir: PathBuf::from("state"),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct MarketConfig {
    /// Length of each simulated price history.
    pub history_days: usize,
    pub moving_average_period: usize,
    /// Scores are capped here; confidence is measured against it.
    pub score_ceiling: f64,
    /// Chance that a session quote is an artificial dip below base price.
    pub dip_probability: f64,
    pub dip_min: f64,
    pub dip_max: f64,
    /// Fixed seed for reproducible sessions; entropy when unset.
    pub seed: Option<u64>,
}

impl Default for MarketConfig {
    fn default() -> Self {
        Self {
            history_days: 100,
            moving_average_period: 50,
            score_ceiling: 50.0,
            dip_probability: 0.5,
            dip_min: 0.85,
            dip_max: 0.95,
            seed: None,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct PortfolioConfig {
    pub history_debounce_ms: u64,
    pub history_epsilon: f64,
}

impl Default for PortfolioConfig {
    fn default() -> Self {
        let history = HistoryConfig::default();
        Self {
            history_debounce_ms: history.debounce_ms,
            history_epsilon: history.epsilon,
        }
    }
}

impl PortfolioConfig {
    pub fn history(&self) -> HistoryConfig {
        HistoryConfig {
            debounce_ms: self.history_debounce_ms,
            epsilon: self.history_epsilon,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LimitsConfig {
    /// Spend-log buckets kept, counted in periods of the active frequency.
    pub spend_log_retention_periods: u32,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            spend_log_retention_periods: 48,
        }
    }
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {path}"))?;
        Self::parse(&contents).with_context(|| format!("Failed to parse config file: {path}"))
    }

    /// Parse configuration from TOML text.
    pub fn parse(contents: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        let m = &self.market;
        anyhow::ensure!(
            (0.0..=1.0).contains(&m.dip_probability),
            "market.dip_probability must be within [0, 1], got {}",
            m.dip_probability
        );
        anyhow::ensure!(
            m.dip_min > 0.0 && m.dip_min <= m.dip_max,
            "market.dip_min must be positive and not above dip_max"
        );
        anyhow::ensure!(m.score_ceiling > 0.0, "market.score_ceiling must be positive");
        anyhow::ensure!(
            m.moving_average_period > 0,
            "market.moving_average_period must be positive"
        );
        anyhow::ensure!(
            m.history_days >= m.moving_average_period,
            "market.history_days ({}) must cover moving_average_period ({})",
            m.history_days,
            m.moving_average_period
        );
        anyhow::ensure!(
            self.session.initial_balance >= 0.0,
            "session.initial_balance must not be negative"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Frequency, RiskLevel};

    #[test]
    fn test_load_config() {
        // Needs config.toml in the working directory.
        let result = AppConfig::load("config.toml");
        if let Ok(cfg) = result {
            assert_eq!(cfg.session.name, "DIPBUYER-001");
            assert_eq!(cfg.session.initial_balance, 10_000.0);
            assert_eq!(cfg.market.history_days, 100);
            assert_eq!(cfg.market.moving_average_period, 50);
            assert_eq!(cfg.portfolio.history_debounce_ms, 500);
        }
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        let cfg = AppConfig::parse("").unwrap();
        assert_eq!(cfg.session.initial_balance, 10_000.0);
        assert_eq!(cfg.market.score_ceiling, 50.0);
        assert_eq!(cfg.market.dip_probability, 0.5);
        assert!(cfg.market.seed.is_none());
        assert_eq!(cfg.limits.spend_log_retention_periods, 48);
        assert_eq!(cfg.portfolio.history(), HistoryConfig::default());
        assert_eq!(cfg.settings, InvestmentSettings::default());
    }

    #[test]
    fn test_partial_sections() {
        let cfg = AppConfig::parse(
            r#"
            [session]
            initial_balance = 2500.0

            [market]
            seed = 42

            [settings]
            maxBudgetPerTrade = 250.0
            autoInvestFrequency = "weekly"
            autoInvestMaxRiskLevel = "high"
            "#,
        )
        .unwrap();
        assert_eq!(cfg.session.initial_balance, 2500.0);
        assert_eq!(cfg.session.cycle_interval_secs, 60);
        assert_eq!(cfg.market.seed, Some(42));
        assert_eq!(cfg.market.history_days, 100);
        assert_eq!(cfg.settings.max_budget_per_trade, 250.0);
        assert_eq!(cfg.settings.period_frequency(), Frequency::Weekly);
        assert_eq!(cfg.settings.auto_invest_max_risk_level, RiskLevel::High);
    }

    #[test]
    fn test_rejects_bad_dip_range() {
        let err = AppConfig::parse("[market]\ndip_min = 0.99\ndip_max = 0.9\n").unwrap_err();
        assert!(err.to_string().contains("dip_min"));
        assert!(AppConfig::parse("[market]\ndip_probability = 1.5\n").is_err());
    }

    #[test]
    fn test_rejects_history_shorter_than_average() {
        let err = AppConfig::parse("[market]\nhistory_days = 30\n").unwrap_err();
        assert!(err.to_string().contains("history_days"));
        assert!(AppConfig::parse("[market]\nhistory_days = 30\nmoving_average_period = 30\n").is_ok());
    }

    #[test]
    fn test_missing_file() {
        assert!(AppConfig::load("/nonexistent/dipbuyer.toml").is_err());
    }
}
