//! Auto-invest — periodic dip buying within the period cap.
//!
//! Each cycle ranks the session's opportunities by score, screens them
//! against the auto-invest settings and buys in rank order until the
//! period allowance or cash runs out. Every candidate leaves a
//! [`DecisionRecord`], including the ones passed on and why.

use std::fmt;
use tracing::{debug, info, warn};

use super::filter::SortKey;
use super::{Opportunity, OpportunityEngine};
use crate::sources::RandomSource;
use crate::types::{AssetCategory, InvestmentSettings, LedgerError, RiskLevel, Valuation};

/// Smallest dollar amount worth placing.
pub const MIN_TRADE: f64 = 0.01;

// ---------------------------------------------------------------------------
// Decision log
// ---------------------------------------------------------------------------

/// Why a candidate was passed on.
#[derive(Debug, Clone, PartialEq)]
pub enum SkipReason {
    CategoryDisabled(AssetCategory),
    NotUndervalued(Valuation),
    LowConfidence { confidence: f64, minimum: f64 },
    RiskTooHigh { level: RiskLevel, maximum: RiskLevel },
    PeriodBudgetExhausted,
    CashExhausted,
    BelowMinimumTrade(f64),
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::CategoryDisabled(c) => write!(f, "{c} disabled"),
            SkipReason::NotUndervalued(v) => write!(f, "valuation {v}"),
            SkipReason::LowConfidence {
                confidence,
                minimum,
            } => write!(f, "confidence {confidence:.0}% below {minimum:.0}%"),
            SkipReason::RiskTooHigh { level, maximum } => {
                write!(f, "{level} above {maximum}")
            }
            SkipReason::PeriodBudgetExhausted => write!(f, "period budget exhausted"),
            SkipReason::CashExhausted => write!(f, "no cash"),
            SkipReason::BelowMinimumTrade(a) => write!(f, "trade size ${a:.2} too small"),
        }
    }
}

/// Outcome for one candidate in a cycle.
#[derive(Debug, Clone, PartialEq)]
pub enum DecisionRecord {
    Bought {
        symbol: String,
        amount: f64,
        quantity: f64,
        score: f64,
    },
    Skipped {
        symbol: String,
        reason: SkipReason,
    },
    /// Screened in, but the ledger refused the buy.
    Rejected {
        symbol: String,
        error: LedgerError,
    },
}

/// Summary of one auto-invest cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct CycleReport {
    pub cycle_number: u64,
    /// False when auto-invest is switched off in the settings.
    pub enabled: bool,
    pub decisions: Vec<DecisionRecord>,
    pub total_spent: f64,
    pub balance_after: f64,
    pub remaining_in_period: f64,
}

impl CycleReport {
    pub fn bought(&self) -> usize {
        self.count(|d| matches!(d, DecisionRecord::Bought { .. }))
    }

    pub fn skipped(&self) -> usize {
        self.count(|d| matches!(d, DecisionRecord::Skipped { .. }))
    }

    pub fn rejected(&self) -> usize {
        self.count(|d| matches!(d, DecisionRecord::Rejected { .. }))
    }

    fn count(&self, pred: impl Fn(&DecisionRecord) -> bool) -> usize {
        self.decisions.iter().filter(|d| pred(d)).count()
    }
}

// ---------------------------------------------------------------------------
// Screening
// ---------------------------------------------------------------------------

/// Apply the auto-invest settings to one opportunity.
pub fn screen(settings: &InvestmentSettings, o: &Opportunity) -> Option<SkipReason> {
    if !settings.asset_types.allows(o.category) {
        return Some(SkipReason::CategoryDisabled(o.category));
    }
    if settings.auto_invest_only_undervalued && o.valuation != Valuation::Undervalued {
        return Some(SkipReason::NotUndervalued(o.valuation));
    }
    if settings.auto_invest_min_confidence_enabled
        && o.confidence < settings.auto_invest_min_confidence
    {
        return Some(SkipReason::LowConfidence {
            confidence: o.confidence,
            minimum: settings.auto_invest_min_confidence,
        });
    }
    if o.risk_level > settings.auto_invest_max_risk_level {
        return Some(SkipReason::RiskTooHigh {
            level: o.risk_level,
            maximum: settings.auto_invest_max_risk_level,
        });
    }
    None
}

// ---------------------------------------------------------------------------
// Investor
// ---------------------------------------------------------------------------

/// Runs auto-invest cycles against an engine.
#[derive(Debug, Default)]
pub struct AutoInvestor {
    cycles: u64,
}

impl AutoInvestor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    /// Screen, size and buy. Each buy is
    /// `min(max_budget_per_trade, period remaining, balance)`.
    pub fn run_cycle<R: RandomSource>(&mut self, engine: &mut OpportunityEngine<R>) -> CycleReport {
        self.cycles += 1;
        let settings = engine.settings().clone();
        let mut report = CycleReport {
            cycle_number: self.cycles,
            enabled: settings.auto_invest,
            decisions: Vec::new(),
            total_spent: 0.0,
            balance_after: engine.wallet().balance(),
            remaining_in_period: engine.limiter().remaining(),
        };

        if !settings.auto_invest {
            debug!(cycle = self.cycles, "Auto-invest disabled, skipping cycle");
            return report;
        }

        let mut ranked: Vec<Opportunity> = engine.opportunities().to_vec();
        ranked.sort_by(|a, b| SortKey::Undervaluation.compare(a, b));

        for o in ranked {
            if let Some(reason) = screen(&settings, &o) {
                debug!(symbol = %o.symbol, reason = %reason, "Candidate skipped");
                report.decisions.push(DecisionRecord::Skipped {
                    symbol: o.symbol,
                    reason,
                });
                continue;
            }

            let remaining = engine.limiter().remaining();
            let balance = engine.wallet().balance();
            let amount = settings.max_budget_per_trade.min(remaining).min(balance);
            if amount < MIN_TRADE {
                let reason = if remaining < MIN_TRADE {
                    SkipReason::PeriodBudgetExhausted
                } else if balance < MIN_TRADE {
                    SkipReason::CashExhausted
                } else {
                    SkipReason::BelowMinimumTrade(amount)
                };
                report.decisions.push(DecisionRecord::Skipped {
                    symbol: o.symbol,
                    reason,
                });
                continue;
            }

            match engine.buy(&o.symbol, amount) {
                Ok(receipt) => {
                    info!(
                        symbol = %o.symbol,
                        amount = format!("${:.2}", receipt.amount),
                        score = format!("{:.1}", o.score),
                        confidence = format!("{:.0}%", o.confidence),
                        "Auto-invest buy"
                    );
                    report.total_spent += receipt.amount;
                    report.decisions.push(DecisionRecord::Bought {
                        symbol: o.symbol,
                        amount: receipt.amount,
                        quantity: receipt.quantity,
                        score: o.score,
                    });
                }
                Err(error) => {
                    warn!(symbol = %o.symbol, error = %error, "Auto-invest buy rejected");
                    report.decisions.push(DecisionRecord::Rejected {
                        symbol: o.symbol,
                        error,
                    });
                }
            }
        }

        report.balance_after = engine.wallet().balance();
        report.remaining_in_period = engine.limiter().remaining();
        debug!(
            cycle = report.cycle_number,
            bought = report.bought(),
            skipped = report.skipped(),
            rejected = report.rejected(),
            spent = format!("${:.2}", report.total_spent),
            balance = format!("${:.2}", report.balance_after),
            "Auto-invest cycle finished"
        );
        report
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog;
    use crate::config::AppConfig;
    use crate::sources::{ManualClock, SequenceRandom, SequentialIds};
    use crate::storage::MemoryStore;
    use crate::types::{AssetTypeToggles, CatalogEntry, Frequency};
    use chrono::{TimeZone, Utc};
    use std::sync::Arc;

    // U = 0.99 on every draw: no artificial dip, but each backward step of
    // the walk rises by almost the full volatility, so the quote sits far
    // below its moving average and scores at the ceiling.
    fn deep_dip_engine(symbols: &[&str]) -> OpportunityEngine<SequenceRandom> {
        let entries: Vec<CatalogEntry> = symbols
            .iter()
            .filter_map(|s| catalog::find(s).cloned())
            .collect();
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2024, 3, 15, 10, 0, 0).unwrap(),
        ));
        let mut engine = OpportunityEngine::restore(
            AppConfig::default(),
            Arc::new(MemoryStore::new()),
            clock,
            Arc::new(SequentialIds::new()),
            SequenceRandom::constant(0.99),
        )
        .with_catalog(entries);
        engine.generate_opportunities();
        engine
    }

    fn auto_settings(cap: f64, per_trade: f64) -> InvestmentSettings {
        InvestmentSettings {
            auto_invest: true,
            auto_invest_amount: Some(cap),
            auto_invest_frequency: Some(Frequency::Daily),
            max_budget_per_trade: per_trade,
            auto_invest_max_risk_level: RiskLevel::High,
            ..Default::default()
        }
    }

    #[test]
    fn test_disabled_cycle_does_nothing() {
        let mut engine = deep_dip_engine(&["AAPL"]);
        let mut investor = AutoInvestor::new();
        let report = investor.run_cycle(&mut engine);
        assert!(!report.enabled);
        assert!(report.decisions.is_empty());
        assert_eq!(engine.wallet().balance(), 10_000.0);
        assert_eq!(investor.cycles(), 1);
    }

    #[test]
    fn test_buys_until_period_budget_exhausted() {
        let mut engine = deep_dip_engine(&["AAPL", "MSFT", "KO"]);
        assert!(engine.opportunities().iter().all(|o| o.score == 50.0));
        engine.update_settings(auto_settings(2500.0, 1000.0));

        let report = AutoInvestor::new().run_cycle(&mut engine);
        assert_eq!(report.bought(), 3);
        let amounts: Vec<f64> = report
            .decisions
            .iter()
            .filter_map(|d| match d {
                DecisionRecord::Bought { amount, .. } => Some(*amount),
                _ => None,
            })
            .collect();
        assert_eq!(amounts, vec![1000.0, 1000.0, 500.0]);
        assert!((report.total_spent - 2500.0).abs() < 1e-9);
        assert!(report.remaining_in_period.abs() < 1e-9);
        assert!((engine.wallet().balance() - 7500.0).abs() < 1e-9);

        let second = AutoInvestor::new().run_cycle(&mut engine);
        assert_eq!(second.bought(), 0);
        assert!(second
            .decisions
            .iter()
            .all(|d| matches!(d, DecisionRecord::Skipped { reason: SkipReason::PeriodBudgetExhausted, .. })));
    }

    #[test]
    fn test_cash_limits_trade_size() {
        let mut engine = deep_dip_engine(&["AAPL", "MSFT"]);
        engine.update_settings(auto_settings(10_000.0, 1000.0));
        engine.withdraw(9_700.0).unwrap();

        let report = AutoInvestor::new().run_cycle(&mut engine);
        assert_eq!(report.bought(), 1);
        assert!(matches!(
            &report.decisions[1],
            DecisionRecord::Skipped { reason: SkipReason::CashExhausted, .. }
        ));
        assert!(engine.wallet().balance().abs() < 1e-9);
    }

    #[test]
    fn test_screening_rules() {
        let mut engine = deep_dip_engine(&["AAPL", "BTC", "SPY"]);
        let settings = InvestmentSettings {
            asset_types: AssetTypeToggles {
                etfs: false,
                ..Default::default()
            },
            auto_invest_max_risk_level: RiskLevel::Medium,
            ..auto_settings(5000.0, 100.0)
        };
        engine.update_settings(settings);

        let report = AutoInvestor::new().run_cycle(&mut engine);
        assert_eq!(report.bought(), 1);
        let reasons: Vec<&SkipReason> = report
            .decisions
            .iter()
            .filter_map(|d| match d {
                DecisionRecord::Skipped { reason, .. } => Some(reason),
                _ => None,
            })
            .collect();
        assert!(reasons.contains(&&SkipReason::CategoryDisabled(AssetCategory::Etf)));
        assert!(reasons.iter().any(|r| matches!(r, SkipReason::RiskTooHigh { .. })));
    }

    #[test]
    fn test_screen_confidence_and_valuation() {
        let mut o = deep_dip_engine(&["AAPL"]).opportunities()[0].clone();
        let settings = auto_settings(1000.0, 100.0);
        assert_eq!(screen(&settings, &o), None);

        o.confidence = 50.0;
        assert!(matches!(
            screen(&settings, &o),
            Some(SkipReason::LowConfidence { minimum, .. }) if minimum == 80.0
        ));

        let lenient = InvestmentSettings {
            auto_invest_min_confidence_enabled: false,
            ..settings.clone()
        };
        assert_eq!(screen(&lenient, &o), None);

        o.valuation = Valuation::Fair;
        assert_eq!(
            screen(&lenient, &o),
            Some(SkipReason::NotUndervalued(Valuation::Fair))
        );
    }

    #[test]
    fn test_skip_reason_display() {
        assert_eq!(
            SkipReason::LowConfidence {
                confidence: 42.0,
                minimum: 80.0
            }
            .to_string(),
            "confidence 42% below 80%"
        );
        assert_eq!(SkipReason::CashExhausted.to_string(), "no cash");
    }
}
