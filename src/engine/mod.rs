//! Opportunity engine — the per-session context object.
//!
//! Owns the catalog, the random source, both ledgers, the period limiter
//! and the investment settings. Generates the session's opportunity list
//! from the catalog (simulated quote → synthetic history → score →
//! rationale) and gates every buy through the limiter before it reaches
//! the portfolio.

pub mod auto_invest;
pub mod filter;

use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::analysis::rationale::{self, Rationale};
use crate::analysis::{scorer, simulator};
use crate::catalog;
use crate::config::{AppConfig, MarketConfig};
use crate::ledger::{BuyOutcome, PeriodLimiter, PortfolioLedger, SellOutcome, WalletLedger};
use crate::sources::{Clock, IdGenerator, RandomSource};
use crate::storage::{self, keys, KeyValueStore};
use crate::types::{
    AssetCategory, AssetQuote, CatalogEntry, Fundamentals, InvestmentSettings, LedgerError,
    PortfolioTotals, RiskLevel, Transaction, Valuation,
};
use filter::{OpportunityFilter, SortKey};

// ---------------------------------------------------------------------------
// Opportunity
// ---------------------------------------------------------------------------

/// A catalog entry quoted and scored for this session. Never persisted.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Opportunity {
    pub id: String,
    pub symbol: String,
    pub name: String,
    pub category: AssetCategory,
    pub sector: Option<String>,
    /// Simulated current price.
    pub price: f64,
    pub base_price: f64,
    pub price_change_24h: f64,
    /// Synthetic history, oldest first, ending at the base price.
    pub history: Vec<f64>,
    /// Undervaluation score, capped at the configured ceiling.
    pub score: f64,
    /// Score as a percentage of the ceiling.
    pub confidence: f64,
    pub valuation: Valuation,
    pub risk_score: u8,
    pub risk_level: RiskLevel,
    pub fundamentals: Fundamentals,
    pub rationale: Rationale,
}

impl Opportunity {
    pub fn quote(&self) -> AssetQuote {
        AssetQuote {
            id: self.id.clone(),
            symbol: self.symbol.clone(),
            name: self.name.clone(),
            category: self.category,
            price: self.price,
            price_change_24h: self.price_change_24h,
        }
    }
}

/// Quote the entry: an artificial dip with probability `dip_probability`,
/// otherwise the base price.
pub fn simulated_price<R: RandomSource + ?Sized>(
    base_price: f64,
    market: &MarketConfig,
    rng: &mut R,
) -> f64 {
    if rng.next() < market.dip_probability {
        base_price * (market.dip_min + rng.next() * (market.dip_max - market.dip_min))
    } else {
        base_price
    }
}

/// Build one opportunity from a catalog entry.
pub fn generate_opportunity<R: RandomSource + ?Sized>(
    entry: &CatalogEntry,
    market: &MarketConfig,
    rng: &mut R,
) -> Opportunity {
    let price = simulated_price(entry.base_price, market, rng);
    // History ends at the undipped base price so the dip shows up as a
    // drop below the moving average.
    let history = simulator::generate(
        rng,
        entry.base_price,
        market.history_days,
        entry.category.volatility(),
    );
    let score = scorer::score(price, &history, market.moving_average_period)
        .min(market.score_ceiling);
    let confidence = if market.score_ceiling > 0.0 {
        (score / market.score_ceiling * 100.0).clamp(0.0, 100.0)
    } else {
        0.0
    };
    let rationale = rationale::explain(entry, price, score, rng);

    Opportunity {
        id: entry.id.clone(),
        symbol: entry.symbol.clone(),
        name: entry.name.clone(),
        category: entry.category,
        sector: entry.sector.clone(),
        price,
        base_price: entry.base_price,
        price_change_24h: entry.price_change_24h,
        history,
        score,
        confidence,
        valuation: Valuation::from_score(score),
        risk_score: entry.risk_score,
        risk_level: entry.risk_level(),
        fundamentals: entry.fundamentals.clone(),
        rationale,
    }
}

// ---------------------------------------------------------------------------
// Receipts
// ---------------------------------------------------------------------------

/// An accepted dollar-amount buy.
#[derive(Debug, Clone, PartialEq)]
pub struct BuyReceipt {
    pub amount: f64,
    pub quantity: f64,
    pub outcome: BuyOutcome,
    /// Allowance left in the current period after this buy.
    pub remaining_in_period: f64,
}

/// Point-in-time view of the session.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    pub balance: f64,
    pub totals: PortfolioTotals,
    /// Cash plus holdings value.
    pub net_worth: f64,
    pub remaining_in_period: f64,
    pub transactions: usize,
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

pub struct OpportunityEngine<R: RandomSource> {
    config: AppConfig,
    catalog: Vec<CatalogEntry>,
    rng: R,
    wallet: WalletLedger,
    portfolio: PortfolioLedger,
    limiter: PeriodLimiter,
    settings: InvestmentSettings,
    store: Arc<dyn KeyValueStore>,
    opportunities: Vec<Opportunity>,
}

impl<R: RandomSource> OpportunityEngine<R> {
    /// Restore a session from `store`. Missing keys fall back to defaults:
    /// the configured opening balance and settings, empty holdings,
    /// history, log and spend log.
    pub fn restore(
        config: AppConfig,
        store: Arc<dyn KeyValueStore>,
        clock: Arc<dyn Clock>,
        ids: Arc<dyn IdGenerator>,
        rng: R,
    ) -> Self {
        let settings = match storage::load_json::<InvestmentSettings>(store.as_ref(), keys::SETTINGS) {
            Ok(Some(s)) => s,
            Ok(None) => config.settings.clone(),
            Err(e) => {
                warn!(error = %e, "Unreadable stored settings, using configured defaults");
                config.settings.clone()
            }
        };

        let wallet = WalletLedger::restore(
            config.session.initial_balance,
            clock.clone(),
            ids,
            store.clone(),
        );
        let portfolio = PortfolioLedger::restore(config.portfolio.history(), clock.clone(), store.clone());
        let limiter = PeriodLimiter::restore(
            settings.period_cap(),
            settings.period_frequency(),
            config.limits.spend_log_retention_periods,
            clock,
            store.clone(),
        );

        info!(
            session = %config.session.name,
            balance = format!("${:.2}", wallet.balance()),
            holdings = portfolio.holdings().len(),
            cap = format!("${:.2}", settings.period_cap()),
            frequency = %settings.period_frequency(),
            "Session restored"
        );

        Self {
            catalog: catalog::all().to_vec(),
            config,
            rng,
            wallet,
            portfolio,
            limiter,
            settings,
            store,
            opportunities: Vec::new(),
        }
    }

    /// Replace the catalog (clears any generated opportunities).
    pub fn with_catalog(mut self, catalog: Vec<CatalogEntry>) -> Self {
        self.catalog = catalog;
        self.opportunities.clear();
        self
    }

    // -----------------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------------

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn catalog(&self) -> &[CatalogEntry] {
        &self.catalog
    }

    pub fn settings(&self) -> &InvestmentSettings {
        &self.settings
    }

    pub fn wallet(&self) -> &WalletLedger {
        &self.wallet
    }

    pub fn portfolio(&self) -> &PortfolioLedger {
        &self.portfolio
    }

    pub fn limiter(&self) -> &PeriodLimiter {
        &self.limiter
    }

    pub fn opportunities(&self) -> &[Opportunity] {
        &self.opportunities
    }

    pub fn opportunity(&self, symbol: &str) -> Option<&Opportunity> {
        self.opportunities
            .iter()
            .find(|o| o.symbol.eq_ignore_ascii_case(symbol) || o.id.eq_ignore_ascii_case(symbol))
    }

    pub fn summary(&self) -> SessionSummary {
        let totals = self.portfolio.totals();
        SessionSummary {
            balance: self.wallet.balance(),
            totals,
            net_worth: self.wallet.balance() + totals.total_value,
            remaining_in_period: self.limiter.remaining(),
            transactions: self.wallet.transactions().len(),
        }
    }

    // -----------------------------------------------------------------------
    // Opportunities
    // -----------------------------------------------------------------------

    /// Quote and score every catalog entry, replacing the previous list,
    /// then re-mark held positions at the new quotes.
    pub fn generate_opportunities(&mut self) -> &[Opportunity] {
        let market = self.config.market.clone();
        let generated: Vec<Opportunity> = self
            .catalog
            .iter()
            .map(|entry| generate_opportunity(entry, &market, &mut self.rng))
            .collect();
        self.opportunities = generated;

        let undervalued = self
            .opportunities
            .iter()
            .filter(|o| o.valuation == Valuation::Undervalued)
            .count();
        info!(
            count = self.opportunities.len(),
            undervalued,
            "Opportunities generated"
        );

        let marked = self.mark_to_market();
        if marked > 0 {
            debug!(marked, "Holdings re-marked at session quotes");
        }
        &self.opportunities
    }

    /// Opportunities passing `filter`, ordered by `sort`.
    pub fn filtered(&self, filter: &OpportunityFilter, sort: SortKey) -> Vec<&Opportunity> {
        filter.apply(&self.opportunities, sort)
    }

    /// Opportunities visible under the current settings, best score first.
    pub fn visible(&self) -> Vec<&Opportunity> {
        self.filtered(
            &OpportunityFilter::from_settings(&self.settings),
            SortKey::Undervaluation,
        )
    }

    /// Current quote for `symbol`: the session quote when generated, else
    /// the catalog base price.
    pub fn quote(&self, symbol: &str) -> Result<AssetQuote, LedgerError> {
        if let Some(o) = self.opportunity(symbol) {
            return Ok(o.quote());
        }
        self.catalog
            .iter()
            .find(|e| e.symbol.eq_ignore_ascii_case(symbol) || e.id.eq_ignore_ascii_case(symbol))
            .map(|e| AssetQuote::from_entry(e, e.base_price))
            .ok_or_else(|| LedgerError::UnknownAsset(symbol.to_string()))
    }

    // -----------------------------------------------------------------------
    // Trading
    // -----------------------------------------------------------------------

    /// Invest `amount` dollars in `symbol` at its current quote.
    ///
    /// Rejected without any state change when the amount is invalid, the
    /// period allowance is too small or the wallet cannot cover it.
    pub fn buy(&mut self, symbol: &str, amount: f64) -> Result<BuyReceipt, LedgerError> {
        if !(amount.is_finite() && amount > 0.0) {
            return Err(LedgerError::InvalidAmount(amount));
        }
        let quote = self.quote(symbol)?;
        self.limiter.check(amount)?;

        let outcome = self.portfolio.buy_for(&mut self.wallet, &quote, amount)?;
        let quantity = outcome.transaction.quantity.unwrap_or(amount / quote.price);
        let remaining_in_period = self.limiter.record(amount);

        info!(
            symbol = %quote.symbol,
            amount = format!("${:.2}", amount),
            quantity = format!("{:.6}", quantity),
            remaining = format!("${:.2}", remaining_in_period),
            "Purchase complete"
        );

        Ok(BuyReceipt {
            amount,
            quantity,
            outcome,
            remaining_in_period,
        })
    }

    /// Sell `quantity` units of the holding in `symbol`.
    pub fn sell(&mut self, symbol: &str, quantity: f64) -> Result<SellOutcome, LedgerError> {
        let id = self
            .portfolio
            .holding_by_symbol(symbol)
            .map(|h| h.id.clone())
            .ok_or_else(|| LedgerError::HoldingNotFound(symbol.to_string()))?;
        self.portfolio.sell(&mut self.wallet, &id, quantity)
    }

    /// Close the whole position in `symbol`.
    pub fn sell_all(&mut self, symbol: &str) -> Result<SellOutcome, LedgerError> {
        let quantity = self
            .portfolio
            .holding_by_symbol(symbol)
            .map(|h| h.quantity)
            .ok_or_else(|| LedgerError::HoldingNotFound(symbol.to_string()))?;
        self.sell(symbol, quantity)
    }

    pub fn deposit(&mut self, amount: f64) -> Result<Transaction, LedgerError> {
        self.wallet.deposit(amount)
    }

    pub fn withdraw(&mut self, amount: f64) -> Result<Transaction, LedgerError> {
        self.wallet.withdraw(amount)
    }

    /// Re-mark `symbol` at an observed price.
    pub fn mark_price(&mut self, symbol: &str, price: f64) -> Result<PortfolioTotals, LedgerError> {
        self.portfolio.mark_price(symbol, price)
    }

    /// Re-mark every holding at its session quote. Returns the count repriced.
    pub fn mark_to_market(&mut self) -> usize {
        let quotes: Vec<(&str, f64)> = self
            .opportunities
            .iter()
            .map(|o| (o.symbol.as_str(), o.price))
            .collect();
        self.portfolio.mark_prices(quotes)
    }

    // -----------------------------------------------------------------------
    // Settings
    // -----------------------------------------------------------------------

    /// Replace the settings, persist them and reconfigure the limiter.
    pub fn update_settings(&mut self, settings: InvestmentSettings) {
        self.limiter
            .reconfigure(settings.period_cap(), settings.period_frequency());
        storage::persist(self.store.as_ref(), keys::SETTINGS, &settings);
        info!(
            threshold = settings.undervaluation_threshold,
            auto_invest = settings.auto_invest,
            "Settings updated"
        );
        self.settings = settings;
    }

    /// Restore the configured default settings.
    pub fn reset_settings(&mut self) {
        let defaults = self.config.settings.clone();
        self.update_settings(defaults);
    }

    // -----------------------------------------------------------------------
    // History
    // -----------------------------------------------------------------------

    pub fn poll_history(&mut self) -> bool {
        self.portfolio.poll_history().is_some()
    }

    pub fn flush_history(&mut self) -> bool {
        self.portfolio.flush_history().is_some()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
