//! Shared types for the DIPBUYER core.
//!
//! These types form the data model used across all modules: catalog
//! entries, holdings, wallet transactions, history points, spend records,
//! investment settings and the domain error enum. Persisted records use
//! camelCase field names so the stored JSON blobs stay stable.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Profit/loss percentage is undefined below this cost basis.
const MIN_COST_BASIS: f64 = 1e-12;

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// Asset class of a catalog entry or holding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssetCategory {
    Stock,
    Etf,
    Crypto,
    Reit,
    Index,
}

impl AssetCategory {
    /// All known categories (useful for iteration).
    pub const ALL: &'static [AssetCategory] = &[
        AssetCategory::Stock,
        AssetCategory::Etf,
        AssetCategory::Crypto,
        AssetCategory::Reit,
        AssetCategory::Index,
    ];

    /// Relative daily volatility used when simulating price history.
    pub fn volatility(&self) -> f64 {
        match self {
            AssetCategory::Crypto => 0.04,
            AssetCategory::Stock => 0.02,
            AssetCategory::Etf | AssetCategory::Reit | AssetCategory::Index => 0.01,
        }
    }
}

impl fmt::Display for AssetCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AssetCategory::Stock => write!(f, "Stock"),
            AssetCategory::Etf => write!(f, "ETF"),
            AssetCategory::Crypto => write!(f, "Crypto"),
            AssetCategory::Reit => write!(f, "REIT"),
            AssetCategory::Index => write!(f, "Index"),
        }
    }
}

/// Parse a category name (case-insensitive, singular or plural).
impl std::str::FromStr for AssetCategory {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "stock" | "stocks" => Ok(AssetCategory::Stock),
            "etf" | "etfs" => Ok(AssetCategory::Etf),
            "crypto" | "cryptocurrency" => Ok(AssetCategory::Crypto),
            "reit" | "reits" => Ok(AssetCategory::Reit),
            "index" | "indices" | "indexes" => Ok(AssetCategory::Index),
            _ => Err(anyhow::anyhow!("Unknown asset category: {s}")),
        }
    }
}

/// Qualitative risk bucket derived from a 0–100 risk score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl RiskLevel {
    /// Bucket a risk score: ≤30 low, ≤60 medium, otherwise high.
    pub fn from_score(risk_score: u8) -> Self {
        if risk_score <= 30 {
            RiskLevel::Low
        } else if risk_score <= 60 {
            RiskLevel::Medium
        } else {
            RiskLevel::High
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RiskLevel::Low => write!(f, "Low Risk"),
            RiskLevel::Medium => write!(f, "Medium Risk"),
            RiskLevel::High => write!(f, "High Risk"),
        }
    }
}

impl std::str::FromStr for RiskLevel {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "low" => Ok(RiskLevel::Low),
            "medium" | "med" => Ok(RiskLevel::Medium),
            "high" => Ok(RiskLevel::High),
            _ => Err(anyhow::anyhow!("Unknown risk level: {s}")),
        }
    }
}

/// Valuation tag derived from the undervaluation score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Valuation {
    Undervalued,
    Fair,
    Overvalued,
}

impl Valuation {
    /// Score above 20 is undervalued, above 5 fair, otherwise overvalued.
    pub fn from_score(score: f64) -> Self {
        if score > 20.0 {
            Valuation::Undervalued
        } else if score > 5.0 {
            Valuation::Fair
        } else {
            Valuation::Overvalued
        }
    }
}

impl fmt::Display for Valuation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Valuation::Undervalued => write!(f, "Undervalued"),
            Valuation::Fair => write!(f, "Fair"),
            Valuation::Overvalued => write!(f, "Overvalued"),
        }
    }
}

/// Bucket size for the per-period investment cap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Frequency {
    Hourly,
    Daily,
    Weekly,
    Monthly,
}

impl fmt::Display for Frequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Frequency::Hourly => write!(f, "hourly"),
            Frequency::Daily => write!(f, "daily"),
            Frequency::Weekly => write!(f, "weekly"),
            Frequency::Monthly => write!(f, "monthly"),
        }
    }
}

impl std::str::FromStr for Frequency {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "hourly" | "hour" => Ok(Frequency::Hourly),
            "daily" | "day" => Ok(Frequency::Daily),
            "weekly" | "week" => Ok(Frequency::Weekly),
            "monthly" | "month" => Ok(Frequency::Monthly),
            _ => Err(anyhow::anyhow!("Unknown frequency: {s}")),
        }
    }
}

// ---------------------------------------------------------------------------
// Catalog
// ---------------------------------------------------------------------------

/// Optional fundamentals attached to a catalog entry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Fundamentals {
    pub pe_ratio: Option<f64>,
    pub forward_pe: Option<f64>,
    pub debt_to_equity: Option<f64>,
    pub eps_growth: Option<f64>,
    pub peg_ratio: Option<f64>,
    pub market_cap: Option<f64>,
}

/// Static, immutable asset definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogEntry {
    pub id: String,
    pub symbol: String,
    pub name: String,
    pub category: AssetCategory,
    pub sector: Option<String>,
    pub base_price: f64,
    pub price_change_24h: f64,
    /// Qualitative risk score (0–100).
    pub risk_score: u8,
    pub fundamentals: Fundamentals,
}

impl fmt::Display for CatalogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({}) [{}] ${:.2} risk={}",
            self.symbol, self.name, self.category, self.base_price, self.risk_score,
        )
    }
}

impl CatalogEntry {
    pub fn risk_level(&self) -> RiskLevel {
        RiskLevel::from_score(self.risk_score)
    }
}

/// The asset information a buy needs: identity plus the quote to trade at.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetQuote {
    pub id: String,
    pub symbol: String,
    pub name: String,
    pub category: AssetCategory,
    pub price: f64,
    pub price_change_24h: f64,
}

impl AssetQuote {
    /// Quote a catalog entry at the given price.
    pub fn from_entry(entry: &CatalogEntry, price: f64) -> Self {
        Self {
            id: entry.id.clone(),
            symbol: entry.symbol.clone(),
            name: entry.name.clone(),
            category: entry.category,
            price,
            price_change_24h: entry.price_change_24h,
        }
    }
}

// ---------------------------------------------------------------------------
// Holdings
// ---------------------------------------------------------------------------

/// A portfolio position in one symbol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Holding {
    pub id: String,
    pub symbol: String,
    pub name: String,
    #[serde(rename = "type")]
    pub category: AssetCategory,
    /// Last trade price or quote.
    pub price: f64,
    pub price_change_24h: f64,
    pub quantity: f64,
    pub value: f64,
    /// Dollars paid for the current quantity, net of partial sells.
    pub cost_basis: f64,
    pub profit_loss: f64,
    pub profit_loss_percentage: f64,
    pub last_transaction_at: DateTime<Utc>,
}

impl fmt::Display for Holding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.profit_loss >= 0.0 { "+" } else { "" };
        write!(
            f,
            "{} qty={:.6} @ ${:.2} val=${:.2} basis=${:.2} ({sign}{:.2}, {sign}{:.2}%)",
            self.symbol,
            self.quantity,
            self.price,
            self.value,
            self.cost_basis,
            self.profit_loss,
            self.profit_loss_percentage,
        )
    }
}

impl Holding {
    /// Open a fresh position from a filled buy.
    pub fn open(quote: &AssetQuote, quantity: f64, cost: f64, at: DateTime<Utc>) -> Self {
        let mut holding = Self {
            id: quote.id.clone(),
            symbol: quote.symbol.clone(),
            name: quote.name.clone(),
            category: quote.category,
            price: quote.price,
            price_change_24h: quote.price_change_24h,
            quantity,
            value: 0.0,
            cost_basis: cost,
            profit_loss: 0.0,
            profit_loss_percentage: 0.0,
            last_transaction_at: at,
        };
        holding.revalue();
        holding
    }

    /// Average cost per unit currently held.
    pub fn average_cost(&self) -> f64 {
        if self.quantity > 0.0 {
            self.cost_basis / self.quantity
        } else {
            0.0
        }
    }

    /// Recompute value and P&L from price, quantity and cost basis.
    pub fn revalue(&mut self) {
        self.value = self.price * self.quantity;
        self.profit_loss = self.value - self.cost_basis;
        self.profit_loss_percentage = profit_loss_percentage(self.profit_loss, self.cost_basis);
    }
}

/// P&L as a percentage of cost basis, zero when there is no basis.
pub fn profit_loss_percentage(profit_loss: f64, cost_basis: f64) -> f64 {
    if cost_basis > MIN_COST_BASIS {
        profit_loss / cost_basis * 100.0
    } else {
        0.0
    }
}

/// Aggregate view of the holdings map, recomputed on every mutation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PortfolioTotals {
    pub total_value: f64,
    pub total_cost_basis: f64,
    pub total_profit_loss: f64,
    pub total_profit_loss_percentage: f64,
    pub holdings: usize,
}

impl fmt::Display for PortfolioTotals {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "value=${:.2} basis=${:.2} P&L=${:.2} ({:.2}%) holdings={}",
            self.total_value,
            self.total_cost_basis,
            self.total_profit_loss,
            self.total_profit_loss_percentage,
            self.holdings,
        )
    }
}

impl PortfolioTotals {
    /// Sum a set of holdings.
    pub fn from_holdings<'a>(holdings: impl IntoIterator<Item = &'a Holding>) -> Self {
        let mut totals = PortfolioTotals::default();
        for h in holdings {
            totals.total_value += h.value;
            totals.total_cost_basis += h.cost_basis;
            totals.holdings += 1;
        }
        totals.total_profit_loss = totals.total_value - totals.total_cost_basis;
        totals.total_profit_loss_percentage =
            profit_loss_percentage(totals.total_profit_loss, totals.total_cost_basis);
        totals
    }

    pub fn is_empty(&self) -> bool {
        self.holdings == 0
    }
}

/// One timestamped sample of total portfolio value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HistoryPoint {
    #[serde(rename = "date")]
    pub timestamp: DateTime<Utc>,
    pub value: f64,
}

// ---------------------------------------------------------------------------
// Wallet
// ---------------------------------------------------------------------------

/// Wallet transaction kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionKind {
    Deposit,
    Withdrawal,
    Buy,
    Sell,
}

impl fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransactionKind::Deposit => write!(f, "DEPOSIT"),
            TransactionKind::Withdrawal => write!(f, "WITHDRAWAL"),
            TransactionKind::Buy => write!(f, "BUY"),
            TransactionKind::Sell => write!(f, "SELL"),
        }
    }
}

/// Only `Completed` is produced by the simulation; the others exist so
/// older stored logs still deserialize.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    Completed,
    Pending,
    Failed,
}

/// Append-only wallet log entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: TransactionKind,
    pub amount: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub asset: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quantity: Option<f64>,
    pub timestamp: DateTime<Utc>,
    pub status: TransactionStatus,
}

impl fmt::Display for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {} ${:.2}", self.id, self.kind, self.amount)?;
        if let (Some(asset), Some(qty), Some(price)) = (&self.asset, self.quantity, self.price) {
            write!(f, " ({qty:.6} {asset} @ ${price:.2})")?;
        }
        Ok(())
    }
}

/// Side of a trade routed through the wallet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeSide {
    Buy,
    Sell,
}

impl From<TradeSide> for TransactionKind {
    fn from(side: TradeSide) -> Self {
        match side {
            TradeSide::Buy => TransactionKind::Buy,
            TradeSide::Sell => TransactionKind::Sell,
        }
    }
}

/// A buy or sell to settle against the wallet's cash balance.
#[derive(Debug, Clone, PartialEq)]
pub struct TradeRequest {
    pub side: TradeSide,
    /// Dollar amount moved.
    pub amount: f64,
    pub asset: String,
    pub price: f64,
    pub quantity: f64,
}

// ---------------------------------------------------------------------------
// Period spend log
// ---------------------------------------------------------------------------

/// Dollars invested within one period bucket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpendRecord {
    pub period_key: String,
    pub amount: f64,
}

// ---------------------------------------------------------------------------
// Investment settings
// ---------------------------------------------------------------------------

/// Which asset classes the user wants to see and invest in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AssetTypeToggles {
    pub stocks: bool,
    pub etfs: bool,
    pub crypto: bool,
    pub reits: bool,
    pub indices: bool,
}

impl Default for AssetTypeToggles {
    fn default() -> Self {
        Self {
            stocks: true,
            etfs: true,
            crypto: true,
            reits: true,
            indices: true,
        }
    }
}

impl AssetTypeToggles {
    pub fn allows(&self, category: AssetCategory) -> bool {
        match category {
            AssetCategory::Stock => self.stocks,
            AssetCategory::Etf => self.etfs,
            AssetCategory::Crypto => self.crypto,
            AssetCategory::Reit => self.reits,
            AssetCategory::Index => self.indices,
        }
    }

    /// The enabled categories, in catalog order.
    pub fn enabled(&self) -> Vec<AssetCategory> {
        AssetCategory::ALL
            .iter()
            .copied()
            .filter(|c| self.allows(*c))
            .collect()
    }
}

/// User investment preferences, persisted under the settings key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct InvestmentSettings {
    /// Minimum undervaluation score for an opportunity to be shown.
    pub undervaluation_threshold: f64,
    pub risk_level: RiskLevel,
    pub asset_types: AssetTypeToggles,
    pub max_budget_per_trade: f64,
    pub auto_invest: bool,
    pub auto_invest_amount: Option<f64>,
    pub auto_invest_frequency: Option<Frequency>,
    pub auto_invest_only_undervalued: bool,
    pub auto_invest_min_confidence_enabled: bool,
    pub auto_invest_min_confidence: f64,
    pub auto_invest_max_risk_level: RiskLevel,
}

impl Default for InvestmentSettings {
    fn default() -> Self {
        Self {
            undervaluation_threshold: 10.0,
            risk_level: RiskLevel::Medium,
            asset_types: AssetTypeToggles::default(),
            max_budget_per_trade: 1000.0,
            auto_invest: false,
            auto_invest_amount: Some(10_000.0),
            auto_invest_frequency: Some(Frequency::Hourly),
            auto_invest_only_undervalued: true,
            auto_invest_min_confidence_enabled: true,
            auto_invest_min_confidence: 80.0,
            auto_invest_max_risk_level: RiskLevel::Medium,
        }
    }
}

impl InvestmentSettings {
    /// Dollars investable per period: the auto-invest amount, else the per-trade budget.
    pub fn period_cap(&self) -> f64 {
        self.auto_invest_amount.unwrap_or(self.max_budget_per_trade)
    }

    /// Bucket size for the cap, daily when unset.
    pub fn period_frequency(&self) -> Frequency {
        self.auto_invest_frequency.unwrap_or(Frequency::Daily)
    }
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Rejected ledger operations. A rejection never mutates state.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum LedgerError {
    #[error("Insufficient funds: need ${needed:.2}, have ${available:.2}")]
    InsufficientFunds { needed: f64, available: f64 },

    #[error("Insufficient holdings of {symbol}: requested {requested}, own {owned}")]
    InsufficientHoldings {
        symbol: String,
        requested: f64,
        owned: f64,
    },

    #[error("Period cap exceeded: requested ${requested:.2}, remaining ${remaining:.2} of ${cap:.2}")]
    PeriodCapExceeded {
        requested: f64,
        remaining: f64,
        cap: f64,
    },

    #[error("Invalid quantity: {0}")]
    InvalidQuantity(f64),

    #[error("Invalid amount: {0}")]
    InvalidAmount(f64),

    #[error("Holding not found: {0}")]
    HoldingNotFound(String),

    #[error("Unknown asset: {0}")]
    UnknownAsset(String),
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
