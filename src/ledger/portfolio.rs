//! Portfolio ledger — holdings, cost basis and value history.
//!
//! Holdings are keyed by asset id. Every buy and sell is settled through
//! the [`WalletLedger`] first; a rejected settlement leaves the holdings
//! untouched. Totals are recomputed after each mutation and history
//! points are written through the debounced [`HistoryRecorder`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

use super::history::{HistoryConfig, HistoryRecorder};
use super::wallet::WalletLedger;
use crate::sources::Clock;
use crate::storage::{self, keys, KeyValueStore};
use crate::types::{
    AssetCategory, AssetQuote, HistoryPoint, Holding, LedgerError, PortfolioTotals, TradeRequest,
    TradeSide, Transaction,
};

/// Sells within this many units of the full position close it.
pub const QUANTITY_EPSILON: f64 = 1e-9;

/// Result of an accepted buy.
#[derive(Debug, Clone, PartialEq)]
pub struct BuyOutcome {
    pub transaction: Transaction,
    pub holding: Holding,
    pub totals: PortfolioTotals,
}

/// Result of an accepted sell.
#[derive(Debug, Clone, PartialEq)]
pub struct SellOutcome {
    pub transaction: Transaction,
    /// Remaining position, `None` once fully sold.
    pub holding: Option<Holding>,
    pub cost_basis_sold: f64,
    pub realized_profit_loss: f64,
    pub totals: PortfolioTotals,
}

/// Share of total value held in one category.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AllocationSlice {
    pub category: AssetCategory,
    pub value: f64,
    pub percentage: f64,
}

pub struct PortfolioLedger {
    holdings: Vec<Holding>,
    totals: PortfolioTotals,
    history: HistoryRecorder,
    clock: Arc<dyn Clock>,
    store: Arc<dyn KeyValueStore>,
}

impl std::fmt::Debug for PortfolioLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PortfolioLedger")
            .field("holdings", &self.holdings.len())
            .field("totals", &self.totals)
            .field("history", &self.history.points().len())
            .finish()
    }
}

impl PortfolioLedger {
    pub fn new(
        history_config: HistoryConfig,
        clock: Arc<dyn Clock>,
        store: Arc<dyn KeyValueStore>,
    ) -> Self {
        Self {
            holdings: Vec::new(),
            totals: PortfolioTotals::default(),
            history: HistoryRecorder::new(history_config),
            clock,
            store,
        }
    }

    /// Restore holdings and history from the store.
    pub fn restore(
        history_config: HistoryConfig,
        clock: Arc<dyn Clock>,
        store: Arc<dyn KeyValueStore>,
    ) -> Self {
        let mut holdings: Vec<Holding> = storage::load_or_default(store.as_ref(), keys::HOLDINGS);
        holdings.retain(|h| {
            let valid = h.quantity > 0.0 && h.quantity.is_finite();
            if !valid {
                warn!(symbol = %h.symbol, quantity = h.quantity, "Dropping stored holding with invalid quantity");
            }
            valid
        });
        for h in &mut holdings {
            h.revalue();
        }
        let points: Vec<HistoryPoint> = storage::load_or_default(store.as_ref(), keys::HISTORY);

        let ledger = Self {
            totals: PortfolioTotals::from_holdings(&holdings),
            holdings,
            history: HistoryRecorder::with_points(points, history_config),
            clock,
            store,
        };
        info!(
            holdings = ledger.holdings.len(),
            value = format!("${:.2}", ledger.totals.total_value),
            history = ledger.history.points().len(),
            "Portfolio restored"
        );
        ledger
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    pub fn holdings(&self) -> &[Holding] {
        &self.holdings
    }

    pub fn holding(&self, id: &str) -> Option<&Holding> {
        self.holdings.iter().find(|h| h.id == id)
    }

    pub fn holding_by_symbol(&self, symbol: &str) -> Option<&Holding> {
        self.holdings
            .iter()
            .find(|h| h.symbol.eq_ignore_ascii_case(symbol))
    }

    pub fn totals(&self) -> PortfolioTotals {
        self.totals
    }

    pub fn history(&self) -> &[HistoryPoint] {
        self.history.points()
    }

    pub fn history_pending(&self) -> bool {
        self.history.is_pending()
    }

    /// Value share per category, largest first. Empty when nothing is held.
    pub fn allocation(&self) -> Vec<AllocationSlice> {
        let total = self.totals.total_value;
        let mut slices: Vec<AllocationSlice> = Vec::new();
        for h in &self.holdings {
            match slices.iter_mut().find(|s| s.category == h.category) {
                Some(slice) => slice.value += h.value,
                None => slices.push(AllocationSlice {
                    category: h.category,
                    value: h.value,
                    percentage: 0.0,
                }),
            }
        }
        for slice in &mut slices {
            slice.percentage = if total > 0.0 {
                slice.value / total * 100.0
            } else {
                0.0
            };
        }
        slices.sort_by(|a, b| b.value.total_cmp(&a.value));
        slices
    }

    // -----------------------------------------------------------------------
    // Trades
    // -----------------------------------------------------------------------

    /// Buy `quantity` units at the quote's price.
    ///
    /// New positions open with cost basis `price * quantity`; existing ones
    /// add to both quantity and cost basis and take the new price.
    pub fn buy(
        &mut self,
        wallet: &mut WalletLedger,
        quote: &AssetQuote,
        quantity: f64,
    ) -> Result<BuyOutcome, LedgerError> {
        if !(quantity.is_finite() && quantity > 0.0) {
            return Err(LedgerError::InvalidQuantity(quantity));
        }
        self.settle_buy(wallet, quote, quantity, quote.price * quantity)
    }

    /// Spend exactly `amount` dollars at the quote's price. The cost basis
    /// added is `amount` itself, not the re-multiplied quantity.
    pub fn buy_for(
        &mut self,
        wallet: &mut WalletLedger,
        quote: &AssetQuote,
        amount: f64,
    ) -> Result<BuyOutcome, LedgerError> {
        if !(amount.is_finite() && amount > 0.0) {
            return Err(LedgerError::InvalidAmount(amount));
        }
        self.settle_buy(wallet, quote, amount / quote.price, amount)
    }

    fn settle_buy(
        &mut self,
        wallet: &mut WalletLedger,
        quote: &AssetQuote,
        quantity: f64,
        cost: f64,
    ) -> Result<BuyOutcome, LedgerError> {
        if !(quote.price.is_finite() && quote.price > 0.0) {
            return Err(LedgerError::InvalidAmount(quote.price));
        }
        if !(quantity.is_finite() && quantity > 0.0) {
            return Err(LedgerError::InvalidQuantity(quantity));
        }

        let now = self.clock.now();
        self.poll_history_at(now);

        let transaction = wallet.execute(&TradeRequest {
            side: TradeSide::Buy,
            amount: cost,
            asset: quote.symbol.clone(),
            price: quote.price,
            quantity,
        })?;

        let holding = match self.holdings.iter_mut().find(|h| h.id == quote.id) {
            Some(h) => {
                h.quantity += quantity;
                h.cost_basis += cost;
                h.price = quote.price;
                h.price_change_24h = quote.price_change_24h;
                h.last_transaction_at = now;
                h.revalue();
                h.clone()
            }
            None => {
                let h = Holding::open(quote, quantity, cost, now);
                self.holdings.push(h.clone());
                h
            }
        };

        self.after_mutation(now);
        info!(
            symbol = %holding.symbol,
            quantity,
            price = format!("${:.2}", quote.price),
            cost = format!("${:.2}", cost),
            held = holding.quantity,
            "Bought"
        );

        Ok(BuyOutcome {
            transaction,
            holding,
            totals: self.totals,
        })
    }

    /// Sell `quantity` units of the holding `holding_id` at its current price.
    ///
    /// Cost basis leaves the position in proportion to the units sold;
    /// selling the whole position removes it.
    pub fn sell(
        &mut self,
        wallet: &mut WalletLedger,
        holding_id: &str,
        quantity: f64,
    ) -> Result<SellOutcome, LedgerError> {
        if !(quantity.is_finite() && quantity > 0.0) {
            return Err(LedgerError::InvalidQuantity(quantity));
        }
        let index = self
            .holdings
            .iter()
            .position(|h| h.id == holding_id)
            .ok_or_else(|| LedgerError::HoldingNotFound(holding_id.to_string()))?;

        let held = &self.holdings[index];
        if quantity > held.quantity + QUANTITY_EPSILON {
            return Err(LedgerError::InsufficientHoldings {
                symbol: held.symbol.clone(),
                requested: quantity,
                owned: held.quantity,
            });
        }
        let closes = quantity >= held.quantity - QUANTITY_EPSILON;
        let sold = if closes { held.quantity } else { quantity };
        let price = held.price;
        let proceeds = price * sold;
        let cost_basis_sold = if closes {
            held.cost_basis
        } else {
            held.cost_basis / held.quantity * sold
        };
        let symbol = held.symbol.clone();

        let now = self.clock.now();
        self.poll_history_at(now);

        let transaction = wallet.execute(&TradeRequest {
            side: TradeSide::Sell,
            amount: proceeds,
            asset: symbol.clone(),
            price,
            quantity: sold,
        })?;

        let holding = if closes {
            self.holdings.remove(index);
            None
        } else {
            let h = &mut self.holdings[index];
            h.quantity -= sold;
            h.cost_basis -= cost_basis_sold;
            h.last_transaction_at = now;
            h.revalue();
            Some(h.clone())
        };

        self.after_mutation(now);
        let realized_profit_loss = proceeds - cost_basis_sold;
        info!(
            symbol = %symbol,
            quantity = sold,
            proceeds = format!("${:.2}", proceeds),
            realized = format!("${:.2}", realized_profit_loss),
            closed = closes,
            "Sold"
        );

        Ok(SellOutcome {
            transaction,
            holding,
            cost_basis_sold,
            realized_profit_loss,
            totals: self.totals,
        })
    }

    // -----------------------------------------------------------------------
    // Marking
    // -----------------------------------------------------------------------

    /// Update one holding's price and revalue it.
    pub fn mark_price(&mut self, symbol: &str, price: f64) -> Result<PortfolioTotals, LedgerError> {
        if !(price.is_finite() && price > 0.0) {
            return Err(LedgerError::InvalidAmount(price));
        }
        let index = self
            .holdings
            .iter()
            .position(|h| h.symbol.eq_ignore_ascii_case(symbol))
            .ok_or_else(|| LedgerError::HoldingNotFound(symbol.to_string()))?;

        let now = self.clock.now();
        self.poll_history_at(now);

        let holding = &mut self.holdings[index];
        holding.price = price;
        holding.revalue();
        self.after_mutation(now);
        Ok(self.totals)
    }

    /// Mark every held symbol found in `quotes`; unknown symbols are ignored.
    /// Returns the number of holdings repriced.
    pub fn mark_prices<'a>(&mut self, quotes: impl IntoIterator<Item = (&'a str, f64)>) -> usize {
        let now = self.clock.now();
        let mut marked = 0;
        for (symbol, price) in quotes {
            if !(price.is_finite() && price > 0.0) {
                continue;
            }
            if let Some(h) = self
                .holdings
                .iter_mut()
                .find(|h| h.symbol.eq_ignore_ascii_case(symbol))
            {
                if h.price != price {
                    h.price = price;
                    h.revalue();
                    marked += 1;
                }
            }
        }
        if marked > 0 {
            self.poll_history_at(now);
            self.after_mutation(now);
        }
        marked
    }

    // -----------------------------------------------------------------------
    // History
    // -----------------------------------------------------------------------

    /// Write the pending history point if its quiet window has elapsed.
    pub fn poll_history(&mut self) -> Option<HistoryPoint> {
        let now = self.clock.now();
        self.poll_history_at(now)
    }

    /// Write any pending history point immediately (shutdown).
    pub fn flush_history(&mut self) -> Option<HistoryPoint> {
        let now = self.clock.now();
        let point = self.history.flush(now, &self.totals);
        if point.is_some() {
            self.persist_history();
        }
        point
    }

    fn poll_history_at(&mut self, now: DateTime<Utc>) -> Option<HistoryPoint> {
        let point = self.history.poll(now, &self.totals);
        if point.is_some() {
            self.persist_history();
        }
        point
    }

    fn after_mutation(&mut self, now: DateTime<Utc>) {
        self.totals = PortfolioTotals::from_holdings(&self.holdings);
        self.history.touch(now);
        storage::persist(self.store.as_ref(), keys::HOLDINGS, &self.holdings);
    }

    fn persist_history(&self) {
        storage::persist(self.store.as_ref(), keys::HISTORY, self.history.points());
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
