//! Wallet ledger — the single source of truth for cash.
//!
//! Holds the cash balance and an append-only transaction log. Every
//! accepted operation appends a `Completed` transaction and persists the
//! balance and log; rejected operations change nothing.

use std::sync::Arc;
use tracing::{info, warn};

use crate::sources::{Clock, IdGenerator};
use crate::storage::{self, keys, KeyValueStore};
use crate::types::{
    LedgerError, TradeRequest, TradeSide, Transaction, TransactionKind, TransactionStatus,
};

pub struct WalletLedger {
    balance: f64,
    /// Oldest first.
    transactions: Vec<Transaction>,
    clock: Arc<dyn Clock>,
    ids: Arc<dyn IdGenerator>,
    store: Arc<dyn KeyValueStore>,
}

impl std::fmt::Debug for WalletLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WalletLedger")
            .field("balance", &self.balance)
            .field("transactions", &self.transactions.len())
            .finish()
    }
}

impl WalletLedger {
    /// Fresh wallet with an opening balance and an empty log.
    pub fn new(
        initial_balance: f64,
        clock: Arc<dyn Clock>,
        ids: Arc<dyn IdGenerator>,
        store: Arc<dyn KeyValueStore>,
    ) -> Self {
        Self {
            balance: initial_balance,
            transactions: Vec::new(),
            clock,
            ids,
            store,
        }
    }

    /// Restore balance and log from the store; missing keys fall back to
    /// `initial_balance` and an empty log.
    pub fn restore(
        initial_balance: f64,
        clock: Arc<dyn Clock>,
        ids: Arc<dyn IdGenerator>,
        store: Arc<dyn KeyValueStore>,
    ) -> Self {
        let balance = match storage::load_json::<f64>(store.as_ref(), keys::BALANCE) {
            Ok(Some(b)) if b.is_finite() => b,
            Ok(Some(b)) => {
                warn!(balance = b, "Stored balance is not finite, using initial balance");
                initial_balance
            }
            Ok(None) => initial_balance,
            Err(e) => {
                warn!(error = %e, "Unreadable stored balance, using initial balance");
                initial_balance
            }
        };
        let mut transactions: Vec<Transaction> =
            storage::load_or_default(store.as_ref(), keys::TRANSACTIONS);
        transactions.sort_by_key(|t| t.timestamp);

        info!(
            balance = format!("${:.2}", balance),
            transactions = transactions.len(),
            "Wallet restored"
        );

        Self {
            balance,
            transactions,
            clock,
            ids,
            store,
        }
    }

    pub fn balance(&self) -> f64 {
        self.balance
    }

    /// Full log, oldest first.
    pub fn transactions(&self) -> &[Transaction] {
        &self.transactions
    }

    /// The `n` most recent transactions, newest first.
    pub fn recent_transactions(&self, n: usize) -> impl Iterator<Item = &Transaction> {
        self.transactions.iter().rev().take(n)
    }

    /// Add cash. Rejects non-positive or non-finite amounts.
    pub fn deposit(&mut self, amount: f64) -> Result<Transaction, LedgerError> {
        validate_amount(amount)?;
        self.balance += amount;
        let tx = self.append(TransactionKind::Deposit, amount, None);
        info!(
            amount = format!("${:.2}", amount),
            balance = format!("${:.2}", self.balance),
            "Deposit"
        );
        Ok(tx)
    }

    /// Remove cash. Rejects non-positive amounts and amounts above the balance.
    pub fn withdraw(&mut self, amount: f64) -> Result<Transaction, LedgerError> {
        validate_amount(amount)?;
        if amount > self.balance {
            return Err(LedgerError::InsufficientFunds {
                needed: amount,
                available: self.balance,
            });
        }
        self.balance -= amount;
        let tx = self.append(TransactionKind::Withdrawal, amount, None);
        info!(
            amount = format!("${:.2}", amount),
            balance = format!("${:.2}", self.balance),
            "Withdrawal"
        );
        Ok(tx)
    }

    /// Settle a trade against cash. Buys above the balance are rejected;
    /// sells always credit (the caller checks the holding covers them).
    pub fn execute(&mut self, request: &TradeRequest) -> Result<Transaction, LedgerError> {
        validate_amount(request.amount)?;

        match request.side {
            TradeSide::Buy => {
                if request.amount > self.balance {
                    warn!(
                        asset = %request.asset,
                        needed = format!("${:.2}", request.amount),
                        available = format!("${:.2}", self.balance),
                        "Buy rejected: insufficient funds"
                    );
                    return Err(LedgerError::InsufficientFunds {
                        needed: request.amount,
                        available: self.balance,
                    });
                }
                self.balance -= request.amount;
            }
            TradeSide::Sell => {
                self.balance += request.amount;
            }
        }

        let tx = self.append(request.side.into(), request.amount, Some(request));
        info!(
            side = ?request.side,
            asset = %request.asset,
            amount = format!("${:.2}", request.amount),
            balance = format!("${:.2}", self.balance),
            "Trade settled"
        );
        Ok(tx)
    }

    fn append(
        &mut self,
        kind: TransactionKind,
        amount: f64,
        trade: Option<&TradeRequest>,
    ) -> Transaction {
        let tx = Transaction {
            id: self.ids.next_id(),
            kind,
            amount,
            asset: trade.map(|t| t.asset.clone()),
            price: trade.map(|t| t.price),
            quantity: trade.map(|t| t.quantity),
            timestamp: self.clock.now(),
            status: TransactionStatus::Completed,
        };
        self.transactions.push(tx.clone());
        self.persist();
        tx
    }

    fn persist(&self) {
        storage::persist(self.store.as_ref(), keys::BALANCE, &self.balance);
        storage::persist(self.store.as_ref(), keys::TRANSACTIONS, &self.transactions);
    }
}

fn validate_amount(amount: f64) -> Result<(), LedgerError> {
    if amount.is_finite() && amount > 0.0 {
        Ok(())
    } else {
        Err(LedgerError::InvalidAmount(amount))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::{ManualClock, SequentialIds};
    use crate::storage::{MemoryStore, MockKeyValueStore};
    use chrono::{TimeZone, Utc};

    fn clock() -> Arc<ManualClock> {
        Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2024, 3, 15, 10, 0, 0).unwrap(),
        ))
    }

    fn wallet_with(store: Arc<dyn KeyValueStore>, balance: f64) -> WalletLedger {
        WalletLedger::new(balance, clock(), Arc::new(SequentialIds::new()), store)
    }

    fn wallet(balance: f64) -> WalletLedger {
        wallet_with(Arc::new(MemoryStore::new()), balance)
    }

    fn buy(amount: f64) -> TradeRequest {
        TradeRequest {
            side: TradeSide::Buy,
            amount,
            asset: "AAPL".to_string(),
            price: 100.0,
            quantity: amount / 100.0,
        }
    }

    fn sell(amount: f64) -> TradeRequest {
        TradeRequest {
            side: TradeSide::Sell,
            ..buy(amount)
        }
    }

    #[test]
    fn test_deposit() {
        let mut w = wallet(100.0);
        let tx = w.deposit(50.0).unwrap();
        assert_eq!(w.balance(), 150.0);
        assert_eq!(tx.kind, TransactionKind::Deposit);
        assert_eq!(tx.status, TransactionStatus::Completed);
        assert_eq!(tx.id, "tx-1");
        assert_eq!(w.transactions().len(), 1);
    }

    #[test]
    fn test_deposit_rejects_non_positive() {
        let mut w = wallet(100.0);
        assert_eq!(w.deposit(0.0), Err(LedgerError::InvalidAmount(0.0)));
        assert_eq!(w.deposit(-5.0), Err(LedgerError::InvalidAmount(-5.0)));
        assert!(w.deposit(f64::NAN).is_err());
        assert_eq!(w.balance(), 100.0);
        assert!(w.transactions().is_empty());
    }

    #[test]
    fn test_withdraw() {
        let mut w = wallet(100.0);
        let tx = w.withdraw(40.0).unwrap();
        assert_eq!(tx.kind, TransactionKind::Withdrawal);
        assert_eq!(w.balance(), 60.0);
    }

    #[test]
    fn test_withdraw_rejects_over_balance() {
        let mut w = wallet(100.0);
        assert_eq!(
            w.withdraw(100.01),
            Err(LedgerError::InsufficientFunds {
                needed: 100.01,
                available: 100.0
            })
        );
        assert!(w.withdraw(0.0).is_err());
        assert_eq!(w.balance(), 100.0);
        assert!(w.transactions().is_empty());
        // Withdrawing the exact balance is allowed.
        w.withdraw(100.0).unwrap();
        assert_eq!(w.balance(), 0.0);
    }

    #[test]
    fn test_buy_debits() {
        let mut w = wallet(10_000.0);
        let tx = w.execute(&buy(1000.0)).unwrap();
        assert_eq!(w.balance(), 9000.0);
        assert_eq!(tx.kind, TransactionKind::Buy);
        assert_eq!(tx.asset.as_deref(), Some("AAPL"));
        assert_eq!(tx.quantity, Some(10.0));
    }

    #[test]
    fn test_buy_over_balance_rejected_silently() {
        let mut w = wallet(500.0);
        let err = w.execute(&buy(500.01)).unwrap_err();
        assert!(matches!(err, LedgerError::InsufficientFunds { .. }));
        assert_eq!(w.balance(), 500.0);
        assert!(w.transactions().is_empty());
    }

    #[test]
    fn test_sell_always_credits() {
        let mut w = wallet(0.0);
        w.execute(&sell(600.0)).unwrap();
        assert_eq!(w.balance(), 600.0);
        assert_eq!(w.transactions()[0].kind, TransactionKind::Sell);
    }

    #[test]
    fn test_trade_rejects_invalid_amount() {
        let mut w = wallet(100.0);
        assert!(w.execute(&sell(-10.0)).is_err());
        assert!(w.execute(&buy(f64::INFINITY)).is_err());
        assert_eq!(w.balance(), 100.0);
    }

    #[test]
    fn test_balance_conservation() {
        let mut w = wallet(1000.0);
        let mut expected = 1000.0;
        let ops: Vec<(&str, f64)> = vec![
            ("deposit", 250.0),
            ("buy", 400.0),
            ("withdraw", 2000.0), // rejected
            ("sell", 120.5),
            ("buy", 5000.0), // rejected
            ("withdraw", 70.25),
            ("deposit", -3.0), // rejected
            ("buy", 899.0),
        ];
        for (op, amount) in ops {
            let accepted = match op {
                "deposit" => w.deposit(amount).is_ok(),
                "withdraw" => w.withdraw(amount).is_ok(),
                "buy" => w.execute(&buy(amount)).is_ok(),
                "sell" => w.execute(&sell(amount)).is_ok(),
                _ => unreachable!(),
            };
            if accepted {
                expected += match op {
                    "deposit" | "sell" => amount,
                    _ => -amount,
                };
            }
        }
        assert!((w.balance() - expected).abs() < 1e-9);
        assert_eq!(w.transactions().len(), 5);
        assert!(w.balance() >= 0.0);
    }

    #[test]
    fn test_recent_transactions_newest_first() {
        let mut w = wallet(0.0);
        w.deposit(1.0).unwrap();
        w.deposit(2.0).unwrap();
        w.deposit(3.0).unwrap();
        let recent: Vec<f64> = w.recent_transactions(2).map(|t| t.amount).collect();
        assert_eq!(recent, vec![3.0, 2.0]);
    }

    #[test]
    fn test_persists_and_restores() {
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        let mut w = wallet_with(store.clone(), 10_000.0);
        w.deposit(500.0).unwrap();
        w.execute(&buy(1500.0)).unwrap();

        let restored = WalletLedger::restore(
            10_000.0,
            clock(),
            Arc::new(SequentialIds::new()),
            store,
        );
        assert_eq!(restored.balance(), 9000.0);
        assert_eq!(restored.transactions().len(), 2);
        assert_eq!(restored.transactions()[1].kind, TransactionKind::Buy);
    }

    #[test]
    fn test_restore_defaults_when_empty() {
        let w = WalletLedger::restore(
            10_000.0,
            clock(),
            Arc::new(SequentialIds::new()),
            Arc::new(MemoryStore::new()),
        );
        assert_eq!(w.balance(), 10_000.0);
        assert!(w.transactions().is_empty());
    }

    #[test]
    fn test_persistence_failure_keeps_state() {
        let mut store = MockKeyValueStore::new();
        store
            .expect_set()
            .returning(|_, _| Err(anyhow::anyhow!("quota exceeded")));
        let mut w = wallet_with(Arc::new(store), 100.0);

        w.deposit(25.0).unwrap();
        assert_eq!(w.balance(), 125.0);
        assert_eq!(w.transactions().len(), 1);
    }
}
