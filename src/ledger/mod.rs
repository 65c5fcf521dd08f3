//! Ledgers: cash, holdings, value history and the per-period spend cap.
//!
//! The wallet owns cash; the portfolio owns positions and routes every
//! trade through the wallet; the limiter gates buys by period.

pub mod history;
pub mod limiter;
pub mod portfolio;
pub mod wallet;

pub use history::{HistoryConfig, HistoryRecorder};
pub use limiter::PeriodLimiter;
pub use portfolio::{AllocationSlice, BuyOutcome, PortfolioLedger, SellOutcome};
pub use wallet::WalletLedger;
