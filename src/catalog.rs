//! Static asset catalog.
//!
//! Base prices, 24h changes, risk scores and fundamentals are fixed demo
//! values; every session derives its simulated quotes from them.

use std::sync::OnceLock;

use crate::types::{AssetCategory, CatalogEntry, Fundamentals};

/// The full catalog, built once.
pub fn all() -> &'static [CatalogEntry] {
    static CATALOG: OnceLock<Vec<CatalogEntry>> = OnceLock::new();
    CATALOG.get_or_init(build)
}

/// Look up an entry by symbol or id (case-insensitive).
pub fn find(symbol_or_id: &str) -> Option<&'static CatalogEntry> {
    all().iter().find(|e| {
        e.symbol.eq_ignore_ascii_case(symbol_or_id) || e.id.eq_ignore_ascii_case(symbol_or_id)
    })
}

/// Distinct sectors, in catalog order.
pub fn sectors() -> Vec<&'static str> {
    let mut out: Vec<&'static str> = Vec::new();
    for sector in all().iter().filter_map(|e| e.sector.as_deref()) {
        if !out.contains(&sector) {
            out.push(sector);
        }
    }
    out
}

struct Row {
    symbol: &'static str,
    name: &'static str,
    category: AssetCategory,
    sector: Option<&'static str>,
    price: f64,
    change_24h: f64,
    risk: u8,
    market_cap: f64,
}

impl Row {
    fn into_entry(self, fundamentals: Fundamentals) -> CatalogEntry {
        CatalogEntry {
            id: self.symbol.to_lowercase(),
            symbol: self.symbol.to_string(),
            name: self.name.to_string(),
            category: self.category,
            sector: self.sector.map(str::to_string),
            base_price: self.price,
            price_change_24h: self.change_24h,
            risk_score: self.risk,
            fundamentals: Fundamentals {
                market_cap: Some(self.market_cap),
                ..fundamentals
            },
        }
    }
}

/// Equity with the full ratio set: (P/E, forward P/E, D/E, EPS growth, PEG).
fn equity(row: Row, ratios: (f64, f64, f64, f64, f64)) -> CatalogEntry {
    let (pe, fpe, de, eps, peg) = ratios;
    row.into_entry(Fundamentals {
        pe_ratio: Some(pe),
        forward_pe: Some(fpe),
        debt_to_equity: Some(de),
        eps_growth: Some(eps),
        peg_ratio: Some(peg),
        market_cap: None,
    })
}

/// Fund or index with valuation multiples only.
fn fund(row: Row, pe: f64, fpe: f64) -> CatalogEntry {
    row.into_entry(Fundamentals {
        pe_ratio: Some(pe),
        forward_pe: Some(fpe),
        ..Fundamentals::default()
    })
}

fn coin(row: Row) -> CatalogEntry {
    row.into_entry(Fundamentals::default())
}

macro_rules! row {
    ($sym:expr, $name:expr, $cat:ident, $sector:expr, $price:expr, $chg:expr, $risk:expr, $cap:expr) => {
        Row {
            symbol: $sym,
            name: $name,
            category: AssetCategory::$cat,
            sector: $sector,
            price: $price,
            change_24h: $chg,
            risk: $risk,
            market_cap: $cap,
        }
    };
}

fn build() -> Vec<CatalogEntry> {
    vec![
        equity(row!("AAPL", "Apple Inc.", Stock, Some("Technology"), 175.25, -2.3, 30, 2.75e12), (28.5, 24.2, 112.5, 8.1, 3.52)),
        equity(row!("MSFT", "Microsoft Corporation", Stock, Some("Technology"), 325.42, -1.8, 25, 2.42e12), (34.2, 29.8, 42.1, 16.2, 2.11)),
        equity(row!("AMZN", "Amazon.com, Inc.", Stock, Some("Consumer Cyclical"), 132.65, -3.1, 40, 1.37e12), (52.1, 36.5, 81.3, 22.4, 2.33)),
        fund(row!("SPY", "SPDR S&P 500 ETF Trust", Etf, Some("Broad Market"), 430.15, -1.5, 20, 3.8e11), 22.5, 19.2),
        fund(row!("QQQ", "Invesco QQQ Trust", Etf, Some("Technology"), 365.78, -2.1, 25, 1.8e11), 28.3, 24.1),
        coin(row!("BTC", "Bitcoin", Crypto, None, 42_500.25, -4.2, 70, 8.3e11)),
        coin(row!("ETH", "Ethereum", Crypto, None, 2_250.75, -5.1, 65, 2.7e11)),
        coin(row!("SOL", "Solana", Crypto, None, 105.32, -6.8, 80, 4.5e10)),
        equity(row!("NVDA", "NVIDIA Corporation", Stock, Some("Technology"), 875.28, 1.2, 45, 2.16e12), (64.3, 32.1, 41.2, 125.3, 0.51)),
        equity(row!("GOOGL", "Alphabet Inc.", Stock, Some("Communication Services"), 142.65, -0.8, 30, 1.79e12), (24.1, 19.8, 12.5, 28.2, 0.85)),
        equity(row!("JNJ", "Johnson & Johnson", Stock, Some("Healthcare"), 152.32, 0.5, 15, 3.68e11), (17.2, 14.8, 32.1, 16.5, 1.04)),
        equity(row!("KO", "The Coca-Cola Company", Stock, Some("Consumer Defensive"), 62.15, 0.3, 10, 2.68e11), (24.8, 21.3, 156.2, 8.2, 3.02)),
        equity(row!("DIS", "The Walt Disney Company", Stock, Some("Communication Services"), 112.48, -1.2, 35, 2.05e11), (19.5, 14.2, 42.8, 18.3, 1.06)),
        fund(row!("VTI", "Vanguard Total Stock Market ETF", Etf, Some("Broad Market"), 235.42, -1.1, 20, 3.2e11), 21.8, 18.5),
        fund(row!("VOO", "Vanguard S&P 500 ETF", Etf, Some("Broad Market"), 395.28, -1.3, 20, 2.9e11), 22.5, 19.2),
        coin(row!("BNB", "Binance Coin", Crypto, None, 580.15, -3.5, 75, 8.9e10)),
        coin(row!("ADA", "Cardano", Crypto, None, 0.45, -2.8, 80, 1.6e10)),
        equity(row!("O", "Realty Income Corporation", Reit, Some("Real Estate"), 52.35, 0.8, 25, 3.7e10), (18.2, 14.5, 84.2, 5.8, 3.14)),
        equity(row!("AMT", "American Tower Corporation", Reit, Some("Real Estate"), 185.42, -0.5, 30, 8.6e10), (22.1, 18.3, 315.2, 12.5, 1.77)),
        fund(row!("SPX", "S&P 500 Index", Index, Some("Broad Market"), 4_780.35, -0.8, 20, 4.0e13), 22.5, 19.2),
        fund(row!("DJI", "Dow Jones Industrial Average", Index, Some("Broad Market"), 38_765.82, -0.6, 15, 1.2e13), 21.3, 18.7),
        fund(row!("NDX", "Nasdaq 100 Index", Index, Some("Technology"), 16_832.92, -1.2, 25, 1.8e13), 28.4, 24.6),
        fund(row!("RUT", "Russell 2000 Index", Index, Some("Small Cap"), 2_042.58, -1.5, 35, 2.5e12), 19.8, 17.2),
        equity(row!("TSLA", "Tesla, Inc.", Stock, Some("Consumer Cyclical"), 248.5, -2.7, 60, 7.9e11), (70.2, 58.3, 12.8, 35.2, 2.0)),
        equity(row!("META", "Meta Platforms, Inc.", Stock, Some("Communication Services"), 485.39, 1.8, 40, 1.24e12), (26.3, 21.5, 10.2, 42.1, 0.62)),
        equity(row!("V", "Visa Inc.", Stock, Some("Financial Services"), 275.85, 0.3, 20, 5.6e11), (30.8, 25.2, 68.7, 15.8, 1.95)),
        equity(row!("MA", "Mastercard Incorporated", Stock, Some("Financial Services"), 458.12, 0.5, 20, 4.25e11), (36.2, 29.8, 214.5, 14.2, 2.55)),
        equity(row!("PYPL", "PayPal Holdings, Inc.", Stock, Some("Financial Services"), 62.35, -1.2, 45, 6.5e10), (17.5, 15.2, 52.3, 8.5, 2.06)),
        equity(row!("SQ", "Block, Inc.", Stock, Some("Financial Services"), 75.42, -2.8, 55, 4.6e10), (85.7, 25.3, 30.2, 18.7, 4.58)),
        equity(row!("AVGO", "Broadcom Inc.", Stock, Some("Technology"), 1_325.75, 0.9, 35, 6.15e11), (48.2, 22.5, 189.5, 32.1, 1.5)),
        equity(row!("AMD", "Advanced Micro Devices, Inc.", Stock, Some("Technology"), 158.32, -1.5, 50, 2.55e11), (145.2, 32.8, 5.8, 45.3, 3.2)),
        equity(row!("INTC", "Intel Corporation", Stock, Some("Technology"), 31.25, -2.1, 40, 1.32e11), (32.5, 22.3, 42.7, -15.2, -2.14)),
        coin(row!("DOT", "Polkadot", Crypto, None, 6.85, -4.2, 85, 9.8e9)),
        coin(row!("LINK", "Chainlink", Crypto, None, 14.25, -3.8, 80, 8.5e9)),
        coin(row!("XRP", "XRP", Crypto, None, 0.52, -2.5, 75, 2.85e10)),
        coin(row!("DOGE", "Dogecoin", Crypto, None, 0.12, -5.2, 90, 1.72e10)),
        fund(row!("SCHD", "Schwab US Dividend Equity ETF", Etf, Some("Dividend"), 78.45, -0.3, 15, 5.2e10), 15.8, 14.2),
        fund(row!("VGT", "Vanguard Information Technology ETF", Etf, Some("Technology"), 485.25, -1.2, 30, 6.5e10), 32.5, 28.3),
        fund(row!("VDC", "Vanguard Consumer Staples ETF", Etf, Some("Consumer Defensive"), 205.75, 0.2, 10, 7.5e9), 22.8, 20.5),
    ]
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_catalog_size_and_unique_symbols() {
        assert_eq!(all().len(), 39);
        let symbols: HashSet<_> = all().iter().map(|e| e.symbol.as_str()).collect();
        assert_eq!(symbols.len(), 39);
    }

    #[test]
    fn test_every_category_present() {
        for cat in AssetCategory::ALL {
            assert!(all().iter().any(|e| e.category == *cat), "missing {cat}");
        }
    }

    #[test]
    fn test_find_by_symbol_or_id() {
        let aapl = find("aapl").unwrap();
        assert_eq!(aapl.symbol, "AAPL");
        assert_eq!(aapl.id, "aapl");
        assert_eq!(aapl.fundamentals.peg_ratio, Some(3.52));
        assert!(find("NOPE").is_none());
    }

    #[test]
    fn test_crypto_has_no_ratios() {
        let btc = find("BTC").unwrap();
        assert!(btc.fundamentals.pe_ratio.is_none());
        assert_eq!(btc.fundamentals.market_cap, Some(8.3e11));
        assert!(btc.sector.is_none());
    }

    #[test]
    fn test_prices_and_risk_valid() {
        for e in all() {
            assert!(e.base_price > 0.0, "{}", e.symbol);
            assert!(e.risk_score <= 100, "{}", e.symbol);
        }
    }

    #[test]
    fn test_sectors_distinct() {
        let s = sectors();
        assert!(s.contains(&"Technology"));
        assert!(s.contains(&"Real Estate"));
        let unique: HashSet<_> = s.iter().collect();
        assert_eq!(unique.len(), s.len());
    }
}
