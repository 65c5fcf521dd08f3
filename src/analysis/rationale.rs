//! Human-readable reasons attached to an opportunity.
//!
//! Reasons are tagged by score thresholds: technical signals appear above
//! 5, oversold/sentiment signals above 15, pattern and ownership signals
//! above 25. Category fundamentals come from the catalog entry.

use serde::{Deserialize, Serialize};

use crate::sources::RandomSource;
use crate::types::{AssetCategory, CatalogEntry};

/// Below this score the summary reports fair value.
const FAIR_VALUE_SCORE: f64 = 10.0;

/// Above this score every reason category gets at least one entry.
const FALLBACK_SCORE: f64 = 20.0;

/// Generated explanation for an undervaluation score.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Rationale {
    pub summary: String,
    pub technical: Vec<String>,
    pub fundamental: Vec<String>,
    pub sentiment: Vec<String>,
}

impl Rationale {
    /// Total number of detailed reasons.
    pub fn len(&self) -> usize {
        self.technical.len() + self.fundamental.len() + self.sentiment.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Build the summary and detailed reasons for `entry` quoted at `price`.
pub fn explain<R: RandomSource + ?Sized>(
    entry: &CatalogEntry,
    price: f64,
    score: f64,
    rng: &mut R,
) -> Rationale {
    Rationale {
        summary: summary(entry, score, rng),
        technical: technical(entry, price, score),
        fundamental: fundamental(entry, score, rng),
        sentiment: sentiment(score, rng),
    }
    .with_fallbacks(entry, score)
}

impl Rationale {
    fn with_fallbacks(mut self, entry: &CatalogEntry, score: f64) -> Self {
        if score > FALLBACK_SCORE {
            if self.technical.is_empty() {
                self.technical.push(format!(
                    "{} is showing a potential reversal pattern on the daily chart.",
                    entry.symbol
                ));
            }
            if self.fundamental.is_empty() {
                self.fundamental.push(format!(
                    "{} is trading at a discount to its intrinsic value based on discounted cash flow analysis.",
                    entry.symbol
                ));
            }
            if self.sentiment.is_empty() {
                self.sentiment.push(
                    "Analyst sentiment has become overly negative, creating a potential contrarian opportunity."
                        .to_string(),
                );
            }
        }
        self
    }
}

/// Two distinct technical reasons, or the fair-value sentence for low scores.
fn summary<R: RandomSource + ?Sized>(entry: &CatalogEntry, score: f64, rng: &mut R) -> String {
    if score < FAIR_VALUE_SCORE {
        return "This asset is currently trading at or near its fair value based on our analysis \
                of historical price patterns, moving averages, and market indicators."
            .to_string();
    }

    let s = &entry.symbol;
    let mut pool = vec![
        format!("{s} is trading below its 50-day moving average, suggesting a potential buying opportunity."),
        format!("Recent market sentiment has pushed {s} below its historical support levels, indicating possible undervaluation."),
        format!("Technical indicators like RSI suggest {s} may be oversold, potentially creating a buying opportunity."),
        format!("{s} has experienced a temporary dip due to market volatility unrelated to its fundamentals."),
    ];

    let mut picked = Vec::with_capacity(2);
    for _ in 0..2 {
        let i = rng.index(pool.len());
        picked.push(pool.remove(i));
    }
    picked.join(" ")
}

fn technical(entry: &CatalogEntry, price: f64, score: f64) -> Vec<String> {
    let s = &entry.symbol;
    let mut out = Vec::new();
    if score > 5.0 {
        out.push(format!("{s} is trading below its 50-day moving average."));
        if score > 15.0 {
            out.push(format!("RSI indicator shows {s} is in oversold territory at 28."));
        }
        if score > 25.0 {
            out.push(format!(
                "{s} has formed a bullish divergence pattern on the MACD indicator."
            ));
            out.push(format!(
                "Price is testing a major support level at {}.",
                format_usd(price * 0.95)
            ));
        }
    }
    out
}

fn fundamental<R: RandomSource + ?Sized>(
    entry: &CatalogEntry,
    score: f64,
    rng: &mut R,
) -> Vec<String> {
    let f = &entry.fundamentals;
    let s = &entry.symbol;
    let mut out = Vec::new();

    match entry.category {
        AssetCategory::Stock | AssetCategory::Reit => {
            if let Some(pe) = f.pe_ratio.filter(|v| *v < 25.0) {
                out.push(format!(
                    "P/E ratio of {pe:.1} is below industry average of {:.1}.",
                    pe * 1.2
                ));
            }
            if let Some(fpe) = f.forward_pe.filter(|v| *v < 15.0) {
                out.push(format!(
                    "Forward P/E of {fpe:.1} suggests attractive valuation relative to growth prospects."
                ));
            }
            if let Some(de) = f.debt_to_equity.filter(|v| *v < 35.0) {
                out.push(format!(
                    "Low debt-to-equity ratio of {de:.1}% indicates strong balance sheet health."
                ));
            }
            if let Some(g) = f.eps_growth.filter(|v| *v > 15.0) {
                out.push(format!(
                    "Strong earnings growth of {g:.1}% exceeds industry average of {:.1}%.",
                    g * 0.7
                ));
            }
            if let Some(peg) = f.peg_ratio.filter(|v| *v < 1.2) {
                out.push(format!(
                    "PEG ratio of {peg:.2} shows good value relative to growth rate (below 1.2 is considered attractive)."
                ));
            }
        }
        AssetCategory::Crypto => {
            if score > 10.0 {
                out.push(format!(
                    "{s} is trading below its realized price (average cost basis of all holders)."
                ));
                out.push(
                    "Network activity metrics show increasing adoption despite price decline."
                        .to_string(),
                );
            }
        }
        AssetCategory::Etf | AssetCategory::Index => {
            if score > 10.0 {
                out.push("Current price-to-book ratio is below 5-year average.".to_string());
                out.push(format!(
                    "Dividend yield of {:.2}% is above historical average.",
                    rng.next() * 2.0 + 1.5
                ));
            }
        }
    }
    out
}

fn sentiment<R: RandomSource + ?Sized>(score: f64, rng: &mut R) -> Vec<String> {
    let mut out = Vec::new();
    if score > 15.0 {
        out.push(
            "Market sentiment indicators show excessive pessimism, often a contrarian buy signal."
                .to_string(),
        );
        if score > 25.0 {
            out.push(format!(
                "Institutional ownership has increased by {}% in the last quarter.",
                (rng.next() * 10.0 + 5.0).floor() as u32
            ));
            out.push("Recent negative news has created a short-term overreaction in price.".to_string());
        }
    }
    out
}

/// `$1,234.56` style formatting.
pub fn format_usd(value: f64) -> String {
    let negative = value < 0.0;
    let cents = (value.abs() * 100.0).round() as u64;
    let dollars = (cents / 100).to_string();
    let mut grouped = String::with_capacity(dollars.len() + dollars.len() / 3);
    for (i, ch) in dollars.chars().enumerate() {
        if i > 0 && (dollars.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    format!("{}${grouped}.{:02}", if negative { "-" } else { "" }, cents % 100)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
