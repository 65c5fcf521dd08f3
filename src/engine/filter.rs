//! Opportunity filtering and ordering.

use std::cmp::Ordering;

use super::Opportunity;
use crate::types::{AssetCategory, InvestmentSettings, RiskLevel, Valuation};

/// Criteria an opportunity must meet to be listed. Empty lists mean "any".
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OpportunityFilter {
    pub categories: Vec<AssetCategory>,
    pub min_score: f64,
    pub risk_levels: Vec<RiskLevel>,
    pub min_price: Option<f64>,
    pub max_price: Option<f64>,
    pub valuations: Vec<Valuation>,
    /// Entries without a sector always pass.
    pub sectors: Vec<String>,
}

impl OpportunityFilter {
    /// Enabled asset types, the undervaluation threshold and every risk
    /// level up to the configured tolerance.
    pub fn from_settings(settings: &InvestmentSettings) -> Self {
        Self {
            categories: settings.asset_types.enabled(),
            min_score: settings.undervaluation_threshold,
            risk_levels: [RiskLevel::Low, RiskLevel::Medium, RiskLevel::High]
                .into_iter()
                .filter(|r| *r <= settings.risk_level)
                .collect(),
            ..Self::default()
        }
    }

    pub fn matches(&self, o: &Opportunity) -> bool {
        if !self.categories.is_empty() && !self.categories.contains(&o.category) {
            return false;
        }
        if o.score < self.min_score {
            return false;
        }
        if !self.risk_levels.is_empty() && !self.risk_levels.contains(&o.risk_level) {
            return false;
        }
        if self.min_price.is_some_and(|min| o.price < min) {
            return false;
        }
        if self.max_price.is_some_and(|max| o.price > max) {
            return false;
        }
        if !self.valuations.is_empty() && !self.valuations.contains(&o.valuation) {
            return false;
        }
        if let Some(sector) = &o.sector {
            if !self.sectors.is_empty() && !self.sectors.iter().any(|s| s == sector) {
                return false;
            }
        }
        true
    }

    /// Matching opportunities, ordered by `sort`.
    pub fn apply<'a>(&self, opportunities: &'a [Opportunity], sort: SortKey) -> Vec<&'a Opportunity> {
        let mut out: Vec<&Opportunity> = opportunities.iter().filter(|o| self.matches(o)).collect();
        out.sort_by(|a, b| sort.compare(a, b));
        out
    }
}

/// List ordering.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortKey {
    /// Highest score first.
    #[default]
    Undervaluation,
    /// Cheapest first.
    Price,
    Name,
    /// Lowest risk score first.
    Risk,
}

impl SortKey {
    pub fn compare(&self, a: &Opportunity, b: &Opportunity) -> Ordering {
        match self {
            SortKey::Undervaluation => b.score.total_cmp(&a.score),
            SortKey::Price => a.price.total_cmp(&b.price),
            SortKey::Name => a.name.to_lowercase().cmp(&b.name.to_lowercase()),
            SortKey::Risk => a.risk_score.cmp(&b.risk_score),
        }
    }
}

impl std::str::FromStr for SortKey {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "undervaluation" | "score" => Ok(SortKey::Undervaluation),
            "price" => Ok(SortKey::Price),
            "name" => Ok(SortKey::Name),
            "risk" => Ok(SortKey::Risk),
            _ => Err(anyhow::anyhow!("Unknown sort key: {s}")),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::Rationale;
    use crate::types::{AssetTypeToggles, Fundamentals};

    fn opp(symbol: &str, category: AssetCategory, price: f64, score: f64, risk: u8) -> Opportunity {
        Opportunity {
            id: symbol.to_lowercase(),
            symbol: symbol.to_string(),
            name: format!("{symbol} Holdings"),
            category,
            sector: Some("Technology".to_string()),
            price,
            base_price: price,
            price_change_24h: 0.0,
            history: Vec::new(),
            score,
            confidence: score * 2.0,
            valuation: Valuation::from_score(score),
            risk_score: risk,
            risk_level: RiskLevel::from_score(risk),
            fundamentals: Fundamentals::default(),
            rationale: Rationale::default(),
        }
    }

    fn sample() -> Vec<Opportunity> {
        vec![
            opp("AAA", AssetCategory::Stock, 50.0, 30.0, 20),
            opp("BBB", AssetCategory::Crypto, 5.0, 12.0, 80),
            opp("CCC", AssetCategory::Etf, 400.0, 22.0, 45),
            opp("DDD", AssetCategory::Stock, 150.0, 3.0, 10),
        ]
    }

    fn symbols(v: &[&Opportunity]) -> Vec<String> {
        v.iter().map(|o| o.symbol.clone()).collect()
    }

    #[test]
    fn test_default_filter_passes_all() {
        let opps = sample();
        assert_eq!(OpportunityFilter::default().apply(&opps, SortKey::Name).len(), 4);
    }

    #[test]
    fn test_from_settings() {
        let settings = InvestmentSettings {
            undervaluation_threshold: 10.0,
            risk_level: RiskLevel::Medium,
            asset_types: AssetTypeToggles {
                etfs: false,
                ..Default::default()
            },
            ..Default::default()
        };
        let opps = sample();
        let out = OpportunityFilter::from_settings(&settings).apply(&opps, SortKey::Undervaluation);
        // BBB is high risk, CCC is an ETF, DDD is below threshold.
        assert_eq!(symbols(&out), vec!["AAA"]);
    }

    #[test]
    fn test_price_range_and_valuation() {
        let opps = sample();
        let f = OpportunityFilter {
            min_price: Some(10.0),
            max_price: Some(400.0),
            valuations: vec![Valuation::Undervalued],
            ..Default::default()
        };
        assert_eq!(symbols(&f.apply(&opps, SortKey::Price)), vec!["AAA", "CCC"]);
    }

    #[test]
    fn test_sector_filter_keeps_unsectored() {
        let mut opps = sample();
        opps[1].sector = None;
        let f = OpportunityFilter {
            sectors: vec!["Healthcare".to_string()],
            ..Default::default()
        };
        assert_eq!(symbols(&f.apply(&opps, SortKey::Name)), vec!["BBB"]);
    }

    #[test]
    fn test_sort_orders() {
        let opps = sample();
        let all = OpportunityFilter::default();
        assert_eq!(
            symbols(&all.apply(&opps, SortKey::Undervaluation)),
            vec!["AAA", "CCC", "BBB", "DDD"]
        );
        assert_eq!(
            symbols(&all.apply(&opps, SortKey::Price)),
            vec!["BBB", "AAA", "DDD", "CCC"]
        );
        assert_eq!(
            symbols(&all.apply(&opps, SortKey::Risk)),
            vec!["DDD", "AAA", "CCC", "BBB"]
        );
    }

    #[test]
    fn test_sort_key_from_str() {
        assert_eq!("Price".parse::<SortKey>().unwrap(), SortKey::Price);
        assert!("volume".parse::<SortKey>().is_err());
    }
}
