//! Per-period investment cap.
//!
//! Spending is bucketed by a period key derived from the clock (hour,
//! day, ISO week or month). A buy is allowed only while the bucket's
//! running total plus the buy stays within the cap.

use chrono::{DateTime, Datelike, Duration, Months, Utc};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::sources::Clock;
use crate::storage::{self, keys, KeyValueStore};
use crate::types::{Frequency, LedgerError, SpendRecord};

/// Cap comparisons tolerate this much floating-point drift.
const CAP_TOLERANCE: f64 = 1e-9;

// ---------------------------------------------------------------------------
// Period keys
// ---------------------------------------------------------------------------

/// Bucket key for `now`: `YYYY-MM-DDTHH`, `YYYY-MM-DD`, `YYYY-Www` or `YYYY-MM`.
pub fn period_key(frequency: Frequency, now: DateTime<Utc>) -> String {
    match frequency {
        Frequency::Hourly => now.format("%Y-%m-%dT%H").to_string(),
        Frequency::Daily => now.format("%Y-%m-%d").to_string(),
        Frequency::Weekly => {
            let week = now.iso_week();
            format!("{}-W{:02}", week.year(), week.week())
        }
        Frequency::Monthly => now.format("%Y-%m").to_string(),
    }
}

/// Dollars already spent in the bucket containing `now`.
pub fn spent(frequency: Frequency, now: DateTime<Utc>, log: &[SpendRecord]) -> f64 {
    let key = period_key(frequency, now);
    log.iter()
        .filter(|r| r.period_key == key)
        .map(|r| r.amount)
        .sum()
}

/// `max(0, cap - spent)` for the bucket containing `now`.
pub fn remaining(cap: f64, frequency: Frequency, now: DateTime<Utc>, log: &[SpendRecord]) -> f64 {
    (cap - spent(frequency, now, log)).max(0.0)
}

/// Append one record per purchase, keyed by the bucket containing `now`.
pub fn record(frequency: Frequency, now: DateTime<Utc>, amount: f64, log: &mut Vec<SpendRecord>) {
    log.push(SpendRecord {
        period_key: period_key(frequency, now),
        amount,
    });
}

/// Key of the oldest bucket kept when retaining `periods` buckets back from `now`.
fn cutoff_key(frequency: Frequency, now: DateTime<Utc>, periods: u32) -> String {
    let n = i64::from(periods);
    let cutoff = match frequency {
        Frequency::Hourly => now.checked_sub_signed(Duration::hours(n)),
        Frequency::Daily => now.checked_sub_signed(Duration::days(n)),
        Frequency::Weekly => now.checked_sub_signed(Duration::weeks(n)),
        Frequency::Monthly => now.checked_sub_months(Months::new(periods)),
    };
    period_key(frequency, cutoff.unwrap_or(now))
}

// ---------------------------------------------------------------------------
// Limiter
// ---------------------------------------------------------------------------

/// Stateful cap enforcement with a persisted spend log.
pub struct PeriodLimiter {
    cap: f64,
    frequency: Frequency,
    retention_periods: u32,
    log: Vec<SpendRecord>,
    clock: Arc<dyn Clock>,
    store: Arc<dyn KeyValueStore>,
}

impl std::fmt::Debug for PeriodLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PeriodLimiter")
            .field("cap", &self.cap)
            .field("frequency", &self.frequency)
            .field("retention_periods", &self.retention_periods)
            .field("log", &self.log)
            .finish()
    }
}

impl PeriodLimiter {
    pub fn new(
        cap: f64,
        frequency: Frequency,
        retention_periods: u32,
        clock: Arc<dyn Clock>,
        store: Arc<dyn KeyValueStore>,
    ) -> Self {
        Self {
            cap,
            frequency,
            retention_periods,
            log: Vec::new(),
            clock,
            store,
        }
    }

    /// Restore the spend log from the store.
    pub fn restore(
        cap: f64,
        frequency: Frequency,
        retention_periods: u32,
        clock: Arc<dyn Clock>,
        store: Arc<dyn KeyValueStore>,
    ) -> Self {
        let mut log: Vec<SpendRecord> = storage::load_or_default(store.as_ref(), keys::SPEND_LOG);
        log.retain(|r| r.amount.is_finite() && r.amount >= 0.0);
        debug!(records = log.len(), "Spend log restored");
        Self {
            log,
            ..Self::new(cap, frequency, retention_periods, clock, store)
        }
    }

    pub fn cap(&self) -> f64 {
        self.cap
    }

    pub fn frequency(&self) -> Frequency {
        self.frequency
    }

    pub fn log(&self) -> &[SpendRecord] {
        &self.log
    }

    /// Apply new settings. Existing records stay; a frequency change
    /// simply starts matching a different key shape.
    pub fn reconfigure(&mut self, cap: f64, frequency: Frequency) {
        if self.cap != cap || self.frequency != frequency {
            info!(
                cap = format!("${:.2}", cap),
                frequency = %frequency,
                "Period cap updated"
            );
        }
        self.cap = cap;
        self.frequency = frequency;
    }

    pub fn current_key(&self) -> String {
        period_key(self.frequency, self.clock.now())
    }

    pub fn spent(&self) -> f64 {
        spent(self.frequency, self.clock.now(), &self.log)
    }

    pub fn remaining(&self) -> f64 {
        remaining(self.cap, self.frequency, self.clock.now(), &self.log)
    }

    /// Ok with the remaining allowance when `amount` fits in the current bucket.
    pub fn check(&self, amount: f64) -> Result<f64, LedgerError> {
        if !(amount.is_finite() && amount > 0.0) {
            return Err(LedgerError::InvalidAmount(amount));
        }
        let remaining = self.remaining();
        if amount > remaining + CAP_TOLERANCE {
            warn!(
                requested = format!("${:.2}", amount),
                remaining = format!("${:.2}", remaining),
                cap = format!("${:.2}", self.cap),
                frequency = %self.frequency,
                "Period cap reached"
            );
            return Err(LedgerError::PeriodCapExceeded {
                requested: amount,
                remaining,
                cap: self.cap,
            });
        }
        Ok(remaining)
    }

    /// Count `amount` against the current bucket, prune old buckets and
    /// persist. Returns the allowance left afterwards.
    pub fn record(&mut self, amount: f64) -> f64 {
        let now = self.clock.now();
        record(self.frequency, now, amount, &mut self.log);
        self.prune_at(now);
        storage::persist(self.store.as_ref(), keys::SPEND_LOG, &self.log);
        remaining(self.cap, self.frequency, now, &self.log)
    }

    /// Drop buckets older than the retention window, and any bucket whose
    /// key does not match the current frequency. Returns the count removed.
    pub fn prune(&mut self) -> usize {
        let now = self.clock.now();
        let removed = self.prune_at(now);
        if removed > 0 {
            storage::persist(self.store.as_ref(), keys::SPEND_LOG, &self.log);
        }
        removed
    }

    fn prune_at(&mut self, now: DateTime<Utc>) -> usize {
        let cutoff = cutoff_key(self.frequency, now, self.retention_periods);
        let before = self.log.len();
        // Same-shape keys sort chronologically as strings.
        self.log
            .retain(|r| r.period_key.len() == cutoff.len() && r.period_key >= cutoff);
        let removed = before - self.log.len();
        if removed > 0 {
            debug!(removed, cutoff = %cutoff, "Spend log pruned");
        }
        removed
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::ManualClock;
    use crate::storage::MemoryStore;
    use chrono::TimeZone;

    fn at(y: i32, m: u32, d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, 30, 0).unwrap()
    }

    fn limiter(cap: f64, frequency: Frequency) -> (Arc<ManualClock>, Arc<MemoryStore>, PeriodLimiter) {
        let clock = Arc::new(ManualClock::new(at(2024, 3, 15, 10)));
        let store = Arc::new(MemoryStore::new());
        let l = PeriodLimiter::new(cap, frequency, 48, clock.clone(), store.clone());
        (clock, store, l)
    }

    // -- Keys --

    #[test]
    fn test_period_keys() {
        let now = at(2024, 3, 5, 7);
        assert_eq!(period_key(Frequency::Hourly, now), "2024-03-05T07");
        assert_eq!(period_key(Frequency::Daily, now), "2024-03-05");
        assert_eq!(period_key(Frequency::Weekly, now), "2024-W10");
        assert_eq!(period_key(Frequency::Monthly, now), "2024-03");
    }

    #[test]
    fn test_weekly_key_uses_iso_year() {
        // 2024-12-30 is a Monday in ISO week 1 of 2025.
        assert_eq!(period_key(Frequency::Weekly, at(2024, 12, 30, 0)), "2025-W01");
        // 2021-01-01 belongs to ISO week 53 of 2020.
        assert_eq!(period_key(Frequency::Weekly, at(2021, 1, 1, 0)), "2020-W53");
    }

    // -- Free functions --

    #[test]
    fn test_spent_and_remaining_by_bucket() {
        let now = at(2024, 3, 15, 10);
        let mut log = Vec::new();
        record(Frequency::Daily, now, 600.0, &mut log);
        record(Frequency::Daily, now, 150.0, &mut log);
        record(Frequency::Daily, at(2024, 3, 14, 10), 999.0, &mut log);

        assert_eq!(log.len(), 3);
        assert_eq!(spent(Frequency::Daily, now, &log), 750.0);
        assert_eq!(remaining(1000.0, Frequency::Daily, now, &log), 250.0);
        assert_eq!(remaining(500.0, Frequency::Daily, now, &log), 0.0);
    }

    // -- Limiter --

    #[test]
    fn test_cap_blocks_second_buy() {
        let (_clock, _store, mut l) = limiter(1000.0, Frequency::Daily);
        assert_eq!(l.check(600.0), Ok(1000.0));
        assert_eq!(l.record(600.0), 400.0);

        let err = l.check(600.0).unwrap_err();
        assert_eq!(
            err,
            LedgerError::PeriodCapExceeded {
                requested: 600.0,
                remaining: 400.0,
                cap: 1000.0
            }
        );
        assert!(l.check(400.0).is_ok());
    }

    #[test]
    fn test_each_purchase_is_its_own_record() {
        let (_clock, store, mut l) = limiter(1000.0, Frequency::Daily);
        l.record(100.0);
        l.record(250.0);
        assert_eq!(l.record(50.0), 600.0);

        let amounts: Vec<f64> = l.log().iter().map(|r| r.amount).collect();
        assert_eq!(amounts, vec![100.0, 250.0, 50.0]);
        assert!(l.log().iter().all(|r| r.period_key == "2024-03-15"));

        let stored: Vec<SpendRecord> = storage::load_json(store.as_ref(), keys::SPEND_LOG)
            .unwrap()
            .unwrap();
        assert_eq!(stored.len(), 3);
    }

    #[test]
    fn test_new_period_resets_allowance() {
        let (clock, _store, mut l) = limiter(1000.0, Frequency::Hourly);
        l.record(1000.0);
        assert_eq!(l.remaining(), 0.0);
        clock.advance(Duration::hours(1));
        assert_eq!(l.remaining(), 1000.0);
        assert_eq!(l.spent(), 0.0);
    }

    #[test]
    fn test_check_rejects_invalid_amount() {
        let (_clock, _store, l) = limiter(1000.0, Frequency::Daily);
        assert_eq!(l.check(0.0), Err(LedgerError::InvalidAmount(0.0)));
        assert!(l.check(f64::NAN).is_err());
    }

    #[test]
    fn test_zero_cap_blocks_everything() {
        let (_clock, _store, l) = limiter(0.0, Frequency::Monthly);
        assert!(matches!(
            l.check(0.01),
            Err(LedgerError::PeriodCapExceeded { remaining, .. }) if remaining == 0.0
        ));
    }

    #[test]
    fn test_prune_drops_old_buckets() {
        let (clock, _store, mut l) = limiter(1000.0, Frequency::Daily);
        l.record(100.0);
        clock.advance(Duration::days(10));
        l.record(50.0);
        assert_eq!(l.log().len(), 2);

        clock.advance(Duration::days(45));
        assert_eq!(l.prune(), 1);
        assert_eq!(l.log().len(), 1);
        assert_eq!(l.log()[0].period_key, "2024-03-25");
    }

    #[test]
    fn test_frequency_change_discards_other_shapes() {
        let (_clock, _store, mut l) = limiter(1000.0, Frequency::Daily);
        l.record(300.0);
        l.reconfigure(500.0, Frequency::Monthly);
        assert_eq!(l.remaining(), 500.0);
        assert_eq!(l.prune(), 1);
        assert!(l.log().is_empty());
    }

    #[test]
    fn test_persisted_log_restores() {
        let (clock, store, mut l) = limiter(1000.0, Frequency::Daily);
        l.record(600.0);

        let raw = store.get(keys::SPEND_LOG).unwrap().unwrap();
        assert!(raw.contains("2024-03-15"));

        let restored = PeriodLimiter::restore(1000.0, Frequency::Daily, 48, clock, store);
        assert_eq!(restored.remaining(), 400.0);
        assert_eq!(restored.current_key(), "2024-03-15");
    }
}
