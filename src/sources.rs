//! Injected collaborators: clock, random source and id generator.
//!
//! Ledgers and generators never read the wall clock, the thread RNG or
//! a global counter directly; they receive one of these so tests can
//! substitute deterministic implementations.

use chrono::{DateTime, Duration, Utc};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

// ---------------------------------------------------------------------------
// Clock
// ---------------------------------------------------------------------------

/// Source of the current timestamp.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn set(&self, at: DateTime<Utc>) {
        *self.now.lock().unwrap_or_else(|e| e.into_inner()) = at;
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(|e| e.into_inner());
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(|e| e.into_inner())
    }
}

// ---------------------------------------------------------------------------
// Randomness
// ---------------------------------------------------------------------------

/// Uniform random numbers in `[0, 1)`.
pub trait RandomSource {
    fn next(&mut self) -> f64;

    /// Uniform in `[-1, 1)`.
    fn signed(&mut self) -> f64 {
        self.next() * 2.0 - 1.0
    }

    /// Uniform index in `0..len`. `len` must be non-zero.
    fn index(&mut self, len: usize) -> usize {
        ((self.next() * len as f64) as usize).min(len.saturating_sub(1))
    }
}

/// ChaCha-backed source; seeded for reproducible sessions.
#[derive(Debug, Clone)]
pub struct ChaChaRandom {
    rng: ChaCha8Rng,
}

impl ChaChaRandom {
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    pub fn from_entropy() -> Self {
        Self {
            rng: ChaCha8Rng::from_entropy(),
        }
    }

    /// Seeded when a seed is given, otherwise from OS entropy.
    pub fn from_seed_option(seed: Option<u64>) -> Self {
        match seed {
            Some(seed) => Self::seeded(seed),
            None => Self::from_entropy(),
        }
    }
}

impl RandomSource for ChaChaRandom {
    fn next(&mut self) -> f64 {
        self.rng.gen::<f64>()
    }
}

/// Replays a fixed list of values, cycling forever.
#[derive(Debug, Clone)]
pub struct SequenceRandom {
    values: Vec<f64>,
    cursor: usize,
}

impl SequenceRandom {
    /// Values are clamped into `[0, 1)`. An empty list yields 0.5.
    pub fn new(values: Vec<f64>) -> Self {
        let values = if values.is_empty() {
            vec![0.5]
        } else {
            values
                .into_iter()
                .map(|v| v.clamp(0.0, 1.0 - f64::EPSILON))
                .collect()
        };
        Self { values, cursor: 0 }
    }

    /// Always returns the same value.
    pub fn constant(value: f64) -> Self {
        Self::new(vec![value])
    }
}

impl RandomSource for SequenceRandom {
    fn next(&mut self) -> f64 {
        let v = self.values[self.cursor % self.values.len()];
        self.cursor = self.cursor.wrapping_add(1);
        v
    }
}

// ---------------------------------------------------------------------------
// Ids
// ---------------------------------------------------------------------------

/// Generates unique transaction ids.
pub trait IdGenerator: Send + Sync {
    fn next_id(&self) -> String;
}

/// `tx-<uuid v4>`.
#[derive(Debug, Clone, Copy, Default)]
pub struct UuidIds;

impl IdGenerator for UuidIds {
    fn next_id(&self) -> String {
        format!("tx-{}", uuid::Uuid::new_v4())
    }
}

/// `tx-1`, `tx-2`, ...
#[derive(Debug, Default)]
pub struct SequentialIds {
    counter: AtomicU64,
}

impl SequentialIds {
    pub fn new() -> Self {
        Self::default()
    }
}

impl IdGenerator for SequentialIds {
    fn next_id(&self) -> String {
        let n = self.counter.fetch_add(1, Ordering::Relaxed) + 1;
        format!("tx-{n}")
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_manual_clock_advance() {
        let start = Utc.with_ymd_and_hms(2024, 3, 15, 10, 0, 0).unwrap();
        let clock = ManualClock::new(start);
        assert_eq!(clock.now(), start);
        clock.advance(Duration::milliseconds(250));
        assert_eq!(clock.now(), start + Duration::milliseconds(250));
        clock.set(start);
        assert_eq!(clock.now(), start);
    }

    #[test]
    fn test_chacha_seeded_is_reproducible() {
        let mut a = ChaChaRandom::seeded(7);
        let mut b = ChaChaRandom::seeded(7);
        for _ in 0..20 {
            assert_eq!(a.next(), b.next());
        }
    }

    #[test]
    fn test_chacha_range() {
        let mut r = ChaChaRandom::seeded(42);
        for _ in 0..1000 {
            let v = r.next();
            assert!((0.0..1.0).contains(&v));
            let s = r.signed();
            assert!((-1.0..1.0).contains(&s));
        }
    }

    #[test]
    fn test_sequence_cycles() {
        let mut r = SequenceRandom::new(vec![0.1, 0.9]);
        assert_eq!(r.next(), 0.1);
        assert_eq!(r.next(), 0.9);
        assert_eq!(r.next(), 0.1);
    }

    #[test]
    fn test_sequence_clamps_and_defaults() {
        let mut r = SequenceRandom::new(vec![1.5]);
        assert!(r.next() < 1.0);
        let mut empty = SequenceRandom::new(Vec::new());
        assert_eq!(empty.next(), 0.5);
    }

    #[test]
    fn test_index_bounds() {
        let mut r = SequenceRandom::new(vec![0.0, 0.999_999]);
        assert_eq!(r.index(4), 0);
        assert_eq!(r.index(4), 3);
    }

    #[test]
    fn test_sequential_ids() {
        let ids = SequentialIds::new();
        assert_eq!(ids.next_id(), "tx-1");
        assert_eq!(ids.next_id(), "tx-2");
    }

    #[test]
    fn test_uuid_ids_unique() {
        let ids = UuidIds;
        let a = ids.next_id();
        let b = ids.next_id();
        assert!(a.starts_with("tx-"));
        assert_ne!(a, b);
    }
}
