//! Synthetic price history.
//!
//! Walks backwards from a seed price with bounded relative steps and
//! returns the series oldest-first, so the seed is the most recent point.

use crate::sources::RandomSource;

/// No simulated price goes below this.
pub const PRICE_FLOOR: f64 = 0.01;

/// Default relative step size.
pub const DEFAULT_VOLATILITY: f64 = 0.02;

/// Generate `days` prices ending at (a floored copy of) `current_price`.
///
/// Each step back applies `previous * volatility * U(-1, 1)` to the
/// previously generated point and floors the result at [`PRICE_FLOOR`].
pub fn generate<R: RandomSource + ?Sized>(
    rng: &mut R,
    current_price: f64,
    days: usize,
    volatility: f64,
) -> Vec<f64> {
    if days == 0 {
        return Vec::new();
    }

    let volatility = if volatility.is_finite() { volatility.abs() } else { 0.0 };
    let seed = if current_price.is_finite() {
        current_price.max(PRICE_FLOOR)
    } else {
        PRICE_FLOOR
    };

    // Built newest-first, reversed at the end.
    let mut walk = Vec::with_capacity(days);
    walk.push(seed);
    let mut previous = seed;
    for _ in 1..days {
        let change = previous * volatility * rng.signed();
        previous = (previous + change).max(PRICE_FLOOR);
        walk.push(previous);
    }
    walk.reverse();
    walk
}

/// Generator bound to a random source.
pub struct PriceSeriesSimulator<R: RandomSource> {
    rng: R,
}

impl<R: RandomSource> PriceSeriesSimulator<R> {
    pub fn new(rng: R) -> Self {
        Self { rng }
    }

    pub fn generate(&mut self, current_price: f64, days: usize, volatility: f64) -> Vec<f64> {
        generate(&mut self.rng, current_price, days, volatility)
    }

    /// Borrow the underlying random source (shared with other generators).
    pub fn rng_mut(&mut self) -> &mut R {
        &mut self.rng
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
