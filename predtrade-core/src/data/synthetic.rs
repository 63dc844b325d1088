//! Seeded random-walk bars for offline runs, benchmarks and tests.

use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::interval::Interval;
use super::provider::{BarSource, DataError};
use crate::domain::Bar;

/// Geometric random walk. The same seed and start time always yield the same bars.
#[derive(Debug, Clone)]
pub struct SyntheticSource {
    pub seed: u64,
    pub start_price: f64,
    /// Per-bar return range: each step draws uniformly from `[-volatility, volatility]`.
    pub volatility: f64,
    /// Per-bar drift added to every step.
    pub drift: f64,
}

impl Default for SyntheticSource {
    fn default() -> Self {
        Self {
            seed: 42,
            start_price: 100.0,
            volatility: 0.02,
            drift: 0.0,
        }
    }
}

impl SyntheticSource {
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            ..Self::default()
        }
    }

    /// Generate `count` consecutive bars starting at `start`.
    ///
    /// Fails if the last timestamp would fall outside chrono's range.
    pub fn generate(
        &self,
        start: DateTime<Utc>,
        interval: Interval,
        count: usize,
    ) -> Result<Vec<Bar>, DataError> {
        let mut rng = StdRng::seed_from_u64(self.seed);
        let step = interval.duration();
        let mut close = self.start_price;
        let mut bars = Vec::with_capacity(count.min(1 << 16));

        for i in 0..count {
            let timestamp = i32::try_from(i)
                .ok()
                .and_then(|n| step.checked_mul(n))
                .and_then(|offset| start.checked_add_signed(offset))
                .ok_or_else(|| {
                    DataError::Validation(format!(
                        "{count} {interval} bars from {start} overflow the timestamp range"
                    ))
                })?;
            let open = close;
            let ret = self.drift + rng.gen_range(-self.volatility..=self.volatility);
            close = (open * (1.0 + ret)).max(f64::EPSILON);
            let wick_up = rng.gen_range(0.0..=self.volatility / 2.0);
            let wick_down = rng.gen_range(0.0..=self.volatility / 2.0);
            bars.push(Bar {
                timestamp,
                open,
                high: open.max(close) * (1.0 + wick_up),
                low: open.min(close) * (1.0 - wick_down),
                close,
                volume: rng.gen_range(100.0..10_000.0),
            });
        }
        Ok(bars)
    }
}

impl BarSource for SyntheticSource {
    fn name(&self) -> &str {
        "synthetic"
    }

    fn fetch_bars(
        &self,
        symbol: &str,
        interval: Interval,
        start: DateTime<Utc>,
        end: Option<DateTime<Utc>>,
    ) -> Result<Vec<Bar>, DataError> {
        let end = end.unwrap_or_else(Utc::now);
        let span = end - start;
        let step = interval.duration();
        if span <= chrono::Duration::zero() {
            return Err(DataError::Empty {
                symbol: symbol.to_string(),
                interval,
            });
        }
        let count = (span.num_milliseconds() / step.num_milliseconds()) as usize;
        self.generate(start, interval, count)
    }
}
