// src/pacing.rs
//! Advisory pacing between external calls. A `Pacer` turns a requests-per-
//! minute ceiling (or an explicit band) into a jittered wait so successive
//! queries from one cycle are spread out and cycles do not burst in sync.
//! This is spacing, not admission control: it never rejects and never errors.

use rand::Rng;
use std::time::Duration;

#[derive(Debug, Clone, Copy)]
pub struct Pacer {
    min: Duration,
    max: Duration,
}

impl Pacer {
    /// Space calls so at most `per_minute` happen per rolling minute on
    /// average, with a jitter band applied to the base gap. `jitter_low`
    /// below 1.0 lets an individual wait undershoot the gap; the default
    /// band (0.8, 1.5) keeps the long-run average at or above the gap.
    pub fn per_minute(per_minute: u32, jitter_low: f64, jitter_high: f64) -> Self {
        let per_minute = per_minute.max(1);
        let gap = 60.0 / per_minute as f64;
        let (lo, hi) = if jitter_low <= jitter_high {
            (jitter_low, jitter_high)
        } else {
            (jitter_high, jitter_low)
        };
        Self {
            min: Duration::from_secs_f64(gap * lo.max(0.0)),
            max: Duration::from_secs_f64(gap * hi.max(0.0)),
        }
    }

    /// Wait a uniformly random duration from an explicit band. Used for the
    /// short per-result delays and the longer inter-query pauses.
    pub fn between(min: Duration, max: Duration) -> Self {
        if min <= max {
            Self { min, max }
        } else {
            Self { min: max, max: min }
        }
    }

    pub fn between_ms(min_ms: u64, max_ms: u64) -> Self {
        Self::between(
            Duration::from_millis(min_ms),
            Duration::from_millis(max_ms),
        )
    }

    /// Pick the next wait duration without sleeping.
    pub fn next_delay(&self) -> Duration {
        if self.max <= self.min {
            return self.min;
        }
        let lo = self.min.as_secs_f64();
        let hi = self.max.as_secs_f64();
        Duration::from_secs_f64(rand::rng().random_range(lo..hi))
    }

    /// Sleep for the next jittered delay. Suspends only the calling task.
    pub async fn wait(&self) {
        tokio::time::sleep(self.next_delay()).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn per_minute_band_brackets_the_gap() {
        let p = Pacer::per_minute(6, 0.8, 1.5);
        for _ in 0..200 {
            let d = p.next_delay().as_secs_f64();
            assert!(d >= 8.0 - 1e-9, "delay {d} under 0.8 * 10s");
            assert!(d <= 15.0 + 1e-9, "delay {d} over 1.5 * 10s");
        }
    }

    #[test]
    fn hundred_waits_meet_the_pacing_floor() {
        // ceiling K=6/min: 100 calls must span at least 99 * (60/6) * 0.8 s
        let p = Pacer::per_minute(6, 0.8, 1.5);
        let total: f64 = (0..100).map(|_| p.next_delay().as_secs_f64()).sum();
        assert!(total >= 99.0 * 10.0 * 0.8, "total {total}s below floor");
    }

    #[test]
    fn explicit_band_is_respected_and_order_insensitive() {
        let p = Pacer::between_ms(2_000, 1_000);
        for _ in 0..50 {
            let d = p.next_delay();
            assert!(d >= Duration::from_millis(1_000));
            assert!(d <= Duration::from_millis(2_000));
        }
    }

    #[test]
    fn degenerate_band_returns_the_fixed_gap() {
        let p = Pacer::between_ms(500, 500);
        assert_eq!(p.next_delay(), Duration::from_millis(500));
    }

    #[test]
    fn zero_ceiling_is_clamped() {
        // never panics, never divides by zero
        let p = Pacer::per_minute(0, 0.8, 1.5);
        assert!(p.next_delay() >= Duration::from_secs(48));
    }
}
