//! Deterministic Randomness and Work Delays
//!
//! Each actor owns a [`SeededRng`] so a run can be replayed from its seeds.
//! [`DelayModel`] turns draws from that generator into the durations of the
//! simulated rolling and smoking work.

//-----------------------------------------------------------------------------
// Imports
//-----------------------------------------------------------------------------

use std::time::Duration;

use rand::prelude::{RngCore, SeedableRng, StdRng};
use rand::Rng;
use serde::{Deserialize, Serialize};

/// A seeded PRNG that remembers its seed.
#[derive(Debug, Clone)]
pub struct SeededRng {
    rng: StdRng,
    seed: u64,
}

impl SeededRng {
    /// Creates a new RNG instance seeded with the given 64-bit seed.
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            seed,
        }
    }

    /// Creates a new RNG from entropy, keeping the drawn seed so the run can
    /// still be replayed.
    pub fn from_entropy() -> Self {
        let mut entropy_rng = StdRng::from_entropy();
        Self::new(entropy_rng.next_u64())
    }

    pub fn get_seed(&self) -> u64 {
        self.seed
    }

    /// Uniform sample on `[0, 1)`.
    pub fn next_unit(&mut self) -> f64 {
        self.rng.gen::<f64>()
    }

    /// Generate a random value in the given range
    pub fn gen_range<T, R>(&mut self, range: R) -> T
    where
        T: rand::distributions::uniform::SampleUniform,
        R: rand::distributions::uniform::SampleRange<T>,
    {
        self.rng.gen_range(range)
    }
}

/// Approximately normal sample with zero mean and the given standard
/// deviation: twelve uniform draws on `[0, 1)` summed, minus 6 (Irwin-Hall),
/// scaled by `stddev`.
pub fn normal_rand(rng: &mut SeededRng, stddev: f64) -> f64 {
    let sum: f64 = (0..12).map(|_| rng.next_unit()).sum();
    (sum - 6.0) * stddev
}

//-----------------------------------------------------------------------------
// Delay model
//-----------------------------------------------------------------------------

/// Unit a [`DelayModel`] value is expressed in.
///
/// The tokio timer has millisecond granularity, so a sampled delay below
/// 1 ms still sleeps for about 1 ms. Use `Milliseconds` when wall-clock
/// phase lengths should match the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeUnit {
    #[default]
    Microseconds,
    Milliseconds,
}

impl TimeUnit {
    fn to_duration(self, amount: f64) -> Duration {
        match self {
            TimeUnit::Microseconds => Duration::from_secs_f64(amount / 1_000_000.0),
            TimeUnit::Milliseconds => Duration::from_secs_f64(amount / 1_000.0),
        }
    }
}

/// `base + normal_rand(stddev)` time units, clamped at zero.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DelayModel {
    pub base: f64,
    pub stddev: f64,
    pub unit: TimeUnit,
}

impl DelayModel {
    pub fn new(base: f64, stddev: f64, unit: TimeUnit) -> Self {
        Self { base, stddev, unit }
    }

    /// No delay at all; useful when only the protocol matters.
    pub fn instant() -> Self {
        Self::new(0.0, 0.0, TimeUnit::Microseconds)
    }

    /// Draw one delay. Non-positive draws give [`Duration::ZERO`].
    pub fn sample(&self, rng: &mut SeededRng) -> Duration {
        let amount = self.base + normal_rand(rng, self.stddev);
        if amount > 0.0 && amount.is_finite() {
            self.unit.to_duration(amount)
        } else {
            Duration::ZERO
        }
    }
}

impl Default for DelayModel {
    fn default() -> Self {
        Self::new(100.0, 30.0, TimeUnit::Microseconds)
    }
}

//-----------------------------------------------------------------------------
// Tests
//-----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seeded_rng_deterministic() {
        let mut rng1 = SeededRng::new(12345);
        let mut rng2 = SeededRng::new(12345);

        assert_eq!(rng1.next_unit(), rng2.next_unit());
        assert_eq!(rng1.gen_range(0..100), rng2.gen_range(0..100));
        assert_eq!(rng1.get_seed(), 12345);
    }

    #[test]
    fn test_normal_rand_with_zero_stddev_is_zero() {
        let mut rng = SeededRng::new(99);
        for _ in 0..100 {
            assert_eq!(normal_rand(&mut rng, 0.0), 0.0);
        }
    }

    #[test]
    fn test_normal_rand_is_bounded() {
        // Twelve draws on [0, 1) keep the centred sum within (-6, 6).
        let mut rng = SeededRng::new(7);
        for _ in 0..1_000 {
            let value = normal_rand(&mut rng, 30.0);
            assert!(value > -180.0 && value < 180.0, "{value}");
        }
    }

    #[test]
    fn test_normal_rand_mean_is_near_zero() {
        let mut rng = SeededRng::new(2024);
        let n = 10_000;
        let mean: f64 = (0..n).map(|_| normal_rand(&mut rng, 1.0)).sum::<f64>() / n as f64;
        assert!(mean.abs() < 0.05, "mean was {mean}");
    }

    #[test]
    fn test_negative_draw_clamps_to_zero() {
        let model = DelayModel::new(-1_000.0, 0.0, TimeUnit::Microseconds);
        let mut rng = SeededRng::new(1);
        assert_eq!(model.sample(&mut rng), Duration::ZERO);
        assert_eq!(DelayModel::instant().sample(&mut rng), Duration::ZERO);
    }

    #[test]
    fn test_default_model_is_about_a_tenth_of_a_millisecond() {
        let model = DelayModel::default();
        let mut rng = SeededRng::new(5);
        for _ in 0..100 {
            assert!(model.sample(&mut rng) < Duration::from_micros(281));
        }

        let fixed = DelayModel::new(2.0, 0.0, TimeUnit::Milliseconds);
        assert_eq!(fixed.sample(&mut rng), Duration::from_millis(2));
    }

    #[tokio::test]
    async fn test_sub_millisecond_delay_is_a_lower_bound() {
        let model = DelayModel::new(150.0, 0.0, TimeUnit::Microseconds);
        let delay = model.sample(&mut SeededRng::new(3));
        assert_eq!(delay, Duration::from_micros(150));

        let start = tokio::time::Instant::now();
        tokio::time::sleep(delay).await;
        assert!(start.elapsed() >= delay);
    }
}
