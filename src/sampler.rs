//! Synthetic sensor readings.
//!
//! The node has no real sensor attached; the sampler stands in for one by
//! drawing a temperature uniformly from a fixed range on every call.

use rand::Rng;

/// Lowest temperature the sampler reports (inclusive)
pub const MIN_TEMPERATURE_C: u32 = 21;

/// Highest temperature the sampler reports (inclusive)
pub const MAX_TEMPERATURE_C: u32 = 29;

/// Stateless synthetic temperature sampler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TemperatureSampler {
    min: u32,
    max: u32,
}

impl TemperatureSampler {
    pub fn new() -> Self {
        Self {
            min: MIN_TEMPERATURE_C,
            max: MAX_TEMPERATURE_C,
        }
    }

    /// Draw a reading in degrees Celsius, uniform over `[21, 29]`.
    pub fn sample(&self, rng: &mut impl Rng) -> u32 {
        rng.gen_range(self.min..=self.max)
    }

    /// Range of values this sampler can produce.
    pub fn range(&self) -> std::ops::RangeInclusive<u32> {
        self.min..=self.max
    }
}

impl Default for TemperatureSampler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_samples_within_bounds() {
        let sampler = TemperatureSampler::new();
        let mut rng = StdRng::seed_from_u64(2024);

        for _ in 0..10_000 {
            let reading = sampler.sample(&mut rng);
            assert!((21..=29).contains(&reading), "reading {} out of range", reading);
        }
    }

    #[test]
    fn test_samples_cover_whole_range() {
        let sampler = TemperatureSampler::new();
        let mut rng = StdRng::seed_from_u64(11);
        let mut seen = [false; 9];

        for _ in 0..10_000 {
            seen[(sampler.sample(&mut rng) - MIN_TEMPERATURE_C) as usize] = true;
        }
        assert!(seen.iter().all(|s| *s));
    }

    #[test]
    fn test_thread_rng_samples_within_bounds() {
        let sampler = TemperatureSampler::default();
        let mut rng = rand::thread_rng();

        for _ in 0..1_000 {
            assert!(sampler.range().contains(&sampler.sample(&mut rng)));
        }
    }
}
