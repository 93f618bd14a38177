//! Space test utilities
use super::{Sample, Space};
use crate::Prng;
use rand::SeedableRng;

/// Check that a space contains the samples it generates.
pub fn check_contains_samples(space: &Space, num_samples: u32) {
    let mut rng = Prng::seed_from_u64(1);
    for _ in 0..num_samples {
        let sample = space.sample(&mut rng);
        assert!(
            space.contains(&sample),
            "space {} does not contain its own sample {:?}",
            space,
            sample
        );
    }
}

/// Check that sampling is a pure function of the rng state.
pub fn check_sample_deterministic(space: &Space, num_samples: u32) {
    let mut rng_a = Prng::seed_from_u64(2);
    let mut rng_b = Prng::seed_from_u64(2);
    for _ in 0..num_samples {
        assert_eq!(space.sample(&mut rng_a), space.sample(&mut rng_b));
    }
}

/// Collect `n` samples from a seeded rng.
pub fn samples(space: &Space, seed: u64, n: usize) -> Vec<Sample> {
    let mut rng = Prng::seed_from_u64(seed);
    (0..n).map(|_| space.sample(&mut rng)).collect()
}
