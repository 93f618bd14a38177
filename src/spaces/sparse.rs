//! Sparse space definition.
use super::{Sample, Space};
use crate::Prng;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A space whose elements are either [`Sample::None`] or an element of a base
/// space, with a configurable probability of the former.
///
/// `None` is always a valid member, whatever `none_prob` is. Equality is
/// structural: same base space and same `none_prob`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SparseSpace {
    pub base: Box<Space>,
    pub none_prob: f64,
}

impl SparseSpace {
    /// # Panics
    /// If `none_prob` is outside `[0, 1]`.
    pub fn new(base: Space, none_prob: f64) -> Self {
        assert!(
            (0.0..=1.0).contains(&none_prob),
            "require 0 <= none_prob <= 1"
        );
        Self {
            base: Box::new(base),
            none_prob,
        }
    }

    /// Draw `None` with probability `none_prob`, otherwise a base sample.
    ///
    /// The two degenerate probabilities short-circuit: `0` delegates straight
    /// to the base and `1` returns `None` without consuming any randomness,
    /// so seeding stays deterministic in both cases.
    pub fn sample(&self, rng: &mut Prng) -> Sample {
        if self.none_prob == 0.0 {
            return self.base.sample(rng);
        }
        if self.none_prob == 1.0 {
            return Sample::None;
        }
        let p: f64 = rng.gen();
        if p <= self.none_prob {
            Sample::None
        } else {
            self.base.sample(rng)
        }
    }

    pub fn contains(&self, value: &Sample) -> bool {
        matches!(value, Sample::None) || self.base.contains(value)
    }
}

impl From<SparseSpace> for Space {
    fn from(space: SparseSpace) -> Self {
        Self::Sparse(space)
    }
}

impl fmt::Display for SparseSpace {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Sparse({}, none_prob={})", self.base, self.none_prob)
    }
}

#[cfg(test)]
mod tests {
    use super::super::{testing, BoxSpace, DiscreteSpace};
    use super::*;
    use rand::SeedableRng;

    #[test]
    fn contains_none() {
        let space = SparseSpace::new(DiscreteSpace::new(4).into(), 0.5);
        assert!(space.contains(&Sample::None));
    }

    #[test]
    fn contains_base_samples() {
        let space = SparseSpace::new(DiscreteSpace::new(4).into(), 0.5);
        assert!(space.contains(&Sample::Discrete(3)));
        assert!(!space.contains(&Sample::Discrete(4)));
    }

    #[test]
    fn contains_samples() {
        let space = SparseSpace::new(BoxSpace::uniform(&[2], -1.0, 1.0).into(), 0.3);
        testing::check_contains_samples(&space.into(), 100);
    }

    #[test]
    fn sampling_is_deterministic() {
        let space = SparseSpace::new(BoxSpace::uniform(&[2], -1.0, 1.0).into(), 0.3);
        testing::check_sample_deterministic(&space.into(), 50);
    }

    #[test]
    fn mixed_probability_yields_both_kinds() {
        let space: Space = SparseSpace::new(DiscreteSpace::new(4).into(), 0.5).into();
        let drawn = testing::samples(&space, 3, 100);
        assert!(drawn.iter().any(|sample| *sample == Sample::None));
        assert!(drawn.iter().any(|sample| *sample != Sample::None));
    }

    #[test]
    fn never_none_at_zero() {
        let space = SparseSpace::new(DiscreteSpace::new(4).into(), 0.0);
        let mut rng = Prng::seed_from_u64(7);
        for _ in 0..200 {
            let sample = space.sample(&mut rng);
            assert_ne!(sample, Sample::None);
            assert!(space.base.contains(&sample));
        }
    }

    #[test]
    fn always_none_at_one() {
        let space = SparseSpace::new(DiscreteSpace::new(4).into(), 1.0);
        let mut rng = Prng::seed_from_u64(7);
        for _ in 0..200 {
            assert_eq!(space.sample(&mut rng), Sample::None);
        }
    }

    #[test]
    fn certain_none_does_not_consume_randomness() {
        // A run of all-None samples must leave the rng untouched.
        let sparse = SparseSpace::new(DiscreteSpace::new(4).into(), 1.0);
        let base: Space = DiscreteSpace::new(4).into();
        let mut rng_a = Prng::seed_from_u64(11);
        let mut rng_b = Prng::seed_from_u64(11);
        for _ in 0..10 {
            sparse.sample(&mut rng_a);
        }
        assert_eq!(base.sample(&mut rng_a), base.sample(&mut rng_b));
    }

    #[test]
    fn structural_equality() {
        let a = SparseSpace::new(DiscreteSpace::new(4).into(), 0.5);
        let b = SparseSpace::new(DiscreteSpace::new(4).into(), 0.5);
        let c = SparseSpace::new(DiscreteSpace::new(4).into(), 0.25);
        let d = SparseSpace::new(DiscreteSpace::new(5).into(), 0.5);
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_ne!(a, d);
    }
}
