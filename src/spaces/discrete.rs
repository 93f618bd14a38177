//! `DiscreteSpace` definition
use super::Sample;
use crate::Prng;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;

/// The integers `{0, 1, ..., n - 1}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DiscreteSpace {
    pub n: i64,
}

impl DiscreteSpace {
    pub fn new(n: i64) -> Self {
        assert!(n > 0, "require n > 0");
        Self { n }
    }

    pub fn sample(&self, rng: &mut Prng) -> Sample {
        Sample::Discrete(rng.gen_range(0..self.n))
    }

    pub fn contains(&self, value: &Sample) -> bool {
        match value {
            Sample::Discrete(v) => (0..self.n).contains(v),
            _ => false,
        }
    }
}

impl From<DiscreteSpace> for super::Space {
    fn from(space: DiscreteSpace) -> Self {
        Self::Discrete(space)
    }
}

impl fmt::Display for DiscreteSpace {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Discrete({})", self.n)
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing;
    use super::*;

    #[test]
    fn contains_samples() {
        testing::check_contains_samples(&DiscreteSpace::new(5).into(), 100);
    }

    #[test]
    fn rejects_out_of_range() {
        let space = DiscreteSpace::new(3);
        assert!(!space.contains(&Sample::Discrete(-1)));
        assert!(!space.contains(&Sample::Discrete(3)));
        assert!(space.contains(&Sample::Discrete(2)));
    }

    #[test]
    fn rejects_wrong_kind() {
        let space = DiscreteSpace::new(3);
        assert!(!space.contains(&Sample::None));
    }
}
