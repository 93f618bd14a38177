//! `MultiDiscreteSpace` definition
use super::Sample;
use crate::Prng;
use ndarray::{ArrayD, IxDyn, Zip};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;

/// An array of independent discrete ranges: element `i` lies in `{0, ..., nvec[i] - 1}`.
///
/// Also serves as the batched form of [`DiscreteSpace`][super::DiscreteSpace].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MultiDiscreteSpace {
    pub nvec: ArrayD<i64>,
}

impl MultiDiscreteSpace {
    /// # Panics
    /// If any cardinality is not positive.
    pub fn new(nvec: ArrayD<i64>) -> Self {
        assert!(nvec.iter().all(|&n| n > 0), "require all n > 0");
        Self { nvec }
    }

    /// `count` copies of the same cardinality; the batched form of `Discrete(n)`.
    pub fn repeated(n: i64, count: usize) -> Self {
        Self::new(ArrayD::from_elem(IxDyn(&[count]), n))
    }

    pub fn shape(&self) -> &[usize] {
        self.nvec.shape()
    }

    pub fn sample(&self, rng: &mut Prng) -> Sample {
        Sample::MultiDiscrete(self.nvec.map(|&n| rng.gen_range(0..n)))
    }

    pub fn contains(&self, value: &Sample) -> bool {
        match value {
            Sample::MultiDiscrete(v) => {
                v.shape() == self.shape()
                    && Zip::from(v).and(&self.nvec).all(|&x, &n| (0..n).contains(&x))
            }
            _ => false,
        }
    }
}

impl From<MultiDiscreteSpace> for super::Space {
    fn from(space: MultiDiscreteSpace) -> Self {
        Self::MultiDiscrete(space)
    }
}

impl fmt::Display for MultiDiscreteSpace {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "MultiDiscrete{:?}", self.shape())
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing;
    use super::*;
    use ndarray::arr1;

    #[test]
    fn contains_samples() {
        let space = MultiDiscreteSpace::new(arr1(&[2, 3, 4]).into_dyn());
        testing::check_contains_samples(&space.into(), 100);
    }

    #[test]
    fn rejects_out_of_range_element() {
        let space = MultiDiscreteSpace::new(arr1(&[2, 3]).into_dyn());
        assert!(!space.contains(&Sample::MultiDiscrete(arr1(&[1, 3]).into_dyn())));
        assert!(space.contains(&Sample::MultiDiscrete(arr1(&[1, 2]).into_dyn())));
    }

    #[test]
    fn repeated_matches_batch_of_discrete() {
        let space = MultiDiscreteSpace::repeated(4, 3);
        assert_eq!(space.shape(), &[3]);
        assert!(space.contains(&Sample::MultiDiscrete(arr1(&[3, 0, 1]).into_dyn())));
    }
}
