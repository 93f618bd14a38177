//! `BoxSpace` definition
use super::Sample;
use crate::Prng;
use ndarray::{ArrayD, IxDyn, Zip};
use rand::Rng;
use rand_distr::{Exp1, StandardNormal};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A closed box in `R^n`: element-wise bounded arrays of `f32`.
///
/// Bounds may be infinite on either side. Sampling matches the usual gym
/// behaviour: uniform where both bounds are finite, shifted exponential where
/// one is, standard normal where neither is. Sampling is performed in `f64`
/// so that very wide `f32` bounds do not overflow, then cast back.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoxSpace {
    pub low: ArrayD<f32>,
    pub high: ArrayD<f32>,
}

impl BoxSpace {
    /// Create a box from per-element bounds.
    ///
    /// # Panics
    /// If the bound shapes differ or any `low > high`.
    pub fn new(low: ArrayD<f32>, high: ArrayD<f32>) -> Self {
        assert_eq!(low.shape(), high.shape(), "bound shapes must match");
        assert!(
            Zip::from(&low).and(&high).all(|l, h| l <= h),
            "require low <= high"
        );
        Self { low, high }
    }

    /// A box with every element bounded by the same `[low, high]` interval.
    pub fn uniform(shape: &[usize], low: f32, high: f32) -> Self {
        Self::new(
            ArrayD::from_elem(IxDyn(shape), low),
            ArrayD::from_elem(IxDyn(shape), high),
        )
    }

    /// A zero-dimensional box; the shape of scalar rewards.
    pub fn scalar(low: f32, high: f32) -> Self {
        Self::uniform(&[], low, high)
    }

    pub fn shape(&self) -> &[usize] {
        self.low.shape()
    }

    pub fn sample(&self, rng: &mut Prng) -> Sample {
        let values = Zip::from(&self.low)
            .and(&self.high)
            .map_collect(|&l, &h| sample_element(f64::from(l), f64::from(h), rng) as f32);
        Sample::Box(values)
    }

    pub fn contains(&self, value: &Sample) -> bool {
        match value {
            Sample::Box(v) => {
                v.shape() == self.shape()
                    && Zip::from(v)
                        .and(&self.low)
                        .and(&self.high)
                        .all(|x, &l, &h| !x.is_nan() && *x >= l && *x <= h)
            }
            _ => false,
        }
    }
}

fn sample_element(low: f64, high: f64, rng: &mut Prng) -> f64 {
    match (low.is_finite(), high.is_finite()) {
        (true, true) => rng.gen_range(low..=high),
        (true, false) => low + rng.sample::<f64, _>(Exp1),
        (false, true) => high - rng.sample::<f64, _>(Exp1),
        (false, false) => rng.sample(StandardNormal),
    }
}

impl From<BoxSpace> for super::Space {
    fn from(space: BoxSpace) -> Self {
        Self::Box(space)
    }
}

impl fmt::Display for BoxSpace {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Box{:?}", self.shape())
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing;
    use super::*;
    use ndarray::arr1;

    #[test]
    fn contains_samples_bounded() {
        testing::check_contains_samples(&BoxSpace::uniform(&[3], -1.0, 1.0).into(), 100);
    }

    #[test]
    fn contains_samples_unbounded() {
        let space = BoxSpace::uniform(&[2], f32::NEG_INFINITY, f32::INFINITY);
        testing::check_contains_samples(&space.into(), 100);
    }

    #[test]
    fn contains_samples_half_bounded() {
        let space = BoxSpace::new(
            arr1(&[0.0_f32, f32::NEG_INFINITY]).into_dyn(),
            arr1(&[f32::INFINITY, 0.0]).into_dyn(),
        );
        testing::check_contains_samples(&space.into(), 100);
    }

    #[test]
    fn sampling_is_deterministic() {
        testing::check_sample_deterministic(&BoxSpace::uniform(&[3], -1.0, 1.0).into(), 20);
        // The unbounded and half-bounded draws go through different
        // distributions; check each.
        let space = BoxSpace::new(
            arr1(&[0.0_f32, f32::NEG_INFINITY]).into_dyn(),
            arr1(&[f32::INFINITY, f32::INFINITY]).into_dyn(),
        );
        testing::check_sample_deterministic(&space.into(), 20);
    }

    #[test]
    fn rejects_wrong_shape() {
        let space = BoxSpace::uniform(&[3], -1.0, 1.0);
        assert!(!space.contains(&Sample::Box(arr1(&[0.0_f32, 0.0]).into_dyn())));
    }

    #[test]
    fn rejects_nan() {
        let space = BoxSpace::uniform(&[1], -1.0, 1.0);
        assert!(!space.contains(&Sample::Box(arr1(&[f32::NAN]).into_dyn())));
    }

    #[test]
    fn scalar_box_contains_zero_dim() {
        let space = BoxSpace::scalar(f32::NEG_INFINITY, f32::INFINITY);
        assert_eq!(space.shape(), &[] as &[usize]);
        assert!(space.contains(&Sample::Box(ArrayD::from_elem(IxDyn(&[]), 0.5))));
    }
}
