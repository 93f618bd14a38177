//! Runtime descriptions of observation / action / reward sets.
//!
//! A [`Space`] describes the set of valid values for one (non-batched)
//! environment channel. Spaces form a sealed algebra: the numeric leaves
//! ([`DiscreteSpace`], [`BoxSpace`], [`MultiDiscreteSpace`]), the composites
//! ([`DictSpace`], [`TupleSpace`]) and the optional-value decorator
//! ([`SparseSpace`]). Values are carried as dynamically-typed [`Sample`]s so
//! they can cross process boundaries and be laid out in shared memory.
mod boxed;
mod dict;
mod discrete;
mod flat;
mod multi_discrete;
mod sparse;
#[cfg(test)]
pub mod testing;
mod tuple;

pub use boxed::BoxSpace;
pub use dict::DictSpace;
pub use discrete::DiscreteSpace;
pub use flat::{flatdim, flatten, flatten_out, unflatten};
pub use multi_discrete::MultiDiscreteSpace;
pub use sparse::SparseSpace;
pub use tuple::TupleSpace;

use crate::Prng;
use ndarray::ArrayD;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A space of valid values for a single environment channel.
///
/// Invariant: for every space `s` and rng, `s.contains(&s.sample(rng))`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Space {
    Discrete(DiscreteSpace),
    Box(BoxSpace),
    MultiDiscrete(MultiDiscreteSpace),
    Dict(DictSpace),
    Tuple(TupleSpace),
    Sparse(SparseSpace),
}

/// One value drawn from a [`Space`].
///
/// `None` is the distinguished element contributed by [`SparseSpace`]; it is a
/// first-class sample, valid in any sparse space regardless of its base.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Sample {
    Discrete(i64),
    Box(ArrayD<f32>),
    MultiDiscrete(ArrayD<i64>),
    Dict(Vec<(String, Sample)>),
    Tuple(Vec<Sample>),
    None,
}

impl Space {
    /// Draw a random element of this space.
    pub fn sample(&self, rng: &mut Prng) -> Sample {
        match self {
            Self::Discrete(s) => s.sample(rng),
            Self::Box(s) => s.sample(rng),
            Self::MultiDiscrete(s) => s.sample(rng),
            Self::Dict(s) => s.sample(rng),
            Self::Tuple(s) => s.sample(rng),
            Self::Sparse(s) => s.sample(rng),
        }
    }

    /// Check whether `value` is a member of this space.
    pub fn contains(&self, value: &Sample) -> bool {
        match self {
            Self::Discrete(s) => s.contains(value),
            Self::Box(s) => s.contains(value),
            Self::MultiDiscrete(s) => s.contains(value),
            Self::Dict(s) => s.contains(value),
            Self::Tuple(s) => s.contains(value),
            Self::Sparse(s) => s.contains(value),
        }
    }

    /// Short tag naming the space kind, used in error messages.
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Discrete(_) => "Discrete",
            Self::Box(_) => "Box",
            Self::MultiDiscrete(_) => "MultiDiscrete",
            Self::Dict(_) => "Dict",
            Self::Tuple(_) => "Tuple",
            Self::Sparse(_) => "Sparse",
        }
    }
}

impl fmt::Display for Space {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Discrete(s) => s.fmt(f),
            Self::Box(s) => s.fmt(f),
            Self::MultiDiscrete(s) => s.fmt(f),
            Self::Dict(s) => s.fmt(f),
            Self::Tuple(s) => s.fmt(f),
            Self::Sparse(s) => s.fmt(f),
        }
    }
}

impl Sample {
    /// Short tag naming the sample kind, used in error messages.
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Discrete(_) => "Discrete",
            Self::Box(_) => "Box",
            Self::MultiDiscrete(_) => "MultiDiscrete",
            Self::Dict(_) => "Dict",
            Self::Tuple(_) => "Tuple",
            Self::None => "None",
        }
    }
}

/// Error from a space / sample / buffer structure mismatch.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SpaceError {
    /// A sample does not have the structure required by a space.
    #[error("sample kind `{sample}` does not match space `{space}`")]
    SampleMismatch {
        space: &'static str,
        sample: &'static str,
    },
    /// A shared buffer does not have the structure required by a space.
    #[error("buffer layout does not match space `{space}`")]
    BufferMismatch { space: &'static str },
    /// A batched sample cannot be split back into `n` per-environment samples.
    #[error("cannot split batched sample into {expected} lanes: {reason}")]
    BadBatch { expected: usize, reason: String },
    /// A flat vector has the wrong length for `unflatten`.
    #[error("flat vector of length {found} does not match flatdim {expected}")]
    BadFlatLength { expected: usize, found: usize },
}
