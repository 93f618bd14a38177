//! `TupleSpace` definition
use super::{Sample, Space};
use crate::Prng;
use serde::{Deserialize, Serialize};
use std::fmt;

/// An anonymous product of spaces; elements are fixed-length sequences.
///
/// Also serves as the batched form of spaces without a numeric stacking,
/// such as sparse spaces with nonzero `none_prob`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TupleSpace {
    pub spaces: Vec<Space>,
}

impl TupleSpace {
    pub fn new(spaces: Vec<Space>) -> Self {
        Self { spaces }
    }

    /// `n` copies of the same space.
    pub fn repeated(space: Space, n: usize) -> Self {
        Self::new(vec![space; n])
    }

    pub fn len(&self) -> usize {
        self.spaces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.spaces.is_empty()
    }

    pub fn sample(&self, rng: &mut Prng) -> Sample {
        Sample::Tuple(self.spaces.iter().map(|space| space.sample(rng)).collect())
    }

    pub fn contains(&self, value: &Sample) -> bool {
        match value {
            Sample::Tuple(entries) => {
                entries.len() == self.spaces.len()
                    && self
                        .spaces
                        .iter()
                        .zip(entries)
                        .all(|(space, sub)| space.contains(sub))
            }
            _ => false,
        }
    }
}

impl From<TupleSpace> for Space {
    fn from(space: TupleSpace) -> Self {
        Self::Tuple(space)
    }
}

impl fmt::Display for TupleSpace {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Tuple(")?;
        for (i, space) in self.spaces.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", space)?;
        }
        write!(f, ")")
    }
}

#[cfg(test)]
mod tests {
    use super::super::{testing, BoxSpace, DiscreteSpace};
    use super::*;

    #[test]
    fn contains_samples() {
        let space = TupleSpace::new(vec![
            DiscreteSpace::new(2).into(),
            BoxSpace::uniform(&[1], 0.0, 1.0).into(),
        ]);
        testing::check_contains_samples(&space.into(), 100);
    }

    #[test]
    fn rejects_wrong_length() {
        let space = TupleSpace::repeated(DiscreteSpace::new(2).into(), 3);
        assert!(!space.contains(&Sample::Tuple(vec![Sample::Discrete(0); 2])));
        assert!(space.contains(&Sample::Tuple(vec![Sample::Discrete(0); 3])));
    }
}
