//! `DictSpace` definition
use super::{Sample, Space};
use crate::Prng;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A named product of spaces; elements are ordered `(name, sample)` maps.
///
/// Key order is fixed at construction and significant for layout and
/// equality, mirroring an ordered mapping of sub-spaces.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DictSpace {
    pub spaces: Vec<(String, Space)>,
}

impl DictSpace {
    pub fn new(spaces: Vec<(String, Space)>) -> Self {
        Self { spaces }
    }

    pub fn sample(&self, rng: &mut Prng) -> Sample {
        Sample::Dict(
            self.spaces
                .iter()
                .map(|(name, space)| (name.clone(), space.sample(rng)))
                .collect(),
        )
    }

    pub fn contains(&self, value: &Sample) -> bool {
        match value {
            Sample::Dict(entries) => {
                entries.len() == self.spaces.len()
                    && self
                        .spaces
                        .iter()
                        .zip(entries)
                        .all(|((name, space), (key, sub))| name == key && space.contains(sub))
            }
            _ => false,
        }
    }
}

impl From<DictSpace> for Space {
    fn from(space: DictSpace) -> Self {
        Self::Dict(space)
    }
}

impl fmt::Display for DictSpace {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Dict(")?;
        for (i, (name, space)) in self.spaces.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}: {}", name, space)?;
        }
        write!(f, ")")
    }
}

#[cfg(test)]
mod tests {
    use super::super::{testing, BoxSpace, DiscreteSpace};
    use super::*;
    use rand::SeedableRng;

    fn example() -> DictSpace {
        DictSpace::new(vec![
            ("position".into(), BoxSpace::uniform(&[2], -1.0, 1.0).into()),
            ("kind".into(), DiscreteSpace::new(3).into()),
        ])
    }

    #[test]
    fn contains_samples() {
        testing::check_contains_samples(&example().into(), 100);
    }

    #[test]
    fn rejects_missing_key() {
        let space = example();
        assert!(!space.contains(&Sample::Dict(vec![("kind".into(), Sample::Discrete(0))])));
    }

    #[test]
    fn rejects_reordered_keys() {
        let space = example();
        let mut rng = crate::Prng::seed_from_u64(0);
        let sample = space.sample(&mut rng);
        let reversed = match &sample {
            Sample::Dict(entries) => {
                Sample::Dict(entries.iter().rev().cloned().collect())
            }
            _ => unreachable!(),
        };
        assert!(space.contains(&sample));
        assert!(!space.contains(&reversed));
    }
}
