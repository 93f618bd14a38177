//! Flat vector encodings of space elements.
//!
//! Discrete values are one-hot encoded, boxes are raveled, composites are
//! concatenated in declaration order. Sparse elements carry a leading flag
//! element: `[1, 0, ...]` encodes `None` and `[0, flatten(base)...]` encodes a
//! base element, so every element of a sparse space has the same flat width.
use super::{Sample, Space, SpaceError};
use ndarray::{ArrayD, IxDyn};
use num_traits::Float;

/// The length of the flat encoding of one element of `space`.
pub fn flatdim(space: &Space) -> usize {
    match space {
        Space::Discrete(s) => s.n as usize,
        Space::Box(s) => s.low.len(),
        Space::MultiDiscrete(s) => s.nvec.iter().map(|&n| n as usize).sum(),
        Space::Dict(s) => s.spaces.iter().map(|(_, sub)| flatdim(sub)).sum(),
        Space::Tuple(s) => s.spaces.iter().map(flatdim).sum(),
        Space::Sparse(s) => 1 + flatdim(&s.base),
    }
}

/// Encode one element of `space` as a flat vector.
pub fn flatten<F: Float>(space: &Space, value: &Sample) -> Result<Vec<F>, SpaceError> {
    let mut out = vec![F::zero(); flatdim(space)];
    flatten_out(space, value, &mut out)?;
    Ok(out)
}

/// Encode into a zeroed output slice, returning the remainder of the slice.
pub fn flatten_out<'a, F: Float>(
    space: &Space,
    value: &Sample,
    out: &'a mut [F],
) -> Result<&'a mut [F], SpaceError> {
    let mismatch = || SpaceError::SampleMismatch {
        space: space.kind(),
        sample: value.kind(),
    };
    match (space, value) {
        (Space::Discrete(s), Sample::Discrete(v)) => {
            if !(0..s.n).contains(v) {
                return Err(mismatch());
            }
            let (head, rest) = out.split_at_mut(s.n as usize);
            head[*v as usize] = F::one();
            Ok(rest)
        }
        (Space::Box(s), Sample::Box(v)) => {
            if v.shape() != s.shape() {
                return Err(mismatch());
            }
            let (head, rest) = out.split_at_mut(v.len());
            for (slot, &x) in head.iter_mut().zip(v.iter()) {
                *slot = F::from(x).expect("f32 converts to any Float");
            }
            Ok(rest)
        }
        (Space::MultiDiscrete(s), Sample::MultiDiscrete(v)) => {
            if v.shape() != s.shape() {
                return Err(mismatch());
            }
            let mut rest = out;
            for (&n, &x) in s.nvec.iter().zip(v.iter()) {
                if !(0..n).contains(&x) {
                    return Err(mismatch());
                }
                let (head, tail) = rest.split_at_mut(n as usize);
                head[x as usize] = F::one();
                rest = tail;
            }
            Ok(rest)
        }
        (Space::Dict(s), Sample::Dict(entries)) => {
            if entries.len() != s.spaces.len() {
                return Err(mismatch());
            }
            let mut rest = out;
            for ((name, sub), (key, item)) in s.spaces.iter().zip(entries) {
                if name != key {
                    return Err(mismatch());
                }
                rest = flatten_out(sub, item, rest)?;
            }
            Ok(rest)
        }
        (Space::Tuple(s), Sample::Tuple(entries)) => {
            if entries.len() != s.spaces.len() {
                return Err(mismatch());
            }
            let mut rest = out;
            for (sub, item) in s.spaces.iter().zip(entries) {
                rest = flatten_out(sub, item, rest)?;
            }
            Ok(rest)
        }
        (Space::Sparse(s), Sample::None) => {
            // Flag element set, payload left zeroed.
            out[0] = F::one();
            Ok(&mut out[1 + flatdim(&s.base)..])
        }
        (Space::Sparse(s), value) => flatten_out(&s.base, value, &mut out[1..]),
        _ => Err(mismatch()),
    }
}

/// Decode a flat vector back into an element of `space`.
pub fn unflatten<F: Float>(space: &Space, flat: &[F]) -> Result<Sample, SpaceError> {
    let expected = flatdim(space);
    if flat.len() != expected {
        return Err(SpaceError::BadFlatLength {
            expected,
            found: flat.len(),
        });
    }
    unflatten_prefix(space, flat).map(|(sample, _)| sample)
}

fn argmax<F: Float>(slice: &[F]) -> usize {
    let mut best = 0;
    for (i, x) in slice.iter().enumerate() {
        if *x > slice[best] {
            best = i;
        }
    }
    best
}

fn unflatten_prefix<'a, F: Float>(
    space: &Space,
    flat: &'a [F],
) -> Result<(Sample, &'a [F]), SpaceError> {
    match space {
        Space::Discrete(s) => {
            let (head, rest) = flat.split_at(s.n as usize);
            Ok((Sample::Discrete(argmax(head) as i64), rest))
        }
        Space::Box(s) => {
            let (head, rest) = flat.split_at(s.low.len());
            let values: Vec<f32> = head
                .iter()
                .map(|x| x.to_f32().expect("Float converts to f32"))
                .collect();
            let array = ArrayD::from_shape_vec(IxDyn(s.shape()), values)
                .expect("length matches space shape");
            Ok((Sample::Box(array), rest))
        }
        Space::MultiDiscrete(s) => {
            let mut rest = flat;
            let mut values = Vec::with_capacity(s.nvec.len());
            for &n in &s.nvec {
                let (head, tail) = rest.split_at(n as usize);
                values.push(argmax(head) as i64);
                rest = tail;
            }
            let array = ArrayD::from_shape_vec(IxDyn(s.shape()), values)
                .expect("length matches space shape");
            Ok((Sample::MultiDiscrete(array), rest))
        }
        Space::Dict(s) => {
            let mut rest = flat;
            let mut entries = Vec::with_capacity(s.spaces.len());
            for (name, sub) in &s.spaces {
                let (sample, tail) = unflatten_prefix(sub, rest)?;
                entries.push((name.clone(), sample));
                rest = tail;
            }
            Ok((Sample::Dict(entries), rest))
        }
        Space::Tuple(s) => {
            let mut rest = flat;
            let mut entries = Vec::with_capacity(s.spaces.len());
            for sub in &s.spaces {
                let (sample, tail) = unflatten_prefix(sub, rest)?;
                entries.push(sample);
                rest = tail;
            }
            Ok((Sample::Tuple(entries), rest))
        }
        Space::Sparse(s) => {
            let (flag, rest) = flat.split_first().expect("flatdim(Sparse) >= 1");
            let width = flatdim(&s.base);
            if *flag > F::from(0.5).expect("0.5 converts to any Float") {
                Ok((Sample::None, &rest[width..]))
            } else {
                let (sample, tail) = unflatten_prefix(&s.base, rest)?;
                Ok((sample, tail))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::{
        BoxSpace, DictSpace, DiscreteSpace, MultiDiscreteSpace, SparseSpace, TupleSpace,
    };
    use super::*;
    use crate::Prng;
    use ndarray::arr1;
    use rand::SeedableRng;

    fn roundtrip(space: &Space, value: &Sample) {
        let flat: Vec<f64> = flatten(space, value).unwrap();
        assert_eq!(flat.len(), flatdim(space));
        assert_eq!(&unflatten(space, &flat).unwrap(), value);
    }

    #[test]
    fn discrete_one_hot() {
        let space: Space = DiscreteSpace::new(4).into();
        let flat: Vec<f32> = flatten(&space, &Sample::Discrete(2)).unwrap();
        assert_eq!(flat, vec![0.0, 0.0, 1.0, 0.0]);
        roundtrip(&space, &Sample::Discrete(2));
    }

    #[test]
    fn multi_discrete_blocks() {
        let space: Space = MultiDiscreteSpace::new(arr1(&[2, 3]).into_dyn()).into();
        let value = Sample::MultiDiscrete(arr1(&[1, 0]).into_dyn());
        let flat: Vec<f32> = flatten(&space, &value).unwrap();
        assert_eq!(flat, vec![0.0, 1.0, 1.0, 0.0, 0.0]);
        roundtrip(&space, &value);
    }

    #[test]
    fn box_ravel() {
        let space: Space = BoxSpace::uniform(&[2, 2], -1.0, 1.0).into();
        let mut rng = Prng::seed_from_u64(0);
        roundtrip(&space, &space.sample(&mut rng));
    }

    #[test]
    fn sparse_none_sets_flag() {
        let space: Space = SparseSpace::new(DiscreteSpace::new(3).into(), 0.5).into();
        assert_eq!(flatdim(&space), 4);
        let flat: Vec<f32> = flatten(&space, &Sample::None).unwrap();
        assert_eq!(flat, vec![1.0, 0.0, 0.0, 0.0]);
        roundtrip(&space, &Sample::None);
    }

    #[test]
    fn sparse_value_keeps_flag_clear() {
        let space: Space = SparseSpace::new(DiscreteSpace::new(3).into(), 0.5).into();
        let flat: Vec<f32> = flatten(&space, &Sample::Discrete(1)).unwrap();
        assert_eq!(flat, vec![0.0, 0.0, 1.0, 0.0]);
        roundtrip(&space, &Sample::Discrete(1));
    }

    #[test]
    fn composite_roundtrip() {
        let space: Space = DictSpace::new(vec![
            (
                "pair".into(),
                TupleSpace::new(vec![
                    DiscreteSpace::new(2).into(),
                    BoxSpace::uniform(&[3], 0.0, 1.0).into(),
                ])
                .into(),
            ),
            (
                "maybe".into(),
                SparseSpace::new(DiscreteSpace::new(5).into(), 0.5).into(),
            ),
        ])
        .into();
        let mut rng = Prng::seed_from_u64(3);
        for _ in 0..20 {
            roundtrip(&space, &space.sample(&mut rng));
        }
    }

    #[test]
    fn wrong_length_rejected() {
        let space: Space = DiscreteSpace::new(4).into();
        assert!(matches!(
            unflatten::<f32>(&space, &[0.0, 1.0]),
            Err(SpaceError::BadFlatLength {
                expected: 4,
                found: 2
            })
        ));
    }
}
