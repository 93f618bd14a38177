//! Batching and shared-memory serialization, one codec per space kind.
//!
//! The generic operations (`batch_space`, `create_shared_buffer`,
//! `write_sample`, `read_batch`, `unbatch_samples`) dispatch through the
//! [`SpaceCodec`] capability, resolved from the space's tag by [`resolve`].
//! The set of space kinds is sealed, so resolution is total; supporting a new
//! kind means implementing one codec and adding one arm to the resolver, not
//! editing the generic functions.
use crate::shmem::{ArraySegment, Dtype, FlagSegment, SharedBuffer};
use crate::spaces::{
    BoxSpace, DictSpace, DiscreteSpace, MultiDiscreteSpace, Sample, Space, SpaceError, TupleSpace,
};
use ndarray::{ArrayD, Axis, IxDyn};
use shared_memory::ShmemError;
use std::path::Path;

/// Per-kind implementation of batching and shared-memory transport.
///
/// `write` must be safe to call concurrently from different processes as long
/// as every call targets a distinct `index`; the buffer is partitioned by
/// slot and never locked.
pub trait SpaceCodec {
    /// The space describing `n` stacked samples of `space`.
    ///
    /// Deterministic: equal inputs produce equal spaces.
    fn batch(&self, space: &Space, n: usize) -> Space;

    /// Allocate process-shared storage for `n` samples of `space`.
    fn create(&self, space: &Space, n: usize, dir: &Path) -> Result<SharedBuffer, ShmemError>;

    /// Serialize one (non-batched) sample into slot `index`.
    fn write(
        &self,
        space: &Space,
        buffer: &SharedBuffer,
        index: usize,
        value: &Sample,
    ) -> Result<(), SpaceError>;

    /// Read back the single sample stored in slot `index`.
    fn read_slot(
        &self,
        space: &Space,
        buffer: &SharedBuffer,
        index: usize,
    ) -> Result<Sample, SpaceError>;

    /// Read all `n` slots as one batched sample shaped per [`Self::batch`].
    fn read_batch(
        &self,
        space: &Space,
        buffer: &SharedBuffer,
        n: usize,
    ) -> Result<Sample, SpaceError>;

    /// Split a batched sample back into `n` per-environment samples;
    /// the exact inverse of batching.
    fn unbatch(&self, space: &Space, batched: &Sample, n: usize)
        -> Result<Vec<Sample>, SpaceError>;
}

/// Resolve the codec for a space by its tag. Total over the sealed set.
pub fn resolve(space: &Space) -> &'static dyn SpaceCodec {
    match space {
        Space::Discrete(_) => &DiscreteCodec,
        Space::Box(_) => &BoxCodec,
        Space::MultiDiscrete(_) => &MultiDiscreteCodec,
        Space::Dict(_) => &DictCodec,
        Space::Tuple(_) => &TupleCodec,
        Space::Sparse(_) => &SparseCodec,
    }
}

/// See [`SpaceCodec::batch`].
pub fn batch_space(space: &Space, n: usize) -> Space {
    resolve(space).batch(space, n)
}

/// See [`SpaceCodec::create`].
pub fn create_shared_buffer(space: &Space, n: usize, dir: &Path) -> Result<SharedBuffer, ShmemError> {
    resolve(space).create(space, n, dir)
}

/// See [`SpaceCodec::write`].
pub fn write_sample(
    space: &Space,
    buffer: &SharedBuffer,
    index: usize,
    value: &Sample,
) -> Result<(), SpaceError> {
    resolve(space).write(space, buffer, index, value)
}

/// See [`SpaceCodec::read_batch`].
pub fn read_batch(space: &Space, buffer: &SharedBuffer, n: usize) -> Result<Sample, SpaceError> {
    resolve(space).read_batch(space, buffer, n)
}

/// See [`SpaceCodec::unbatch`].
pub fn unbatch_samples(
    space: &Space,
    batched: &Sample,
    n: usize,
) -> Result<Vec<Sample>, SpaceError> {
    resolve(space).unbatch(space, batched, n)
}

fn sample_mismatch(space: &Space, value: &Sample) -> SpaceError {
    SpaceError::SampleMismatch {
        space: space.kind(),
        sample: value.kind(),
    }
}

fn buffer_mismatch(space: &Space) -> SpaceError {
    SpaceError::BufferMismatch { space: space.kind() }
}

fn expect_array<'a>(space: &Space, buffer: &'a SharedBuffer) -> Result<&'a ArraySegment, SpaceError> {
    match buffer {
        SharedBuffer::Array(seg) => Ok(seg),
        _ => Err(buffer_mismatch(space)),
    }
}

fn bad_batch(expected: usize, reason: impl Into<String>) -> SpaceError {
    SpaceError::BadBatch {
        expected,
        reason: reason.into(),
    }
}

/// Stack a bounds array `n` times along a new leading axis.
fn stack_leading<T: Clone>(array: &ArrayD<T>, n: usize) -> ArrayD<T> {
    let mut shape = vec![n];
    shape.extend_from_slice(array.shape());
    array
        .broadcast(IxDyn(&shape))
        .expect("adding a leading axis always broadcasts")
        .to_owned()
}

struct DiscreteCodec;

impl DiscreteCodec {
    fn inner(space: &Space) -> &DiscreteSpace {
        match space {
            Space::Discrete(s) => s,
            _ => panic!("DiscreteCodec resolved for {} space", space.kind()),
        }
    }
}

impl SpaceCodec for DiscreteCodec {
    fn batch(&self, space: &Space, n: usize) -> Space {
        MultiDiscreteSpace::repeated(Self::inner(space).n, n).into()
    }

    fn create(&self, _space: &Space, n: usize, dir: &Path) -> Result<SharedBuffer, ShmemError> {
        Ok(SharedBuffer::Array(ArraySegment::create(
            dir,
            n,
            1,
            Dtype::I64,
        )?))
    }

    fn write(
        &self,
        space: &Space,
        buffer: &SharedBuffer,
        index: usize,
        value: &Sample,
    ) -> Result<(), SpaceError> {
        let seg = expect_array(space, buffer)?;
        match value {
            Sample::Discrete(v) => {
                seg.write_i64(index, &[*v]);
                Ok(())
            }
            _ => Err(sample_mismatch(space, value)),
        }
    }

    fn read_slot(
        &self,
        space: &Space,
        buffer: &SharedBuffer,
        index: usize,
    ) -> Result<Sample, SpaceError> {
        let seg = expect_array(space, buffer)?;
        Ok(Sample::Discrete(seg.read_slot_i64(index)[0]))
    }

    fn read_batch(
        &self,
        space: &Space,
        buffer: &SharedBuffer,
        n: usize,
    ) -> Result<Sample, SpaceError> {
        let seg = expect_array(space, buffer)?;
        let values = seg.read_all_i64();
        Ok(Sample::MultiDiscrete(
            ArrayD::from_shape_vec(IxDyn(&[n]), values).expect("segment holds n slots"),
        ))
    }

    fn unbatch(
        &self,
        _space: &Space,
        batched: &Sample,
        n: usize,
    ) -> Result<Vec<Sample>, SpaceError> {
        match batched {
            Sample::MultiDiscrete(values) if values.len() == n => {
                Ok(values.iter().map(|&v| Sample::Discrete(v)).collect())
            }
            other => Err(bad_batch(n, format!("expected MultiDiscrete[{}], got {}", n, other.kind()))),
        }
    }
}

struct BoxCodec;

impl BoxCodec {
    fn inner(space: &Space) -> &BoxSpace {
        match space {
            Space::Box(s) => s,
            _ => panic!("BoxCodec resolved for {} space", space.kind()),
        }
    }
}

impl SpaceCodec for BoxCodec {
    fn batch(&self, space: &Space, n: usize) -> Space {
        let s = Self::inner(space);
        BoxSpace::new(stack_leading(&s.low, n), stack_leading(&s.high, n)).into()
    }

    fn create(&self, space: &Space, n: usize, dir: &Path) -> Result<SharedBuffer, ShmemError> {
        let elem_len = Self::inner(space).low.len();
        Ok(SharedBuffer::Array(ArraySegment::create(
            dir,
            n,
            elem_len,
            Dtype::F32,
        )?))
    }

    fn write(
        &self,
        space: &Space,
        buffer: &SharedBuffer,
        index: usize,
        value: &Sample,
    ) -> Result<(), SpaceError> {
        let s = Self::inner(space);
        let seg = expect_array(space, buffer)?;
        match value {
            Sample::Box(v) if v.shape() == s.shape() => {
                let contiguous = v.as_standard_layout();
                seg.write_f32(index, contiguous.as_slice().expect("standard layout"));
                Ok(())
            }
            _ => Err(sample_mismatch(space, value)),
        }
    }

    fn read_slot(
        &self,
        space: &Space,
        buffer: &SharedBuffer,
        index: usize,
    ) -> Result<Sample, SpaceError> {
        let s = Self::inner(space);
        let seg = expect_array(space, buffer)?;
        let values = seg.read_slot_f32(index);
        Ok(Sample::Box(
            ArrayD::from_shape_vec(IxDyn(s.shape()), values).expect("slot length matches shape"),
        ))
    }

    fn read_batch(
        &self,
        space: &Space,
        buffer: &SharedBuffer,
        n: usize,
    ) -> Result<Sample, SpaceError> {
        let s = Self::inner(space);
        let seg = expect_array(space, buffer)?;
        let mut shape = vec![n];
        shape.extend_from_slice(s.shape());
        Ok(Sample::Box(
            ArrayD::from_shape_vec(IxDyn(&shape), seg.read_all_f32())
                .expect("segment holds n slots"),
        ))
    }

    fn unbatch(
        &self,
        _space: &Space,
        batched: &Sample,
        n: usize,
    ) -> Result<Vec<Sample>, SpaceError> {
        match batched {
            Sample::Box(values) if values.shape().first() == Some(&n) => Ok((0..n)
                .map(|i| Sample::Box(values.index_axis(Axis(0), i).to_owned()))
                .collect()),
            other => Err(bad_batch(n, format!("expected Box[{}, ..], got {}", n, other.kind()))),
        }
    }
}

struct MultiDiscreteCodec;

impl MultiDiscreteCodec {
    fn inner(space: &Space) -> &MultiDiscreteSpace {
        match space {
            Space::MultiDiscrete(s) => s,
            _ => panic!("MultiDiscreteCodec resolved for {} space", space.kind()),
        }
    }
}

impl SpaceCodec for MultiDiscreteCodec {
    fn batch(&self, space: &Space, n: usize) -> Space {
        let s = Self::inner(space);
        MultiDiscreteSpace::new(stack_leading(&s.nvec, n)).into()
    }

    fn create(&self, space: &Space, n: usize, dir: &Path) -> Result<SharedBuffer, ShmemError> {
        let elem_len = Self::inner(space).nvec.len();
        Ok(SharedBuffer::Array(ArraySegment::create(
            dir,
            n,
            elem_len,
            Dtype::I64,
        )?))
    }

    fn write(
        &self,
        space: &Space,
        buffer: &SharedBuffer,
        index: usize,
        value: &Sample,
    ) -> Result<(), SpaceError> {
        let s = Self::inner(space);
        let seg = expect_array(space, buffer)?;
        match value {
            Sample::MultiDiscrete(v) if v.shape() == s.shape() => {
                let contiguous = v.as_standard_layout();
                seg.write_i64(index, contiguous.as_slice().expect("standard layout"));
                Ok(())
            }
            _ => Err(sample_mismatch(space, value)),
        }
    }

    fn read_slot(
        &self,
        space: &Space,
        buffer: &SharedBuffer,
        index: usize,
    ) -> Result<Sample, SpaceError> {
        let s = Self::inner(space);
        let seg = expect_array(space, buffer)?;
        Ok(Sample::MultiDiscrete(
            ArrayD::from_shape_vec(IxDyn(s.shape()), seg.read_slot_i64(index))
                .expect("slot length matches shape"),
        ))
    }

    fn read_batch(
        &self,
        space: &Space,
        buffer: &SharedBuffer,
        n: usize,
    ) -> Result<Sample, SpaceError> {
        let s = Self::inner(space);
        let seg = expect_array(space, buffer)?;
        let mut shape = vec![n];
        shape.extend_from_slice(s.shape());
        Ok(Sample::MultiDiscrete(
            ArrayD::from_shape_vec(IxDyn(&shape), seg.read_all_i64())
                .expect("segment holds n slots"),
        ))
    }

    fn unbatch(
        &self,
        _space: &Space,
        batched: &Sample,
        n: usize,
    ) -> Result<Vec<Sample>, SpaceError> {
        match batched {
            Sample::MultiDiscrete(values) if values.shape().first() == Some(&n) => Ok((0..n)
                .map(|i| Sample::MultiDiscrete(values.index_axis(Axis(0), i).to_owned()))
                .collect()),
            other => Err(bad_batch(
                n,
                format!("expected MultiDiscrete[{}, ..], got {}", n, other.kind()),
            )),
        }
    }
}

struct DictCodec;

impl DictCodec {
    fn inner(space: &Space) -> &DictSpace {
        match space {
            Space::Dict(s) => s,
            _ => panic!("DictCodec resolved for {} space", space.kind()),
        }
    }
}

impl SpaceCodec for DictCodec {
    fn batch(&self, space: &Space, n: usize) -> Space {
        DictSpace::new(
            Self::inner(space)
                .spaces
                .iter()
                .map(|(name, sub)| (name.clone(), batch_space(sub, n)))
                .collect(),
        )
        .into()
    }

    fn create(&self, space: &Space, n: usize, dir: &Path) -> Result<SharedBuffer, ShmemError> {
        Ok(SharedBuffer::Dict(
            Self::inner(space)
                .spaces
                .iter()
                .map(|(name, sub)| Ok((name.clone(), create_shared_buffer(sub, n, dir)?)))
                .collect::<Result<_, ShmemError>>()?,
        ))
    }

    fn write(
        &self,
        space: &Space,
        buffer: &SharedBuffer,
        index: usize,
        value: &Sample,
    ) -> Result<(), SpaceError> {
        let s = Self::inner(space);
        let children = match buffer {
            SharedBuffer::Dict(children) if children.len() == s.spaces.len() => children,
            _ => return Err(buffer_mismatch(space)),
        };
        let entries = match value {
            Sample::Dict(entries) if entries.len() == s.spaces.len() => entries,
            _ => return Err(sample_mismatch(space, value)),
        };
        for (((name, sub), (_, child)), (key, item)) in
            s.spaces.iter().zip(children).zip(entries)
        {
            if name != key {
                return Err(sample_mismatch(space, value));
            }
            write_sample(sub, child, index, item)?;
        }
        Ok(())
    }

    fn read_slot(
        &self,
        space: &Space,
        buffer: &SharedBuffer,
        index: usize,
    ) -> Result<Sample, SpaceError> {
        let s = Self::inner(space);
        let children = match buffer {
            SharedBuffer::Dict(children) if children.len() == s.spaces.len() => children,
            _ => return Err(buffer_mismatch(space)),
        };
        Ok(Sample::Dict(
            s.spaces
                .iter()
                .zip(children)
                .map(|((name, sub), (_, child))| {
                    Ok((name.clone(), resolve(sub).read_slot(sub, child, index)?))
                })
                .collect::<Result<_, SpaceError>>()?,
        ))
    }

    fn read_batch(
        &self,
        space: &Space,
        buffer: &SharedBuffer,
        n: usize,
    ) -> Result<Sample, SpaceError> {
        let s = Self::inner(space);
        let children = match buffer {
            SharedBuffer::Dict(children) if children.len() == s.spaces.len() => children,
            _ => return Err(buffer_mismatch(space)),
        };
        Ok(Sample::Dict(
            s.spaces
                .iter()
                .zip(children)
                .map(|((name, sub), (_, child))| Ok((name.clone(), read_batch(sub, child, n)?)))
                .collect::<Result<_, SpaceError>>()?,
        ))
    }

    fn unbatch(&self, space: &Space, batched: &Sample, n: usize) -> Result<Vec<Sample>, SpaceError> {
        let s = Self::inner(space);
        let entries = match batched {
            Sample::Dict(entries) if entries.len() == s.spaces.len() => entries,
            other => {
                return Err(bad_batch(n, format!("expected Dict, got {}", other.kind())));
            }
        };
        // Unbatch each field, then transpose to one Dict per lane.
        let mut lanes: Vec<Vec<(String, Sample)>> = vec![Vec::with_capacity(s.spaces.len()); n];
        for ((name, sub), (_, item)) in s.spaces.iter().zip(entries) {
            for (lane, sample) in lanes.iter_mut().zip(unbatch_samples(sub, item, n)?) {
                lane.push((name.clone(), sample));
            }
        }
        Ok(lanes.into_iter().map(Sample::Dict).collect())
    }
}

struct TupleCodec;

impl TupleCodec {
    fn inner(space: &Space) -> &TupleSpace {
        match space {
            Space::Tuple(s) => s,
            _ => panic!("TupleCodec resolved for {} space", space.kind()),
        }
    }
}

impl SpaceCodec for TupleCodec {
    fn batch(&self, space: &Space, n: usize) -> Space {
        TupleSpace::new(
            Self::inner(space)
                .spaces
                .iter()
                .map(|sub| batch_space(sub, n))
                .collect(),
        )
        .into()
    }

    fn create(&self, space: &Space, n: usize, dir: &Path) -> Result<SharedBuffer, ShmemError> {
        Ok(SharedBuffer::Tuple(
            Self::inner(space)
                .spaces
                .iter()
                .map(|sub| create_shared_buffer(sub, n, dir))
                .collect::<Result<_, _>>()?,
        ))
    }

    fn write(
        &self,
        space: &Space,
        buffer: &SharedBuffer,
        index: usize,
        value: &Sample,
    ) -> Result<(), SpaceError> {
        let s = Self::inner(space);
        let children = match buffer {
            SharedBuffer::Tuple(children) if children.len() == s.spaces.len() => children,
            _ => return Err(buffer_mismatch(space)),
        };
        let entries = match value {
            Sample::Tuple(entries) if entries.len() == s.spaces.len() => entries,
            _ => return Err(sample_mismatch(space, value)),
        };
        for ((sub, child), item) in s.spaces.iter().zip(children).zip(entries) {
            write_sample(sub, child, index, item)?;
        }
        Ok(())
    }

    fn read_slot(
        &self,
        space: &Space,
        buffer: &SharedBuffer,
        index: usize,
    ) -> Result<Sample, SpaceError> {
        let s = Self::inner(space);
        let children = match buffer {
            SharedBuffer::Tuple(children) if children.len() == s.spaces.len() => children,
            _ => return Err(buffer_mismatch(space)),
        };
        Ok(Sample::Tuple(
            s.spaces
                .iter()
                .zip(children)
                .map(|(sub, child)| resolve(sub).read_slot(sub, child, index))
                .collect::<Result<_, _>>()?,
        ))
    }

    fn read_batch(
        &self,
        space: &Space,
        buffer: &SharedBuffer,
        n: usize,
    ) -> Result<Sample, SpaceError> {
        let s = Self::inner(space);
        let children = match buffer {
            SharedBuffer::Tuple(children) if children.len() == s.spaces.len() => children,
            _ => return Err(buffer_mismatch(space)),
        };
        Ok(Sample::Tuple(
            s.spaces
                .iter()
                .zip(children)
                .map(|(sub, child)| read_batch(sub, child, n))
                .collect::<Result<_, _>>()?,
        ))
    }

    fn unbatch(&self, space: &Space, batched: &Sample, n: usize) -> Result<Vec<Sample>, SpaceError> {
        let s = Self::inner(space);
        let entries = match batched {
            Sample::Tuple(entries) if entries.len() == s.spaces.len() => entries,
            other => {
                return Err(bad_batch(n, format!("expected Tuple, got {}", other.kind())));
            }
        };
        let mut lanes: Vec<Vec<Sample>> = vec![Vec::with_capacity(s.spaces.len()); n];
        for (sub, item) in s.spaces.iter().zip(entries) {
            for (lane, sample) in lanes.iter_mut().zip(unbatch_samples(sub, item, n)?) {
                lane.push(sample);
            }
        }
        Ok(lanes.into_iter().map(Sample::Tuple).collect())
    }
}

struct SparseCodec;

impl SparseCodec {
    fn inner(space: &Space) -> &crate::spaces::SparseSpace {
        match space {
            Space::Sparse(s) => s,
            _ => panic!("SparseCodec resolved for {} space", space.kind()),
        }
    }
}

impl SpaceCodec for SparseCodec {
    /// Dense sparse spaces (`none_prob == 0`) batch like their base; anything
    /// else falls back to a Tuple of `n` copies of the space. The batch width
    /// therefore depends on sparsity.
    fn batch(&self, space: &Space, n: usize) -> Space {
        let s = Self::inner(space);
        if s.none_prob == 0.0 {
            crate::spaces::SparseSpace::new(batch_space(&s.base, n), 0.0).into()
        } else {
            TupleSpace::repeated(space.clone(), n).into()
        }
    }

    /// The flag segment is allocated even at `none_prob == 0`, for layout
    /// uniformity; it just never gets set.
    fn create(&self, space: &Space, n: usize, dir: &Path) -> Result<SharedBuffer, ShmemError> {
        let s = Self::inner(space);
        Ok(SharedBuffer::Sparse {
            flags: FlagSegment::create(dir, n)?,
            value: Box::new(create_shared_buffer(&s.base, n, dir)?),
        })
    }

    fn write(
        &self,
        space: &Space,
        buffer: &SharedBuffer,
        index: usize,
        value: &Sample,
    ) -> Result<(), SpaceError> {
        let s = Self::inner(space);
        let (flags, nested) = match buffer {
            SharedBuffer::Sparse { flags, value } => (flags, value),
            _ => return Err(buffer_mismatch(space)),
        };
        match value {
            Sample::None => {
                // Payload bytes for this slot are left as garbage; the flag
                // makes readers ignore them.
                flags.set(index, true);
                Ok(())
            }
            value => {
                flags.set(index, false);
                write_sample(&s.base, nested, index, value)
            }
        }
    }

    fn read_slot(
        &self,
        space: &Space,
        buffer: &SharedBuffer,
        index: usize,
    ) -> Result<Sample, SpaceError> {
        let s = Self::inner(space);
        let (flags, nested) = match buffer {
            SharedBuffer::Sparse { flags, value } => (flags, value),
            _ => return Err(buffer_mismatch(space)),
        };
        if flags.get(index) {
            Ok(Sample::None)
        } else {
            resolve(&s.base).read_slot(&s.base, nested, index)
        }
    }

    fn read_batch(
        &self,
        space: &Space,
        buffer: &SharedBuffer,
        n: usize,
    ) -> Result<Sample, SpaceError> {
        let s = Self::inner(space);
        let (_, nested) = match buffer {
            SharedBuffer::Sparse { flags, value } => (flags, value),
            _ => return Err(buffer_mismatch(space)),
        };
        if s.none_prob == 0.0 {
            // Dense representation: the batched sample is the base's.
            read_batch(&s.base, nested, n)
        } else {
            // Heterogeneous: a sequence with `None` holes, not an array.
            Ok(Sample::Tuple(
                (0..n)
                    .map(|index| self.read_slot(space, buffer, index))
                    .collect::<Result<_, _>>()?,
            ))
        }
    }

    fn unbatch(&self, space: &Space, batched: &Sample, n: usize) -> Result<Vec<Sample>, SpaceError> {
        let s = Self::inner(space);
        if s.none_prob == 0.0 {
            return unbatch_samples(&s.base, batched, n);
        }
        match batched {
            Sample::Tuple(entries) if entries.len() == n => Ok(entries.clone()),
            other => Err(bad_batch(
                n,
                format!("expected Tuple of {} optional values, got {}", n, other.kind()),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spaces::SparseSpace;
    use crate::Prng;
    use ndarray::arr1;
    use rand::SeedableRng;
    use std::fs;
    use std::path::PathBuf;

    fn scratch_dir() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("batchenv-codec-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn batch_discrete_is_multi_discrete() {
        let space: Space = DiscreteSpace::new(2).into();
        assert_eq!(
            batch_space(&space, 5),
            MultiDiscreteSpace::repeated(2, 5).into()
        );
    }

    #[test]
    fn batch_box_stacks_bounds() {
        let space: Space = BoxSpace::uniform(&[4], -1.0, 1.0).into();
        match batch_space(&space, 3) {
            Space::Box(batched) => assert_eq!(batched.shape(), &[3, 4]),
            other => panic!("unexpected batched space {}", other),
        }
    }

    #[test]
    fn batch_is_deterministic() {
        let space: Space = DictSpace::new(vec![
            ("a".into(), BoxSpace::uniform(&[2], 0.0, 1.0).into()),
            (
                "b".into(),
                SparseSpace::new(DiscreteSpace::new(3).into(), 0.5).into(),
            ),
        ])
        .into();
        assert_eq!(batch_space(&space, 7), batch_space(&space, 7));
    }

    #[test]
    fn batch_sparse_depends_on_sparsity() {
        // Dense sparse batches like its base; sparse falls back to a Tuple
        // of n copies. The width difference is inherited behaviour.
        let base: Space = DiscreteSpace::new(3).into();
        let dense: Space = SparseSpace::new(base.clone(), 0.0).into();
        let sparse: Space = SparseSpace::new(base.clone(), 0.5).into();
        assert_eq!(
            batch_space(&dense, 4),
            SparseSpace::new(MultiDiscreteSpace::repeated(3, 4).into(), 0.0).into()
        );
        assert_eq!(
            batch_space(&sparse, 4),
            TupleSpace::repeated(sparse.clone(), 4).into()
        );
    }

    #[test]
    fn box_write_read_batch() {
        let space: Space = BoxSpace::uniform(&[2], -10.0, 10.0).into();
        let buffer = create_shared_buffer(&space, 3, &scratch_dir()).unwrap();
        for i in 0..3 {
            let value = Sample::Box(arr1(&[i as f32, -(i as f32)]).into_dyn());
            write_sample(&space, &buffer, i, &value).unwrap();
        }
        match read_batch(&space, &buffer, 3).unwrap() {
            Sample::Box(batch) => {
                assert_eq!(batch.shape(), &[3, 2]);
                assert_eq!(batch[[2, 0]], 2.0);
                assert_eq!(batch[[2, 1]], -2.0);
            }
            other => panic!("unexpected batch {:?}", other),
        }
    }

    #[test]
    fn sparse_round_trip_preserves_none_pattern() {
        let space: Space = SparseSpace::new(BoxSpace::uniform(&[1], -1.0, 1.0).into(), 0.5).into();
        let n = 6;
        let buffer = create_shared_buffer(&space, n, &scratch_dir()).unwrap();
        let values: Vec<Sample> = (0..n)
            .map(|i| {
                if i % 2 == 0 {
                    Sample::None
                } else {
                    Sample::Box(arr1(&[i as f32 / 10.0]).into_dyn())
                }
            })
            .collect();
        for (i, value) in values.iter().enumerate() {
            write_sample(&space, &buffer, i, value).unwrap();
        }
        match read_batch(&space, &buffer, n).unwrap() {
            Sample::Tuple(read) => assert_eq!(read, values),
            other => panic!("unexpected batch {:?}", other),
        }
    }

    #[test]
    fn sparse_slot_can_be_overwritten() {
        let space: Space = SparseSpace::new(DiscreteSpace::new(9).into(), 0.5).into();
        let buffer = create_shared_buffer(&space, 2, &scratch_dir()).unwrap();
        write_sample(&space, &buffer, 0, &Sample::None).unwrap();
        write_sample(&space, &buffer, 0, &Sample::Discrete(7)).unwrap();
        assert_eq!(
            resolve(&space).read_slot(&space, &buffer, 0).unwrap(),
            Sample::Discrete(7)
        );
    }

    #[test]
    fn dense_sparse_reads_as_base_batch() {
        let space: Space = SparseSpace::new(DiscreteSpace::new(5).into(), 0.0).into();
        let buffer = create_shared_buffer(&space, 3, &scratch_dir()).unwrap();
        for i in 0..3 {
            write_sample(&space, &buffer, i, &Sample::Discrete(i as i64)).unwrap();
        }
        assert_eq!(
            read_batch(&space, &buffer, 3).unwrap(),
            Sample::MultiDiscrete(arr1(&[0, 1, 2]).into_dyn())
        );
    }

    #[test]
    fn composite_write_read() {
        let space: Space = DictSpace::new(vec![
            ("x".into(), BoxSpace::uniform(&[2], -1.0, 1.0).into()),
            ("k".into(), DiscreteSpace::new(4).into()),
        ])
        .into();
        let n = 4;
        let buffer = create_shared_buffer(&space, n, &scratch_dir()).unwrap();
        let mut rng = Prng::seed_from_u64(5);
        let samples: Vec<Sample> = (0..n).map(|_| space.sample(&mut rng)).collect();
        for (i, sample) in samples.iter().enumerate() {
            write_sample(&space, &buffer, i, sample).unwrap();
        }
        let lanes = unbatch_samples(&space, &read_batch(&space, &buffer, n).unwrap(), n).unwrap();
        assert_eq!(lanes, samples);
    }

    #[test]
    fn unbatch_inverts_batching_of_samples() {
        let space: Space = TupleSpace::new(vec![
            DiscreteSpace::new(3).into(),
            BoxSpace::uniform(&[], 0.0, 1.0).into(),
        ])
        .into();
        let n = 5;
        let buffer = create_shared_buffer(&space, n, &scratch_dir()).unwrap();
        let mut rng = Prng::seed_from_u64(9);
        let samples: Vec<Sample> = (0..n).map(|_| space.sample(&mut rng)).collect();
        for (i, sample) in samples.iter().enumerate() {
            write_sample(&space, &buffer, i, sample).unwrap();
        }
        let batched = read_batch(&space, &buffer, n).unwrap();
        assert_eq!(unbatch_samples(&space, &batched, n).unwrap(), samples);
    }

    #[test]
    fn mismatched_sample_is_descriptive() {
        let space: Space = DiscreteSpace::new(3).into();
        let buffer = create_shared_buffer(&space, 1, &scratch_dir()).unwrap();
        let err = write_sample(&space, &buffer, 0, &Sample::None).unwrap_err();
        assert_eq!(
            err,
            SpaceError::SampleMismatch {
                space: "Discrete",
                sample: "None"
            }
        );
    }
}
