//! Process-shared storage for batched observations.
//!
//! A [`SharedBuffer`] is a tree of OS shared-memory segments mirroring the
//! structure of a [`Space`](crate::spaces::Space): flat numeric segments at
//! the leaves, one child buffer per member of a composite space, and a
//! flag-plus-payload pair for sparse spaces. The layout is private to one
//! controller's lifetime; nothing about it is stable across versions.
//!
//! Concurrency discipline is partition-by-slot: each worker process writes
//! only to its own slot indices and the parent reads only after it has
//! received every worker's reply for the round, so the pipe acknowledgement
//! is the sole synchronization point and no lock is needed.
use serde::{Deserialize, Serialize};
use shared_memory::{Shmem, ShmemConf, ShmemError};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

/// Element type of an [`ArraySegment`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Dtype {
    F32,
    I64,
}

impl Dtype {
    pub const fn size_of(self) -> usize {
        match self {
            Self::F32 => 4,
            Self::I64 => 8,
        }
    }
}

static SEGMENT_ID: AtomicU64 = AtomicU64::new(0);

fn next_flink(dir: &Path) -> PathBuf {
    let id = SEGMENT_ID.fetch_add(1, Ordering::Relaxed);
    dir.join(format!("seg-{:04}.shm", id))
}

/// A flat shared segment holding `n` slots of `elem_len` elements each.
pub struct ArraySegment {
    shmem: Shmem,
    flink: PathBuf,
    n: usize,
    elem_len: usize,
    dtype: Dtype,
}

// The segment is only ever mapped at a fixed size and written through raw
// pointers scoped to a single slot, so moving the handle between threads is
// no more dangerous than using it in place.
unsafe impl Send for ArraySegment {}

impl ArraySegment {
    /// Allocate an owning segment backed by a fresh flink file under `dir`.
    pub fn create(dir: &Path, n: usize, elem_len: usize, dtype: Dtype) -> Result<Self, ShmemError> {
        let flink = next_flink(dir);
        let bytes = (n * elem_len * dtype.size_of()).max(1);
        let shmem = ShmemConf::new().size(bytes).flink(&flink).create()?;
        Ok(Self {
            shmem,
            flink,
            n,
            elem_len,
            dtype,
        })
    }

    /// Attach to an existing segment from its handle.
    pub fn open(handle: &ArrayHandle) -> Result<Self, ShmemError> {
        let shmem = ShmemConf::new().flink(&handle.flink).open()?;
        Ok(Self {
            shmem,
            flink: handle.flink.clone(),
            n: handle.n,
            elem_len: handle.elem_len,
            dtype: handle.dtype,
        })
    }

    pub fn handle(&self) -> ArrayHandle {
        ArrayHandle {
            flink: self.flink.clone(),
            n: self.n,
            elem_len: self.elem_len,
            dtype: self.dtype,
        }
    }

    pub const fn elem_len(&self) -> usize {
        self.elem_len
    }

    pub const fn dtype(&self) -> Dtype {
        self.dtype
    }

    fn slot_offset(&self, index: usize) -> usize {
        assert!(index < self.n, "slot index {} out of range {}", index, self.n);
        index * self.elem_len * self.dtype.size_of()
    }

    /// Write one slot. Safe for concurrent use across *distinct* indices.
    pub fn write_f32(&self, index: usize, values: &[f32]) {
        assert_eq!(self.dtype, Dtype::F32);
        assert_eq!(values.len(), self.elem_len);
        let offset = self.slot_offset(index);
        // Safety: offset + len is within the mapping (checked by slot_offset)
        // and the protocol guarantees no other process touches this slot
        // concurrently.
        unsafe {
            let dst = self.shmem.as_ptr().add(offset).cast::<f32>();
            std::ptr::copy_nonoverlapping(values.as_ptr(), dst, values.len());
        }
    }

    pub fn write_i64(&self, index: usize, values: &[i64]) {
        assert_eq!(self.dtype, Dtype::I64);
        assert_eq!(values.len(), self.elem_len);
        let offset = self.slot_offset(index);
        unsafe {
            let dst = self.shmem.as_ptr().add(offset).cast::<i64>();
            std::ptr::copy_nonoverlapping(values.as_ptr(), dst, values.len());
        }
    }

    pub fn read_slot_f32(&self, index: usize) -> Vec<f32> {
        assert_eq!(self.dtype, Dtype::F32);
        let offset = self.slot_offset(index);
        let mut out = vec![0.0; self.elem_len];
        unsafe {
            let src = self.shmem.as_ptr().add(offset).cast::<f32>();
            std::ptr::copy_nonoverlapping(src, out.as_mut_ptr(), out.len());
        }
        out
    }

    pub fn read_slot_i64(&self, index: usize) -> Vec<i64> {
        assert_eq!(self.dtype, Dtype::I64);
        let offset = self.slot_offset(index);
        let mut out = vec![0; self.elem_len];
        unsafe {
            let src = self.shmem.as_ptr().add(offset).cast::<i64>();
            std::ptr::copy_nonoverlapping(src, out.as_mut_ptr(), out.len());
        }
        out
    }

    /// Read every slot as one contiguous vector, in slot order.
    pub fn read_all_f32(&self) -> Vec<f32> {
        assert_eq!(self.dtype, Dtype::F32);
        let mut out = vec![0.0; self.n * self.elem_len];
        unsafe {
            let src = self.shmem.as_ptr().cast::<f32>();
            std::ptr::copy_nonoverlapping(src, out.as_mut_ptr(), out.len());
        }
        out
    }

    pub fn read_all_i64(&self) -> Vec<i64> {
        assert_eq!(self.dtype, Dtype::I64);
        let mut out = vec![0; self.n * self.elem_len];
        unsafe {
            let src = self.shmem.as_ptr().cast::<i64>();
            std::ptr::copy_nonoverlapping(src, out.as_mut_ptr(), out.len());
        }
        out
    }
}

impl fmt::Debug for ArraySegment {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("ArraySegment")
            .field("flink", &self.flink)
            .field("n", &self.n)
            .field("elem_len", &self.elem_len)
            .field("dtype", &self.dtype)
            .finish()
    }
}

/// One byte per slot marking whether the slot's payload is absent (`None`).
pub struct FlagSegment {
    shmem: Shmem,
    flink: PathBuf,
    n: usize,
}

unsafe impl Send for FlagSegment {}

impl FlagSegment {
    pub fn create(dir: &Path, n: usize) -> Result<Self, ShmemError> {
        let flink = next_flink(dir);
        let shmem = ShmemConf::new().size(n.max(1)).flink(&flink).create()?;
        Ok(Self { shmem, flink, n })
    }

    pub fn open(handle: &FlagHandle) -> Result<Self, ShmemError> {
        let shmem = ShmemConf::new().flink(&handle.flink).open()?;
        Ok(Self {
            shmem,
            flink: handle.flink.clone(),
            n: handle.n,
        })
    }

    pub fn handle(&self) -> FlagHandle {
        FlagHandle {
            flink: self.flink.clone(),
            n: self.n,
        }
    }

    pub fn set(&self, index: usize, is_none: bool) {
        assert!(index < self.n);
        unsafe { self.shmem.as_ptr().add(index).write(is_none as u8) }
    }

    pub fn get(&self, index: usize) -> bool {
        assert!(index < self.n);
        unsafe { self.shmem.as_ptr().add(index).read() != 0 }
    }
}

impl fmt::Debug for FlagSegment {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("FlagSegment")
            .field("flink", &self.flink)
            .field("n", &self.n)
            .finish()
    }
}

/// Serializable descriptor of an [`ArraySegment`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArrayHandle {
    pub flink: PathBuf,
    pub n: usize,
    pub elem_len: usize,
    pub dtype: Dtype,
}

/// Serializable descriptor of a [`FlagSegment`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlagHandle {
    pub flink: PathBuf,
    pub n: usize,
}

/// Storage for `n` samples of one space, shared across processes.
#[derive(Debug)]
pub enum SharedBuffer {
    Array(ArraySegment),
    Dict(Vec<(String, SharedBuffer)>),
    Tuple(Vec<SharedBuffer>),
    Sparse {
        flags: FlagSegment,
        value: Box<SharedBuffer>,
    },
}

/// Serializable descriptor of a [`SharedBuffer`] tree, sent to workers so
/// they can attach to the same segments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum BufferHandle {
    Array(ArrayHandle),
    Dict(Vec<(String, BufferHandle)>),
    Tuple(Vec<BufferHandle>),
    Sparse {
        flags: FlagHandle,
        value: Box<BufferHandle>,
    },
}

impl SharedBuffer {
    pub fn handle(&self) -> BufferHandle {
        match self {
            Self::Array(seg) => BufferHandle::Array(seg.handle()),
            Self::Dict(children) => BufferHandle::Dict(
                children
                    .iter()
                    .map(|(name, child)| (name.clone(), child.handle()))
                    .collect(),
            ),
            Self::Tuple(children) => {
                BufferHandle::Tuple(children.iter().map(Self::handle).collect())
            }
            Self::Sparse { flags, value } => BufferHandle::Sparse {
                flags: flags.handle(),
                value: Box::new(value.handle()),
            },
        }
    }

    /// Attach to an existing buffer tree from the non-owning side.
    pub fn open(handle: &BufferHandle) -> Result<Self, ShmemError> {
        Ok(match handle {
            BufferHandle::Array(h) => Self::Array(ArraySegment::open(h)?),
            BufferHandle::Dict(children) => Self::Dict(
                children
                    .iter()
                    .map(|(name, child)| Ok((name.clone(), Self::open(child)?)))
                    .collect::<Result<_, ShmemError>>()?,
            ),
            BufferHandle::Tuple(children) => {
                Self::Tuple(children.iter().map(Self::open).collect::<Result<_, _>>()?)
            }
            BufferHandle::Sparse { flags, value } => Self::Sparse {
                flags: FlagSegment::open(flags)?,
                value: Box::new(Self::open(value)?),
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn scratch_dir() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("batchenv-test-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn array_slots_are_independent() {
        let seg = ArraySegment::create(&scratch_dir(), 3, 2, Dtype::F32).unwrap();
        seg.write_f32(0, &[1.0, 2.0]);
        seg.write_f32(2, &[5.0, 6.0]);
        assert_eq!(seg.read_slot_f32(0), vec![1.0, 2.0]);
        assert_eq!(seg.read_slot_f32(2), vec![5.0, 6.0]);
        assert_eq!(seg.read_all_f32()[..2], [1.0, 2.0]);
    }

    #[test]
    fn open_sees_writes_through_handle() {
        let seg = ArraySegment::create(&scratch_dir(), 2, 1, Dtype::I64).unwrap();
        let other = ArraySegment::open(&seg.handle()).unwrap();
        seg.write_i64(1, &[42]);
        assert_eq!(other.read_slot_i64(1), vec![42]);
    }

    #[test]
    fn flags_roundtrip() {
        let flags = FlagSegment::create(&scratch_dir(), 4).unwrap();
        flags.set(1, true);
        flags.set(3, true);
        flags.set(3, false);
        assert!(!flags.get(0));
        assert!(flags.get(1));
        assert!(!flags.get(3));
    }
}
