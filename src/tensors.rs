//! Conversion between [`Sample`]s and torch tensors.
//!
//! Numeric leaves become tensors (`Kind::Float` for box values, `Kind::Int64`
//! for discrete ones) while composite structure is kept as nested
//! [`TensorSample`]s, mirroring the sample tree. Withheld sparse observations
//! stay distinguished as [`TensorSample::None`] rather than being encoded as
//! a sentinel value.
use crate::batch_env::{BatchEnv, BatchStep};
use crate::codec;
use crate::envs::Info;
use crate::error::BatchEnvError;
use crate::spaces::{Sample, Space};
use crate::Prng;
use ndarray::{ArrayD, IxDyn};
use tch::{Device, Kind, Tensor};
use thiserror::Error;

/// A sample with tensor leaves.
#[derive(Debug)]
pub enum TensorSample {
    Tensor(Tensor),
    Dict(Vec<(String, TensorSample)>),
    Tuple(Vec<TensorSample>),
    None,
}

/// Error converting between samples and tensors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TensorError {
    #[error("value structure does not match space `{space}`")]
    Structure { space: &'static str },
    #[error("tensor shape {found:?} does not match space shape {expected:?}")]
    Shape { expected: Vec<i64>, found: Vec<i64> },
}

/// Convert a sample of `space` into tensor form on `device`.
pub fn to_tensor(
    space: &Space,
    value: &Sample,
    device: Device,
) -> Result<TensorSample, TensorError> {
    match (space, value) {
        (Space::Discrete(_), Sample::Discrete(v)) => {
            Ok(TensorSample::Tensor(Tensor::from(*v).to_device(device)))
        }
        (Space::Box(_), Sample::Box(array)) => Ok(TensorSample::Tensor(array_to_tensor(
            array,
            Kind::Float,
            device,
        ))),
        (Space::MultiDiscrete(_), Sample::MultiDiscrete(array)) => Ok(TensorSample::Tensor(
            array_to_tensor(array, Kind::Int64, device),
        )),
        (Space::Dict(space), Sample::Dict(entries)) if space.spaces.len() == entries.len() => {
            Ok(TensorSample::Dict(
                space
                    .spaces
                    .iter()
                    .zip(entries)
                    .map(|((name, sub), (_, item))| {
                        Ok((name.clone(), to_tensor(sub, item, device)?))
                    })
                    .collect::<Result<_, TensorError>>()?,
            ))
        }
        (Space::Tuple(space), Sample::Tuple(entries)) if space.spaces.len() == entries.len() => {
            Ok(TensorSample::Tuple(
                space
                    .spaces
                    .iter()
                    .zip(entries)
                    .map(|(sub, item)| to_tensor(sub, item, device))
                    .collect::<Result<_, _>>()?,
            ))
        }
        (Space::Sparse(_), Sample::None) => Ok(TensorSample::None),
        (Space::Sparse(space), value) => to_tensor(&space.base, value, device),
        (space, _) => Err(TensorError::Structure { space: space.kind() }),
    }
}

/// Convert tensor form back into a sample of `space`; the inverse of
/// [`to_tensor`].
pub fn from_tensor(space: &Space, value: &TensorSample) -> Result<Sample, TensorError> {
    match (space, value) {
        (Space::Discrete(_), TensorSample::Tensor(tensor)) => {
            Ok(Sample::Discrete(i64::from(tensor)))
        }
        (Space::Box(s), TensorSample::Tensor(tensor)) => {
            Ok(Sample::Box(tensor_to_array::<f32>(tensor, s.shape(), Kind::Float)?))
        }
        (Space::MultiDiscrete(s), TensorSample::Tensor(tensor)) => Ok(Sample::MultiDiscrete(
            tensor_to_array::<i64>(tensor, s.shape(), Kind::Int64)?,
        )),
        (Space::Dict(space), TensorSample::Dict(entries))
            if space.spaces.len() == entries.len() =>
        {
            Ok(Sample::Dict(
                space
                    .spaces
                    .iter()
                    .zip(entries)
                    .map(|((name, sub), (_, item))| Ok((name.clone(), from_tensor(sub, item)?)))
                    .collect::<Result<_, TensorError>>()?,
            ))
        }
        (Space::Tuple(space), TensorSample::Tuple(entries))
            if space.spaces.len() == entries.len() =>
        {
            Ok(Sample::Tuple(
                space
                    .spaces
                    .iter()
                    .zip(entries)
                    .map(|(sub, item)| from_tensor(sub, item))
                    .collect::<Result<_, _>>()?,
            ))
        }
        (Space::Sparse(_), TensorSample::None) => Ok(Sample::None),
        (Space::Sparse(space), value) => from_tensor(&space.base, value),
        (space, _) => Err(TensorError::Structure { space: space.kind() }),
    }
}

fn array_to_tensor<T: tch::kind::Element + Copy>(
    array: &ArrayD<T>,
    kind: Kind,
    device: Device,
) -> Tensor {
    let contiguous = array.as_standard_layout();
    let shape: Vec<i64> = array.shape().iter().map(|&d| d as i64).collect();
    Tensor::of_slice(contiguous.as_slice().expect("standard layout"))
        .reshape(&shape)
        .to_kind(kind)
        .to_device(device)
}

fn tensor_to_array<T: tch::kind::Element + Copy>(
    tensor: &Tensor,
    shape: &[usize],
    kind: Kind,
) -> Result<ArrayD<T>, TensorError> {
    let expected: Vec<i64> = shape.iter().map(|&d| d as i64).collect();
    if tensor.size() != expected {
        return Err(TensorError::Shape {
            expected,
            found: tensor.size(),
        });
    }
    let values: Vec<T> = Vec::from(&tensor.to_kind(kind).contiguous().view(-1));
    Ok(ArrayD::from_shape_vec(IxDyn(shape), values).expect("length matches shape"))
}

/// A space whose samples are produced and checked in tensor form.
#[derive(Debug)]
pub struct TensorSpace {
    space: Space,
    device: Device,
}

impl TensorSpace {
    pub fn new(space: Space, device: Device) -> Self {
        Self { space, device }
    }

    /// The underlying sample-typed space.
    pub fn inner(&self) -> &Space {
        &self.space
    }

    pub fn sample(&self, rng: &mut Prng) -> TensorSample {
        let sample = self.space.sample(rng);
        to_tensor(&self.space, &sample, self.device)
            .unwrap_or_else(|_| unreachable!("own samples always convert"))
    }

    pub fn contains(&self, value: &TensorSample) -> bool {
        match from_tensor(&self.space, value) {
            Ok(sample) => self.space.contains(&sample),
            Err(_) => false,
        }
    }
}

/// The results of one batched step, in tensor form.
#[derive(Debug)]
pub struct TensorBatchStep {
    pub observations: TensorSample,
    /// `Kind::Float` tensor of length `n_envs`.
    pub rewards: Tensor,
    /// `Kind::Bool` tensor of length `n_envs`.
    pub dones: Tensor,
    pub infos: Vec<Info>,
}

/// A [`BatchEnv`] whose observations, actions and step results are tensors.
///
/// The batched observation, action and reward spaces are exposed decorated as
/// [`TensorSpace`]s on the wrapper's device; batched action tensors are
/// validated and split back into per-lane actions against the undecorated
/// spaces before being dispatched.
pub struct TensorEnv {
    inner: BatchEnv,
    observation_space: TensorSpace,
    action_space: TensorSpace,
    reward_space: TensorSpace,
    device: Device,
}

impl TensorEnv {
    pub fn new(inner: BatchEnv) -> Self {
        Self::with_device(inner, Device::Cpu)
    }

    pub fn with_device(inner: BatchEnv, device: Device) -> Self {
        let n = inner.n_envs();
        let observation_space = TensorSpace::new(inner.batch_observation_space().clone(), device);
        let action_space =
            TensorSpace::new(codec::batch_space(inner.action_space(), n), device);
        let reward_space =
            TensorSpace::new(codec::batch_space(inner.reward_space(), n), device);
        Self {
            inner,
            observation_space,
            action_space,
            reward_space,
            device,
        }
    }

    pub fn n_envs(&self) -> usize {
        self.inner.n_envs()
    }

    /// The underlying sample-typed batch environment.
    pub fn inner(&self) -> &BatchEnv {
        &self.inner
    }

    /// The space of batched observation tensors produced by
    /// [`reset`](Self::reset) and [`step`](Self::step).
    pub fn observation_space(&self) -> &TensorSpace {
        &self.observation_space
    }

    /// The space of batched action tensors accepted by [`step`](Self::step).
    pub fn action_space(&self) -> &TensorSpace {
        &self.action_space
    }

    /// The space of batched reward tensors returned by [`step`](Self::step).
    pub fn reward_space(&self) -> &TensorSpace {
        &self.reward_space
    }

    pub fn reset(&mut self) -> Result<TensorSample, BatchEnvError> {
        let observations = self.inner.reset()?;
        Ok(to_tensor(
            self.inner.batch_observation_space(),
            &observations,
            self.device,
        )?)
    }

    /// Step with one batched action tensor covering every lane.
    pub fn step(&mut self, actions: &TensorSample) -> Result<TensorBatchStep, BatchEnvError> {
        let batched = from_tensor(self.action_space.inner(), actions)?;
        let actions =
            codec::unbatch_samples(self.inner.action_space(), &batched, self.inner.n_envs())?;
        let step = self.inner.step(&actions)?;
        Ok(self.convert_step(step)?)
    }

    pub fn seed(&mut self, seed: u64) -> Result<Vec<u64>, BatchEnvError> {
        self.inner.seed(seed)
    }

    pub fn close(&mut self) -> Result<(), BatchEnvError> {
        self.inner.close()
    }

    fn convert_step(&self, step: BatchStep) -> Result<TensorBatchStep, TensorError> {
        let observations = to_tensor(
            self.inner.batch_observation_space(),
            &step.observations,
            self.device,
        )?;
        let rewards: Vec<f32> = step.rewards.iter().map(|&r| r as f32).collect();
        Ok(TensorBatchStep {
            observations,
            rewards: Tensor::of_slice(&rewards).to_device(self.device),
            dones: Tensor::of_slice(&step.dones).to_device(self.device),
            infos: step.infos,
        })
    }
}
