//! Environments
//!
//! An [`Env`] is a single stateful environment instance with runtime-typed
//! observations and actions ([`Sample`]), so that the same interface works on
//! both sides of a process boundary. Environments are constructed from a
//! serializable [`EnvSpec`] rather than from closures: worker processes
//! receive the spec over a socket and build their own instances.
mod cartpole;
mod counter;
mod faulty;
mod masked;

pub use cartpole::{CartPole, CartPoleConfig, EpisodeParams, PhysicalConstants};
pub use counter::{Counter, CounterConfig};
pub use faulty::Faulty;
pub use masked::Masked;

use crate::spaces::{BoxSpace, Sample, Space};
use ndarray::Array3;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// An RGB image in row-major `[height, width, 3]` layout.
pub type Frame = Array3<u8>;

/// Auxiliary diagnostics attached to a step, keyed by name.
pub type Info = BTreeMap<String, InfoValue>;

/// A dynamically-typed scalar, used for step info and environment attributes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum InfoValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

/// The result of advancing an environment by one action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnvStep {
    pub observation: Sample,
    pub reward: f64,
    /// Episode has ended, whether by reaching a terminal state or a limit.
    pub done: bool,
    pub info: Info,
}

/// Error from inside an environment.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EnvError {
    /// Internal failure while stepping or resetting.
    #[error("{0}")]
    Fault(String),
    #[error("action is not an element of the action space")]
    InvalidAction,
    #[error("no attribute named `{0}`")]
    UnknownAttr(String),
    #[error("environment does not support {0}")]
    Unsupported(&'static str),
}

/// A single stateful environment.
///
/// `step` must only be called between a `reset` and a `done` step; callers
/// that batch environments handle the reset themselves.
pub trait Env {
    /// Space containing every observation this environment can emit.
    fn observation_space(&self) -> Space;

    /// Space containing every valid action.
    fn action_space(&self) -> Space;

    /// Space containing every reward `step` can emit. Scalar and unbounded
    /// unless the environment says otherwise.
    fn reward_space(&self) -> Space {
        BoxSpace::scalar(f32::NEG_INFINITY, f32::INFINITY).into()
    }

    /// Re-seed the environment's random state.
    fn seed(&mut self, seed: u64);

    /// Start a new episode and return its initial observation.
    fn reset(&mut self) -> Sample;

    /// Advance one step.
    fn step(&mut self, action: &Sample) -> Result<EnvStep, EnvError>;

    /// Render the current state as an image.
    fn render(&self) -> Result<Frame, EnvError> {
        Err(EnvError::Unsupported("render"))
    }

    /// Read a named attribute.
    fn get_attr(&self, name: &str) -> Result<InfoValue, EnvError> {
        Err(EnvError::UnknownAttr(name.into()))
    }

    /// Write a named attribute.
    fn set_attr(&mut self, name: &str, _value: InfoValue) -> Result<(), EnvError> {
        Err(EnvError::UnknownAttr(name.into()))
    }
}

/// A serializable recipe for building an [`Env`].
///
/// This is the form in which environments cross the process boundary: the
/// controller sends one spec per environment and each worker builds its own
/// instances locally.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum EnvSpec {
    CartPole(CartPoleConfig),
    Counter(CounterConfig),
    /// Wrap an environment so its observations are intermittently withheld.
    Masked { base: Box<EnvSpec>, period: u64 },
    /// Wrap an environment so a chosen `step` call fails, by error or
    /// (in panic mode) by panicking.
    Faulty {
        base: Box<EnvSpec>,
        fail_on_step: u64,
        panic: bool,
    },
}

impl EnvSpec {
    /// Build a fresh instance of the described environment.
    pub fn build(&self) -> Box<dyn Env + Send> {
        match self {
            Self::CartPole(config) => Box::new(CartPole::new(*config)),
            Self::Counter(config) => Box::new(Counter::new(*config)),
            Self::Masked { base, period } => Box::new(Masked::new(base.build(), *period)),
            Self::Faulty {
                base,
                fail_on_step,
                panic,
            } => Box::new(Faulty::new(base.build(), *fail_on_step, *panic)),
        }
    }

    /// The observation space of environments built from this spec.
    pub fn observation_space(&self) -> Space {
        self.build().observation_space()
    }

    /// The action space of environments built from this spec.
    pub fn action_space(&self) -> Space {
        self.build().action_space()
    }
}
