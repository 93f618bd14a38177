//! Error types
use crate::spaces::SpaceError;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Top-level error from the batched environment crate.
#[derive(Error, Debug)]
pub enum BatchEnvError {
    #[error("invalid configuration")]
    Config(#[from] ConfigError),
    #[error("space error")]
    Space(#[from] SpaceError),
    #[error("shared memory error: {0}")]
    Shmem(#[from] shared_memory::ShmemError),
    #[error("worker channel error")]
    Ipc(#[from] IpcError),
    #[error("tensor conversion error")]
    Tensor(#[from] crate::tensors::TensorError),
    #[error("environment {lane} failed")]
    Worker {
        /// Index of the failing environment within the batch.
        lane: usize,
        #[source]
        source: RemoteError,
    },
    /// `reset_async` / `step_async` while an earlier call is still pending.
    #[error("a {0} call is already awaiting its result")]
    AlreadyPending(&'static str),
    #[error("step_wait called with no step in flight")]
    NoPendingStep,
    #[error("reset_wait called with no reset in flight")]
    NoPendingReset,
    #[error("batch environment is closed")]
    Closed,
    #[error("action {lane} is not an element of the action space")]
    InvalidAction { lane: usize },
    #[error("expected {expected} actions, got {found}")]
    WrongActionCount { expected: usize, found: usize },
}

/// Error constructing a [`BatchEnv`](crate::BatchEnv).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("at least one environment is required")]
    NoEnvironments,
    #[error("at least one worker is required")]
    ZeroWorkers,
    #[error("environment {index} has {channel} space {found}, expected {expected}")]
    SpaceMismatch {
        index: usize,
        channel: &'static str,
        expected: String,
        found: String,
    },
}

/// Error on the control channel between the controller and a worker process.
#[derive(Error, Debug)]
pub enum IpcError {
    #[error("i/o error on worker socket")]
    Io(#[from] std::io::Error),
    #[error("failed to encode message")]
    Encode(#[from] bincode::error::EncodeError),
    #[error("failed to decode message")]
    Decode(#[from] bincode::error::DecodeError),
    #[error("worker closed its socket")]
    Disconnected,
    #[error("unexpected reply: expected {expected}, got {found}")]
    UnexpectedReply {
        expected: &'static str,
        found: &'static str,
    },
    #[error("failed to spawn worker process")]
    Spawn(#[source] std::io::Error),
}

/// A failure inside a worker process, serialized back to the controller.
///
/// Carries whatever the worker could capture: the error's type name, its
/// display message and, for panics, a backtrace.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteError {
    pub kind: String,
    pub message: String,
    pub backtrace: Option<String>,
}

impl fmt::Display for RemoteError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)?;
        if let Some(backtrace) = &self.backtrace {
            write!(f, "\n{}", backtrace)?;
        }
        Ok(())
    }
}
