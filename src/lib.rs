//! Batched environments running across worker processes with shared-memory
//! observation transport.
#![warn(clippy::cast_lossless)]
#![warn(clippy::cast_possible_truncation)]
#![warn(clippy::doc_markdown)]
#![warn(clippy::explicit_iter_loop)]
#![warn(clippy::needless_borrow)]
#![warn(clippy::needless_pass_by_value)]
#![warn(clippy::redundant_closure_for_method_calls)]
#![warn(clippy::use_self)]
pub mod batch_env;
pub mod codec;
pub mod envs;
mod error;
pub mod shmem;
pub mod spaces;
pub mod tensors;

pub use batch_env::{BatchEnv, BatchEnvConfig, BatchStep};
pub use codec::{batch_space, unbatch_samples};
pub use envs::{Env, EnvSpec, EnvStep};
pub use error::{BatchEnvError, ConfigError, IpcError, RemoteError};
pub use spaces::{Sample, Space};
pub use tensors::{TensorEnv, TensorSample};

/// Deterministic generator used wherever environments and spaces need
/// randomness.
pub type Prng = rand_chacha::ChaCha8Rng;
