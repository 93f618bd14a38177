//! Control-channel messages between the controller and worker processes.
//!
//! Only small control data crosses the socket: environment specs, actions,
//! rewards and errors. Observations travel through shared memory; the replies
//! here double as the acknowledgement that a worker has finished writing its
//! slots, so readers never race writers.
use crate::envs::{EnvSpec, Frame, Info, InfoValue};
use crate::error::{IpcError, RemoteError};
use crate::shmem::BufferHandle;
use crate::spaces::{Sample, Space};
use interprocess::local_socket::Stream;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::io::{BufReader, Read, Write};

/// A message from the controller to a worker.
///
/// `actions` and the per-lane reply vectors are indexed by the worker's own
/// lane order; the worker's first lane owns global slot `slot_offset`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ToWorker {
    /// Build this worker's environments. Must be the first message.
    InitEnvs {
        specs: Vec<EnvSpec>,
        slot_offset: usize,
    },
    /// Map the shared observation buffer created by the controller.
    AttachBuffer { handle: BufferHandle },
    /// Seed environment `i` of this worker with `base + slot_offset + i`.
    Seed { base: u64 },
    Reset,
    Step { actions: Vec<Sample> },
    Render,
    GetAttr { name: String },
    SetAttr { name: String, value: InfoValue },
    /// Shut down cleanly. The worker acknowledges and exits.
    Close,
}

/// A worker's reply. Each `ToWorker` message has exactly one reply.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum FromWorker {
    /// Reply to [`ToWorker::InitEnvs`]: one space triple per lane, in lane
    /// order, for the controller to cross-check.
    Spaces { lanes: Vec<LaneSpaces> },
    /// Reply to [`ToWorker::AttachBuffer`].
    Attached,
    /// Reply to [`ToWorker::Seed`]: the sub-seed applied to each lane.
    Seeded { sub_seeds: Vec<u64> },
    /// Reply to [`ToWorker::Reset`]. Observations are already in shared
    /// memory for every `Ok` lane.
    ResetDone { lanes: Vec<Result<(), RemoteError>> },
    /// Reply to [`ToWorker::Step`]; same contract as `ResetDone`.
    StepDone {
        lanes: Vec<Result<StepOutcome, RemoteError>>,
    },
    Frames {
        lanes: Vec<Result<Frame, RemoteError>>,
    },
    Attrs {
        lanes: Vec<Result<InfoValue, RemoteError>>,
    },
    AttrsSet { lanes: Vec<Result<(), RemoteError>> },
    Closing,
}

impl FromWorker {
    /// Short tag naming the reply kind, used in protocol error messages.
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Spaces { .. } => "Spaces",
            Self::Attached => "Attached",
            Self::Seeded { .. } => "Seeded",
            Self::ResetDone { .. } => "ResetDone",
            Self::StepDone { .. } => "StepDone",
            Self::Frames { .. } => "Frames",
            Self::Attrs { .. } => "Attrs",
            Self::AttrsSet { .. } => "AttrsSet",
            Self::Closing => "Closing",
        }
    }
}

/// The spaces reported by one environment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LaneSpaces {
    pub observation: Space,
    pub action: Space,
    pub reward: Space,
}

/// The non-observation half of one lane's step result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepOutcome {
    pub reward: f64,
    pub done: bool,
    pub info: Info,
}

/// Write one length-prefixed bincode packet to the socket.
pub fn send_packet<T: Serialize>(conn: &mut BufReader<Stream>, packet: &T) -> Result<(), IpcError> {
    let payload = bincode::serde::encode_to_vec(packet, bincode::config::standard())?;
    let stream = conn.get_mut();
    stream.write_all(&(payload.len() as u32).to_be_bytes())?;
    stream.write_all(&payload)?;
    stream.flush()?;
    Ok(())
}

/// Read one length-prefixed bincode packet from the socket.
///
/// A clean end-of-stream is reported as [`IpcError::Disconnected`].
pub fn receive_packet<T: DeserializeOwned>(conn: &mut BufReader<Stream>) -> Result<T, IpcError> {
    let mut len_bytes = [0_u8; 4];
    read_exact_or_disconnect(conn, &mut len_bytes)?;
    let len = u32::from_be_bytes(len_bytes);
    let mut payload = vec![0_u8; len as usize];
    read_exact_or_disconnect(conn, &mut payload)?;
    let (packet, _) = bincode::serde::decode_from_slice(&payload, bincode::config::standard())?;
    Ok(packet)
}

fn read_exact_or_disconnect(
    conn: &mut BufReader<Stream>,
    buffer: &mut [u8],
) -> Result<(), IpcError> {
    conn.read_exact(buffer).map_err(|error| {
        if error.kind() == std::io::ErrorKind::UnexpectedEof {
            IpcError::Disconnected
        } else {
            IpcError::Io(error)
        }
    })
}
