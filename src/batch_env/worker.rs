//! Worker-process side of the batch environment.
//!
//! A worker owns a contiguous shard of the batch's environments. It connects
//! back to the controller's socket, builds its environments from the specs it
//! receives, maps the shared observation buffer, then serves requests until
//! told to close or the controller disappears.
//!
//! Every environment call is wrapped in `catch_unwind`: a panic or error in
//! one lane is reported as that lane's [`RemoteError`] while the other lanes'
//! results stand, so a single faulty environment cannot take down its
//! neighbours.
use super::protocol::{receive_packet, send_packet, FromWorker, LaneSpaces, StepOutcome, ToWorker};
use crate::codec;
use crate::envs::{Env, EnvError};
use crate::error::{IpcError, RemoteError};
use crate::shmem::SharedBuffer;
use crate::spaces::{Sample, Space};
use interprocess::local_socket::{traits::Stream as _, GenericNamespaced, Stream, ToNsName};
use std::any::Any;
use std::backtrace::Backtrace;
use std::io::BufReader;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Mutex;

/// Backtrace captured by the panic hook, read back after `catch_unwind`.
static LAST_BACKTRACE: Mutex<Option<String>> = Mutex::new(None);

fn install_panic_hook() {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        if let Ok(mut slot) = LAST_BACKTRACE.lock() {
            *slot = Some(Backtrace::force_capture().to_string());
        }
        default_hook(info);
    }));
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).into()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "panic with non-string payload".into()
    }
}

/// Run an environment call, converting panics into [`RemoteError`]s.
fn guarded<T, F>(call: F) -> Result<T, RemoteError>
where
    F: FnOnce() -> Result<T, RemoteError>,
{
    match catch_unwind(AssertUnwindSafe(call)) {
        Ok(result) => result,
        Err(payload) => Err(RemoteError {
            kind: "panic".into(),
            message: panic_message(payload),
            backtrace: LAST_BACKTRACE
                .lock()
                .ok()
                .and_then(|mut slot| slot.take()),
        }),
    }
}

fn env_error(error: EnvError) -> RemoteError {
    let kind = match &error {
        EnvError::Fault(_) => "Fault",
        EnvError::InvalidAction => "InvalidAction",
        EnvError::UnknownAttr(_) => "UnknownAttr",
        EnvError::Unsupported(_) => "Unsupported",
    };
    RemoteError {
        kind: kind.into(),
        message: error.to_string(),
        backtrace: None,
    }
}

fn space_error(error: crate::spaces::SpaceError) -> RemoteError {
    RemoteError {
        kind: "SpaceError".into(),
        message: error.to_string(),
        backtrace: None,
    }
}

fn protocol_violation(message: &str) -> IpcError {
    IpcError::Io(std::io::Error::new(
        std::io::ErrorKind::InvalidData,
        message.to_string(),
    ))
}

struct Lane {
    env: Box<dyn Env + Send>,
    observation_space: Space,
    /// Global slot index in the shared buffer.
    slot: usize,
}

/// Serve one worker process until the controller closes the channel.
pub fn run(socket_name: &str) -> Result<(), IpcError> {
    install_panic_hook();
    let name = socket_name.to_ns_name::<GenericNamespaced>()?;
    let mut conn = BufReader::new(Stream::connect(name)?);
    log::info!("worker connected to {}", socket_name);

    let mut lanes: Vec<Lane> = Vec::new();
    let mut buffer: Option<SharedBuffer> = None;

    loop {
        let reply = match receive_packet::<ToWorker>(&mut conn) {
            Ok(message) => handle(message, &mut lanes, &mut buffer)?,
            Err(IpcError::Disconnected) => {
                // Controller went away without Close; exit quietly.
                log::warn!("controller disconnected, shutting down");
                return Ok(());
            }
            Err(error) => return Err(error),
        };
        let closing = matches!(reply, FromWorker::Closing);
        send_packet(&mut conn, &reply)?;
        if closing {
            log::info!("worker closing");
            return Ok(());
        }
    }
}

fn handle(
    message: ToWorker,
    lanes: &mut Vec<Lane>,
    buffer: &mut Option<SharedBuffer>,
) -> Result<FromWorker, IpcError> {
    match message {
        ToWorker::InitEnvs { specs, slot_offset } => {
            log::debug!("building {} environments at offset {}", specs.len(), slot_offset);
            *lanes = specs
                .iter()
                .enumerate()
                .map(|(i, spec)| {
                    let env = spec.build();
                    Lane {
                        observation_space: env.observation_space(),
                        env,
                        slot: slot_offset + i,
                    }
                })
                .collect();
            Ok(FromWorker::Spaces {
                lanes: lanes
                    .iter()
                    .map(|lane| LaneSpaces {
                        observation: lane.observation_space.clone(),
                        action: lane.env.action_space(),
                        reward: lane.env.reward_space(),
                    })
                    .collect(),
            })
        }
        ToWorker::AttachBuffer { handle } => {
            *buffer = Some(SharedBuffer::open(&handle).map_err(|error| {
                protocol_violation(&format!("cannot map shared buffer: {}", error))
            })?);
            Ok(FromWorker::Attached)
        }
        ToWorker::Seed { base } => {
            let sub_seeds = lanes
                .iter_mut()
                .map(|lane| {
                    let sub_seed = base.wrapping_add(lane.slot as u64);
                    lane.env.seed(sub_seed);
                    sub_seed
                })
                .collect();
            Ok(FromWorker::Seeded { sub_seeds })
        }
        ToWorker::Reset => {
            let buffer = attached(buffer)?;
            let results = lanes
                .iter_mut()
                .map(|lane| {
                    guarded(|| {
                        let observation = lane.env.reset();
                        write_observation(lane, buffer, &observation)
                    })
                })
                .collect();
            Ok(FromWorker::ResetDone { lanes: results })
        }
        ToWorker::Step { actions } => {
            let buffer = attached(buffer)?;
            if actions.len() != lanes.len() {
                return Err(protocol_violation("action count does not match lane count"));
            }
            let results = lanes
                .iter_mut()
                .zip(&actions)
                .map(|(lane, action)| {
                    guarded(|| {
                        let step = lane.env.step(action).map_err(env_error)?;
                        // Auto-reset: finished episodes restart immediately and
                        // the fresh episode's first observation is what lands
                        // in shared memory.
                        let observation = if step.done {
                            lane.env.reset()
                        } else {
                            step.observation
                        };
                        write_observation(lane, buffer, &observation)?;
                        Ok(StepOutcome {
                            reward: step.reward,
                            done: step.done,
                            info: step.info,
                        })
                    })
                })
                .collect();
            Ok(FromWorker::StepDone { lanes: results })
        }
        ToWorker::Render => Ok(FromWorker::Frames {
            lanes: lanes
                .iter_mut()
                .map(|lane| guarded(|| lane.env.render().map_err(env_error)))
                .collect(),
        }),
        ToWorker::GetAttr { name } => Ok(FromWorker::Attrs {
            lanes: lanes
                .iter_mut()
                .map(|lane| guarded(|| lane.env.get_attr(&name).map_err(env_error)))
                .collect(),
        }),
        ToWorker::SetAttr { name, value } => Ok(FromWorker::AttrsSet {
            lanes: lanes
                .iter_mut()
                .map(|lane| {
                    guarded(|| lane.env.set_attr(&name, value.clone()).map_err(env_error))
                })
                .collect(),
        }),
        ToWorker::Close => Ok(FromWorker::Closing),
    }
}

fn attached<'a>(buffer: &'a mut Option<SharedBuffer>) -> Result<&'a SharedBuffer, IpcError> {
    buffer
        .as_ref()
        .ok_or_else(|| protocol_violation("no shared buffer attached"))
}

fn write_observation(
    lane: &Lane,
    buffer: &SharedBuffer,
    observation: &Sample,
) -> Result<(), RemoteError> {
    codec::write_sample(&lane.observation_space, buffer, lane.slot, observation)
        .map_err(space_error)
}
