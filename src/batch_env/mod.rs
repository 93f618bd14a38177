//! Batched execution of many environments across worker processes.
//!
//! A [`BatchEnv`] owns a set of worker processes, each running a contiguous
//! shard of the batch's environments. Control messages (specs, actions,
//! rewards, errors) travel over a local socket per worker; observations are
//! written by workers into a shared-memory buffer partitioned by lane, so
//! they are never copied through the socket. A worker's reply is its
//! acknowledgement that its slots are written, which is the only
//! synchronization the buffer needs.
//!
//! The stepping API is split into `*_async` / `*_wait` pairs so callers can
//! overlap their own work with environment computation; `reset` and `step`
//! are the blocking compositions.
mod protocol;
mod render;
pub mod worker;

pub use render::tile_frames;

use crate::codec;
use crate::envs::{EnvSpec, Frame, Info, InfoValue};
use crate::error::{BatchEnvError, ConfigError, IpcError};
use crate::shmem::SharedBuffer;
use crate::spaces::{Sample, Space};
use interprocess::local_socket::{
    traits::ListenerExt, GenericNamespaced, ListenerOptions, Stream, ToNsName,
};
use protocol::{receive_packet, send_packet, FromWorker, LaneSpaces, ToWorker};
use std::io::BufReader;
use std::ops::Range;
use std::path::PathBuf;
use std::process::{Child, Command};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Distinguishes sockets of multiple batches within one process.
static SOCKET_ID: AtomicU64 = AtomicU64::new(0);

/// Configuration for a [`BatchEnv`].
#[derive(Debug, Clone)]
pub struct BatchEnvConfig {
    /// One spec per environment; the batch size is the number of specs.
    /// All specs must produce identical observation and action spaces.
    pub env_specs: Vec<EnvSpec>,
    /// Number of worker processes. Clamped to the number of environments.
    pub n_workers: usize,
    /// Seed environment `i` with `seed + i` during startup.
    pub seed: Option<u64>,
    /// Worker executable. Defaults to `batchenv-worker` next to the current
    /// executable.
    pub worker_exe: Option<PathBuf>,
    /// Directory for shared-memory backing files. Defaults to a
    /// per-process directory under the system temp dir.
    pub buffer_dir: Option<PathBuf>,
}

impl BatchEnvConfig {
    /// One worker per environment and no explicit seed.
    pub fn new(env_specs: Vec<EnvSpec>) -> Self {
        Self {
            n_workers: env_specs.len(),
            env_specs,
            seed: None,
            worker_exe: None,
            buffer_dir: None,
        }
    }

    pub fn with_workers(mut self, n_workers: usize) -> Self {
        self.n_workers = n_workers;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Spawn the workers and initialize the batch.
    pub fn build(self) -> Result<BatchEnv, BatchEnvError> {
        BatchEnv::new(self)
    }
}

/// The batched results of stepping every environment once.
#[derive(Debug, Clone)]
pub struct BatchStep {
    /// All lanes' observations, shaped per the batch observation space.
    /// For lanes that finished their episode this is the first observation
    /// of the automatically started next episode.
    pub observations: Sample,
    pub rewards: Vec<f64>,
    pub dones: Vec<bool>,
    pub infos: Vec<Info>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Pending {
    Idle,
    Reset,
    Step,
}

struct WorkerHandle {
    child: Child,
    conn: BufReader<Stream>,
    /// Global lane range owned by this worker.
    lanes: Range<usize>,
}

/// A fixed-size batch of environments running in worker processes.
pub struct BatchEnv {
    workers: Vec<WorkerHandle>,
    n_envs: usize,
    observation_space: Space,
    action_space: Space,
    reward_space: Space,
    batch_observation_space: Space,
    buffer: Option<SharedBuffer>,
    buffer_dir: PathBuf,
    pending: Pending,
    closed: bool,
}

impl BatchEnv {
    fn new(config: BatchEnvConfig) -> Result<Self, BatchEnvError> {
        let n_envs = config.env_specs.len();
        if n_envs == 0 {
            return Err(ConfigError::NoEnvironments.into());
        }
        if config.n_workers == 0 {
            return Err(ConfigError::ZeroWorkers.into());
        }
        // Cheap local precheck so a mismatched batch fails before any worker
        // process is spawned; workers re-verify against the environments they
        // actually build.
        let spec_observation = config.env_specs[0].observation_space();
        let spec_action = config.env_specs[0].action_space();
        for (index, spec) in config.env_specs.iter().enumerate().skip(1) {
            let observation = spec.observation_space();
            let action = spec.action_space();
            for (channel, expected, found) in [
                ("observation", &spec_observation, &observation),
                ("action", &spec_action, &action),
            ] {
                if found != expected {
                    return Err(ConfigError::SpaceMismatch {
                        index,
                        channel,
                        expected: expected.to_string(),
                        found: found.to_string(),
                    }
                    .into());
                }
            }
        }
        let n_workers = config.n_workers.min(n_envs);

        let socket_name = format!(
            "batchenv-{}-{}.sock",
            std::process::id(),
            SOCKET_ID.fetch_add(1, Ordering::Relaxed)
        );
        let listener = ListenerOptions::new()
            .name(
                socket_name
                    .clone()
                    .to_ns_name::<GenericNamespaced>()
                    .map_err(IpcError::Io)?,
            )
            .create_sync()
            .map_err(IpcError::Io)?;

        let worker_exe = match config.worker_exe {
            Some(exe) => exe,
            None => default_worker_exe().map_err(IpcError::Io)?,
        };

        // Spawn then accept one worker at a time so connection order is
        // worker order.
        let mut workers = Vec::with_capacity(n_workers);
        for (worker_id, lanes) in shard_ranges(n_envs, n_workers).into_iter().enumerate() {
            let child = Command::new(&worker_exe)
                .arg("--socket-name")
                .arg(&socket_name)
                .arg("--worker-id")
                .arg(worker_id.to_string())
                .spawn()
                .map_err(IpcError::Spawn)?;
            let conn = match listener.incoming().next() {
                Some(conn) => BufReader::new(conn.map_err(IpcError::Io)?),
                None => return Err(IpcError::Disconnected.into()),
            };
            workers.push(WorkerHandle { child, conn, lanes });
        }
        log::debug!(
            "spawned {} workers for {} environments on {}",
            n_workers,
            n_envs,
            socket_name
        );

        // Build environments and cross-check every lane's spaces.
        let mut spaces: Vec<LaneSpaces> = Vec::with_capacity(n_envs);
        for worker in &mut workers {
            send_packet(
                &mut worker.conn,
                &ToWorker::InitEnvs {
                    specs: config.env_specs[worker.lanes.clone()].to_vec(),
                    slot_offset: worker.lanes.start,
                },
            )?;
            match receive_packet::<FromWorker>(&mut worker.conn)? {
                FromWorker::Spaces { lanes } => spaces.extend(lanes),
                other => return Err(unexpected("Spaces", &other).into()),
            }
        }
        let LaneSpaces {
            observation: observation_space,
            action: action_space,
            reward: reward_space,
        } = spaces[0].clone();
        for (index, lane) in spaces.iter().enumerate() {
            for (channel, expected, found) in [
                ("observation", &observation_space, &lane.observation),
                ("action", &action_space, &lane.action),
                ("reward", &reward_space, &lane.reward),
            ] {
                if found != expected {
                    return Err(ConfigError::SpaceMismatch {
                        index,
                        channel,
                        expected: expected.to_string(),
                        found: found.to_string(),
                    }
                    .into());
                }
            }
        }

        let buffer_dir = match config.buffer_dir {
            Some(dir) => dir,
            None => std::env::temp_dir().join(format!("batchenv-{}", std::process::id())),
        };
        std::fs::create_dir_all(&buffer_dir).map_err(IpcError::Io)?;
        let buffer = codec::create_shared_buffer(&observation_space, n_envs, &buffer_dir)?;
        let handle = buffer.handle();
        for worker in &mut workers {
            send_packet(
                &mut worker.conn,
                &ToWorker::AttachBuffer {
                    handle: handle.clone(),
                },
            )?;
            expect_attached(&mut worker.conn)?;
        }

        let batch_observation_space = codec::batch_space(&observation_space, n_envs);
        let mut env = Self {
            workers,
            n_envs,
            observation_space,
            action_space,
            reward_space,
            batch_observation_space,
            buffer: Some(buffer),
            buffer_dir,
            pending: Pending::Idle,
            closed: false,
        };
        if let Some(seed) = config.seed {
            env.seed(seed)?;
        }
        Ok(env)
    }

    /// Number of environments in the batch.
    pub fn n_envs(&self) -> usize {
        self.n_envs
    }

    /// Number of worker processes.
    pub fn n_workers(&self) -> usize {
        self.workers.len()
    }

    /// The (common) observation space of a single environment.
    pub fn observation_space(&self) -> &Space {
        &self.observation_space
    }

    /// The (common) action space of a single environment.
    pub fn action_space(&self) -> &Space {
        &self.action_space
    }

    /// The (common) reward space of a single environment.
    pub fn reward_space(&self) -> &Space {
        &self.reward_space
    }

    /// The space of batched observations, `batch_space(observation_space, n)`.
    pub fn batch_observation_space(&self) -> &Space {
        &self.batch_observation_space
    }

    fn ensure_idle(&self) -> Result<(), BatchEnvError> {
        if self.closed {
            return Err(BatchEnvError::Closed);
        }
        match self.pending {
            Pending::Idle => Ok(()),
            Pending::Reset => Err(BatchEnvError::AlreadyPending("reset")),
            Pending::Step => Err(BatchEnvError::AlreadyPending("step")),
        }
    }

    /// Re-seed every environment; lane `i` receives `seed + i`.
    ///
    /// Returns the sub-seeds applied, in lane order.
    pub fn seed(&mut self, seed: u64) -> Result<Vec<u64>, BatchEnvError> {
        self.ensure_idle()?;
        for worker in &mut self.workers {
            send_packet(&mut worker.conn, &ToWorker::Seed { base: seed })?;
        }
        let mut all_sub_seeds = Vec::with_capacity(self.n_envs);
        for worker in &mut self.workers {
            match receive_packet::<FromWorker>(&mut worker.conn)? {
                FromWorker::Seeded { sub_seeds } => all_sub_seeds.extend(sub_seeds),
                other => return Err(unexpected("Seeded", &other).into()),
            }
        }
        Ok(all_sub_seeds)
    }

    /// Start resetting every environment without waiting for the results.
    pub fn reset_async(&mut self) -> Result<(), BatchEnvError> {
        self.ensure_idle()?;
        for worker in &mut self.workers {
            send_packet(&mut worker.conn, &ToWorker::Reset)?;
        }
        self.pending = Pending::Reset;
        Ok(())
    }

    /// Wait for a pending [`reset_async`](Self::reset_async) and return the
    /// batched initial observations.
    pub fn reset_wait(&mut self) -> Result<Sample, BatchEnvError> {
        if self.closed {
            return Err(BatchEnvError::Closed);
        }
        if self.pending != Pending::Reset {
            return Err(BatchEnvError::NoPendingReset);
        }
        // Drain every worker before surfacing any failure so the channel
        // stays aligned with the request/reply protocol.
        let mut failure = None;
        for worker in &mut self.workers {
            let lanes = match receive_packet::<FromWorker>(&mut worker.conn)? {
                FromWorker::ResetDone { lanes } => lanes,
                other => return Err(unexpected("ResetDone", &other).into()),
            };
            for (offset, result) in lanes.into_iter().enumerate() {
                if let Err(source) = result {
                    let lane = worker.lanes.start + offset;
                    failure.get_or_insert((lane, source));
                }
            }
        }
        self.pending = Pending::Idle;
        if let Some((lane, source)) = failure {
            return Err(BatchEnvError::Worker { lane, source });
        }
        let buffer = self.buffer.as_ref().ok_or(BatchEnvError::Closed)?;
        Ok(codec::read_batch(
            &self.observation_space,
            buffer,
            self.n_envs,
        )?)
    }

    /// Reset every environment and return the batched initial observations.
    pub fn reset(&mut self) -> Result<Sample, BatchEnvError> {
        self.reset_async()?;
        self.reset_wait()
    }

    /// Start stepping every environment with its own action, one per lane.
    pub fn step_async(&mut self, actions: &[Sample]) -> Result<(), BatchEnvError> {
        self.ensure_idle()?;
        if actions.len() != self.n_envs {
            return Err(BatchEnvError::WrongActionCount {
                expected: self.n_envs,
                found: actions.len(),
            });
        }
        for (lane, action) in actions.iter().enumerate() {
            if !self.action_space.contains(action) {
                return Err(BatchEnvError::InvalidAction { lane });
            }
        }
        for worker in &mut self.workers {
            send_packet(
                &mut worker.conn,
                &ToWorker::Step {
                    actions: actions[worker.lanes.clone()].to_vec(),
                },
            )?;
        }
        self.pending = Pending::Step;
        Ok(())
    }

    /// Wait for a pending [`step_async`](Self::step_async).
    pub fn step_wait(&mut self) -> Result<BatchStep, BatchEnvError> {
        if self.closed {
            return Err(BatchEnvError::Closed);
        }
        if self.pending != Pending::Step {
            return Err(BatchEnvError::NoPendingStep);
        }
        let mut rewards = vec![0.0; self.n_envs];
        let mut dones = vec![false; self.n_envs];
        let mut infos = vec![Info::new(); self.n_envs];
        let mut failure = None;
        for worker in &mut self.workers {
            let lanes = match receive_packet::<FromWorker>(&mut worker.conn)? {
                FromWorker::StepDone { lanes } => lanes,
                other => return Err(unexpected("StepDone", &other).into()),
            };
            for (offset, result) in lanes.into_iter().enumerate() {
                let lane = worker.lanes.start + offset;
                match result {
                    Ok(outcome) => {
                        rewards[lane] = outcome.reward;
                        dones[lane] = outcome.done;
                        infos[lane] = outcome.info;
                    }
                    Err(source) => {
                        failure.get_or_insert((lane, source));
                    }
                }
            }
        }
        self.pending = Pending::Idle;
        if let Some((lane, source)) = failure {
            return Err(BatchEnvError::Worker { lane, source });
        }
        let buffer = self.buffer.as_ref().ok_or(BatchEnvError::Closed)?;
        let observations =
            codec::read_batch(&self.observation_space, buffer, self.n_envs)?;
        Ok(BatchStep {
            observations,
            rewards,
            dones,
            infos,
        })
    }

    /// Step every environment once, blocking for the results.
    pub fn step(&mut self, actions: &[Sample]) -> Result<BatchStep, BatchEnvError> {
        self.step_async(actions)?;
        self.step_wait()
    }

    /// Render every environment and tile the frames into one image.
    pub fn render(&mut self) -> Result<Frame, BatchEnvError> {
        self.ensure_idle()?;
        for worker in &mut self.workers {
            send_packet(&mut worker.conn, &ToWorker::Render)?;
        }
        let mut frames = Vec::with_capacity(self.n_envs);
        let mut failure = None;
        for worker in &mut self.workers {
            let lanes = match receive_packet::<FromWorker>(&mut worker.conn)? {
                FromWorker::Frames { lanes } => lanes,
                other => return Err(unexpected("Frames", &other).into()),
            };
            for (offset, result) in lanes.into_iter().enumerate() {
                match result {
                    Ok(frame) => frames.push(frame),
                    Err(source) => {
                        failure.get_or_insert((worker.lanes.start + offset, source));
                    }
                }
            }
        }
        if let Some((lane, source)) = failure {
            return Err(BatchEnvError::Worker { lane, source });
        }
        Ok(tile_frames(&frames))
    }

    /// Read a named attribute from every environment, in lane order.
    pub fn get_attr(&mut self, name: &str) -> Result<Vec<InfoValue>, BatchEnvError> {
        self.ensure_idle()?;
        for worker in &mut self.workers {
            send_packet(
                &mut worker.conn,
                &ToWorker::GetAttr { name: name.into() },
            )?;
        }
        let mut values = Vec::with_capacity(self.n_envs);
        let mut failure = None;
        for worker in &mut self.workers {
            let lanes = match receive_packet::<FromWorker>(&mut worker.conn)? {
                FromWorker::Attrs { lanes } => lanes,
                other => return Err(unexpected("Attrs", &other).into()),
            };
            for (offset, result) in lanes.into_iter().enumerate() {
                match result {
                    Ok(value) => values.push(value),
                    Err(source) => {
                        failure.get_or_insert((worker.lanes.start + offset, source));
                    }
                }
            }
        }
        if let Some((lane, source)) = failure {
            return Err(BatchEnvError::Worker { lane, source });
        }
        Ok(values)
    }

    /// Write a named attribute on every environment.
    pub fn set_attr(&mut self, name: &str, value: InfoValue) -> Result<(), BatchEnvError> {
        self.ensure_idle()?;
        for worker in &mut self.workers {
            send_packet(
                &mut worker.conn,
                &ToWorker::SetAttr {
                    name: name.into(),
                    value: value.clone(),
                },
            )?;
        }
        let mut failure = None;
        for worker in &mut self.workers {
            let lanes = match receive_packet::<FromWorker>(&mut worker.conn)? {
                FromWorker::AttrsSet { lanes } => lanes,
                other => return Err(unexpected("AttrsSet", &other).into()),
            };
            for (offset, result) in lanes.into_iter().enumerate() {
                if let Err(source) = result {
                    failure.get_or_insert((worker.lanes.start + offset, source));
                }
            }
        }
        if let Some((lane, source)) = failure {
            return Err(BatchEnvError::Worker { lane, source });
        }
        Ok(())
    }

    /// Shut down the workers and release the shared buffer. Idempotent;
    /// best-effort after the first call.
    ///
    /// Outstanding async results are drained and discarded. Workers are asked
    /// to exit cleanly and killed if they have not after a grace period.
    pub fn close(&mut self) -> Result<(), BatchEnvError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        for worker in &mut self.workers {
            if let Err(error) = send_packet(&mut worker.conn, &ToWorker::Close) {
                log::warn!("failed to send close to a worker: {}", error);
                continue;
            }
            // Discard queued replies (a pending reset/step) until the
            // close acknowledgement.
            loop {
                match receive_packet::<FromWorker>(&mut worker.conn) {
                    Ok(FromWorker::Closing) => break,
                    Ok(_) => continue,
                    Err(error) => {
                        log::warn!("worker close handshake failed: {}", error);
                        break;
                    }
                }
            }
        }
        let deadline = Instant::now() + Duration::from_secs(5);
        for worker in &mut self.workers {
            wait_or_kill(&mut worker.child, deadline);
        }
        // The owning side unlinks the backing files on drop; the directory
        // is shared with concurrent batches, so only remove it once empty.
        drop(self.buffer.take());
        if let Err(error) = std::fs::remove_dir(&self.buffer_dir) {
            log::debug!("buffer directory not removed: {}", error);
        }
        self.pending = Pending::Idle;
        Ok(())
    }
}

impl Drop for BatchEnv {
    fn drop(&mut self) {
        if let Err(error) = self.close() {
            log::warn!("error closing batch environment: {}", error);
        }
    }
}

/// Wait for a child to exit before `deadline`, then kill it.
fn wait_or_kill(child: &mut Child, deadline: Instant) {
    loop {
        match child.try_wait() {
            Ok(Some(_)) => return,
            Ok(None) => {
                if Instant::now() >= deadline {
                    break;
                }
                std::thread::sleep(Duration::from_millis(20));
            }
            Err(error) => {
                log::warn!("failed to poll worker process: {}", error);
                break;
            }
        }
    }
    if let Err(error) = child.kill() {
        log::warn!("failed to kill worker process: {}", error);
    }
    let _ = child.wait();
}

/// Partition `n_envs` lanes into `n_workers` contiguous ranges whose sizes
/// differ by at most one, preserving lane order.
fn shard_ranges(n_envs: usize, n_workers: usize) -> Vec<Range<usize>> {
    let base = n_envs / n_workers;
    let extra = n_envs % n_workers;
    let mut ranges = Vec::with_capacity(n_workers);
    let mut start = 0;
    for worker in 0..n_workers {
        let len = base + usize::from(worker < extra);
        ranges.push(start..start + len);
        start += len;
    }
    ranges
}

/// Locate the worker executable next to the running one.
fn default_worker_exe() -> Result<PathBuf, std::io::Error> {
    let mut exe = std::env::current_exe()?;
    exe.set_file_name("batchenv-worker");
    Ok(exe)
}

fn unexpected(expected: &'static str, found: &FromWorker) -> IpcError {
    IpcError::UnexpectedReply {
        expected,
        found: found.kind(),
    }
}

fn expect_attached(conn: &mut BufReader<Stream>) -> Result<(), BatchEnvError> {
    match receive_packet::<FromWorker>(conn)? {
        FromWorker::Attached => Ok(()),
        other => Err(unexpected("Attached", &other).into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shards_are_contiguous_and_balanced() {
        assert_eq!(shard_ranges(12, 4), vec![0..3, 3..6, 6..9, 9..12]);
        assert_eq!(shard_ranges(5, 2), vec![0..3, 3..5]);
        assert_eq!(shard_ranges(3, 3), vec![0..1, 1..2, 2..3]);
    }

    #[test]
    fn shards_cover_every_lane_once() {
        for n_envs in 1..20 {
            for n_workers in 1..=n_envs {
                let ranges = shard_ranges(n_envs, n_workers);
                assert_eq!(ranges.len(), n_workers);
                assert_eq!(ranges[0].start, 0);
                assert_eq!(ranges[n_workers - 1].end, n_envs);
                for pair in ranges.windows(2) {
                    assert_eq!(pair[0].end, pair[1].start);
                }
            }
        }
    }
}
