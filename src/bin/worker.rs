//! Worker process entry point.
//!
//! Spawned by the controller, one process per environment shard. Not meant
//! to be run by hand.
use batchenv::batch_env::worker;
use clap::Parser;
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(name = "batchenv-worker")]
struct Args {
    /// Namespaced socket name of the controlling process.
    #[arg(long)]
    socket_name: String,
    /// Index of this worker within the batch, for log messages only.
    #[arg(long, default_value_t = 0)]
    worker_id: usize,
}

fn main() -> ExitCode {
    env_logger::init();
    let args = Args::parse();
    log::info!("worker {} starting", args.worker_id);
    match worker::run(&args.socket_name) {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            log::error!("worker {} failed: {}", args.worker_id, error);
            ExitCode::FAILURE
        }
    }
}
