//! GPU training smoke test
//!
//! Checks that a CUDA accelerator is present and usable, then exercises it
//! with a short synthetic training run and reports timing and memory
//! statistics. Exits 0 only if every stage succeeds; any failure is
//! reported with its probable causes and exits 1 after device teardown.
//!
//! # Usage
//!
//! ```bash
//! cargo run --release
//! ```

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::process::ExitCode;

use gpu_smoke::cleanup::DeviceGuard;
use gpu_smoke::error::{panic_message, SmokeError};
use gpu_smoke::net::NetConfig;
use gpu_smoke::probe::{self, EnvReport};
use gpu_smoke::report::MemoryReport;
use gpu_smoke::train::{SmokeTrainer, TrainConfig, TrainSession};
use tch::Device;

const RULE: &str = "============================================================";

fn main() -> ExitCode {
    tracing_subscriber::fmt().with_env_filter("info").init();

    tracing::info!("{RULE}");
    tracing::info!("GPU Training Smoke Test");
    tracing::info!("{RULE}");

    match run() {
        Ok(()) => {
            tracing::info!("{RULE}");
            tracing::info!("GPU smoke test PASSED");
            ExitCode::SUCCESS
        }
        Err(err) => {
            tracing::error!("{err}");
            tracing::error!("Probable causes:");
            for cause in err.probable_causes() {
                tracing::error!("  - {cause}");
            }
            tracing::error!("{RULE}");
            tracing::error!("GPU smoke test FAILED");
            ExitCode::FAILURE
        }
    }
}

/// The whole diagnostic flow, one stage after another
///
/// Resource lifetimes are scoped: the device guard is acquired right after
/// a successful probe, so teardown runs on every exit path below it, and
/// the session (model parameters, optimizer moments) drops before the
/// guard does.
fn run() -> Result<(), SmokeError> {
    EnvReport::collect().log();

    let device_report = probe::probe()?;
    device_report.log();

    let _guard = DeviceGuard::new(device_report.selected_index);
    let baseline = match probe::memory_snapshot() {
        Ok(snap) => Some(snap),
        Err(err) => {
            tracing::warn!("memory baseline unavailable: {err}");
            None
        }
    };

    let device = Device::Cuda(device_report.selected_index as usize);
    let train_config = TrainConfig::default();
    let net_config = NetConfig::default();

    tracing::info!("Creating model...");
    let mut session = TrainSession::new(device, net_config, &train_config)?;
    let topology = session.net().config();
    tracing::info!(
        "  Topology: {} -> {} -> {} -> {}",
        topology.input_dim,
        topology.hidden_dims[0],
        topology.hidden_dims[1],
        topology.num_classes
    );
    tracing::info!("  Parameters: {}", session.net().num_parameters());

    tracing::info!(
        "Training for {} batches (batch size {})...",
        train_config.num_batches,
        train_config.batch_size
    );
    let mut trainer = SmokeTrainer::new(train_config)?;

    // Device faults surface either as TchError from the step or as a panic
    // out of libtorch; both end the run through the same error path.
    let outcome = catch_unwind(AssertUnwindSafe(|| trainer.run(|_| session.step())));
    let stats = match outcome {
        Ok(result) => result?,
        Err(panic) => {
            return Err(SmokeError::Training {
                batch: trainer.completed_batches() + 1,
                message: panic_message(panic),
            });
        }
    };

    tracing::info!("Training completed in {:.2} seconds", stats.elapsed_secs);
    tracing::info!("Throughput: {:.2} batches/sec", stats.throughput());

    // Drain the device queue before the final snapshot
    let index = device_report.selected_index;
    if catch_unwind(move || tch::Cuda::synchronize(index)).is_err() {
        tracing::warn!("device synchronize failed before memory accounting");
    }

    match (baseline, probe::memory_snapshot()) {
        (Some(baseline), Ok(end)) => {
            MemoryReport::new(baseline, end, session.net().trainable_bytes()).log();
        }
        (_, Err(err)) => tracing::warn!("memory accounting unavailable: {err}"),
        (None, _) => tracing::warn!("memory accounting skipped, no baseline"),
    }

    Ok(())
}
