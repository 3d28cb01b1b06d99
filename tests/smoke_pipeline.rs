//! End-to-end pipeline tests on CPU
//!
//! The session and trainer take the device as a parameter, so the whole
//! flow minus the CUDA probe runs on CPU. These tests exercise the real
//! model, optimizer, and loop wiring rather than mocks.

use gpu_smoke::cleanup::DeviceGuard;
use gpu_smoke::error::SmokeError;
use gpu_smoke::net::{NetConfig, SmokeNet};
use gpu_smoke::train::{SmokeTrainer, TrainConfig, TrainSession, TrainState};
use tch::{Device, Kind, TchError, Tensor};

#[test]
fn test_full_run_completes_on_cpu() {
    let config = TrainConfig::new().batch_size(16).num_batches(20).report_every(10);
    let mut session = TrainSession::new(Device::Cpu, NetConfig::default(), &config).unwrap();
    let mut trainer = SmokeTrainer::new(config).unwrap();

    let stats = trainer.run(|_| session.step()).unwrap();

    assert_eq!(trainer.state(), TrainState::Completed);
    assert_eq!(stats.batches, 20);
    assert!(stats.elapsed_secs > 0.0);
    assert!((stats.throughput() - stats.batches as f64 / stats.elapsed_secs).abs() < 1e-9);

    // Loss sampled on batches 10 and 20, nowhere else
    let batches: Vec<usize> = stats.losses.iter().map(|s| s.batch).collect();
    assert_eq!(batches, vec![10, 20]);
    for sample in &stats.losses {
        assert!(sample.loss.is_finite());
    }
}

#[test]
fn test_forward_shape_holds_across_iterations() {
    let net = SmokeNet::new(Device::Cpu, NetConfig::default()).unwrap();
    for _ in 0..5 {
        let inputs = Tensor::randn([128, 1024], (Kind::Float, Device::Cpu));
        let out = net.forward(&inputs);
        assert_eq!(out.size(), vec![128, 10]);
    }
}

#[test]
fn test_injected_fault_aborts_and_cleanup_still_runs() {
    let config = TrainConfig::default().batch_size(8);
    let mut session = TrainSession::new(Device::Cpu, NetConfig::default(), &config).unwrap();
    let mut trainer = SmokeTrainer::new(config).unwrap();
    let guard = DeviceGuard::new(0);

    let err = trainer
        .run(|batch| {
            if batch == 50 {
                Err(TchError::Torch("injected device fault".to_string()))
            } else {
                session.step()
            }
        })
        .unwrap_err();

    match err {
        SmokeError::Training { batch, message } => {
            assert_eq!(batch, 50);
            assert!(message.contains("injected device fault"));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(trainer.state(), TrainState::Failed);
    assert_eq!(trainer.completed_batches(), 49);

    // Teardown after a failed run must be a clean no-panic path
    drop(guard);
}

#[test]
fn test_parameters_carry_state_across_iterations() {
    // Batches are independent random draws; only the parameters (and the
    // optimizer moments) may change between steps.
    let config = TrainConfig::new().batch_size(8).num_batches(2);
    let mut session = TrainSession::new(Device::Cpu, NetConfig::default(), &config).unwrap();

    let probe_input = Tensor::randn([1, 1024], (Kind::Float, Device::Cpu));
    let before = session.net().forward(&probe_input);
    session.step().unwrap();
    let after = session.net().forward(&probe_input);

    let diff: f64 = (&before - &after)
        .abs()
        .sum(Kind::Float)
        .try_into()
        .unwrap();
    assert!(diff > 0.0, "an optimizer step must move the parameters");
}
