//! Training loop for the smoke test
//!
//! One fixed-length loop over synthetic batches: synthesize a batch on the
//! device, zero gradients, forward, cross-entropy loss, backward, one Adam
//! step. The loop is a small state machine (`Init -> Running -> Completed |
//! Failed`); any device error aborts it on the spot and nothing from a
//! failed iteration is retried.

use anyhow::{anyhow, Result};
use std::time::Instant;
use tch::{Device, Kind, TchError, Tensor};

use crate::error::SmokeError;
use crate::net::{NetConfig, SmokeNet};

/// Training loop configuration
///
/// The defaults are the fixed constants of the diagnostic; nothing is read
/// from files, flags, or the environment.
#[derive(Debug, Clone)]
pub struct TrainConfig {
    /// Samples per synthetic batch
    pub batch_size: usize,

    /// Number of training iterations
    pub num_batches: usize,

    /// Adam learning rate
    pub learning_rate: f64,

    /// Report the loss every N batches (1-indexed)
    pub report_every: usize,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self { batch_size: 128, num_batches: 100, learning_rate: 1e-3, report_every: 10 }
    }
}

impl TrainConfig {
    /// Create a new default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate configuration parameters
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(anyhow!("batch_size must be positive"));
        }
        if self.num_batches == 0 {
            return Err(anyhow!("num_batches must be positive"));
        }
        if self.learning_rate <= 0.0 {
            return Err(anyhow!("learning_rate must be positive"));
        }
        if self.report_every == 0 {
            return Err(anyhow!("report_every must be positive"));
        }
        Ok(())
    }

    /// Set batch size
    pub fn batch_size(mut self, size: usize) -> Self {
        self.batch_size = size;
        self
    }

    /// Set number of batches
    pub fn num_batches(mut self, n: usize) -> Self {
        self.num_batches = n;
        self
    }

    /// Set learning rate
    pub fn learning_rate(mut self, lr: f64) -> Self {
        self.learning_rate = lr;
        self
    }

    /// Set loss reporting interval
    pub fn report_every(mut self, every: usize) -> Self {
        self.report_every = every;
        self
    }
}

/// Lifecycle of one training run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrainState {
    /// Constructed, not yet running
    Init,
    /// Iterating over batches
    Running,
    /// All batches finished without error
    Completed,
    /// Aborted on a device error
    Failed,
}

/// One recorded loss value
#[derive(Debug, Clone, Copy)]
pub struct LossSample {
    /// 1-indexed batch the loss was sampled at
    pub batch: usize,
    /// Scalar loss value
    pub loss: f64,
}

/// Statistics of a completed run
#[derive(Debug, Clone)]
pub struct RunStats {
    /// Wall-clock seconds between the first and last iteration
    pub elapsed_secs: f64,
    /// Batches processed
    pub batches: usize,
    /// Losses sampled at each reporting interval
    pub losses: Vec<LossSample>,
}

impl RunStats {
    /// Batches processed per second of wall-clock time
    pub fn throughput(&self) -> f64 {
        if self.elapsed_secs > 0.0 {
            self.batches as f64 / self.elapsed_secs
        } else {
            0.0
        }
    }
}

/// Model, optimizer, and batch synthesis for one run
///
/// Owns everything device-resident: the net's parameters and the optimizer
/// moments. Batches are created inside [`TrainSession::step`] and dropped
/// when the step returns; only parameters and moments carry state across
/// iterations.
pub struct TrainSession {
    net: SmokeNet,
    optimizer: tch::nn::Optimizer,
    device: Device,
    batch_size: i64,
}

impl TrainSession {
    /// Build the net on `device` and set up the optimizer and criterion
    pub fn new(
        device: Device,
        net_config: NetConfig,
        config: &TrainConfig,
    ) -> Result<Self, SmokeError> {
        config.validate()?;
        let net = SmokeNet::new(device, net_config)?;
        let optimizer = net.adam(config.learning_rate)?;
        Ok(Self { net, optimizer, device, batch_size: config.batch_size as i64 })
    }

    /// Run one training iteration and return the scalar loss
    ///
    /// Inputs are standard-normal, targets uniform over the classes, both
    /// synthesized directly on the device. Errors surface as `TchError` so
    /// the loop can abort without losing the failing batch index.
    pub fn step(&mut self) -> Result<f64, TchError> {
        let inputs = Tensor::f_randn(
            [self.batch_size, self.net.config().input_dim],
            (Kind::Float, self.device),
        )?;
        let targets = Tensor::f_randint(
            self.net.config().num_classes,
            [self.batch_size],
            (Kind::Int64, self.device),
        )?;

        self.optimizer.zero_grad();
        let logits = self.net.forward(&inputs);
        let loss = logits.cross_entropy_for_logits(&targets);
        loss.backward();
        self.optimizer.step();

        f64::try_from(&loss)
    }

    /// The net this session trains
    pub fn net(&self) -> &SmokeNet {
        &self.net
    }
}

/// Drives the training loop and tracks its state
#[derive(Debug)]
pub struct SmokeTrainer {
    config: TrainConfig,
    state: TrainState,
    completed_batches: usize,
}

impl SmokeTrainer {
    /// Create a trainer with a validated configuration
    pub fn new(config: TrainConfig) -> Result<Self, SmokeError> {
        config.validate()?;
        Ok(Self { config, state: TrainState::Init, completed_batches: 0 })
    }

    /// Current lifecycle state
    pub fn state(&self) -> TrainState {
        self.state
    }

    /// Batches that finished without error
    pub fn completed_batches(&self) -> usize {
        self.completed_batches
    }

    /// The configuration this trainer runs with
    pub fn config(&self) -> &TrainConfig {
        &self.config
    }

    /// Run the loop to completion or first failure
    ///
    /// `step` is called once per batch with the 1-indexed batch number;
    /// the seam exists so tests can inject device faults. The elapsed time
    /// in the returned stats covers exactly the span from before the first
    /// iteration to after the last.
    pub fn run<F>(&mut self, mut step: F) -> Result<RunStats, SmokeError>
    where
        F: FnMut(usize) -> Result<f64, TchError>,
    {
        self.state = TrainState::Running;
        let mut losses = Vec::with_capacity(self.config.num_batches / self.config.report_every);

        let started = Instant::now();
        for batch in 1..=self.config.num_batches {
            let loss = match step(batch) {
                Ok(loss) => loss,
                Err(err) => {
                    self.state = TrainState::Failed;
                    return Err(SmokeError::Training { batch, message: err.to_string() });
                }
            };
            self.completed_batches += 1;

            if batch % self.config.report_every == 0 {
                tracing::info!(
                    "Batch {:3}/{} | Loss: {:.4}",
                    batch,
                    self.config.num_batches,
                    loss
                );
                losses.push(LossSample { batch, loss });
            }
        }
        let elapsed_secs = started.elapsed().as_secs_f64();

        self.state = TrainState::Completed;
        Ok(RunStats { elapsed_secs, batches: self.completed_batches, losses })
    }
}
