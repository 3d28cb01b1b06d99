//! Fixed-topology network for the training smoke test
//!
//! A 3-layer fully-connected net (1024 -> 512 -> 256 -> 10) with ReLU
//! between layers, built with tch-rs. The topology is deliberately small:
//! the point is to exercise allocation, forward, backward, and optimizer
//! kernels on the device, not to learn anything.

use anyhow::{anyhow, Result};
use std::panic::{catch_unwind, AssertUnwindSafe};
use tch::{
    nn::{self, Module, OptimizerConfig},
    Device, Tensor,
};

use crate::error::{panic_message, SmokeError};

/// Network topology configuration
#[derive(Debug, Clone)]
pub struct NetConfig {
    /// Input feature dimension
    pub input_dim: i64,
    /// Hidden layer widths, applied in order
    pub hidden_dims: [i64; 2],
    /// Number of output classes
    pub num_classes: i64,
}

impl Default for NetConfig {
    fn default() -> Self {
        Self { input_dim: 1024, hidden_dims: [512, 256], num_classes: 10 }
    }
}

impl NetConfig {
    /// Validate configuration parameters
    pub fn validate(&self) -> Result<()> {
        if self.input_dim <= 0 {
            return Err(anyhow!("input_dim must be positive"));
        }
        if self.hidden_dims.iter().any(|&d| d <= 0) {
            return Err(anyhow!("hidden_dims must be positive"));
        }
        if self.num_classes <= 0 {
            return Err(anyhow!("num_classes must be positive"));
        }
        Ok(())
    }
}

/// The smoke-test network
///
/// Owns its `VarStore`; all parameters live on the device passed to
/// [`SmokeNet::new`]. Dropping the net releases every parameter tensor.
pub struct SmokeNet {
    vs: nn::VarStore,
    layers: nn::Sequential,
    device: Device,
    config: NetConfig,
}

impl SmokeNet {
    /// Build the network with its parameters on `device`
    ///
    /// Placement failures (device memory exhaustion, runtime errors) abort
    /// construction; whatever was partially allocated is released when the
    /// half-built `VarStore` drops inside the failed closure.
    pub fn new(device: Device, config: NetConfig) -> Result<Self, SmokeError> {
        config.validate()?;

        let built = catch_unwind(AssertUnwindSafe(|| {
            let vs = nn::VarStore::new(device);
            let root = vs.root();

            let layers = nn::seq()
                .add(nn::linear(
                    &root / "fc1",
                    config.input_dim,
                    config.hidden_dims[0],
                    Default::default(),
                ))
                .add_fn(|xs| xs.relu())
                .add(nn::linear(
                    &root / "fc2",
                    config.hidden_dims[0],
                    config.hidden_dims[1],
                    Default::default(),
                ))
                .add_fn(|xs| xs.relu())
                .add(nn::linear(
                    &root / "fc3",
                    config.hidden_dims[1],
                    config.num_classes,
                    Default::default(),
                ));

            (vs, layers)
        }));

        match built {
            Ok((vs, layers)) => Ok(Self { vs, layers, device, config }),
            Err(panic) => Err(SmokeError::Placement {
                device,
                message: panic_message(panic),
            }),
        }
    }

    /// Forward pass: [N, input_dim] -> [N, num_classes]
    pub fn forward(&self, xs: &Tensor) -> Tensor {
        self.layers.forward(xs)
    }

    /// Device the parameters live on
    pub fn device(&self) -> Device {
        self.device
    }

    /// Topology this net was built with
    pub fn config(&self) -> &NetConfig {
        &self.config
    }

    /// Total number of trainable parameters
    pub fn num_parameters(&self) -> i64 {
        self.vs
            .trainable_variables()
            .iter()
            .map(|t| t.size().iter().product::<i64>())
            .sum()
    }

    /// Bytes of device memory the training session keeps live
    ///
    /// Counts f32 parameters plus their gradients plus the two Adam moment
    /// buffers. Workspace and allocator overhead are not included.
    pub fn trainable_bytes(&self) -> u64 {
        const F32: u64 = 4;
        const COPIES: u64 = 4; // params, grads, exp_avg, exp_avg_sq
        self.num_parameters() as u64 * F32 * COPIES
    }

    /// Create an Adam optimizer over this net's parameters
    pub fn adam(&self, learning_rate: f64) -> Result<nn::Optimizer, SmokeError> {
        nn::Adam::default()
            .build(&self.vs, learning_rate)
            .map_err(|e| SmokeError::OptimizerSetup { message: e.to_string() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tch::Kind;

    #[test]
    fn test_net_creation() {
        let net = SmokeNet::new(Device::Cpu, NetConfig::default()).unwrap();
        assert_eq!(net.device(), Device::Cpu);
    }

    #[test]
    fn test_forward_shape() {
        let net = SmokeNet::new(Device::Cpu, NetConfig::default()).unwrap();
        let xs = Tensor::randn([128, 1024], (Kind::Float, net.device()));
        let out = net.forward(&xs);
        assert_eq!(out.size(), vec![128, 10]);
    }

    #[test]
    fn test_parameter_count() {
        let net = SmokeNet::new(Device::Cpu, NetConfig::default()).unwrap();
        // 1024*512+512 + 512*256+256 + 256*10+10
        assert_eq!(net.num_parameters(), 658_698);
        assert_eq!(net.trainable_bytes(), 658_698 * 4 * 4);
    }

    #[test]
    fn test_optimizer_creation() {
        let net = SmokeNet::new(Device::Cpu, NetConfig::default()).unwrap();
        let _opt = net.adam(1e-3).unwrap();
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = NetConfig { input_dim: 0, ..Default::default() };
        let err = SmokeNet::new(Device::Cpu, config).unwrap_err();
        assert!(matches!(err, SmokeError::InvalidConfig(_)));
    }
}
