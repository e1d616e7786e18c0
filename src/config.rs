use std::fmt::Display;
use std::path::PathBuf;

use clap::Parser;
use tracing::{info, warn};

use crate::{
    dataset::MOVIELENS_CLASSIFICATION, metrics::DEFAULT_LOGIT_THRESHOLD, optimizer::OptimizerType,
};

/// Where tensors live. Only the CPU backend is compiled in.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Device {
    Cpu,
}

impl Device {
    /// Picks the device once at startup
    pub fn select(no_cuda: bool) -> Device {
        if no_cuda {
            info!("accelerator disabled, using cpu");
        } else {
            warn!("no accelerator backend available, falling back to cpu");
        }
        Device::Cpu
    }
}

impl Display for Device {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Device::Cpu => write!(f, "cpu"),
        }
    }
}

/// Hyper-parameters for one training run
#[derive(Clone, Debug, PartialEq)]
pub struct TrainConfig {
    pub fastmode: bool,
    pub seed: u64,
    pub epochs: usize,
    pub learning_rate: f32,
    pub weight_decay: f32,
    ///accepted for parity with other models, SGC has no dropout layer
    pub dropout: f32,
    pub degree: usize,
    pub threshold: f32,
    pub optimizer: OptimizerType,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            fastmode: false,
            seed: 42,
            epochs: 200,
            learning_rate: 0.01,
            weight_decay: 1e-4,
            dropout: 0.5,
            degree: 2,
            threshold: DEFAULT_LOGIT_THRESHOLD,
            optimizer: OptimizerType::adam(),
        }
    }
}

/// Train SGC on the MovieLens movie graph and report micro/macro F1
#[derive(Parser, Debug, Clone)]
#[command(name = "sgc-train")]
#[command(about = "Simplified Graph Convolution multi-label classification on MovieLens")]
#[command(version)]
pub struct Cli {
    /// Disables accelerator training
    #[arg(long)]
    pub no_cuda: bool,

    /// Validate during training pass
    #[arg(long)]
    pub fastmode: bool,

    /// Random seed
    #[arg(long, default_value_t = 42)]
    pub seed: u64,

    /// Number of epochs to train
    #[arg(long, default_value_t = 200)]
    pub epochs: usize,

    /// Initial learning rate
    #[arg(long, default_value_t = 0.01)]
    pub lr: f32,

    /// Weight decay (L2 loss on parameters)
    #[arg(long, alias = "weight_decay", default_value_t = 1e-4)]
    pub weight_decay: f32,

    /// Dropout rate (1 - keep probability), unused by SGC
    #[arg(long, default_value_t = 0.5)]
    pub dropout: f32,

    /// Number of propagation steps K
    #[arg(long, default_value_t = 2)]
    pub degree: usize,

    /// Logits above this are positive predictions
    #[arg(long, default_value_t = DEFAULT_LOGIT_THRESHOLD, allow_negative_numbers = true)]
    pub threshold: f32,

    /// adam, momentum or sgd
    #[arg(long, default_value = "adam")]
    pub optimizer: OptimizerType,

    /// Dataset identifier (movielens-classification or synthetic)
    #[arg(long, default_value = MOVIELENS_CLASSIFICATION)]
    pub dataset: String,

    /// Root directory holding one folder per dataset
    #[arg(long, default_value = "data")]
    pub data_dir: PathBuf,

    /// Movies are linked iff at least this many users rated both the same
    #[arg(long, default_value_t = 2)]
    pub min_shared_ratings: usize,
}

impl Cli {
    pub fn train_config(&self) -> TrainConfig {
        TrainConfig {
            fastmode: self.fastmode,
            seed: self.seed,
            epochs: self.epochs,
            learning_rate: self.lr,
            weight_decay: self.weight_decay,
            dropout: self.dropout,
            degree: self.degree,
            threshold: self.threshold,
            optimizer: self.optimizer,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_defaults_match_config_defaults() {
        let cli = Cli::parse_from(["sgc-train"]);
        assert_eq!(cli.train_config(), TrainConfig::default());
        assert_eq!(cli.dataset, MOVIELENS_CLASSIFICATION);
        assert!(!cli.no_cuda);
    }

    #[test]
    fn parses_flags() {
        let cli = Cli::parse_from([
            "sgc-train",
            "--no-cuda",
            "--fastmode",
            "--epochs",
            "0",
            "--weight_decay",
            "0.001",
            "--threshold",
            "-0.5",
            "--optimizer",
            "sgd",
        ]);
        let config = cli.train_config();
        assert!(cli.no_cuda);
        assert!(config.fastmode);
        assert_eq!(config.epochs, 0);
        assert_eq!(config.weight_decay, 0.001);
        assert_eq!(config.threshold, -0.5);
        assert_eq!(config.optimizer, OptimizerType::Sgd);
    }

    #[test]
    fn device_is_cpu() {
        assert_eq!(Device::select(true), Device::Cpu);
        assert_eq!(Device::select(false).to_string(), "cpu");
    }
}
