//! Simplified Graph Convolution (SGC) multi-label classification of movies.
//!
//! The crate loads a movie graph (see [`dataset`]), trains an [`model::Sgc`]
//! with full-batch gradient descent and reports micro/macro F1 per split.

pub mod config;
pub mod dataset;
pub mod error;
pub mod graph;
pub mod initialization;
pub mod layer;
pub mod loss;
pub mod metrics;
pub mod model;
pub mod optimizer;
pub mod regularization;
pub mod train;


pub mod prelude {
    pub use crate::config::{Device, TrainConfig};
    pub use crate::dataset::{load_data, DataOptions, GraphData, Split};
    pub use crate::error::{Error, Result};
    pub use crate::graph::Adjacency;
    pub use crate::initialization::Initialization;
    pub use crate::metrics::{f1_score, predict, Average, F1Pair, DEFAULT_LOGIT_THRESHOLD};
    pub use crate::model::{Mode, Model, Sgc};
    pub use crate::optimizer::OptimizerType;
    pub use crate::train::{EpochReport, TestReport, Trainer};
}
