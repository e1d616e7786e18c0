//! Full-batch training loop and test runner.

use std::fmt::Display;
use std::time::Instant;

use ndarray::{Array2, Axis};
use tracing::{debug, info};

use crate::{
    config::TrainConfig,
    dataset::{GraphData, Split},
    error::{Error, Result},
    loss::BceWithLogits,
    metrics::{predict, F1Pair},
    model::{Gradients, Model, Mode},
    optimizer::Optimizer,
    regularization::Regularization,
};

/// Metrics of one training epoch
#[derive(Debug, Clone, PartialEq)]
pub struct EpochReport {
    /// zero based
    pub epoch: usize,
    pub loss_train: f32,
    pub f1_train: F1Pair,
    pub loss_val: f32,
    pub f1_val: F1Pair,
    pub seconds: f32,
}

impl Display for EpochReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Epoch: {:04} loss_train: {:.4} f1_train: {:.4} {:.4} loss_val: {:.4} f1_val: {:.4} {:.4} time: {:.4}s",
            self.epoch + 1,
            self.loss_train,
            self.f1_train.micro,
            self.f1_train.macro_,
            self.loss_val,
            self.f1_val.micro,
            self.f1_val.macro_,
            self.seconds
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TestReport {
    pub loss: f32,
    pub f1: F1Pair,
}

impl Display for TestReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Test set results: loss = {:.4} f1_macro_test = {:.4} f1_micro_test = {:.4}",
            self.loss, self.f1.macro_, self.f1.micro
        )
    }
}

/// Owns the model and optimizer for one run over one dataset
pub struct Trainer<'a, M: Model> {
    model: M,
    optimizer: Optimizer,
    data: &'a GraphData,
    config: TrainConfig,
    loss: BceWithLogits,
    train_labels: Array2<f32>,
    val_labels: Array2<f32>,
    test_labels: Array2<f32>,
}

impl<'a, M: Model> Trainer<'a, M> {
    pub fn new(model: M, data: &'a GraphData, config: TrainConfig) -> Self {
        let optimizer = Optimizer::new(
            config.optimizer,
            config.learning_rate,
            Regularization::weight_decay(config.weight_decay),
            &model.weights(),
            &model.biases(),
        );
        info!(
            optimizer = %config.optimizer,
            lr = config.learning_rate,
            weight_decay = config.weight_decay,
            fastmode = config.fastmode,
            "trainer ready"
        );
        Self {
            model,
            optimizer,
            train_labels: data.split_labels(Split::Train),
            val_labels: data.split_labels(Split::Val),
            test_labels: data.split_labels(Split::Test),
            data,
            config,
            loss: BceWithLogits,
        }
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    pub fn config(&self) -> &TrainConfig {
        &self.config
    }

    /// One gradient step over the train split, then validation.
    ///
    /// Validation F1 is computed from the predictions taken *before* the step
    /// (in train mode), while validation loss uses the refreshed eval-mode
    /// forward pass unless `fastmode` is set.
    pub fn train(&mut self, epoch: usize) -> Result<EpochReport> {
        let start = Instant::now();
        let data = self.data;

        let pass = self
            .model
            .forward(&data.features, &data.adj, Mode::Train)?;
        let pred = predict(&pass.logits, self.config.threshold);

        let train_logits = pass.logits.select(Axis(0), &data.idx_train);
        let loss_train = self.loss.value(&train_logits, &self.train_labels)?;
        if !loss_train.is_finite() {
            return Err(Error::NonFinite {
                what: "training loss",
                epoch: epoch + 1,
            });
        }
        let f1_train = F1Pair::compute(
            &self.train_labels,
            &pred.select(Axis(0), &data.idx_train),
        )?;

        let grad = self.loss.gradient(&train_logits, &self.train_labels)?;
        let grads = self.model.backward(&pass, &data.idx_train, &grad)?;
        self.step(grads);

        let val_logits = if self.config.fastmode {
            pass.logits.select(Axis(0), &data.idx_val)
        } else {
            let pass = self
                .model
                .forward(&data.features, &data.adj, Mode::Eval)?;
            pass.logits.select(Axis(0), &data.idx_val)
        };
        let loss_val = self.loss.value(&val_logits, &self.val_labels)?;
        let f1_val = F1Pair::compute(&self.val_labels, &pred.select(Axis(0), &data.idx_val))?;

        let report = EpochReport {
            epoch,
            loss_train,
            f1_train,
            loss_val,
            f1_val,
            seconds: start.elapsed().as_secs_f32(),
        };
        debug!(?report, "epoch done");
        Ok(report)
    }

    fn step(&mut self, grads: Gradients) {
        let (weights, bias) = self.optimizer.calc_gradient_update(
            grads.weights,
            grads.bias,
            &self.model.weights(),
            &self.model.biases(),
        );
        self.model.apply_update(&Gradients { weights, bias });
    }

    /// Loss and F1 over the test split, eval mode
    pub fn test(&self) -> Result<TestReport> {
        let data = self.data;
        let pass = self.model.forward(&data.features, &data.adj, Mode::Eval)?;
        let pred = predict(&pass.logits, self.config.threshold);
        let test_logits = pass.logits.select(Axis(0), &data.idx_test);
        let loss = self.loss.value(&test_logits, &self.test_labels)?;
        let f1 = F1Pair::compute(&self.test_labels, &pred.select(Axis(0), &data.idx_test))?;
        Ok(TestReport { loss, f1 })
    }

    /// Runs every configured epoch, calling `report` after each one,
    /// and returns the per-epoch reports
    pub fn fit(&mut self, mut report: impl FnMut(&EpochReport)) -> Result<Vec<EpochReport>> {
        let mut reports = Vec::with_capacity(self.config.epochs);
        for epoch in 0..self.config.epochs {
            let r = self.train(epoch)?;
            report(&r);
            reports.push(r);
        }
        Ok(reports)
    }
}
