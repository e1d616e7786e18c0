//! Multi-label classification metrics.
//!
//! Inputs are binary indicator matrices `[samples, classes]`; a cell is a
//! positive when it is non-zero.

use std::fmt::Display;

use ndarray::{Array2, Zip};

use crate::error::{Error, Result};

/// Logit threshold used for multi-label predictions.
/// Tied to the BCE-with-logits loss: `-1.0` corresponds to a probability of ~0.269.
pub const DEFAULT_LOGIT_THRESHOLD: f32 = -1.0;

/// Averaging strategy for multi-label F1.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Average {
    /// Count TP, FP, FN over every cell, then compute one F1.
    Micro,
    /// F1 per class, then the unweighted mean over all classes.
    Macro,
}

impl Display for Average {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Average::Micro => write!(f, "micro"),
            Average::Macro => write!(f, "macro"),
        }
    }
}

/// Binary predictions: `1` where the logit is strictly above `threshold`
pub fn predict(logits: &Array2<f32>, threshold: f32) -> Array2<f32> {
    logits.mapv(|z| if z > threshold { 1. } else { 0. })
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
struct Counts {
    tp: usize,
    fp: usize,
    fn_count: usize,
}

impl Counts {
    /// `2TP / (2TP + FP + FN)`, `0.0` when nothing was predicted or expected
    fn f1(&self) -> f32 {
        let denominator = 2 * self.tp + self.fp + self.fn_count;
        if denominator == 0 {
            0.0
        } else {
            (2 * self.tp) as f32 / denominator as f32
        }
    }
}

fn class_counts(y_true: &Array2<f32>, y_pred: &Array2<f32>) -> Vec<Counts> {
    let mut counts = vec![Counts::default(); y_true.ncols()];
    for (true_row, pred_row) in y_true.rows().into_iter().zip(y_pred.rows()) {
        Zip::from(&true_row)
            .and(&pred_row)
            .and(&mut counts[..])
            .for_each(|&t, &p, c| match (t != 0., p != 0.) {
                (true, true) => c.tp += 1,
                (false, true) => c.fp += 1,
                (true, false) => c.fn_count += 1,
                (false, false) => {}
            });
    }
    counts
}

/// F1 score for multi-label indicator matrices of the same shape.
///
/// Classes with no true and no predicted positives score `0.0`, so an all-zero
/// slice never fails and yields `0.0`.
///
/// ```
/// use ndarray::array;
/// use sgc_movielens::metrics::{f1_score, Average};
///
/// let y_true = array![[1., 0.], [0., 1.]];
/// let y_pred = array![[1., 0.], [1., 1.]];
/// let micro = f1_score(&y_true, &y_pred, Average::Micro).unwrap();
/// assert!((micro - 0.8).abs() < 1e-6);
/// ```
pub fn f1_score(y_true: &Array2<f32>, y_pred: &Array2<f32>, average: Average) -> Result<f32> {
    if y_true.dim() != y_pred.dim() {
        return Err(Error::Shape(format!(
            "labels {:?} vs predictions {:?}",
            y_true.dim(),
            y_pred.dim()
        )));
    }
    let counts = class_counts(y_true, y_pred);
    if counts.is_empty() {
        return Ok(0.0);
    }

    let score = match average {
        Average::Micro => {
            let total = counts.iter().fold(Counts::default(), |acc, c| Counts {
                tp: acc.tp + c.tp,
                fp: acc.fp + c.fp,
                fn_count: acc.fn_count + c.fn_count,
            });
            total.f1()
        }
        Average::Macro => counts.iter().map(Counts::f1).sum::<f32>() / counts.len() as f32,
    };
    Ok(score)
}

/// Micro and macro F1 of one split
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct F1Pair {
    pub micro: f32,
    pub macro_: f32,
}

impl F1Pair {
    pub fn compute(y_true: &Array2<f32>, y_pred: &Array2<f32>) -> Result<Self> {
        Ok(Self {
            micro: f1_score(y_true, y_pred, Average::Micro)?,
            macro_: f1_score(y_true, y_pred, Average::Macro)?,
        })
    }
}
