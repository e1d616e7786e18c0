use std::fmt::{Display, Formatter};

use ndarray::{Array2, Zip};

use crate::error::{Error, Result};

/// Sigmoid then binary cross-entropy, fused for numerical stability,
/// averaged over every cell (rows * classes).
/// The derivative wrt the logits is `(sigmoid(z) - y) / cells`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BceWithLogits;

impl BceWithLogits {
    pub fn value(&self, logits: &Array2<f32>, targets: &Array2<f32>) -> Result<f32> {
        check_shape(logits, targets)?;
        let cells = logits.len();
        if cells == 0 {
            return Ok(0.);
        }
        // max(z,0) - z*y + ln(1 + e^-|z|)
        let sum = Zip::from(logits)
            .and(targets)
            .fold(0f64, |acc, &z, &y| {
                acc + (z.max(0.) - z * y + (-z.abs()).exp().ln_1p()) as f64
            });
        Ok((sum / cells as f64) as f32)
    }

    pub fn gradient(&self, logits: &Array2<f32>, targets: &Array2<f32>) -> Result<Array2<f32>> {
        check_shape(logits, targets)?;
        let cells = logits.len().max(1) as f32;
        Ok(Zip::from(logits)
            .and(targets)
            .map_collect(|&z, &y| (sigmoid(z) - y) / cells))
    }
}

pub fn sigmoid(val: f32) -> f32 {
    1. / (1. + (-val).exp())
}

fn check_shape(logits: &Array2<f32>, targets: &Array2<f32>) -> Result<()> {
    if logits.dim() != targets.dim() {
        return Err(Error::Shape(format!(
            "logits {:?} vs targets {:?}",
            logits.dim(),
            targets.dim()
        )));
    }
    Ok(())
}

impl Display for BceWithLogits {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "Binary Cross-Entropy with logits")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn zero_logits_is_ln2() {
        let z = Array2::zeros((3, 2));
        let y = array![[1., 0.], [0., 1.], [1., 1.]];
        let loss = BceWithLogits.value(&z, &y).unwrap();
        assert!((loss - std::f32::consts::LN_2).abs() < 1e-6);
    }

    #[test]
    fn matches_hand_computation() {
        let z = array![[2.0f32, -1.0]];
        let y = array![[1.0f32, 1.0]];
        let expected = (-(sigmoid(2.0).ln()) - sigmoid(-1.0).ln()) / 2.;
        let loss = BceWithLogits.value(&z, &y).unwrap();
        assert!((loss - expected).abs() < 1e-6, "{loss} vs {expected}");
    }

    #[test]
    fn large_logits_stay_finite() {
        let z = array![[500.0f32, -500.0]];
        let y = array![[0.0f32, 1.0]];
        let loss = BceWithLogits.value(&z, &y).unwrap();
        assert!(loss.is_finite());
        assert!((loss - 500.).abs() < 1e-3);
    }

    #[test]
    fn gradient_matches_finite_difference() {
        let z = array![[0.3f32, -0.7], [1.2, 0.1]];
        let y = array![[1.0f32, 0.0], [0.0, 1.0]];
        let grad = BceWithLogits.gradient(&z, &y).unwrap();
        let eps = 1e-3;
        for ((r, c), g) in grad.indexed_iter() {
            let mut plus = z.clone();
            plus[[r, c]] += eps;
            let mut minus = z.clone();
            minus[[r, c]] -= eps;
            let numeric = (BceWithLogits.value(&plus, &y).unwrap()
                - BceWithLogits.value(&minus, &y).unwrap())
                / (2. * eps);
            assert!((numeric - g).abs() < 1e-3, "{numeric} vs {g}");
        }
    }

    #[test]
    fn shape_mismatch_is_error() {
        let z = Array2::<f32>::zeros((2, 2));
        let y = Array2::<f32>::zeros((2, 3));
        assert!(matches!(BceWithLogits.value(&z, &y), Err(Error::Shape(_))));
    }
}
