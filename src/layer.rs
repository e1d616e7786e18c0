use std::fmt::Display;

use ndarray::Array2;

use crate::{
    error::{Error, Result},
    initialization::{calc_initialization, Initialization},
};

/// Affine map `x . weights + bias`
#[derive(Debug, Clone, PartialEq)]
pub struct Linear {
    pub(crate) weights: Array2<f32>, // [inputs x outputs]
    pub(crate) bias: Array2<f32>,    // [1 x outputs]
    pub(crate) initialization: Initialization,
}

impl Linear {
    pub fn new(
        inputs: usize,
        outputs: usize,
        initialization: Initialization,
        rng: &mut fastrand::Rng,
    ) -> Self {
        let mut s = Self {
            weights: Array2::zeros((inputs, outputs)),
            bias: Array2::zeros((1, outputs)),
            initialization,
        };
        s.reinitialize(rng);
        s
    }

    pub fn reinitialize(&mut self, rng: &mut fastrand::Rng) {
        let inputs = self.weights.nrows();
        let init = self.initialization;
        self.weights
            .mapv_inplace(|_| calc_initialization(rng, init, inputs));
        self.bias
            .mapv_inplace(|_| calc_initialization(rng, init, inputs));
    }

    pub fn inputs(&self) -> usize {
        self.weights.nrows()
    }

    pub fn outputs(&self) -> usize {
        self.weights.ncols()
    }

    pub fn forward(&self, x: &Array2<f32>) -> Result<Array2<f32>> {
        if x.ncols() != self.inputs() {
            return Err(Error::Shape(format!(
                "linear layer expects {} inputs, got {}",
                self.inputs(),
                x.ncols()
            )));
        }
        Ok(x.dot(&self.weights) + &self.bias)
    }

    /// Gradients of the loss wrt `(weights, bias)` given the layer input `x`
    /// and the upstream gradient `grad` wrt the layer output.
    pub fn gradients(&self, x: &Array2<f32>, grad: &Array2<f32>) -> (Array2<f32>, Array2<f32>) {
        let weight_grad = x.t().dot(grad);
        let bias_grad = grad.sum_axis(ndarray::Axis(0)).insert_axis(ndarray::Axis(0));
        (weight_grad, bias_grad)
    }
}

impl Display for Linear {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Linear:{}x{} Bias:{} Initialization:{}",
            self.inputs(),
            self.outputs(),
            self.bias.ncols(),
            self.initialization,
        )
    }
}
