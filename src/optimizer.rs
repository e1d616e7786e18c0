use std::fmt::Display;
use std::str::FromStr;

use ndarray::Array2;

use crate::{error::Error, regularization::Regularization};

//used for selection
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum OptimizerType {
    Sgd,
    Momentum { beta: f32 },
    Adam { beta1: f32, beta2: f32 },
}
impl OptimizerType {
    pub fn momentum() -> Self {
        OptimizerType::Momentum { beta: 0.9 }
    }

    pub fn adam() -> Self {
        OptimizerType::Adam {
            beta1: 0.9,
            beta2: 0.999,
        }
    }
}

impl Default for OptimizerType {
    fn default() -> Self {
        OptimizerType::adam()
    }
}

impl Display for OptimizerType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OptimizerType::Sgd => write!(f, "Sgd"),
            OptimizerType::Momentum { beta } => write!(f, "Momentum({})", beta),
            OptimizerType::Adam { beta1, beta2 } => write!(f, "Adam({},{})", beta1, beta2),
        }
    }
}

impl FromStr for OptimizerType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "sgd" | "none" => Ok(OptimizerType::Sgd),
            "momentum" => Ok(OptimizerType::momentum()),
            "adam" => Ok(OptimizerType::adam()),
            _ => Err(Error::Parse(format!("unknown optimizer: {s}"))),
        }
    }
}

const ADAM_EPSILON: f32 = 1e-8;

/// Holds the optimizer state for every parameter tensor of a model.
/// Parameters are passed in the same order on every call.
pub struct Optimizer {
    optimizer_type: OptimizerType,
    state: OptimizerInternal,
    learning_rate: f32,
    regularization: Regularization,
    step: usize,
}

//used internally to hold data
enum OptimizerInternal {
    Sgd,
    Momentum(Momentum),
    Adam(Adam),
}

struct Momentum {
    weight_velocity: Vec<Array2<f32>>,
    bias_velocity: Vec<Array2<f32>>,
    beta: f32,
}

impl Momentum {
    ///Beta is the amount of the old velocity we will keep (default=0.9)
    fn new(beta: f32, weights: &[&Array2<f32>], bias: &[&Array2<f32>]) -> Self {
        Momentum {
            weight_velocity: weights.iter().map(|a| Array2::zeros(a.dim())).collect(),
            bias_velocity: bias.iter().map(|a| Array2::zeros(a.dim())).collect(),
            beta,
        }
    }
}

struct Adam {
    beta1: f32,
    beta2: f32,
    weight_velocity1: Vec<Array2<f32>>,
    bias_velocity1: Vec<Array2<f32>>,
    weight_velocity2: Vec<Array2<f32>>,
    bias_velocity2: Vec<Array2<f32>>,
}

impl Adam {
    ///Beta1 is the amount of the old velocity we will keep (default=0.9)
    ///Beta2 is the amount of the old squared velocity we will keep (default=0.999)
    fn new(beta1: f32, beta2: f32, weights: &[&Array2<f32>], bias: &[&Array2<f32>]) -> Self {
        let zeros = |v: &[&Array2<f32>]| -> Vec<Array2<f32>> {
            v.iter().map(|a| Array2::zeros(a.dim())).collect()
        };
        Adam {
            beta1,
            beta2,
            weight_velocity1: zeros(weights),
            bias_velocity1: zeros(bias),
            weight_velocity2: zeros(weights),
            bias_velocity2: zeros(bias),
        }
    }

    fn update(
        velocity1: &mut Array2<f32>,
        velocity2: &mut Array2<f32>,
        gradient: &Array2<f32>,
        beta1: f32,
        beta2: f32,
        learning_rate: f32,
        step: i32,
    ) -> Array2<f32> {
        // first and second moment estimates
        *velocity1 = &*velocity1 * beta1 + gradient * (1.0 - beta1);
        *velocity2 = &*velocity2 * beta2 + &gradient.mapv(|x| x.powi(2)) * (1.0 - beta2);

        // bias corrected
        let m = &*velocity1 / (1.0 - beta1.powi(step));
        let v = &*velocity2 / (1.0 - beta2.powi(step));

        m / (v.mapv(f32::sqrt) + ADAM_EPSILON) * -learning_rate
    }
}

impl Optimizer {
    pub fn new(
        typ: OptimizerType,
        learning_rate: f32,
        regularization: Regularization,
        weights: &[&Array2<f32>],
        bias: &[&Array2<f32>],
    ) -> Self {
        let state = match typ {
            OptimizerType::Sgd => OptimizerInternal::Sgd,
            OptimizerType::Momentum { beta } => {
                OptimizerInternal::Momentum(Momentum::new(beta, weights, bias))
            }
            OptimizerType::Adam { beta1, beta2 } => {
                OptimizerInternal::Adam(Adam::new(beta1, beta2, weights, bias))
            }
        };
        Self {
            optimizer_type: typ,
            state,
            learning_rate,
            regularization,
            step: 0,
        }
    }

    pub fn optimizer_type(&self) -> OptimizerType {
        self.optimizer_type
    }

    pub fn learning_rate(&self) -> f32 {
        self.learning_rate
    }

    /// Number of updates computed so far
    pub fn steps(&self) -> usize {
        self.step
    }

    ///this turns raw gradients into the deltas to add onto the parameters,
    ///applying weight decay first.
    ///e.g. for Sgd, it returns `-learning_rate*(gradient + decay*param)`
    ///this returns (`weights_delta`,`bias_delta`)
    pub fn calc_gradient_update(
        &mut self,
        mut weight_gradients: Vec<Array2<f32>>,
        mut bias_gradients: Vec<Array2<f32>>,
        weights: &[&Array2<f32>],
        bias: &[&Array2<f32>],
    ) -> (Vec<Array2<f32>>, Vec<Array2<f32>>) {
        self.step += 1;
        let step = self.step as i32;
        let learning_rate = self.learning_rate;

        for l in 0..weight_gradients.len() {
            self.regularization.apply(&mut weight_gradients[l], weights[l]);
            self.regularization.apply(&mut bias_gradients[l], bias[l]);

            match &mut self.state {
                OptimizerInternal::Sgd => {
                    weight_gradients[l].mapv_inplace(|a| a * -learning_rate);
                    bias_gradients[l].mapv_inplace(|a| a * -learning_rate);
                }
                OptimizerInternal::Momentum(momentum) => {
                    momentum.weight_velocity[l] = &momentum.weight_velocity[l] * momentum.beta
                        + &weight_gradients[l] * -learning_rate;
                    weight_gradients[l] = momentum.weight_velocity[l].clone();

                    momentum.bias_velocity[l] = &momentum.bias_velocity[l] * momentum.beta
                        + &bias_gradients[l] * -learning_rate;
                    bias_gradients[l] = momentum.bias_velocity[l].clone();
                }
                OptimizerInternal::Adam(adam) => {
                    weight_gradients[l] = Adam::update(
                        &mut adam.weight_velocity1[l],
                        &mut adam.weight_velocity2[l],
                        &weight_gradients[l],
                        adam.beta1,
                        adam.beta2,
                        learning_rate,
                        step,
                    );
                    bias_gradients[l] = Adam::update(
                        &mut adam.bias_velocity1[l],
                        &mut adam.bias_velocity2[l],
                        &bias_gradients[l],
                        adam.beta1,
                        adam.beta2,
                        learning_rate,
                        step,
                    );
                }
            }
        }
        (weight_gradients, bias_gradients)
    }
}
