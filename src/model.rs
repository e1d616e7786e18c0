use std::fmt::Display;

use ndarray::{Array2, Axis};
use tracing::debug;

use crate::{
    error::{Error, Result},
    graph::Adjacency,
    initialization::Initialization,
    layer::Linear,
};

/// Whether stochastic regularization is active for a forward pass.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Mode {
    Train,
    Eval,
}

/// Result of a forward pass: logits for every node plus whatever the model
/// needs to compute gradients later.
#[derive(Debug, Clone)]
pub struct ForwardPass {
    pub logits: Array2<f32>,
    pub(crate) hidden: Array2<f32>,
}

/// Gradients (or parameter deltas) in the same order as `Model::weights`/`Model::biases`
#[derive(Debug, Clone, PartialEq)]
pub struct Gradients {
    pub weights: Vec<Array2<f32>>,
    pub bias: Vec<Array2<f32>>,
}

pub trait Model {
    /// Logits of shape `[nodes, classes]`
    fn forward(&self, features: &Array2<f32>, adj: &Adjacency, mode: Mode) -> Result<ForwardPass>;

    /// Gradients wrt every parameter, given the gradient of the loss wrt the
    /// logits of the selected `rows`
    fn backward(&self, pass: &ForwardPass, rows: &[usize], grad: &Array2<f32>)
        -> Result<Gradients>;

    fn weights(&self) -> Vec<&Array2<f32>>;
    fn biases(&self) -> Vec<&Array2<f32>>;

    /// Adds deltas onto the parameters
    fn apply_update(&mut self, update: &Gradients);

    /// `[inputs, outputs]`
    fn shape(&self) -> Vec<usize>;
}

/// Simplified Graph Convolution: `K` parameter-free propagation steps
/// followed by a single linear layer, `logits = Â^K X W + b`.
///
/// There is no stochastic layer, so `Mode` does not change the output.
#[derive(Debug, Clone, PartialEq)]
pub struct Sgc {
    linear: Linear,
    degree: usize,
}

impl Sgc {
    ///```rust
    ///   use sgc_movielens::{graph::Adjacency, initialization::Initialization, model::*};
    ///   use ndarray::Array2;
    ///
    ///   let mut rng = fastrand::Rng::with_seed(42);
    ///   let model = Sgc::new(4, 3, 2, Initialization::FanInUniform, &mut rng);
    ///   let adj = Adjacency::from_edges(5, &[(0, 1), (1, 2), (3, 4)]).unwrap();
    ///   let features = Array2::ones((5, 4));
    ///   let pass = model.forward(&features, &adj, Mode::Eval).unwrap();
    ///   assert_eq!(pass.logits.dim(), (5, 3));
    ///```
    pub fn new(
        nfeat: usize,
        nclass: usize,
        degree: usize,
        initialization: Initialization,
        rng: &mut fastrand::Rng,
    ) -> Self {
        Self {
            linear: Linear::new(nfeat, nclass, initialization, rng),
            degree,
        }
    }

    pub fn degree(&self) -> usize {
        self.degree
    }
}

impl Model for Sgc {
    fn forward(&self, features: &Array2<f32>, adj: &Adjacency, mode: Mode) -> Result<ForwardPass> {
        let hidden = adj.propagate(features, self.degree)?;
        let logits = self.linear.forward(&hidden)?;
        debug!(?mode, nodes = logits.nrows(), "sgc forward");
        Ok(ForwardPass { logits, hidden })
    }

    fn backward(
        &self,
        pass: &ForwardPass,
        rows: &[usize],
        grad: &Array2<f32>,
    ) -> Result<Gradients> {
        if grad.dim() != (rows.len(), self.linear.outputs()) {
            return Err(Error::Shape(format!(
                "gradient {:?} does not match {} rows x {} classes",
                grad.dim(),
                rows.len(),
                self.linear.outputs()
            )));
        }
        let inputs = pass.hidden.select(Axis(0), rows);
        let (weights, bias) = self.linear.gradients(&inputs, grad);
        Ok(Gradients {
            weights: vec![weights],
            bias: vec![bias],
        })
    }

    fn weights(&self) -> Vec<&Array2<f32>> {
        vec![&self.linear.weights]
    }

    fn biases(&self) -> Vec<&Array2<f32>> {
        vec![&self.linear.bias]
    }

    fn apply_update(&mut self, update: &Gradients) {
        self.linear.weights += &update.weights[0];
        self.linear.bias += &update.bias[0];
    }

    fn shape(&self) -> Vec<usize> {
        vec![self.linear.inputs(), self.linear.outputs()]
    }
}

impl Display for Sgc {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SGC(K={}) {}", self.degree, self.linear)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loss::BceWithLogits;
    use ndarray::array;

    fn setup() -> (Sgc, Array2<f32>, Adjacency) {
        let mut rng = fastrand::Rng::with_seed(7);
        let model = Sgc::new(3, 2, 2, Initialization::FanInUniform, &mut rng);
        let features = array![[1., 0., 0.5], [0., 1., 0.2], [0.3, 0.3, 1.], [1., 1., 0.]];
        let adj = Adjacency::from_edges(4, &[(0, 1), (1, 2)]).unwrap();
        (model, features, adj)
    }

    #[test]
    fn mode_does_not_change_output() {
        let (model, features, adj) = setup();
        let train = model.forward(&features, &adj, Mode::Train).unwrap();
        let eval = model.forward(&features, &adj, Mode::Eval).unwrap();
        assert_eq!(train.logits, eval.logits);
    }

    #[test]
    fn degree_zero_is_plain_linear() {
        let mut rng = fastrand::Rng::with_seed(1);
        let model = Sgc::new(2, 1, 0, Initialization::Fixed(1.), &mut rng);
        let adj = Adjacency::from_edges(2, &[(0, 1)]).unwrap();
        let pass = model
            .forward(&array![[1., 2.], [3., 4.]], &adj, Mode::Eval)
            .unwrap();
        assert_eq!(pass.logits, array![[4.], [8.]]);
    }

    #[test]
    fn backward_matches_finite_difference() {
        let (mut model, features, adj) = setup();
        let rows = [0usize, 2];
        let labels = array![[1., 0.], [0., 1.]];

        let loss_at = |m: &Sgc| {
            let pass = m.forward(&features, &adj, Mode::Train).unwrap();
            let logits = pass.logits.select(Axis(0), &rows);
            BceWithLogits.value(&logits, &labels).unwrap()
        };

        let pass = model.forward(&features, &adj, Mode::Train).unwrap();
        let logits = pass.logits.select(Axis(0), &rows);
        let grad = BceWithLogits.gradient(&logits, &labels).unwrap();
        let grads = model.backward(&pass, &rows, &grad).unwrap();

        let eps = 1e-2;
        let (r, c) = (1, 0);
        let mut delta = Gradients {
            weights: vec![Array2::zeros((3, 2))],
            bias: vec![Array2::zeros((1, 2))],
        };
        delta.weights[0][[r, c]] = eps;
        model.apply_update(&delta);
        let plus = loss_at(&model);
        delta.weights[0][[r, c]] = -2. * eps;
        model.apply_update(&delta);
        let minus = loss_at(&model);
        let numeric = (plus - minus) / (2. * eps);
        assert!(
            (numeric - grads.weights[0][[r, c]]).abs() < 1e-3,
            "{numeric} vs {}",
            grads.weights[0][[r, c]]
        );
    }

    #[test]
    fn backward_rejects_bad_gradient_shape() {
        let (model, features, adj) = setup();
        let pass = model.forward(&features, &adj, Mode::Train).unwrap();
        let bad = Array2::zeros((3, 2));
        assert!(model.backward(&pass, &[0, 1], &bad).is_err());
    }

    #[test]
    fn shape_reports_feature_and_class_counts() {
        let (model, _, _) = setup();
        assert_eq!(model.shape(), vec![3, 2]);
        assert_eq!(model.degree(), 2);
    }
}
