use std::fmt::Display;

use ndarray::Array2;

#[derive(Clone, Debug, PartialEq)]
pub enum Regularization {
    None,
    /// Coupled weight decay, added to the gradient before the optimizer sees it.
    L2(f32),
}
impl Regularization {
    /// `0` decay means no regularization at all
    pub fn weight_decay(decay: f32) -> Regularization {
        if decay == 0. {
            Regularization::None
        } else {
            Regularization::L2(decay)
        }
    }

    /// Adds the penalty gradient for `param` onto `gradient`
    pub fn apply(&self, gradient: &mut Array2<f32>, param: &Array2<f32>) {
        match self {
            Regularization::None => {}
            Regularization::L2(decay) => gradient.scaled_add(*decay, param),
        }
    }
}

impl Display for Regularization {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Regularization::None => write!(f, "None"),
            Regularization::L2(v) => write!(f, "L2:{v}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn l2_adds_scaled_param() {
        let mut grad = array![[1.0, 1.0]];
        let param = array![[2.0, -4.0]];
        Regularization::L2(0.5).apply(&mut grad, &param);
        assert_eq!(grad, array![[2.0, -1.0]]);
    }

    #[test]
    fn zero_decay_is_none() {
        assert_eq!(Regularization::weight_decay(0.), Regularization::None);
        let mut grad = array![[1.0]];
        Regularization::None.apply(&mut grad, &array![[10.0]]);
        assert_eq!(grad, array![[1.0]]);
    }
}
