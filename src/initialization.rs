use std::fmt::Display;

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Initialization {
    /// Uniform in `±1/sqrt(fan_in)`, same range for weights and bias
    FanInUniform,
    Fixed(f32),
}

pub fn calc_initialization(rng: &mut fastrand::Rng, typ: Initialization, fan_in: usize) -> f32 {
    match typ {
        Initialization::FanInUniform => {
            (rng.f32() * 2. - 1.) * (1.0 / fan_in.max(1) as f32).sqrt()
        }
        Initialization::Fixed(val) => val,
    }
}

impl Display for Initialization {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Initialization::FanInUniform => write!(f, "FanInUniform"),
            Initialization::Fixed(v) => write!(f, "Fixed({v})"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fan_in_bounds() {
        let mut rng = fastrand::Rng::with_seed(3);
        let bound = (1.0f32 / 16.).sqrt();
        for _ in 0..1000 {
            let v = calc_initialization(&mut rng, Initialization::FanInUniform, 16);
            assert!(v.abs() <= bound);
        }
    }

    #[test]
    fn same_seed_same_values() {
        let mut a = fastrand::Rng::with_seed(42);
        let mut b = fastrand::Rng::with_seed(42);
        let va: Vec<f32> = (0..10)
            .map(|_| calc_initialization(&mut a, Initialization::FanInUniform, 4))
            .collect();
        let vb: Vec<f32> = (0..10)
            .map(|_| calc_initialization(&mut b, Initialization::FanInUniform, 4))
            .collect();
        assert_eq!(va, vb);
    }
}
