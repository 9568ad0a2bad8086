use comms::specs::RegularizationSpec;

/// A kernel weight penalty, added to both the loss and the gradient.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Regularizer {
    l1: f32,
    l2: f32,
}

impl Regularizer {
    pub const DEFAULT_RATE: f32 = 0.01;

    pub fn new(l1: f32, l2: f32) -> Self {
        Self { l1, l2 }
    }

    /// Resolves a regularization kind and rate into a `Regularizer`.
    pub fn from_spec(spec: RegularizationSpec, rate: Option<f32>) -> Self {
        let rate = rate.unwrap_or(Self::DEFAULT_RATE);
        match spec {
            RegularizationSpec::L1 => Self::new(rate, 0.),
            RegularizationSpec::L2 => Self::new(0., rate),
            RegularizationSpec::L1l2 => Self::new(rate, rate),
        }
    }

    /// The penalty of the given kernel weights.
    pub fn penalty(&self, w: &[f32]) -> f32 {
        w.iter()
            .map(|&w| self.l1 * w.abs() + self.l2 * w * w)
            .sum()
    }

    /// Adds the gradient of the penalty to `grad`.
    pub fn add_grad(&self, w: &[f32], grad: &mut [f32]) {
        for (g, &w) in grad.iter_mut().zip(w) {
            let sign = if w == 0. { 0. } else { w.signum() };
            *g += self.l1 * sign + 2. * self.l2 * w;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn l1l2_penalty_and_grad() {
        let reg = Regularizer::from_spec(RegularizationSpec::L1l2, Some(0.5));
        let w = [1.0, -2.0, 0.0];

        assert_eq!(reg.penalty(&w), 0.5 * 3.0 + 0.5 * 5.0);

        let mut grad = [0.0; 3];
        reg.add_grad(&w, &mut grad);
        assert_eq!(grad, [0.5 + 1.0, -0.5 - 2.0, 0.0]);
    }

    #[test]
    fn default_rate() {
        let reg = Regularizer::from_spec(RegularizationSpec::L2, None);
        assert_eq!(reg, Regularizer::new(0., Regularizer::DEFAULT_RATE));
    }
}
