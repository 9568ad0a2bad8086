use ndarray::{Array2, ArrayView2, Zip};

use super::LossFn;

const EPSILON: f32 = 1e-7;

fn clip(p: f32) -> f32 {
    p.clamp(EPSILON, 1. - EPSILON)
}

/// Binary cross entropy over sigmoid outputs, averaged over every element.
#[derive(Default, Clone, Copy)]
pub struct BinaryCrossEntropy;

impl LossFn for BinaryCrossEntropy {
    fn loss(&self, y_pred: ArrayView2<f32>, y: ArrayView2<f32>) -> f32 {
        let total = Zip::from(&y_pred).and(&y).fold(0., |acc, &p, &y| {
            let p = clip(p);
            acc - (y * p.ln() + (1. - y) * (1. - p).ln())
        });

        total / y_pred.len().max(1) as f32
    }

    fn loss_prime(&self, y_pred: ArrayView2<f32>, y: ArrayView2<f32>) -> Array2<f32> {
        let n = y_pred.len().max(1) as f32;
        Zip::from(&y_pred)
            .and(&y)
            .map_collect(|&p, &y| {
                let p = clip(p);
                (p - y) / (p * (1. - p)) / n
            })
    }

    fn name(&self) -> &'static str {
        "binaryCrossentropy"
    }
}

/// Categorical cross entropy over softmax outputs, averaged over samples.
#[derive(Default, Clone, Copy)]
pub struct CategoricalCrossEntropy;

impl LossFn for CategoricalCrossEntropy {
    fn loss(&self, y_pred: ArrayView2<f32>, y: ArrayView2<f32>) -> f32 {
        let total = Zip::from(&y_pred)
            .and(&y)
            .fold(0., |acc, &p, &y| acc - y * clip(p).ln());

        total / y_pred.nrows().max(1) as f32
    }

    fn loss_prime(&self, y_pred: ArrayView2<f32>, y: ArrayView2<f32>) -> Array2<f32> {
        let n = y_pred.nrows().max(1) as f32;
        Zip::from(&y_pred)
            .and(&y)
            .map_collect(|&p, &y| -y / clip(p) / n)
    }

    fn name(&self) -> &'static str {
        "categoricalCrossentropy"
    }
}

#[cfg(test)]
mod tests {
    use ndarray::array;

    use super::*;

    #[test]
    fn binary_loss_of_confident_predictions() {
        let y = array![[1.0], [0.0]];
        let good = array![[0.99], [0.01]];
        let bad = array![[0.01], [0.99]];

        let bce = BinaryCrossEntropy;
        assert!(bce.loss(good.view(), y.view()) < 0.02);
        assert!(bce.loss(bad.view(), y.view()) > 4.0);
    }

    #[test]
    fn categorical_loss_is_finite_at_zero_probability() {
        let y = array![[0.0, 1.0]];
        let p = array![[1.0, 0.0]];

        let cce = CategoricalCrossEntropy;
        assert!(cce.loss(p.view(), y.view()).is_finite());
        assert!(cce.loss_prime(p.view(), y.view()).iter().all(|g| g.is_finite()));
    }

    #[test]
    fn binary_gradient_points_towards_target() {
        let y = array![[1.0]];
        let p = array![[0.3]];

        let g = BinaryCrossEntropy.loss_prime(p.view(), y.view());
        assert!(g[[0, 0]] < 0.);
    }
}
