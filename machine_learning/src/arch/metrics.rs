use ndarray::ArrayView2;

use crate::tensor::argmax_rows;

/// The batch-weighted metrics of an epoch or evaluation.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct EpochStats {
    pub loss: f32,
    pub accuracy: Option<f32>,
}

/// The fraction of rows whose predicted class matches the target.
///
/// Single column outputs are thresholded at 0.5, wider ones compared by argmax.
pub fn accuracy(y_pred: ArrayView2<f32>, y: ArrayView2<f32>) -> f32 {
    if y_pred.nrows() == 0 {
        return 0.;
    }

    let correct = if y_pred.ncols() == 1 {
        y_pred
            .iter()
            .zip(y.iter())
            .filter(|&(&p, &t)| (p > 0.5) == (t > 0.5))
            .count()
    } else {
        argmax_rows(y_pred)
            .into_iter()
            .zip(argmax_rows(y))
            .filter(|(p, t)| p == t)
            .count()
    };

    correct as f32 / y_pred.nrows() as f32
}

#[cfg(test)]
mod tests {
    use ndarray::array;

    use super::*;

    #[test]
    fn binary_and_categorical_accuracy() {
        let y = array![[1.0], [0.0], [1.0], [0.0]];
        let p = array![[0.9], [0.2], [0.4], [0.6]];
        assert_eq!(accuracy(p.view(), y.view()), 0.5);

        let y = array![[0.0, 1.0], [1.0, 0.0]];
        let p = array![[0.3, 0.7], [0.6, 0.4]];
        assert_eq!(accuracy(p.view(), y.view()), 1.0);
    }
}
