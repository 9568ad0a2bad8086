use ndarray::{Array2, ArrayView2, Axis, s};
use rand::{Rng, seq::SliceRandom};

use crate::{MlErr, Result, tensor};

/// Features and targets of a fit, one sample per row.
#[derive(Debug, Clone)]
pub struct Dataset {
    x: Array2<f32>,
    y: Array2<f32>,
}

impl Dataset {
    /// Creates a new `Dataset`.
    ///
    /// # Returns
    /// A `SizeMismatch` error if `x` and `y` hold a different amount of rows.
    pub fn new(x: Array2<f32>, y: Array2<f32>) -> Result<Self> {
        if x.nrows() != y.nrows() {
            return Err(MlErr::SizeMismatch {
                a: "features",
                b: "targets",
                got: x.nrows(),
                expected: y.nrows(),
            });
        }

        Ok(Self { x, y })
    }

    pub fn len(&self) -> usize {
        self.x.nrows()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn x(&self) -> ArrayView2<'_, f32> {
        self.x.view()
    }

    pub fn y(&self) -> ArrayView2<'_, f32> {
        self.y.view()
    }

    /// Holds out the last `fraction` of the rows, before any shuffling.
    ///
    /// # Returns
    /// The remaining rows and the held-out ones, `None` if nothing was held out.
    pub fn split_validation(self, fraction: f32) -> Result<(Self, Option<Self>)> {
        if !(0. ..1.).contains(&fraction) {
            return Err(MlErr::invalid(format!(
                "validationSplit must be in [0, 1), got {fraction}"
            )));
        }

        let at = (self.len() as f32 * (1. - fraction)).floor() as usize;
        if at == self.len() {
            return Ok((self, None));
        }

        let val = Self {
            x: self.x.slice(s![at.., ..]).to_owned(),
            y: self.y.slice(s![at.., ..]).to_owned(),
        };
        let train = Self {
            x: self.x.slice(s![..at, ..]).to_owned(),
            y: self.y.slice(s![..at, ..]).to_owned(),
        };

        Ok((train, Some(val)))
    }

    /// Permutes the rows uniformly at random.
    pub fn shuffle<R: Rng>(&mut self, rng: &mut R) {
        let mut order: Vec<usize> = (0..self.len()).collect();
        order.shuffle(rng);

        self.x = tensor::gather_rows(self.x.view(), &order);
        self.y = tensor::gather_rows(self.y.view(), &order);
    }

    /// Iterates over consecutive batches of at most `batch_size` rows.
    pub fn batches(
        &self,
        batch_size: usize,
    ) -> impl Iterator<Item = (ArrayView2<'_, f32>, ArrayView2<'_, f32>)> {
        let size = batch_size.max(1);
        self.x
            .axis_chunks_iter(Axis(0), size)
            .zip(self.y.axis_chunks_iter(Axis(0), size))
    }
}

#[cfg(test)]
mod tests {
    use ndarray::Array;
    use rand::{SeedableRng, rngs::StdRng};

    use super::*;

    fn dataset(n: usize) -> Dataset {
        let x = Array::from_shape_fn((n, 2), |(i, j)| (i * 2 + j) as f32);
        let y = Array::from_shape_fn((n, 1), |(i, _)| i as f32);
        Dataset::new(x, y).unwrap()
    }

    #[test]
    fn batches_cover_every_row() {
        let data = dataset(7);
        let sizes: Vec<usize> = data.batches(3).map(|(x, _)| x.nrows()).collect();
        assert_eq!(sizes, vec![3, 3, 1]);
    }

    #[test]
    fn shuffle_keeps_rows_paired() {
        let mut data = dataset(20);
        data.shuffle(&mut StdRng::seed_from_u64(4));

        for (x, y) in data.x().rows().into_iter().zip(data.y().rows()) {
            assert_eq!(x[0], y[0] * 2.);
        }
        let mut ys: Vec<f32> = data.y().iter().copied().collect();
        ys.sort_by(f32::total_cmp);
        assert_eq!(ys, (0..20).map(|i| i as f32).collect::<Vec<_>>());
    }

    #[test]
    fn validation_takes_the_tail() {
        let (train, val) = dataset(10).split_validation(0.2).unwrap();
        let val = val.unwrap();

        assert_eq!(train.len(), 8);
        assert_eq!(val.y().column(0).to_vec(), vec![8., 9.]);
        assert!(dataset(3).split_validation(0.).unwrap().1.is_none());
        assert!(dataset(3).split_validation(1.).is_err());
    }

    #[test]
    fn mismatched_rows_fail() {
        let err = Dataset::new(Array2::zeros((3, 1)), Array2::zeros((2, 1))).unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::Runtime);
    }
}
