//! Small tensor helpers shared by the preprocessor, trainer and inference.

use ndarray::{Array2, ArrayView2, Axis, concatenate};

use crate::Result;

/// Concatenates `blocks` horizontally, all of them must share the row count.
pub fn hstack(nrows: usize, blocks: &[Array2<f32>]) -> Result<Array2<f32>> {
    if blocks.is_empty() {
        return Ok(Array2::zeros((nrows, 0)));
    }

    let views: Vec<_> = blocks.iter().map(|b| b.view()).collect();
    Ok(concatenate(Axis(1), &views)?)
}

/// Gathers the rows at `indices`, in order.
pub fn gather_rows(x: ArrayView2<f32>, indices: &[usize]) -> Array2<f32> {
    x.select(Axis(0), indices)
}

/// One-hot encodes class indices into a `(indices.len(), depth)` matrix.
pub fn one_hot(indices: &[usize], depth: usize) -> Array2<f32> {
    let mut out = Array2::zeros((indices.len(), depth));
    for (mut row, &i) in out.rows_mut().into_iter().zip(indices) {
        if i < depth {
            row[i] = 1.0;
        }
    }

    out
}

/// The index of the maximum of each row, the first one on ties.
pub fn argmax_rows(x: ArrayView2<f32>) -> Vec<usize> {
    x.rows()
        .into_iter()
        .map(|row| {
            row.iter()
                .enumerate()
                .fold((0, f32::NEG_INFINITY), |(bi, bv), (i, &v)| {
                    if v > bv { (i, v) } else { (bi, bv) }
                })
                .0
        })
        .collect()
}

/// Applies a numerically stable softmax to every row in place.
pub fn softmax_rows(x: &mut Array2<f32>) {
    for mut row in x.rows_mut() {
        let max = row.fold(f32::NEG_INFINITY, |m, &v| m.max(v));
        row.mapv_inplace(|v| (v - max).exp());
        let sum = row.sum();
        if sum > 0.0 {
            row /= sum;
        }
    }
}
