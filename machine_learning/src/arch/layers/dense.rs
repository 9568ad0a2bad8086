use ndarray::prelude::*;

use crate::{
    MlErr, Result,
    arch::{activations::ActFn, regularizer::Regularizer},
};

/// A fully connected layer whose parameters live in an external flat slice.
///
/// The slice holds the `(input, output)` row-major kernel followed by the biases.
#[derive(Debug, Clone)]
pub struct Dense {
    dim: (usize, usize),
    act_fn: ActFn,
    regularizer: Option<Regularizer>,
    size: usize,

    // Forward metadata
    x: Array2<f32>,
    z: Array2<f32>,
    a: Array2<f32>,
}

impl Dense {
    /// Creates a new `Dense` layer.
    ///
    /// # Arguments
    /// * `dim` - The input and output dimension of the layer.
    /// * `act_fn` - The activation applied to the output.
    pub fn new(dim: (usize, usize), act_fn: ActFn) -> Self {
        let zeros = Array2::zeros((0, 0));

        Self {
            dim,
            act_fn,
            regularizer: None,
            size: (dim.0 + 1) * dim.1,
            x: zeros.clone(),
            z: zeros.clone(),
            a: zeros,
        }
    }

    /// Attaches a kernel regularizer to this layer.
    pub fn with_regularizer(mut self, regularizer: Option<Regularizer>) -> Self {
        self.regularizer = regularizer;
        self
    }

    /// Returns the size of this layer.
    ///
    /// # Returns
    /// The amount of parameters this layer has.
    pub fn size(&self) -> usize {
        self.size
    }

    pub fn dim(&self) -> (usize, usize) {
        self.dim
    }

    pub fn act_fn(&self) -> ActFn {
        self.act_fn
    }

    pub fn regularizer(&self) -> Option<Regularizer> {
        self.regularizer
    }

    /// Computes the output of the layer and keeps what `backward` needs.
    ///
    /// # Arguments
    /// * `params` - This layer's parameters.
    /// * `x` - The input, one sample per row.
    ///
    /// # Returns
    /// A view of the activations.
    pub fn forward(&mut self, params: &[f32], x: ArrayView2<f32>) -> Result<ArrayView2<'_, f32>> {
        self.z = self.affine(params, x)?;
        self.a = self.act_fn.f(&self.z);
        self.x = x.to_owned();

        Ok(self.a.view())
    }

    /// Computes the output of the layer without touching the cached state.
    pub fn predict(&self, params: &[f32], x: ArrayView2<f32>) -> Result<Array2<f32>> {
        let z = self.affine(params, x)?;
        Ok(self.act_fn.f(&z))
    }

    /// Writes this layer's gradient and back propagates the deltas.
    ///
    /// # Arguments
    /// * `params` - This layer's parameters.
    /// * `grad` - This layer's slice of the gradient, overwritten.
    /// * `d` - The deltas with respect to this layer's activations.
    ///
    /// # Returns
    /// The deltas with respect to this layer's input.
    pub fn backward(
        &mut self,
        params: &[f32],
        grad: &mut [f32],
        mut d: Array2<f32>,
    ) -> Result<Array2<f32>> {
        self.act_fn.df(&mut d, &self.z, &self.a);

        let w_size = self.size - self.dim.1;
        let (mut dw, mut db) = self.view_grad(grad)?;
        dw.assign(&self.x.t().dot(&d));
        db.assign(&d.sum_axis(Axis(0)));

        if let Some(reg) = self.regularizer {
            reg.add_grad(&params[..w_size], &mut grad[..w_size]);
        }

        let (w, _) = self.view_params(params)?;
        Ok(d.dot(&w.t()))
    }

    /// The regularization penalty of this layer's kernel.
    pub fn penalty(&self, params: &[f32]) -> f32 {
        let w_size = self.size - self.dim.1;
        self.regularizer
            .map(|reg| reg.penalty(&params[..w_size.min(params.len())]))
            .unwrap_or_default()
    }

    fn affine(&self, params: &[f32], x: ArrayView2<f32>) -> Result<Array2<f32>> {
        if x.ncols() != self.dim.0 {
            return Err(MlErr::SizeMismatch {
                a: "input",
                b: "layer",
                got: x.ncols(),
                expected: self.dim.0,
            });
        }

        let (w, b) = self.view_params(params)?;
        Ok(x.dot(&w) + &b)
    }

    /// Gives a view of the raw gradient slice as the delta weights and delta biases of this layer.
    ///
    /// # Arguments
    /// * `grad` - A gradient slice.
    ///
    /// # Returns
    /// A tuple containing the delta weights and delta biases.
    fn view_grad<'a>(
        &self,
        grad: &'a mut [f32],
    ) -> Result<(ArrayViewMut2<'a, f32>, ArrayViewMut1<'a, f32>)> {
        self.check_len("gradient", grad.len())?;

        let w_size = self.size - self.dim.1;
        let (dw_raw, db_raw) = grad.split_at_mut(w_size);
        let dw = ArrayViewMut2::from_shape(self.dim, dw_raw)?;
        let db = ArrayViewMut1::from_shape(self.dim.1, db_raw)?;
        Ok((dw, db))
    }

    /// Gives a view of the raw parameter slice as the weights and biases of this layer.
    ///
    /// # Arguments
    /// * `params` - A slice of parameters.
    ///
    /// # Returns
    /// A tuple containing the weights and biases.
    fn view_params<'a>(
        &self,
        params: &'a [f32],
    ) -> Result<(ArrayView2<'a, f32>, ArrayView1<'a, f32>)> {
        self.check_len("parameters", params.len())?;

        let w_size = self.size - self.dim.1;
        let weights = ArrayView2::from_shape(self.dim, &params[..w_size])?;
        let biases = ArrayView1::from_shape(self.dim.1, &params[w_size..])?;
        Ok((weights, biases))
    }

    fn check_len(&self, what: &'static str, len: usize) -> Result<()> {
        if len != self.size {
            return Err(MlErr::SizeMismatch {
                a: what,
                b: "layer",
                got: len,
                expected: self.size,
            });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use ndarray::array;

    use super::*;

    #[test]
    fn forward_applies_weights_and_bias() {
        let mut layer = Dense::new((2, 1), ActFn::Linear);
        let params = [2.0, 3.0, 1.0];

        let y = layer.forward(&params, array![[1.0, 1.0], [0.0, 2.0]].view()).unwrap();
        assert_eq!(y, array![[6.0], [7.0]]);
    }

    #[test]
    fn backward_matches_finite_differences() {
        let mut layer = Dense::new((2, 2), ActFn::Tanh);
        let params = vec![0.1, -0.2, 0.3, 0.4, 0.05, -0.05];
        let x = array![[0.5, -1.0]];

        // loss = sum(a)
        let probe = layer.clone();
        let loss = |p: &[f32]| probe.predict(p, x.view()).unwrap().sum();

        let mut grad = vec![0.0; params.len()];
        let a = layer.forward(&params, x.view()).unwrap().to_owned();
        layer
            .backward(&params, &mut grad, Array2::ones(a.raw_dim()))
            .unwrap();

        let eps = 1e-3;
        for i in 0..params.len() {
            let mut plus = params.clone();
            plus[i] += eps;
            let mut minus = params.clone();
            minus[i] -= eps;
            let numeric = (loss(&plus) - loss(&minus)) / (2. * eps);
            assert!((numeric - grad[i]).abs() < 1e-2, "param {i}");
        }
    }

    #[test]
    fn rejects_wrong_input_width() {
        let layer = Dense::new((3, 1), ActFn::Linear);
        let err = layer.predict(&[0.0; 4], array![[1.0, 2.0]].view()).unwrap_err();
        assert!(matches!(err, MlErr::SizeMismatch { got: 2, expected: 3, .. }));
    }
}
