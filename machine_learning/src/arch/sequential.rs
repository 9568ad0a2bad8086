use std::fmt::Write;

use ndarray::{Array2, ArrayView2};

use super::{
    layers::Dense,
    loss::LossFn,
    metrics::{self, EpochStats},
};
use crate::{MlErr, Result, optimization::Optimizer};

/// A sequential model: information flows forward when computing an output and backward when
/// computing the *deltas* of its layers.
#[derive(Debug, Clone)]
pub struct Sequential {
    layers: Vec<Dense>,
}

impl Sequential {
    /// Creates a new `Sequential`.
    ///
    /// # Arguments
    /// * `layers` - The layers the sequential is composed of.
    ///
    /// # Returns
    /// A new `Sequential` instance.
    pub fn new<I>(layers: I) -> Self
    where
        I: IntoIterator<Item = Dense>,
    {
        Self {
            layers: layers.into_iter().collect(),
        }
    }

    pub fn layers(&self) -> &[Dense] {
        &self.layers
    }

    /// Returns the amount of parameters in the model.
    pub fn size(&self) -> usize {
        self.layers.iter().map(|layer| layer.size()).sum()
    }

    pub fn input_size(&self) -> usize {
        self.layers.first().map(|l| l.dim().0).unwrap_or_default()
    }

    pub fn output_size(&self) -> usize {
        self.layers.last().map(|l| l.dim().1).unwrap_or_default()
    }

    /// Makes a forward pass through the network, caching what backprop needs.
    ///
    /// # Arguments
    /// * `params` - The model's parameters.
    /// * `x` - The input data.
    ///
    /// # Returns
    /// The prediction for the given input or an error if occurred.
    pub fn forward<'x>(
        &'x mut self,
        params: &[f32],
        mut x: ArrayView2<'x, f32>,
    ) -> Result<ArrayView2<'x, f32>> {
        self.check_size("parameters", params.len())?;

        let mut offset = 0;
        for layer in self.layers.iter_mut() {
            let size = layer.size();
            x = layer.forward(&params[offset..offset + size], x)?;
            offset += size;
        }

        Ok(x)
    }

    /// Makes a forward pass through the network without caching anything.
    ///
    /// # Arguments
    /// * `params` - The model's parameters.
    /// * `x` - The input data.
    ///
    /// # Returns
    /// The prediction for the given input or an error if occurred.
    pub fn predict(&self, params: &[f32], x: ArrayView2<f32>) -> Result<Array2<f32>> {
        self.check_size("parameters", params.len())?;

        let mut out = x.to_owned();
        let mut offset = 0;
        for layer in &self.layers {
            let size = layer.size();
            out = layer.predict(&params[offset..offset + size], out.view())?;
            offset += size;
        }

        Ok(out)
    }

    /// The sum of the regularization penalties of every layer.
    pub fn penalty(&self, params: &[f32]) -> f32 {
        let mut offset = 0;
        let mut total = 0.;

        for layer in &self.layers {
            let size = layer.size();
            if let Some(p) = params.get(offset..offset + size) {
                total += layer.penalty(p);
            }
            offset += size;
        }

        total
    }

    /// Computes the gradient of the loss function with respect to the parameters of the model
    /// over the provided batches. **`params` gets updated** for each batch according to the
    /// optimization algorithm.
    ///
    /// # Arguments
    /// * `params` - The model's parameters.
    /// * `grad` - A buffer for writing the computed gradient on each batch pass.
    /// * `loss_fn` - The loss function.
    /// * `optimizer` - The optimizer that dictates how to update the weights on each gradient calculation.
    /// * `track_accuracy` - Whether to compute the accuracy of every batch.
    /// * `batches` - The batches of data.
    ///
    /// # Returns
    /// The batch size weighted loss and accuracy of the epoch.
    pub fn backprop<'a, I>(
        &mut self,
        params: &mut [f32],
        grad: &mut [f32],
        loss_fn: &dyn LossFn,
        optimizer: &mut dyn Optimizer,
        track_accuracy: bool,
        batches: I,
    ) -> Result<EpochStats>
    where
        I: Iterator<Item = (ArrayView2<'a, f32>, ArrayView2<'a, f32>)>,
    {
        self.check_size("gradient", grad.len())?;

        let mut total_loss = 0.0;
        let mut total_acc = 0.0;
        let mut seen = 0;

        for (x, y) in batches {
            let n = x.nrows();
            let penalty = self.penalty(params);

            let y_pred = self.forward(params, x)?;
            total_loss += (loss_fn.loss(y_pred, y) + penalty) * n as f32;
            if track_accuracy {
                total_acc += metrics::accuracy(y_pred, y) * n as f32;
            }
            let mut d = loss_fn.loss_prime(y_pred, y);
            seen += n;

            let mut end = params.len();
            for layer in self.layers.iter_mut().rev() {
                let start = end - layer.size();
                d = layer.backward(&params[start..end], &mut grad[start..end], d)?;
                end = start;
            }

            optimizer.update_params(params, grad);
        }

        Ok(Self::weighted(total_loss, total_acc, seen, track_accuracy))
    }

    /// Computes the loss and accuracy of the model over a whole dataset.
    pub fn evaluate(
        &self,
        params: &[f32],
        loss_fn: &dyn LossFn,
        track_accuracy: bool,
        x: ArrayView2<f32>,
        y: ArrayView2<f32>,
    ) -> Result<EpochStats> {
        let y_pred = self.predict(params, x)?;
        let loss = loss_fn.loss(y_pred.view(), y) + self.penalty(params);
        let accuracy = track_accuracy.then(|| metrics::accuracy(y_pred.view(), y));

        Ok(EpochStats { loss, accuracy })
    }

    /// A printable table of the layers, their output shapes and parameter counts.
    pub fn summary(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "{:<24}{:<16}{:>10}", "Layer (type)", "Output shape", "Param #");

        for (i, layer) in self.layers.iter().enumerate() {
            let name = format!("layer_{i} (Dense/{})", layer.act_fn().name());
            let shape = format!("[null,{}]", layer.dim().1);
            let _ = writeln!(out, "{name:<24}{shape:<16}{:>10}", layer.size());
        }

        let _ = write!(out, "Total params: {}", self.size());
        out
    }

    fn weighted(loss: f32, acc: f32, seen: usize, track_accuracy: bool) -> EpochStats {
        if seen == 0 {
            return EpochStats::default();
        }

        let n = seen as f32;
        EpochStats {
            loss: loss / n,
            accuracy: track_accuracy.then_some(acc / n),
        }
    }

    fn check_size(&self, what: &'static str, len: usize) -> Result<()> {
        let expected = self.size();
        if len != expected {
            return Err(MlErr::SizeMismatch {
                a: what,
                b: "model",
                got: len,
                expected,
            });
        }

        Ok(())
    }
}
