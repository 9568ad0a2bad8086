use comms::specs::ActivationSpec;
use ndarray::{Array2, Zip};

/// The activation function applied to the output of a layer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ActFn {
    #[default]
    Linear,
    Relu,
    Sigmoid,
    Tanh,
    Softmax,
}
use ActFn::*;

impl From<ActivationSpec> for ActFn {
    fn from(spec: ActivationSpec) -> Self {
        match spec {
            ActivationSpec::Linear => Linear,
            ActivationSpec::Relu => Relu,
            ActivationSpec::Sigmoid => Sigmoid,
            ActivationSpec::Tanh => Tanh,
            ActivationSpec::Softmax => Softmax,
        }
    }
}

impl From<ActFn> for ActivationSpec {
    fn from(act_fn: ActFn) -> Self {
        match act_fn {
            Linear => ActivationSpec::Linear,
            Relu => ActivationSpec::Relu,
            Sigmoid => ActivationSpec::Sigmoid,
            Tanh => ActivationSpec::Tanh,
            Softmax => ActivationSpec::Softmax,
        }
    }
}

fn sigmoid(z: f32) -> f32 {
    1. / (1. + (-z).exp())
}

impl ActFn {
    pub fn name(&self) -> &'static str {
        match self {
            Linear => "linear",
            Relu => "relu",
            Sigmoid => "sigmoid",
            Tanh => "tanh",
            Softmax => "softmax",
        }
    }

    /// Computes the activation of the pre-activations `z`.
    ///
    /// # Arguments
    /// * `z` - The pre-activations, one sample per row.
    ///
    /// # Returns
    /// The activations, with the same shape as `z`.
    pub fn f(&self, z: &Array2<f32>) -> Array2<f32> {
        match self {
            Linear => z.clone(),
            Relu => z.mapv(|v| v.max(0.)),
            Sigmoid => z.mapv(sigmoid),
            Tanh => z.mapv(f32::tanh),
            Softmax => {
                let mut a = z.clone();
                crate::tensor::softmax_rows(&mut a);
                a
            }
        }
    }

    /// Back propagates the deltas `d` with respect to the activations through this function,
    /// leaving in `d` the deltas with respect to the pre-activations.
    ///
    /// # Arguments
    /// * `d` - The deltas with respect to the activations.
    /// * `z` - The pre-activations of the last forward pass.
    /// * `a` - The activations of the last forward pass.
    pub fn df(&self, d: &mut Array2<f32>, z: &Array2<f32>, a: &Array2<f32>) {
        match self {
            Linear => {}
            Relu => d.zip_mut_with(z, |d, &z| {
                if z <= 0. {
                    *d = 0.
                }
            }),
            Sigmoid => d.zip_mut_with(a, |d, &a| *d *= a * (1. - a)),
            Tanh => d.zip_mut_with(a, |d, &a| *d *= 1. - a * a),
            Softmax => {
                // Jacobian-vector product of the row-wise softmax.
                for (mut d_row, a_row) in d.rows_mut().into_iter().zip(a.rows()) {
                    let dot = d_row.dot(&a_row);
                    Zip::from(&mut d_row)
                        .and(&a_row)
                        .for_each(|d, &a| *d = a * (*d - dot));
                }
            }
        }
    }
}
