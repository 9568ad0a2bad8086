//! A serializable picture of a trained network: shapes, activations and weights.

use std::{fs, path::Path};

use comms::specs::ActivationSpec;
use ndarray::{Array2, ArrayView2};
use serde::{Deserialize, Serialize};

use super::{Sequential, activations::ActFn, layers::Dense};
use crate::{MlErr, Result};

/// One dense layer of a snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayerSnapshot {
    pub input: usize,
    pub units: usize,
    #[serde(default)]
    pub activation: ActivationSpec,
    /// Row-major `(input, units)` kernel.
    pub weights: Vec<f32>,
    pub biases: Vec<f32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelSnapshot {
    pub layers: Vec<LayerSnapshot>,
}

impl ModelSnapshot {
    /// Reads a snapshot from a JSON file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let bytes = fs::read(path)?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Writes this snapshot to a JSON file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        fs::write(path, serde_json::to_vec(self)?)?;
        Ok(())
    }
}

/// A model together with its parameters, ready to predict.
#[derive(Debug, Clone)]
pub struct Network {
    model: Sequential,
    params: Vec<f32>,
}

impl Network {
    /// Creates a new `Network`.
    ///
    /// # Returns
    /// A `SizeMismatch` error if `params` does not fit `model`.
    pub fn new(model: Sequential, params: Vec<f32>) -> Result<Self> {
        if params.len() != model.size() {
            return Err(MlErr::SizeMismatch {
                a: "parameters",
                b: "model",
                got: params.len(),
                expected: model.size(),
            });
        }

        Ok(Self { model, params })
    }

    pub fn model(&self) -> &Sequential {
        &self.model
    }

    pub fn params(&self) -> &[f32] {
        &self.params
    }

    pub fn input_size(&self) -> usize {
        self.model.input_size()
    }

    pub fn output_size(&self) -> usize {
        self.model.output_size()
    }

    pub fn predict(&self, x: ArrayView2<f32>) -> Result<Array2<f32>> {
        self.model.predict(&self.params, x)
    }

    /// Runs one zero-input forward pass so the first real prediction pays no setup.
    pub fn warm_up(&self) -> Result<()> {
        self.predict(Array2::zeros((1, self.input_size())).view())
            .map(drop)
    }

    /// Rebuilds a network from a snapshot, checking every layer's shape.
    pub fn from_snapshot(snapshot: ModelSnapshot) -> Result<Self> {
        if snapshot.layers.is_empty() {
            return Err(MlErr::invalid("the model snapshot has no layers"));
        }

        let mut layers = Vec::with_capacity(snapshot.layers.len());
        let mut params = Vec::new();
        let mut prev_units = None;

        for layer in snapshot.layers {
            if prev_units.is_some_and(|units| units != layer.input) {
                return Err(MlErr::SizeMismatch {
                    a: "layer input",
                    b: "previous layer units",
                    got: layer.input,
                    expected: prev_units.unwrap_or_default(),
                });
            }
            if layer.weights.len() != layer.input * layer.units {
                return Err(MlErr::SizeMismatch {
                    a: "weights",
                    b: "layer shape",
                    got: layer.weights.len(),
                    expected: layer.input * layer.units,
                });
            }
            if layer.biases.len() != layer.units {
                return Err(MlErr::SizeMismatch {
                    a: "biases",
                    b: "layer units",
                    got: layer.biases.len(),
                    expected: layer.units,
                });
            }

            prev_units = Some(layer.units);
            layers.push(Dense::new(
                (layer.input, layer.units),
                ActFn::from(layer.activation),
            ));
            params.extend(layer.weights);
            params.extend(layer.biases);
        }

        Self::new(Sequential::new(layers), params)
    }

    /// Takes a snapshot of the current weights.
    pub fn snapshot(&self) -> ModelSnapshot {
        let mut offset = 0;
        let layers = self
            .model
            .layers()
            .iter()
            .map(|layer| {
                let (input, units) = layer.dim();
                let w_end = offset + input * units;
                let b_end = w_end + units;
                let snapshot = LayerSnapshot {
                    input,
                    units,
                    activation: layer.act_fn().into(),
                    weights: self.params[offset..w_end].to_vec(),
                    biases: self.params[w_end..b_end].to_vec(),
                };
                offset = b_end;
                snapshot
            })
            .collect();

        ModelSnapshot { layers }
    }
}
