use std::collections::HashMap;

use comms::specs::{ColumnSpec, Encoding};
use ndarray::Array2;
use serde_json::Value;

use super::value::category_key;
use crate::{MlErr, Result, tensor};

/// A fitted mapping between the categories of a column and integer indices.
#[derive(Debug, Clone, PartialEq)]
pub struct Encoder {
    field: String,
    encoding: Encoding,
    categories: Vec<Value>,
    index: HashMap<String, usize>,
}

impl Encoder {
    /// Fits an encoder over the values of a column.
    ///
    /// Categories are indexed by `ordinal_config` when present, by first appearance otherwise.
    /// An explicit `none` encoding is fitted as a label encoder.
    ///
    /// # Arguments
    /// * `spec` - The column specification.
    /// * `values` - Every value of the column.
    pub fn fit<'a, I>(spec: &ColumnSpec, values: I) -> Self
    where
        I: IntoIterator<Item = &'a Value>,
    {
        let encoding = match spec.encoding {
            Encoding::None => Encoding::Label,
            other => other,
        };

        let mut encoder = Self {
            field: spec.field.clone(),
            encoding,
            categories: Vec::new(),
            index: HashMap::new(),
        };

        match &spec.ordinal_config {
            Some(order) => order.iter().for_each(|v| encoder.insert(v)),
            None => values.into_iter().for_each(|v| encoder.insert(v)),
        }

        encoder
    }

    fn insert(&mut self, value: &Value) {
        let key = category_key(value);
        if !self.index.contains_key(&key) {
            self.index.insert(key, self.categories.len());
            self.categories.push(value.clone());
        }
    }

    pub fn field(&self) -> &str {
        &self.field
    }

    pub fn encoding(&self) -> Encoding {
        self.encoding
    }

    pub fn categories(&self) -> &[Value] {
        &self.categories
    }

    /// The amount of known categories.
    pub fn len(&self) -> usize {
        self.categories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.categories.is_empty()
    }

    /// The amount of tensor columns this encoder produces.
    pub fn width(&self) -> usize {
        match self.encoding {
            Encoding::OneHot => self.len(),
            _ => 1,
        }
    }

    /// Maps a value to its index.
    ///
    /// # Returns
    /// The index or `UnknownCategory` if the value was not seen while fitting.
    pub fn encode(&self, value: &Value) -> Result<usize> {
        self.index
            .get(&category_key(value))
            .copied()
            .ok_or_else(|| MlErr::UnknownCategory {
                field: self.field.clone(),
                value: value.to_string(),
            })
    }

    /// Maps an index back to its category.
    pub fn decode(&self, index: usize) -> Option<&Value> {
        self.categories.get(index)
    }

    /// Encodes a column into its tensor block.
    pub fn transform(&self, values: &[&Value]) -> Result<Array2<f32>> {
        let indices = values
            .iter()
            .map(|v| self.encode(v))
            .collect::<Result<Vec<_>>>()?;

        let block = match self.encoding {
            Encoding::OneHot => tensor::one_hot(&indices, self.len()),
            _ => Array2::from_shape_fn((indices.len(), 1), |(i, _)| indices[i] as f32),
        };

        Ok(block)
    }
}
