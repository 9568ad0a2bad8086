use std::collections::HashSet;

use comms::specs::{ColumnSpec, DataPreparationConfig, ProblemType, Row};
use log::debug;
use ndarray::Array2;
use rand::{SeedableRng, rngs::StdRng};
use serde_json::Value;

use super::{
    Encoder, Scaler,
    split::{Split, train_test_split},
    value::{category_key, is_missing, to_number},
};
use crate::{MlErr, Result, tensor};

/// How the target column was turned into numbers.
#[derive(Debug, Clone, PartialEq)]
pub enum TargetTransform {
    Encoded(Encoder),
    Scaled(Scaler),
    Raw,
}

/// The numeric target, kept as class indices until the output width is known.
#[derive(Debug, Clone, PartialEq)]
pub enum TargetData {
    Classes { indices: Vec<usize>, classes: usize },
    Values(Vec<f32>),
}

impl TargetData {
    pub fn len(&self) -> usize {
        match self {
            TargetData::Classes { indices, .. } => indices.len(),
            TargetData::Values(values) => values.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The amount of distinct classes, `None` for continuous targets.
    pub fn classes(&self) -> Option<usize> {
        match self {
            TargetData::Classes { classes, .. } => Some(*classes),
            TargetData::Values(_) => None,
        }
    }

    /// The rows at `indices`, in order.
    pub fn gather(&self, indices: &[usize]) -> Self {
        match self {
            TargetData::Classes { indices: all, classes } => TargetData::Classes {
                indices: indices.iter().map(|&i| all[i]).collect(),
                classes: *classes,
            },
            TargetData::Values(all) => TargetData::Values(indices.iter().map(|&i| all[i]).collect()),
        }
    }

    /// Builds the target tensor for a network with `output_width` outputs.
    ///
    /// Classes become a single 0/1 column for a one unit output and one-hot rows otherwise.
    pub fn to_matrix(&self, output_width: usize) -> Array2<f32> {
        match self {
            TargetData::Classes { indices, .. } if output_width == 1 => {
                Array2::from_shape_fn((indices.len(), 1), |(i, _)| indices[i].min(1) as f32)
            }
            TargetData::Classes { indices, .. } => tensor::one_hot(indices, output_width),
            TargetData::Values(values) => {
                Array2::from_shape_fn((values.len(), 1), |(i, _)| values[i])
            }
        }
    }
}

/// Everything fitted at training time that inference must reuse verbatim.
#[derive(Debug, Clone, PartialEq)]
pub struct PreprocessorState {
    raw: Vec<String>,
    scalers: Vec<(String, Scaler)>,
    encoders: Vec<Encoder>,
    target_field: String,
    target: TargetTransform,
    split: Split,
}

impl PreprocessorState {
    /// The feature column names, in tensor block order.
    pub fn feature_columns(&self) -> impl Iterator<Item = &str> {
        self.raw
            .iter()
            .map(String::as_str)
            .chain(self.scalers.iter().map(|(f, _)| f.as_str()))
            .chain(self.encoders.iter().map(Encoder::field))
    }

    /// The amount of columns of the feature tensor.
    pub fn feature_width(&self) -> usize {
        self.raw.len() + self.scalers.len() + self.encoders.iter().map(Encoder::width).sum::<usize>()
    }

    pub fn target_field(&self) -> &str {
        &self.target_field
    }

    pub fn target(&self) -> &TargetTransform {
        &self.target
    }

    pub fn split(&self) -> &Split {
        &self.split
    }

    /// Builds the feature tensor of `rows` with the fitted transforms, never refitting them.
    ///
    /// # Arguments
    /// * `rows` - The input rows.
    ///
    /// # Returns
    /// A `(rows.len(), feature_width)` tensor.
    pub fn features(&self, rows: &[&Row]) -> Result<Array2<f32>> {
        let mut blocks = Vec::with_capacity(3);

        let numbers = |field: &str| -> Result<Vec<f32>> {
            rows.iter().map(|row| to_number(field, row.get(field))).collect()
        };

        let mut raw = Array2::zeros((rows.len(), self.raw.len()));
        for (j, field) in self.raw.iter().enumerate() {
            for (i, v) in numbers(field)?.into_iter().enumerate() {
                raw[[i, j]] = v;
            }
        }
        blocks.push(raw);

        for (field, scaler) in &self.scalers {
            blocks.push(scaler.transform(&numbers(field)?));
        }

        let null = Value::Null;
        for encoder in &self.encoders {
            let values: Vec<&Value> = rows
                .iter()
                .map(|row| row.get(encoder.field()).unwrap_or(&null))
                .collect();
            blocks.push(encoder.transform(&values)?);
        }

        tensor::hstack(rows.len(), &blocks)
    }

    /// Decodes a class index back to its label.
    pub fn decode_class(&self, index: usize) -> Value {
        match &self.target {
            TargetTransform::Encoded(encoder) => encoder.decode(index).cloned().unwrap_or(Value::Null),
            _ => Value::from(index),
        }
    }

    /// Decodes a network output back to the target scale.
    pub fn decode_value(&self, y: f32) -> f32 {
        match &self.target {
            TargetTransform::Scaled(scaler) => scaler.decode(y),
            _ => y,
        }
    }

    /// The class labels in index order, empty for continuous targets.
    pub fn class_labels(&self) -> &[Value] {
        match &self.target {
            TargetTransform::Encoded(encoder) => encoder.categories(),
            _ => &[],
        }
    }
}

/// The output of `preprocess`, ready to train on.
#[derive(Debug, Clone)]
pub struct Prepared {
    pub train_x: Array2<f32>,
    pub train_y: TargetData,
    pub test_x: Array2<f32>,
    /// The original held-out rows, untouched, for the predicted-vs-actual report.
    pub test_rows: Vec<Row>,
    pub state: PreprocessorState,
}

fn feature_specs<'a>(rows: &[&Row], config: &'a DataPreparationConfig) -> Result<Vec<&'a ColumnSpec>> {
    let target = &config.target_config.field;
    let disabled: HashSet<&str> = config.disabled_columns.iter().map(String::as_str).collect();

    let specs: Vec<_> = config
        .feature_config
        .iter()
        .filter(|c| &c.field != target && !disabled.contains(c.field.as_str()))
        .collect();

    if specs.is_empty() {
        return Err(MlErr::EmptyFeatures);
    }

    if let Some(missing) = specs
        .iter()
        .find(|c| !rows.iter().any(|row| row.contains_key(&c.field)))
    {
        return Err(MlErr::MissingColumn(missing.field.clone()));
    }

    Ok(specs)
}

/// Turns raw rows into train/test tensors plus the state needed to repeat the transform.
///
/// Rows with an empty target are dropped before the split is computed. Scalers and encoders
/// are fitted on the whole cleaned column. Classification targets are always encoded.
///
/// # Arguments
/// * `rows` - The raw data.
/// * `config` - The column specifications, exclusions and split settings.
/// * `problem` - Whether the target is a class or a continuous value.
///
/// # Returns
/// The prepared data, or a configuration error.
pub fn preprocess(
    rows: &[Row],
    config: &DataPreparationConfig,
    problem: ProblemType,
) -> Result<Prepared> {
    let target_spec = &config.target_config;
    let target_field = &target_spec.field;

    if !rows.iter().any(|row| row.contains_key(target_field)) {
        return Err(MlErr::MissingColumn(target_field.clone()));
    }

    let cleaned: Vec<&Row> = rows
        .iter()
        .filter(|row| !is_missing(row.get(target_field)))
        .collect();
    if cleaned.is_empty() {
        return Err(MlErr::EmptyDataset);
    }

    let specs = feature_specs(&cleaned, config)?;

    let null = Value::Null;
    let column = |field: &str| -> Vec<&Value> {
        cleaned.iter().map(|row| row.get(field).unwrap_or(&null)).collect()
    };

    let mut raw = Vec::new();
    let mut scalers = Vec::new();
    let mut encoders = Vec::new();
    for spec in &specs {
        if !spec.is_encoded() && !spec.is_normalized() {
            raw.push(spec.field.clone());
        }

        if spec.is_normalized() {
            let values = column(&spec.field)
                .into_iter()
                .map(|v| to_number(&spec.field, Some(v)))
                .collect::<Result<Vec<_>>>()?;
            if let Some(scaler) = Scaler::fit(spec.normalization, &values) {
                scalers.push((spec.field.clone(), scaler));
            }
        }

        if spec.is_encoded() {
            encoders.push(Encoder::fit(spec, column(&spec.field)));
        }
    }

    let target_values = column(target_field);
    let (target, target_data) = match problem {
        ProblemType::Classification => {
            let encoder = Encoder::fit(target_spec, target_values.iter().copied());
            let indices = target_values
                .iter()
                .map(|v| encoder.encode(v))
                .collect::<Result<Vec<_>>>()?;
            let classes = encoder.len();
            (
                TargetTransform::Encoded(encoder),
                TargetData::Classes { indices, classes },
            )
        }
        ProblemType::Regression => {
            let values = target_values
                .iter()
                .map(|v| to_number(target_field, Some(v)))
                .collect::<Result<Vec<_>>>()?;

            match Scaler::fit(target_spec.normalization, &values) {
                Some(scaler) => {
                    let scaled = values.iter().map(|&v| scaler.scale(v)).collect();
                    (TargetTransform::Scaled(scaler), TargetData::Values(scaled))
                }
                None => (TargetTransform::Raw, TargetData::Values(values)),
            }
        }
    };

    let mut rng = match config.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_os_rng(),
    };
    let groups: Option<Vec<String>> = config
        .stratify
        .then(|| target_values.iter().map(|v| category_key(v)).collect());
    let split = train_test_split(cleaned.len(), config.test_size, groups.as_deref(), &mut rng);

    let state = PreprocessorState {
        raw,
        scalers,
        encoders,
        target_field: target_field.clone(),
        target,
        split,
    };

    let features = state.features(&cleaned)?;
    let train_x = tensor::gather_rows(features.view(), &state.split.train);
    let test_x = tensor::gather_rows(features.view(), &state.split.test);
    let train_y = target_data.gather(&state.split.train);
    let test_rows = state.split.test.iter().map(|&i| cleaned[i].clone()).collect();

    debug!(
        rows = rows.len(),
        cleaned = cleaned.len(),
        train = state.split.train.len(),
        test = state.split.test.len(),
        width = state.feature_width();
        "data preprocessed"
    );

    Ok(Prepared {
        train_x,
        train_y,
        test_x,
        test_rows,
        state,
    })
}
