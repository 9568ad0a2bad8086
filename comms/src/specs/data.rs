use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A single tabular row, keyed by column field name.
pub type Row = Map<String, Value>;

/// How a categorical column is turned into numbers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Encoding {
    #[default]
    None,
    Label,
    #[serde(alias = "oneHot", alias = "one_hot")]
    OneHot,
}

/// How a numeric column is rescaled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Normalization {
    #[default]
    None,
    #[serde(alias = "minMax")]
    MinMax,
    #[serde(alias = "zScore")]
    ZScore,
}

/// The specification of one feature column or of the target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnSpec {
    pub field: String,
    #[serde(default, deserialize_with = "nullable")]
    pub encoding: Encoding,
    #[serde(default, deserialize_with = "nullable")]
    pub normalization: Normalization,
    /// Explicit category order, lowest index first.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ordinal_config: Option<Vec<Value>>,
}

impl ColumnSpec {
    /// Creates a plain pass-through column.
    pub fn raw(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            encoding: Encoding::None,
            normalization: Normalization::None,
            ordinal_config: None,
        }
    }

    pub fn encoded(field: impl Into<String>, encoding: Encoding) -> Self {
        Self {
            encoding,
            ..Self::raw(field)
        }
    }

    pub fn normalized(field: impl Into<String>, normalization: Normalization) -> Self {
        Self {
            normalization,
            ..Self::raw(field)
        }
    }

    pub fn is_encoded(&self) -> bool {
        self.encoding != Encoding::None
    }

    pub fn is_normalized(&self) -> bool {
        self.normalization != Normalization::None
    }
}

/// Everything the preprocessor needs to turn rows into tensors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataPreparationConfig {
    #[serde(default)]
    pub feature_config: Vec<ColumnSpec>,
    pub target_config: ColumnSpec,
    #[serde(default)]
    pub disabled_columns: Vec<String>,
    #[serde(default = "default_test_size")]
    pub test_size: f32,
    #[serde(default)]
    pub stratify: bool,
    /// Pins the train/test shuffle, unseeded when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
}

fn default_test_size() -> f32 {
    0.2
}

/// The UI table column metadata, echoed back in test-set reports.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableColumn {
    pub accessor: String,
    #[serde(rename = "Header", default)]
    pub header: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dtype: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
}

impl TableColumn {
    pub fn new(accessor: impl Into<String>, dtype: &str) -> Self {
        let accessor = accessor.into();
        Self {
            header: accessor.clone(),
            accessor,
            dtype: Some(dtype.to_string()),
            width: Some(100),
        }
    }
}

/// The UI sends `null` for "no transform", treat it like a missing field.
fn nullable<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: serde::Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn column_spec_accepts_ui_spellings() {
        let spec: ColumnSpec = serde_json::from_value(serde_json::json!({
            "field": "color",
            "encoding": "oneHot",
            "normalization": null,
        }))
        .unwrap();

        assert_eq!(spec.encoding, Encoding::OneHot);
        assert_eq!(spec.normalization, Normalization::None);
        assert!(spec.ordinal_config.is_none());
    }

    #[test]
    fn preparation_config_defaults() {
        let cfg: DataPreparationConfig = serde_json::from_value(serde_json::json!({
            "featureConfig": [{ "field": "x", "normalization": "zscore" }],
            "targetConfig": { "field": "y" },
        }))
        .unwrap();

        assert_eq!(cfg.test_size, 0.2);
        assert!(!cfg.stratify);
        assert!(cfg.disabled_columns.is_empty());
        assert_eq!(cfg.feature_config[0].normalization, Normalization::ZScore);
    }
}
