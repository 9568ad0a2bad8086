use std::num::NonZeroUsize;

use serde::{Deserialize, Serialize};

use super::DataPreparationConfig;

/// Fit loop settings plus the data preparation they apply to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrainConfig {
    #[serde(default = "default_batch_size")]
    pub batch_size: NonZeroUsize,
    pub epochs: usize,
    #[serde(default = "default_shuffle")]
    pub shuffle: bool,
    #[serde(default)]
    pub validation_split: f32,
    pub data_preparation_config: DataPreparationConfig,
}

fn default_batch_size() -> NonZeroUsize {
    NonZeroUsize::new(32).unwrap_or(NonZeroUsize::MIN)
}

fn default_shuffle() -> bool {
    true
}
