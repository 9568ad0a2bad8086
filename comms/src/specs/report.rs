use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{Row, TableColumn};

/// The metrics of a single finished epoch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpochRecord {
    pub epoch: usize,
    pub loss: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accuracy: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub val_loss: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub val_accuracy: Option<f32>,
}

/// How a training run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrainStatus {
    Completed,
    Cancelled,
    Failed,
}

/// A single decoded prediction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Prediction {
    /// The decoded class label, or the continuous value for regressions.
    pub predicted_class: Value,
    pub confidence: f32,
    pub probabilities: Vec<f32>,
    /// Class names aligned with `probabilities`, when the model has them.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub labels: Option<Vec<Value>>,
}

/// The held-out rows with a `prediction` column, ready for the UI table.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TestData {
    pub data: Vec<Row>,
    pub columns: Vec<TableColumn>,
}

/// The payload of both progress and terminal training events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrainProgress {
    /// Zero-based index of the last finished epoch, `None` before the first one.
    pub transcurred_epochs: Option<usize>,
    /// Running sum of the epoch losses.
    pub loss: f32,
    /// Running sum of the epoch accuracies.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accuracy: Option<f32>,
    pub model_history: Vec<EpochRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test_data: Option<TestData>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<TrainStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl TrainProgress {
    /// Builds the cumulative progress view of `history`.
    pub fn from_history(history: Vec<EpochRecord>) -> Self {
        let loss = history.iter().map(|r| r.loss).sum();
        let accuracy = history
            .iter()
            .map(|r| r.accuracy)
            .sum::<Option<f32>>()
            .filter(|_| !history.is_empty());

        Self {
            transcurred_epochs: history.last().map(|r| r.epoch),
            loss,
            accuracy,
            model_history: history,
            test_data: None,
            status: None,
            error: None,
        }
    }
}
