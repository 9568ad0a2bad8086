//! The serde "spec" types exchanged between the UI thread and the worker.
//!
//! Field names follow the camelCase payloads the UI already produces.

pub mod data;
pub mod image;
pub mod model;
pub mod report;
pub mod training;

pub use data::{ColumnSpec, DataPreparationConfig, Encoding, Normalization, Row, TableColumn};
pub use image::{ClassSamples, ImageClass, SampleLimitReached};
pub use model::{
    ActivationSpec, CompileOptions, InitializerSpec, Metrics, ModelConfig, ProblemType,
    RegularizationSpec,
};
pub use report::{EpochRecord, Prediction, TestData, TrainProgress, TrainStatus};
pub use training::TrainConfig;
