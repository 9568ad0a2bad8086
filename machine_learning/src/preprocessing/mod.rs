//! The data preprocessor: cleaning, splitting, scaling and encoding of tabular rows.

mod encoder;
mod preprocessor;
mod scaler;
mod split;
pub mod value;

pub use encoder::Encoder;
pub use preprocessor::{PreprocessorState, Prepared, TargetData, TargetTransform, preprocess};
pub use scaler::Scaler;
pub use split::{Split, train_test_split};
