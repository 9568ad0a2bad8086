pub mod arch;
pub mod error;
pub mod image;
pub mod inference;
pub mod optimization;
pub mod preprocessing;
pub mod runtime;
pub mod tensor;
pub mod training;

pub use error::{ErrorKind, MlErr, Result};
pub use inference::TrainedModel;
pub use training::TrainEvent;
