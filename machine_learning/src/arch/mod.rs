pub mod activations;
pub mod init;
pub mod layers;
pub mod loss;
pub mod metrics;
pub mod regularizer;
mod sequential;
mod snapshot;

pub use sequential::Sequential;
pub use snapshot::{LayerSnapshot, ModelSnapshot, Network};
