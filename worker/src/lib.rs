pub mod config;
pub mod connection;
pub mod error;
pub mod resources;
pub mod router;
pub mod session;

pub use config::WorkerConfig;
pub use connection::serve;
pub use error::{Result, WorkerErr};
pub use resources::Resources;
pub use router::Router;
