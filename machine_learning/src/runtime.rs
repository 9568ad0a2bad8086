//! The tensor runtime: a CPU `ndarray` backend over the global rayon pool.

use std::sync::OnceLock;

use log::{info, warn};

static RUNTIME: OnceLock<Runtime> = OnceLock::new();

/// Process wide information about the initialized runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Runtime {
    backend: &'static str,
    threads: usize,
}

impl Runtime {
    pub fn backend(&self) -> &'static str {
        self.backend
    }

    /// The amount of threads the rayon pool runs with.
    pub fn threads(&self) -> usize {
        self.threads
    }
}

/// Initializes the runtime once per process, later calls return the same instance.
///
/// # Arguments
/// * `threads` - The size of the rayon pool, rayon picks one when `None`.
///
/// # Returns
/// The process runtime.
pub fn init(threads: Option<usize>) -> &'static Runtime {
    RUNTIME.get_or_init(|| {
        let mut builder = rayon::ThreadPoolBuilder::new();
        if let Some(n) = threads {
            builder = builder.num_threads(n);
        }

        if let Err(e) = builder.build_global() {
            warn!("rayon pool was already initialized: {e}");
        }

        let runtime = Runtime {
            backend: "ndarray-cpu",
            threads: rayon::current_num_threads(),
        };

        info!(backend = runtime.backend, threads = runtime.threads; "tensor runtime initialized");
        runtime
    })
}

/// Returns the runtime if `init` was already called.
pub fn get() -> Option<&'static Runtime> {
    RUNTIME.get()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_is_idempotent() {
        let a = init(None);
        let b = init(Some(1));

        assert_eq!(a, b);
        assert_eq!(get(), Some(a));
        assert!(a.threads() >= 1);
    }
}
