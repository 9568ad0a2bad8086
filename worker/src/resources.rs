use std::sync::Arc;

use log::info;
use machine_learning::{
    MlErr,
    arch::{ModelSnapshot, Network},
    image::{DIGIT_SIDE, FeatureExtractor, PooledExtractor},
};
use tokio::{sync::OnceCell, task};

use crate::{Result, WorkerConfig, WorkerErr};

/// What every connection of the process shares: the configuration and the frozen
/// feature extractor, loaded at most once.
pub struct Resources {
    config: WorkerConfig,
    extractor: OnceCell<Arc<dyn FeatureExtractor>>,
}

impl Resources {
    pub fn new(config: WorkerConfig) -> Self {
        Self {
            config,
            extractor: OnceCell::new(),
        }
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    /// Returns the extractor, loading it first if no one did yet.
    ///
    /// Concurrent callers wait for the same load.
    pub async fn extractor(&self) -> Result<Arc<dyn FeatureExtractor>> {
        self.extractor
            .get_or_try_init(|| async {
                let path = self.config.extractor_path.clone();
                let seed = self.config.extractor_seed;

                let extractor = task::spawn_blocking(move || -> Result<Arc<dyn FeatureExtractor>> {
                    let extractor = match path {
                        Some(path) => PooledExtractor::from_snapshot(ModelSnapshot::from_path(path)?)?,
                        None => PooledExtractor::new(seed)?,
                    };
                    Ok(Arc::new(extractor))
                })
                .await??;

                info!(embedding = extractor.embedding_size(); "feature extractor loaded");
                Ok::<_, WorkerErr>(extractor)
            })
            .await
            .cloned()
    }

    /// Returns the extractor only if it is already loaded.
    pub fn ready_extractor(&self) -> Option<Arc<dyn FeatureExtractor>> {
        self.extractor.get().cloned()
    }

    /// Loads and warms up the pretrained digit model.
    ///
    /// # Returns
    /// The network, `MissingConfig` if no snapshot is configured or an error if the snapshot
    /// can't be read or doesn't take digit vectors.
    pub async fn load_digit_model(&self) -> Result<Network> {
        let path = self
            .config
            .digit_model_path
            .clone()
            .ok_or(WorkerErr::MissingConfig("DIGIT_MODEL_PATH"))?;

        let network = task::spawn_blocking(move || -> Result<Network> {
            let network = Network::from_snapshot(ModelSnapshot::from_path(path)?)?;
            let expected = (DIGIT_SIDE * DIGIT_SIDE) as usize;
            if network.input_size() != expected {
                return Err(MlErr::SizeMismatch {
                    a: "digit model input",
                    b: "digit vector",
                    got: network.input_size(),
                    expected,
                }
                .into());
            }

            network.warm_up()?;
            Ok(network)
        })
        .await??;

        info!(
            inputs = network.input_size(),
            outputs = network.output_size();
            "digit model loaded"
        );
        Ok(network)
    }
}
