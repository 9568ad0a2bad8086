use std::{env, path::PathBuf, str::FromStr};

use machine_learning::training::ClassifierOptions;

use crate::{Result, WorkerErr};

const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 7878;
const DEFAULT_EXTRACTOR_SEED: u64 = 42;

/// Process level settings of the worker, read once at startup.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkerConfig {
    pub host: String,
    pub port: u16,
    /// The size of the tensor runtime's thread pool, `None` lets rayon decide.
    pub ml_threads: Option<usize>,
    /// The snapshot served by `load_remote_model {type: "mnist"}`.
    pub digit_model_path: Option<PathBuf>,
    /// A snapshot of the extractor's projection, the built-in one is used when `None`.
    pub extractor_path: Option<PathBuf>,
    pub extractor_seed: u64,
    pub max_samples_per_class: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            ml_threads: None,
            digit_model_path: None,
            extractor_path: None,
            extractor_seed: DEFAULT_EXTRACTOR_SEED,
            max_samples_per_class: ClassifierOptions::MAX_SAMPLES_PER_CLASS,
        }
    }
}

impl WorkerConfig {
    /// Reads the configuration from the process environment.
    ///
    /// # Returns
    /// The configuration or `InvalidEnv` if a variable can't be parsed.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|var| env::var(var).ok())
    }

    /// Reads the configuration from an arbitrary variable lookup.
    ///
    /// # Arguments
    /// * `lookup` - Returns the value of a variable, `None` if it is unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let path = |var: &str| lookup(var).filter(|v| !v.is_empty()).map(PathBuf::from);

        Ok(Self {
            host: lookup("HOST").unwrap_or(defaults.host),
            port: parse(&lookup, "PORT")?.unwrap_or(defaults.port),
            ml_threads: parse(&lookup, "ML_THREADS")?,
            digit_model_path: path("DIGIT_MODEL_PATH"),
            extractor_path: path("EXTRACTOR_PATH"),
            extractor_seed: parse(&lookup, "EXTRACTOR_SEED")?.unwrap_or(defaults.extractor_seed),
            max_samples_per_class: parse(&lookup, "MAX_SAMPLES_PER_CLASS")?
                .unwrap_or(defaults.max_samples_per_class),
        })
    }

    /// The address the worker listens on.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse<F, T>(lookup: &F, var: &'static str) -> Result<Option<T>>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    lookup(var)
        .map(|value| {
            value
                .trim()
                .parse()
                .map_err(|_| WorkerErr::InvalidEnv { var, value })
        })
        .transpose()
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |var: &str| vars.get(var).cloned()
    }

    #[test]
    fn defaults_when_unset() {
        let config = WorkerConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, WorkerConfig::default());
        assert_eq!(config.addr(), "127.0.0.1:7878");
        assert_eq!(config.max_samples_per_class, 120);
    }

    #[test]
    fn reads_every_variable() {
        let config = WorkerConfig::from_lookup(lookup(&[
            ("HOST", "0.0.0.0"),
            ("PORT", "9000"),
            ("ML_THREADS", "2"),
            ("DIGIT_MODEL_PATH", "/models/digit.json"),
            ("EXTRACTOR_SEED", "7"),
            ("MAX_SAMPLES_PER_CLASS", "30"),
        ]))
        .unwrap();

        assert_eq!(config.addr(), "0.0.0.0:9000");
        assert_eq!(config.ml_threads, Some(2));
        assert_eq!(config.digit_model_path, Some(PathBuf::from("/models/digit.json")));
        assert_eq!(config.extractor_path, None);
        assert_eq!(config.extractor_seed, 7);
        assert_eq!(config.max_samples_per_class, 30);
    }

    #[test]
    fn rejects_bad_numbers() {
        let err = WorkerConfig::from_lookup(lookup(&[("PORT", "http")])).unwrap_err();
        assert!(matches!(err, WorkerErr::InvalidEnv { var: "PORT", .. }));
    }
}
