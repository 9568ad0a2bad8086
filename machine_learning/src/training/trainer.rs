use std::num::NonZeroUsize;

use comms::specs::{EpochRecord, TrainConfig, TrainStatus};
use log::{debug, info, warn};
use rand::{SeedableRng, rngs::StdRng};
use tokio_util::sync::CancellationToken;

use super::{CompiledModel, Dataset};
use crate::{MlErr, Result};

/// Receives the metrics history at the end of every recorded epoch.
pub trait Observer {
    /// Called after an epoch is appended to `history`. An error fails the run.
    fn on_epoch_end(&mut self, history: &[EpochRecord], model: &CompiledModel) -> Result<()>;
}

impl<F> Observer for F
where
    F: FnMut(&[EpochRecord], &CompiledModel) -> Result<()>,
{
    fn on_epoch_end(&mut self, history: &[EpochRecord], model: &CompiledModel) -> Result<()> {
        self(history, model)
    }
}

/// The fit loop settings.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FitOptions {
    pub epochs: usize,
    pub batch_size: NonZeroUsize,
    pub shuffle: bool,
    pub validation_split: f32,
    pub seed: Option<u64>,
}

impl From<&TrainConfig> for FitOptions {
    fn from(config: &TrainConfig) -> Self {
        Self {
            epochs: config.epochs,
            batch_size: config.batch_size,
            shuffle: config.shuffle,
            validation_split: config.validation_split,
            seed: config.data_preparation_config.seed,
        }
    }
}

/// How a fit ended, with every epoch recorded before that.
#[derive(Debug)]
pub struct FitOutcome {
    pub history: Vec<EpochRecord>,
    pub status: TrainStatus,
    pub error: Option<MlErr>,
}

impl FitOutcome {
    fn failed(history: Vec<EpochRecord>, error: MlErr) -> Self {
        Self {
            history,
            status: TrainStatus::Failed,
            error: Some(error),
        }
    }
}

/// Runs the epoch loop of a `CompiledModel`.
#[derive(Debug)]
pub struct Trainer {
    options: FitOptions,
    rng: StdRng,
}

impl Trainer {
    /// Creates a new `Trainer`.
    ///
    /// # Arguments
    /// * `options` - The fit loop settings, the seed only pins the shuffling.
    pub fn new(options: FitOptions) -> Self {
        let rng = match options.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };

        Self { options, rng }
    }

    /// Fits `model` on `data` until every epoch ran, `cancel` fires or an error occurs.
    ///
    /// Cancellation is observed at epoch boundaries only. The epoch in flight when the
    /// token fires is finished but not recorded.
    ///
    /// # Arguments
    /// * `model` - The model to train, its parameters are updated in place.
    /// * `data` - The training rows, the validation split is taken from its tail.
    /// * `cancel` - The cooperative stop signal.
    /// * `observer` - Notified after every recorded epoch.
    ///
    /// # Returns
    /// The final status and the history recorded so far, never an early `Err`.
    pub fn fit(
        &mut self,
        model: &mut CompiledModel,
        data: Dataset,
        cancel: &CancellationToken,
        observer: &mut dyn Observer,
    ) -> FitOutcome {
        let mut history = Vec::with_capacity(self.options.epochs);

        let (mut train, val) = match data.split_validation(self.options.validation_split) {
            Ok(split) => split,
            Err(e) => return FitOutcome::failed(history, e),
        };

        info!(
            epochs = self.options.epochs,
            samples = train.len(),
            batch_size = self.options.batch_size.get();
            "training started"
        );

        for epoch in 0..self.options.epochs {
            if cancel.is_cancelled() {
                return self.cancelled(history);
            }

            if self.options.shuffle {
                train.shuffle(&mut self.rng);
            }

            let stats = match model.train_epoch(train.batches(self.options.batch_size.get())) {
                Ok(stats) => stats,
                Err(e) => return FitOutcome::failed(history, e),
            };
            if !stats.loss.is_finite() {
                warn!(epoch = epoch; "training diverged");
                return FitOutcome::failed(history, MlErr::NonFiniteLoss { epoch });
            }

            let val_stats = match val.as_ref().map(|v| model.evaluate(v.x(), v.y())).transpose() {
                Ok(stats) => stats,
                Err(e) => return FitOutcome::failed(history, e),
            };

            if cancel.is_cancelled() {
                return self.cancelled(history);
            }

            debug!(epoch = epoch, loss = stats.loss; "epoch finished");
            history.push(EpochRecord {
                epoch,
                loss: stats.loss,
                accuracy: stats.accuracy,
                val_loss: val_stats.map(|s| s.loss),
                val_accuracy: val_stats.and_then(|s| s.accuracy),
            });

            if let Err(e) = observer.on_epoch_end(&history, model) {
                return FitOutcome::failed(history, e);
            }
        }

        info!(epochs = history.len(); "training completed");
        FitOutcome {
            history,
            status: TrainStatus::Completed,
            error: None,
        }
    }

    fn cancelled(&self, history: Vec<EpochRecord>) -> FitOutcome {
        info!(epochs = history.len(); "training cancelled");
        FitOutcome {
            history,
            status: TrainStatus::Cancelled,
            error: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use comms::specs::{ModelConfig, ProblemType};
    use ndarray::Array2;

    use super::*;
    use crate::training::ModelBuilder;

    fn options(epochs: usize) -> FitOptions {
        FitOptions {
            epochs,
            batch_size: NonZeroUsize::new(4).unwrap(),
            shuffle: true,
            validation_split: 0.,
            seed: Some(7),
        }
    }

    fn line() -> (CompiledModel, Dataset) {
        let mut config = ModelConfig::new(vec![1], ProblemType::Regression);
        config.compile_options = Some(comms::specs::CompileOptions {
            optimizer: "sgd".to_string(),
            learning_rate: 0.05,
            loss_function: None,
            metrics: Default::default(),
        });
        let model = ModelBuilder::new().with_seed(Some(3)).build(&config, 1, None).unwrap();

        let x = Array2::from_shape_fn((16, 1), |(i, _)| i as f32 / 8. - 1.);
        let y = x.mapv(|v| 2. * v + 0.5);
        (model, Dataset::new(x, y).unwrap())
    }

    #[test]
    fn records_every_epoch_in_order() {
        let (mut model, data) = line();
        let mut seen = Vec::new();
        let mut observer = |history: &[EpochRecord], _: &CompiledModel| -> Result<()> {
            seen.push(history.len());
            Ok(())
        };

        let outcome = Trainer::new(options(30)).fit(&mut model, data, &CancellationToken::new(), &mut observer);

        assert_eq!(outcome.status, TrainStatus::Completed);
        assert_eq!(seen, (1..=30).collect::<Vec<_>>());
        let epochs: Vec<usize> = outcome.history.iter().map(|r| r.epoch).collect();
        assert_eq!(epochs, (0..30).collect::<Vec<_>>());
        assert!(outcome.history[29].loss < outcome.history[0].loss);
    }

    #[test]
    fn cancelled_token_stops_at_the_next_boundary() {
        let (mut model, data) = line();
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let mut observer = |history: &[EpochRecord], _: &CompiledModel| -> Result<()> {
            if history.len() == 3 {
                token.cancel();
            }
            Ok(())
        };

        let outcome = Trainer::new(options(50)).fit(&mut model, data, &cancel, &mut observer);

        assert_eq!(outcome.status, TrainStatus::Cancelled);
        assert_eq!(outcome.history.len(), 3);
        assert!(outcome.error.is_none());
    }

    #[test]
    fn observer_errors_fail_with_partial_history() {
        let (mut model, data) = line();
        let mut observer = |history: &[EpochRecord], _: &CompiledModel| -> Result<()> {
            if history.len() == 2 {
                return Err(MlErr::invalid("boom"));
            }
            Ok(())
        };

        let outcome = Trainer::new(options(10)).fit(&mut model, data, &CancellationToken::new(), &mut observer);

        assert_eq!(outcome.status, TrainStatus::Failed);
        assert_eq!(outcome.history.len(), 2);
    }

    #[test]
    fn validation_metrics_are_reported() {
        let (mut model, data) = line();
        let mut opts = options(2);
        opts.validation_split = 0.25;
        let mut observer = |_: &[EpochRecord], _: &CompiledModel| -> Result<()> { Ok(()) };

        let outcome = Trainer::new(opts).fit(&mut model, data, &CancellationToken::new(), &mut observer);

        assert!(outcome.history.iter().all(|r| r.val_loss.is_some()));
        assert!(outcome.history.iter().all(|r| r.val_accuracy.is_none()));
    }
}
