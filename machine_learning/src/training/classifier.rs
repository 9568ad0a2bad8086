use std::num::NonZeroUsize;

use comms::{
    msg::CreateTrainClassifier,
    specs::{
        ActivationSpec, CompileOptions, EpochRecord, Metrics, ModelConfig, ProblemType,
        TrainProgress, TrainStatus,
    },
};
use log::{info, warn};
use ndarray::{Array2, Axis};
use tokio_util::sync::CancellationToken;

use super::{
    CompiledModel, Dataset, EventSender, FitOptions, FitOutcome, ModelBuilder, TrainEvent, Trainer,
    failed, terminal,
};
use crate::{
    MlErr, Result,
    image::{FeatureExtractor, embed_batch},
    inference::TrainedModel,
    preprocessing::TargetData,
};

/// The fixed settings of the image classifier head.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClassifierOptions {
    pub epochs: usize,
    pub max_samples_per_class: usize,
    pub seed: Option<u64>,
}

impl ClassifierOptions {
    pub const DEFAULT_EPOCHS: usize = 50;
    pub const MAX_SAMPLES_PER_CLASS: usize = 120;
    pub const HIDDEN_UNITS: usize = 128;
    pub const BATCH_SIZE: usize = 5;
    pub const LEARNING_RATE: f32 = 0.001;
    /// How many samples are embedded between two checks of the stop signal.
    pub const EMBED_CHUNK: usize = 32;
}

impl Default for ClassifierOptions {
    fn default() -> Self {
        Self {
            epochs: Self::DEFAULT_EPOCHS,
            max_samples_per_class: Self::MAX_SAMPLES_PER_CLASS,
            seed: None,
        }
    }
}

/// Flattens the `{className: [image]}` inputs into labels and labeled samples.
///
/// Labels keep their first appearance order, a repeated class name adds to the same label.
fn collect_samples(
    request: CreateTrainClassifier,
    cap: usize,
) -> Result<(Vec<String>, Vec<String>, Vec<usize>)> {
    let mut labels: Vec<String> = Vec::new();
    let mut per_class: Vec<Vec<String>> = Vec::new();

    for (name, samples) in request.inputs.into_iter().flatten() {
        let idx = match labels.iter().position(|l| *l == name) {
            Some(idx) => idx,
            None => {
                labels.push(name);
                per_class.push(Vec::new());
                labels.len() - 1
            }
        };
        per_class[idx].extend(samples);
    }

    if labels.len() < 2 {
        return Err(MlErr::invalid(format!(
            "an image classifier needs at least two classes, got {}",
            labels.len()
        )));
    }
    if let Some(empty) = labels.iter().zip(&per_class).find(|(_, s)| s.is_empty()) {
        return Err(MlErr::invalid(format!("the class `{}` has no samples", empty.0)));
    }

    let mut payloads = Vec::new();
    let mut targets = Vec::new();
    for (idx, mut samples) in per_class.into_iter().enumerate() {
        if samples.len() > cap {
            warn!(class = labels[idx].as_str(), samples = samples.len(), cap = cap; "too many samples, truncating");
            samples.truncate(cap);
        }
        targets.extend(std::iter::repeat_n(idx, samples.len()));
        payloads.extend(samples);
    }

    Ok((labels, payloads, targets))
}

fn head_config(classes: usize) -> ModelConfig {
    let loss = if classes == 2 {
        "binaryCrossentropy"
    } else {
        "categoricalCrossentropy"
    };

    let mut config = ModelConfig::new(
        vec![ClassifierOptions::HIDDEN_UNITS, classes],
        ProblemType::Classification,
    );
    config.activation_function = Some(ActivationSpec::Relu);
    config.compile_options = Some(CompileOptions {
        optimizer: "adam".to_string(),
        learning_rate: ClassifierOptions::LEARNING_RATE,
        loss_function: Some(loss.to_string()),
        metrics: Metrics::One("accuracy".to_string()),
    });
    config
}

/// Embeds the samples chunk by chunk, giving up as soon as `cancel` is raised.
fn embed_until_cancelled(
    payloads: &[String],
    extractor: &dyn FeatureExtractor,
    cancel: &CancellationToken,
) -> Result<Option<Array2<f32>>> {
    let mut blocks = Vec::new();
    for chunk in payloads.chunks(ClassifierOptions::EMBED_CHUNK) {
        if cancel.is_cancelled() {
            return Ok(None);
        }
        blocks.push(embed_batch(chunk, extractor)?);
    }

    let views: Vec<_> = blocks.iter().map(|b| b.view()).collect();
    Ok(Some(ndarray::concatenate(Axis(0), &views)?))
}

/// Trains a classifier head on extractor embeddings of labeled images.
///
/// Progress events carry no test report. The terminal event carries the head and the class
/// names in input order.
///
/// # Arguments
/// * `request` - The samples of every class and the optional epoch count.
/// * `options` - The sample cap, default epochs and seed.
/// * `extractor` - The shared frozen feature extractor.
/// * `cancel` - The cooperative stop signal of the session.
/// * `events` - Where progress and the terminal event are sent.
pub fn train_classifier(
    request: CreateTrainClassifier,
    options: &ClassifierOptions,
    extractor: &dyn FeatureExtractor,
    cancel: &CancellationToken,
    events: &EventSender,
) {
    let epochs = request.model_config.epochs.unwrap_or(options.epochs);

    let setup = || -> Result<Option<_>> {
        let (labels, payloads, targets) = collect_samples(request, options.max_samples_per_class)?;
        let classes = labels.len();

        let Some(x) = embed_until_cancelled(&payloads, extractor, cancel)? else {
            return Ok(None);
        };
        let y = TargetData::Classes {
            indices: targets,
            classes,
        }
        .to_matrix(classes);

        let model = ModelBuilder::new().with_seed(options.seed).build(
            &head_config(classes),
            extractor.embedding_size(),
            Some(classes),
        )?;

        info!(classes = classes, samples = payloads.len(); "image classifier prepared");
        Ok(Some((labels, model, Dataset::new(x, y)?)))
    };

    let (labels, mut model, dataset) = match setup() {
        Ok(Some(setup)) => setup,
        Ok(None) => {
            info!("image classifier cancelled while embedding samples");
            let progress = terminal(FitOutcome {
                history: Vec::new(),
                status: TrainStatus::Cancelled,
                error: None,
            });
            let _ = events.send(TrainEvent::End {
                progress,
                model: None,
            });
            return;
        }
        Err(e) => {
            warn!("image classifier training could not start: {e}");
            let _ = events.send(failed(e));
            return;
        }
    };

    let mut observer = |history: &[EpochRecord], _: &CompiledModel| -> Result<()> {
        let _ = events.send(TrainEvent::Update(TrainProgress::from_history(history.to_vec())));
        Ok(())
    };

    let fit = FitOptions {
        epochs,
        batch_size: NonZeroUsize::new(ClassifierOptions::BATCH_SIZE).unwrap_or(NonZeroUsize::MIN),
        shuffle: true,
        validation_split: 0.,
        seed: options.seed,
    };
    let outcome = Trainer::new(fit).fit(&mut model, dataset, cancel, &mut observer);

    let event = match outcome.status {
        TrainStatus::Failed => TrainEvent::End {
            progress: terminal(outcome),
            model: None,
        },
        _ => match model.into_network() {
            Ok(network) => TrainEvent::End {
                progress: terminal(outcome),
                model: Some(TrainedModel::Classifier { network, labels }),
            },
            Err(e) => failed(e),
        },
    };

    let _ = events.send(event);
}
