//! Model building, the fit loop and the two training jobs the worker runs.

mod builder;
mod classifier;
mod dataset;
mod report;
mod tabular;
mod trainer;

pub use builder::{BoxedLoss, CompiledModel, ModelBuilder, loss_by_name, resolve_layers};
pub use classifier::{ClassifierOptions, train_classifier};
pub use dataset::Dataset;
pub use report::test_report;
pub use tabular::train_tabular;
pub use trainer::{FitOptions, FitOutcome, Observer, Trainer};

use comms::specs::{TrainProgress, TrainStatus};
use tokio::sync::mpsc::UnboundedSender;

use crate::inference::TrainedModel;

/// What a training job publishes while it runs.
#[derive(Debug)]
pub enum TrainEvent {
    /// The metrics after one more epoch.
    Update(TrainProgress),
    /// The last event of a run. The model is present unless the run failed.
    End {
        progress: TrainProgress,
        model: Option<TrainedModel>,
    },
}

impl TrainEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TrainEvent::End { .. })
    }

    pub fn progress(&self) -> &TrainProgress {
        match self {
            TrainEvent::Update(progress) | TrainEvent::End { progress, .. } => progress,
        }
    }
}

/// The sending half of a job's event stream.
pub type EventSender = UnboundedSender<TrainEvent>;

/// Builds the terminal progress of a run.
fn terminal(outcome: FitOutcome) -> TrainProgress {
    let mut progress = TrainProgress::from_history(outcome.history);
    progress.status = Some(outcome.status);
    progress.error = outcome.error.map(|e| e.to_string());
    progress
}

/// Builds the terminal progress of a run that failed before fitting.
fn failed(error: crate::MlErr) -> TrainEvent {
    TrainEvent::End {
        progress: terminal(FitOutcome {
            history: Vec::new(),
            status: TrainStatus::Failed,
            error: Some(error),
        }),
        model: None,
    }
}
