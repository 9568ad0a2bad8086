use comms::{
    msg::CreateTrain,
    specs::{EpochRecord, TrainProgress, TrainStatus},
};
use log::warn;
use tokio_util::sync::CancellationToken;

use super::{
    CompiledModel, Dataset, EventSender, FitOptions, ModelBuilder, TrainEvent, Trainer, failed,
    report::test_report, terminal,
};
use crate::{
    Result,
    inference::TrainedModel,
    preprocessing::{Prepared, preprocess},
};

/// Trains a network on tabular rows, publishing every epoch and one terminal event.
///
/// Every progress event carries a fresh predicted-vs-actual report of the held-out rows.
/// Completed and cancelled runs end with the trained model, failed ones without it.
///
/// # Arguments
/// * `request` - The rows, UI columns, network shape and fit settings.
/// * `cancel` - The cooperative stop signal of the session.
/// * `events` - Where progress and the terminal event are sent.
pub fn train_tabular(request: CreateTrain, cancel: &CancellationToken, events: &EventSender) {
    let CreateTrain {
        data,
        columns,
        model_config,
        train_config,
    } = request;
    let problem = model_config.problem_type;
    let prep_config = &train_config.data_preparation_config;

    let setup = || -> Result<_> {
        let Prepared {
            train_x,
            train_y,
            test_x,
            test_rows,
            state,
        } = preprocess(&data, prep_config, problem)?;

        let model = ModelBuilder::new().with_seed(prep_config.seed).build(
            &model_config,
            state.feature_width(),
            train_y.classes(),
        )?;
        let dataset = Dataset::new(train_x, train_y.to_matrix(model.output_size()))?;

        Ok((model, dataset, test_x, test_rows, state))
    };

    let (mut model, dataset, test_x, test_rows, state) = match setup() {
        Ok(setup) => setup,
        Err(e) => {
            warn!("tabular training could not start: {e}");
            let _ = events.send(failed(e));
            return;
        }
    };
    drop(data);

    let report = |model: &CompiledModel| -> Result<_> {
        let outputs = model.predict(test_x.view())?;
        Ok(test_report(&test_rows, &columns, outputs.view(), &state, problem))
    };

    let mut observer = |history: &[EpochRecord], model: &CompiledModel| -> Result<()> {
        let mut progress = TrainProgress::from_history(history.to_vec());
        progress.test_data = Some(report(model)?);
        let _ = events.send(TrainEvent::Update(progress));
        Ok(())
    };

    let outcome = Trainer::new(FitOptions::from(&train_config)).fit(
        &mut model,
        dataset,
        cancel,
        &mut observer,
    );

    if outcome.status == TrainStatus::Failed {
        let _ = events.send(TrainEvent::End {
            progress: terminal(outcome),
            model: None,
        });
        return;
    }

    let finish = || -> Result<_> {
        let test_data = report(&model)?;
        let network = model.into_network()?;
        Ok((test_data, network))
    };

    let event = match finish() {
        Ok((test_data, network)) => {
            let mut progress = terminal(outcome);
            progress.test_data = Some(test_data);
            TrainEvent::End {
                progress,
                model: Some(TrainedModel::Tabular {
                    network,
                    state,
                    problem,
                }),
            }
        }
        Err(e) => {
            let mut progress = terminal(outcome);
            progress.status = Some(TrainStatus::Failed);
            progress.error = Some(e.to_string());
            TrainEvent::End {
                progress,
                model: None,
            }
        }
    };

    let _ = events.send(event);
}
