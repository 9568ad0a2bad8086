use std::sync::Arc;

use comms::{
    ProtocolErr,
    msg::{CreateTrain, CreateTrainClassifier, Envelope, ImagePredict, Request, Response},
    specs::{Row, TrainProgress, TrainStatus},
};
use log::{debug, error, info, warn};
use machine_learning::{
    TrainEvent, TrainedModel,
    image::PredictionType,
    training::{ClassifierOptions, train_classifier, train_tabular},
};
use tokio::{
    sync::mpsc::{self, UnboundedSender},
    task::{self, JoinHandle},
};

use crate::{
    Result, WorkerErr,
    resources::Resources,
    session::{RunTicket, Sessions},
};

/// The model type name a pretrained digit model is registered under by default.
pub const DIGIT_MODEL: &str = "mnist";

/// The sending half of a connection's outbound messages.
pub type Outbox = UnboundedSender<Envelope>;

enum Job {
    Tabular(Box<CreateTrain>),
    Classifier(CreateTrainClassifier),
}

/// Dispatches inbound requests of one connection to the ML core and replies through
/// its outbox.
///
/// Runs and predictions execute on their own tasks, so a slow request never blocks
/// the requests of other sessions.
#[derive(Clone)]
pub struct Router {
    sessions: Arc<Sessions>,
    resources: Arc<Resources>,
    out: Outbox,
}

impl Router {
    /// Creates a new `Router`.
    ///
    /// # Arguments
    /// * `resources` - The process wide configuration and extractor.
    /// * `out` - Where every response of this connection is sent.
    pub fn new(resources: Arc<Resources>, out: Outbox) -> Self {
        Self {
            sessions: Arc::new(Sessions::new()),
            resources,
            out,
        }
    }

    /// Handles one inbound envelope.
    ///
    /// Envelopes that don't come from the main thread are ignored. Malformed ones and
    /// unknown types are answered with an `error` response.
    pub fn dispatch(&self, envelope: Envelope) {
        let model_id = envelope.model_id.clone();

        let request = match envelope.into_request() {
            Ok((_, request)) => request,
            Err(ProtocolErr::ForeignOrigin) => {
                debug!("ignoring a message that does not come from the main thread");
                return;
            }
            Err(e) => {
                self.reply_err(model_id, &e.into());
                return;
            }
        };

        debug!(kind = request.kind(), model_id = model_id.as_deref().unwrap_or("-"); "request received");

        let request_kind = request.kind();
        let require_id =
            |model_id: Option<String>| model_id.ok_or(WorkerErr::MissingModelId(request_kind));

        let outcome = match request {
            Request::CreateTrain(req) => {
                require_id(model_id.clone()).map(|id| self.start_run(&id, Job::Tabular(req)))
            }
            Request::CreateTrainClassifier(req) => {
                require_id(model_id.clone()).map(|id| self.start_run(&id, Job::Classifier(req)))
            }
            Request::Predict { inputs } => {
                require_id(model_id.clone()).map(|id| self.predict_row(id, inputs))
            }
            Request::ImagePredict(req) => {
                require_id(model_id.clone()).map(|id| self.predict_image(id, req))
            }
            Request::LoadRemoteModel { kind } => self.load_remote_model(model_id.clone(), kind),
            Request::LoadFeatureExtractor => {
                self.load_extractor(model_id.clone());
                Ok(())
            }
            Request::StopTraining => {
                let stopped = self.sessions.cancel(model_id.as_deref());
                info!(model_id = model_id.as_deref().unwrap_or("*"), sessions = stopped; "stop requested");
                Ok(())
            }
            Request::Remove => require_id(model_id.clone()).map(|id| {
                if self.sessions.remove(&id) {
                    info!(model_id = id.as_str(); "session removed");
                }
            }),
        };

        if let Err(e) = outcome {
            self.reply_err(model_id, &e);
        }
    }

    /// Cancels every run of this connection.
    pub fn shutdown(&self) {
        let stopped = self.sessions.cancel(None);
        debug!(sessions = stopped; "router shut down");
    }

    /// Sends a response, dropping it if the connection is gone.
    pub fn reply(&self, model_id: Option<String>, response: Response) {
        match response.into_envelope(model_id) {
            Ok(envelope) => {
                if self.out.send(envelope).is_err() {
                    debug!("connection closed, dropping response");
                }
            }
            Err(e) => error!("could not serialize response: {e}"),
        }
    }

    fn reply_err(&self, model_id: Option<String>, err: &WorkerErr) {
        warn!(model_id = model_id.as_deref().unwrap_or("-"); "request failed: {err}");
        self.reply(
            model_id,
            Response::Error {
                message: err.to_string(),
                kind: err.kind().to_string(),
            },
        );
    }

    fn start_run(&self, model_id: &str, job: Job) {
        if self.sessions.is_training(model_id) {
            info!(model_id = model_id; "restarting training, cancelling the previous run");
        }

        self.sessions.start_run(model_id, |ticket, previous| {
            let router = self.clone();
            tokio::spawn(async move { router.run(ticket, previous, job).await })
        });
    }

    async fn run(self, ticket: RunTicket, previous: Option<JoinHandle<()>>, job: Job) {
        if let Some(previous) = previous
            && let Err(e) = previous.await
        {
            warn!(model_id = ticket.model_id.as_str(); "previous run did not finish cleanly: {e}");
        }

        let model_id = ticket.model_id.clone();
        info!(model_id = model_id.as_str(); "training started");

        let (tx, mut rx) = mpsc::unbounded_channel();
        let cancel = ticket.cancel.clone();
        let handle = match job {
            Job::Tabular(req) => task::spawn_blocking(move || train_tabular(*req, &cancel, &tx)),
            Job::Classifier(req) => {
                let extractor = match self.resources.extractor().await {
                    Ok(extractor) => extractor,
                    Err(e) => {
                        self.fail_run(&ticket, &e);
                        return;
                    }
                };
                let options = ClassifierOptions {
                    max_samples_per_class: self.resources.config().max_samples_per_class,
                    ..Default::default()
                };
                task::spawn_blocking(move || {
                    train_classifier(req, &options, extractor.as_ref(), &cancel, &tx)
                })
            }
        };

        let mut ended = false;
        while let Some(event) = rx.recv().await {
            match event {
                TrainEvent::Update(progress) => {
                    self.reply(Some(model_id.clone()), Response::TrainUpdate(progress));
                }
                TrainEvent::End { progress, model } => {
                    ended = true;
                    self.end_run(&ticket, progress, model);
                }
            }
        }

        if let Err(e) = handle.await {
            error!(model_id = model_id.as_str(); "training task failed: {e}");
            if !ended {
                self.fail_run(&ticket, &e.into());
            }
        }
    }

    fn end_run(&self, ticket: &RunTicket, progress: TrainProgress, model: Option<TrainedModel>) {
        let model_id = ticket.model_id.as_str();
        let epochs = progress.model_history.len();

        match progress.status {
            Some(TrainStatus::Failed) => warn!(
                model_id = model_id,
                epochs = epochs;
                "training failed: {}",
                progress.error.as_deref().unwrap_or("unknown error")
            ),
            Some(TrainStatus::Cancelled) => info!(model_id = model_id, epochs = epochs; "training cancelled"),
            _ => info!(model_id = model_id, epochs = epochs; "training finished"),
        }

        if let Some(model) = model
            && !self.sessions.complete_run(ticket, model)
        {
            debug!(model_id = model_id; "session changed during the run, model discarded");
        }

        self.reply(Some(ticket.model_id.clone()), Response::TrainEnd(progress));
    }

    fn fail_run(&self, ticket: &RunTicket, err: &WorkerErr) {
        let mut progress = TrainProgress::from_history(Vec::new());
        progress.status = Some(TrainStatus::Failed);
        progress.error = Some(err.to_string());
        self.end_run(ticket, progress, None);
    }

    fn predict_row(&self, model_id: String, inputs: Row) {
        let router = self.clone();
        tokio::spawn(async move {
            let outcome = async {
                let model = router.sessions.model(&model_id)?;
                let prediction = task::spawn_blocking(move || model.predict_row(&inputs)).await??;
                Ok::<_, WorkerErr>(prediction)
            }
            .await;

            match outcome {
                Ok(prediction) => router.reply(Some(model_id), Response::PredictionResult(prediction)),
                Err(e) => router.reply_err(Some(model_id), &e),
            }
        });
    }

    fn predict_image(&self, model_id: String, req: ImagePredict) {
        let router = self.clone();
        tokio::spawn(async move {
            let outcome = async {
                let model = router.sessions.model(&model_id)?;
                let kind = req.prediction_type.unwrap_or(match model.as_ref() {
                    TrainedModel::Classifier { .. } => PredictionType::Classifier,
                    _ => PredictionType::Mnist,
                });
                let extractor = router.resources.ready_extractor();

                let prediction = task::spawn_blocking(move || {
                    model.predict_image(&req.image, kind, extractor.as_deref())
                })
                .await??;
                Ok::<_, WorkerErr>(prediction)
            }
            .await;

            match outcome {
                Ok(prediction) => {
                    router.reply(Some(model_id), Response::ImagePredictionResult(prediction))
                }
                Err(e) => router.reply_err(Some(model_id), &e),
            }
        });
    }

    fn load_remote_model(&self, model_id: Option<String>, kind: String) -> Result<()> {
        if kind != DIGIT_MODEL {
            return Err(WorkerErr::UnknownRemoteModel(kind));
        }

        let router = self.clone();
        tokio::spawn(async move {
            let id = model_id.unwrap_or_else(|| DIGIT_MODEL.to_string());
            let response = match router.resources.load_digit_model().await {
                Ok(network) => {
                    router.sessions.insert_model(&id, TrainedModel::Digit { network });
                    Response::ModelLoaded {
                        success: true,
                        message: None,
                    }
                }
                Err(e) => {
                    warn!(model_id = id.as_str(); "digit model could not be loaded: {e}");
                    Response::ModelLoaded {
                        success: false,
                        message: Some(e.to_string()),
                    }
                }
            };
            router.reply(Some(id), response);
        });

        Ok(())
    }

    fn load_extractor(&self, model_id: Option<String>) {
        let router = self.clone();
        tokio::spawn(async move {
            let response = match router.resources.extractor().await {
                Ok(_) => Response::ExtractorLoaded {
                    success: true,
                    message: None,
                },
                Err(e) => {
                    warn!("feature extractor could not be loaded: {e}");
                    Response::ExtractorLoaded {
                        success: false,
                        message: Some(e.to_string()),
                    }
                }
            };
            router.reply(model_id, response);
        });
    }
}
