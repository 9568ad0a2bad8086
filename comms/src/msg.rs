//! The application layer messages exchanged between the UI thread and the worker.
//!
//! Every frame on the wire is an [`Envelope`]. Inbound envelopes are parsed into a typed
//! [`Request`], outbound [`Response`]s are turned back into envelopes before sending.

use std::{error::Error, fmt};

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::specs::{
    ClassSamples, ModelConfig, Prediction, Row, TableColumn, TrainConfig, TrainProgress,
};

/// The wire names of every message type.
pub mod kind {
    pub const CREATE_TRAIN: &str = "create_train";
    pub const CREATE_TRAIN_CLASSIFIER: &str = "create_train_classifier";
    pub const PREDICT: &str = "predict";
    pub const CLASSIFIER_PREDICT: &str = "classifier_predict";
    pub const IMAGE_PREDICT: &str = "image_predict";
    pub const LOAD_REMOTE_MODEL: &str = "load_remote_model";
    pub const LOAD_MOBILENET_MODEL: &str = "load_mobilenet_model";
    pub const STOP_TRAINING: &str = "stop_training";
    pub const REMOVE: &str = "remove";

    pub const INIT: &str = "init";
    pub const TRAIN_UPDATE: &str = "train_update";
    pub const TRAIN_END: &str = "train_end";
    pub const PREDICTION_RESULT: &str = "prediction_result";
    pub const IMAGE_PREDICTION_RESULT: &str = "image_prediction_result";
    pub const MOBILENET_LOADED: &str = "mobilenet_loaded";
    pub const MODEL_LOADED: &str = "model_loaded";
    pub const ERROR: &str = "error";
}

/// The side of the boundary a message comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Origin {
    Main,
    Worker,
}

/// The raw JSON envelope every message travels in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub from: Origin,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(
        rename = "modelId",
        default,
        deserialize_with = "model_id",
        skip_serializing_if = "Option::is_none"
    )]
    pub model_id: Option<String>,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub data: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl Envelope {
    /// Parses the typed request this envelope carries.
    ///
    /// # Returns
    /// The model id the request targets and the request itself, or a `ProtocolErr`
    /// if the envelope does not come from the main thread or its type/data are invalid.
    pub fn into_request(self) -> Result<(Option<String>, Request), ProtocolErr> {
        if self.from != Origin::Main {
            return Err(ProtocolErr::ForeignOrigin);
        }

        let request = Request::parse(&self.kind, self.data)?;
        Ok((self.model_id, request))
    }
}

/// UI model ids may be numbers, they are carried as strings.
fn model_id<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let id = match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => Some(s),
        Some(other) => Some(other.to_string()),
    };

    Ok(id)
}

/// The possible protocol level failures of an inbound envelope.
#[derive(Debug)]
pub enum ProtocolErr {
    ForeignOrigin,
    UnknownType(String),
    InvalidData {
        kind: String,
        source: serde_json::Error,
    },
}

impl fmt::Display for ProtocolErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ForeignOrigin => write!(f, "message does not come from the main thread"),
            Self::UnknownType(kind) => write!(f, "Unknown message type! ({kind})"),
            Self::InvalidData { kind, source } => {
                write!(f, "invalid data for message `{kind}`: {source}")
            }
        }
    }
}

impl Error for ProtocolErr {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::InvalidData { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// The data of a tabular `create_train` request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTrain {
    pub data: Vec<Row>,
    #[serde(default)]
    pub columns: Vec<TableColumn>,
    pub model_config: ModelConfig,
    pub train_config: TrainConfig,
}

/// The only tunable of the image classifier head.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassifierConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub epochs: Option<usize>,
}

/// The data of a `create_train_classifier` request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTrainClassifier {
    pub inputs: Vec<ClassSamples>,
    #[serde(default)]
    pub model_config: ClassifierConfig,
}

/// Which image pipeline a prediction runs through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PredictionType {
    #[serde(alias = "digit")]
    Mnist,
    Classifier,
}

/// The data of an image prediction request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImagePredict {
    pub image: String,
    #[serde(
        rename = "predictionType",
        alias = "type",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub prediction_type: Option<PredictionType>,
}

/// A typed inbound request.
#[derive(Debug, Clone, PartialEq)]
pub enum Request {
    CreateTrain(Box<CreateTrain>),
    CreateTrainClassifier(CreateTrainClassifier),
    Predict { inputs: Row },
    ImagePredict(ImagePredict),
    LoadRemoteModel { kind: String },
    LoadFeatureExtractor,
    StopTraining,
    Remove,
}

#[derive(Deserialize)]
struct PredictData {
    inputs: Row,
}

#[derive(Deserialize)]
struct RemoteModelData {
    #[serde(rename = "type")]
    kind: String,
}

impl Request {
    /// Parses a request from its wire `kind` and `data`.
    ///
    /// # Arguments
    /// * `kind` - The envelope `type`.
    /// * `data` - The envelope `data`.
    ///
    /// # Returns
    /// The parsed request or a `ProtocolErr`.
    pub fn parse(kind: &str, data: Value) -> Result<Self, ProtocolErr> {
        let invalid = |source| ProtocolErr::InvalidData {
            kind: kind.to_string(),
            source,
        };

        let request = match kind {
            kind::CREATE_TRAIN => {
                Self::CreateTrain(Box::new(serde_json::from_value(data).map_err(invalid)?))
            }
            kind::CREATE_TRAIN_CLASSIFIER => {
                Self::CreateTrainClassifier(serde_json::from_value(data).map_err(invalid)?)
            }
            kind::PREDICT => {
                let PredictData { inputs } = serde_json::from_value(data).map_err(invalid)?;
                Self::Predict { inputs }
            }
            kind::CLASSIFIER_PREDICT | kind::IMAGE_PREDICT => {
                let mut req: ImagePredict = serde_json::from_value(data).map_err(invalid)?;
                if kind == kind::CLASSIFIER_PREDICT {
                    req.prediction_type.get_or_insert(PredictionType::Classifier);
                }
                Self::ImagePredict(req)
            }
            kind::LOAD_REMOTE_MODEL => {
                let RemoteModelData { kind } = serde_json::from_value(data).map_err(invalid)?;
                Self::LoadRemoteModel { kind }
            }
            kind::LOAD_MOBILENET_MODEL => Self::LoadFeatureExtractor,
            kind::STOP_TRAINING => Self::StopTraining,
            kind::REMOVE => Self::Remove,
            other => return Err(ProtocolErr::UnknownType(other.to_string())),
        };

        Ok(request)
    }

    /// The wire name of this request.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::CreateTrain(_) => kind::CREATE_TRAIN,
            Self::CreateTrainClassifier(_) => kind::CREATE_TRAIN_CLASSIFIER,
            Self::Predict { .. } => kind::PREDICT,
            Self::ImagePredict(_) => kind::IMAGE_PREDICT,
            Self::LoadRemoteModel { .. } => kind::LOAD_REMOTE_MODEL,
            Self::LoadFeatureExtractor => kind::LOAD_MOBILENET_MODEL,
            Self::StopTraining => kind::STOP_TRAINING,
            Self::Remove => kind::REMOVE,
        }
    }

    /// Wraps this request in an envelope coming from the main thread.
    ///
    /// # Arguments
    /// * `model_id` - The session this request targets, if any.
    pub fn into_envelope(self, model_id: Option<String>) -> serde_json::Result<Envelope> {
        let kind = self.kind().to_string();
        let data = match self {
            Self::CreateTrain(req) => serde_json::to_value(req)?,
            Self::CreateTrainClassifier(req) => serde_json::to_value(req)?,
            Self::Predict { inputs } => serde_json::json!({ "inputs": inputs }),
            Self::ImagePredict(req) => serde_json::to_value(req)?,
            Self::LoadRemoteModel { kind } => serde_json::json!({ "type": kind }),
            Self::LoadFeatureExtractor | Self::StopTraining | Self::Remove => Value::Null,
        };

        Ok(Envelope {
            from: Origin::Main,
            kind,
            model_id,
            data,
            message: None,
        })
    }
}

/// A typed outbound response.
#[derive(Debug, Clone, PartialEq)]
pub enum Response {
    Init { message: String },
    TrainUpdate(TrainProgress),
    TrainEnd(TrainProgress),
    PredictionResult(Prediction),
    ImagePredictionResult(Prediction),
    ExtractorLoaded { success: bool, message: Option<String> },
    ModelLoaded { success: bool, message: Option<String> },
    Error { message: String, kind: String },
}

#[derive(Serialize)]
struct Loaded<'a> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<&'a str>,
}

impl Response {
    /// The wire name of this response.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Init { .. } => kind::INIT,
            Self::TrainUpdate(_) => kind::TRAIN_UPDATE,
            Self::TrainEnd(_) => kind::TRAIN_END,
            Self::PredictionResult(_) => kind::PREDICTION_RESULT,
            Self::ImagePredictionResult(_) => kind::IMAGE_PREDICTION_RESULT,
            Self::ExtractorLoaded { .. } => kind::MOBILENET_LOADED,
            Self::ModelLoaded { .. } => kind::MODEL_LOADED,
            Self::Error { .. } => kind::ERROR,
        }
    }

    /// Whether this response ends the lifecycle of a training request.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::TrainEnd(_))
    }

    /// Wraps this response in an envelope coming from the worker.
    ///
    /// # Arguments
    /// * `model_id` - The session this response belongs to, if any.
    pub fn into_envelope(self, model_id: Option<String>) -> serde_json::Result<Envelope> {
        let kind = self.kind().to_string();
        let mut message = None;

        let data = match self {
            Self::Init { message } => serde_json::json!({ "message": message }),
            Self::TrainUpdate(progress) | Self::TrainEnd(progress) => {
                serde_json::to_value(progress)?
            }
            Self::PredictionResult(prediction) | Self::ImagePredictionResult(prediction) => {
                serde_json::json!({ "prediction": serde_json::to_value(prediction)? })
            }
            Self::ExtractorLoaded {
                success,
                message: msg,
            }
            | Self::ModelLoaded {
                success,
                message: msg,
            } => serde_json::to_value(Loaded {
                success,
                message: msg.as_deref(),
            })?,
            Self::Error { message: msg, kind } => {
                message = Some(msg);
                serde_json::json!({ "kind": kind })
            }
        };

        Ok(Envelope {
            from: Origin::Worker,
            kind,
            model_id,
            data,
            message,
        })
    }
}
