use std::{
    error::Error,
    fmt::{self, Display},
    io,
};

use ndarray::ShapeError;

/// The result type used in the entire machine learning module.
pub type Result<T> = std::result::Result<T, MlErr>;

/// The coarse classification of an `MlErr`, reported to the UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Configuration,
    Decode,
    NotReady,
    SessionNotFound,
    Runtime,
}

impl ErrorKind {
    /// The wire name of this kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Configuration => "configuration",
            ErrorKind::Decode => "decode",
            ErrorKind::NotReady => "not_ready",
            ErrorKind::SessionNotFound => "session_not_found",
            ErrorKind::Runtime => "runtime",
        }
    }
}

impl Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The machine learning module's error type.
#[derive(Debug)]
pub enum MlErr {
    SizeMismatch {
        a: &'static str,
        b: &'static str,
        got: usize,
        expected: usize,
    },
    EmptyFeatures,
    EmptyDataset,
    MissingColumn(String),
    NotNumeric {
        field: String,
        value: String,
    },
    UnknownCategory {
        field: String,
        value: String,
    },
    OutputMismatch {
        classes: usize,
        output: usize,
    },
    InvalidConfig(String),
    UnknownOptimizer(String),
    UnknownLoss(String),
    Decode(String),
    NotReady(&'static str),
    SessionNotFound(String),
    NonFiniteLoss {
        epoch: usize,
    },
    Shape(ShapeError),
    Io(io::Error),
    Json(serde_json::Error),
}

impl MlErr {
    /// Classifies this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            MlErr::EmptyFeatures
            | MlErr::EmptyDataset
            | MlErr::MissingColumn(_)
            | MlErr::NotNumeric { .. }
            | MlErr::UnknownCategory { .. }
            | MlErr::OutputMismatch { .. }
            | MlErr::InvalidConfig(_)
            | MlErr::UnknownOptimizer(_)
            | MlErr::UnknownLoss(_) => ErrorKind::Configuration,
            MlErr::Decode(_) => ErrorKind::Decode,
            MlErr::NotReady(_) => ErrorKind::NotReady,
            MlErr::SessionNotFound(_) => ErrorKind::SessionNotFound,
            MlErr::SizeMismatch { .. }
            | MlErr::NonFiniteLoss { .. }
            | MlErr::Shape(_)
            | MlErr::Io(_)
            | MlErr::Json(_) => ErrorKind::Runtime,
        }
    }

    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        MlErr::InvalidConfig(msg.into())
    }
}

impl Display for MlErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MlErr::SizeMismatch {
                a,
                b,
                got,
                expected,
            } => write!(
                f,
                "There's a size mismatch between {a} and {b}, got {got} and expected {expected}"
            ),
            MlErr::EmptyFeatures => write!(f, "There are no feature columns left to train on"),
            MlErr::EmptyDataset => write!(f, "There are no rows left to train on"),
            MlErr::MissingColumn(field) => write!(f, "The column `{field}` is not in the data"),
            MlErr::NotNumeric { field, value } => {
                write!(f, "The value {value} of column `{field}` is not numeric")
            }
            MlErr::UnknownCategory { field, value } => write!(
                f,
                "The value {value} of column `{field}` was not seen while training"
            ),
            MlErr::OutputMismatch { classes, output } => write!(
                f,
                "The output layer has {output} units but the target has {classes} classes"
            ),
            MlErr::InvalidConfig(msg) => write!(f, "Invalid configuration: {msg}"),
            MlErr::UnknownOptimizer(name) => write!(f, "Unknown optimizer `{name}`"),
            MlErr::UnknownLoss(name) => write!(f, "Unknown loss function `{name}`"),
            MlErr::Decode(msg) => write!(f, "Failed to decode image: {msg}"),
            MlErr::NotReady(what) => write!(f, "The {what} is not loaded yet"),
            MlErr::SessionNotFound(id) => write!(f, "There is no trained model with id `{id}`"),
            MlErr::NonFiniteLoss { epoch } => {
                write!(f, "The loss diverged to a non finite value at epoch {epoch}")
            }
            MlErr::Shape(e) => write!(f, "Tensor shape error: {e}"),
            MlErr::Io(e) => write!(f, "I/O error: {e}"),
            MlErr::Json(e) => write!(f, "JSON error: {e}"),
        }
    }
}

impl Error for MlErr {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            MlErr::Shape(e) => Some(e),
            MlErr::Io(e) => Some(e),
            MlErr::Json(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ShapeError> for MlErr {
    fn from(value: ShapeError) -> Self {
        Self::Shape(value)
    }
}

impl From<io::Error> for MlErr {
    fn from(value: io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<serde_json::Error> for MlErr {
    fn from(value: serde_json::Error) -> Self {
        Self::Json(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_follow_taxonomy() {
        assert_eq!(
            MlErr::UnknownOptimizer("foo".into()).kind(),
            ErrorKind::Configuration
        );
        assert_eq!(MlErr::Decode("bad".into()).kind(), ErrorKind::Decode);
        assert_eq!(MlErr::NotReady("extractor").kind(), ErrorKind::NotReady);
        assert_eq!(
            MlErr::SessionNotFound("m".into()).kind().as_str(),
            "session_not_found"
        );
        assert_eq!(
            MlErr::NonFiniteLoss { epoch: 3 }.kind(),
            ErrorKind::Runtime
        );
    }
}
