use std::{error::Error, fmt, io};

use comms::ProtocolErr;
use machine_learning::{ErrorKind, MlErr};
use tokio::task::JoinError;

/// The worker module's result type.
pub type Result<T> = std::result::Result<T, WorkerErr>;

/// Worker runtime failures.
#[derive(Debug)]
pub enum WorkerErr {
    Io(io::Error),
    Protocol(ProtocolErr),
    Ml(MlErr),
    Join(JoinError),
    MissingModelId(&'static str),
    MissingConfig(&'static str),
    InvalidEnv { var: &'static str, value: String },
    UnknownRemoteModel(String),
}

impl WorkerErr {
    /// Classifies this error for the `kind` of an `error` response.
    pub fn kind(&self) -> ErrorKind {
        match self {
            WorkerErr::Ml(e) => e.kind(),
            WorkerErr::Protocol(_)
            | WorkerErr::MissingModelId(_)
            | WorkerErr::MissingConfig(_)
            | WorkerErr::InvalidEnv { .. }
            | WorkerErr::UnknownRemoteModel(_) => ErrorKind::Configuration,
            WorkerErr::Io(_) | WorkerErr::Join(_) => ErrorKind::Runtime,
        }
    }
}

impl fmt::Display for WorkerErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkerErr::Io(e) => write!(f, "io error: {e}"),
            WorkerErr::Protocol(e) => write!(f, "{e}"),
            WorkerErr::Ml(e) => write!(f, "{e}"),
            WorkerErr::Join(e) => write!(f, "task failed: {e}"),
            WorkerErr::MissingModelId(kind) => write!(f, "`{kind}` needs a modelId"),
            WorkerErr::MissingConfig(var) => write!(f, "{var} is not set"),
            WorkerErr::InvalidEnv { var, value } => write!(f, "invalid value for {var}: {value}"),
            WorkerErr::UnknownRemoteModel(kind) => write!(f, "unknown remote model type `{kind}`"),
        }
    }
}

impl Error for WorkerErr {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            WorkerErr::Io(e) => Some(e),
            WorkerErr::Protocol(e) => Some(e),
            WorkerErr::Ml(e) => Some(e),
            WorkerErr::Join(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for WorkerErr {
    fn from(value: io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<ProtocolErr> for WorkerErr {
    fn from(value: ProtocolErr) -> Self {
        Self::Protocol(value)
    }
}

impl From<MlErr> for WorkerErr {
    fn from(value: MlErr) -> Self {
        Self::Ml(value)
    }
}

impl From<JoinError> for WorkerErr {
    fn from(value: JoinError) -> Self {
        Self::Join(value)
    }
}

/// Boundary conversion for binaries / I/O APIs.
impl From<WorkerErr> for io::Error {
    fn from(value: WorkerErr) -> Self {
        match value {
            WorkerErr::Io(e) => e,
            other => io::Error::new(io::ErrorKind::InvalidData, other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_follow_the_cause() {
        let err = WorkerErr::from(MlErr::SessionNotFound("a".into()));
        assert_eq!(err.kind(), ErrorKind::SessionNotFound);
        assert_eq!(WorkerErr::MissingModelId("predict").kind(), ErrorKind::Configuration);

        let io: io::Error = WorkerErr::UnknownRemoteModel("cifar".into()).into();
        assert_eq!(io.kind(), io::ErrorKind::InvalidData);
    }
}
