use thiserror::Error as ThisError;

use crate::config::ProtocolPreference;
use crate::results::TaskId;

pub type OpaqueError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(ThisError, Debug)]
pub enum Error {
    #[error("could not resolve {destination}")]
    Resolution {
        destination: String,
        #[source]
        source: std::io::Error,
    },
    #[error("no {family} address found for {destination}")]
    NoAddressForFamily {
        destination: String,
        family: ProtocolPreference,
    },
    #[error("{context}")]
    Transport {
        context: String,
        #[source]
        source: OpaqueError,
    },
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error("task {0} is already registered")]
    DuplicateTask(TaskId),
    #[error("task {0} has no result entry")]
    UnknownTask(TaskId),
    #[error("{0}")]
    Opaque(#[from] OpaqueError),
}

impl Error {
    pub(crate) fn transport(context: impl Into<String>, source: impl Into<OpaqueError>) -> Self {
        Error::Transport {
            context: context.into(),
            source: source.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
