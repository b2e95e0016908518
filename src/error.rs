use std::io;

use thiserror::Error as ThisError;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Boxed error returned by caller supplied reply transforms.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Every command resolves to exactly one value or exactly one of these.
///
/// `BadProtocol`, `Timeout` and `ConnectionLost` are connection level: they are raised once at the
/// connection boundary and fanned out to every affected caller. `Server`, `Mapper`,
/// `UnexpectedReply` and `Argument` only ever concern the single caller that produced them.
#[derive(Debug, ThisError)]
pub enum Error {
    #[error("protocol error; {0}")]
    BadProtocol(String),
    #[error("{0}")]
    Server(String),
    #[error("timed out while {0}")]
    Timeout(&'static str),
    #[error("connection lost")]
    ConnectionLost,
    #[error("invalid argument; {0}")]
    Argument(String),
    #[error("failed to convert reply payload: {0}")]
    Mapper(#[source] BoxError),
    #[error("unexpected reply; expected {expected}, got {actual}")]
    UnexpectedReply {
        expected: &'static str,
        actual: String,
    },
    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

impl Error {
    /// Returns true when the error leaves the connection that produced it unusable.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::BadProtocol(_) | Error::Timeout(_) | Error::ConnectionLost | Error::Io(_)
        )
    }

    pub(crate) fn argument(msg: impl Into<String>) -> Error {
        Error::Argument(msg.into())
    }
}
