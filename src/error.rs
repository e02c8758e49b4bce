use std::fmt::{Debug, Display, Formatter};

use config::ConfigError;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug)]
pub enum Error {
    /// Malformed literal or statement fragment, including arity/kind
    /// mismatches reported by node validation. Rejected before planning.
    Parse(String),
    /// Value-level failure: unknown source name, bad column, failed
    /// arithmetic. Recoverable, reported to the caller.
    Value(String),
    /// Statement planning failure: missing capability, unsupported
    /// FROM shape. The query dies, the process lives.
    Plan(String),
    /// Recognized statement kind or query shape the engine does not
    /// execute yet.
    Unimplemented(String),
    /// Broken invariant inside the engine. Always a bug.
    Internal(String),
}

impl Error {
    pub fn parse(msg: impl Into<String>) -> Error {
        Error::Parse(msg.into())
    }

    pub fn value(msg: impl Into<String>) -> Error {
        Error::Value(msg.into())
    }

    pub fn plan(msg: impl Into<String>) -> Error {
        Error::Plan(msg.into())
    }

    pub fn unimplemented(msg: impl Into<String>) -> Error {
        Error::Unimplemented(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Error {
        Error::Internal(msg.into())
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Parse(s)
            | Error::Value(s)
            | Error::Plan(s)
            | Error::Unimplemented(s)
            | Error::Internal(s) => {
                write!(f, "{}", s)
            }
        }
    }
}

impl std::error::Error for Error {}

impl From<ConfigError> for Error {
    fn from(err: ConfigError) -> Self {
        Error::Internal(err.to_string())
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Internal(err.to_string())
    }
}

impl<T> From<std::sync::PoisonError<T>> for Error {
    fn from(err: std::sync::PoisonError<T>) -> Self {
        Error::Internal(err.to_string())
    }
}

impl<T> From<tokio::sync::mpsc::error::SendError<T>> for Error {
    fn from(err: tokio::sync::mpsc::error::SendError<T>) -> Self {
        Error::Internal(err.to_string())
    }
}

impl From<tokio::task::JoinError> for Error {
    fn from(err: tokio::task::JoinError) -> Self {
        Error::Internal(err.to_string())
    }
}

#[macro_export]
macro_rules! parse_err {
    ($($arg:tt)*) => { $crate::error::Error::Parse(format!($($arg)*)) };
}

#[macro_export]
macro_rules! value_err {
    ($($arg:tt)*) => { $crate::error::Error::Value(format!($($arg)*)) };
}

#[macro_export]
macro_rules! plan_err {
    ($($arg:tt)*) => { $crate::error::Error::Plan(format!($($arg)*)) };
}

#[macro_export]
macro_rules! unimplemented_err {
    ($($arg:tt)*) => { $crate::error::Error::Unimplemented(format!($($arg)*)) };
}

#[macro_export]
macro_rules! internal_err {
    ($($arg:tt)*) => { $crate::error::Error::Internal(format!($($arg)*)) };
}
