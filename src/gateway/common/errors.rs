use std::fmt::{Debug, Display};
use std::{fmt, io, result};
use std::net::AddrParseError;
use std::sync::PoisonError;

use crate::gateway::protocol::sqlstate;

/// A crate-wide error type. Every variant can produce a SQLSTATE so the
/// session layer always has something valid to put in an ErrorResponse.
#[derive(Debug)]
pub struct Error {
    err: Box<ErrorKind>,
}

#[derive(Debug)]
pub enum ErrorKind {
    TooBusyError,
    Timeout,
    PoisonError,
    ClosedError,
    Cancelled,
    PoolExhausted,
    StringError(String),
    IOError(io::Error),
    YAMLError(serde_yaml::Error),
    UTF8Error(std::str::Utf8Error),
    ArrayFromSliceError(std::array::TryFromSliceError),
    /// A frontend message violated protocol framing: bad startup packet,
    /// unexpected tag for the current session state, etc.
    Protocol(String),
    /// SCRAM or trust authentication failed.
    Auth(String),
    /// The SQL translator couldn't normalize or rewrite a statement.
    Translate(String),
    /// IRIS returned an error for a query; sqlstate is either passed through
    /// from IRIS (when it issues one) or synthesized from the %SYSTEM error class.
    Backend { sqlstate: &'static str, message: String },
}

pub type Result<T> = result::Result<T, Error>;

impl Error {
    pub fn new<S: ToString>(s: S) -> Self {
        Error { err: Box::new(ErrorKind::StringError(s.to_string())) }
    }

    pub fn too_busy() -> Self {
        Error { err: Box::new(ErrorKind::TooBusyError) }
    }

    pub fn closed() -> Self {
        Error { err: Box::new(ErrorKind::ClosedError) }
    }

    pub fn cancelled() -> Self {
        Error { err: Box::new(ErrorKind::Cancelled) }
    }

    pub fn pool_exhausted() -> Self {
        Error { err: Box::new(ErrorKind::PoolExhausted) }
    }

    pub fn protocol_error<S: ToString>(s: S) -> Self {
        Error { err: Box::new(ErrorKind::Protocol(s.to_string())) }
    }

    pub fn auth_error<S: ToString>(s: S) -> Self {
        Error { err: Box::new(ErrorKind::Auth(s.to_string())) }
    }

    pub fn translate_error<S: ToString>(s: S) -> Self {
        Error { err: Box::new(ErrorKind::Translate(s.to_string())) }
    }

    pub fn backend_error(code: &'static str, message: impl ToString) -> Self {
        Error { err: Box::new(ErrorKind::Backend { sqlstate: code, message: message.to_string() }) }
    }

    pub fn kind(&self) -> &ErrorKind {
        &self.err
    }

    /// The SQLSTATE to report to the client in an ErrorResponse.
    pub fn sqlstate(&self) -> &'static str {
        match &*self.err {
            ErrorKind::TooBusyError => sqlstate::TOO_MANY_CONNECTIONS,
            ErrorKind::Timeout => sqlstate::QUERY_CANCELED,
            ErrorKind::PoisonError => sqlstate::INTERNAL_ERROR,
            ErrorKind::ClosedError => sqlstate::CONNECTION_DOES_NOT_EXIST,
            ErrorKind::Cancelled => sqlstate::QUERY_CANCELED,
            ErrorKind::PoolExhausted => sqlstate::TOO_MANY_CONNECTIONS,
            ErrorKind::StringError(_) => sqlstate::INTERNAL_ERROR,
            ErrorKind::IOError(_) => sqlstate::CONNECTION_FAILURE,
            ErrorKind::YAMLError(_) => sqlstate::CONFIG_FILE_ERROR,
            ErrorKind::UTF8Error(_) => sqlstate::CHARACTER_NOT_IN_REPERTOIRE,
            ErrorKind::ArrayFromSliceError(_) => sqlstate::INTERNAL_ERROR,
            ErrorKind::Protocol(_) => sqlstate::PROTOCOL_VIOLATION,
            ErrorKind::Auth(_) => sqlstate::INVALID_PASSWORD,
            ErrorKind::Translate(_) => sqlstate::FEATURE_NOT_SUPPORTED,
            ErrorKind::Backend { sqlstate, .. } => sqlstate,
        }
    }
}

impl From<&str> for Error {
    fn from(err: &str) -> Self {
        Error { err: Box::new(ErrorKind::StringError(String::from(err))) }
    }
}

impl From<String> for Error {
    fn from(err: String) -> Self {
        Error { err: Box::new(ErrorKind::StringError(err)) }
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Error { err: Box::new(ErrorKind::IOError(err)) }
    }
}

impl From<serde_yaml::Error> for Error {
    fn from(err: serde_yaml::Error) -> Self {
        Error { err: Box::new(ErrorKind::YAMLError(err)) }
    }
}

impl From<std::str::Utf8Error> for Error {
    fn from(err: std::str::Utf8Error) -> Self {
        Error { err: Box::new(ErrorKind::UTF8Error(err)) }
    }
}

impl From<std::array::TryFromSliceError> for Error {
    fn from(err: std::array::TryFromSliceError) -> Self {
        Error { err: Box::new(ErrorKind::ArrayFromSliceError(err)) }
    }
}

impl From<AddrParseError> for Error {
    fn from(err: AddrParseError) -> Self {
        Error::new(err)
    }
}

impl<Guard> From<PoisonError<Guard>> for Error {
    fn from(_err: PoisonError<Guard>) -> Self {
        Error { err: Box::new(ErrorKind::PoisonError) }
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        Display::fmt(&self.err, f)
    }
}

impl Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ErrorKind::TooBusyError => f.write_str("server is too busy to handle this request"),
            ErrorKind::ClosedError => f.write_str("connection is closed"),
            ErrorKind::PoisonError => f.write_str("another thread panicked while holding the lock"),
            ErrorKind::Cancelled => f.write_str("query was cancelled"),
            ErrorKind::PoolExhausted => f.write_str("connection pool exhausted"),
            ErrorKind::StringError(s) => f.write_str(s),
            ErrorKind::IOError(e) => Display::fmt(e, f),
            ErrorKind::YAMLError(e) => Display::fmt(e, f),
            ErrorKind::UTF8Error(e) => Display::fmt(e, f),
            ErrorKind::ArrayFromSliceError(e) => Display::fmt(e, f),
            ErrorKind::Timeout => f.write_str("operation timed out"),
            ErrorKind::Protocol(s) => write!(f, "protocol violation: {}", s),
            ErrorKind::Auth(s) => write!(f, "authentication failed: {}", s),
            ErrorKind::Translate(s) => write!(f, "could not translate statement: {}", s),
            ErrorKind::Backend { message, .. } => f.write_str(message),
        }
    }
}

impl PartialEq for Error {
    fn eq(&self, other: &Self) -> bool {
        self.err == other.err
    }
}
impl Eq for Error {}

impl PartialEq for ErrorKind {
    fn eq(&self, other: &Self) -> bool {
        std::mem::discriminant(self) == std::mem::discriminant(other)
    }
}
impl Eq for ErrorKind {}
