use std::fmt;

/// Every failure a store operation can report.
///
/// The first four variants are business-rule violations and carry a message meant for the
/// client; the others are internal failures.
#[derive(Debug)]
pub enum Error {
    Validation(String),
    NotFound(String),
    Conflict(String),
    Forbidden(String),
    Io(std::io::Error),
    Serialization(serde_json::Error),
    Hashing(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn validation(message: impl Into<String>) -> Self {
        Error::Validation(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Error::NotFound(message.into())
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Error::Conflict(message.into())
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Error::Forbidden(message.into())
    }

    /// True for failures that are not caused by the request
    pub fn is_internal(&self) -> bool {
        matches!(
            self,
            Error::Io(_) | Error::Serialization(_) | Error::Hashing(_)
        )
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Validation(message)
            | Error::NotFound(message)
            | Error::Conflict(message)
            | Error::Forbidden(message) => write!(f, "{}", message),
            Error::Io(e) => write!(f, "storage IO error: {}", e),
            Error::Serialization(e) => write!(f, "storage serialization error: {}", e),
            Error::Hashing(e) => write!(f, "password hashing error: {}", e),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(e) => Some(e),
            Error::Serialization(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err)
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err)
    }
}
