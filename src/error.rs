use std::fmt;

/// Errors from the fallible edges of the crate: reading configs and writing plot data.
///
/// Numeric preconditions (shape mismatches, a non-positive learning rate) are
/// not represented here; they panic.
#[derive(Debug)]
pub enum Error {
    /// The configuration parsed but describes an experiment that cannot run.
    InvalidConfig(String),
    /// Plot data holds NaN or infinite values, which JSON cannot represent.
    NonFinite(String),
    /// Reading or writing a file failed.
    Io(std::io::Error),
    /// JSON could not be parsed or produced.
    Json(serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidConfig(msg) => write!(f, "invalid config: {msg}"),
            Self::NonFinite(msg) => write!(f, "non-finite values: {msg}"),
            Self::Io(e) => write!(f, "io error: {e}"),
            Self::Json(e) => write!(f, "json error: {e}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            Self::Json(e) => Some(e),
            Self::InvalidConfig(_) | Self::NonFinite(_) => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Self::Json(e)
    }
}
