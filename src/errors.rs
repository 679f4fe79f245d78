use std::fmt;

/// The error type shared by every layer of the engine.
#[derive(Debug)]
pub enum Error {
    /// A header or node record failed to decode, or `check_consistency` failed at open.
    Corrupt(String),
    /// An out-of-range or otherwise invalid argument was supplied to a constructor.
    InvalidArgument(String),
    /// A lookup or delete did not find the requested key.
    KeyNotFound,
    /// An encoded key exceeds the store's advertised `key_size`.
    KeyTooLarge { len: usize, max: usize },
    /// An encoded value exceeds the store's advertised `data_size`.
    ValueTooLarge { len: usize, max: usize },
    /// The underlying file could not be read or written.
    Io(std::io::Error),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::Corrupt(msg) => write!(f, "corrupt store: {}", msg),
            Error::InvalidArgument(msg) => write!(f, "invalid argument: {}", msg),
            Error::KeyNotFound => write!(f, "key not found"),
            Error::KeyTooLarge { len, max } => {
                write!(f, "key too large ({} bytes, max {})", len, max)
            }
            Error::ValueTooLarge { len, max } => {
                write!(f, "value too large ({} bytes, max {})", len, max)
            }
            Error::Io(e) => write!(f, "io error: {}", e),
        }
    }
}

impl std::error::Error for Error {}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Error {
        Error::Io(err)
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Error {
        Error::Corrupt(format!("malformed record: {}", err))
    }
}
